//! blastui: Block Blast-style match-three puzzle in the terminal.

mod app;
mod board;
mod colors;
mod engine;
mod highscores;
mod input;
mod logging;
mod scheduler;
mod theme;
mod ui;

use anyhow::Result;
use app::App;
use clap::{Parser, ValueEnum};
use engine::Timings;
use highscores::{FileScoreStore, MemoryScoreStore, ScoreStore};
use log::{LevelFilter, info, warn};
use std::time::Duration;

/// Options derived from CLI that affect the session (seed, settle delays, persistence).
#[derive(Debug, Clone)]
pub struct GameConfig {
    pub seed: Option<u64>,
    pub timings: Timings,
    pub no_animation: bool,
    pub frame_rate: f64,
}

impl GameConfig {
    fn from_args(args: &Args) -> Self {
        let timings = if args.no_animation {
            Timings::instant()
        } else {
            Timings {
                swap_settle: Duration::from_millis(args.swap_settle_ms),
                clear_settle: Duration::from_millis(args.clear_settle_ms),
                cascade_settle: Duration::from_millis(args.cascade_settle_ms),
            }
        };
        Self {
            seed: args.seed,
            timings,
            no_animation: args.no_animation,
            frame_rate: args.frame_rate.clamp(1.0, 240.0),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    if let Some(path) = args.log_file.as_deref() {
        logging::init(path, args.log_level.into())?;
    }
    let theme = theme::Theme::load(args.theme.as_deref(), args.palette).unwrap_or_else(|e| {
        warn!("theme not loaded ({}), using defaults", e);
        theme::Theme::default()
    });
    let store: Box<dyn ScoreStore> = if args.no_save {
        Box::new(MemoryScoreStore::default())
    } else {
        let store = FileScoreStore::default_location();
        info!("high scores at {}", store.path().display());
        Box::new(store)
    };
    let config = GameConfig::from_args(&args);
    let mut app = App::new(config, theme, store);
    app.run()?;
    Ok(())
}

/// Block Blast-style match-three puzzle in the terminal.
#[derive(Debug, Parser)]
#[command(
    name = "blastui",
    version,
    about = "Block Blast-style match-three puzzle in the terminal. Swap neighbouring blocks to line up three or more of a colour.",
    long_about = "blastui is a match-three puzzle on an 8x8 board.\n\n\
        Pick a block, then pick a neighbour (up, down, left or right) to swap them. \
        Rows or columns of three or more same-coloured blocks clear, blocks above fall, \
        new blocks drop in from the top and any new lines clear too. Every chained clear \
        raises the combo, which multiplies the points of that clear.\n\n\
        CONTROLS:\n  Arrows / hjkl  Move cursor   Space / Enter  Pick or swap\n  \
        Mouse click    Pick or swap  P  Pause   R  Restart   Q / Esc  Quit"
)]
pub struct Args {
    /// Seed for block colours; the same seed replays the same board and refills.
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,

    /// Path to theme file (btop-style theme[key]=\"value\").
    #[arg(short, long, value_name = "FILE")]
    pub theme: Option<std::path::PathBuf>,

    /// Colour palette: normal (theme), high-contrast, or colorblind.
    #[arg(long, default_value = "normal")]
    pub palette: Palette,

    /// Resolve swaps instantly (no settle delays, no clear fade).
    #[arg(long)]
    pub no_animation: bool,

    /// Delay between a swap and the first match check.
    #[arg(long, default_value = "300", value_name = "MS")]
    pub swap_settle_ms: u64,

    /// How long matched blocks flash before they are removed.
    #[arg(long, default_value = "300", value_name = "MS")]
    pub clear_settle_ms: u64,

    /// Delay between refill and the next cascade check.
    #[arg(long, default_value = "400", value_name = "MS")]
    pub cascade_settle_ms: u64,

    /// Target render frames per second.
    #[arg(long, default_value = "30.0", value_name = "RATE")]
    pub frame_rate: f64,

    /// Keep the best score in memory only.
    #[arg(long)]
    pub no_save: bool,

    /// Append log records to this file.
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<std::path::PathBuf>,

    /// Log verbosity when --log-file is set.
    #[arg(long, default_value = "info")]
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Palette {
    #[default]
    Normal,

    #[value(alias = "highcontrast", alias = "contrast")]
    HighContrast,

    #[value(alias = "colourblind")]
    Colorblind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Self::Error,
            LogLevel::Warn => Self::Warn,
            LogLevel::Info => Self::Info,
            LogLevel::Debug => Self::Debug,
            LogLevel::Trace => Self::Trace,
        }
    }
}
