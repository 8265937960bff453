//! Best-score persistence behind a small port, keyed by game id.
//! The file adapter lives in the XDG config dir (or ~/.config/blastui).

use log::warn;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const FILENAME: &str = "highscores";

#[derive(Debug, Error)]
pub enum ScoreStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Load/save capability owned by the app, not the engine.
pub trait ScoreStore {
    /// Stored best for `game`; 0 when missing or unreadable.
    fn load(&self, game: &str) -> u32;
    fn save(&mut self, game: &str, score: u32) -> Result<(), ScoreStoreError>;
}

/// Returns the path to the high scores file (config dir / blastui / highscores).
fn config_path() -> PathBuf {
    let base = if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if xdg.is_empty() {
            std::env::var("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(".config")
        } else {
            PathBuf::from(xdg)
        }
    } else {
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".config"))
            .unwrap_or_else(|_| PathBuf::from("."))
    };
    base.join("blastui").join(FILENAME)
}

/// `game=score` lines in a plain text file.
#[derive(Debug, Clone)]
pub struct FileScoreStore {
    path: PathBuf,
}

impl FileScoreStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Self {
        Self::new(config_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> BTreeMap<String, u32> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return BTreeMap::new(),
        };
        content
            .lines()
            .filter_map(|line| {
                let (key, value) = line.split_once('=')?;
                let score = value.trim().parse::<u32>().ok()?;
                Some((key.trim().to_string(), score))
            })
            .collect()
    }
}

impl ScoreStore for FileScoreStore {
    fn load(&self, game: &str) -> u32 {
        self.read_all().get(game).copied().unwrap_or(0)
    }

    fn save(&mut self, game: &str, score: u32) -> Result<(), ScoreStoreError> {
        let mut all = self.read_all();
        all.insert(game.to_string(), score);
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let body: String = all
            .iter()
            .map(|(game, score)| format!("{}={}\n", game, score))
            .collect();
        fs::write(&self.path, body)?;
        Ok(())
    }
}

/// Process-local store for `--no-save`.
#[derive(Debug, Clone, Default)]
pub struct MemoryScoreStore {
    scores: HashMap<String, u32>,
}

impl ScoreStore for MemoryScoreStore {
    fn load(&self, game: &str) -> u32 {
        self.scores.get(game).copied().unwrap_or(0)
    }

    fn save(&mut self, game: &str, score: u32) -> Result<(), ScoreStoreError> {
        self.scores.insert(game.to_string(), score);
        Ok(())
    }
}

/// Tracks the best score for one game and writes through on every new record.
pub struct BestScore {
    store: Box<dyn ScoreStore>,
    game: &'static str,
    best: u32,
    beaten: bool,
}

impl BestScore {
    pub fn new(store: Box<dyn ScoreStore>, game: &'static str) -> Self {
        let best = store.load(game);
        Self {
            store,
            game,
            best,
            beaten: false,
        }
    }

    pub fn best(&self) -> u32 {
        self.best
    }

    /// True once the current session has beaten the stored record.
    pub fn beaten(&self) -> bool {
        self.beaten
    }

    /// Feed the current score; saves and returns true if it is a new record.
    /// A failed save keeps the in-memory record.
    pub fn observe(&mut self, score: u32) -> bool {
        if score <= self.best {
            return false;
        }
        self.best = score;
        self.beaten = true;
        if let Err(e) = self.store.save(self.game, score) {
            warn!("could not save high score: {}", e);
        }
        true
    }

    /// Start of a new session on the same store.
    pub fn reset_session(&mut self) {
        self.beaten = false;
    }
}
