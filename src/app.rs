//! App: terminal init, main loop, input routing and engine notifications.

use crate::GameConfig;
use crate::board::{GRID_SIZE, Position};
use crate::colors::SeededColors;
use crate::engine::{ClickOutcome, EngineEvent, MatchEngine, Phase};
use crate::highscores::{BestScore, ScoreStore};
use crate::input::{Action, key_to_action};
use crate::scheduler::GameClock;
use crate::theme::Theme;
use crate::ui::{self, View};
use anyhow::Result;
use crossterm::event::{self, Event, KeyEventKind, MouseButton, MouseEventKind};
use log::{debug, info};
use ratatui::DefaultTerminal;
use ratatui::layout::Rect;
use std::time::{Duration, Instant};
use tachyonfx::Effect;

/// Identity under which the best score is stored.
const GAME_ID: &str = "block-blast";

/// Popups drift up one row per step and vanish after the last.
const POPUP_STEP_MS: u32 = 250;
const POPUP_LIFETIME_MS: u32 = 1500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Playing,
    QuitMenu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuitOption {
    Resume,
    Restart,
    Exit,
}

impl QuitOption {
    fn next(self) -> Self {
        match self {
            Self::Resume => Self::Restart,
            Self::Restart => Self::Exit,
            Self::Exit => Self::Resume,
        }
    }

    fn prev(self) -> Self {
        match self {
            Self::Resume => Self::Exit,
            Self::Restart => Self::Resume,
            Self::Exit => Self::Restart,
        }
    }
}

/// Floating "+points" label over the first cleared cell.
#[derive(Debug, Clone)]
pub struct ScorePopup {
    pub cell: Position,
    pub amount: u32,
    pub multiplier: u32,
    pub age_ms: u32,
}

impl ScorePopup {
    /// Rows risen so far.
    pub fn rise(&self) -> u16 {
        (self.age_ms / POPUP_STEP_MS) as u16
    }
}

fn tick_popups(popups: &mut Vec<ScorePopup>, delta_ms: u32) {
    popups.retain_mut(|p| {
        p.age_ms = p.age_ms.saturating_add(delta_ms);
        p.age_ms < POPUP_LIFETIME_MS
    });
}

/// Cursor after one step in `action`'s direction, clamped to the board.
fn move_cursor(cursor: Position, action: Action) -> Position {
    let max = GRID_SIZE - 1;
    match action {
        Action::CursorLeft => Position::new(cursor.row, cursor.col.saturating_sub(1)),
        Action::CursorRight => Position::new(cursor.row, (cursor.col + 1).min(max)),
        Action::CursorUp => Position::new(cursor.row.saturating_sub(1), cursor.col),
        Action::CursorDown => Position::new((cursor.row + 1).min(max), cursor.col),
        _ => cursor,
    }
}

pub struct App {
    config: GameConfig,
    theme: Theme,
    engine: MatchEngine<SeededColors>,
    clock: GameClock,
    best: BestScore,
    screen: Screen,
    cursor: Position,
    popups: Vec<ScorePopup>,
    /// TachyonFX fade over clearing blocks (created when a clear starts).
    clear_effect: Option<Effect>,
    /// Last time we processed the clear effect (for delta).
    clear_effect_process_time: Option<Instant>,
    quit_selected: QuitOption,
    /// Terminal area of the last frame, for mouse hit testing.
    last_area: Rect,
    last_frame: Instant,
}

impl App {
    pub fn new(config: GameConfig, theme: Theme, store: Box<dyn ScoreStore>) -> Self {
        let colors = config
            .seed
            .map(SeededColors::new)
            .unwrap_or_else(SeededColors::from_entropy);
        info!("new session, seed {}", colors.seed());
        let engine = MatchEngine::new(colors, config.timings);
        let now = Instant::now();
        Self {
            config,
            theme,
            engine,
            clock: GameClock::new(now),
            best: BestScore::new(store, GAME_ID),
            screen: Screen::Playing,
            cursor: Position::new(GRID_SIZE / 2, GRID_SIZE / 2),
            popups: Vec::new(),
            clear_effect: None,
            clear_effect_process_time: None,
            quit_selected: QuitOption::Resume,
            last_area: Rect::default(),
            last_frame: now,
        }
    }

    fn restart(&mut self) {
        self.engine.restart();
        self.best.reset_session();
        self.popups.clear();
        self.clear_effect = None;
        self.clear_effect_process_time = None;
        self.screen = Screen::Playing;
        self.clock.resume(Instant::now());
        self.process_engine_events();
    }

    fn click(&mut self, pos: Position) {
        if self.clock.is_paused() {
            return;
        }
        let now = self.clock.elapsed(Instant::now());
        match self.engine.handle_click(pos, now) {
            ClickOutcome::Swapped(a, b) => debug!("swap {:?} <-> {:?}", a, b),
            ClickOutcome::Selected(p) => debug!("selected {:?}", p),
            ClickOutcome::Ignored => {}
        }
    }

    /// Forward engine notifications to the best-score tracker and the popups.
    fn process_engine_events(&mut self) {
        for event in self.engine.drain_events() {
            match event {
                EngineEvent::ScoreChanged(score) => {
                    if self.best.observe(score) {
                        debug!("new best score {}", score);
                    }
                }
                EngineEvent::ComboChanged(combo) => debug!("combo {}", combo),
                EngineEvent::Cleared {
                    cells,
                    points,
                    combo,
                } => {
                    if let Some(&cell) = cells.first() {
                        self.popups.push(ScorePopup {
                            cell,
                            amount: points,
                            multiplier: combo,
                            age_ms: 0,
                        });
                    }
                }
                EngineEvent::Settled => debug!("settled at {}", self.engine.score()),
            }
        }
        if self.engine.phase() != Phase::Clearing {
            self.clear_effect = None;
            self.clear_effect_process_time = None;
        }
    }

    fn toggle_pause(&mut self) {
        let now = Instant::now();
        if self.clock.is_paused() {
            self.clock.resume(now);
        } else {
            self.clock.pause(now);
        }
    }

    /// Returns false when the player chose to exit.
    fn handle_action(&mut self, action: Action) -> bool {
        match self.screen {
            Screen::Playing => match action {
                Action::Quit => {
                    self.screen = Screen::QuitMenu;
                    self.quit_selected = QuitOption::Resume;
                    self.clock.pause(Instant::now());
                }
                Action::Pause => self.toggle_pause(),
                Action::Restart => self.restart(),
                _ if self.clock.is_paused() => {}
                Action::Select => self.click(self.cursor),
                Action::CursorLeft
                | Action::CursorRight
                | Action::CursorUp
                | Action::CursorDown => self.cursor = move_cursor(self.cursor, action),
                Action::None => {}
            },
            Screen::QuitMenu => match action {
                Action::CursorDown | Action::CursorRight => {
                    self.quit_selected = self.quit_selected.next();
                }
                Action::CursorUp | Action::CursorLeft => {
                    self.quit_selected = self.quit_selected.prev();
                }
                Action::Select => match self.quit_selected {
                    QuitOption::Resume => {
                        self.screen = Screen::Playing;
                        self.clock.resume(Instant::now());
                    }
                    QuitOption::Restart => self.restart(),
                    QuitOption::Exit => return false,
                },
                Action::Quit | Action::Pause => {
                    self.screen = Screen::Playing;
                    self.clock.resume(Instant::now());
                }
                Action::Restart | Action::None => {}
            },
        }
        true
    }

    pub fn run(&mut self) -> Result<()> {
        use crossterm::{
            event::{DisableMouseCapture, EnableMouseCapture},
            execute,
            terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
        };

        enable_raw_mode()?;
        let mut stdout = std::io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;

        let mut terminal =
            ratatui::DefaultTerminal::new(ratatui::backend::CrosstermBackend::new(stdout))?;

        let result = self.run_loop(&mut terminal);

        // Restore
        execute!(std::io::stdout(), DisableMouseCapture, LeaveAlternateScreen)?;
        disable_raw_mode()?;
        info!(
            "session over: score {}, best {}",
            self.engine.score(),
            self.best.best()
        );

        result
    }

    fn run_loop(&mut self, terminal: &mut DefaultTerminal) -> Result<()> {
        let frame_duration = Duration::from_secs_f64(1.0 / self.config.frame_rate);
        let fade_ms = (!self.config.no_animation)
            .then(|| self.config.timings.clear_settle.as_millis().min(u32::MAX as u128) as u32);
        loop {
            let now = Instant::now();
            self.engine.tick(self.clock.elapsed(now));
            self.process_engine_events();

            let delta_ms = now
                .saturating_duration_since(self.last_frame)
                .as_millis()
                .min(u32::MAX as u128) as u32;
            self.last_frame = now;
            if !self.clock.is_paused() {
                tick_popups(&mut self.popups, delta_ms);
            }

            terminal.draw(|f| {
                self.last_area = f.area();
                let view = View {
                    screen: self.screen,
                    grid: self.engine.grid(),
                    selection: self.engine.selection(),
                    cursor: self.cursor,
                    phase: self.engine.phase(),
                    score: self.engine.score(),
                    combo: self.engine.combo(),
                    best: self.best.best(),
                    new_record: self.best.beaten(),
                    paused: self.clock.is_paused(),
                    popups: &self.popups,
                    quit_selected: self.quit_selected,
                    theme: &self.theme,
                };
                ui::draw(
                    f,
                    &view,
                    &mut self.clear_effect,
                    &mut self.clear_effect_process_time,
                    fade_ms,
                    now,
                );
            })?;

            // Wake early if a chain step falls due before the next frame.
            let mut timeout = frame_duration.saturating_sub(now.elapsed());
            if let Some(due) = self.engine.next_due().filter(|_| !self.clock.is_paused()) {
                let until_due = due.saturating_sub(self.clock.elapsed(Instant::now()));
                timeout = timeout.min(until_due);
            }
            if event::poll(timeout)? {
                while event::poll(Duration::ZERO)? {
                    match event::read()? {
                        Event::Key(key) if key.kind == KeyEventKind::Press => {
                            if !self.handle_action(key_to_action(key)) {
                                return Ok(());
                            }
                        }
                        Event::Mouse(mouse)
                            if mouse.kind == MouseEventKind::Down(MouseButton::Left)
                                && self.screen == Screen::Playing =>
                        {
                            if let Some(pos) = ui::cell_at(self.last_area, mouse.column, mouse.row)
                            {
                                self.cursor = pos;
                                self.click(pos);
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_is_clamped_to_board() {
        let corner = Position::new(0, 0);
        assert_eq!(move_cursor(corner, Action::CursorUp), corner);
        assert_eq!(move_cursor(corner, Action::CursorLeft), corner);
        let far = Position::new(GRID_SIZE - 1, GRID_SIZE - 1);
        assert_eq!(move_cursor(far, Action::CursorDown), far);
        assert_eq!(move_cursor(far, Action::CursorRight), far);
        assert_eq!(
            move_cursor(Position::new(3, 3), Action::CursorRight),
            Position::new(3, 4)
        );
    }

    #[test]
    fn test_popups_rise_and_expire() {
        let mut popups = vec![ScorePopup {
            cell: Position::new(4, 4),
            amount: 30,
            multiplier: 1,
            age_ms: 0,
        }];
        tick_popups(&mut popups, POPUP_STEP_MS * 2);
        assert_eq!(popups[0].rise(), 2);
        tick_popups(&mut popups, POPUP_LIFETIME_MS);
        assert!(popups.is_empty());
    }

    #[test]
    fn test_quit_menu_cycles() {
        let mut opt = QuitOption::Resume;
        for _ in 0..3 {
            opt = opt.next();
        }
        assert_eq!(opt, QuitOption::Resume);
        assert_eq!(QuitOption::Resume.prev(), QuitOption::Exit);
    }
}
