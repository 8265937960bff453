//! Match engine: selection, swaps and the timed resolution chain.
//!
//! A swap never resolves inside the click handler. It schedules a detection pass
//! after the swap settle delay; each matching pass flags blocks as clearing,
//! removes them after the clear delay, applies gravity and schedules the next
//! pass. The chain ends on the first pass that finds nothing:
//!
//! `Idle -> Swapped -> Matching -> Clearing -> Gravity -> Settling -> Matching ... -> Idle`

use crate::board::{Grid, Position};
use crate::colors::ColorSource;
use crate::scheduler::{Scheduler, TaskId};
use log::{debug, info};
use std::collections::BTreeSet;
use std::time::Duration;

/// Base points per cleared block, multiplied by the combo at that step.
pub const POINTS_PER_BLOCK: u32 = 10;

/// Upper bound on chain steps run by one `tick`, so a chain with zero delays
/// still hands control back to the caller.
const MAX_STEPS_PER_TICK: usize = 64;

/// Settle delays between chain steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Swap committed -> first detection pass.
    pub swap_settle: Duration,
    /// Blocks flagged clearing -> removed and scored.
    pub clear_settle: Duration,
    /// Refill -> next detection pass.
    pub cascade_settle: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            swap_settle: Duration::from_millis(300),
            clear_settle: Duration::from_millis(300),
            cascade_settle: Duration::from_millis(400),
        }
    }
}

impl Timings {
    pub const fn instant() -> Self {
        Self {
            swap_settle: Duration::ZERO,
            clear_settle: Duration::ZERO,
            cascade_settle: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Swapped,
    Matching,
    Clearing,
    Gravity,
    Settling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Detect,
    Remove,
}

/// What a click did. Invalid clicks are absorbed, never errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    Ignored,
    Selected(Position),
    Swapped(Position, Position),
}

/// Notifications for the presentation layer, drained with `drain_events`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    ScoreChanged(u32),
    ComboChanged(u32),
    Cleared {
        cells: Vec<Position>,
        points: u32,
        combo: u32,
    },
    /// A detection pass found nothing; the board is stable again.
    Settled,
}

pub struct MatchEngine<C: ColorSource> {
    grid: Grid,
    colors: C,
    timings: Timings,
    selection: Option<Position>,
    score: u32,
    combo: u32,
    phase: Phase,
    /// Positions flagged by the last matching pass, removed by the next `Remove`.
    marked: BTreeSet<Position>,
    scheduler: Scheduler<Step>,
    /// At most one step is pending: chain steps are strictly sequential.
    pending: Option<TaskId>,
    events: Vec<EngineEvent>,
}

impl<C: ColorSource> MatchEngine<C> {
    pub fn new(mut colors: C, timings: Timings) -> Self {
        let grid = Grid::random(&mut colors);
        Self::with_grid(grid, colors, timings)
    }

    pub fn with_grid(grid: Grid, colors: C, timings: Timings) -> Self {
        Self {
            grid,
            colors,
            timings,
            selection: None,
            score: 0,
            combo: 0,
            phase: Phase::Idle,
            marked: BTreeSet::new(),
            scheduler: Scheduler::new(),
            pending: None,
            events: Vec::new(),
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn selection(&self) -> Option<Position> {
        self.selection
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn combo(&self) -> u32 {
        self.combo
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// True while a resolution chain is in flight; clicks are ignored meanwhile.
    pub fn is_resolving(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Game time of the next pending step, if any.
    pub fn next_due(&self) -> Option<Duration> {
        self.scheduler.next_due()
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    /// Player clicked `pos` at game time `now`.
    pub fn handle_click(&mut self, pos: Position, now: Duration) -> ClickOutcome {
        if self.is_resolving() {
            debug!("click at {:?} ignored: chain in flight ({:?})", pos, self.phase);
            return ClickOutcome::Ignored;
        }
        match self.grid.get(pos) {
            Some(block) if block.active => {}
            _ => return ClickOutcome::Ignored,
        }
        match self.selection {
            Some(selected) if selected.is_adjacent(pos) => {
                self.selection = None;
                self.swap(selected, pos, now);
                ClickOutcome::Swapped(selected, pos)
            }
            _ => {
                self.selection = Some(pos);
                ClickOutcome::Selected(pos)
            }
        }
    }

    /// Exchange two adjacent blocks and schedule the first detection pass.
    /// Returns false (and changes nothing) if the swap is not allowed.
    pub fn swap(&mut self, a: Position, b: Position, now: Duration) -> bool {
        if self.is_resolving() || !a.in_bounds() || !b.in_bounds() || !a.is_adjacent(b) {
            return false;
        }
        self.grid.swap(a, b);
        self.phase = Phase::Swapped;
        debug!("swapped {:?} <-> {:?}", a, b);
        self.schedule(now + self.timings.swap_settle, Step::Detect);
        true
    }

    /// Run every step due at or before `now`. Each step runs at its own due time,
    /// so a late tick produces the same chain as a punctual one.
    pub fn tick(&mut self, now: Duration) {
        for _ in 0..MAX_STEPS_PER_TICK {
            let Some((at, step)) = self.scheduler.pop_due(now) else {
                break;
            };
            self.pending = None;
            match step {
                Step::Detect => self.detect(at),
                Step::Remove => self.remove(at),
            }
        }
    }

    /// Fresh random board; cancels any chain in flight.
    pub fn restart(&mut self) {
        if let Some(id) = self.pending.take() {
            self.scheduler.cancel(id);
        }
        debug_assert!(self.scheduler.is_empty());
        self.grid = Grid::random(&mut self.colors);
        self.selection = None;
        self.marked.clear();
        self.phase = Phase::Idle;
        self.set_score(0);
        self.set_combo(0);
        info!("board restarted");
    }

    fn schedule(&mut self, at: Duration, step: Step) {
        self.pending = Some(self.scheduler.schedule(at, step));
    }

    fn detect(&mut self, at: Duration) {
        self.phase = Phase::Matching;
        let marked = self.grid.find_matches();
        if marked.is_empty() {
            self.set_combo(0);
            self.phase = Phase::Idle;
            self.events.push(EngineEvent::Settled);
            debug!("board settled, score {}", self.score);
            return;
        }
        self.set_combo(self.combo + 1);
        self.grid.mark_clearing(&marked);
        debug!("matched {} blocks at combo {}", marked.len(), self.combo);
        self.marked = marked;
        self.phase = Phase::Clearing;
        self.schedule(at + self.timings.clear_settle, Step::Remove);
    }

    fn remove(&mut self, at: Duration) {
        self.phase = Phase::Gravity;
        let marked = std::mem::take(&mut self.marked);
        self.grid.deactivate(&marked);
        let points = (marked.len() as u32)
            .saturating_mul(POINTS_PER_BLOCK)
            .saturating_mul(self.combo);
        self.events.push(EngineEvent::Cleared {
            cells: marked.into_iter().collect(),
            points,
            combo: self.combo,
        });
        self.set_score(self.score.saturating_add(points));
        let spawned = self.grid.collapse(&mut self.colors);
        debug!("+{} points, {} blocks spawned", points, spawned);
        self.phase = Phase::Settling;
        self.schedule(at + self.timings.cascade_settle, Step::Detect);
    }

    fn set_score(&mut self, score: u32) {
        if score != self.score {
            self.score = score;
            self.events.push(EngineEvent::ScoreChanged(score));
        }
    }

    fn set_combo(&mut self, combo: u32) {
        if combo != self.combo {
            self.combo = combo;
            self.events.push(EngineEvent::ComboChanged(combo));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::tests::{QUIET, grid_from_rows, row_letters};
    use crate::board::{BlockId, GRID_SIZE};
    use crate::colors::SeededColors;
    use crate::colors::tests::ColorCycle;
    use proptest::prelude::*;
    use std::collections::HashSet;

    const REFILL: &str = "BPGYR";

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn pos(row: usize, col: usize) -> Position {
        Position::new(row, col)
    }

    fn engine(rows: [&str; GRID_SIZE]) -> MatchEngine<ColorCycle> {
        MatchEngine::with_grid(
            grid_from_rows(rows),
            ColorCycle::new(REFILL),
            Timings::default(),
        )
    }

    /// Advance game time until the chain in flight has finished.
    fn settle<C: ColorSource>(engine: &mut MatchEngine<C>, mut now: Duration) -> Duration {
        for _ in 0..1000 {
            if !engine.is_resolving() {
                break;
            }
            now = engine.next_due().unwrap_or(now);
            engine.tick(now);
        }
        assert!(!engine.is_resolving(), "chain did not terminate");
        now
    }

    fn click_pair<C: ColorSource>(
        engine: &mut MatchEngine<C>,
        a: Position,
        b: Position,
        now: Duration,
    ) -> ClickOutcome {
        engine.handle_click(a, now);
        engine.handle_click(b, now)
    }

    fn combo_events(events: &[EngineEvent]) -> Vec<u32> {
        events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::ComboChanged(c) => Some(*c),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_first_click_selects() {
        let mut e = engine(QUIET);
        assert_eq!(e.handle_click(pos(4, 4), ms(0)), ClickOutcome::Selected(pos(4, 4)));
        assert_eq!(e.selection(), Some(pos(4, 4)));
        assert_eq!(e.phase(), Phase::Idle);
    }

    #[test]
    fn test_diagonal_click_reselects_instead_of_swapping() {
        let mut e = engine(QUIET);
        let before = e.grid().clone();
        e.handle_click(pos(2, 2), ms(0));
        assert_eq!(e.handle_click(pos(3, 3), ms(0)), ClickOutcome::Selected(pos(3, 3)));
        assert_eq!(e.selection(), Some(pos(3, 3)));
        assert_eq!(e.phase(), Phase::Idle);
        for r in 0..GRID_SIZE {
            assert_eq!(row_letters(e.grid(), r), row_letters(&before, r));
        }
    }

    #[test]
    fn test_distant_and_same_cell_clicks_reselect() {
        let mut e = engine(QUIET);
        e.handle_click(pos(0, 0), ms(0));
        assert_eq!(e.handle_click(pos(0, 2), ms(0)), ClickOutcome::Selected(pos(0, 2)));
        assert_eq!(e.handle_click(pos(0, 2), ms(0)), ClickOutcome::Selected(pos(0, 2)));
        assert_eq!(e.selection(), Some(pos(0, 2)));
    }

    #[test]
    fn test_inactive_and_out_of_bounds_clicks_are_ignored() {
        let mut grid = grid_from_rows(QUIET);
        grid.deactivate(&[pos(3, 3)].into_iter().collect());
        let mut e = MatchEngine::with_grid(grid, ColorCycle::new(REFILL), Timings::default());
        assert_eq!(e.handle_click(pos(3, 3), ms(0)), ClickOutcome::Ignored);
        assert_eq!(e.handle_click(pos(GRID_SIZE, 0), ms(0)), ClickOutcome::Ignored);
        assert_eq!(e.selection(), None);

        e.handle_click(pos(3, 2), ms(0));
        assert_eq!(e.handle_click(pos(3, 3), ms(0)), ClickOutcome::Ignored);
        assert_eq!(e.selection(), Some(pos(3, 2)));
    }

    #[test]
    fn test_adjacent_click_swaps_without_resolving_synchronously() {
        let mut rows = QUIET;
        rows[7] = "YPYYRBPG";
        let mut e = engine(rows);
        let a = *e.grid().get(pos(7, 0)).unwrap();
        let b = *e.grid().get(pos(7, 1)).unwrap();

        let outcome = click_pair(&mut e, pos(7, 0), pos(7, 1), ms(0));
        assert_eq!(outcome, ClickOutcome::Swapped(pos(7, 0), pos(7, 1)));
        assert_eq!(e.selection(), None);
        assert_eq!(e.phase(), Phase::Swapped);
        assert_eq!(*e.grid().get(pos(7, 0)).unwrap(), b);
        assert_eq!(*e.grid().get(pos(7, 1)).unwrap(), a);
        // run exists but nothing has been evaluated yet
        assert_eq!(e.grid().find_matches().len(), 3);
        assert!(e.grid().is_settled());
        assert_eq!(e.combo(), 0);
        assert!(e.drain_events().is_empty());

        e.tick(ms(299));
        assert_eq!(e.phase(), Phase::Swapped);
    }

    #[test]
    fn test_single_match_timeline() {
        let mut rows = QUIET;
        rows[7] = "YPYYRBPG";
        let mut e = engine(rows);
        click_pair(&mut e, pos(7, 0), pos(7, 1), ms(0));

        e.tick(ms(300));
        assert_eq!(e.phase(), Phase::Clearing);
        assert_eq!(e.combo(), 1);
        assert_eq!(e.score(), 0);
        for c in 1..=3 {
            assert!(e.grid().get(pos(7, c)).unwrap().clearing);
        }
        assert!(!e.grid().get(pos(7, 0)).unwrap().clearing);

        e.tick(ms(599));
        assert_eq!(e.phase(), Phase::Clearing);
        e.tick(ms(600));
        assert_eq!(e.phase(), Phase::Settling);
        assert_eq!(e.score(), 30);
        assert!(e.grid().is_settled());

        e.tick(ms(1000));
        assert_eq!(e.phase(), Phase::Idle);
        assert_eq!(e.combo(), 0);
        assert_eq!(e.score(), 30);

        let events = e.drain_events();
        assert_eq!(
            events,
            vec![
                EngineEvent::ComboChanged(1),
                EngineEvent::Cleared {
                    cells: vec![pos(7, 1), pos(7, 2), pos(7, 3)],
                    points: 30,
                    combo: 1,
                },
                EngineEvent::ScoreChanged(30),
                EngineEvent::ComboChanged(0),
                EngineEvent::Settled,
            ]
        );
    }

    #[test]
    fn test_run_of_four_scores_forty() {
        let mut rows = QUIET;
        rows[6] = "GYYBPGYR";
        rows[7] = "YYPYRBPG";
        let mut e = engine(rows);
        click_pair(&mut e, pos(6, 2), pos(7, 2), ms(0));
        settle(&mut e, ms(0));
        assert_eq!(e.score(), 40);
        let cleared: Vec<usize> = e
            .drain_events()
            .iter()
            .filter_map(|ev| match ev {
                EngineEvent::Cleared { cells, .. } => Some(cells.len()),
                _ => None,
            })
            .collect();
        assert_eq!(cleared, vec![4]);
    }

    /// Clearing row 7 cols 0..=2 drops `Y` from (6,2) next to the `YY` at (7,3..=4).
    const CASCADE: [&str; GRID_SIZE] = [
        "RBPGYRBP", "GYRBPGYR", "BPGYRBPG", "YRBPGYRB", "PGYRBPGY", "RBPGYRBP", "RPYBPGYR",
        "GRRYYBPG",
    ];

    #[test]
    fn test_cascade_accumulates_combo() {
        let mut e = engine(CASCADE);
        assert!(e.grid().find_matches().is_empty());
        click_pair(&mut e, pos(6, 0), pos(7, 0), ms(0));

        e.tick(ms(600));
        assert_eq!((e.combo(), e.score()), (1, 30));
        assert_eq!(e.phase(), Phase::Settling);
        assert_eq!(&row_letters(e.grid(), 7)[..5], "GPYYY");

        e.tick(ms(1000));
        assert_eq!(e.combo(), 2);
        assert_eq!(e.phase(), Phase::Clearing);
        e.tick(ms(1300));
        assert_eq!(e.score(), 30 + 60);

        e.tick(ms(1700));
        assert_eq!(e.phase(), Phase::Idle);
        assert_eq!(e.combo(), 0);
        assert!(e.grid().find_matches().is_empty());
        assert_eq!(combo_events(&e.drain_events()), vec![1, 2, 0]);
    }

    #[test]
    fn test_late_tick_replays_the_whole_chain() {
        let mut e = engine(CASCADE);
        click_pair(&mut e, pos(6, 0), pos(7, 0), ms(0));
        e.tick(Duration::from_secs(60));
        assert_eq!(e.phase(), Phase::Idle);
        assert_eq!(e.score(), 90);
    }

    #[test]
    fn test_instant_timings_resolve_in_one_tick() {
        let mut e = MatchEngine::with_grid(
            grid_from_rows(CASCADE),
            ColorCycle::new(REFILL),
            Timings::instant(),
        );
        click_pair(&mut e, pos(6, 0), pos(7, 0), ms(5));
        e.tick(ms(5));
        assert_eq!(e.phase(), Phase::Idle);
        assert_eq!(e.score(), 90);
    }

    #[test]
    fn test_swap_breaking_a_run_resets_combo_and_scores_nothing() {
        let mut rows = QUIET;
        rows[3] = "RGGBYYYP";
        let mut e = engine(rows);
        click_pair(&mut e, pos(3, 4), pos(3, 3), ms(0));
        assert_eq!(row_letters(e.grid(), 3), "RGGYBYYP");
        settle(&mut e, ms(0));
        assert_eq!((e.combo(), e.score()), (0, 0));
        assert_eq!(e.drain_events(), vec![EngineEvent::Settled]);
    }

    #[test]
    fn test_detection_runs_on_whole_board_after_swap() {
        // the swap itself forms nothing, but the untouched YYY still clears
        let mut rows = QUIET;
        rows[3] = "RGBBYYYP";
        let mut e = engine(rows);
        click_pair(&mut e, pos(3, 2), pos(3, 1), ms(0));
        assert_eq!(row_letters(e.grid(), 3), "RBGBYYYP");
        settle(&mut e, ms(0));
        assert_eq!(e.score(), 30);
    }

    #[test]
    fn test_same_colour_swap_still_rechecks_board() {
        let mut rows = QUIET;
        rows[3] = "RGBBYYYP";
        let mut e = engine(rows);
        let left = e.grid().get(pos(3, 4)).unwrap().id;
        click_pair(&mut e, pos(3, 4), pos(3, 5), ms(0));
        assert_eq!(e.grid().get(pos(3, 5)).unwrap().id, left);
        assert_eq!(row_letters(e.grid(), 3), "RGBBYYYP");
        settle(&mut e, ms(0));
        assert_eq!(e.score(), 30);
    }

    #[test]
    fn test_clicks_ignored_while_resolving() {
        let mut e = engine(CASCADE);
        click_pair(&mut e, pos(6, 0), pos(7, 0), ms(0));
        let snapshot = e.grid().clone();
        assert_eq!(e.handle_click(pos(0, 0), ms(10)), ClickOutcome::Ignored);
        assert_eq!(e.selection(), None);
        assert!(!e.swap(pos(0, 0), pos(0, 1), ms(10)));
        for r in 0..GRID_SIZE {
            assert_eq!(row_letters(e.grid(), r), row_letters(&snapshot, r));
        }
    }

    #[test]
    fn test_restart_cancels_chain_and_zeroes_counters() {
        let mut e = engine(CASCADE);
        click_pair(&mut e, pos(6, 0), pos(7, 0), ms(0));
        e.tick(ms(600));
        assert_eq!(e.score(), 30);
        e.restart();
        assert_eq!((e.score(), e.combo(), e.phase()), (0, 0, Phase::Idle));
        assert_eq!(e.next_due(), None);
        let before = e.grid().clone();
        e.tick(Duration::from_secs(60));
        for r in 0..GRID_SIZE {
            assert_eq!(row_letters(e.grid(), r), row_letters(&before, r));
        }
        let events = e.drain_events();
        assert!(events.contains(&EngineEvent::ScoreChanged(0)));
        assert!(events.contains(&EngineEvent::ComboChanged(0)));
    }

    fn adjacent_pair() -> impl Strategy<Value = (Position, Position)> {
        (0..GRID_SIZE, 0..GRID_SIZE, any::<bool>()).prop_map(|(r, c, vertical)| {
            if vertical {
                let r = r.min(GRID_SIZE - 2);
                (pos(r, c), pos(r + 1, c))
            } else {
                let c = c.min(GRID_SIZE - 2);
                (pos(r, c), pos(r, c + 1))
            }
        })
    }

    proptest! {
        #[test]
        fn prop_swap_exchanges_only_two_cells(seed in any::<u64>(), (a, b) in adjacent_pair()) {
            let mut e = MatchEngine::new(SeededColors::new(seed), Timings::default());
            let before = e.grid().clone();
            click_pair(&mut e, a, b, ms(0));
            for (p, block) in e.grid().blocks() {
                let expected = if p == a { b } else if p == b { a } else { p };
                prop_assert_eq!(block, before.get(expected).unwrap());
            }
        }

        #[test]
        fn prop_completed_chains_leave_a_settled_board(
            seed in any::<u64>(),
            moves in proptest::collection::vec(adjacent_pair(), 1..8),
        ) {
            let mut e = MatchEngine::new(SeededColors::new(seed), Timings::default());
            let mut now = ms(0);
            let mut last_score = 0;
            for (a, b) in moves {
                click_pair(&mut e, a, b, now);
                now = settle(&mut e, now);
                prop_assert!(e.grid().is_settled());
                prop_assert!(e.grid().find_matches().is_empty());
                prop_assert_eq!(e.combo(), 0);
                prop_assert!(e.score() >= last_score);
                prop_assert_eq!(e.score() % POINTS_PER_BLOCK, 0);
                last_score = e.score();
                let ids: HashSet<BlockId> = e.grid().blocks().map(|(_, b)| b.id).collect();
                prop_assert_eq!(ids.len(), GRID_SIZE * GRID_SIZE);
            }
        }
    }
}
