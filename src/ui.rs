//! Layout and drawing: board, sidebar, score popups, pause and quit overlays.

use crate::app::{QuitOption, ScorePopup, Screen};
use crate::board::{GRID_SIZE, Grid, Position};
use crate::engine::Phase;
use crate::theme::Theme;
use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Position as ScreenPos, Rect};
use ratatui::style::{Color, Style, Stylize};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Widget};
use std::collections::HashSet;
use std::time::Instant;
use tachyonfx::{
    CellFilter, Duration as TfxDuration, Effect, EffectRenderer, Interpolation, fx, ref_count,
};

/// Terminal cells per block.
const CELL_WIDTH: u16 = 4;
const CELL_HEIGHT: u16 = 2;
/// Board size in terminal cells including the border.
const BOARD_WIDTH: u16 = GRID_SIZE as u16 * CELL_WIDTH + 2;
const BOARD_HEIGHT: u16 = GRID_SIZE as u16 * CELL_HEIGHT + 2;
const SIDEBAR_WIDTH: u16 = 26;

/// Everything the renderer reads from one frame of game state.
pub struct View<'a> {
    pub screen: Screen,
    pub grid: &'a Grid,
    pub selection: Option<Position>,
    pub cursor: Position,
    pub phase: Phase,
    pub score: u32,
    pub combo: u32,
    pub best: u32,
    pub new_record: bool,
    pub paused: bool,
    pub popups: &'a [ScorePopup],
    pub quit_selected: QuitOption,
    pub theme: &'a Theme,
}

/// Board rect and sidebar rect, centred in `area`.
fn game_areas(area: Rect) -> (Rect, Rect) {
    let total_w = BOARD_WIDTH + SIDEBAR_WIDTH;
    let horiz = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(total_w),
            Constraint::Fill(1),
        ])
        .split(area);
    let vert = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(BOARD_HEIGHT),
            Constraint::Fill(1),
        ])
        .split(horiz[1]);
    let inner = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(BOARD_WIDTH),
            Constraint::Length(SIDEBAR_WIDTH),
        ])
        .split(vert[1]);
    (inner[0], inner[1])
}

/// Board inner rect (no border).
fn board_inner(area: Rect) -> Rect {
    let (board, _) = game_areas(area);
    Block::default().borders(Borders::ALL).inner(board)
}

fn cell_rect(inner: Rect, pos: Position) -> Rect {
    Rect {
        x: inner.x + pos.col as u16 * CELL_WIDTH,
        y: inner.y + pos.row as u16 * CELL_HEIGHT,
        width: CELL_WIDTH,
        height: CELL_HEIGHT,
    }
    .intersection(inner)
}

/// Grid cell under a terminal coordinate (mouse hit test).
pub fn cell_at(area: Rect, column: u16, row: u16) -> Option<Position> {
    let inner = board_inner(area);
    if !inner.contains(ScreenPos::new(column, row)) {
        return None;
    }
    let pos = Position::new(
        ((row - inner.y) / CELL_HEIGHT) as usize,
        ((column - inner.x) / CELL_WIDTH) as usize,
    );
    pos.in_bounds().then_some(pos)
}

/// Draw the current screen. While blocks are clearing (and animation is on) a
/// TachyonFX fade runs over them; `clear_effect` keeps it alive across frames.
pub fn draw(
    frame: &mut Frame,
    view: &View,
    clear_effect: &mut Option<Effect>,
    clear_effect_process_time: &mut Option<Instant>,
    fade_ms: Option<u32>,
    now: Instant,
) {
    let area = frame.area();
    let (board_area, sidebar_area) = game_areas(area);
    draw_board(frame, view, board_area);
    draw_sidebar(frame, view, sidebar_area);
    if let Some(fade_ms) = fade_ms.filter(|_| view.phase == Phase::Clearing) {
        apply_clear_effect(
            frame,
            view,
            area,
            clear_effect,
            clear_effect_process_time,
            fade_ms,
            now,
        );
    }
    if view.paused && view.screen == Screen::Playing {
        draw_pause_overlay(frame, view.theme, area);
    }
    if view.screen == Screen::QuitMenu {
        draw_quit_menu(frame, view.theme, view.quit_selected);
    }
}

fn draw_board(frame: &mut Frame, view: &View, area: Rect) {
    let theme = view.theme;
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.div_line).bg(theme.bg))
        .title(Span::styled(" Block Blast ", Style::default().fg(theme.title).bold()));
    let inner = block.inner(area);
    block.render(area, frame.buffer_mut());

    let buf = frame.buffer_mut();
    for y in inner.top()..inner.bottom() {
        for x in inner.left()..inner.right() {
            buf[(x, y)].set_symbol(" ").set_style(Style::default().bg(theme.bg));
        }
    }

    for (pos, b) in view.grid.blocks() {
        let rect = cell_rect(inner, pos);
        if rect.is_empty() {
            continue;
        }
        let color = if !b.active {
            theme.bg
        } else if b.clearing {
            theme.highlight
        } else {
            theme.block_color(b.color)
        };
        // Face on the top row, half-block lip below; the last column is the gap.
        let face_w = rect.width.min(CELL_WIDTH - 1);
        for dx in 0..face_w {
            let x = rect.x + dx;
            buf[(x, rect.y)]
                .set_symbol(" ")
                .set_style(Style::default().bg(color));
            if rect.height > 1 {
                buf[(x, rect.y + 1)]
                    .set_symbol("▀")
                    .set_style(Style::default().fg(color).bg(theme.bg));
            }
        }
        let marker = if view.selection == Some(pos) {
            Some("◆")
        } else if view.cursor == pos && view.screen == Screen::Playing {
            Some("○")
        } else {
            None
        };
        if let Some(marker) = marker.filter(|_| face_w > 1) {
            buf[(rect.x + 1, rect.y)]
                .set_symbol(marker)
                .set_style(Style::default().fg(theme.highlight).bg(color).bold());
        }
    }

    for popup in view.popups {
        let rect = cell_rect(inner, popup.cell);
        let y = rect.y.saturating_sub(popup.rise());
        if rect.is_empty() || y < inner.y {
            continue;
        }
        let label = if popup.multiplier > 1 {
            format!("+{} (x{})", popup.amount, popup.multiplier)
        } else {
            format!("+{}", popup.amount)
        };
        let width = inner.right().saturating_sub(rect.x) as usize;
        buf.set_stringn(
            rect.x,
            y,
            label,
            width,
            Style::default().fg(theme.title).bg(theme.bg).bold(),
        );
    }
}

fn draw_sidebar(frame: &mut Frame, view: &View, area: Rect) {
    let theme = view.theme;
    let title_style = Style::default().fg(theme.title);
    let fg_style = Style::default().fg(theme.main_fg);
    let dim_style = Style::default().fg(theme.inactive_fg);
    let border_style = Style::default().fg(theme.div_line).bg(theme.bg);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(6), // Stats (border + score, combo, best, status)
            Constraint::Length(1), // gap
            Constraint::Length(3), // Colours
            Constraint::Length(1), // gap
            Constraint::Fill(1),   // Controls
        ])
        .split(area);

    // --- Stats ---
    let stats_block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style)
        .title(Span::styled(" Stats ", title_style));
    let stats_inner = stats_block.inner(chunks[0]);
    stats_block.render(chunks[0], frame.buffer_mut());
    let combo_span = if view.combo > 0 {
        Span::styled(format!("x{}", view.combo), Style::default().fg(theme.title).bold())
    } else {
        Span::styled("-", dim_style)
    };
    let mut best_line = vec![
        Span::styled("Best:  ", title_style),
        Span::styled(view.best.to_string(), fg_style),
    ];
    if view.new_record {
        best_line.push(Span::styled(" new!", Style::default().fg(Color::Yellow).bold()));
    }
    let status = if view.paused {
        Span::styled("paused", dim_style)
    } else if view.phase != Phase::Idle {
        Span::styled("resolving", dim_style)
    } else {
        Span::styled("your move", dim_style)
    };
    let stats_lines = vec![
        Line::from(vec![
            Span::styled("Score: ", title_style),
            Span::styled(view.score.to_string(), fg_style),
        ]),
        Line::from(vec![Span::styled("Combo: ", title_style), combo_span]),
        Line::from(best_line),
        Line::from(status),
    ];
    Paragraph::new(Text::from(stats_lines)).render(stats_inner, frame.buffer_mut());

    // --- Colours ---
    let colours_block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style);
    let colours_inner = colours_block.inner(chunks[2]);
    colours_block.render(chunks[2], frame.buffer_mut());
    draw_colour_strip(frame, theme, colours_inner);

    // --- Controls ---
    let help_block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style)
        .title(Span::styled(" Controls ", title_style));
    let help_inner = help_block.inner(chunks[4]);
    help_block.render(chunks[4], frame.buffer_mut());
    let key = Style::default().fg(theme.blocks[3]);
    let help = vec![
        Line::from(vec![Span::styled("←↑↓→ hjkl ", key), Span::styled("move", dim_style)]),
        Line::from(vec![Span::styled("Space     ", key), Span::styled("pick/swap", dim_style)]),
        Line::from(vec![Span::styled("Mouse     ", key), Span::styled("pick/swap", dim_style)]),
        Line::from(vec![Span::styled("P         ", key), Span::styled("pause", dim_style)]),
        Line::from(vec![Span::styled("R         ", key), Span::styled("restart", dim_style)]),
        Line::from(vec![Span::styled("Q         ", key), Span::styled("quit", dim_style)]),
    ];
    Paragraph::new(Text::from(help)).render(help_inner, frame.buffer_mut());
}

/// One swatch per block colour.
fn draw_colour_strip(frame: &mut Frame, theme: &Theme, area: Rect) {
    let count = theme.blocks.len() as u16;
    let block_w = (area.width / count).max(1);
    for (i, c) in theme.blocks.iter().enumerate() {
        let r = Rect {
            x: area.x + (i as u16) * block_w,
            y: area.y,
            width: block_w.saturating_sub(1).max(1),
            height: area.height.min(1),
        }
        .intersection(area);
        Paragraph::new("█".repeat(r.width as usize))
            .style(Style::default().fg(*c).bg(theme.bg))
            .render(r, frame.buffer_mut());
    }
}

/// Buffer positions covered by clearing blocks.
fn clearing_buffer_positions(inner: Rect, grid: &Grid) -> HashSet<(u16, u16)> {
    let mut set = HashSet::new();
    for (pos, b) in grid.blocks() {
        if !b.clearing {
            continue;
        }
        let r = cell_rect(inner, pos);
        for x in r.left()..r.right() {
            for y in r.top()..r.bottom() {
                set.insert((x, y));
            }
        }
    }
    set
}

/// Create or update the clear fade effect and process it.
fn apply_clear_effect(
    frame: &mut Frame,
    view: &View,
    area: Rect,
    clear_effect: &mut Option<Effect>,
    clear_effect_process_time: &mut Option<Instant>,
    fade_ms: u32,
    now: Instant,
) {
    let inner = board_inner(area);
    let delta = clear_effect_process_time
        .map(|t| now.saturating_duration_since(t))
        .unwrap_or(std::time::Duration::ZERO);
    let delta_ms = delta.as_millis().min(u32::MAX as u128) as u32;
    let tfx_delta = TfxDuration::from_millis(delta_ms);
    *clear_effect_process_time = Some(now);

    if clear_effect.is_none() {
        let clearing_set = clearing_buffer_positions(inner, view.grid);
        let filter = CellFilter::PositionFn(ref_count(move |pos: ScreenPos| {
            clearing_set.contains(&(pos.x, pos.y))
        }));
        let bg = view.theme.bg;
        let effect = fx::fade_to(bg, bg, (fade_ms, Interpolation::Linear))
            .with_filter(filter)
            .with_area(inner);
        *clear_effect = Some(effect);
    }

    if let Some(effect) = clear_effect {
        frame.render_effect(effect, inner, tfx_delta);
    }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    Rect {
        x: area.x + area.width.saturating_sub(width) / 2,
        y: area.y + area.height.saturating_sub(height) / 2,
        width: width.min(area.width),
        height: height.min(area.height),
    }
}

fn draw_pause_overlay(frame: &mut Frame, theme: &Theme, area: Rect) {
    let popup = centered(area, 28, 5);
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            " Paused ",
            Style::default().fg(Color::Black).bg(Color::Yellow),
        )),
        Line::from(""),
        Line::from(Span::styled(
            " P resume    Q quit ",
            Style::default().fg(theme.main_fg),
        )),
    ];
    Clear.render(popup, frame.buffer_mut());
    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.div_line).bg(theme.bg)),
        )
        .render(popup, frame.buffer_mut());
}

fn draw_quit_menu(frame: &mut Frame, theme: &Theme, selected: QuitOption) {
    let area = frame.area();
    let quit_rect = centered(area, 24, 8);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.title).bg(theme.bg))
        .title(" Quit? ");

    Clear.render(quit_rect, frame.buffer_mut());
    let inner = block.inner(quit_rect);
    block.render(quit_rect, frame.buffer_mut());

    let options = [
        (QuitOption::Resume, " Resume "),
        (QuitOption::Restart, " Restart "),
        (QuitOption::Exit, " Exit "),
    ];
    for (i, (opt, label)) in options.iter().enumerate() {
        let style = if *opt == selected {
            Style::default().fg(theme.bg).bg(theme.title).bold()
        } else {
            Style::default().fg(theme.title).bg(theme.bg)
        };
        let ry = inner.y + 1 + i as u16 * 2;
        if ry >= inner.bottom() {
            break;
        }
        let rx = inner.x + inner.width.saturating_sub(label.len() as u16) / 2;
        frame
            .buffer_mut()
            .set_stringn(rx, ry, label, inner.right().saturating_sub(rx) as usize, style);
    }
}
