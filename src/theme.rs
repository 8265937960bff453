//! Theme loading: btop-style `theme[key]="value"` and hex → ratatui Color.

use crate::board::{BlockColor, PALETTE_SIZE};
use ratatui::style::Color;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

const BLOCKS: usize = PALETTE_SIZE as usize;

/// Block colours plus UI colours loaded from a theme file.
#[derive(Debug, Clone)]
pub struct Theme {
    /// Block colours (index 0..5): violet, fuchsia, orange, sky, emerald.
    pub blocks: [Color; BLOCKS],
    /// Board background and empty cells.
    pub bg: Color,
    /// Grid / border.
    pub div_line: Color,
    /// Text (score, combo).
    pub main_fg: Color,
    /// Highlight / titles.
    pub title: Color,
    /// Secondary text (help lines, idle combo).
    pub inactive_fg: Color,
    /// Selection ring and clear flash.
    pub highlight: Color,
}

#[derive(Debug, Error)]
pub enum ThemeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

impl Default for Theme {
    fn default() -> Self {
        Self::block_blast_default()
    }
}

const fn rgb(hex: u32) -> Color {
    Color::Rgb((hex >> 16) as u8, (hex >> 8) as u8, hex as u8)
}

const DEFAULT_BLOCKS: [Color; BLOCKS] = [
    rgb(0x8B5CF6),
    rgb(0xD946EF),
    rgb(0xF97316),
    rgb(0x0EA5E9),
    rgb(0x10B981),
];

impl Theme {
    /// Block Blast palette on One Dark UI colours.
    pub fn block_blast_default() -> Self {
        Self {
            blocks: DEFAULT_BLOCKS,
            bg: rgb(0x282C34),
            div_line: rgb(0x3F444F),
            main_fg: rgb(0xABB2BF),
            title: rgb(0xE5C07B),
            inactive_fg: rgb(0x5C6370),
            highlight: rgb(0xFFFFFF),
        }
    }

    /// Load theme from a btop-style file: `theme[key]="value"` or `theme[key]='value'`.
    /// Falls back to defaults if path is None or the file is missing.
    /// `palette` then overrides block colours for accessibility.
    pub fn load(path: Option<&Path>, palette: crate::Palette) -> Result<Self, ThemeError> {
        let path = match path {
            Some(p) if p.exists() => p,
            _ => return Ok(Self::default_for_palette(palette)),
        };
        let s = std::fs::read_to_string(path)?;
        let map = parse_theme_file(&s);
        let mut theme = Self::from_map(&map);
        theme.apply_palette(palette);
        Ok(theme)
    }

    fn default_for_palette(palette: crate::Palette) -> Self {
        let mut t = Self::block_blast_default();
        t.apply_palette(palette);
        t
    }

    pub fn apply_palette(&mut self, palette: crate::Palette) {
        match palette {
            crate::Palette::Normal => {}
            crate::Palette::HighContrast => {
                self.blocks = [
                    rgb(0xFF00FF), // magenta
                    rgb(0xFFFF00), // yellow
                    rgb(0xFF0000), // red
                    rgb(0x0088FF), // blue
                    rgb(0x00FF00), // green
                ];
            }
            crate::Palette::Colorblind => {
                // Tol's bright scheme minus the red/green pair
                self.blocks = [
                    rgb(0x0077BB), // blue
                    rgb(0xEE7733), // orange
                    rgb(0x009988), // teal
                    rgb(0xEE3377), // magenta
                    rgb(0xBBBB00), // yellow
                ];
            }
        }
    }

    fn from_map(map: &HashMap<String, String>) -> Self {
        let get = |key: &str| {
            map.get(key)
                .and_then(|v| parse_hex(v.trim_matches('"').trim_matches('\'').trim()).ok())
        };
        let d = Self::block_blast_default();
        Self {
            blocks: [
                get("net_box").unwrap_or(d.blocks[0]),
                get("proc_box").or_else(|| get("hi_fg")).unwrap_or(d.blocks[1]),
                get("cpu_end").or_else(|| get("temp_end")).unwrap_or(d.blocks[2]),
                get("cpu_box").unwrap_or(d.blocks[3]),
                get("mem_box").or_else(|| get("cpu_start")).unwrap_or(d.blocks[4]),
            ],
            bg: get("main_bg").or_else(|| get("meter_bg")).unwrap_or(d.bg),
            div_line: get("div_line").unwrap_or(d.div_line),
            main_fg: get("main_fg").unwrap_or(d.main_fg),
            title: get("title").unwrap_or(d.title),
            inactive_fg: get("inactive_fg").unwrap_or(d.inactive_fg),
            highlight: get("selected_fg").unwrap_or(d.highlight),
        }
    }

    #[inline]
    pub fn block_color(&self, color: BlockColor) -> Color {
        self.blocks[color.index() as usize % BLOCKS]
    }
}

/// Parse btop-style theme file into key -> value map.
fn parse_theme_file(s: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in s.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(stripped) = line.strip_prefix("theme[") {
            if let Some(end) = stripped.find(']') {
                let key = stripped[..end].trim();
                let rest = stripped[end + 1..].trim();
                if let Some(eq) = rest.find('=') {
                    let value = rest[eq + 1..]
                        .trim()
                        .trim_matches('"')
                        .trim_matches('\'')
                        .to_string();
                    if !value.is_empty() {
                        map.insert(key.to_string(), value);
                    }
                }
            }
        }
    }
    map
}

/// Parse hex colour "#RRGGBB" or "#RGB" into ratatui Color.
pub fn parse_hex(s: &str) -> Result<Color, ThemeError> {
    let s = s.trim().trim_start_matches('#');
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&s[range], 16).map_err(|_| ThemeError::InvalidHex(s.to_string()))
    };
    if !s.is_ascii() {
        return Err(ThemeError::InvalidHex(s.to_string()));
    }
    let (r, g, b) = match s.len() {
        6 => (channel(0..2)?, channel(2..4)?, channel(4..6)?),
        3 => (
            channel(0..1)? * 17,
            channel(1..2)? * 17,
            channel(2..3)? * 17,
        ),
        _ => return Err(ThemeError::InvalidHex(s.to_string())),
    };
    Ok(Color::Rgb(r, g, b))
}
