//! Grid model: blocks, match detection, gravity and refill.

use crate::colors::ColorSource;
use std::collections::BTreeSet;

/// Side length of the square playfield.
pub const GRID_SIZE: usize = 8;

/// Shortest run that clears.
pub const RUN_LENGTH: usize = 3;

/// Number of block colours in the palette.
pub const PALETTE_SIZE: u8 = 5;

/// Cell coordinate. Row 0 is the top row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    pub const fn in_bounds(self) -> bool {
        self.row < GRID_SIZE && self.col < GRID_SIZE
    }

    /// 4-neighbourhood: exactly one axis differs, by exactly one.
    pub fn is_adjacent(self, other: Self) -> bool {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col) == 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u64);

/// Palette index in `0..PALETTE_SIZE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockColor(u8);

impl BlockColor {
    pub const fn new(index: u8) -> Self {
        Self(index % PALETTE_SIZE)
    }

    pub const fn index(self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub id: BlockId,
    pub color: BlockColor,
    /// False once matched and removed; only seen between clear and gravity.
    pub active: bool,
    /// Set between detection and removal (drives the clear flash).
    pub clearing: bool,
}

/// 8x8 row-major grid. Every cell always holds a block value.
#[derive(Debug, Clone)]
pub struct Grid {
    cells: [[Block; GRID_SIZE]; GRID_SIZE],
    next_id: u64,
}

impl Grid {
    /// Fill every cell with an independent random colour. No attempt is made to
    /// avoid initial runs.
    pub fn random(colors: &mut dyn ColorSource) -> Self {
        let mut next_id = 0u64;
        let cells = std::array::from_fn(|_| {
            std::array::from_fn(|_| {
                let block = Block {
                    id: BlockId(next_id),
                    color: colors.next_color(),
                    active: true,
                    clearing: false,
                };
                next_id += 1;
                block
            })
        });
        Self { cells, next_id }
    }

    /// Build a grid from fixed colours; ids are assigned row-major from 0.
    pub fn from_colors(colors: [[BlockColor; GRID_SIZE]; GRID_SIZE]) -> Self {
        let mut iter = colors.iter().flatten().copied();
        let mut fixed = FixedSequence(&mut iter);
        Self::random(&mut fixed)
    }

    #[inline]
    pub fn get(&self, pos: Position) -> Option<&Block> {
        self.cells.get(pos.row).and_then(|row| row.get(pos.col))
    }

    pub fn blocks(&self) -> impl Iterator<Item = (Position, &Block)> {
        self.cells.iter().enumerate().flat_map(|(row, cells)| {
            cells
                .iter()
                .enumerate()
                .map(move |(col, block)| (Position::new(row, col), block))
        })
    }

    /// Exchange the whole block records at `a` and `b`.
    pub fn swap(&mut self, a: Position, b: Position) {
        if !a.in_bounds() || !b.in_bounds() || a == b {
            return;
        }
        let tmp = self.cells[a.row][a.col];
        self.cells[a.row][a.col] = self.cells[b.row][b.col];
        self.cells[b.row][b.col] = tmp;
    }

    /// Every position covered by a run of `RUN_LENGTH` or more active blocks of one
    /// colour, horizontally or vertically. Overlapping windows collapse into one set.
    pub fn find_matches(&self) -> BTreeSet<Position> {
        let mut marked = BTreeSet::new();
        for row in 0..GRID_SIZE {
            for col in 0..=GRID_SIZE - RUN_LENGTH {
                let window: Vec<Position> =
                    (0..RUN_LENGTH).map(|i| Position::new(row, col + i)).collect();
                if self.is_run(&window) {
                    marked.extend(window);
                }
            }
        }
        for col in 0..GRID_SIZE {
            for row in 0..=GRID_SIZE - RUN_LENGTH {
                let window: Vec<Position> =
                    (0..RUN_LENGTH).map(|i| Position::new(row + i, col)).collect();
                if self.is_run(&window) {
                    marked.extend(window);
                }
            }
        }
        marked
    }

    fn is_run(&self, window: &[Position]) -> bool {
        let first = self.cells[window[0].row][window[0].col];
        first.active
            && window.iter().all(|p| {
                let b = self.cells[p.row][p.col];
                b.active && b.color == first.color
            })
    }

    pub fn mark_clearing(&mut self, positions: &BTreeSet<Position>) {
        for p in positions {
            self.cells[p.row][p.col].clearing = true;
        }
    }

    /// Logically remove blocks; their slots stay until `collapse`.
    pub fn deactivate(&mut self, positions: &BTreeSet<Position>) {
        for p in positions {
            let block = &mut self.cells[p.row][p.col];
            block.active = false;
            block.clearing = false;
        }
    }

    /// Gravity + refill. Each column keeps its active blocks in their original
    /// relative order at the bottom; vacated top slots get fresh blocks, filled top
    /// to bottom, columns left to right. Returns the number of blocks spawned.
    pub fn collapse(&mut self, colors: &mut dyn ColorSource) -> usize {
        let mut spawned = 0;
        for col in 0..GRID_SIZE {
            let survivors: Vec<Block> = (0..GRID_SIZE)
                .map(|row| self.cells[row][col])
                .filter(|b| b.active)
                .collect();
            let vacated = GRID_SIZE - survivors.len();
            for row in 0..vacated {
                self.cells[row][col] = self.spawn(colors);
            }
            for (offset, block) in survivors.into_iter().enumerate() {
                self.cells[vacated + offset][col] = block;
            }
            spawned += vacated;
        }
        assert!(
            self.is_settled(),
            "collapse left an inactive or clearing block behind"
        );
        spawned
    }

    fn spawn(&mut self, colors: &mut dyn ColorSource) -> Block {
        let id = BlockId(self.next_id);
        self.next_id += 1;
        Block {
            id,
            color: colors.next_color(),
            active: true,
            clearing: false,
        }
    }

    /// True when every block is active and none is marked for clearing.
    pub fn is_settled(&self) -> bool {
        self.blocks().all(|(_, b)| b.active && !b.clearing)
    }
}

/// Feeds a finite colour list into `Grid::random`.
struct FixedSequence<'a, I: Iterator<Item = BlockColor>>(&'a mut I);

impl<I: Iterator<Item = BlockColor>> ColorSource for FixedSequence<'_, I> {
    fn next_color(&mut self) -> BlockColor {
        self.0.next().unwrap_or(BlockColor::new(0))
    }
}
