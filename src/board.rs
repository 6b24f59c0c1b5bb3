//! Board model: colors, coordinates and the N×N grid of cells.
//!
//! The board is plain data. It knows how to read, write and copy cells, how
//! to enumerate orthogonal neighbors, and how to describe itself as text;
//! every rule lives in [`crate::rules`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{COLUMN_LETTERS, N};

/// Stone color. Black (the host in networked play) always moves first.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Black,
    White,
}

impl Color {
    pub fn opponent(self) -> Self {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }

    /// Single-character marker used in text renderings of the board.
    pub fn marker(self) -> char {
        match self {
            Color::Black => 'B',
            Color::White => 'W',
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Black => f.write_str("black"),
            Color::White => f.write_str("white"),
        }
    }
}

/// Content of one intersection.
pub type Cell = Option<Color>;

/// A board coordinate. Row 0 is the top edge, column 0 the left edge.
///
/// Serialized as `{"r": row, "c": col}`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coord {
    #[serde(rename = "r")]
    pub row: usize,
    #[serde(rename = "c")]
    pub col: usize,
}

impl Coord {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    pub fn is_on_board(self) -> bool {
        self.row < N && self.col < N
    }

    /// Parse a human coordinate.
    ///
    /// Accepts the letter-number form (`"D4"`, `"j9"`), where columns run
    /// A-J skipping I and row 1 is the bottom edge, and the raw `"row,col"`
    /// form (`"4,4"`). Returns `None` for anything off the board.
    pub fn parse(s: &str) -> Option<Coord> {
        let s = s.trim();
        if let Some((r, c)) = s.split_once(',') {
            let coord = Coord::new(r.trim().parse().ok()?, c.trim().parse().ok()?);
            return coord.is_on_board().then_some(coord);
        }

        let mut chars = s.chars();
        let letter = chars.next()?.to_ascii_uppercase();
        let col = COLUMN_LETTERS[..N]
            .iter()
            .position(|&b| b as char == letter)?;
        let number: usize = chars.as_str().parse().ok()?;
        if number == 0 || number > N {
            return None;
        }
        Some(Coord::new(N - number, col))
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match COLUMN_LETTERS.get(self.col) {
            Some(&letter) if self.is_on_board() => {
                write!(f, "{}{}", letter as char, N - self.row)
            }
            _ => write!(f, "({},{})", self.row, self.col),
        }
    }
}

/// The N×N grid.
///
/// Serialized as an array of N rows, each an array of N cells
/// (`"black"`, `"white"` or `null`). A payload of any other shape fails to
/// deserialize, so a decoded board always has valid dimensions.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board {
    cells: [[Cell; N]; N],
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    /// An empty board.
    pub fn new() -> Self {
        Self {
            cells: [[None; N]; N],
        }
    }

    /// Cell content at `at`.
    ///
    /// # Panics
    /// If `at` is off the board.
    pub fn get(&self, at: Coord) -> Cell {
        self.cells[at.row][at.col]
    }

    /// # Panics
    /// If `at` is off the board.
    pub fn set(&mut self, at: Coord, cell: Cell) {
        self.cells[at.row][at.col] = cell;
    }

    /// Orthogonal neighbors of `at` that lie on the board, in the fixed
    /// order up, down, left, right.
    pub fn neighbors(at: Coord) -> impl Iterator<Item = Coord> {
        let up = at.row.checked_sub(1).map(|r| Coord::new(r, at.col));
        let down = (at.row + 1 < N).then(|| Coord::new(at.row + 1, at.col));
        let left = at.col.checked_sub(1).map(|c| Coord::new(at.row, c));
        let right = (at.col + 1 < N).then(|| Coord::new(at.row, at.col + 1));
        [up, down, left, right].into_iter().flatten()
    }

    /// Number of stones of `color` on the board.
    pub fn count(&self, color: Color) -> usize {
        self.cells
            .iter()
            .flatten()
            .filter(|&&cell| cell == Some(color))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().flatten().all(Option::is_none)
    }

    /// Content-derived digest of the position: one marker per cell, row-major.
    ///
    /// Two boards have equal digests exactly when every cell matches.
    pub fn digest(&self) -> String {
        self.cells
            .iter()
            .flatten()
            .map(|cell| cell.map_or('.', Color::marker))
            .collect()
    }
}

impl fmt::Display for Board {
    /// Marker grid, one row per line, cells separated by single spaces.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (r, row) in self.cells.iter().enumerate() {
            if r > 0 {
                writeln!(f)?;
            }
            for (c, cell) in row.iter().enumerate() {
                if c > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{}", cell.map_or('.', Color::marker))?;
            }
        }
        Ok(())
    }
}
