//! Game state and the state machine that owns it.
//!
//! A [`GameState`] is an immutable snapshot: each accepted move produces a
//! fresh one. [`GameMachine`] holds the current snapshot for a process and
//! is the only thing that replaces it.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::board::{Board, Color, Coord};
use crate::rules::{self, MoveError};

/// Stones captured by each color so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Captures {
    pub black: u32,
    pub white: u32,
}

impl Captures {
    /// Captures made by `color`.
    pub fn by(&self, color: Color) -> u32 {
        match color {
            Color::Black => self.black,
            Color::White => self.white,
        }
    }

    /// Credit `color` with `stones` captures. Saturates, since tallies
    /// adopted from a peer can be arbitrary.
    pub fn add(&mut self, color: Color, stones: u32) {
        let tally = match color {
            Color::Black => &mut self.black,
            Color::White => &mut self.white,
        };
        *tally = tally.saturating_add(stones);
    }
}

/// Outcome of a finished game. Normal play never produces one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    Black,
    White,
    Draw,
}

/// Authoritative snapshot held by each process and exchanged between peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub board: Board,
    pub current_turn: Color,
    pub captures: Captures,
    /// Digests of the positions recent moves were played on, oldest first.
    /// Bounded by [`HISTORY_CAPACITY`](crate::constants::HISTORY_CAPACITY).
    pub history: Vec<String>,
    pub game_over: bool,
    pub winner: Option<Winner>,
    /// Most recently placed stone, for highlighting only.
    pub last_move: Option<Coord>,
}

impl Default for GameState {
    fn default() -> Self {
        Self::initial()
    }
}

impl GameState {
    /// Empty board, black to move, no captures, empty history.
    pub fn initial() -> Self {
        Self {
            board: Board::new(),
            current_turn: Color::Black,
            captures: Captures::default(),
            history: Vec::new(),
            game_over: false,
            winner: None,
            last_move: None,
        }
    }
}

/// Holds the current [`GameState`] and replaces it on accepted moves.
#[derive(Debug, Clone, Default)]
pub struct GameMachine {
    state: GameState,
}

impl GameMachine {
    pub fn new() -> Self {
        Self {
            state: GameState::initial(),
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Validate a move for the side to move and, if legal, make the
    /// resulting state current. On rejection the held state is untouched.
    pub fn attempt_move(&mut self, at: Coord) -> Result<&GameState, MoveError> {
        let color = self.state.current_turn;
        match rules::attempt_move(&self.state, at) {
            Ok(next) => {
                debug!(%at, %color, "Move accepted");
                self.state = next;
                Ok(&self.state)
            }
            Err(e) => {
                debug!(%at, %color, reason = %e, "Move rejected");
                Err(e)
            }
        }
    }

    /// Make `state` current without validation.
    pub fn adopt(&mut self, state: GameState) {
        self.state = state;
    }

    /// Replace the held state with a fresh initial state.
    pub fn reset(&mut self) -> &GameState {
        info!("Resetting game");
        self.state = GameState::initial();
        &self.state
    }
}
