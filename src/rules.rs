//! Rule engine: groups, liberties, captures, suicide and simple ko.
//!
//! Everything here is a pure function of its inputs. [`attempt_move`] never
//! touches the state it is given; it returns either the next state or the
//! reason the move is illegal.

use std::collections::BTreeSet;

use derive_more::{Display, Error};

use crate::board::{Board, Coord};
use crate::constants::{HISTORY_RETAINED, N};
use crate::game::GameState;

/// Why a move was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum MoveError {
    #[display("game already concluded")]
    GameOver,
    #[display("coordinate off the board")]
    OffBoard,
    #[display("cell occupied")]
    Occupied,
    #[display("suicide move prohibited")]
    Suicide,
    #[display("repetition rule violation")]
    Repetition,
}

/// A group of connected same-colored stones together with its liberties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group {
    /// Stones in the group, in traversal order starting from the origin.
    pub stones: Vec<Coord>,
    /// Distinct empty points orthogonally adjacent to any stone of the group.
    pub liberties: BTreeSet<Coord>,
}

impl Group {
    pub fn len(&self) -> usize {
        self.stones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stones.is_empty()
    }

    pub fn is_captured(&self) -> bool {
        !self.stones.is_empty() && self.liberties.is_empty()
    }
}

/// Find the group containing `origin` and its liberties.
///
/// Depth-first flood fill over an explicit stack, visiting neighbors in the
/// order up, down, left, right. An empty origin yields an empty group.
pub fn group_and_liberties(board: &Board, origin: Coord) -> Group {
    let Some(color) = board.get(origin) else {
        return Group::default();
    };

    let mut group = Group::default();
    let mut visited = [[false; N]; N];
    let mut stack = vec![origin];

    while let Some(pt) = stack.pop() {
        if visited[pt.row][pt.col] {
            continue;
        }
        visited[pt.row][pt.col] = true;
        group.stones.push(pt);

        let neighbors: Vec<Coord> = Board::neighbors(pt).collect();
        // Reversed so the stack pops them in up, down, left, right order.
        for n in neighbors.into_iter().rev() {
            match board.get(n) {
                None => {
                    group.liberties.insert(n);
                }
                Some(c) if c == color && !visited[n.row][n.col] => stack.push(n),
                _ => {}
            }
        }
    }
    group
}

/// Try to play the side to move at `at`.
///
/// Checks run in a fixed order: game over, bounds, occupancy, then the stone
/// is placed on a copy, adjacent opponent groups left without liberties are
/// removed, and only then are suicide and simple ko tested against the
/// resulting position.
///
/// History holds the digests of the positions moves were played on, so its
/// last entry is the position one move back. Ko compares against that entry
/// only; older repetitions are allowed.
pub fn attempt_move(state: &GameState, at: Coord) -> Result<GameState, MoveError> {
    if state.game_over {
        return Err(MoveError::GameOver);
    }
    if !at.is_on_board() {
        return Err(MoveError::OffBoard);
    }
    if state.board.get(at).is_some() {
        return Err(MoveError::Occupied);
    }

    let color = state.current_turn;
    let opponent = color.opponent();
    let mut board = state.board.clone();
    board.set(at, Some(color));

    let mut captured = 0u32;
    for n in Board::neighbors(at) {
        // A group touching the stone twice is already gone on the second visit.
        if board.get(n) != Some(opponent) {
            continue;
        }
        let group = group_and_liberties(&board, n);
        if group.is_captured() {
            captured += group.len() as u32;
            for &stone in &group.stones {
                board.set(stone, None);
            }
        }
    }

    if group_and_liberties(&board, at).is_captured() {
        return Err(MoveError::Suicide);
    }

    let digest = board.digest();
    if state.history.last() == Some(&digest) {
        return Err(MoveError::Repetition);
    }

    let keep_from = state.history.len().saturating_sub(HISTORY_RETAINED);
    let mut history = state.history[keep_from..].to_vec();
    history.push(state.board.digest());

    let mut captures = state.captures;
    captures.add(color, captured);

    Ok(GameState {
        board,
        current_turn: opponent,
        captures,
        history,
        game_over: state.game_over,
        winner: state.winner,
        last_move: Some(at),
    })
}
