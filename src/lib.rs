//! ZenGo: 9x9 Go for two players, locally or peer to peer.
//!
//! ## Modules
//!
//! - [`constants`] - Board size, history bound, room addressing, advisory text
//! - [`board`] - Colors, coordinates and the grid itself
//! - [`rules`] - Groups, liberties, captures, suicide and ko
//! - [`game`] - Game state snapshots and the machine that holds them
//! - [`room`] - Room codes and endpoint naming
//! - [`protocol`] - `MOVE` / `SYNC` / `RESET` wire messages
//! - [`transport`] - Peer discovery (in-memory and TCP rendezvous)
//! - [`session`] - Connection lifecycle and state replication
//! - [`advisor`] - Strategy hints from a text-generation service
//! - [`app`] - Terminal front-end
//!
//! ## Example
//!
//! ```
//! use zengo::board::{Color, Coord};
//! use zengo::game::GameMachine;
//!
//! let mut game = GameMachine::new();
//! game.attempt_move(Coord::new(4, 4)).unwrap();
//!
//! let state = game.state();
//! assert_eq!(state.board.get(Coord::new(4, 4)), Some(Color::Black));
//! assert_eq!(state.current_turn, Color::White);
//! ```

pub mod advisor;
pub mod app;
pub mod board;
pub mod constants;
pub mod game;
pub mod protocol;
pub mod room;
pub mod rules;
pub mod session;
pub mod transport;
