//! Constants for board dimensions, session addressing, and advisory text.
//!
//! # Board Size Configuration
//!
//! The board size is controlled by Cargo features:
//! - `board9x9` (default): 9x9 board
//! - `board13x13`: 13x13 board
//!
//! Both peers of a networked game must be built with the same size; a
//! snapshot for a different size fails to decode.
//!
//! ```sh
//! cargo build                                              # 9x9 (default)
//! cargo build --no-default-features --features board13x13  # 13x13
//! ```

// =============================================================================
// Board Geometry
// =============================================================================

/// Board size (NxN).
#[cfg(feature = "board9x9")]
pub const N: usize = 9;

#[cfg(feature = "board13x13")]
pub const N: usize = 13;

// Compile-time check: exactly one board size feature must be enabled
#[cfg(all(feature = "board9x9", feature = "board13x13"))]
compile_error!("Cannot enable both 'board9x9' and 'board13x13' features at the same time");

#[cfg(not(any(feature = "board9x9", feature = "board13x13")))]
compile_error!("Must enable exactly one board size feature: 'board9x9' or 'board13x13'");

/// Column letters used for human coordinates. `I` is skipped.
pub const COLUMN_LETTERS: &[u8] = b"ABCDEFGHJKLMNOPQRST";

// =============================================================================
// Repetition History
// =============================================================================

/// Number of older digests kept when a new one is appended.
pub const HISTORY_RETAINED: usize = 10;

/// Maximum length of `GameState::history` (the retained digests plus the newest).
pub const HISTORY_CAPACITY: usize = HISTORY_RETAINED + 1;

// =============================================================================
// Room Addressing
// =============================================================================

/// Length of a room code.
pub const ROOM_CODE_LEN: usize = 4;

/// Characters a generated room code is drawn from. Codes are compared upper-cased.
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Namespace prefix joined with a room code to form the discoverable endpoint id.
pub const ENDPOINT_PREFIX: &str = "zengo_v4_";

/// Rendezvous address used when none is configured.
pub const DEFAULT_RENDEZVOUS_ADDR: &str = "127.0.0.1:9797";

/// Upper bound on a rendezvous handshake line, in bytes.
pub const MAX_HANDSHAKE_LINE: usize = 256;

// =============================================================================
// Advisory Service
// =============================================================================

/// Substituted when the advisory call fails for any reason.
pub const ADVICE_FALLBACK: &str = "The master is resting. Observe the board carefully!";

/// Substituted when the advisory call succeeds but returns no text.
pub const ADVICE_EMPTY: &str = "I'm thinking... Try focusing on territory near the edges.";

/// Default advisory endpoint (Gemini-style `generateContent` API root).
pub const DEFAULT_ADVISOR_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default advisory model.
pub const DEFAULT_ADVISOR_MODEL: &str = "gemini-3-pro-preview";
