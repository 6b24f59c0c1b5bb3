//! Room codes: the short identifier two players exchange to find each other.

use std::fmt;

use derive_more::{Display, Error};

use crate::constants::{ENDPOINT_PREFIX, ROOM_CODE_ALPHABET, ROOM_CODE_LEN};

/// A normalized (upper-case) room code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomCode(String);

impl RoomCode {
    /// Draw a fresh random code.
    ///
    /// Collisions with a live room are not checked here; the transport
    /// reports them when the endpoint is registered.
    pub fn generate() -> Self {
        let code = (0..ROOM_CODE_LEN)
            .map(|_| ROOM_CODE_ALPHABET[fastrand::usize(..ROOM_CODE_ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    /// Normalize user input (trim, upper-case) and validate it.
    pub fn parse(value: &str) -> Result<Self, RoomCodeError> {
        let normalized = value.trim().to_ascii_uppercase();
        if normalized.is_empty() {
            return Err(RoomCodeError::Empty);
        }
        let found = normalized.chars().count();
        if found != ROOM_CODE_LEN {
            return Err(RoomCodeError::InvalidLength {
                expected: ROOM_CODE_LEN,
                found,
            });
        }
        if let Some((index, ch)) = normalized
            .chars()
            .enumerate()
            .find(|(_, ch)| !ch.is_ascii_alphanumeric())
        {
            return Err(RoomCodeError::InvalidCharacter { ch, index });
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Full discoverable endpoint id: namespace prefix plus code.
    pub fn endpoint(&self) -> String {
        format!("{ENDPOINT_PREFIX}{}", self.0)
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for RoomCode {
    type Err = RoomCodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum RoomCodeError {
    #[display("room code is empty")]
    Empty,
    #[display("room code must be {expected} characters, got {found}")]
    InvalidLength { expected: usize, found: usize },
    #[display("invalid character '{ch}' at position {index}")]
    InvalidCharacter { ch: char, index: usize },
}
