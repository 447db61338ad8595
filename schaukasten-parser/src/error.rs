use std::fmt;

use thiserror::Error;

/// Where an entry went wrong: its 1-based position among all entries of the
/// source, and the 1-based source line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Locator {
    pub entry: usize,
    pub line: usize,
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entry {} (line {})", self.entry, self.line)
    }
}

/// Malformed entry: bad syntax, unknown or repeated label, missing field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{locator}: {message}")]
pub struct ParseError {
    pub locator: Locator,
    pub message: String,
}

/// Well-formed entry with semantically invalid fields.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{locator}: {message}")]
pub struct ValidationError {
    pub locator: Locator,
    pub message: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntryError {
    #[error("parse error at {0}")]
    Parse(#[from] ParseError),
    #[error("invalid entry at {0}")]
    Validation(#[from] ValidationError),
}

impl EntryError {
    pub fn locator(&self) -> Locator {
        match self {
            EntryError::Parse(err) => err.locator,
            EntryError::Validation(err) => err.locator,
        }
    }

    pub(crate) fn parse(locator: Locator, message: impl Into<String>) -> Self {
        EntryError::Parse(ParseError {
            locator,
            message: message.into(),
        })
    }

    pub(crate) fn validation(locator: Locator, message: impl Into<String>) -> Self {
        EntryError::Validation(ValidationError {
            locator,
            message: message.into(),
        })
    }
}
