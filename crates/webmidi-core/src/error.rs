//! Error types for the MIDI codec layer.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid note name: {0}")]
    InvalidNoteName(String),

    #[error("Invalid note number: {0} (must be between 0 and 127)")]
    InvalidNoteNumber(i32),

    #[error("Invalid time format: {0}")]
    InvalidTimeFormat(String),

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    /// Argument outside of its documented numeric range.
    #[error("Range error: {0}")]
    Range(String),

    /// Argument of the wrong shape (e.g. an unnamed controller).
    #[error("Type error: {0}")]
    Type(String),

    #[error("Invalid status byte: {0:?}")]
    InvalidStatusByte(Option<u8>),
}

impl Error {
    pub fn range(msg: impl Into<String>) -> Self {
        Error::Range(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
