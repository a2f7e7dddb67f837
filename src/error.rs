//! Centralized error type for the webmidi umbrella crate.
//!
//! Wraps both subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Codec(#[from] webmidi_core::Error),

    #[error("MIDI: {0}")]
    Midi(#[from] webmidi_io::Error),
}

impl Error {
    /// Codec errors surface directly or wrapped by the port layer.
    pub fn codec(&self) -> Option<&webmidi_core::Error> {
        match self {
            Error::Codec(e) | Error::Midi(webmidi_io::Error::Core(e)) => Some(e),
            Error::Midi(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
