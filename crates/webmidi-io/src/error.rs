//! Error types for the MIDI port subsystem.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] webmidi_core::Error),

    /// Access denied, or no MIDI support in this environment.
    #[error("MIDI host error: {0}")]
    Host(String),

    #[error("MIDI port error: {0}")]
    Port(String),

    #[error("MIDI access has not been enabled")]
    NotEnabled,

    #[error("MIDI port {0} has been destroyed")]
    PortDestroyed(String),

    #[error("Sysex message support must first be activated")]
    SysexDisabled,
}

impl Error {
    pub(crate) fn range(msg: impl Into<String>) -> Self {
        Error::Core(webmidi_core::Error::Range(msg.into()))
    }

    pub(crate) fn type_error(msg: impl Into<String>) -> Self {
        Error::Core(webmidi_core::Error::Type(msg.into()))
    }
}

#[cfg(feature = "midi-io")]
impl From<midir::InitError> for Error {
    fn from(e: midir::InitError) -> Self {
        Error::Host(e.to_string())
    }
}

#[cfg(feature = "midi-io")]
impl From<midir::ConnectError<midir::MidiOutput>> for Error {
    fn from(e: midir::ConnectError<midir::MidiOutput>) -> Self {
        Error::Port(e.to_string())
    }
}

#[cfg(feature = "midi-io")]
impl From<midir::ConnectError<midir::MidiInput>> for Error {
    fn from(e: midir::ConnectError<midir::MidiInput>) -> Self {
        Error::Port(e.to_string())
    }
}

#[cfg(feature = "midi-io")]
impl From<midir::SendError> for Error {
    fn from(e: midir::SendError) -> Self {
        Error::Port(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
