//! MIDI port subsystem for the webmidi wrapper.
//!
//! Provides the port registry with hot-plug reconciliation, input/output ports with 16
//! channels each, RPN/NRPN assembly, scheduled sends, and a host abstraction with an
//! in-process virtual backend.
//!
//! Feature gates: `midi-io` (hardware backend built on `midir`).

pub mod error;
pub use error::{Error, Result};

mod system;
pub use system::{WebMidi, WebMidiBuilder};

pub mod host;
pub use host::{
    AccessOptions, Clock, ConnectionState, DeviceState, MidiAccess, MidiHost, MidiInputHandle,
    MidiOutputHandle, MidiPortHandle, MonotonicClock, PortKind, PortStateChange, SentMessage,
    VirtualAccess, VirtualHost, VirtualInput, VirtualOutput,
};

#[cfg(feature = "midi-io")]
pub use host::{MidirAccess, MidirHost};

pub mod emitter;
pub use emitter::{EventEmitter, ListenerId, ListenerOptions};

pub mod event;
pub use event::{
    ChannelEvent, ChannelEventData, ChannelValue, ParameterAction, ParameterEvent, ParameterKind,
    PortEvent, PortEventData, PortSnapshot, RefreshReport, RegistryEvent, RegistryEventData,
};

mod options;
pub use options::{EnableOptions, SendOptions};

pub(crate) mod settings;

pub(crate) mod port;
pub use port::{ChannelListener, Input, Output, CHANNELS};

pub(crate) mod channel;
pub use channel::{
    ControlValue, Controller, InputChannel, OutputChannel, Parameter, PolyphonicMode,
};

pub use webmidi_core::{
    ChannelMode, ChannelSelector, Message, MessageType, Note, NoteDefaults, NoteList,
    RegisteredParameter, Time,
};
