//! # webmidi - Web MIDI style port wrapper
//!
//! Enumerates MIDI ports, keeps them in sync with hot-plug events and exposes a
//! message-oriented API over raw bytes.
//!
//! ## Architecture
//!
//! webmidi is an umbrella crate that coordinates:
//! - **webmidi-core** - Codec layer (note names, messages, enumerations, sysex framing)
//! - **webmidi-io** - Port subsystem (registry, inputs, outputs, channels, scheduler, hosts)
//!
//! ## Quick Start
//!
//! ```ignore
//! use webmidi::prelude::*;
//!
//! let host = VirtualHost::new();
//! host.plug_output("out-1", "Synth");
//!
//! let midi = WebMidi::new(host.clone());
//! midi.enable(&EnableOptions::default())?;
//!
//! let synth = midi.get_output_by_name("Synth")?.expect("port");
//! synth.play_note("C4", &SendOptions::new().channels(1).duration(500.0))?;
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - Virtual host only
//! - `midi-io` - Hardware backend built on `midir`

pub mod error;
pub use error::{Error, Result};

/// Re-export of webmidi-core for direct access
pub use webmidi_core as core;

/// Re-export of webmidi-io for direct access
pub use webmidi_io as io;

// Codec
pub use webmidi_core::{
    build_note_array, channel_messages, control_change_name, control_change_number, frame_sysex,
    frame_sysex_vec, from_msb_lsb, from_normalized, get_note_details, guess_note_number,
    note_name_to_number, number_to_note_name, parameter_controllers, parse_note_identifier,
    sanitize_channels, system_messages, to_msb_lsb, to_normalized, to_timestamp, ChannelMode,
    ChannelSelector, Message, MessageType, Note, NoteDefaults, NoteList, NoteOptions, NoteSpec,
    RegisteredParameter, Time,
};

// Ports and registry
pub use webmidi_io::{
    ChannelEvent, ChannelEventData, ChannelListener, ChannelValue, ConnectionState,
    ControlValue, Controller, DeviceState, EnableOptions, Input, InputChannel, ListenerId,
    ListenerOptions, Output, OutputChannel, Parameter, ParameterAction, ParameterEvent,
    ParameterKind, PolyphonicMode, PortEvent, PortEventData, PortSnapshot, RefreshReport,
    RegistryEvent, RegistryEventData, SendOptions, WebMidi, WebMidiBuilder, CHANNELS,
};

// Hosts
pub use webmidi_io::{
    AccessOptions, Clock, MidiAccess, MidiHost, MidiInputHandle, MidiOutputHandle,
    MidiPortHandle, MonotonicClock, PortKind, PortStateChange, VirtualHost, VirtualInput,
    VirtualOutput,
};

#[cfg(feature = "midi-io")]
pub use webmidi_io::{MidirAccess, MidirHost};

/// Commonly used types for building against a registry.
pub mod prelude {
    // Registry
    pub use crate::{EnableOptions, WebMidi, WebMidiBuilder};

    // Ports and channels
    pub use crate::{Input, InputChannel, Output, OutputChannel, SendOptions};

    // Events
    pub use crate::{ChannelEvent, ListenerOptions, PortEvent, RegistryEvent};

    // Codec
    pub use crate::{Message, MessageType, Note, Time};

    // Hosts
    pub use crate::{MidiHost, VirtualHost};

    #[cfg(feature = "midi-io")]
    pub use crate::MidirHost;
}
