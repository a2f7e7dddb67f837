//! MIDI codec layer for the webmidi port wrapper.
//!
//! Pure, allocation-light helpers shared by the I/O crate:
//!
//! - **Utilities**: note names, normalized values, 14-bit splitting, channel and time parsing
//! - **Message**: structured view over a raw MIDI buffer
//! - **Enumerations**: message types, channel modes, named controllers, registered parameters
//! - **Sysex**: system exclusive framing
//!
//! # Example
//!
//! ```ignore
//! use webmidi_core::{Message, MessageType, note_name_to_number};
//!
//! let msg = Message::decode(&[0x90, 60, 100])?;
//! assert_eq!(msg.message_type(), MessageType::NoteOn);
//! assert_eq!(note_name_to_number("C4", 0)?, 60);
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod enumerations;
pub use enumerations::{
    channel_messages, control_change_name, control_change_number, parameter_controllers,
    registered_parameter_pair, system_messages, ChannelMode, MessageType, RegisteredParameter,
};

pub mod message;
pub use message::{Message, RawBytes};

pub mod note;
pub use note::{
    build_note_array, guess_note_number, resolve_velocity, Note, NoteDefaults, NoteList,
    NoteOptions, NoteSpec,
};

pub mod sysex;
pub use sysex::{frame_sysex, frame_sysex_vec};

pub mod utilities;
pub use utilities::{
    from_msb_lsb, from_normalized, get_note_details, note_name_to_number, number_to_note_name,
    octave_of, parse_note_identifier, sanitize_channels, to_msb_lsb, to_normalized, to_timestamp,
    ChannelSelector, NoteDetails, Time,
};
