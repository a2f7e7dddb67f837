//! Event kinds and payloads emitted by ports, channels and the registry.

use crate::host::{ConnectionState, DeviceState, MidiPortHandle, PortKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use webmidi_core::{ChannelMode, Message, MessageType, Note};

/// Point-in-time description of a port. Outlives the port it describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSnapshot {
    pub id: String,
    pub name: String,
    pub manufacturer: String,
    pub kind: PortKind,
    pub state: DeviceState,
    pub connection: ConnectionState,
}

impl PortSnapshot {
    pub fn of<H: MidiPortHandle + ?Sized>(handle: &H) -> Self {
        Self {
            id: handle.id(),
            name: handle.name(),
            manufacturer: handle.manufacturer(),
            kind: handle.kind(),
            state: handle.state(),
            connection: handle.connection(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortEvent {
    Opened,
    Closed,
    Disconnected,
    /// The port could not be opened or used.
    Error,
    /// Every decoded message, before type-specific dispatch.
    MidiMessage,
    /// System messages, keyed by their type.
    System(MessageType),
}

impl PortEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            PortEvent::Opened => "opened",
            PortEvent::Closed => "closed",
            PortEvent::Disconnected => "disconnected",
            PortEvent::Error => "error",
            PortEvent::MidiMessage => "midimessage",
            PortEvent::System(t) => t.as_str(),
        }
    }
}

impl fmt::Display for PortEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortEventData {
    pub kind: PortEvent,
    pub timestamp: f64,
    pub port: PortSnapshot,
    pub message: Option<Message>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelEvent {
    MidiMessage,
    NoteOff,
    NoteOn,
    KeyAftertouch,
    ControlChange,
    /// Controllers 120 to 127, emitted in addition to [`ChannelEvent::ControlChange`].
    ChannelMode,
    ProgramChange,
    ChannelAftertouch,
    PitchBend,
    Rpn,
    Nrpn,
    UnknownMessage,
}

impl ChannelEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelEvent::MidiMessage => "midimessage",
            ChannelEvent::NoteOff => "noteoff",
            ChannelEvent::NoteOn => "noteon",
            ChannelEvent::KeyAftertouch => "keyaftertouch",
            ChannelEvent::ControlChange => "controlchange",
            ChannelEvent::ChannelMode => "channelmode",
            ChannelEvent::ProgramChange => "programchange",
            ChannelEvent::ChannelAftertouch => "channelaftertouch",
            ChannelEvent::PitchBend => "pitchbend",
            ChannelEvent::Rpn => "rpn",
            ChannelEvent::Nrpn => "nrpn",
            ChannelEvent::UnknownMessage => "unknownmessage",
        }
    }
}

impl fmt::Display for ChannelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    Registered,
    NonRegistered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterAction {
    DataEntryCoarse,
    DataEntryFine,
    Increment,
    Decrement,
}

impl ParameterAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ParameterAction::DataEntryCoarse => "dataentrycoarse",
            ParameterAction::DataEntryFine => "dataentryfine",
            ParameterAction::Increment => "databuttonincrement",
            ParameterAction::Decrement => "databuttondecrement",
        }
    }
}

/// A completed RPN/NRPN sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterEvent {
    pub kind: ParameterKind,
    pub action: ParameterAction,
    /// Selected parameter as `[msb, lsb]`.
    pub pair: [u8; 2],
    /// Registered parameter name, when known.
    pub name: Option<&'static str>,
    /// Normalized value; `None` for increment/decrement.
    pub value: Option<f64>,
    /// 7-bit for coarse entry, 14-bit for fine entry.
    pub raw: Option<u16>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelValue {
    None,
    /// Attack (note on) or release (note off) is carried by the note.
    Note(Note),
    KeyAftertouch {
        note: Note,
        value: f64,
        raw: u8,
    },
    Control {
        controller: u8,
        name: Option<&'static str>,
        value: f64,
        raw: u8,
    },
    ChannelMode {
        mode: ChannelMode,
        raw: u8,
    },
    /// Program number, `1..=128`.
    Program(u8),
    ChannelAftertouch {
        value: f64,
        raw: u8,
    },
    /// `value` in `-1.0..=1.0`, `raw` in `0..=16383`.
    PitchBend {
        value: f64,
        raw: u16,
    },
    Parameter(ParameterEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEventData {
    pub kind: ChannelEvent,
    pub timestamp: f64,
    pub channel: u8,
    pub port_id: String,
    pub message: Message,
    pub value: ChannelValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryEvent {
    MidiAccessGranted,
    Enabled,
    Disabled,
    Connected,
    Disconnected,
    Error,
    PortsRefreshed,
}

impl RegistryEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            RegistryEvent::MidiAccessGranted => "midiaccessgranted",
            RegistryEvent::Enabled => "enabled",
            RegistryEvent::Disabled => "disabled",
            RegistryEvent::Connected => "connected",
            RegistryEvent::Disconnected => "disconnected",
            RegistryEvent::Error => "error",
            RegistryEvent::PortsRefreshed => "portsrefreshed",
        }
    }
}

impl fmt::Display for RegistryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ports added and removed by one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshReport {
    pub added: Vec<PortSnapshot>,
    pub removed: Vec<PortSnapshot>,
}

impl RefreshReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub(crate) fn extend(&mut self, other: RefreshReport) {
        self.added.extend(other.added);
        self.removed.extend(other.removed);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEventData {
    pub kind: RegistryEvent,
    pub timestamp: f64,
    pub port: Option<PortSnapshot>,
    pub report: Option<RefreshReport>,
    pub error: Option<String>,
}

impl RegistryEventData {
    pub(crate) fn new(kind: RegistryEvent, timestamp: f64) -> Self {
        Self {
            kind,
            timestamp,
            port: None,
            report: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(PortEvent::System(MessageType::Clock).as_str(), "clock");
        assert_eq!(ChannelEvent::NoteOn.to_string(), "noteon");
        assert_eq!(RegistryEvent::PortsRefreshed.as_str(), "portsrefreshed");
        assert_eq!(ParameterAction::Increment.as_str(), "databuttonincrement");
    }

    #[test]
    fn test_refresh_report_extend() {
        let snapshot = PortSnapshot {
            id: "a".into(),
            name: "A".into(),
            manufacturer: String::new(),
            kind: PortKind::Input,
            state: DeviceState::Connected,
            connection: ConnectionState::Open,
        };
        let mut report = RefreshReport::default();
        assert!(report.is_empty());
        report.extend(RefreshReport {
            added: vec![snapshot.clone()],
            removed: vec![],
        });
        assert_eq!(report.added, vec![snapshot]);
    }
}
