//! MIDI lookup tables: message types, channel mode messages, named controllers and
//! registered parameters.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Channel message commands (high nibble of the status byte).
pub mod channel_messages {
    pub const NOTE_OFF: u8 = 0x8;
    pub const NOTE_ON: u8 = 0x9;
    pub const KEY_AFTERTOUCH: u8 = 0xA;
    pub const CONTROL_CHANGE: u8 = 0xB;
    pub const PROGRAM_CHANGE: u8 = 0xC;
    pub const CHANNEL_AFTERTOUCH: u8 = 0xD;
    pub const PITCH_BEND: u8 = 0xE;
}

/// System message status bytes.
pub mod system_messages {
    pub const SYSEX: u8 = 0xF0;
    pub const TIMECODE: u8 = 0xF1;
    pub const SONG_POSITION: u8 = 0xF2;
    pub const SONG_SELECT: u8 = 0xF3;
    pub const TUNE_REQUEST: u8 = 0xF6;
    pub const SYSEX_END: u8 = 0xF7;
    pub const CLOCK: u8 = 0xF8;
    pub const START: u8 = 0xFA;
    pub const CONTINUE: u8 = 0xFB;
    pub const STOP: u8 = 0xFC;
    pub const ACTIVE_SENSING: u8 = 0xFE;
    pub const RESET: u8 = 0xFF;
}

/// Controller numbers used by the RPN/NRPN protocol.
pub mod parameter_controllers {
    pub const DATA_ENTRY_MSB: u8 = 6;
    pub const DATA_ENTRY_LSB: u8 = 38;
    pub const DATA_INCREMENT: u8 = 96;
    pub const DATA_DECREMENT: u8 = 97;
    pub const NRPN_LSB: u8 = 98;
    pub const NRPN_MSB: u8 = 99;
    pub const RPN_LSB: u8 = 100;
    pub const RPN_MSB: u8 = 101;
}

/// Symbolic message type, resolved from the command (and status byte for system messages).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    NoteOff,
    NoteOn,
    KeyAftertouch,
    ControlChange,
    ProgramChange,
    ChannelAftertouch,
    PitchBend,
    Sysex,
    Timecode,
    SongPosition,
    SongSelect,
    TuneRequest,
    SysexEnd,
    Clock,
    Start,
    Continue,
    Stop,
    ActiveSensing,
    Reset,
    /// Undefined or future command. Never produced by a failure, only by lookup.
    Unknown,
}

impl MessageType {
    /// Lookup by `command` (4-bit for channel messages, full status byte otherwise).
    pub fn from_command(command: u8) -> Self {
        use channel_messages::*;
        use system_messages::*;
        match command {
            NOTE_OFF => MessageType::NoteOff,
            NOTE_ON => MessageType::NoteOn,
            KEY_AFTERTOUCH => MessageType::KeyAftertouch,
            CONTROL_CHANGE => MessageType::ControlChange,
            PROGRAM_CHANGE => MessageType::ProgramChange,
            CHANNEL_AFTERTOUCH => MessageType::ChannelAftertouch,
            PITCH_BEND => MessageType::PitchBend,
            SYSEX => MessageType::Sysex,
            TIMECODE => MessageType::Timecode,
            SONG_POSITION => MessageType::SongPosition,
            SONG_SELECT => MessageType::SongSelect,
            TUNE_REQUEST => MessageType::TuneRequest,
            SYSEX_END => MessageType::SysexEnd,
            CLOCK => MessageType::Clock,
            START => MessageType::Start,
            CONTINUE => MessageType::Continue,
            STOP => MessageType::Stop,
            ACTIVE_SENSING => MessageType::ActiveSensing,
            RESET => MessageType::Reset,
            _ => MessageType::Unknown,
        }
    }

    pub fn is_channel_message(self) -> bool {
        matches!(
            self,
            MessageType::NoteOff
                | MessageType::NoteOn
                | MessageType::KeyAftertouch
                | MessageType::ControlChange
                | MessageType::ProgramChange
                | MessageType::ChannelAftertouch
                | MessageType::PitchBend
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::NoteOff => "noteoff",
            MessageType::NoteOn => "noteon",
            MessageType::KeyAftertouch => "keyaftertouch",
            MessageType::ControlChange => "controlchange",
            MessageType::ProgramChange => "programchange",
            MessageType::ChannelAftertouch => "channelaftertouch",
            MessageType::PitchBend => "pitchbend",
            MessageType::Sysex => "sysex",
            MessageType::Timecode => "timecode",
            MessageType::SongPosition => "songposition",
            MessageType::SongSelect => "songselect",
            MessageType::TuneRequest => "tunerequest",
            MessageType::SysexEnd => "sysexend",
            MessageType::Clock => "clock",
            MessageType::Start => "start",
            MessageType::Continue => "continue",
            MessageType::Stop => "stop",
            MessageType::ActiveSensing => "activesensing",
            MessageType::Reset => "reset",
            MessageType::Unknown => "unknownsystemmessage",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channel mode messages (controllers 120-127).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChannelMode {
    AllSoundOff = 120,
    ResetAllControllers = 121,
    LocalControl = 122,
    AllNotesOff = 123,
    OmniModeOff = 124,
    OmniModeOn = 125,
    MonoModeOn = 126,
    PolyModeOn = 127,
}

impl ChannelMode {
    pub const ALL: [ChannelMode; 8] = [
        ChannelMode::AllSoundOff,
        ChannelMode::ResetAllControllers,
        ChannelMode::LocalControl,
        ChannelMode::AllNotesOff,
        ChannelMode::OmniModeOff,
        ChannelMode::OmniModeOn,
        ChannelMode::MonoModeOn,
        ChannelMode::PolyModeOn,
    ];

    pub fn from_controller(number: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| *m as u8 == number)
    }

    pub fn controller(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelMode::AllSoundOff => "allsoundoff",
            ChannelMode::ResetAllControllers => "resetallcontrollers",
            ChannelMode::LocalControl => "localcontrol",
            ChannelMode::AllNotesOff => "allnotesoff",
            ChannelMode::OmniModeOff => "omnimodeoff",
            ChannelMode::OmniModeOn => "omnimodeon",
            ChannelMode::MonoModeOn => "monomodeon",
            ChannelMode::PolyModeOn => "polymodeon",
        }
    }
}

impl FromStr for ChannelMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| Error::Type(format!("Unknown channel mode message: {s}")))
    }
}

const CONTROL_CHANGE_NAMES: &[(&str, u8)] = &[
    ("bankselectcoarse", 0),
    ("modulationwheelcoarse", 1),
    ("breathcontrollercoarse", 2),
    ("footcontrollercoarse", 4),
    ("portamentotimecoarse", 5),
    ("dataentrycoarse", 6),
    ("volumecoarse", 7),
    ("balancecoarse", 8),
    ("pancoarse", 10),
    ("expressioncoarse", 11),
    ("effectcontrol1coarse", 12),
    ("effectcontrol2coarse", 13),
    ("generalpurposeslider1", 16),
    ("generalpurposeslider2", 17),
    ("generalpurposeslider3", 18),
    ("generalpurposeslider4", 19),
    ("bankselectfine", 32),
    ("modulationwheelfine", 33),
    ("breathcontrollerfine", 34),
    ("footcontrollerfine", 36),
    ("portamentotimefine", 37),
    ("dataentryfine", 38),
    ("volumefine", 39),
    ("balancefine", 40),
    ("panfine", 42),
    ("expressionfine", 43),
    ("effectcontrol1fine", 44),
    ("effectcontrol2fine", 45),
    ("holdpedal", 64),
    ("portamento", 65),
    ("sustenutopedal", 66),
    ("softpedal", 67),
    ("legatopedal", 68),
    ("hold2pedal", 69),
    ("soundvariation", 70),
    ("resonance", 71),
    ("soundreleasetime", 72),
    ("soundattacktime", 73),
    ("brightness", 74),
    ("soundcontrol6", 75),
    ("soundcontrol7", 76),
    ("soundcontrol8", 77),
    ("soundcontrol9", 78),
    ("soundcontrol10", 79),
    ("generalpurposebutton1", 80),
    ("generalpurposebutton2", 81),
    ("generalpurposebutton3", 82),
    ("generalpurposebutton4", 83),
    ("reverblevel", 91),
    ("tremololevel", 92),
    ("choruslevel", 93),
    ("celestelevel", 94),
    ("phaserlevel", 95),
    ("databuttonincrement", 96),
    ("databuttondecrement", 97),
    ("nonregisteredparameterfine", 98),
    ("nonregisteredparametercoarse", 99),
    ("registeredparameterfine", 100),
    ("registeredparametercoarse", 101),
    ("allsoundoff", 120),
    ("resetallcontrollers", 121),
    ("localcontrol", 122),
    ("allnotesoff", 123),
    ("omnimodeoff", 124),
    ("omnimodeon", 125),
    ("monomodeon", 126),
    ("polymodeon", 127),
];

/// Controller number for a named controller (e.g. `"volumecoarse"` -> 7).
pub fn control_change_number(name: &str) -> Option<u8> {
    CONTROL_CHANGE_NAMES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, number)| *number)
}

/// Name of a controller number, if it has one.
pub fn control_change_name(number: u8) -> Option<&'static str> {
    CONTROL_CHANGE_NAMES
        .iter()
        .find(|(_, n)| *n == number)
        .map(|(name, _)| *name)
}

/// Registered parameters and their `[MSB, LSB]` selector pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisteredParameter {
    PitchBendRange,
    ChannelFineTuning,
    ChannelCoarseTuning,
    TuningProgram,
    TuningBank,
    ModulationRange,
    AzimuthAngle,
    ElevationAngle,
    Gain,
    DistanceRatio,
    MaximumDistance,
    MaximumDistanceGain,
    ReferenceDistanceRatio,
    PanSpreadAngle,
    RollAngle,
}

impl RegisteredParameter {
    pub const ALL: [RegisteredParameter; 15] = [
        RegisteredParameter::PitchBendRange,
        RegisteredParameter::ChannelFineTuning,
        RegisteredParameter::ChannelCoarseTuning,
        RegisteredParameter::TuningProgram,
        RegisteredParameter::TuningBank,
        RegisteredParameter::ModulationRange,
        RegisteredParameter::AzimuthAngle,
        RegisteredParameter::ElevationAngle,
        RegisteredParameter::Gain,
        RegisteredParameter::DistanceRatio,
        RegisteredParameter::MaximumDistance,
        RegisteredParameter::MaximumDistanceGain,
        RegisteredParameter::ReferenceDistanceRatio,
        RegisteredParameter::PanSpreadAngle,
        RegisteredParameter::RollAngle,
    ];

    pub fn pair(self) -> [u8; 2] {
        match self {
            RegisteredParameter::PitchBendRange => [0x00, 0x00],
            RegisteredParameter::ChannelFineTuning => [0x00, 0x01],
            RegisteredParameter::ChannelCoarseTuning => [0x00, 0x02],
            RegisteredParameter::TuningProgram => [0x00, 0x03],
            RegisteredParameter::TuningBank => [0x00, 0x04],
            RegisteredParameter::ModulationRange => [0x00, 0x05],
            RegisteredParameter::AzimuthAngle => [0x3D, 0x00],
            RegisteredParameter::ElevationAngle => [0x3D, 0x01],
            RegisteredParameter::Gain => [0x3D, 0x02],
            RegisteredParameter::DistanceRatio => [0x3D, 0x03],
            RegisteredParameter::MaximumDistance => [0x3D, 0x04],
            RegisteredParameter::MaximumDistanceGain => [0x3D, 0x05],
            RegisteredParameter::ReferenceDistanceRatio => [0x3D, 0x06],
            RegisteredParameter::PanSpreadAngle => [0x3D, 0x07],
            RegisteredParameter::RollAngle => [0x3D, 0x08],
        }
    }

    pub fn from_pair(pair: [u8; 2]) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.pair() == pair)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RegisteredParameter::PitchBendRange => "pitchbendrange",
            RegisteredParameter::ChannelFineTuning => "channelfinetuning",
            RegisteredParameter::ChannelCoarseTuning => "channelcoarsetuning",
            RegisteredParameter::TuningProgram => "tuningprogram",
            RegisteredParameter::TuningBank => "tuningbank",
            RegisteredParameter::ModulationRange => "modulationrange",
            RegisteredParameter::AzimuthAngle => "azimuthangle",
            RegisteredParameter::ElevationAngle => "elevationangle",
            RegisteredParameter::Gain => "gain",
            RegisteredParameter::DistanceRatio => "distanceratio",
            RegisteredParameter::MaximumDistance => "maximumdistance",
            RegisteredParameter::MaximumDistanceGain => "maximumdistancegain",
            RegisteredParameter::ReferenceDistanceRatio => "referencedistanceratio",
            RegisteredParameter::PanSpreadAngle => "panspreadangle",
            RegisteredParameter::RollAngle => "rollangle",
        }
    }
}

impl FromStr for RegisteredParameter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| Error::UnknownParameter(s.to_string()))
    }
}

impl fmt::Display for RegisteredParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `[MSB, LSB]` pair of a registered parameter name.
pub fn registered_parameter_pair(name: &str) -> Result<[u8; 2]> {
    name.parse::<RegisteredParameter>().map(RegisteredParameter::pair)
}
