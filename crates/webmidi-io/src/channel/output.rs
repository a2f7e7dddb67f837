//! Output channel: turns high-level calls into channel messages for one of the 16 channels
//! of an [`Output`](crate::Output).
//!
//! Every argument is range-checked before the first byte is sent. With validation disabled,
//! out-of-range values are truncated to a byte and handed to the host as they are.

use crate::error::{Error, Result};
use crate::options::SendOptions;
use crate::port::OutputSink;
use smallvec::SmallVec;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use tracing::warn;
use webmidi_core::{
    build_note_array, channel_messages, control_change_number, from_normalized,
    parameter_controllers, registered_parameter_pair, resolve_velocity, to_msb_lsb, ChannelMode,
    Note, NoteList, RegisteredParameter, Time,
};

/// A controller addressed by number or by name (e.g. `"volumecoarse"`).
#[derive(Debug, Clone, PartialEq)]
pub enum Controller {
    Number(i32),
    Name(String),
}

impl From<u8> for Controller {
    fn from(number: u8) -> Self {
        Controller::Number(number as i32)
    }
}

impl From<i32> for Controller {
    fn from(number: i32) -> Self {
        Controller::Number(number)
    }
}

impl From<&str> for Controller {
    fn from(name: &str) -> Self {
        Controller::Name(name.to_string())
    }
}

impl From<String> for Controller {
    fn from(name: String) -> Self {
        Controller::Name(name)
    }
}

impl From<ChannelMode> for Controller {
    fn from(mode: ChannelMode) -> Self {
        Controller::Number(mode.controller() as i32)
    }
}

/// A control change value. A pair sends the MSB on the controller and the LSB on
/// controller + 32.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlValue {
    Single(i32),
    Pair(i32, i32),
}

impl From<u8> for ControlValue {
    fn from(value: u8) -> Self {
        ControlValue::Single(value as i32)
    }
}

impl From<i32> for ControlValue {
    fn from(value: i32) -> Self {
        ControlValue::Single(value)
    }
}

impl From<[u8; 2]> for ControlValue {
    fn from([msb, lsb]: [u8; 2]) -> Self {
        ControlValue::Pair(msb as i32, lsb as i32)
    }
}

/// A registered parameter, by name or by `[msb, lsb]` pair.
#[derive(Debug, Clone, PartialEq)]
pub enum Parameter {
    Name(String),
    Pair([u8; 2]),
}

impl From<&str> for Parameter {
    fn from(name: &str) -> Self {
        Parameter::Name(name.to_string())
    }
}

impl From<[u8; 2]> for Parameter {
    fn from(pair: [u8; 2]) -> Self {
        Parameter::Pair(pair)
    }
}

impl From<RegisteredParameter> for Parameter {
    fn from(parameter: RegisteredParameter) -> Self {
        Parameter::Pair(parameter.pair())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolyphonicMode {
    Mono,
    Poly,
}

impl FromStr for PolyphonicMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mono" => Ok(PolyphonicMode::Mono),
            "poly" => Ok(PolyphonicMode::Poly),
            _ => Err(Error::type_error(format!(
                "Polyphonic mode must be 'mono' or 'poly', got '{}'",
                s
            ))),
        }
    }
}

#[derive(Clone, Copy)]
enum ParameterSet {
    Registered,
    NonRegistered,
}

impl ParameterSet {
    fn selectors(self) -> (u8, u8) {
        match self {
            ParameterSet::Registered => {
                (parameter_controllers::RPN_MSB, parameter_controllers::RPN_LSB)
            }
            ParameterSet::NonRegistered => {
                (parameter_controllers::NRPN_MSB, parameter_controllers::NRPN_LSB)
            }
        }
    }
}

type ControlSequence = SmallVec<[[u8; 3]; 4]>;

struct ChannelInner {
    number: u8,
    sink: Arc<OutputSink>,
    octave_offset: AtomicI32,
    destroyed: AtomicBool,
}

/// One of the 16 channels of an [`Output`](crate::Output). Cheap to clone.
#[derive(Clone)]
pub struct OutputChannel {
    inner: Arc<ChannelInner>,
}

impl OutputChannel {
    pub(crate) fn new(sink: Arc<OutputSink>, number: u8) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                number,
                sink,
                octave_offset: AtomicI32::new(0),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    /// `1..=16`.
    pub fn number(&self) -> u8 {
        self.inner.number
    }

    /// Channel-level octave offset, added to the port and library offsets for note names.
    pub fn octave_offset(&self) -> i32 {
        self.inner.octave_offset.load(Ordering::Relaxed)
    }

    pub fn set_octave_offset(&self, offset: i32) {
        self.inner.octave_offset.store(offset, Ordering::Relaxed);
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    pub(crate) fn destroy(&self) {
        self.inner.destroyed.store(true, Ordering::Release);
    }

    /// Sends raw bytes through the owning port.
    pub fn send(&self, message: &[u8], options: &SendOptions) -> Result<()> {
        self.ensure_alive()?;
        self.inner.sink.send_checked(message, &options.time)
    }

    // ---- Notes ----

    pub fn send_note_off(&self, note: impl Into<NoteList>, options: &SendOptions) -> Result<()> {
        let notes = self.build_notes(note.into(), options)?;
        let timestamp = self.inner.sink.timestamp(&options.time);
        for n in &notes {
            self.emit_at(
                &[self.status(channel_messages::NOTE_OFF), n.number(), n.raw_release()],
                timestamp,
            )?;
        }
        Ok(())
    }

    /// Same as [`send_note_off`](Self::send_note_off).
    pub fn stop_note(&self, note: impl Into<NoteList>, options: &SendOptions) -> Result<()> {
        self.send_note_off(note, options)
    }

    pub fn send_note_on(&self, note: impl Into<NoteList>, options: &SendOptions) -> Result<()> {
        let notes = self.build_notes(note.into(), options)?;
        let timestamp = self.inner.sink.timestamp(&options.time);
        for n in &notes {
            self.emit_at(
                &[self.status(channel_messages::NOTE_ON), n.number(), n.raw_attack()],
                timestamp,
            )?;
        }
        Ok(())
    }

    /// Note on, followed by a note off `duration` milliseconds after the note on's effective
    /// send time when a duration is set. Pending note offs are dropped if the port is
    /// cleared or destroyed first.
    pub fn play_note(&self, note: impl Into<NoteList>, options: &SendOptions) -> Result<()> {
        let notes = self.build_notes(note.into(), options)?;
        let timestamp = self.inner.sink.timestamp(&options.time);
        for n in &notes {
            self.emit_at(
                &[self.status(channel_messages::NOTE_ON), n.number(), n.raw_attack()],
                timestamp,
            )?;
        }
        for n in &notes {
            if let Some(duration) = n.duration() {
                self.emit_at(
                    &[self.status(channel_messages::NOTE_OFF), n.number(), n.raw_release()],
                    timestamp + duration,
                )?;
            }
        }
        Ok(())
    }

    pub fn set_key_aftertouch(
        &self,
        note: impl Into<NoteList>,
        pressure: f64,
        options: &SendOptions,
    ) -> Result<()> {
        let pressure = self.seven_bit_value(pressure, options.raw_value, "Pressure")?;
        let notes = self.build_notes(note.into(), options)?;
        let timestamp = self.inner.sink.timestamp(&options.time);
        for n in &notes {
            self.emit_at(
                &[self.status(channel_messages::KEY_AFTERTOUCH), n.number(), pressure],
                timestamp,
            )?;
        }
        Ok(())
    }

    // ---- Control change ----

    pub fn send_control_change(
        &self,
        controller: impl Into<Controller>,
        value: impl Into<ControlValue>,
        options: &SendOptions,
    ) -> Result<()> {
        let controller = self.controller_number(controller.into())?;
        let status = self.status(channel_messages::CONTROL_CHANGE);
        let mut sequence = ControlSequence::new();
        match value.into() {
            ControlValue::Single(value) => {
                sequence.push([status, controller, self.data_byte(value, "Controller value")?]);
            }
            ControlValue::Pair(msb, lsb) => {
                if self.validation() && controller > 31 {
                    return Err(Error::range(
                        "An MSB/LSB pair can only be used with controller numbers 0-31",
                    ));
                }
                sequence.push([status, controller, self.data_byte(msb, "Controller MSB")?]);
                sequence.push([
                    status,
                    controller.wrapping_add(32),
                    self.data_byte(lsb, "Controller LSB")?,
                ]);
            }
        }
        self.emit_sequence(&sequence, &options.time)
    }

    pub fn send_channel_mode(
        &self,
        command: impl Into<Controller>,
        value: i32,
        options: &SendOptions,
    ) -> Result<()> {
        let command = match command.into() {
            Controller::Name(name) => ChannelMode::from_str(&name)?.controller(),
            Controller::Number(number) => {
                if self.validation() && !(120..=127).contains(&number) {
                    return Err(Error::range(format!(
                        "Channel mode numbers must be between 120 and 127, got {}",
                        number
                    )));
                }
                number as u8
            }
        };
        let value = self.data_byte(value, "Channel mode value")?;
        self.emit(
            &[self.status(channel_messages::CONTROL_CHANGE), command, value],
            &options.time,
        )
    }

    pub fn turn_sound_off(&self, options: &SendOptions) -> Result<()> {
        self.send_channel_mode(ChannelMode::AllSoundOff, 0, options)
    }

    pub fn reset_all_controllers(&self, options: &SendOptions) -> Result<()> {
        self.send_channel_mode(ChannelMode::ResetAllControllers, 0, options)
    }

    pub fn set_local_control(&self, enabled: bool, options: &SendOptions) -> Result<()> {
        let value = if enabled { 127 } else { 0 };
        self.send_channel_mode(ChannelMode::LocalControl, value, options)
    }

    pub fn turn_notes_off(&self, options: &SendOptions) -> Result<()> {
        self.send_channel_mode(ChannelMode::AllNotesOff, 0, options)
    }

    pub fn set_omni_mode(&self, enabled: bool, options: &SendOptions) -> Result<()> {
        let mode = if enabled {
            ChannelMode::OmniModeOn
        } else {
            ChannelMode::OmniModeOff
        };
        self.send_channel_mode(mode, 0, options)
    }

    pub fn set_polyphonic_mode(&self, mode: PolyphonicMode, options: &SendOptions) -> Result<()> {
        let mode = match mode {
            PolyphonicMode::Mono => ChannelMode::MonoModeOn,
            PolyphonicMode::Poly => ChannelMode::PolyModeOn,
        };
        self.send_channel_mode(mode, 0, options)
    }

    // ---- Registered and non-registered parameters ----

    /// Selects `parameter` (CC 101/100) and sets it (CC 6, plus CC 38 when `data` has
    /// two bytes).
    pub fn set_registered_parameter(
        &self,
        parameter: impl Into<Parameter>,
        data: &[u8],
        options: &SendOptions,
    ) -> Result<()> {
        let pair = self.registered_pair(parameter.into())?;
        self.set_parameter(ParameterSet::Registered, pair, data, &options.time)
    }

    /// Selects `parameter` (CC 99/98) and sets it (CC 6, plus CC 38 when `data` has
    /// two bytes).
    pub fn set_non_registered_parameter(
        &self,
        parameter: [u8; 2],
        data: &[u8],
        options: &SendOptions,
    ) -> Result<()> {
        let pair = self.parameter_pair(parameter)?;
        self.set_parameter(ParameterSet::NonRegistered, pair, data, &options.time)
    }

    pub fn increment_registered_parameter(
        &self,
        parameter: impl Into<Parameter>,
        options: &SendOptions,
    ) -> Result<()> {
        let pair = self.registered_pair(parameter.into())?;
        self.step_parameter(pair, parameter_controllers::DATA_INCREMENT, &options.time)
    }

    pub fn decrement_registered_parameter(
        &self,
        parameter: impl Into<Parameter>,
        options: &SendOptions,
    ) -> Result<()> {
        let pair = self.registered_pair(parameter.into())?;
        self.step_parameter(pair, parameter_controllers::DATA_DECREMENT, &options.time)
    }

    pub fn set_pitch_bend_range(&self, semitones: i32, cents: i32, options: &SendOptions) -> Result<()> {
        let data = [
            self.data_byte(semitones, "Semitones")?,
            self.data_byte(cents, "Cents")?,
        ];
        self.set_registered_parameter(RegisteredParameter::PitchBendRange, &data, options)
    }

    pub fn set_modulation_range(&self, semitones: i32, cents: i32, options: &SendOptions) -> Result<()> {
        let data = [
            self.data_byte(semitones, "Semitones")?,
            self.data_byte(cents, "Cents")?,
        ];
        self.set_registered_parameter(RegisteredParameter::ModulationRange, &data, options)
    }

    /// Coarse and fine channel tuning in semitones, `-65 < value < 64`.
    pub fn set_master_tuning(&self, value: f64, options: &SendOptions) -> Result<()> {
        let value = if value.is_nan() { 0.0 } else { value };
        if self.validation() && !(value > -65.0 && value < 64.0) {
            return Err(Error::range(format!(
                "Master tuning must be larger than -65 and smaller than 64, got {}",
                value
            )));
        }
        let coarse = (value.floor() + 64.0) as u8;
        let fine = ((value - value.floor() + 1.0) / 2.0 * 16383.0).round() as u16;
        let (msb, lsb) = to_msb_lsb(fine);

        self.set_registered_parameter(RegisteredParameter::ChannelCoarseTuning, &[coarse], options)?;
        self.set_registered_parameter(RegisteredParameter::ChannelFineTuning, &[msb, lsb], options)
    }

    /// Tuning program `1..=128`.
    pub fn set_tuning_program(&self, value: i32, options: &SendOptions) -> Result<()> {
        let value = self.one_based(value, "Tuning program")?;
        self.set_registered_parameter(RegisteredParameter::TuningProgram, &[value], options)
    }

    /// Tuning bank `1..=128`.
    pub fn set_tuning_bank(&self, value: i32, options: &SendOptions) -> Result<()> {
        let value = self.one_based(value, "Tuning bank")?;
        self.set_registered_parameter(RegisteredParameter::TuningBank, &[value], options)
    }

    // ---- Other channel voice messages ----

    pub fn set_channel_aftertouch(&self, pressure: f64, options: &SendOptions) -> Result<()> {
        let pressure = self.seven_bit_value(pressure, options.raw_value, "Pressure")?;
        self.emit(
            &[self.status(channel_messages::CHANNEL_AFTERTOUCH), pressure],
            &options.time,
        )
    }

    /// `value` in `-1.0..=1.0`, or `0..=16383` with `raw_value`.
    pub fn set_pitch_bend(&self, value: f64, options: &SendOptions) -> Result<()> {
        let raw = if options.raw_value {
            if self.validation() && !(0.0..=16383.0).contains(&value) {
                return Err(Error::range(format!(
                    "Raw pitch bend must be between 0 and 16383, got {}",
                    value
                )));
            }
            value.round() as u16
        } else {
            if self.validation() && !(-1.0..=1.0).contains(&value) {
                return Err(Error::range(format!(
                    "Pitch bend must be between -1 and 1, got {}",
                    value
                )));
            }
            ((value + 1.0) / 2.0 * 16383.0).round() as u16
        };
        let (msb, lsb) = to_msb_lsb(raw);
        self.emit(
            &[self.status(channel_messages::PITCH_BEND), lsb, msb],
            &options.time,
        )
    }

    /// Program `1..=128`.
    pub fn set_program(&self, program: i32, options: &SendOptions) -> Result<()> {
        let program = self.one_based(program, "Program")?;
        self.emit(
            &[self.status(channel_messages::PROGRAM_CHANGE), program],
            &options.time,
        )
    }

    // ---- Internals ----

    fn status(&self, command: u8) -> u8 {
        (command << 4) | (self.inner.number - 1)
    }

    fn validation(&self) -> bool {
        self.inner.sink.settings.validation()
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::PortDestroyed(self.inner.sink.port_id()));
        }
        Ok(())
    }

    fn emit(&self, bytes: &[u8], time: &Time) -> Result<()> {
        self.ensure_alive()?;
        self.inner.sink.send(bytes, time)
    }

    fn emit_at(&self, bytes: &[u8], timestamp: f64) -> Result<()> {
        self.ensure_alive()?;
        self.inner.sink.send_at(bytes, timestamp)
    }

    fn emit_sequence(&self, sequence: &[[u8; 3]], time: &Time) -> Result<()> {
        let timestamp = self.inner.sink.timestamp(time);
        for message in sequence {
            self.emit_at(message, timestamp)?;
        }
        Ok(())
    }

    fn data_byte(&self, value: i32, what: &str) -> Result<u8> {
        if self.validation() && !(0..=127).contains(&value) {
            return Err(Error::range(format!(
                "{} must be an integer between 0 and 127, got {}",
                what, value
            )));
        }
        Ok(value as u8)
    }

    /// `1..=128` on the API, `0..=127` on the wire.
    fn one_based(&self, value: i32, what: &str) -> Result<u8> {
        if self.validation() && !(1..=128).contains(&value) {
            return Err(Error::range(format!(
                "{} must be an integer between 1 and 128, got {}",
                what, value
            )));
        }
        Ok(value.wrapping_sub(1) as u8)
    }

    fn seven_bit_value(&self, value: f64, raw: bool, what: &str) -> Result<u8> {
        if raw {
            if self.validation() && !(0.0..=127.0).contains(&value) {
                return Err(Error::range(format!(
                    "{} must be between 0 and 127, got {}",
                    what, value
                )));
            }
            Ok(value.round() as u8)
        } else {
            if self.validation() && !(0.0..=1.0).contains(&value) {
                return Err(Error::range(format!(
                    "{} must be between 0 and 1, got {}",
                    what, value
                )));
            }
            Ok(from_normalized(value))
        }
    }

    fn controller_number(&self, controller: Controller) -> Result<u8> {
        match controller {
            Controller::Name(name) => control_change_number(&name)
                .ok_or_else(|| Error::type_error(format!("Unknown controller name: {}", name))),
            Controller::Number(number) => {
                if self.validation() && !(0..=127).contains(&number) {
                    return Err(Error::range(format!(
                        "Controller numbers must be between 0 and 127, got {}",
                        number
                    )));
                }
                Ok(number as u8)
            }
        }
    }

    fn parameter_pair(&self, pair: [u8; 2]) -> Result<[u8; 2]> {
        Ok([
            self.data_byte(pair[0] as i32, "Parameter MSB")?,
            self.data_byte(pair[1] as i32, "Parameter LSB")?,
        ])
    }

    fn registered_pair(&self, parameter: Parameter) -> Result<[u8; 2]> {
        match parameter {
            Parameter::Name(name) => Ok(registered_parameter_pair(&name)?),
            Parameter::Pair(pair) => self.parameter_pair(pair),
        }
    }

    fn select_sequence(&self, set: ParameterSet, pair: [u8; 2]) -> ControlSequence {
        let status = self.status(channel_messages::CONTROL_CHANGE);
        let (msb_selector, lsb_selector) = set.selectors();
        let mut sequence = ControlSequence::new();
        sequence.push([status, msb_selector, pair[0]]);
        sequence.push([status, lsb_selector, pair[1]]);
        sequence
    }

    fn set_parameter(&self, set: ParameterSet, pair: [u8; 2], data: &[u8], time: &Time) -> Result<()> {
        if self.validation() && !(1..=2).contains(&data.len()) {
            return Err(Error::range(format!(
                "Parameter data must contain 1 or 2 bytes, got {}",
                data.len()
            )));
        }
        let status = self.status(channel_messages::CONTROL_CHANGE);
        let mut sequence = self.select_sequence(set, pair);
        if let Some(msb) = data.first() {
            sequence.push([
                status,
                parameter_controllers::DATA_ENTRY_MSB,
                self.data_byte(*msb as i32, "Parameter data")?,
            ]);
        }
        if let Some(lsb) = data.get(1) {
            sequence.push([
                status,
                parameter_controllers::DATA_ENTRY_LSB,
                self.data_byte(*lsb as i32, "Parameter data")?,
            ]);
        }
        self.emit_sequence(&sequence, time)
    }

    fn step_parameter(&self, pair: [u8; 2], controller: u8, time: &Time) -> Result<()> {
        let status = self.status(channel_messages::CONTROL_CHANGE);
        let mut sequence = self.select_sequence(ParameterSet::Registered, pair);
        sequence.push([status, controller, 0]);
        self.emit_sequence(&sequence, time)
    }

    fn build_notes(&self, notes: NoteList, options: &SendOptions) -> Result<Vec<Note>> {
        let note_options = options.note_options();
        if self.validation() {
            if options.attack.is_some()
                && resolve_velocity(options.attack, options.raw_value).is_none()
            {
                warn!("Invalid attack velocity {:?}, using default", options.attack);
            }
            if options.release.is_some()
                && resolve_velocity(options.release, options.raw_value).is_none()
            {
                warn!("Invalid release velocity {:?}, using default", options.release);
            }
        }
        let offset = self.inner.sink.settings.octave_offset()
            + self.inner.sink.octave_offset()
            + self.octave_offset();
        Ok(build_note_array(
            &notes,
            &note_options,
            &self.inner.sink.settings.defaults(),
            offset,
        )?)
    }
}
