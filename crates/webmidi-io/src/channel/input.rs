//! Input channel: turns decoded channel messages into typed events.
//!
//! Each channel also assembles RPN/NRPN sequences. A sequence starts with the parameter MSB
//! selector (CC 101 or 99), is completed by the matching LSB selector (CC 100 or 98), and is
//! reported once per data entry (CC 6, then optionally CC 38) or increment/decrement
//! (CC 96/97). Any other controller on the channel resets the sequence.

use crate::emitter::{EventEmitter, ListenerId, ListenerOptions};
use crate::event::{
    ChannelEvent, ChannelEventData, ChannelValue, ParameterAction, ParameterEvent, ParameterKind,
};
use crate::port::InputContext;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use tracing::warn;
use webmidi_core::{
    control_change_name, from_msb_lsb, parameter_controllers as pc, to_normalized, ChannelMode,
    Message, MessageType, Note, NoteOptions, RegisteredParameter,
};

/// Partially received parameter sequence.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ParameterBuffer {
    kind: Option<ParameterKind>,
    msb: Option<u8>,
    lsb: Option<u8>,
    value_msb: Option<u8>,
}

impl ParameterBuffer {
    fn selected(&self) -> Option<(ParameterKind, [u8; 2])> {
        match (self.kind, self.msb, self.lsb) {
            (Some(kind), Some(msb), Some(lsb)) => Some((kind, [msb, lsb])),
            _ => None,
        }
    }

    /// Feeds one control change. Returns the completed event, if any.
    fn feed(&mut self, controller: u8, value: u8) -> Option<ParameterEvent> {
        match controller {
            pc::NRPN_MSB | pc::RPN_MSB => {
                let kind = if controller == pc::RPN_MSB {
                    ParameterKind::Registered
                } else {
                    ParameterKind::NonRegistered
                };
                *self = ParameterBuffer {
                    kind: Some(kind),
                    msb: Some(value),
                    ..Default::default()
                };
                None
            }
            pc::NRPN_LSB | pc::RPN_LSB => {
                let kind = if controller == pc::RPN_LSB {
                    ParameterKind::Registered
                } else {
                    ParameterKind::NonRegistered
                };
                if self.kind == Some(kind) && self.msb.is_some() {
                    self.lsb = Some(value);
                    self.value_msb = None;
                } else {
                    self.reset();
                }
                None
            }
            pc::DATA_ENTRY_MSB => {
                let Some((kind, pair)) = self.selected() else {
                    self.reset();
                    return None;
                };
                self.value_msb = Some(value);
                Some(Self::event(
                    kind,
                    ParameterAction::DataEntryCoarse,
                    pair,
                    Some(to_normalized(value)),
                    Some(value as u16),
                ))
            }
            pc::DATA_ENTRY_LSB => {
                let (Some((kind, pair)), Some(msb)) = (self.selected(), self.value_msb) else {
                    self.reset();
                    return None;
                };
                let raw = from_msb_lsb(msb, value);
                Some(Self::event(
                    kind,
                    ParameterAction::DataEntryFine,
                    pair,
                    Some(raw as f64 / 16383.0),
                    Some(raw),
                ))
            }
            pc::DATA_INCREMENT | pc::DATA_DECREMENT => {
                let Some((kind, pair)) = self.selected() else {
                    self.reset();
                    return None;
                };
                let action = if controller == pc::DATA_INCREMENT {
                    ParameterAction::Increment
                } else {
                    ParameterAction::Decrement
                };
                Some(Self::event(kind, action, pair, None, None))
            }
            _ => {
                self.reset();
                None
            }
        }
    }

    fn reset(&mut self) {
        *self = ParameterBuffer::default();
    }

    fn event(
        kind: ParameterKind,
        action: ParameterAction,
        pair: [u8; 2],
        value: Option<f64>,
        raw: Option<u16>,
    ) -> ParameterEvent {
        let name = match kind {
            ParameterKind::Registered => RegisteredParameter::from_pair(pair).map(|p| p.as_str()),
            ParameterKind::NonRegistered => None,
        };
        ParameterEvent {
            kind,
            action,
            pair,
            name,
            value,
            raw,
        }
    }
}

struct InputChannelInner {
    number: u8,
    context: Arc<InputContext>,
    octave_offset: AtomicI32,
    emitter: EventEmitter<ChannelEvent, ChannelEventData>,
    parameter: Mutex<ParameterBuffer>,
    destroyed: AtomicBool,
}

/// One of the 16 channels of an [`Input`](crate::Input). Cheap to clone.
#[derive(Clone)]
pub struct InputChannel {
    inner: Arc<InputChannelInner>,
}

impl InputChannel {
    pub(crate) fn new(context: Arc<InputContext>, number: u8) -> Self {
        Self {
            inner: Arc::new(InputChannelInner {
                number,
                context,
                octave_offset: AtomicI32::new(0),
                emitter: EventEmitter::new(),
                parameter: Mutex::new(ParameterBuffer::default()),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    pub fn number(&self) -> u8 {
        self.inner.number
    }

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
        self.inner.emitter.remove_all(None);
        *self.inner.parameter.lock() = ParameterBuffer::default();
    }

    pub fn add_listener<F>(
        &self,
        kind: ChannelEvent,
        callback: F,
        options: ListenerOptions,
    ) -> ListenerId
    where
        F: Fn(&ChannelEventData) + Send + Sync + 'static,
    {
        self.inner.emitter.add_listener(kind, callback, options)
    }

    pub fn has_listener(&self, kind: ChannelEvent, id: ListenerId) -> bool {
        self.inner.emitter.has_listener(kind, id)
    }

    pub fn remove_listener(&self, kind: ChannelEvent, id: ListenerId) -> bool {
        self.inner.emitter.remove_listener(kind, id)
    }

    pub fn remove_all_listeners(&self, kind: Option<ChannelEvent>) {
        self.inner.emitter.remove_all(kind);
    }

    pub(crate) fn dispatch(&self, message: &Message, timestamp: f64) {
        if self.is_destroyed() {
            return;
        }
        self.emit(ChannelEvent::MidiMessage, message, timestamp, ChannelValue::None);

        let data1 = message.data1().unwrap_or(0);
        let data2 = message.data2().unwrap_or(0);
        match message.message_type() {
            MessageType::NoteOff => {
                if let Some(note) = self.note(data1, None, Some(data2)) {
                    self.emit(ChannelEvent::NoteOff, message, timestamp, ChannelValue::Note(note));
                }
            }
            // Velocity 0 is reported as a note on; listeners decide what it means
            MessageType::NoteOn => {
                if let Some(note) = self.note(data1, Some(data2), None) {
                    self.emit(ChannelEvent::NoteOn, message, timestamp, ChannelValue::Note(note));
                }
            }
            MessageType::KeyAftertouch => {
                if let Some(note) = self.note(data1, None, None) {
                    let value = ChannelValue::KeyAftertouch {
                        note,
                        value: to_normalized(data2),
                        raw: data2,
                    };
                    self.emit(ChannelEvent::KeyAftertouch, message, timestamp, value);
                }
            }
            MessageType::ControlChange => self.control_change(message, timestamp, data1, data2),
            MessageType::ProgramChange => self.emit(
                ChannelEvent::ProgramChange,
                message,
                timestamp,
                ChannelValue::Program(data1.saturating_add(1)),
            ),
            MessageType::ChannelAftertouch => self.emit(
                ChannelEvent::ChannelAftertouch,
                message,
                timestamp,
                ChannelValue::ChannelAftertouch {
                    value: to_normalized(data1),
                    raw: data1,
                },
            ),
            MessageType::PitchBend => {
                let raw = from_msb_lsb(data2, data1);
                let value = ChannelValue::PitchBend {
                    value: raw as f64 / 16383.0 * 2.0 - 1.0,
                    raw,
                };
                self.emit(ChannelEvent::PitchBend, message, timestamp, value);
            }
            _ => self.emit(
                ChannelEvent::UnknownMessage,
                message,
                timestamp,
                ChannelValue::None,
            ),
        }
    }

    fn control_change(&self, message: &Message, timestamp: f64, controller: u8, value: u8) {
        let control = ChannelValue::Control {
            controller,
            name: control_change_name(controller),
            value: to_normalized(value),
            raw: value,
        };
        self.emit(ChannelEvent::ControlChange, message, timestamp, control);

        if let Some(mode) = ChannelMode::from_controller(controller) {
            let value = ChannelValue::ChannelMode { mode, raw: value };
            self.emit(ChannelEvent::ChannelMode, message, timestamp, value);
        }

        let completed = self.inner.parameter.lock().feed(controller, value);
        if let Some(event) = completed {
            let kind = match event.kind {
                ParameterKind::Registered => ChannelEvent::Rpn,
                ParameterKind::NonRegistered => ChannelEvent::Nrpn,
            };
            self.emit(kind, message, timestamp, ChannelValue::Parameter(event));
        }
    }

    /// Note for an incoming note number, shifted by every octave offset in effect.
    fn note(&self, number: u8, attack: Option<u8>, release: Option<u8>) -> Option<Note> {
        let offset = self.inner.context.octave_offset() + self.octave_offset();
        let options = NoteOptions {
            attack: attack.map(f64::from),
            release: release.map(f64::from),
            raw_value: true,
            duration: None,
        };
        let defaults = self.inner.context.settings.defaults();
        let number = match Note::new(number.min(127)) {
            Ok(note) => note.offset_number(offset, 0),
            Err(e) => {
                warn!("Invalid note on channel {}: {}", self.inner.number, e);
                return None;
            }
        };
        match Note::with_options(number, &options, &defaults) {
            Ok(note) => Some(note),
            Err(e) => {
                warn!("Invalid note on channel {}: {}", self.inner.number, e);
                None
            }
        }
    }

    fn emit(&self, kind: ChannelEvent, message: &Message, timestamp: f64, value: ChannelValue) {
        if !self.inner.emitter.has_listeners(kind) {
            return;
        }
        let data = ChannelEventData {
            kind,
            timestamp,
            channel: self.inner.number,
            port_id: self.inner.context.port_id.clone(),
            message: message.clone(),
            value,
        };
        self.inner.emitter.emit(kind, &data);
    }
}
