//! Output port: raw and system messages, sysex, and port-wide fan-out of channel messages.

use super::scheduler::Scheduler;
use super::{state_event, CHANNELS};
use crate::channel::{ControlValue, Controller, OutputChannel, Parameter, PolyphonicMode};
use crate::emitter::{EventEmitter, ListenerId, ListenerOptions};
use crate::error::{Error, Result};
use crate::event::{PortEvent, PortEventData, PortSnapshot};
use crate::host::{
    Clock, ConnectionState, DeviceState, MidiOutputHandle, PortStateChange, StateChangeHandler,
};
use crate::options::SendOptions;
use crate::settings::Settings;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, warn};
use webmidi_core::{
    frame_sysex, frame_sysex_vec, sanitize_channels, system_messages, to_msb_lsb, to_timestamp,
    NoteList, Time,
};

/// Everything a channel needs to put bytes on the wire.
///
/// Sends whose effective timestamp is in the future go through the scheduler; everything
/// else is handed to the host immediately.
pub(crate) struct OutputSink {
    handle: Arc<dyn MidiOutputHandle>,
    pub(crate) settings: Arc<Settings>,
    clock: Arc<dyn Clock>,
    scheduler: Scheduler,
    octave_offset: AtomicI32,
    destroyed: AtomicBool,
}

impl OutputSink {
    fn new(
        handle: Arc<dyn MidiOutputHandle>,
        settings: Arc<Settings>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            scheduler: Scheduler::new(handle.name(), Arc::clone(&handle)),
            handle,
            settings,
            clock,
            octave_offset: AtomicI32::new(0),
            destroyed: AtomicBool::new(false),
        }
    }

    pub(crate) fn port_id(&self) -> String {
        self.handle.id()
    }

    pub(crate) fn octave_offset(&self) -> i32 {
        self.octave_offset.load(Ordering::Relaxed)
    }

    /// Effective timestamp of `time`, in host clock milliseconds.
    pub(crate) fn timestamp(&self, time: &Time) -> f64 {
        to_timestamp(time, self.clock.now())
    }

    pub(crate) fn send_at(&self, bytes: &[u8], timestamp: f64) -> Result<()> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(Error::PortDestroyed(self.port_id()));
        }
        let now = self.clock.now();
        if timestamp <= now {
            self.handle.send(bytes, now)
        } else {
            let delay = Duration::try_from_secs_f64((timestamp - now) / 1000.0).map_err(|_| {
                Error::range(format!(
                    "Timestamp {} is too far in the future to be scheduled",
                    timestamp
                ))
            })?;
            self.scheduler.schedule(delay, bytes.to_vec(), timestamp)
        }
    }

    pub(crate) fn send(&self, bytes: &[u8], time: &Time) -> Result<()> {
        self.send_at(bytes, self.timestamp(time))
    }

    /// [`send`](Self::send) for caller-supplied bytes: the status byte is checked first.
    pub(crate) fn send_checked(&self, bytes: &[u8], time: &Time) -> Result<()> {
        if self.settings.validation() {
            match bytes.first() {
                Some(status) if *status >= 0x80 => {}
                _ => {
                    return Err(Error::range(
                        "The first byte (status) must be an integer between 128 and 255",
                    ))
                }
            }
        }
        self.send(bytes, time)
    }
}

struct OutputInner {
    sink: Arc<OutputSink>,
    channels: RwLock<Vec<OutputChannel>>,
    emitter: EventEmitter<PortEvent, PortEventData>,
}

impl OutputInner {
    fn on_state_change(&self, change: &PortStateChange) {
        if let Some(kind) = state_event(change) {
            debug!("MIDI output {} {}", change.id, kind);
            self.emit(kind, change.timestamp, None);
        }
    }

    fn emit(&self, kind: PortEvent, timestamp: f64, error: Option<String>) {
        if !self.emitter.has_listeners(kind) {
            return;
        }
        let data = PortEventData {
            kind,
            timestamp,
            port: PortSnapshot::of(self.sink.handle.as_ref()),
            message: None,
            error,
        };
        self.emitter.emit(kind, &data);
    }
}

/// A MIDI output port with 16 [`OutputChannel`]s. Cheap to clone.
#[derive(Clone)]
pub struct Output {
    inner: Arc<OutputInner>,
}

impl Output {
    pub(crate) fn new(
        handle: Arc<dyn MidiOutputHandle>,
        settings: Arc<Settings>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let sink = Arc::new(OutputSink::new(Arc::clone(&handle), settings, clock));
        let channels = CHANNELS
            .map(|number| OutputChannel::new(Arc::clone(&sink), number))
            .collect();
        let inner = Arc::new(OutputInner {
            sink,
            channels: RwLock::new(channels),
            emitter: EventEmitter::new(),
        });

        let weak: Weak<OutputInner> = Arc::downgrade(&inner);
        let handler: StateChangeHandler = Arc::new(move |change: &PortStateChange| {
            if let Some(inner) = weak.upgrade() {
                inner.on_state_change(change);
            }
        });
        handle.set_state_change_handler(Some(handler));

        debug!("Created MIDI output port {}: {}", handle.id(), handle.name());
        Self { inner }
    }

    pub(crate) fn handle(&self) -> &Arc<dyn MidiOutputHandle> {
        &self.inner.sink.handle
    }

    pub fn id(&self) -> String {
        self.inner.sink.handle.id()
    }

    pub fn name(&self) -> String {
        self.inner.sink.handle.name()
    }

    pub fn manufacturer(&self) -> String {
        self.inner.sink.handle.manufacturer()
    }

    pub fn state(&self) -> DeviceState {
        self.inner.sink.handle.state()
    }

    pub fn connection(&self) -> ConnectionState {
        self.inner.sink.handle.connection()
    }

    pub fn snapshot(&self) -> PortSnapshot {
        PortSnapshot::of(self.inner.sink.handle.as_ref())
    }

    /// Port-level octave offset, added to the library and channel offsets for note names.
    pub fn octave_offset(&self) -> i32 {
        self.inner.sink.octave_offset()
    }

    pub fn set_octave_offset(&self, offset: i32) {
        self.inner.sink.octave_offset.store(offset, Ordering::Relaxed);
    }

    /// Channels 1 to 16. Empty once the port is destroyed.
    pub fn channels(&self) -> Vec<OutputChannel> {
        self.inner.channels.read().clone()
    }

    pub fn channel(&self, number: u8) -> Option<OutputChannel> {
        let index = usize::from(number).checked_sub(1)?;
        self.inner.channels.read().get(index).cloned()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.sink.destroyed.load(Ordering::Acquire)
    }

    /// Opens the port. A failure is also reported through an [`PortEvent::Error`] event.
    pub fn open(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::PortDestroyed(self.id()));
        }
        if let Err(e) = self.inner.sink.handle.open() {
            warn!("Failed to open MIDI output {}: {}", self.id(), e);
            let timestamp = self.inner.sink.clock.now();
            self.inner.emit(PortEvent::Error, timestamp, Some(e.to_string()));
            return Err(e);
        }
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        self.inner.sink.handle.close()
    }

    /// Tears the port down: listeners are removed, pending sends are dropped, the port is
    /// closed and every channel is destroyed. Idempotent.
    pub fn destroy(&self) {
        if self.inner.sink.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.emitter.remove_all(None);
        self.inner.sink.handle.set_state_change_handler(None);
        self.inner.sink.scheduler.shutdown();
        if let Err(e) = self.inner.sink.handle.close() {
            warn!("Failed to close MIDI output {}: {}", self.id(), e);
        }
        let mut channels = self.inner.channels.write();
        for channel in channels.iter() {
            channel.destroy();
        }
        channels.clear();
        debug!("Destroyed MIDI output port {}", self.id());
    }

    /// Drops sends that are scheduled but not yet handed to the host, and asks the host to
    /// drop whatever it has queued.
    pub fn clear(&self) {
        self.inner.sink.scheduler.clear();
        self.inner.sink.handle.clear();
    }

    /// Number of sends waiting for their timestamp.
    pub fn pending(&self) -> usize {
        self.inner.sink.scheduler.pending()
    }

    // ---- Events ----

    pub fn add_listener<F>(&self, kind: PortEvent, callback: F, options: ListenerOptions) -> ListenerId
    where
        F: Fn(&PortEventData) + Send + Sync + 'static,
    {
        self.inner.emitter.add_listener(kind, callback, options)
    }

    pub fn has_listener(&self, kind: PortEvent, id: ListenerId) -> bool {
        self.inner.emitter.has_listener(kind, id)
    }

    pub fn remove_listener(&self, kind: PortEvent, id: ListenerId) -> bool {
        self.inner.emitter.remove_listener(kind, id)
    }

    pub fn remove_all_listeners(&self, kind: Option<PortEvent>) {
        self.inner.emitter.remove_all(kind);
    }

    // ---- Raw, sysex and system messages ----

    /// Sends raw bytes. With validation on, the first byte must be a status byte.
    pub fn send(&self, message: &[u8], options: &SendOptions) -> Result<()> {
        self.inner.sink.send_checked(message, &options.time)
    }

    /// Frames `data` as `F0 manufacturer... data... F7` and sends it.
    pub fn send_sysex(&self, manufacturer: &[u8], data: &[u8], options: &SendOptions) -> Result<()> {
        self.check_sysex(manufacturer, data)?;
        let message = frame_sysex(manufacturer, data);
        self.inner.sink.send(&message, &options.time)
    }

    /// [`send_sysex`](Self::send_sysex) taking ownership of the payload buffer.
    pub fn send_sysex_vec(
        &self,
        manufacturer: &[u8],
        data: Vec<u8>,
        options: &SendOptions,
    ) -> Result<()> {
        self.check_sysex(manufacturer, &data)?;
        let message = frame_sysex_vec(manufacturer, data);
        self.inner.sink.send(&message, &options.time)
    }

    fn check_sysex(&self, manufacturer: &[u8], data: &[u8]) -> Result<()> {
        if !self.inner.sink.settings.validation() {
            return Ok(());
        }
        if !self.inner.sink.settings.sysex_enabled() {
            return Err(Error::SysexDisabled);
        }
        if !matches!(manufacturer.len(), 1 | 3) {
            return Err(Error::type_error(
                "The manufacturer id must be 1 or 3 bytes long",
            ));
        }
        if manufacturer.iter().chain(data).any(|b| *b > 127) {
            return Err(Error::range("Sysex data bytes must be between 0 and 127"));
        }
        Ok(())
    }

    fn system(&self, status: u8, options: &SendOptions) -> Result<()> {
        self.inner.sink.send(&[status], &options.time)
    }

    pub fn send_clock(&self, options: &SendOptions) -> Result<()> {
        self.system(system_messages::CLOCK, options)
    }

    pub fn send_start(&self, options: &SendOptions) -> Result<()> {
        self.system(system_messages::START, options)
    }

    pub fn send_continue(&self, options: &SendOptions) -> Result<()> {
        self.system(system_messages::CONTINUE, options)
    }

    pub fn send_stop(&self, options: &SendOptions) -> Result<()> {
        self.system(system_messages::STOP, options)
    }

    pub fn send_active_sensing(&self, options: &SendOptions) -> Result<()> {
        self.system(system_messages::ACTIVE_SENSING, options)
    }

    pub fn send_reset(&self, options: &SendOptions) -> Result<()> {
        self.system(system_messages::RESET, options)
    }

    pub fn send_tune_request(&self, options: &SendOptions) -> Result<()> {
        self.system(system_messages::TUNE_REQUEST, options)
    }

    /// Song position in MIDI beats (sixteenth notes), `0..=16383`.
    pub fn set_song_position(&self, value: i32, options: &SendOptions) -> Result<()> {
        let value = if self.inner.sink.settings.validation() {
            if !(0..=16383).contains(&value) {
                return Err(Error::range(format!(
                    "Song position must be between 0 and 16383, got {}",
                    value
                )));
            }
            value as u16
        } else {
            value.clamp(0, 16383) as u16
        };
        let (msb, lsb) = to_msb_lsb(value);
        self.inner
            .sink
            .send(&[system_messages::SONG_POSITION, msb, lsb], &options.time)
    }

    /// Song number `1..=128`, sent as given. 128 does not fit a data byte and goes out
    /// as `0x80`.
    pub fn set_song(&self, value: i32, options: &SendOptions) -> Result<()> {
        if self.inner.sink.settings.validation() && !(1..=128).contains(&value) {
            return Err(Error::range(format!(
                "Song number must be between 1 and 128, got {}",
                value
            )));
        }
        self.inner.sink.send(
            &[system_messages::SONG_SELECT, value as u8],
            &options.time,
        )
    }

    pub fn send_timecode_quarter_frame(&self, value: i32, options: &SendOptions) -> Result<()> {
        if self.inner.sink.settings.validation() && !(0..=127).contains(&value) {
            return Err(Error::range(format!(
                "Timecode quarter frame must be between 0 and 127, got {}",
                value
            )));
        }
        self.inner
            .sink
            .send(&[system_messages::TIMECODE, value as u8], &options.time)
    }

    // ---- Channel fan-out ----

    fn for_each_channel<F>(&self, options: &SendOptions, mut f: F) -> Result<()>
    where
        F: FnMut(&OutputChannel) -> Result<()>,
    {
        if self.is_destroyed() {
            return Err(Error::PortDestroyed(self.id()));
        }
        let channels = self.channels();
        for number in sanitize_channels(&options.channels) {
            if let Some(channel) = channels.get(usize::from(number) - 1) {
                f(channel)?;
            }
        }
        Ok(())
    }

    pub fn send_note_on(&self, note: impl Into<NoteList>, options: &SendOptions) -> Result<()> {
        let note = note.into();
        self.for_each_channel(options, |ch| ch.send_note_on(note.clone(), options))
    }

    pub fn send_note_off(&self, note: impl Into<NoteList>, options: &SendOptions) -> Result<()> {
        let note = note.into();
        self.for_each_channel(options, |ch| ch.send_note_off(note.clone(), options))
    }

    pub fn stop_note(&self, note: impl Into<NoteList>, options: &SendOptions) -> Result<()> {
        self.send_note_off(note, options)
    }

    pub fn play_note(&self, note: impl Into<NoteList>, options: &SendOptions) -> Result<()> {
        let note = note.into();
        self.for_each_channel(options, |ch| ch.play_note(note.clone(), options))
    }

    pub fn set_key_aftertouch(
        &self,
        note: impl Into<NoteList>,
        pressure: f64,
        options: &SendOptions,
    ) -> Result<()> {
        let note = note.into();
        self.for_each_channel(options, |ch| {
            ch.set_key_aftertouch(note.clone(), pressure, options)
        })
    }

    pub fn send_control_change(
        &self,
        controller: impl Into<Controller>,
        value: impl Into<ControlValue>,
        options: &SendOptions,
    ) -> Result<()> {
        let controller = controller.into();
        let value = value.into();
        self.for_each_channel(options, |ch| {
            ch.send_control_change(controller.clone(), value, options)
        })
    }

    pub fn send_channel_mode(
        &self,
        command: impl Into<Controller>,
        value: i32,
        options: &SendOptions,
    ) -> Result<()> {
        let command = command.into();
        self.for_each_channel(options, |ch| {
            ch.send_channel_mode(command.clone(), value, options)
        })
    }

    pub fn turn_sound_off(&self, options: &SendOptions) -> Result<()> {
        self.for_each_channel(options, |ch| ch.turn_sound_off(options))
    }

    pub fn turn_notes_off(&self, options: &SendOptions) -> Result<()> {
        self.for_each_channel(options, |ch| ch.turn_notes_off(options))
    }

    pub fn reset_all_controllers(&self, options: &SendOptions) -> Result<()> {
        self.for_each_channel(options, |ch| ch.reset_all_controllers(options))
    }

    pub fn set_local_control(&self, enabled: bool, options: &SendOptions) -> Result<()> {
        self.for_each_channel(options, |ch| ch.set_local_control(enabled, options))
    }

    pub fn set_omni_mode(&self, enabled: bool, options: &SendOptions) -> Result<()> {
        self.for_each_channel(options, |ch| ch.set_omni_mode(enabled, options))
    }

    pub fn set_polyphonic_mode(&self, mode: PolyphonicMode, options: &SendOptions) -> Result<()> {
        self.for_each_channel(options, |ch| ch.set_polyphonic_mode(mode, options))
    }

    pub fn set_registered_parameter(
        &self,
        parameter: impl Into<Parameter>,
        data: &[u8],
        options: &SendOptions,
    ) -> Result<()> {
        let parameter = parameter.into();
        self.for_each_channel(options, |ch| {
            ch.set_registered_parameter(parameter.clone(), data, options)
        })
    }

    pub fn set_non_registered_parameter(
        &self,
        parameter: [u8; 2],
        data: &[u8],
        options: &SendOptions,
    ) -> Result<()> {
        self.for_each_channel(options, |ch| {
            ch.set_non_registered_parameter(parameter, data, options)
        })
    }

    pub fn increment_registered_parameter(
        &self,
        parameter: impl Into<Parameter>,
        options: &SendOptions,
    ) -> Result<()> {
        let parameter = parameter.into();
        self.for_each_channel(options, |ch| {
            ch.increment_registered_parameter(parameter.clone(), options)
        })
    }

    pub fn decrement_registered_parameter(
        &self,
        parameter: impl Into<Parameter>,
        options: &SendOptions,
    ) -> Result<()> {
        let parameter = parameter.into();
        self.for_each_channel(options, |ch| {
            ch.decrement_registered_parameter(parameter.clone(), options)
        })
    }

    pub fn set_pitch_bend_range(&self, semitones: i32, cents: i32, options: &SendOptions) -> Result<()> {
        self.for_each_channel(options, |ch| ch.set_pitch_bend_range(semitones, cents, options))
    }

    pub fn set_modulation_range(&self, semitones: i32, cents: i32, options: &SendOptions) -> Result<()> {
        self.for_each_channel(options, |ch| ch.set_modulation_range(semitones, cents, options))
    }

    pub fn set_master_tuning(&self, value: f64, options: &SendOptions) -> Result<()> {
        self.for_each_channel(options, |ch| ch.set_master_tuning(value, options))
    }

    pub fn set_tuning_program(&self, value: i32, options: &SendOptions) -> Result<()> {
        self.for_each_channel(options, |ch| ch.set_tuning_program(value, options))
    }

    pub fn set_tuning_bank(&self, value: i32, options: &SendOptions) -> Result<()> {
        self.for_each_channel(options, |ch| ch.set_tuning_bank(value, options))
    }

    pub fn set_channel_aftertouch(&self, pressure: f64, options: &SendOptions) -> Result<()> {
        self.for_each_channel(options, |ch| ch.set_channel_aftertouch(pressure, options))
    }

    pub fn set_pitch_bend(&self, value: f64, options: &SendOptions) -> Result<()> {
        self.for_each_channel(options, |ch| ch.set_pitch_bend(value, options))
    }

    pub fn set_program(&self, program: i32, options: &SendOptions) -> Result<()> {
        self.for_each_channel(options, |ch| ch.set_program(program, options))
    }
}

impl std::fmt::Debug for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Output")
            .field("id", &self.id())
            .field("name", &self.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{MidiPortHandle, VirtualHost, VirtualOutput};
    use std::sync::atomic::AtomicUsize;

    fn output() -> (Output, Arc<VirtualOutput>, Arc<Settings>) {
        let host = VirtualHost::new();
        let port = host.plug_output("out-1", "Synth");
        let settings = Arc::new(Settings::default());
        settings.set_sysex_enabled(true);
        let output = Output::new(port.clone(), settings.clone(), host.clock());
        (output, port, settings)
    }

    #[test]
    fn test_channels() {
        let (output, _, _) = output();
        assert_eq!(output.channels().len(), 16);
        assert_eq!(output.channel(16).map(|c| c.number()), Some(16));
        assert!(output.channel(0).is_none());
        assert!(output.channel(17).is_none());
    }

    #[test]
    fn test_send_validates_status() {
        let (output, port, settings) = output();
        assert!(output.send(&[0x40, 1], &SendOptions::default()).is_err());
        assert!(output.send(&[], &SendOptions::default()).is_err());
        output.send(&[0x90, 60, 100], &SendOptions::default()).unwrap();
        settings.set_validation(false);
        output.send(&[0x40, 1], &SendOptions::default()).unwrap();
        assert_eq!(port.sent_bytes(), vec![vec![0x90, 60, 100], vec![0x40, 1]]);
    }

    #[test]
    fn test_system_messages() {
        let (output, port, _) = output();
        let opts = SendOptions::default();
        output.send_clock(&opts).unwrap();
        output.send_start(&opts).unwrap();
        output.send_continue(&opts).unwrap();
        output.send_stop(&opts).unwrap();
        output.send_active_sensing(&opts).unwrap();
        output.send_reset(&opts).unwrap();
        output.send_tune_request(&opts).unwrap();
        output.set_song(1, &opts).unwrap();
        output.send_timecode_quarter_frame(0x35, &opts).unwrap();
        assert_eq!(
            port.sent_bytes(),
            vec![
                vec![0xF8],
                vec![0xFA],
                vec![0xFB],
                vec![0xFC],
                vec![0xFE],
                vec![0xFF],
                vec![0xF6],
                vec![0xF3, 1],
                vec![0xF1, 0x35]
            ]
        );
        assert!(output.set_song(0, &opts).is_err());
        assert!(output.set_song(129, &opts).is_err());
    }

    #[test]
    fn test_song_position() {
        let (output, port, _) = output();
        let opts = SendOptions::default();
        output.set_song_position(16383, &opts).unwrap();
        output.set_song_position(0, &opts).unwrap();
        output.set_song_position(128, &opts).unwrap();
        assert!(output.set_song_position(16384, &opts).is_err());
        assert_eq!(
            port.sent_bytes(),
            vec![vec![0xF2, 0x7F, 0x7F], vec![0xF2, 0, 0], vec![0xF2, 1, 0]]
        );
    }

    #[test]
    fn test_sysex() {
        let (output, port, settings) = output();
        let opts = SendOptions::default();
        output.send_sysex(&[0x42], &[1, 2, 3], &opts).unwrap();
        output
            .send_sysex_vec(&[0x00, 0x21, 0x09], vec![4, 5], &opts)
            .unwrap();
        assert_eq!(
            port.sent_bytes(),
            vec![
                vec![0xF0, 0x42, 1, 2, 3, 0xF7],
                vec![0xF0, 0x00, 0x21, 0x09, 4, 5, 0xF7]
            ]
        );

        assert!(output.send_sysex(&[0x42, 0x01], &[1], &opts).is_err());
        assert!(output.send_sysex(&[0x42], &[200], &opts).is_err());
        settings.set_sysex_enabled(false);
        assert_eq!(
            output.send_sysex(&[0x42], &[1], &opts),
            Err(Error::SysexDisabled)
        );
    }

    #[test]
    fn test_fan_out_over_selected_channels() {
        let (output, port, _) = output();
        output
            .send_control_change(7u8, 100u8, &SendOptions::new().channels([1u8, 3]))
            .unwrap();
        assert_eq!(
            port.sent_bytes(),
            vec![vec![0xB0, 7, 100], vec![0xB2, 7, 100]]
        );
        output.turn_notes_off(&SendOptions::default()).unwrap();
        assert_eq!(port.sent_bytes().len(), 16);
    }

    #[test]
    fn test_scheduled_send_and_clear() {
        let (output, port, _) = output();
        output
            .send_start(&SendOptions::new().after(500.0))
            .unwrap();
        assert_eq!(output.pending(), 1);
        output.clear();
        assert_eq!(output.pending(), 0);
        assert_eq!(port.clear_count(), 1);
        assert!(port.recv_timeout(Duration::from_millis(700)).is_none());
    }

    #[test]
    fn test_state_events() {
        let (output, port, _) = output();
        let opened = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        let o = opened.clone();
        output.add_listener(
            PortEvent::Opened,
            move |e| {
                assert_eq!(e.port.connection, ConnectionState::Open);
                o.fetch_add(1, Ordering::SeqCst);
            },
            ListenerOptions::default(),
        );
        let c = closed.clone();
        output.add_listener(
            PortEvent::Closed,
            move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            },
            ListenerOptions::default(),
        );

        output.open().unwrap();
        output.close().unwrap();
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        port.set_fail_open(true);
        let errors = Arc::new(AtomicUsize::new(0));
        let e = errors.clone();
        output.add_listener(
            PortEvent::Error,
            move |_| {
                e.fetch_add(1, Ordering::SeqCst);
            },
            ListenerOptions::once(),
        );
        assert!(output.open().is_err());
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_song_select_sends_value() {
        let (output, port, _) = output();
        let opts = SendOptions::default();
        output.set_song(5, &opts).unwrap();
        output.set_song(127, &opts).unwrap();
        assert_eq!(port.sent_bytes(), vec![vec![0xF3, 5], vec![0xF3, 127]]);
    }

    #[test]
    fn test_unschedulable_time_is_rejected() {
        let (output, port, _) = output();
        let far: Time = "+1e30".parse().unwrap();
        let result = output.send_clock(&SendOptions::new().time(far));
        assert!(matches!(
            result,
            Err(Error::Core(webmidi_core::Error::Range(_)))
        ));
        assert_eq!(output.pending(), 0);

        let result = output.send_note_on(60u8, &SendOptions::new().channels(1u8).time(far));
        assert!(result.is_err());
        assert!(port.sent_bytes().is_empty());
    }

    #[test]
    fn test_play_note_rejects_endless_duration() {
        let (output, port, _) = output();
        let result = output.play_note(
            60u8,
            &SendOptions::new().channels(1u8).duration(f64::INFINITY),
        );
        assert!(matches!(
            result,
            Err(Error::Core(webmidi_core::Error::Range(_)))
        ));
        assert!(port.sent_bytes().is_empty());
        assert_eq!(output.pending(), 0);
    }

    #[test]
    fn test_destroy() {
        let (output, port, _) = output();
        let channel = output.channel(1).unwrap();
        output.send_stop(&SendOptions::new().after(50.0)).unwrap();
        output.destroy();
        output.destroy();

        assert!(output.is_destroyed());
        assert!(output.channels().is_empty());
        assert!(channel.is_destroyed());
        assert_eq!(port.connection(), ConnectionState::Closed);
        assert!(matches!(
            output.send_clock(&SendOptions::default()),
            Err(Error::PortDestroyed(_))
        ));
        assert!(port.recv_timeout(Duration::from_millis(150)).is_none());
    }
}
