//! The port registry: enable/disable lifecycle and hot-plug reconciliation.
//!
//! ## Quick Start
//!
//! ```ignore
//! use webmidi_io::{EnableOptions, SendOptions, VirtualHost, WebMidi};
//!
//! let host = VirtualHost::new();
//! host.plug_output("synth", "Synth");
//!
//! let midi = WebMidi::builder(host).octave_offset(0).build()?;
//! midi.enable(&EnableOptions::default())?;
//!
//! let synth = midi.get_output_by_name("Synth")?.unwrap();
//! synth.play_note("C4", &SendOptions::new().channels(1u8).duration(500.0))?;
//! ```
//!
//! Every time the host reports a device appearing or disappearing, the cached port lists
//! are reconciled against the host's current lists by handle identity: ports whose handle
//! is gone are destroyed, new handles are wrapped and opened, and untouched ports are kept
//! as they are.

mod builder;

pub use builder::WebMidiBuilder;

use crate::emitter::{EventEmitter, ListenerId, ListenerOptions};
use crate::error::{Error, Result};
use crate::event::{PortSnapshot, RefreshReport, RegistryEvent, RegistryEventData};
use crate::host::{
    same_handle, AccessOptions, Clock, MidiAccess, MidiHost, MonotonicClock, PortStateChange,
    StateChangeHandler,
};
use crate::options::EnableOptions;
use crate::port::{Input, Output};
use crate::settings::Settings;
use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};
use webmidi_core::NoteDefaults;

/// MIDI port registry. Clone is cheap (Arc internally).
#[derive(Clone)]
pub struct WebMidi {
    inner: Arc<WebMidiInner>,
}

struct WebMidiInner {
    host: Arc<dyn MidiHost>,
    client_name: Option<String>,
    settings: Arc<Settings>,
    access: RwLock<Option<Arc<dyn MidiAccess>>>,
    fallback_clock: Arc<dyn Clock>,
    inputs: ArcSwap<Vec<Input>>,
    outputs: ArcSwap<Vec<Output>>,
    // Serializes reconciliation passes per collection
    inputs_lock: Mutex<()>,
    outputs_lock: Mutex<()>,
    emitter: EventEmitter<RegistryEvent, RegistryEventData>,
}

/// Result of one collection pass. Ports are torn down and opened once the collection
/// lock is released, so listeners may call back into the registry.
struct Pass<P> {
    added: Vec<P>,
    removed: Vec<(P, PortSnapshot)>,
}

impl WebMidiInner {
    fn access(&self) -> Option<Arc<dyn MidiAccess>> {
        self.access.read().clone()
    }

    fn now(&self) -> f64 {
        match self.access() {
            Some(access) => access.clock().now(),
            None => self.fallback_clock.now(),
        }
    }

    fn emit(&self, data: RegistryEventData) {
        self.emitter.emit(data.kind, &data);
    }

    fn emit_error(&self, port: Option<PortSnapshot>, error: &Error) {
        let mut data = RegistryEventData::new(RegistryEvent::Error, self.now());
        data.port = port;
        data.error = Some(error.to_string());
        self.emit(data);
    }

    fn on_host_state_change(&self, change: &PortStateChange) {
        debug!(
            "MIDI {} {} is now {:?}",
            change.kind, change.id, change.state
        );
        self.reconcile();
    }

    fn reconcile(&self) -> RefreshReport {
        let Some(access) = self.access() else {
            return RefreshReport::default();
        };
        let clock = access.clock();

        let inputs = {
            let _guard = self.inputs_lock.lock();
            let live = access.inputs();
            let current = self.inputs.load_full();
            let (kept, removed): (Vec<Input>, Vec<Input>) = current
                .iter()
                .cloned()
                .partition(|input| live.iter().any(|h| same_handle(h, input.handle())));
            let mut next = kept;
            let mut added = Vec::new();
            for handle in live {
                if !next.iter().any(|input| same_handle(input.handle(), &handle)) {
                    let input = Input::new(handle, Arc::clone(&self.settings), Arc::clone(&clock));
                    next.push(input.clone());
                    added.push(input);
                }
            }
            self.inputs.store(Arc::new(next));
            Pass {
                added,
                removed: removed
                    .into_iter()
                    .map(|input| {
                        let snapshot = input.snapshot();
                        (input, snapshot)
                    })
                    .collect(),
            }
        };

        let outputs = {
            let _guard = self.outputs_lock.lock();
            let live = access.outputs();
            let current = self.outputs.load_full();
            let (kept, removed): (Vec<Output>, Vec<Output>) = current
                .iter()
                .cloned()
                .partition(|output| live.iter().any(|h| same_handle(h, output.handle())));
            let mut next = kept;
            let mut added = Vec::new();
            for handle in live {
                if !next.iter().any(|output| same_handle(output.handle(), &handle)) {
                    let output =
                        Output::new(handle, Arc::clone(&self.settings), Arc::clone(&clock));
                    next.push(output.clone());
                    added.push(output);
                }
            }
            self.outputs.store(Arc::new(next));
            Pass {
                added,
                removed: removed
                    .into_iter()
                    .map(|output| {
                        let snapshot = output.snapshot();
                        (output, snapshot)
                    })
                    .collect(),
            }
        };

        let mut report = RefreshReport::default();

        for (input, snapshot) in inputs.removed {
            input.destroy();
            report.removed.push(snapshot);
        }
        for (output, snapshot) in outputs.removed {
            output.destroy();
            report.removed.push(snapshot);
        }
        for input in &inputs.added {
            if let Err(e) = input.open() {
                self.emit_error(Some(input.snapshot()), &e);
            }
            report.added.push(input.snapshot());
        }
        for output in &outputs.added {
            if let Err(e) = output.open() {
                self.emit_error(Some(output.snapshot()), &e);
            }
            report.added.push(output.snapshot());
        }

        if !report.is_empty() {
            info!(
                "MIDI ports refreshed: {} added, {} removed",
                report.added.len(),
                report.removed.len()
            );
        }

        let timestamp = self.now();
        for snapshot in &report.removed {
            let mut data = RegistryEventData::new(RegistryEvent::Disconnected, timestamp);
            data.port = Some(snapshot.clone());
            self.emit(data);
        }
        for snapshot in &report.added {
            let mut data = RegistryEventData::new(RegistryEvent::Connected, timestamp);
            data.port = Some(snapshot.clone());
            self.emit(data);
        }
        let mut data = RegistryEventData::new(RegistryEvent::PortsRefreshed, timestamp);
        data.report = Some(report.clone());
        self.emit(data);

        report
    }
}

impl WebMidi {
    pub fn builder(host: impl MidiHost + 'static) -> WebMidiBuilder {
        WebMidiBuilder::new(Arc::new(host))
    }

    /// Registry with default settings.
    pub fn new(host: impl MidiHost + 'static) -> Self {
        Self::from_parts(Arc::new(host), Arc::new(Settings::default()), None)
    }

    fn from_parts(
        host: Arc<dyn MidiHost>,
        settings: Arc<Settings>,
        client_name: Option<String>,
    ) -> Self {
        Self {
            inner: Arc::new(WebMidiInner {
                host,
                client_name,
                settings,
                access: RwLock::new(None),
                fallback_clock: Arc::new(MonotonicClock::new()),
                inputs: ArcSwap::from_pointee(Vec::new()),
                outputs: ArcSwap::from_pointee(Vec::new()),
                inputs_lock: Mutex::new(()),
                outputs_lock: Mutex::new(()),
                emitter: EventEmitter::new(),
            }),
        }
    }

    // ---- Lifecycle ----

    /// Requests host access, wraps every reported port and opens it.
    ///
    /// Emits `midiaccessgranted`, then the events of the first reconciliation, then
    /// `enabled`. A denied request emits `error` and returns the host error. Calling this
    /// while enabled does nothing.
    pub fn enable(&self, options: &EnableOptions) -> Result<()> {
        if self.enabled() {
            debug!("MIDI already enabled");
            return Ok(());
        }
        if let Some(validation) = options.validation {
            self.inner.settings.set_validation(validation);
        }

        let access_options = AccessOptions {
            sysex: options.sysex,
            software: options.software,
            client_name: self.inner.client_name.clone(),
        };
        let access = match self.inner.host.request_access(&access_options) {
            Ok(access) => access,
            Err(e) => {
                warn!("MIDI access request failed: {}", e);
                self.inner.emit_error(None, &e);
                return Err(e);
            }
        };

        {
            let mut slot = self.inner.access.write();
            if slot.is_some() {
                // Lost a race with a concurrent enable()
                access.close();
                return Ok(());
            }
            *slot = Some(Arc::clone(&access));
        }
        self.inner
            .settings
            .set_sysex_enabled(access.sysex_enabled());
        self.inner.emit(RegistryEventData::new(
            RegistryEvent::MidiAccessGranted,
            self.inner.now(),
        ));

        let weak: Weak<WebMidiInner> = Arc::downgrade(&self.inner);
        let handler: StateChangeHandler = Arc::new(move |change: &PortStateChange| {
            if let Some(inner) = weak.upgrade() {
                inner.on_host_state_change(change);
            }
        });
        access.set_state_change_handler(Some(handler));

        self.inner.reconcile();

        info!(
            "MIDI enabled: {} inputs, {} outputs, sysex {}",
            self.inner.inputs.load().len(),
            self.inner.outputs.load().len(),
            if self.sysex_enabled() { "on" } else { "off" }
        );
        self.inner
            .emit(RegistryEventData::new(RegistryEvent::Enabled, self.inner.now()));
        Ok(())
    }

    /// Destroys every port, then releases host access and emits `disabled`. Calling this
    /// while disabled does nothing.
    pub fn disable(&self) {
        let Some(access) = self.inner.access.read().clone() else {
            return;
        };
        access.set_state_change_handler(None);

        let inputs = {
            let _guard = self.inner.inputs_lock.lock();
            self.inner.inputs.swap(Arc::new(Vec::new()))
        };
        let outputs = {
            let _guard = self.inner.outputs_lock.lock();
            self.inner.outputs.swap(Arc::new(Vec::new()))
        };
        for input in inputs.iter() {
            input.destroy();
        }
        for output in outputs.iter() {
            output.destroy();
        }

        let timestamp = access.clock().now();
        access.close();
        *self.inner.access.write() = None;
        self.inner.settings.set_sysex_enabled(false);

        info!("MIDI disabled");
        self.inner
            .emit(RegistryEventData::new(RegistryEvent::Disabled, timestamp));
    }

    /// Reconciles the port lists with the host right away. Backends deliver hot-plug
    /// notifications on their own; this is for backends that only poll.
    pub fn refresh(&self) -> Result<RefreshReport> {
        if !self.enabled() {
            return Err(Error::NotEnabled);
        }
        Ok(self.inner.reconcile())
    }

    pub fn enabled(&self) -> bool {
        self.inner.access.read().is_some()
    }

    /// Host clock, in milliseconds.
    pub fn time(&self) -> f64 {
        self.inner.now()
    }

    pub fn sysex_enabled(&self) -> bool {
        self.inner.settings.sysex_enabled()
    }

    // ---- Settings ----

    pub fn validation(&self) -> bool {
        self.inner.settings.validation()
    }

    pub fn set_validation(&self, enabled: bool) {
        self.inner.settings.set_validation(enabled);
    }

    pub fn octave_offset(&self) -> i32 {
        self.inner.settings.octave_offset()
    }

    pub fn set_octave_offset(&self, offset: i32) {
        self.inner.settings.set_octave_offset(offset);
    }

    pub fn defaults(&self) -> NoteDefaults {
        self.inner.settings.defaults()
    }

    pub fn set_note_defaults(&self, defaults: NoteDefaults) -> Result<()> {
        builder::check_defaults(&defaults)?;
        self.inner.settings.set_defaults(defaults);
        Ok(())
    }

    // ---- Ports ----

    /// Snapshot of the current inputs. Never blocks on a running reconciliation.
    pub fn inputs(&self) -> Arc<Vec<Input>> {
        self.inner.inputs.load_full()
    }

    pub fn outputs(&self) -> Arc<Vec<Output>> {
        self.inner.outputs.load_full()
    }

    fn check_enabled(&self) -> Result<()> {
        if self.validation() && !self.enabled() {
            return Err(Error::NotEnabled);
        }
        Ok(())
    }

    pub fn get_input_by_id(&self, id: &str) -> Result<Option<Input>> {
        self.check_enabled()?;
        Ok(self.inner.inputs.load().iter().find(|i| i.id() == id).cloned())
    }

    /// First input whose name contains `name`.
    pub fn get_input_by_name(&self, name: &str) -> Result<Option<Input>> {
        self.check_enabled()?;
        if name.is_empty() {
            return Ok(None);
        }
        Ok(self
            .inner
            .inputs
            .load()
            .iter()
            .find(|i| i.name().contains(name))
            .cloned())
    }

    pub fn get_output_by_id(&self, id: &str) -> Result<Option<Output>> {
        self.check_enabled()?;
        Ok(self.inner.outputs.load().iter().find(|o| o.id() == id).cloned())
    }

    /// First output whose name contains `name`.
    pub fn get_output_by_name(&self, name: &str) -> Result<Option<Output>> {
        self.check_enabled()?;
        if name.is_empty() {
            return Ok(None);
        }
        Ok(self
            .inner
            .outputs
            .load()
            .iter()
            .find(|o| o.name().contains(name))
            .cloned())
    }

    // ---- Events ----

    pub fn add_listener<F>(
        &self,
        kind: RegistryEvent,
        callback: F,
        options: ListenerOptions,
    ) -> ListenerId
    where
        F: Fn(&RegistryEventData) + Send + Sync + 'static,
    {
        self.inner.emitter.add_listener(kind, callback, options)
    }

    pub fn has_listener(&self, kind: RegistryEvent, id: ListenerId) -> bool {
        self.inner.emitter.has_listener(kind, id)
    }

    pub fn remove_listener(&self, kind: RegistryEvent, id: ListenerId) -> bool {
        self.inner.emitter.remove_listener(kind, id)
    }

    pub fn remove_all_listeners(&self, kind: Option<RegistryEvent>) {
        self.inner.emitter.remove_all(kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ConnectionState, VirtualHost};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn enabled(host: &VirtualHost) -> WebMidi {
        let midi = WebMidi::new(host.clone());
        midi.enable(&EnableOptions::default()).unwrap();
        midi
    }

    #[test]
    fn test_lookups_require_enable() {
        let host = VirtualHost::new();
        let midi = WebMidi::new(host.clone());
        assert_eq!(midi.get_input_by_id("x").unwrap_err(), Error::NotEnabled);
        midi.set_validation(false);
        assert!(midi.get_input_by_id("x").unwrap().is_none());
    }

    #[test]
    fn test_enable_wraps_and_opens_ports() {
        let host = VirtualHost::new();
        host.plug_input("in-1", "Keystation 49");
        host.plug_output("out-1", "Synth A");
        let midi = enabled(&host);

        assert!(midi.enabled());
        assert_eq!(midi.inputs().len(), 1);
        let output = midi.get_output_by_name("Synth").unwrap().unwrap();
        assert_eq!(output.id(), "out-1");
        assert_eq!(output.connection(), ConnectionState::Open);
        assert!(midi.get_input_by_name("").unwrap().is_none());
        assert!(midi.get_input_by_id("in-1").unwrap().is_some());
    }

    #[test]
    fn test_enable_is_idempotent() {
        let host = VirtualHost::new();
        host.plug_output("out-1", "Synth");
        let midi = enabled(&host);
        let first = midi.get_output_by_id("out-1").unwrap().unwrap();
        midi.enable(&EnableOptions::default()).unwrap();
        let again = midi.get_output_by_id("out-1").unwrap().unwrap();
        assert!(same_handle(first.handle(), again.handle()));
        assert_eq!(midi.outputs().len(), 1);
    }

    #[test]
    fn test_hot_plug_keeps_untouched_ports() {
        let host = VirtualHost::new();
        host.plug_input("a", "A");
        host.plug_input("b", "B");
        let midi = enabled(&host);
        let b = midi.get_input_by_id("b").unwrap().unwrap();
        let b_opened = Arc::new(AtomicUsize::new(0));
        let c = b_opened.clone();
        b.add_listener(
            crate::event::PortEvent::Opened,
            move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            },
            ListenerOptions::default(),
        );

        host.unplug("a");
        host.plug_input("c", "C");

        let ids: Vec<String> = midi.inputs().iter().map(|i| i.id()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        let b_after = midi.get_input_by_id("b").unwrap().unwrap();
        assert!(same_handle(b.handle(), b_after.handle()));
        assert_eq!(b_opened.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_refresh_requires_enable() {
        let host = VirtualHost::new();
        let midi = WebMidi::new(host.clone());
        assert_eq!(midi.refresh().unwrap_err(), Error::NotEnabled);
        midi.enable(&EnableOptions::default()).unwrap();
        assert!(midi.refresh().unwrap().is_empty());
    }

    #[test]
    fn test_settings() {
        let host = VirtualHost::new();
        let midi = WebMidi::builder(host)
            .validation(false)
            .octave_offset(-1)
            .client_name("tests")
            .build()
            .unwrap();
        assert!(!midi.validation());
        assert_eq!(midi.octave_offset(), -1);
        midi.set_octave_offset(2);
        assert_eq!(midi.octave_offset(), 2);

        let bad = NoteDefaults {
            attack: 2.0,
            ..NoteDefaults::default()
        };
        assert!(midi.set_note_defaults(bad).is_err());
        let quiet = NoteDefaults {
            attack: 0.25,
            ..NoteDefaults::default()
        };
        midi.set_note_defaults(quiet).unwrap();
        assert_eq!(midi.defaults(), quiet);

        assert!(WebMidi::builder(VirtualHost::new())
            .note_defaults(bad)
            .build()
            .is_err());
    }
}
