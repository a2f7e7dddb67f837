//! Input port: decodes incoming bytes and routes them to the port or one of its channels.

use super::{state_event, CHANNELS};
use crate::channel::InputChannel;
use crate::emitter::{EventEmitter, ListenerId, ListenerOptions};
use crate::error::{Error, Result};
use crate::event::{ChannelEvent, ChannelEventData, PortEvent, PortEventData, PortSnapshot};
use crate::host::{
    Clock, ConnectionState, DeviceState, MessageHandler, MidiInputHandle, PortStateChange,
    StateChangeHandler,
};
use crate::settings::Settings;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};
use webmidi_core::{sanitize_channels, ChannelSelector, Message};

/// State an input port shares with its channels.
pub(crate) struct InputContext {
    pub(crate) port_id: String,
    pub(crate) settings: Arc<Settings>,
    octave_offset: AtomicI32,
}

impl InputContext {
    /// Library offset plus port offset, in octaves.
    pub(crate) fn octave_offset(&self) -> i32 {
        self.settings.octave_offset() + self.octave_offset.load(Ordering::Relaxed)
    }
}

/// A listener registered on one channel by [`Input::add_channel_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelListener {
    pub channel: u8,
    pub id: ListenerId,
}

struct InputInner {
    handle: Arc<dyn MidiInputHandle>,
    context: Arc<InputContext>,
    clock: Arc<dyn Clock>,
    channels: RwLock<Vec<InputChannel>>,
    emitter: EventEmitter<PortEvent, PortEventData>,
    destroyed: AtomicBool,
}

impl InputInner {
    fn on_state_change(&self, change: &PortStateChange) {
        if let Some(kind) = state_event(change) {
            debug!("MIDI input {} {}", change.id, kind);
            self.emit(kind, change.timestamp, None, None);
        }
    }

    fn on_message(&self, bytes: &[u8], timestamp: f64) {
        let message = match Message::decode(bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping undecodable MIDI input on {}: {}", self.context.port_id, e);
                return;
            }
        };

        self.emit(PortEvent::MidiMessage, timestamp, Some(&message), None);

        match message.channel() {
            Some(number) => {
                let channel = self
                    .channels
                    .read()
                    .get(usize::from(number) - 1)
                    .cloned();
                if let Some(channel) = channel {
                    channel.dispatch(&message, timestamp);
                }
            }
            None => self.emit(
                PortEvent::System(message.message_type()),
                timestamp,
                Some(&message),
                None,
            ),
        }
    }

    fn emit(
        &self,
        kind: PortEvent,
        timestamp: f64,
        message: Option<&Message>,
        error: Option<String>,
    ) {
        if !self.emitter.has_listeners(kind) {
            return;
        }
        let data = PortEventData {
            kind,
            timestamp,
            port: PortSnapshot::of(self.handle.as_ref()),
            message: message.cloned(),
            error,
        };
        self.emitter.emit(kind, &data);
    }
}

/// A MIDI input port with 16 [`InputChannel`]s. Cheap to clone.
#[derive(Clone)]
pub struct Input {
    inner: Arc<InputInner>,
}

impl Input {
    pub(crate) fn new(
        handle: Arc<dyn MidiInputHandle>,
        settings: Arc<Settings>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let context = Arc::new(InputContext {
            port_id: handle.id(),
            settings,
            octave_offset: AtomicI32::new(0),
        });
        let channels = CHANNELS
            .map(|number| InputChannel::new(Arc::clone(&context), number))
            .collect();
        let inner = Arc::new(InputInner {
            handle: Arc::clone(&handle),
            context,
            clock,
            channels: RwLock::new(channels),
            emitter: EventEmitter::new(),
            destroyed: AtomicBool::new(false),
        });

        let weak: Weak<InputInner> = Arc::downgrade(&inner);
        let on_state: StateChangeHandler = Arc::new(move |change: &PortStateChange| {
            if let Some(inner) = weak.upgrade() {
                inner.on_state_change(change);
            }
        });
        handle.set_state_change_handler(Some(on_state));

        let weak: Weak<InputInner> = Arc::downgrade(&inner);
        let on_message: MessageHandler = Arc::new(move |bytes: &[u8], timestamp: f64| {
            if let Some(inner) = weak.upgrade() {
                inner.on_message(bytes, timestamp);
            }
        });
        handle.set_message_handler(Some(on_message));

        debug!("Created MIDI input port {}: {}", handle.id(), handle.name());
        Self { inner }
    }

    pub(crate) fn handle(&self) -> &Arc<dyn MidiInputHandle> {
        &self.inner.handle
    }

    pub fn id(&self) -> String {
        self.inner.handle.id()
    }

    pub fn name(&self) -> String {
        self.inner.handle.name()
    }

    pub fn manufacturer(&self) -> String {
        self.inner.handle.manufacturer()
    }

    pub fn state(&self) -> DeviceState {
        self.inner.handle.state()
    }

    pub fn connection(&self) -> ConnectionState {
        self.inner.handle.connection()
    }

    pub fn snapshot(&self) -> PortSnapshot {
        PortSnapshot::of(self.inner.handle.as_ref())
    }

    /// Port-level octave offset applied to incoming note numbers.
    pub fn octave_offset(&self) -> i32 {
        self.inner.context.octave_offset.load(Ordering::Relaxed)
    }

    pub fn set_octave_offset(&self, offset: i32) {
        self.inner
            .context
            .octave_offset
            .store(offset, Ordering::Relaxed);
    }

    /// Channels 1 to 16. Empty once the port is destroyed.
    pub fn channels(&self) -> Vec<InputChannel> {
        self.inner.channels.read().clone()
    }

    pub fn channel(&self, number: u8) -> Option<InputChannel> {
        let index = usize::from(number).checked_sub(1)?;
        self.inner.channels.read().get(index).cloned()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    /// Opens the port. A failure is also reported through an [`PortEvent::Error`] event.
    pub fn open(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(Error::PortDestroyed(self.id()));
        }
        if let Err(e) = self.inner.handle.open() {
            warn!("Failed to open MIDI input {}: {}", self.id(), e);
            let timestamp = self.inner.clock.now();
            self.inner
                .emit(PortEvent::Error, timestamp, None, Some(e.to_string()));
            return Err(e);
        }
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        self.inner.handle.close()
    }

    /// Tears the port down: listeners and host handlers are removed, the port is closed and
    /// every channel is destroyed. Idempotent.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.emitter.remove_all(None);
        self.inner.handle.set_message_handler(None);
        self.inner.handle.set_state_change_handler(None);
        if let Err(e) = self.inner.handle.close() {
            warn!("Failed to close MIDI input {}: {}", self.id(), e);
        }
        let mut channels = self.inner.channels.write();
        for channel in channels.iter() {
            channel.destroy();
        }
        channels.clear();
        debug!("Destroyed MIDI input port {}", self.id());
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

    /// Registers `callback` on every selected channel. Invalid channel numbers are skipped.
    pub fn add_channel_listener<F>(
        &self,
        kind: ChannelEvent,
        channels: impl Into<ChannelSelector>,
        callback: F,
        options: ListenerOptions,
    ) -> Vec<ChannelListener>
    where
        F: Fn(&ChannelEventData) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        self.selected_channels(&channels.into())
            .into_iter()
            .map(|channel| {
                let callback = Arc::clone(&callback);
                let id = channel.add_listener(kind, move |e| callback(e), options);
                ChannelListener {
                    channel: channel.number(),
                    id,
                }
            })
            .collect()
    }

    pub fn has_channel_listener(&self, kind: ChannelEvent, listener: &ChannelListener) -> bool {
        self.channel(listener.channel)
            .is_some_and(|channel| channel.has_listener(kind, listener.id))
    }

    pub fn remove_channel_listener(&self, kind: ChannelEvent, listener: &ChannelListener) -> bool {
        self.channel(listener.channel)
            .is_some_and(|channel| channel.remove_listener(kind, listener.id))
    }

    /// Removes every listener for `kind` (or every listener) on the selected channels.
    pub fn remove_channel_listeners(
        &self,
        kind: Option<ChannelEvent>,
        channels: impl Into<ChannelSelector>,
    ) {
        for channel in self.selected_channels(&channels.into()) {
            channel.remove_all_listeners(kind);
        }
    }

    fn selected_channels(&self, selector: &ChannelSelector) -> Vec<InputChannel> {
        let channels = self.inner.channels.read();
        sanitize_channels(selector)
            .into_iter()
            .filter_map(|number| channels.get(usize::from(number) - 1).cloned())
            .collect()
    }
}

impl std::fmt::Debug for Input {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Input")
            .field("id", &self.id())
            .field("name", &self.name())
            .finish()
    }
}
