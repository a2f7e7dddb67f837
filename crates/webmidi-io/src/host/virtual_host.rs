//! In-process MIDI host with hot-pluggable virtual ports.
//!
//! Incoming bytes are injected with [`VirtualInput::inject`]; everything handed to a
//! [`VirtualOutput`] is captured and can be drained with [`VirtualOutput::sent`] or awaited
//! with [`VirtualOutput::recv_timeout`].

use super::{
    AccessOptions, Clock, ConnectionState, DeviceState, MessageHandler, MidiAccess, MidiHost,
    MidiInputHandle, MidiOutputHandle, MidiPortHandle, MonotonicClock, PortKind, PortStateChange,
    StateChangeHandler,
};
use crate::error::{Error, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A message captured by a [`VirtualOutput`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub bytes: Vec<u8>,
    pub timestamp: f64,
}

struct PortCore {
    id: String,
    name: String,
    manufacturer: String,
    kind: PortKind,
    state: RwLock<(DeviceState, ConnectionState)>,
    fail_open: AtomicBool,
    handler: RwLock<Option<StateChangeHandler>>,
    clock: Arc<MonotonicClock>,
}

impl PortCore {
    fn new(id: &str, name: &str, kind: PortKind, clock: Arc<MonotonicClock>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            manufacturer: "webmidi".to_string(),
            kind,
            state: RwLock::new((DeviceState::Connected, ConnectionState::Closed)),
            fail_open: AtomicBool::new(false),
            handler: RwLock::new(None),
            clock,
        }
    }

    fn change(&self) -> PortStateChange {
        let (state, connection) = *self.state.read();
        PortStateChange {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: self.kind,
            state,
            connection,
            timestamp: self.clock.now(),
        }
    }

    /// Handlers run without any lock held; they may call back into the host.
    fn notify(&self) {
        let handler = self.handler.read().clone();
        if let Some(handler) = handler {
            handler(&self.change());
        }
    }

    fn open(&self) -> Result<()> {
        {
            let mut state = self.state.write();
            if state.0 == DeviceState::Disconnected {
                return Err(Error::Port(format!("Port {} is disconnected", self.id)));
            }
            if self.fail_open.load(Ordering::Acquire) {
                return Err(Error::Port(format!("Port {} could not be opened", self.id)));
            }
            if state.1 == ConnectionState::Open {
                return Ok(());
            }
            state.1 = ConnectionState::Open;
        }
        self.notify();
        Ok(())
    }

    fn close(&self) -> Result<()> {
        {
            let mut state = self.state.write();
            if state.1 == ConnectionState::Closed {
                return Ok(());
            }
            state.1 = ConnectionState::Closed;
        }
        self.notify();
        Ok(())
    }

    fn unplug(&self) {
        {
            let mut state = self.state.write();
            state.0 = DeviceState::Disconnected;
            if state.1 == ConnectionState::Open {
                state.1 = ConnectionState::Pending;
            }
        }
        self.notify();
    }

    fn is_open(&self) -> bool {
        self.state.read().1 == ConnectionState::Open
    }
}

macro_rules! impl_port_handle {
    ($t:ty) => {
        impl MidiPortHandle for $t {
            fn id(&self) -> String {
                self.core.id.clone()
            }

            fn name(&self) -> String {
                self.core.name.clone()
            }

            fn manufacturer(&self) -> String {
                self.core.manufacturer.clone()
            }

            fn kind(&self) -> PortKind {
                self.core.kind
            }

            fn state(&self) -> DeviceState {
                self.core.state.read().0
            }

            fn connection(&self) -> ConnectionState {
                self.core.state.read().1
            }

            fn open(&self) -> Result<()> {
                self.core.open()
            }

            fn close(&self) -> Result<()> {
                self.core.close()
            }

            fn set_state_change_handler(&self, handler: Option<StateChangeHandler>) {
                *self.core.handler.write() = handler;
            }
        }

        impl $t {
            /// Makes the next `open()` calls fail until reset.
            pub fn set_fail_open(&self, fail: bool) {
                self.core.fail_open.store(fail, Ordering::Release);
            }
        }
    };
}

pub struct VirtualInput {
    core: PortCore,
    message_handler: RwLock<Option<MessageHandler>>,
}

impl_port_handle!(VirtualInput);

impl MidiInputHandle for VirtualInput {
    fn set_message_handler(&self, handler: Option<MessageHandler>) {
        *self.message_handler.write() = handler;
    }
}

impl VirtualInput {
    /// Delivers `bytes` as if received from the device. Returns `false` when the port is
    /// not open or nobody listens.
    pub fn inject(&self, bytes: &[u8]) -> bool {
        if !self.core.is_open() {
            return false;
        }
        let handler = self.message_handler.read().clone();
        match handler {
            Some(handler) => {
                handler(bytes, self.core.clock.now());
                true
            }
            None => false,
        }
    }
}

pub struct VirtualOutput {
    core: PortCore,
    sent_tx: Sender<SentMessage>,
    sent_rx: Receiver<SentMessage>,
    clears: AtomicUsize,
}

impl_port_handle!(VirtualOutput);

impl MidiOutputHandle for VirtualOutput {
    fn send(&self, bytes: &[u8], timestamp: f64) -> Result<()> {
        // Sending on a closed port opens it implicitly
        if !self.core.is_open() {
            self.core.open()?;
        }
        self.sent_tx
            .send(SentMessage {
                bytes: bytes.to_vec(),
                timestamp,
            })
            .map_err(|e| Error::Port(e.to_string()))
    }

    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::AcqRel);
    }
}

impl VirtualOutput {
    /// Drains every captured message.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent_rx.try_iter().collect()
    }

    /// Drains captured messages, keeping only their bytes.
    pub fn sent_bytes(&self) -> Vec<Vec<u8>> {
        self.sent_rx.try_iter().map(|m| m.bytes).collect()
    }

    /// Waits for the next captured message.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<SentMessage> {
        match self.sent_rx.recv_timeout(timeout) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Number of `clear()` calls received.
    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::Acquire)
    }
}

struct VirtualHostInner {
    inputs: RwLock<Vec<Arc<VirtualInput>>>,
    outputs: RwLock<Vec<Arc<VirtualOutput>>>,
    handler: RwLock<Option<StateChangeHandler>>,
    deny_access: AtomicBool,
    sysex_allowed: AtomicBool,
    clock: Arc<MonotonicClock>,
}

impl VirtualHostInner {
    fn notify(&self, change: PortStateChange) {
        let handler = self.handler.read().clone();
        if let Some(handler) = handler {
            handler(&change);
        }
    }
}

/// In-process [`MidiHost`]. Cheap to clone; clones share the same ports.
#[derive(Clone)]
pub struct VirtualHost {
    inner: Arc<VirtualHostInner>,
}

impl Default for VirtualHost {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualHost {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(VirtualHostInner {
                inputs: RwLock::new(Vec::new()),
                outputs: RwLock::new(Vec::new()),
                handler: RwLock::new(None),
                deny_access: AtomicBool::new(false),
                sysex_allowed: AtomicBool::new(true),
                clock: Arc::new(MonotonicClock::new()),
            }),
        }
    }

    /// Rejects subsequent access requests, as a user denying permission would.
    pub fn set_deny_access(&self, deny: bool) {
        self.inner.deny_access.store(deny, Ordering::Release);
    }

    /// Whether a sysex access request is granted sysex support.
    pub fn set_sysex_allowed(&self, allowed: bool) {
        self.inner.sysex_allowed.store(allowed, Ordering::Release);
    }

    pub fn plug_input(&self, id: &str, name: &str) -> Arc<VirtualInput> {
        let port = Arc::new(VirtualInput {
            core: PortCore::new(id, name, PortKind::Input, self.inner.clock.clone()),
            message_handler: RwLock::new(None),
        });
        self.inner.inputs.write().push(port.clone());
        tracing::debug!("Plugged virtual MIDI input {}: {}", id, name);
        self.inner.notify(port.core.change());
        port
    }

    pub fn plug_output(&self, id: &str, name: &str) -> Arc<VirtualOutput> {
        let (sent_tx, sent_rx) = unbounded();
        let port = Arc::new(VirtualOutput {
            core: PortCore::new(id, name, PortKind::Output, self.inner.clock.clone()),
            sent_tx,
            sent_rx,
            clears: AtomicUsize::new(0),
        });
        self.inner.outputs.write().push(port.clone());
        tracing::debug!("Plugged virtual MIDI output {}: {}", id, name);
        self.inner.notify(port.core.change());
        port
    }

    /// Removes every port with `id`. Returns `false` if none existed.
    pub fn unplug(&self, id: &str) -> bool {
        let removed_input = {
            let mut inputs = self.inner.inputs.write();
            let position = inputs.iter().position(|p| p.core.id == id);
            position.map(|i| inputs.remove(i))
        };
        let removed_output = {
            let mut outputs = self.inner.outputs.write();
            let position = outputs.iter().position(|p| p.core.id == id);
            position.map(|i| outputs.remove(i))
        };

        let mut found = false;
        if let Some(port) = removed_input {
            port.core.unplug();
            self.inner.notify(port.core.change());
            found = true;
        }
        if let Some(port) = removed_output {
            port.core.unplug();
            self.inner.notify(port.core.change());
            found = true;
        }
        if found {
            tracing::debug!("Unplugged virtual MIDI port {}", id);
        }
        found
    }

    pub fn input(&self, id: &str) -> Option<Arc<VirtualInput>> {
        self.inner.inputs.read().iter().find(|p| p.core.id == id).cloned()
    }

    pub fn output(&self, id: &str) -> Option<Arc<VirtualOutput>> {
        self.inner.outputs.read().iter().find(|p| p.core.id == id).cloned()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.inner.clock.clone()
    }
}

impl MidiHost for VirtualHost {
    fn request_access(&self, options: &AccessOptions) -> Result<Arc<dyn MidiAccess>> {
        if self.inner.deny_access.load(Ordering::Acquire) {
            return Err(Error::Host("MIDI access denied".to_string()));
        }
        let sysex = options.sysex && self.inner.sysex_allowed.load(Ordering::Acquire);
        Ok(Arc::new(VirtualAccess {
            host: self.inner.clone(),
            sysex,
        }))
    }
}

/// Access handle granted by a [`VirtualHost`].
pub struct VirtualAccess {
    host: Arc<VirtualHostInner>,
    sysex: bool,
}

impl MidiAccess for VirtualAccess {
    fn inputs(&self) -> Vec<Arc<dyn MidiInputHandle>> {
        self.host
            .inputs
            .read()
            .iter()
            .map(|p| p.clone() as Arc<dyn MidiInputHandle>)
            .collect()
    }

    fn outputs(&self) -> Vec<Arc<dyn MidiOutputHandle>> {
        self.host
            .outputs
            .read()
            .iter()
            .map(|p| p.clone() as Arc<dyn MidiOutputHandle>)
            .collect()
    }

    fn sysex_enabled(&self) -> bool {
        self.sysex
    }

    fn clock(&self) -> Arc<dyn Clock> {
        self.host.clock.clone()
    }

    fn set_state_change_handler(&self, handler: Option<StateChangeHandler>) {
        *self.host.handler.write() = handler;
    }

    fn close(&self) {
        *self.host.handler.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_request_access() {
        let host = VirtualHost::new();
        host.plug_input("in-1", "Keys");
        host.plug_output("out-1", "Synth");

        let access = host
            .request_access(&AccessOptions {
                sysex: true,
                ..Default::default()
            })
            .unwrap();
        assert!(access.sysex_enabled());
        assert_eq!(access.inputs().len(), 1);
        assert_eq!(access.outputs()[0].name(), "Synth");
    }

    #[test]
    fn test_denied_access() {
        let host = VirtualHost::new();
        host.set_deny_access(true);
        assert!(matches!(
            host.request_access(&AccessOptions::default()),
            Err(Error::Host(_))
        ));
    }

    #[test]
    fn test_open_close_notifies() {
        let host = VirtualHost::new();
        let port = host.plug_input("in-1", "Keys");
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = changes.clone();
        port.set_state_change_handler(Some(Arc::new(move |c: &PortStateChange| {
            sink.lock().push(c.connection)
        })));

        port.open().unwrap();
        port.open().unwrap();
        port.close().unwrap();
        assert_eq!(
            *changes.lock(),
            vec![ConnectionState::Open, ConnectionState::Closed]
        );
    }

    #[test]
    fn test_fail_open() {
        let host = VirtualHost::new();
        let port = host.plug_output("out-1", "Synth");
        port.set_fail_open(true);
        assert!(port.open().is_err());
        port.set_fail_open(false);
        assert!(port.open().is_ok());
    }

    #[test]
    fn test_inject_requires_open_port() {
        let host = VirtualHost::new();
        let port = host.plug_input("in-1", "Keys");
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        port.set_message_handler(Some(Arc::new(move |bytes: &[u8], _timestamp: f64| {
            sink.lock().push(bytes.to_vec())
        })));

        assert!(!port.inject(&[0x90, 60, 100]));
        port.open().unwrap();
        assert!(port.inject(&[0x90, 60, 100]));
        assert_eq!(*received.lock(), vec![vec![0x90, 60, 100]]);
    }

    #[test]
    fn test_output_capture() {
        let host = VirtualHost::new();
        let port = host.plug_output("out-1", "Synth");
        port.send(&[0xF8], 0.0).unwrap();
        assert_eq!(port.connection(), ConnectionState::Open);
        assert_eq!(port.sent_bytes(), vec![vec![0xF8]]);
        assert!(port.sent().is_empty());
    }

    #[test]
    fn test_unplug_notifies_access_handler() {
        let host = VirtualHost::new();
        let port = host.plug_output("out-1", "Synth");
        port.open().unwrap();
        let access = host.request_access(&AccessOptions::default()).unwrap();
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = changes.clone();
        access.set_state_change_handler(Some(Arc::new(move |c: &PortStateChange| {
            sink.lock().push((c.id.clone(), c.state, c.connection))
        })));

        assert!(host.unplug("out-1"));
        assert!(!host.unplug("out-1"));
        assert!(access.outputs().is_empty());
        assert_eq!(
            *changes.lock(),
            vec![(
                "out-1".to_string(),
                DeviceState::Disconnected,
                ConnectionState::Pending
            )]
        );
        assert!(port.open().is_err());
    }
}
