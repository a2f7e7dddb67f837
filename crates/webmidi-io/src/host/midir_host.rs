//! Hardware MIDI host built on `midir`.
//!
//! `midir` has no hot-plug callback, so the port list is refreshed by [`MidirAccess::rescan`],
//! either on demand or from the polling thread started by [`MidirAccess::watch`]. Port ids are
//! the port names; repeated names get a `#n` suffix.

use super::{
    AccessOptions, Clock, ConnectionState, DeviceState, MessageHandler, MidiAccess, MidiHost,
    MidiInputHandle, MidiOutputHandle, MidiPortHandle, MonotonicClock, PortKind, PortStateChange,
    StateChangeHandler,
};
use crate::error::{Error, Result};
use midir::{
    Ignore, MidiInput, MidiInputConnection, MidiInputPort, MidiOutput, MidiOutputConnection,
    MidiOutputPort,
};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

pub struct MidirHost {
    client_name: String,
}

impl MidirHost {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
        }
    }
}

impl Default for MidirHost {
    fn default() -> Self {
        Self::new("webmidi")
    }
}

impl MidiHost for MidirHost {
    fn request_access(&self, options: &AccessOptions) -> Result<Arc<dyn MidiAccess>> {
        let client_name = options
            .client_name
            .clone()
            .unwrap_or_else(|| self.client_name.clone());
        let access = MidirAccess::new(client_name, options.sysex)?;
        Ok(access as Arc<dyn MidiAccess>)
    }
}

struct PortCore {
    id: String,
    name: String,
    kind: PortKind,
    state: RwLock<(DeviceState, ConnectionState)>,
    handler: RwLock<Option<StateChangeHandler>>,
    clock: Arc<MonotonicClock>,
}

impl PortCore {
    fn new(id: String, name: String, kind: PortKind, clock: Arc<MonotonicClock>) -> Self {
        Self {
            id,
            name,
            kind,
            state: RwLock::new((DeviceState::Connected, ConnectionState::Closed)),
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

    fn set_connection(&self, connection: ConnectionState) {
        self.state.write().1 = connection;
        let handler = self.handler.read().clone();
        if let Some(handler) = handler {
            handler(&self.change());
        }
    }

    fn unplug(&self) {
        {
            let mut state = self.state.write();
            state.0 = DeviceState::Disconnected;
            if state.1 == ConnectionState::Open {
                state.1 = ConnectionState::Pending;
            }
        }
        let handler = self.handler.read().clone();
        if let Some(handler) = handler {
            handler(&self.change());
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        match self.state.read().0 {
            DeviceState::Connected => Ok(()),
            DeviceState::Disconnected => {
                Err(Error::Port(format!("Port {} is disconnected", self.id)))
            }
        }
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
                // midir does not report manufacturers
                String::new()
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
                self.connect()
            }

            fn close(&self) -> Result<()> {
                self.disconnect();
                Ok(())
            }

            fn set_state_change_handler(&self, handler: Option<StateChangeHandler>) {
                *self.core.handler.write() = handler;
            }
        }
    };
}

pub struct MidirInput {
    core: PortCore,
    port: MidiInputPort,
    client_name: String,
    sysex: bool,
    connection: Mutex<Option<MidiInputConnection<()>>>,
    message_handler: Arc<RwLock<Option<MessageHandler>>>,
}

impl_port_handle!(MidirInput);

impl MidiInputHandle for MidirInput {
    fn set_message_handler(&self, handler: Option<MessageHandler>) {
        *self.message_handler.write() = handler;
    }
}

impl MidirInput {
    fn connect(&self) -> Result<()> {
        self.core.ensure_connected()?;
        {
            let mut connection = self.connection.lock();
            if connection.is_some() {
                return Ok(());
            }

            let mut midi_input = MidiInput::new(&self.client_name)?;
            midi_input.ignore(if self.sysex {
                Ignore::None
            } else {
                Ignore::Sysex
            });

            let slot = Arc::clone(&self.message_handler);
            let clock = Arc::clone(&self.core.clock);
            let conn = midi_input.connect(
                &self.port,
                "webmidi-input",
                move |_stamp, bytes, _| {
                    let handler = slot.read().clone();
                    if let Some(handler) = handler {
                        handler(bytes, clock.now());
                    }
                },
                (),
            )?;
            *connection = Some(conn);
        }
        debug!("Opened MIDI input {}", self.core.name);
        self.core.set_connection(ConnectionState::Open);
        Ok(())
    }

    fn disconnect(&self) {
        let conn = self.connection.lock().take();
        if let Some(conn) = conn {
            drop(conn);
            debug!("Closed MIDI input {}", self.core.name);
        }
        if self.core.state.read().1 != ConnectionState::Closed {
            self.core.set_connection(ConnectionState::Closed);
        }
    }
}

pub struct MidirOutput {
    core: PortCore,
    port: MidiOutputPort,
    client_name: String,
    connection: Mutex<Option<MidiOutputConnection>>,
}

impl_port_handle!(MidirOutput);

impl MidiOutputHandle for MidirOutput {
    fn send(&self, bytes: &[u8], _timestamp: f64) -> Result<()> {
        // Sending on a closed port opens it implicitly
        if self.connection.lock().is_none() {
            self.connect()?;
        }
        let mut connection = self.connection.lock();
        let conn = connection
            .as_mut()
            .ok_or_else(|| Error::Port(format!("Port {} is not open", self.core.id)))?;
        conn.send(bytes)?;
        Ok(())
    }
}

impl MidirOutput {
    fn connect(&self) -> Result<()> {
        self.core.ensure_connected()?;
        {
            let mut connection = self.connection.lock();
            if connection.is_some() {
                return Ok(());
            }
            let midi_output = MidiOutput::new(&self.client_name)?;
            *connection = Some(midi_output.connect(&self.port, "webmidi-output")?);
        }
        debug!("Opened MIDI output {}", self.core.name);
        self.core.set_connection(ConnectionState::Open);
        Ok(())
    }

    fn disconnect(&self) {
        let conn = self.connection.lock().take();
        if let Some(conn) = conn {
            drop(conn);
            debug!("Closed MIDI output {}", self.core.name);
        }
        if self.core.state.read().1 != ConnectionState::Closed {
            self.core.set_connection(ConnectionState::Closed);
        }
    }
}

/// `(id, name, port)` with repeated names made unique.
fn assign_ids<P>(ports: Vec<(String, P)>) -> Vec<(String, String, P)> {
    let mut seen: Vec<String> = Vec::with_capacity(ports.len());
    ports
        .into_iter()
        .map(|(name, port)| {
            let repeats = seen.iter().filter(|n| **n == name).count();
            seen.push(name.clone());
            let id = if repeats == 0 {
                name.clone()
            } else {
                format!("{} #{}", name, repeats + 1)
            };
            (id, name, port)
        })
        .collect()
}

/// Access handle over the system's `midir` ports.
pub struct MidirAccess {
    client_name: String,
    sysex: bool,
    clock: Arc<MonotonicClock>,
    inputs: RwLock<Vec<Arc<MidirInput>>>,
    outputs: RwLock<Vec<Arc<MidirOutput>>>,
    handler: RwLock<Option<StateChangeHandler>>,
    watching: Arc<AtomicBool>,
}

impl MidirAccess {
    pub fn new(client_name: String, sysex: bool) -> Result<Arc<Self>> {
        let access = Arc::new(Self {
            client_name,
            sysex,
            clock: Arc::new(MonotonicClock::new()),
            inputs: RwLock::new(Vec::new()),
            outputs: RwLock::new(Vec::new()),
            handler: RwLock::new(None),
            watching: Arc::new(AtomicBool::new(false)),
        });
        access.rescan()?;
        Ok(access)
    }

    /// Re-enumerates system ports and notifies the state-change handler of every port
    /// that appeared or disappeared.
    pub fn rescan(&self) -> Result<()> {
        let mut added: Vec<PortStateChange> = Vec::new();
        let mut removed_inputs = Vec::new();
        let mut removed_outputs = Vec::new();

        let scanner = MidiInput::new(&format!("{}-scan", self.client_name))?;
        let found = assign_ids(
            scanner
                .ports()
                .into_iter()
                .map(|p| {
                    let name = scanner.port_name(&p).unwrap_or_else(|_| "Unknown".to_string());
                    (name, p)
                })
                .collect(),
        );
        {
            let mut inputs = self.inputs.write();
            inputs.retain(|port| {
                let keep = found.iter().any(|(id, _, _)| *id == port.core.id);
                if !keep {
                    removed_inputs.push(Arc::clone(port));
                }
                keep
            });
            for (id, name, port) in found {
                if inputs.iter().any(|p| p.core.id == id) {
                    continue;
                }
                let input = Arc::new(MidirInput {
                    core: PortCore::new(id, name, PortKind::Input, Arc::clone(&self.clock)),
                    port,
                    client_name: self.client_name.clone(),
                    sysex: self.sysex,
                    connection: Mutex::new(None),
                    message_handler: Arc::new(RwLock::new(None)),
                });
                added.push(input.core.change());
                inputs.push(input);
            }
        }

        let scanner = MidiOutput::new(&format!("{}-scan", self.client_name))?;
        let found = assign_ids(
            scanner
                .ports()
                .into_iter()
                .map(|p| {
                    let name = scanner.port_name(&p).unwrap_or_else(|_| "Unknown".to_string());
                    (name, p)
                })
                .collect(),
        );
        {
            let mut outputs = self.outputs.write();
            outputs.retain(|port| {
                let keep = found.iter().any(|(id, _, _)| *id == port.core.id);
                if !keep {
                    removed_outputs.push(Arc::clone(port));
                }
                keep
            });
            for (id, name, port) in found {
                if outputs.iter().any(|p| p.core.id == id) {
                    continue;
                }
                let output = Arc::new(MidirOutput {
                    core: PortCore::new(id, name, PortKind::Output, Arc::clone(&self.clock)),
                    port,
                    client_name: self.client_name.clone(),
                    connection: Mutex::new(None),
                });
                added.push(output.core.change());
                outputs.push(output);
            }
        }

        let mut changes = added;
        for port in removed_inputs {
            drop(port.connection.lock().take());
            port.core.unplug();
            changes.push(port.core.change());
        }
        for port in removed_outputs {
            drop(port.connection.lock().take());
            port.core.unplug();
            changes.push(port.core.change());
        }

        if !changes.is_empty() {
            debug!("MIDI port rescan: {} change(s)", changes.len());
        }
        let handler = self.handler.read().clone();
        if let Some(handler) = handler {
            for change in &changes {
                handler(change);
            }
        }
        Ok(())
    }

    /// Polls the port list every `interval` until the access is closed or dropped.
    pub fn watch(self: &Arc<Self>, interval: Duration) -> Result<()> {
        if self.watching.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let access: Weak<Self> = Arc::downgrade(self);
        let watching = Arc::clone(&self.watching);
        thread::Builder::new()
            .name("midi-hotplug-watcher".to_string())
            .spawn(move || {
                while watching.load(Ordering::Acquire) {
                    thread::sleep(interval);
                    let Some(access) = access.upgrade() else {
                        break;
                    };
                    if let Err(e) = access.rescan() {
                        warn!("MIDI port rescan failed: {}", e);
                    }
                }
            })
            .map_err(|e| Error::Host(format!("Failed to spawn hot-plug watcher: {}", e)))?;
        Ok(())
    }
}

impl MidiAccess for MidirAccess {
    fn inputs(&self) -> Vec<Arc<dyn MidiInputHandle>> {
        self.inputs
            .read()
            .iter()
            .map(|p| Arc::clone(p) as Arc<dyn MidiInputHandle>)
            .collect()
    }

    fn outputs(&self) -> Vec<Arc<dyn MidiOutputHandle>> {
        self.outputs
            .read()
            .iter()
            .map(|p| Arc::clone(p) as Arc<dyn MidiOutputHandle>)
            .collect()
    }

    fn sysex_enabled(&self) -> bool {
        self.sysex
    }

    fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    fn set_state_change_handler(&self, handler: Option<StateChangeHandler>) {
        *self.handler.write() = handler;
    }

    fn close(&self) {
        self.watching.store(false, Ordering::Release);
        *self.handler.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_ids_suffixes_repeated_names() {
        let ids = assign_ids(vec![
            ("Keys".to_string(), 0),
            ("Pads".to_string(), 1),
            ("Keys".to_string(), 2),
        ]);
        let ids: Vec<_> = ids.into_iter().map(|(id, _, p)| (id, p)).collect();
        assert_eq!(
            ids,
            vec![
                ("Keys".to_string(), 0),
                ("Pads".to_string(), 1),
                ("Keys #2".to_string(), 2)
            ]
        );
    }
}
