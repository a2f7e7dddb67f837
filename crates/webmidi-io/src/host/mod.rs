//! Host MIDI interface.
//!
//! The registry never talks to a MIDI backend directly. It requests a [`MidiAccess`] from a
//! [`MidiHost`] and wraps the port handles that access reports. Handles are compared by
//! reference identity, so a backend must hand out the same `Arc` for as long as a port exists.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

mod virtual_host;
pub use virtual_host::{SentMessage, VirtualAccess, VirtualHost, VirtualInput, VirtualOutput};

#[cfg(feature = "midi-io")]
mod midir_host;
#[cfg(feature = "midi-io")]
pub use midir_host::{MidirAccess, MidirHost};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortKind {
    Input,
    Output,
}

/// Device presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Connected,
    Disconnected,
}

/// Connection state, independent of [`DeviceState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Pending,
    Open,
    Closed,
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PortKind::Input => "input",
            PortKind::Output => "output",
        })
    }
}

/// Options for [`MidiHost::request_access`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessOptions {
    pub sysex: bool,
    /// Include software (virtual) ports.
    pub software: bool,
    /// Client name announced to the backend, where it supports one.
    #[serde(default)]
    pub client_name: Option<String>,
}

/// A port changed state. Delivered to the port's own handler and, for hot-plug
/// changes, to the access-wide handler.
#[derive(Debug, Clone, PartialEq)]
pub struct PortStateChange {
    pub id: String,
    pub name: String,
    pub kind: PortKind,
    pub state: DeviceState,
    pub connection: ConnectionState,
    pub timestamp: f64,
}

pub type MessageHandler = Arc<dyn Fn(&[u8], f64) + Send + Sync>;
pub type StateChangeHandler = Arc<dyn Fn(&PortStateChange) + Send + Sync>;

/// Monotonic time source in milliseconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// [`Clock`] counting milliseconds from its creation.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

pub trait MidiHost: Send + Sync {
    /// Permission-gated access acquisition. Fails with [`crate::Error::Host`] when access
    /// is denied or the environment has no MIDI support.
    fn request_access(&self, options: &AccessOptions) -> Result<Arc<dyn MidiAccess>>;
}

pub trait MidiAccess: Send + Sync {
    fn inputs(&self) -> Vec<Arc<dyn MidiInputHandle>>;
    fn outputs(&self) -> Vec<Arc<dyn MidiOutputHandle>>;
    fn sysex_enabled(&self) -> bool;
    fn clock(&self) -> Arc<dyn Clock>;

    /// Hot-plug notifications. `None` detaches the current handler.
    fn set_state_change_handler(&self, handler: Option<StateChangeHandler>);

    /// Releases the access handle.
    fn close(&self) {}
}

pub trait MidiPortHandle: Send + Sync {
    fn id(&self) -> String;
    fn name(&self) -> String;
    fn manufacturer(&self) -> String;
    fn kind(&self) -> PortKind;
    fn state(&self) -> DeviceState;
    fn connection(&self) -> ConnectionState;
    fn open(&self) -> Result<()>;
    fn close(&self) -> Result<()>;
    fn set_state_change_handler(&self, handler: Option<StateChangeHandler>);
}

pub trait MidiInputHandle: MidiPortHandle {
    /// Receives every incoming byte chunk with its host timestamp.
    fn set_message_handler(&self, handler: Option<MessageHandler>);
}

pub trait MidiOutputHandle: MidiPortHandle {
    fn send(&self, bytes: &[u8], timestamp: f64) -> Result<()>;

    /// Drops messages queued in the backend. Backends without a queue do nothing.
    fn clear(&self) {}
}

/// Reference identity of two handles, ignoring vtable pointers.
pub(crate) fn same_handle<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_advances() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(clock.now() > a);
    }

    #[test]
    fn test_same_handle() {
        let host = VirtualHost::new();
        let a = host.plug_input("a", "A");
        let b = host.plug_input("b", "B");
        let a: Arc<dyn MidiInputHandle> = a;
        let b: Arc<dyn MidiInputHandle> = b;
        assert!(same_handle(&a, &a.clone()));
        assert!(!same_handle(&a, &b));
    }

    #[test]
    fn test_access_options_default() {
        let options = AccessOptions {
            sysex: true,
            ..Default::default()
        };
        assert!(!options.software);
        assert_eq!(options.client_name, None);
    }
}
