//! Input and output ports.
//!
//! A port wraps one host handle and owns its 16 channels. Ports are cheap to clone; clones
//! share the same channels, listeners and scheduler.

mod input;
mod output;
mod scheduler;

pub use input::{ChannelListener, Input};
pub(crate) use input::InputContext;
pub use output::Output;
pub(crate) use output::OutputSink;

use crate::event::PortEvent;
use crate::host::{ConnectionState, DeviceState, PortStateChange};
use tracing::warn;

/// Channel numbers of a port.
pub const CHANNELS: std::ops::RangeInclusive<u8> = 1..=16;

/// Maps a host state change to the port event it announces. `None` means nothing is emitted.
pub(crate) fn state_event(change: &PortStateChange) -> Option<PortEvent> {
    match (change.connection, change.state) {
        (ConnectionState::Open, _) => Some(PortEvent::Opened),
        (ConnectionState::Closed, DeviceState::Connected) => Some(PortEvent::Closed),
        (ConnectionState::Closed, DeviceState::Disconnected) => Some(PortEvent::Disconnected),
        // Unplugged while open; the registry tears the port down
        (ConnectionState::Pending, DeviceState::Disconnected) => None,
        (connection, state) => {
            warn!(
                "Unrecognized state change on MIDI port {}: {:?}/{:?}",
                change.id, state, connection
            );
            None
        }
    }
}
