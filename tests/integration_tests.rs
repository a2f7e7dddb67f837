//! Integration tests for the webmidi umbrella crate
//!
//! Everything runs against the in-process virtual host, so no MIDI hardware is needed.
//!
//! Test categories:
//! - Registry: enable/disable, lookups, hot-plug
//! - Routing: output to input loopback through channels
//! - Errors: umbrella error conversion
//!
//! Run with:
//! ```bash
//! cargo test -p webmidi --test integration_tests
//! ```

mod helpers;
mod integration;

pub use integration::*;
