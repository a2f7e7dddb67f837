//! System exclusive framing: `F0 <manufacturer…> <data…> F7`.
//!
//! Two paths produce the same bytes. [`frame_sysex`] sizes a fixed buffer up front;
//! [`frame_sysex_vec`] extends an owned payload in place, so large dumps that already
//! live in a `Vec` are not copied twice.

use crate::enumerations::system_messages::{SYSEX, SYSEX_END};

/// Frames `data` into a fixed-size buffer.
pub fn frame_sysex(manufacturer: &[u8], data: &[u8]) -> Box<[u8]> {
    let mut framed = vec![0u8; manufacturer.len() + data.len() + 2].into_boxed_slice();
    let id_end = 1 + manufacturer.len();
    framed[0] = SYSEX;
    framed[1..id_end].copy_from_slice(manufacturer);
    framed[id_end..id_end + data.len()].copy_from_slice(data);
    framed[id_end + data.len()] = SYSEX_END;
    framed
}

/// Frames an owned payload, reusing its allocation.
pub fn frame_sysex_vec(manufacturer: &[u8], mut data: Vec<u8>) -> Vec<u8> {
    data.reserve(manufacturer.len() + 2);
    data.splice(0..0, std::iter::once(SYSEX).chain(manufacturer.iter().copied()));
    data.push(SYSEX_END);
    data
}
