//! Immutable structured view over a raw MIDI byte buffer.
//!
//! Decoding runs once per incoming chunk, so it never fails on unknown commands or
//! an unterminated sysex; only an empty buffer or a missing status byte is rejected.

use crate::enumerations::{system_messages, MessageType};
use crate::error::{Error, Result};
use smallvec::SmallVec;
use std::ops::Range;

/// Inline capacity covers every channel and system common message.
pub type RawBytes = SmallVec<[u8; 3]>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    raw: RawBytes,
    command: u8,
    channel: Option<u8>,
    data: Range<usize>,
    manufacturer: Option<Range<usize>>,
    message_type: MessageType,
}

impl Message {
    /// Parses `bytes`. The first byte must be a status byte (`0x80..=0xFF`).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let status = *bytes.first().ok_or(Error::InvalidStatusByte(None))?;
        if status < 0x80 {
            return Err(Error::InvalidStatusByte(Some(status)));
        }

        let raw = RawBytes::from_slice(bytes);

        if status < 0xF0 {
            let command = status >> 4;
            return Ok(Self {
                command,
                channel: Some((status & 0x0F) + 1),
                data: 1..raw.len(),
                manufacturer: None,
                message_type: MessageType::from_command(command),
                raw,
            });
        }

        let (data, manufacturer) = if status == system_messages::SYSEX {
            let (data, manufacturer) = sysex_ranges(&raw);
            (data, Some(manufacturer))
        } else {
            (1..raw.len(), None)
        };

        Ok(Self {
            command: status,
            channel: None,
            data,
            manufacturer,
            message_type: MessageType::from_command(status),
            raw,
        })
    }

    /// Complete wire form.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn status(&self) -> u8 {
        self.raw[0]
    }

    /// `8..=14` for channel messages, the full status byte for system messages.
    pub fn command(&self) -> u8 {
        self.command
    }

    /// `1..=16` for channel messages.
    pub fn channel(&self) -> Option<u8> {
        self.channel
    }

    /// Bytes after the status byte. For sysex this excludes the manufacturer ID and
    /// the trailing `0xF7`.
    pub fn data_bytes(&self) -> &[u8] {
        &self.raw[self.data.clone()]
    }

    /// 1 or 3 byte manufacturer ID of a sysex message.
    pub fn manufacturer_id(&self) -> Option<&[u8]> {
        self.manufacturer.clone().map(|r| &self.raw[r])
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn is_channel_message(&self) -> bool {
        self.channel.is_some()
    }

    pub fn is_system_message(&self) -> bool {
        self.channel.is_none()
    }

    /// First data byte, if any.
    pub fn data1(&self) -> Option<u8> {
        self.data_bytes().first().copied()
    }

    /// Second data byte, if any.
    pub fn data2(&self) -> Option<u8> {
        self.data_bytes().get(1).copied()
    }
}

impl TryFrom<&[u8]> for Message {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        Message::decode(bytes)
    }
}

/// `(data, manufacturer)` ranges of a sysex buffer. A missing terminator is tolerated.
fn sysex_ranges(raw: &[u8]) -> (Range<usize>, Range<usize>) {
    let end = if raw.len() > 1 && raw[raw.len() - 1] == system_messages::SYSEX_END {
        raw.len() - 1
    } else {
        raw.len()
    };
    let body_start = 1.min(end);
    let id_len = match raw.get(body_start) {
        _ if body_start >= end => 0,
        Some(0x00) => 3,
        Some(_) => 1,
        None => 0,
    };
    let id_end = (body_start + id_len).min(end);
    (id_end..end, body_start..id_end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_note_on() {
        let msg = Message::decode(&[0x93, 60, 100]).unwrap();
        assert_eq!(msg.command(), 0x9);
        assert_eq!(msg.channel(), Some(4));
        assert_eq!(msg.data_bytes(), &[60, 100]);
        assert_eq!(msg.message_type(), MessageType::NoteOn);
        assert!(msg.is_channel_message());
        assert_eq!(msg.manufacturer_id(), None);
    }

    #[test]
    fn test_decode_channel_boundaries() {
        assert_eq!(Message::decode(&[0x80, 0, 0]).unwrap().channel(), Some(1));
        assert_eq!(Message::decode(&[0xEF, 0, 0]).unwrap().channel(), Some(16));
        let pc = Message::decode(&[0xC5, 12]).unwrap();
        assert_eq!(pc.message_type(), MessageType::ProgramChange);
        assert_eq!(pc.data1(), Some(12));
        assert_eq!(pc.data2(), None);
    }

    #[test]
    fn test_decode_system_messages() {
        let clock = Message::decode(&[0xF8]).unwrap();
        assert_eq!(clock.command(), 0xF8);
        assert_eq!(clock.channel(), None);
        assert!(clock.data_bytes().is_empty());
        assert_eq!(clock.message_type(), MessageType::Clock);

        let spp = Message::decode(&[0xF2, 0x10, 0x20]).unwrap();
        assert_eq!(spp.message_type(), MessageType::SongPosition);
        assert_eq!(spp.data_bytes(), &[0x10, 0x20]);
    }

    #[test]
    fn test_decode_unknown_command_does_not_fail() {
        let msg = Message::decode(&[0xF5, 1]).unwrap();
        assert_eq!(msg.message_type(), MessageType::Unknown);
        assert_eq!(msg.command(), 0xF5);
    }

    #[test]
    fn test_decode_sysex_single_byte_id() {
        let msg = Message::decode(&[0xF0, 0x43, 1, 2, 3, 0xF7]).unwrap();
        assert_eq!(msg.message_type(), MessageType::Sysex);
        assert_eq!(msg.manufacturer_id(), Some(&[0x43][..]));
        assert_eq!(msg.data_bytes(), &[1, 2, 3]);
    }

    #[test]
    fn test_decode_sysex_extended_id() {
        let msg = Message::decode(&[0xF0, 0x00, 0x21, 0x09, 1, 2, 3, 0xF7]).unwrap();
        assert_eq!(msg.manufacturer_id(), Some(&[0x00, 0x21, 0x09][..]));
        assert_eq!(msg.data_bytes(), &[1, 2, 3]);
    }

    #[test]
    fn test_decode_sysex_without_terminator() {
        let msg = Message::decode(&[0xF0, 0x7E, 9, 8]).unwrap();
        assert_eq!(msg.manufacturer_id(), Some(&[0x7E][..]));
        assert_eq!(msg.data_bytes(), &[9, 8]);
    }

    #[test]
    fn test_decode_truncated_sysex() {
        let msg = Message::decode(&[0xF0, 0x00, 0x21]).unwrap();
        assert_eq!(msg.manufacturer_id(), Some(&[0x00, 0x21][..]));
        assert!(msg.data_bytes().is_empty());

        let empty = Message::decode(&[0xF0, 0xF7]).unwrap();
        assert_eq!(empty.manufacturer_id(), Some(&[][..]));
        assert!(empty.data_bytes().is_empty());
    }

    #[test]
    fn test_decode_rejects_missing_status() {
        assert_eq!(Message::decode(&[]), Err(Error::InvalidStatusByte(None)));
        assert_eq!(
            Message::decode(&[0x40, 1]),
            Err(Error::InvalidStatusByte(Some(0x40)))
        );
    }
}
