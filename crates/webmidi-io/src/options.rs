//! Call options shared by every send method.

use serde::{Deserialize, Serialize};
use webmidi_core::{ChannelSelector, NoteOptions, Time};

/// Options accepted by port and channel send methods.
///
/// `channels` is only read by port-wide methods; a channel always sends on itself.
///
/// ```ignore
/// output.send_note_on("C4", &SendOptions::new().channels([1, 10]).after(250.0))?;
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SendOptions {
    pub channels: ChannelSelector,
    pub time: Time,
    /// Values are raw 7- or 14-bit integers instead of normalized floats.
    pub raw_value: bool,
    pub attack: Option<f64>,
    pub release: Option<f64>,
    /// Milliseconds until the matching note off, for `play_note`.
    pub duration: Option<f64>,
}

impl SendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channels(mut self, channels: impl Into<ChannelSelector>) -> Self {
        self.channels = channels.into();
        self
    }

    pub fn time(mut self, time: Time) -> Self {
        self.time = time;
        self
    }

    /// Send `ms` milliseconds from now.
    pub fn after(mut self, ms: f64) -> Self {
        self.time = Time::after(ms);
        self
    }

    pub fn raw(mut self) -> Self {
        self.raw_value = true;
        self
    }

    pub fn attack(mut self, attack: f64) -> Self {
        self.attack = Some(attack);
        self
    }

    pub fn release(mut self, release: f64) -> Self {
        self.release = Some(release);
        self
    }

    pub fn duration(mut self, ms: f64) -> Self {
        self.duration = Some(ms);
        self
    }

    pub(crate) fn note_options(&self) -> NoteOptions {
        NoteOptions {
            attack: self.attack,
            release: self.release,
            raw_value: self.raw_value,
            duration: self.duration,
        }
    }
}

/// Options for [`crate::WebMidi::enable`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnableOptions {
    pub sysex: bool,
    pub software: bool,
    /// Overrides the registry's validation setting.
    #[serde(default)]
    pub validation: Option<bool>,
}
