//! WebMidi builder for configuring the registry before it is enabled.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::host::MidiHost;
use crate::settings::Settings;
use webmidi_core::NoteDefaults;

use super::WebMidi;

pub struct WebMidiBuilder {
    pub(super) host: Arc<dyn MidiHost>,
    pub(super) validation: bool,
    pub(super) octave_offset: i32,
    pub(super) note_defaults: NoteDefaults,
    pub(super) client_name: Option<String>,
}

impl WebMidiBuilder {
    pub(super) fn new(host: Arc<dyn MidiHost>) -> Self {
        Self {
            host,
            validation: true,
            octave_offset: 0,
            note_defaults: NoteDefaults::default(),
            client_name: None,
        }
    }

    /// Range and type checks on every call. Default: on.
    pub fn validation(mut self, enabled: bool) -> Self {
        self.validation = enabled;
        self
    }

    /// Library-wide octave offset for note names. Default: 0
    pub fn octave_offset(mut self, offset: i32) -> Self {
        self.octave_offset = offset;
        self
    }

    pub fn note_defaults(mut self, defaults: NoteDefaults) -> Self {
        self.note_defaults = defaults;
        self
    }

    /// Name announced to backends that support one.
    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }

    pub fn build(self) -> Result<WebMidi> {
        check_defaults(&self.note_defaults)?;
        let settings = Arc::new(Settings::new(
            self.validation,
            self.octave_offset,
            self.note_defaults,
        ));
        Ok(WebMidi::from_parts(self.host, settings, self.client_name))
    }
}

pub(super) fn check_defaults(defaults: &NoteDefaults) -> Result<()> {
    for (what, value) in [("attack", defaults.attack), ("release", defaults.release)] {
        if !(0.0..=1.0).contains(&value) {
            return Err(Error::range(format!(
                "Default {} must be between 0 and 1, got {}",
                what, value
            )));
        }
    }
    if let Some(duration) = defaults.duration {
        if !duration.is_finite() || duration < 0.0 {
            return Err(Error::range(format!(
                "Default duration must be a finite positive number, got {}",
                duration
            )));
        }
    }
    Ok(())
}
