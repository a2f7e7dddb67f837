//! Runtime settings shared by the registry and every port and channel it creates.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use webmidi_core::NoteDefaults;

#[derive(Debug)]
pub(crate) struct Settings {
    validation: AtomicBool,
    octave_offset: AtomicI32,
    sysex_enabled: AtomicBool,
    defaults: RwLock<NoteDefaults>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(true, 0, NoteDefaults::default())
    }
}

impl Settings {
    pub(crate) fn new(validation: bool, octave_offset: i32, defaults: NoteDefaults) -> Self {
        Self {
            validation: AtomicBool::new(validation),
            octave_offset: AtomicI32::new(octave_offset),
            sysex_enabled: AtomicBool::new(false),
            defaults: RwLock::new(defaults),
        }
    }

    pub(crate) fn validation(&self) -> bool {
        self.validation.load(Ordering::Relaxed)
    }

    pub(crate) fn set_validation(&self, enabled: bool) {
        self.validation.store(enabled, Ordering::Relaxed);
    }

    /// Library-wide octave offset, in octaves.
    pub(crate) fn octave_offset(&self) -> i32 {
        self.octave_offset.load(Ordering::Relaxed)
    }

    pub(crate) fn set_octave_offset(&self, offset: i32) {
        self.octave_offset.store(offset, Ordering::Relaxed);
    }

    pub(crate) fn sysex_enabled(&self) -> bool {
        self.sysex_enabled.load(Ordering::Acquire)
    }

    pub(crate) fn set_sysex_enabled(&self, enabled: bool) {
        self.sysex_enabled.store(enabled, Ordering::Release);
    }

    pub(crate) fn defaults(&self) -> NoteDefaults {
        *self.defaults.read()
    }

    pub(crate) fn set_defaults(&self, defaults: NoteDefaults) {
        *self.defaults.write() = defaults;
    }
}
