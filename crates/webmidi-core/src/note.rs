//! Note values: a MIDI note number plus attack/release velocities and an optional duration.
//!
//! # Example
//! ```ignore
//! use webmidi_core::{Note, NoteDefaults};
//!
//! let note = Note::from_name("C4", 0)?;
//! assert_eq!(note.number(), 60);
//! assert_eq!(note.raw_attack(), 64);
//! ```

use crate::error::{Error, Result};
use crate::utilities::{
    from_normalized, get_note_details, note_name_to_number, to_normalized, NoteDetails,
};
use serde::{Deserialize, Serialize};

/// Process-wide defaults applied to notes that do not specify their own values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteDefaults {
    /// Normalized attack velocity.
    pub attack: f64,
    /// Normalized release velocity.
    pub release: f64,
    /// Milliseconds; `None` means the note sounds until stopped.
    pub duration: Option<f64>,
}

impl Default for NoteDefaults {
    fn default() -> Self {
        Self {
            attack: to_normalized(64),
            release: to_normalized(64),
            duration: None,
        }
    }
}

/// Per-call note parameters. Unset fields fall back to [`NoteDefaults`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NoteOptions {
    pub attack: Option<f64>,
    pub release: Option<f64>,
    /// `attack`/`release` are raw 7-bit values instead of normalized floats.
    #[serde(default)]
    pub raw_value: bool,
    pub duration: Option<f64>,
}

/// Resolves a velocity to its normalized form.
///
/// Returns `None` when the value is missing or invalid; callers substitute the default.
pub fn resolve_velocity(value: Option<f64>, raw: bool) -> Option<f64> {
    let value = value?;
    if !value.is_finite() {
        return None;
    }
    if raw {
        (0.0..=127.0)
            .contains(&value)
            .then(|| to_normalized(value.round() as u8))
    } else {
        (0.0..=1.0).contains(&value).then_some(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    number: u8,
    attack: f64,
    release: f64,
    duration: Option<f64>,
}

impl Note {
    /// Note with default velocities and no duration.
    pub fn new(number: u8) -> Result<Self> {
        Self::with_options(number, &NoteOptions::default(), &NoteDefaults::default())
    }

    pub fn with_options(number: u8, options: &NoteOptions, defaults: &NoteDefaults) -> Result<Self> {
        if number > 127 {
            return Err(Error::InvalidNoteNumber(number as i32));
        }
        let duration = options.duration.or(defaults.duration);
        if let Some(d) = duration {
            if !d.is_finite() || d < 0.0 {
                return Err(Error::range(format!("Invalid note duration: {d}")));
            }
        }
        Ok(Self {
            number,
            attack: resolve_velocity(options.attack, options.raw_value).unwrap_or(defaults.attack),
            release: resolve_velocity(options.release, options.raw_value)
                .unwrap_or(defaults.release),
            duration,
        })
    }

    /// From an identifier such as `"F#3"`, shifted by `octave_offset` octaves.
    pub fn from_name(name: &str, octave_offset: i32) -> Result<Self> {
        Self::new(note_name_to_number(name, octave_offset)?)
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    /// Number shifted by octaves and semitones, clamped to `0..=127`.
    pub fn offset_number(&self, octave_offset: i32, semitone_offset: i32) -> u8 {
        let shifted = i64::from(self.number)
            + i64::from(octave_offset) * 12
            + i64::from(semitone_offset);
        shifted.clamp(0, 127) as u8
    }

    pub fn details(&self) -> NoteDetails {
        // number is always 0..=127
        get_note_details(self.number as i32).unwrap_or(NoteDetails {
            letter: 'C',
            accidental: String::new(),
            octave: -1,
        })
    }

    /// Identifier such as `"C#4"`.
    pub fn identifier(&self) -> String {
        self.details().name()
    }

    pub fn name(&self) -> char {
        self.details().letter
    }

    pub fn accidental(&self) -> Option<String> {
        let accidental = self.details().accidental;
        (!accidental.is_empty()).then_some(accidental)
    }

    pub fn octave(&self) -> i32 {
        self.details().octave
    }

    pub fn attack(&self) -> f64 {
        self.attack
    }

    pub fn release(&self) -> f64 {
        self.release
    }

    pub fn raw_attack(&self) -> u8 {
        from_normalized(self.attack)
    }

    pub fn raw_release(&self) -> u8 {
        from_normalized(self.release)
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn set_attack(&mut self, attack: f64) -> Result<()> {
        self.attack = resolve_velocity(Some(attack), false)
            .ok_or_else(|| Error::range(format!("Invalid attack velocity: {attack}")))?;
        Ok(())
    }

    pub fn set_release(&mut self, release: f64) -> Result<()> {
        self.release = resolve_velocity(Some(release), false)
            .ok_or_else(|| Error::range(format!("Invalid release velocity: {release}")))?;
        Ok(())
    }

    pub fn set_duration(&mut self, duration: Option<f64>) {
        self.duration = duration.filter(|d| d.is_finite() && *d >= 0.0);
    }
}

/// Anything that names a single note.
#[derive(Debug, Clone, PartialEq)]
pub enum NoteSpec {
    Number(i32),
    Name(String),
    Note(Note),
}

impl From<u8> for NoteSpec {
    fn from(number: u8) -> Self {
        NoteSpec::Number(number as i32)
    }
}

impl From<i32> for NoteSpec {
    fn from(number: i32) -> Self {
        NoteSpec::Number(number)
    }
}

impl From<&str> for NoteSpec {
    fn from(name: &str) -> Self {
        NoteSpec::Name(name.to_string())
    }
}

impl From<String> for NoteSpec {
    fn from(name: String) -> Self {
        NoteSpec::Name(name)
    }
}

impl From<Note> for NoteSpec {
    fn from(note: Note) -> Self {
        NoteSpec::Note(note)
    }
}

/// One note or several.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteList(pub Vec<NoteSpec>);

macro_rules! single_note_list {
    ($($t:ty),*) => {
        $(
            impl From<$t> for NoteList {
                fn from(note: $t) -> Self {
                    NoteList(vec![note.into()])
                }
            }
        )*
    };
}

single_note_list!(u8, i32, &str, String, Note, NoteSpec);

impl<T: Into<NoteSpec>> From<Vec<T>> for NoteList {
    fn from(notes: Vec<T>) -> Self {
        NoteList(notes.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<NoteSpec> + Clone> From<&[T]> for NoteList {
    fn from(notes: &[T]) -> Self {
        NoteList(notes.iter().cloned().map(Into::into).collect())
    }
}

impl<T: Into<NoteSpec>, const N: usize> From<[T; N]> for NoteList {
    fn from(notes: [T; N]) -> Self {
        NoteList(notes.into_iter().map(Into::into).collect())
    }
}

/// MIDI number of a numeric or named note. Names are shifted by `octave_offset` octaves.
pub fn guess_note_number(spec: &NoteSpec, octave_offset: i32) -> Result<u8> {
    match spec {
        NoteSpec::Number(n) if (0..=127).contains(n) => Ok(*n as u8),
        NoteSpec::Number(n) => Err(Error::InvalidNoteNumber(*n)),
        NoteSpec::Name(name) => note_name_to_number(name, octave_offset),
        NoteSpec::Note(note) => Ok(note.number()),
    }
}

/// Normalizes notes to [`Note`] values, filling unspecified velocities and durations
/// from `options` and then `defaults`. Pre-built notes are kept as they are.
pub fn build_note_array(
    notes: &NoteList,
    options: &NoteOptions,
    defaults: &NoteDefaults,
    octave_offset: i32,
) -> Result<Vec<Note>> {
    notes
        .0
        .iter()
        .map(|spec| match spec {
            NoteSpec::Note(note) => Ok(note.clone()),
            other => {
                let number = guess_note_number(other, octave_offset)?;
                Note::with_options(number, options, defaults)
            }
        })
        .collect()
}
