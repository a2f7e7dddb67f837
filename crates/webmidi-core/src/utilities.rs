//! Stateless conversions between MIDI wire values and human representations.
//!
//! This is the single source of truth for numeric range rules: note names and
//! numbers, normalized 7-bit values, channel lists, timestamps and 14-bit splits.

use crate::error::{Error, Result};
use std::str::FromStr;

/// Chromatic names, sharps preferred over flats.
const CHROMATIC: [(char, Option<char>); 12] = [
    ('C', None),
    ('C', Some('#')),
    ('D', None),
    ('D', Some('#')),
    ('E', None),
    ('F', None),
    ('F', Some('#')),
    ('G', None),
    ('G', Some('#')),
    ('A', None),
    ('A', Some('#')),
    ('B', None),
];

/// Parsed or computed pieces of a note identifier such as `"C#4"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteDetails {
    /// Uppercase letter, `A` to `G`.
    pub letter: char,
    /// Accidental string, possibly stacked (`"##"`, `"bb"`). Empty for naturals.
    pub accidental: String,
    pub octave: i32,
}

impl NoteDetails {
    /// Full identifier, e.g. `"C#4"`.
    pub fn name(&self) -> String {
        format!("{}{}{}", self.letter, self.accidental, self.octave)
    }

    /// Semitone offset from C implied by the accidental (may be negative).
    fn accidental_offset(&self) -> i64 {
        self.accidental
            .chars()
            .map(|c| match c {
                '#' | '♯' => 1,
                _ => -1,
            })
            .sum()
    }
}

fn letter_offset(letter: char) -> Option<i32> {
    match letter {
        'C' => Some(0),
        'D' => Some(2),
        'E' => Some(4),
        'F' => Some(5),
        'G' => Some(7),
        'A' => Some(9),
        'B' => Some(11),
        _ => None,
    }
}

/// Splits a note identifier into letter, accidental and octave.
///
/// Fails with [`Error::InvalidNoteName`] when the letter is not `A`-`G` or the
/// octave token is not an integer.
pub fn parse_note_identifier(name: &str) -> Result<NoteDetails> {
    let invalid = || Error::InvalidNoteName(name.to_string());
    let trimmed = name.trim();
    let mut chars = trimmed.chars();

    let letter = chars
        .next()
        .map(|c| c.to_ascii_uppercase())
        .filter(|c| letter_offset(*c).is_some())
        .ok_or_else(invalid)?;

    let rest = chars.as_str();
    let octave_start = rest
        .char_indices()
        .find(|(_, c)| !matches!(c, '#' | '♯' | 'b' | '♭'))
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    let (accidental, octave) = rest.split_at(octave_start);

    // Mixing raises and lowers in one identifier is not a note name.
    let raises = accidental.chars().any(|c| matches!(c, '#' | '♯'));
    let lowers = accidental.chars().any(|c| matches!(c, 'b' | '♭'));
    if raises && lowers {
        return Err(invalid());
    }

    let octave = octave.parse::<i32>().map_err(|_| invalid())?;

    Ok(NoteDetails {
        letter,
        accidental: accidental.to_string(),
        octave,
    })
}

/// Converts a note name (`"C4"`, `"F#3"`, `"Bb-1"`, `"E♭5"`) to a MIDI note number.
///
/// `octave_offset` is expressed in octaves and shifts the result by 12 semitones
/// per step. Results outside `0..=127` fail with [`Error::Range`].
pub fn note_name_to_number(name: &str, octave_offset: i32) -> Result<u8> {
    let details = parse_note_identifier(name)?;
    // Letter is validated by parse_note_identifier.
    let letter = letter_offset(details.letter).unwrap_or_default();
    // i64 keeps any i32 octave and offset exact
    let number = (i64::from(details.octave) + 1 + i64::from(octave_offset)) * 12
        + i64::from(letter)
        + details.accidental_offset();

    if !(0..=127).contains(&number) {
        return Err(Error::range(format!(
            "Note '{name}' with octave offset {octave_offset} resolves to {number}, outside 0-127"
        )));
    }
    Ok(number as u8)
}

/// Letter, accidental and octave of a MIDI note number.
pub fn get_note_details(number: i32) -> Result<NoteDetails> {
    if !(0..=127).contains(&number) {
        return Err(Error::InvalidNoteNumber(number));
    }
    let (letter, accidental) = CHROMATIC[(number % 12) as usize];
    Ok(NoteDetails {
        letter,
        accidental: accidental.map(String::from).unwrap_or_default(),
        octave: number / 12 - 1,
    })
}

/// `60` -> `"C4"`.
pub fn number_to_note_name(number: i32) -> Result<String> {
    get_note_details(number).map(|d| d.name())
}

/// Octave of a note number (`-1` to `9`), without any offset applied.
pub fn octave_of(number: u8) -> Option<i32> {
    get_note_details(number as i32).ok().map(|d| d.octave)
}

/// 7-bit value to `0.0..=1.0`. Values above 127 are clamped.
#[inline]
pub fn to_normalized(value: u8) -> f64 {
    value.min(127) as f64 / 127.0
}

/// `0.0..=1.0` to a 7-bit value. Out-of-range inputs are clamped, NaN maps to 0.
#[inline]
pub fn from_normalized(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    (value.clamp(0.0, 1.0) * 127.0).round() as u8
}

/// Splits a 14-bit value into `(msb, lsb)`.
#[inline]
pub fn to_msb_lsb(value: u16) -> (u8, u8) {
    (((value >> 7) & 0x7F) as u8, (value & 0x7F) as u8)
}

/// Joins `(msb, lsb)` into a 14-bit value.
#[inline]
pub fn from_msb_lsb(msb: u8, lsb: u8) -> u16 {
    (((msb & 0x7F) as u16) << 7) | (lsb & 0x7F) as u16
}

/// Which channels a call addresses.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ChannelSelector {
    /// All 16 channels.
    #[default]
    All,
    One(i64),
    Many(Vec<i64>),
    /// Unparsed tokens, e.g. read from a config file. Non-integers are dropped.
    Tokens(Vec<String>),
}

impl From<u8> for ChannelSelector {
    fn from(channel: u8) -> Self {
        ChannelSelector::One(channel as i64)
    }
}

impl From<i32> for ChannelSelector {
    fn from(channel: i32) -> Self {
        ChannelSelector::One(channel as i64)
    }
}

impl From<Vec<u8>> for ChannelSelector {
    fn from(channels: Vec<u8>) -> Self {
        ChannelSelector::Many(channels.into_iter().map(i64::from).collect())
    }
}

impl From<Vec<i32>> for ChannelSelector {
    fn from(channels: Vec<i32>) -> Self {
        ChannelSelector::Many(channels.into_iter().map(i64::from).collect())
    }
}

impl From<&[u8]> for ChannelSelector {
    fn from(channels: &[u8]) -> Self {
        ChannelSelector::Many(channels.iter().map(|c| *c as i64).collect())
    }
}

impl<const N: usize> From<[u8; N]> for ChannelSelector {
    fn from(channels: [u8; N]) -> Self {
        ChannelSelector::Many(channels.iter().map(|c| *c as i64).collect())
    }
}

impl From<&str> for ChannelSelector {
    fn from(token: &str) -> Self {
        if token.eq_ignore_ascii_case("all") {
            ChannelSelector::All
        } else {
            ChannelSelector::Tokens(vec![token.to_string()])
        }
    }
}

/// Normalizes a channel selection to a list of channels in `1..=16`.
///
/// Invalid entries are silently dropped; the order of valid entries is kept,
/// duplicates included.
pub fn sanitize_channels(selector: &ChannelSelector) -> Vec<u8> {
    fn valid(channel: i64) -> Option<u8> {
        (1..=16).contains(&channel).then_some(channel as u8)
    }

    match selector {
        ChannelSelector::All => (1..=16).collect(),
        ChannelSelector::One(channel) => valid(*channel).into_iter().collect(),
        ChannelSelector::Many(channels) => channels.iter().filter_map(|c| valid(*c)).collect(),
        ChannelSelector::Tokens(tokens) => {
            if tokens.len() == 1 && tokens[0].eq_ignore_ascii_case("all") {
                return (1..=16).collect();
            }
            tokens
                .iter()
                .filter_map(|t| t.trim().parse::<i64>().ok())
                .filter_map(valid)
                .collect()
        }
    }
}

/// When a message should be handed to the host.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Time {
    /// As soon as possible.
    #[default]
    Now,
    /// Milliseconds after "now".
    Relative(f64),
    /// Absolute timestamp in the host clock domain (milliseconds).
    Absolute(f64),
}

impl Time {
    pub fn after(ms: f64) -> Self {
        Time::Relative(ms)
    }

    pub fn at(timestamp: f64) -> Self {
        Time::Absolute(timestamp)
    }

    /// Same instant shifted later by `ms`.
    pub fn plus(self, ms: f64) -> Self {
        match self {
            Time::Now => Time::Relative(ms),
            Time::Relative(offset) => Time::Relative(offset + ms),
            Time::Absolute(at) => Time::Absolute(at + ms),
        }
    }
}

impl From<f64> for Time {
    fn from(timestamp: f64) -> Self {
        Time::Absolute(timestamp)
    }
}

impl FromStr for Time {
    type Err = Error;

    /// `""` is now, `"+250"` is 250 ms from now, `"1234.5"` is an absolute timestamp.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidTimeFormat(s.to_string());
        let s = s.trim();
        if s.is_empty() {
            return Ok(Time::Now);
        }
        if let Some(offset) = s.strip_prefix('+') {
            let ms = offset.parse::<f64>().map_err(|_| invalid())?;
            if !ms.is_finite() || ms < 0.0 {
                return Err(invalid());
            }
            return Ok(Time::Relative(ms));
        }
        let at = s.parse::<f64>().map_err(|_| invalid())?;
        if !at.is_finite() {
            return Err(invalid());
        }
        Ok(Time::Absolute(at))
    }
}

/// Resolves a [`Time`] against the host clock reading `now`.
///
/// Timestamps already in the past (and zero or negative values) resolve to `now`.
pub fn to_timestamp(time: &Time, now: f64) -> f64 {
    match *time {
        Time::Now => now,
        Time::Relative(ms) if ms.is_finite() && ms > 0.0 => now + ms,
        Time::Relative(_) => now,
        Time::Absolute(at) if at.is_finite() && at > now => at,
        Time::Absolute(_) => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_note_name_to_number() {
        assert_eq!(note_name_to_number("C4", 0), Ok(60));
        assert_eq!(note_name_to_number("A4", 0), Ok(69));
        assert_eq!(note_name_to_number("C-1", 0), Ok(0));
        assert_eq!(note_name_to_number("G9", 0), Ok(127));
        assert_eq!(note_name_to_number("c#4", 0), Ok(61));
        assert_eq!(note_name_to_number("Db4", 0), Ok(61));
        assert_eq!(note_name_to_number("E♭4", 0), Ok(63));
        assert_eq!(note_name_to_number("F♯4", 0), Ok(66));
    }

    #[test]
    fn test_stacked_accidentals() {
        assert_eq!(note_name_to_number("C##4", 0), Ok(62));
        assert_eq!(note_name_to_number("Ebb4", 0), Ok(62));
        assert!(note_name_to_number("C#b4", 0).is_err());
    }

    #[test]
    fn test_huge_octaves_fail() {
        assert!(matches!(
            note_name_to_number("C2147483647", 0),
            Err(Error::Range(_))
        ));
        assert!(matches!(
            note_name_to_number("C-2147483648", 0),
            Err(Error::Range(_))
        ));
        assert!(matches!(
            note_name_to_number("C4", i32::MAX),
            Err(Error::Range(_))
        ));
        assert!(matches!(
            note_name_to_number("C-1", i32::MIN),
            Err(Error::Range(_))
        ));
        assert!(matches!(
            note_name_to_number("C99999999999", 0),
            Err(Error::InvalidNoteName(_))
        ));
    }

    #[test]
    fn test_octave_offset() {
        assert_eq!(note_name_to_number("C4", 1), Ok(72));
        assert_eq!(note_name_to_number("C4", -1), Ok(48));
        assert!(matches!(note_name_to_number("C9", 1), Err(Error::Range(_))));
    }

    #[test]
    fn test_invalid_note_names() {
        assert!(matches!(
            note_name_to_number("H4", 0),
            Err(Error::InvalidNoteName(_))
        ));
        assert!(matches!(
            note_name_to_number("C", 0),
            Err(Error::InvalidNoteName(_))
        ));
        assert!(matches!(
            note_name_to_number("Cx", 0),
            Err(Error::InvalidNoteName(_))
        ));
        assert!(matches!(
            note_name_to_number("", 0),
            Err(Error::InvalidNoteName(_))
        ));
        // Octaves outside -1..=9 leave the MIDI range
        assert!(matches!(note_name_to_number("A9", 0), Err(Error::Range(_))));
        assert!(matches!(note_name_to_number("C-2", 0), Err(Error::Range(_))));
        assert!(matches!(note_name_to_number("Cb-1", 0), Err(Error::Range(_))));
    }

    #[test]
    fn test_note_name_round_trip() {
        for n in 0..=127 {
            let name = number_to_note_name(n).unwrap();
            assert_eq!(
                note_name_to_number(&name, 0),
                Ok(n as u8),
                "round trip failed for {n} ({name})"
            );
        }
    }

    #[test]
    fn test_get_note_details() {
        let details = get_note_details(61).unwrap();
        assert_eq!(details.letter, 'C');
        assert_eq!(details.accidental, "#");
        assert_eq!(details.octave, 4);
        assert_eq!(details.name(), "C#4");

        assert_eq!(get_note_details(0).unwrap().name(), "C-1");
        assert_eq!(get_note_details(128), Err(Error::InvalidNoteNumber(128)));
        assert_eq!(get_note_details(-1), Err(Error::InvalidNoteNumber(-1)));
    }

    #[test]
    fn test_normalized_values() {
        assert_eq!(to_normalized(127), 1.0);
        assert_eq!(to_normalized(0), 0.0);
        assert_eq!(to_normalized(200), 1.0);
        assert_abs_diff_eq!(to_normalized(64), 0.5039, epsilon = 1e-4);

        // 7-bit rounding tolerance, not bit-exact inverses
        let back = from_normalized(to_normalized(64));
        assert!((back as i32 - 64).abs() <= 1);
        assert_eq!(from_normalized(0.5), 64);
        assert_eq!(from_normalized(1.5), 127);
        assert_eq!(from_normalized(-0.2), 0);
        assert_eq!(from_normalized(f64::NAN), 0);
    }

    #[test]
    fn test_normalized_round_trip_all_values() {
        for v in 0..=127u8 {
            assert_eq!(from_normalized(to_normalized(v)), v);
        }
    }

    #[test]
    fn test_msb_lsb() {
        assert_eq!(to_msb_lsb(16383), (0x7F, 0x7F));
        assert_eq!(to_msb_lsb(0), (0, 0));
        assert_eq!(to_msb_lsb(8192), (0x40, 0));
        assert_eq!(from_msb_lsb(0x40, 0), 8192);
        assert_eq!(from_msb_lsb(0x7F, 0x7F), 16383);
    }

    #[test]
    fn test_sanitize_channels() {
        assert_eq!(sanitize_channels(&ChannelSelector::All), (1..=16).collect::<Vec<u8>>());
        assert_eq!(sanitize_channels(&ChannelSelector::from("all")).len(), 16);
        assert_eq!(sanitize_channels(&ChannelSelector::One(3)), vec![3]);
        assert_eq!(sanitize_channels(&ChannelSelector::One(0)), Vec::<u8>::new());

        let tokens = ["0", "1", "5", "17", "x", "8"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            sanitize_channels(&ChannelSelector::Tokens(tokens)),
            vec![1, 5, 8]
        );

        // Order and duplicates are preserved
        assert_eq!(
            sanitize_channels(&ChannelSelector::Many(vec![9, 2, 9, -4, 16])),
            vec![9, 2, 9, 16]
        );
    }

    #[test]
    fn test_time_parsing() {
        assert_eq!("+250".parse::<Time>(), Ok(Time::Relative(250.0)));
        assert_eq!("1234.5".parse::<Time>(), Ok(Time::Absolute(1234.5)));
        assert_eq!("".parse::<Time>(), Ok(Time::Now));
        assert!(matches!(
            "+-5".parse::<Time>(),
            Err(Error::InvalidTimeFormat(_))
        ));
        assert!(matches!(
            "soon".parse::<Time>(),
            Err(Error::InvalidTimeFormat(_))
        ));
    }

    #[test]
    fn test_to_timestamp() {
        let now = 1000.0;
        assert_eq!(to_timestamp(&Time::Now, now), 1000.0);
        assert_eq!(to_timestamp(&Time::Relative(250.0), now), 1250.0);
        assert_eq!(to_timestamp(&Time::Relative(-5.0), now), 1000.0);
        assert_eq!(to_timestamp(&Time::Absolute(2000.0), now), 2000.0);
        // Past, zero and negative timestamps mean "now"
        assert_eq!(to_timestamp(&Time::Absolute(500.0), now), 1000.0);
        assert_eq!(to_timestamp(&Time::Absolute(0.0), now), 1000.0);
        assert_eq!(to_timestamp(&Time::Absolute(-3.0), now), 1000.0);
    }

    #[test]
    fn test_time_plus() {
        assert_eq!(Time::Now.plus(100.0), Time::Relative(100.0));
        assert_eq!(Time::Relative(50.0).plus(100.0), Time::Relative(150.0));
        assert_eq!(Time::Absolute(10.0).plus(5.0), Time::Absolute(15.0));
    }
}
