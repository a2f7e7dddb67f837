//! Umbrella error conversion

use crate::helpers::studio;
use webmidi::prelude::*;
use webmidi::Error;

fn send_to_synth(midi: &WebMidi, note: &str) -> webmidi::Result<()> {
    let output = midi
        .get_output_by_name("Synth")?
        .ok_or(webmidi::io::Error::Port("no synth".into()))?;
    let number = webmidi::note_name_to_number(note, 0)?;
    output.send_note_on(number, &SendOptions::new().channels(1u8))?;
    Ok(())
}

#[test]
fn test_question_mark_across_layers() {
    let studio = studio();

    send_to_synth(&studio.midi, "G#3").unwrap();
    assert_eq!(studio.synth.sent_bytes(), vec![vec![0x90, 56, 64]]);

    let err = send_to_synth(&studio.midi, "H2").unwrap_err();
    assert!(matches!(err, Error::Codec(webmidi::core::Error::InvalidNoteName(_))));
    assert!(err.codec().is_some());
}

#[test]
fn test_port_errors_keep_codec_cause() {
    let studio = studio();
    let output = studio.midi.get_output_by_id("synth-1").unwrap().unwrap();

    let err: Error = output
        .set_song(200, &SendOptions::default())
        .unwrap_err()
        .into();
    assert!(matches!(
        err.codec(),
        Some(webmidi::core::Error::Range(_))
    ));

    studio.midi.disable();
    let err: Error = studio.midi.get_output_by_id("synth-1").unwrap_err().into();
    assert_eq!(err, Error::Midi(webmidi::io::Error::NotEnabled));
    assert!(err.codec().is_none());
}
