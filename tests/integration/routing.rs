//! Output to input loopback through the virtual host

use crate::helpers::{loopback, record_channel, studio};
use approx::assert_relative_eq;
use webmidi::prelude::*;
use webmidi::ChannelValue;

#[test]
fn test_note_round_trip() {
    let studio = studio();
    let output = studio.midi.get_output_by_id("synth-1").unwrap().unwrap();
    let input = studio.midi.get_input_by_id("keys-1").unwrap().unwrap();
    let notes = record_channel(&input, ChannelEvent::NoteOn);

    output
        .send_note_on("A4", &SendOptions::new().channels(3u8).attack(1.0))
        .unwrap();
    loopback(&studio);

    let notes = notes.lock();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].channel, 3);
    match &notes[0].value {
        ChannelValue::Note(note) => {
            assert_eq!(note.number(), 69);
            assert_eq!(note.identifier(), "A4");
            assert_eq!(note.raw_attack(), 127);
        }
        other => panic!("unexpected value {:?}", other),
    }
}

#[test]
fn test_pitch_bend_round_trip() {
    let studio = studio();
    let output = studio.midi.get_output_by_id("synth-1").unwrap().unwrap();
    let input = studio.midi.get_input_by_id("keys-1").unwrap().unwrap();
    let bends = record_channel(&input, ChannelEvent::PitchBend);

    output
        .set_pitch_bend(-1.0, &SendOptions::new().channels(1u8))
        .unwrap();
    output
        .set_pitch_bend(1.0, &SendOptions::new().channels(1u8))
        .unwrap();
    loopback(&studio);

    let values: Vec<(f64, u16)> = bends
        .lock()
        .iter()
        .filter_map(|e| match e.value {
            ChannelValue::PitchBend { value, raw } => Some((value, raw)),
            _ => None,
        })
        .collect();
    assert_eq!(values.len(), 2);
    assert_relative_eq!(values[0].0, -1.0, epsilon = 1e-6);
    assert_eq!(values[0].1, 0);
    assert_relative_eq!(values[1].0, 1.0, epsilon = 1e-6);
    assert_eq!(values[1].1, 16383);
}

#[test]
fn test_program_round_trip() {
    let studio = studio();
    let output = studio.midi.get_output_by_id("synth-1").unwrap().unwrap();
    let input = studio.midi.get_input_by_id("keys-1").unwrap().unwrap();
    let programs = record_channel(&input, ChannelEvent::ProgramChange);

    output
        .set_program(1, &SendOptions::new().channels(10u8))
        .unwrap();
    assert_eq!(studio.synth.sent_bytes(), vec![vec![0xC9, 0]]);
    loopback(&studio);

    let programs = programs.lock();
    assert_eq!(programs.len(), 1);
    assert_eq!(programs[0].value, ChannelValue::Program(1));
}

#[test]
fn test_fan_out_to_every_channel() {
    let studio = studio();
    let output = studio.midi.get_output_by_id("synth-1").unwrap().unwrap();

    output.turn_sound_off(&SendOptions::default()).unwrap();

    let sent = studio.synth.sent_bytes();
    assert_eq!(sent.len(), 16);
    for (i, bytes) in sent.iter().enumerate() {
        assert_eq!(bytes, &vec![0xB0 + i as u8, 120, 0]);
    }
}

#[test]
fn test_sysex_matches_umbrella_framing() {
    let studio = studio();
    let output = studio.midi.get_output_by_id("synth-1").unwrap().unwrap();
    let opts = SendOptions::default();

    output.send_sysex_vec(&[0x43], vec![0x10, 0x20], &opts).unwrap();
    output.send_sysex(&[0x7E], &[], &opts).unwrap();

    assert_eq!(
        studio.synth.sent_bytes(),
        vec![
            webmidi::frame_sysex_vec(&[0x43], vec![0x10, 0x20]),
            webmidi::frame_sysex(&[0x7E], &[]).into_vec(),
        ]
    );
}
