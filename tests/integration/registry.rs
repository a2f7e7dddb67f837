//! Registry lifecycle, lookups and hot-plug

use crate::helpers::{record_registry, studio};
use webmidi::prelude::*;
use webmidi::ConnectionState;

#[test]
fn test_lookup_by_id_and_name() {
    let studio = studio();

    let synth = studio.midi.get_output_by_id("synth-1").unwrap().unwrap();
    assert_eq!(synth.name(), "Studio Synth");

    // Substring match, first port wins
    let keys = studio.midi.get_input_by_name("Keys").unwrap().unwrap();
    assert_eq!(keys.id(), "keys-1");
    assert!(studio.midi.get_input_by_name("").unwrap().is_none());
    assert!(studio.midi.get_output_by_id("missing").unwrap().is_none());
}

#[test]
fn test_every_port_has_sixteen_channels() {
    let studio = studio();
    let input = studio.midi.get_input_by_id("keys-1").unwrap().unwrap();
    let output = studio.midi.get_output_by_id("synth-1").unwrap().unwrap();

    let numbers: Vec<u8> = output.channels().iter().map(|c| c.number()).collect();
    assert_eq!(numbers, webmidi::CHANNELS.collect::<Vec<_>>());
    assert_eq!(input.channels().len(), 16);
    assert!(input.channel(0).is_none());
    assert!(output.channel(17).is_none());
}

#[test]
fn test_hot_plug_keeps_existing_wrappers() {
    let studio = studio();
    let refreshed = record_registry(&studio.midi, RegistryEvent::PortsRefreshed);
    let before = studio.midi.get_output_by_id("synth-1").unwrap().unwrap();

    studio.host.plug_output("synth-2", "Second Synth");
    studio.host.unplug("keys-1");

    let after = studio.midi.get_output_by_id("synth-1").unwrap().unwrap();
    assert!(!after.is_destroyed());
    assert_eq!(before.id(), after.id());
    assert_eq!(studio.midi.outputs().len(), 2);
    assert!(studio.midi.inputs().is_empty());

    let refreshed = refreshed.lock();
    assert_eq!(refreshed.len(), 2);
    let added = refreshed[0].report.as_ref().unwrap();
    assert_eq!(added.added.len(), 1);
    assert_eq!(added.added[0].id, "synth-2");
    let removed = refreshed[1].report.as_ref().unwrap();
    assert_eq!(removed.removed[0].id, "keys-1");
}

#[test]
fn test_enable_is_idempotent() {
    let studio = studio();
    let granted = record_registry(&studio.midi, RegistryEvent::MidiAccessGranted);

    studio.midi.enable(&EnableOptions::default()).unwrap();
    assert!(granted.lock().is_empty());
    assert_eq!(studio.midi.outputs().len(), 1);
}

#[test]
fn test_disable_then_reenable() {
    let studio = studio();
    let old = studio.midi.get_output_by_id("synth-1").unwrap().unwrap();

    studio.midi.disable();
    assert!(old.is_destroyed());
    assert!(studio.midi.get_output_by_id("synth-1").is_err());

    studio.midi.enable(&EnableOptions::default()).unwrap();
    let fresh = studio.midi.get_output_by_id("synth-1").unwrap().unwrap();
    assert!(!fresh.is_destroyed());
    assert_eq!(fresh.connection(), ConnectionState::Open);
    assert!(!studio.midi.sysex_enabled());
}

#[test]
fn test_builder_settings_reach_ports() {
    let host = VirtualHost::new();
    let port = host.plug_output("synth-1", "Synth");
    let midi = WebMidi::builder(host.clone())
        .octave_offset(1)
        .client_name("tests")
        .build()
        .unwrap();
    midi.enable(&EnableOptions::default()).unwrap();

    let output = midi.get_output_by_id("synth-1").unwrap().unwrap();
    output
        .send_note_on("C4", &SendOptions::new().channels(1u8))
        .unwrap();
    // Library offset shifts named notes one octave up on output
    assert_eq!(port.sent_bytes(), vec![vec![0x90, 72, 64]]);
}
