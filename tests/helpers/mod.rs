//! Test helpers and fixtures for webmidi integration tests

use parking_lot::Mutex;
use std::sync::Arc;
use webmidi::prelude::*;
use webmidi::{ChannelEventData, RegistryEventData, VirtualInput, VirtualOutput};

/// Studio fixture: one keyboard input and one synth output.
pub struct Studio {
    pub host: VirtualHost,
    pub midi: WebMidi,
    pub keys: Arc<VirtualInput>,
    pub synth: Arc<VirtualOutput>,
}

/// Create an enabled registry with sysex granted.
pub fn studio() -> Studio {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let host = VirtualHost::new();
    let keys = host.plug_input("keys-1", "Studio Keys");
    let synth = host.plug_output("synth-1", "Studio Synth");
    let midi = WebMidi::new(host.clone());
    midi.enable(&EnableOptions {
        sysex: true,
        ..Default::default()
    })
    .expect("Failed to enable MIDI");
    Studio {
        host,
        midi,
        keys,
        synth,
    }
}

/// Forward everything the synth port received into the keyboard port.
pub fn loopback(studio: &Studio) {
    for bytes in studio.synth.sent_bytes() {
        studio.keys.inject(&bytes);
    }
}

pub fn record_registry(midi: &WebMidi, kind: RegistryEvent) -> Arc<Mutex<Vec<RegistryEventData>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let e = events.clone();
    midi.add_listener(kind, move |data| e.lock().push(data.clone()), ListenerOptions::default());
    events
}

pub fn record_channel(input: &Input, kind: ChannelEvent) -> Arc<Mutex<Vec<ChannelEventData>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let e = events.clone();
    input.add_channel_listener(
        kind,
        "all",
        move |data| e.lock().push(data.clone()),
        ListenerOptions::default(),
    );
    events
}
