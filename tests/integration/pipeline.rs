//! Key events through the MIDI dispatcher, note ring and engine.

use crate::helpers::*;
use montre::model::UiEvent;
use montre::{cc, MidiEvent};
use montre_dsp::param;

/// Mute the reverb paths so silence is reachable exactly.
fn dry(organ: &montre::Organ) {
    let p = organ.section_params(0).unwrap();
    p.set(param::REFLECT, 0.0);
    p.set(param::REVERB, 0.0);
}

#[test]
fn test_note_on_makes_sound_and_note_off_releases() {
    let TestOrgan {
        organ,
        mut engine,
        mut dispatcher,
    } = test_organ();
    dry(&organ);

    let ctl = organ.controller();
    ctl.stop_on(0, 0).unwrap();
    wait_for(&mut engine, &organ, |e| {
        matches!(e, UiEvent::StopChanged { engaged: true, .. })
    });

    dispatcher.handle(MidiEvent::NoteOn {
        channel: 0,
        note: 60,
        velocity: 100,
    });
    let level = render_blocks(&mut engine, 2, 4);
    assert!(level > 1e-5, "no sound after note on: {level}");

    dispatcher.handle(MidiEvent::NoteOff {
        channel: 0,
        note: 60,
    });
    // The release tail rings briefly, then the output is exactly silent.
    let quiet = blocks_until_quiet(&mut engine, 2, 1e-7, 100);
    assert!(quiet.is_some(), "note never released");

    organ.shutdown();
}

#[test]
fn test_note_without_stop_is_silent() {
    let TestOrgan {
        organ,
        mut engine,
        mut dispatcher,
    } = test_organ();
    dry(&organ);

    dispatcher.handle(MidiEvent::NoteOn {
        channel: 0,
        note: 60,
        velocity: 100,
    });
    let level = render_blocks(&mut engine, 2, 8);
    assert!(level < 1e-7, "sound without any stop drawn: {level}");

    organ.shutdown();
}

#[test]
fn test_stop_off_releases_sounding_notes() {
    let TestOrgan {
        organ,
        mut engine,
        mut dispatcher,
    } = test_organ();
    dry(&organ);

    let ctl = organ.controller();
    ctl.stop_on(0, 0).unwrap();
    wait_for(&mut engine, &organ, |e| {
        matches!(e, UiEvent::StopChanged { engaged: true, .. })
    });
    dispatcher.handle(MidiEvent::NoteOn {
        channel: 0,
        note: 62,
        velocity: 100,
    });
    assert!(render_blocks(&mut engine, 2, 4) > 1e-5);

    ctl.stop_off(0, 0).unwrap();
    wait_for(&mut engine, &organ, |e| {
        matches!(e, UiEvent::StopChanged { engaged: false, .. })
    });
    assert!(
        blocks_until_quiet(&mut engine, 2, 1e-7, 100).is_some(),
        "retiring the stop did not silence the rank"
    );

    organ.shutdown();
}

#[test]
fn test_all_notes_off_through_controller() {
    let TestOrgan {
        organ,
        mut engine,
        mut dispatcher,
    } = test_organ();
    dry(&organ);

    let ctl = organ.controller();
    ctl.stop_on(0, 0).unwrap();
    wait_for(&mut engine, &organ, |e| {
        matches!(e, UiEvent::StopChanged { engaged: true, .. })
    });
    for note in [60, 61, 62] {
        dispatcher.handle(MidiEvent::NoteOn {
            channel: 0,
            note,
            velocity: 100,
        });
    }
    assert!(render_blocks(&mut engine, 2, 4) > 1e-5);

    ctl.all_notes_off(0x7f).unwrap();
    assert!(
        blocks_until_quiet(&mut engine, 2, 1e-7, 200).is_some(),
        "all-notes-off left notes sounding"
    );

    organ.shutdown();
}

#[test]
fn test_all_sound_off_controller_message() {
    let TestOrgan {
        organ,
        mut engine,
        mut dispatcher,
    } = test_organ();
    dry(&organ);

    let ctl = organ.controller();
    ctl.stop_on(0, 0).unwrap();
    wait_for(&mut engine, &organ, |e| {
        matches!(e, UiEvent::StopChanged { engaged: true, .. })
    });
    dispatcher.handle(MidiEvent::NoteOn {
        channel: 0,
        note: 60,
        velocity: 100,
    });
    assert!(render_blocks(&mut engine, 2, 4) > 1e-5);

    dispatcher.handle(MidiEvent::Control {
        channel: 0,
        control: cc::ALL_SOUND_OFF,
        value: 0,
    });
    // The model drains controls on its tick; give it a moment while
    // rendering on.
    std::thread::sleep(std::time::Duration::from_millis(50));
    assert!(
        blocks_until_quiet(&mut engine, 2, 1e-7, 200).is_some(),
        "CC120 left notes sounding"
    );

    organ.shutdown();
}

#[test]
fn test_mono_output_renders() {
    let mut organ = montre::OrganBuilder::new(tiny_instrument())
        .sample_rate(FS)
        .channels(1)
        .build()
        .unwrap();
    let mut engine = organ.take_engine().unwrap();
    let mut dispatcher = organ.take_dispatcher().unwrap();
    wait_for(&mut engine, &organ, |e| {
        matches!(e, UiEvent::RankReady { .. })
    });

    organ.controller().stop_on(0, 0).unwrap();
    wait_for(&mut engine, &organ, |e| {
        matches!(e, UiEvent::StopChanged { engaged: true, .. })
    });
    dispatcher.handle(MidiEvent::NoteOn {
        channel: 0,
        note: 61,
        velocity: 100,
    });
    assert!(render_blocks(&mut engine, 1, 4) > 1e-5);

    organ.shutdown();
}
