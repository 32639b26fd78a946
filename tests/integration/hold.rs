//! The hold pedal: notes released under hold keep sounding until hold-off.

use crate::helpers::*;
use montre::model::UiEvent;
use montre::{cc, MidiEvent};
use montre_dsp::param;
use std::time::Duration;

#[test]
fn test_hold_sustains_released_notes() {
    let TestOrgan {
        organ,
        mut engine,
        mut dispatcher,
    } = test_organ();
    let p = organ.section_params(0).unwrap();
    p.set(param::REFLECT, 0.0);
    p.set(param::REVERB, 0.0);

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
    assert!(render_blocks(&mut engine, 2, 8) > 1e-5);

    // Pedal down while the key is held.
    dispatcher.handle(MidiEvent::Control {
        channel: 0,
        control: cc::HOLD,
        value: 127,
    });
    std::thread::sleep(Duration::from_millis(50));
    render_blocks(&mut engine, 2, 8);

    // Key up: the hold bit keeps the pipe speaking.
    dispatcher.handle(MidiEvent::NoteOff {
        channel: 0,
        note: 60,
    });
    let sustained = render_blocks(&mut engine, 2, 50);
    assert!(
        sustained > 1e-5,
        "note died under hold pedal: {sustained}"
    );

    // Pedal up: now it finally releases.
    dispatcher.handle(MidiEvent::Control {
        channel: 0,
        control: cc::HOLD,
        value: 0,
    });
    std::thread::sleep(Duration::from_millis(50));
    assert!(
        blocks_until_quiet(&mut engine, 2, 1e-7, 200).is_some(),
        "hold-off did not release the note"
    );

    organ.shutdown();
}

#[test]
fn test_notes_struck_after_hold_are_not_latched() {
    let TestOrgan {
        organ,
        mut engine,
        mut dispatcher,
    } = test_organ();
    let p = organ.section_params(0).unwrap();
    p.set(param::REFLECT, 0.0);
    p.set(param::REVERB, 0.0);

    let ctl = organ.controller();
    ctl.stop_on(0, 0).unwrap();
    wait_for(&mut engine, &organ, |e| {
        matches!(e, UiEvent::StopChanged { engaged: true, .. })
    });

    // Pedal down on silence: nothing to latch.
    dispatcher.handle(MidiEvent::Control {
        channel: 0,
        control: cc::HOLD,
        value: 127,
    });
    std::thread::sleep(Duration::from_millis(50));
    render_blocks(&mut engine, 2, 4);

    // A note struck after the pedal went down is an ordinary note: it
    // carries no hold bit, so its release is immediate on key-up.
    dispatcher.handle(MidiEvent::NoteOn {
        channel: 0,
        note: 61,
        velocity: 100,
    });
    assert!(render_blocks(&mut engine, 2, 8) > 1e-5);
    dispatcher.handle(MidiEvent::NoteOff {
        channel: 0,
        note: 61,
    });
    assert!(
        blocks_until_quiet(&mut engine, 2, 1e-7, 200).is_some(),
        "unlatched note kept sounding under hold"
    );

    organ.shutdown();
}
