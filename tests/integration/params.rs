//! Parameter paths: atomic cells, the command ring's float payloads, and
//! retuning.

use crate::helpers::*;
use montre::engine::instr;
use montre::model::{ModelEvent, UiEvent};
use montre::MidiEvent;
use montre_dsp::param;
use std::time::{Duration, Instant};

fn wait_param(organ: &montre::Organ, idx: usize, want: f32) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while (organ.params().get(idx) - want).abs() > 1e-6 {
        assert!(Instant::now() < deadline, "parameter {idx} never reached {want}");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_instrument_params_roundtrip() {
    let TestOrgan {
        organ, mut engine, ..
    } = test_organ();
    let ctl = organ.controller();

    ctl.set_volume(0.5).unwrap();
    ctl.send(ModelEvent::SetReverbSize(0.1)).unwrap();
    ctl.send(ModelEvent::SetReverbTime(5.5)).unwrap();
    ctl.send(ModelEvent::SetStereoPos(-0.25)).unwrap();

    wait_param(&organ, instr::VOLUME, 0.5);
    wait_param(&organ, instr::REVSIZE, 0.1);
    wait_param(&organ, instr::REVTIME, 5.5);
    wait_param(&organ, instr::STPOSIT, -0.25);

    // Values outside the envelope clamp instead of wandering.
    ctl.send(ModelEvent::SetReverbTime(100.0)).unwrap();
    wait_param(&organ, instr::REVTIME, 7.0);

    // The engine survives the drift-triggered reverb reinit.
    render_blocks(&mut engine, 2, 8);

    organ.shutdown();
}

#[test]
fn test_swell_command_reduces_level() {
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

    // Let the gain ramp settle at full swell.
    let loud = render_blocks(&mut engine, 2, 120);
    assert!(loud > 1e-4);

    // Shut the box: swell 0 maps to a gain floor of 0.2.
    ctl.send(ModelEvent::SetSwell {
        divis: 0,
        value: 0.0,
    })
    .unwrap();
    std::thread::sleep(Duration::from_millis(20));
    let soft = render_blocks(&mut engine, 2, 120);
    assert!(
        soft < 0.5 * loud,
        "swell had no effect: loud={loud} soft={soft}"
    );
    assert!(soft > 0.05 * loud, "swell shut the pipes off entirely");

    organ.shutdown();
}

#[test]
fn test_tremulant_modulates_level() {
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
    render_blocks(&mut engine, 2, 120);

    // Measure block-level variation without tremulant.
    let spread = |engine: &mut montre::Engine| {
        let mut lo = f32::MAX;
        let mut hi = f32::MIN;
        let mut buf = vec![0.0f32; 2 * montre::BLOCK];
        for _ in 0..120 {
            buf.fill(0.0);
            engine.render(&mut buf);
            let l = rms(&buf);
            lo = lo.min(l);
            hi = hi.max(l);
        }
        hi - lo
    };
    let flat = spread(&mut engine);

    ctl.send(ModelEvent::SetTremMod {
        divis: 0,
        value: 0.5,
    })
    .unwrap();
    ctl.send(ModelEvent::SetTremFreq {
        divis: 0,
        value: 6.0,
    })
    .unwrap();
    ctl.send(ModelEvent::TremulantOn { divis: 0 }).unwrap();
    std::thread::sleep(Duration::from_millis(20));
    render_blocks(&mut engine, 2, 20);
    let wobbling = spread(&mut engine);

    assert!(
        wobbling > 4.0 * flat.max(1e-6),
        "tremulant did not modulate: flat={flat} wobbling={wobbling}"
    );

    organ.shutdown();
}

#[test]
fn test_retune_rebuilds_ranks() {
    let TestOrgan {
        organ, mut engine, ..
    } = test_organ();

    organ.controller().retune(415.0, 2).unwrap();
    wait_for(&mut engine, &organ, |e| matches!(e, UiEvent::Retuned));
    // The rebuilt rank comes back through the worker and is reinstalled.
    wait_for(&mut engine, &organ, |e| {
        matches!(e, UiEvent::RankReady { .. })
    });

    organ.shutdown();
}
