//! Shared fixtures for the integration tests.

use montre::model::UiEvent;
use montre::{DivisionDef, Dispatcher, Engine, Instrument, Organ, OrganBuilder, StopDef, BLOCK};
use std::time::{Duration, Instant};

pub const FS: f32 = 48_000.0;

/// A one-division, one-stop instrument with a short compass so rank builds
/// stay fast.
pub fn tiny_instrument() -> Instrument {
    let mut flute = StopDef::new("Test Flute 8", 60, 63);
    flute.h_lev.set_point(0, 4, 0.0);
    flute.h_lev.set_point(2, 4, -20.0);
    Instrument::new(440.0, 5).with_division(DivisionDef::new("Great", 0, 0).with_stop(flute))
}

pub struct TestOrgan {
    pub organ: Organ,
    pub engine: Engine,
    pub dispatcher: Dispatcher,
}

/// Build the tiny instrument, take the engine and dispatcher, and render
/// until the rank is installed.
pub fn test_organ() -> TestOrgan {
    let mut organ = OrganBuilder::new(tiny_instrument())
        .sample_rate(FS)
        .channels(2)
        .build()
        .unwrap();
    let mut engine = organ.take_engine().unwrap();
    let dispatcher = organ.take_dispatcher().unwrap();
    wait_for(&mut engine, &organ, |e| matches!(e, UiEvent::RankReady { .. }));
    TestOrgan {
        organ,
        engine,
        dispatcher,
    }
}

/// Render blocks until the UI channel delivers an event matching `pred`.
pub fn wait_for(engine: &mut Engine, organ: &Organ, pred: impl Fn(&UiEvent) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(20);
    let mut buf = vec![0.0f32; 2 * BLOCK];
    loop {
        engine.render(&mut buf);
        while let Ok(ev) = organ.ui_events().try_recv() {
            if pred(&ev) {
                return;
            }
        }
        assert!(Instant::now() < deadline, "timed out waiting for UI event");
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// RMS level of an interleaved buffer.
pub fn rms(buf: &[f32]) -> f32 {
    (buf.iter().map(|&s| s * s).sum::<f32>() / buf.len() as f32).sqrt()
}

/// Render `blocks` blocks and return the RMS of the last one.
pub fn render_blocks(engine: &mut Engine, channels: usize, blocks: usize) -> f32 {
    let mut buf = vec![0.0f32; channels * BLOCK];
    for _ in 0..blocks {
        buf.fill(0.0);
        engine.render(&mut buf);
    }
    rms(&buf)
}

/// Render until the output falls below `level`, up to `max_blocks`.
/// Returns the number of blocks rendered, or None if it never fell.
pub fn blocks_until_quiet(
    engine: &mut Engine,
    channels: usize,
    level: f32,
    max_blocks: usize,
) -> Option<usize> {
    let mut buf = vec![0.0f32; channels * BLOCK];
    for b in 0..max_blocks {
        buf.fill(0.0);
        engine.render(&mut buf);
        if rms(&buf) < level {
            return Some(b);
        }
    }
    None
}
