//! cpal output glue.

use crate::engine::Engine;
use crate::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{info, warn};

/// Open the default output device at the engine's rate and channel count
/// and hand the engine to the callback.
pub(crate) fn start_stream(mut engine: Engine) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(Error::NoDevice)?;
    info!(
        device = %device.name().unwrap_or_default(),
        rate = engine.sample_rate(),
        channels = engine.channels(),
        "opening output stream"
    );

    let config = cpal::StreamConfig {
        channels: engine.channels() as u16,
        sample_rate: cpal::SampleRate(engine.sample_rate() as u32),
        buffer_size: cpal::BufferSize::Default,
    };
    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _| engine.render(data),
            |e| warn!(%e, "output stream error"),
            None,
        )
        .map_err(|e| Error::Device(e.to_string()))?;
    stream.play().map_err(|e| Error::Device(e.to_string()))?;
    Ok(stream)
}
