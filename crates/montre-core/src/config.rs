//! Engine configuration.

use crate::{Error, Result};

/// Configuration for the organ engine.
///
/// The synthesis pipeline assumes a fixed 64-frame block and a sample rate in
/// the 44.1-96 kHz range; anything else is rejected by [`validate`](Self::validate).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sample rate in Hz.
    pub sample_rate: f32,
    /// Output channels: 1 (mono), 2 (stereo) or 4 (B-format).
    pub channels: usize,
    /// Emit raw B-format (W, X, Y, Z) on 4 channels instead of a decoded mix.
    pub bform: bool,
    /// Capacity of the note queue, in 32-bit words.
    pub note_queue: usize,
    /// Capacity of the command queue, in 32-bit words.
    pub command_queue: usize,
    /// Capacity of the MIDI control queue, in bytes.
    pub control_queue: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000.0,
            channels: 2,
            bform: false,
            note_queue: 256,
            command_queue: 1024,
            control_queue: 1024,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(44_000.0..=96_000.0).contains(&self.sample_rate) {
            return Err(Error::InvalidConfig(format!(
                "sample_rate {} out of range (44000-96000 Hz)",
                self.sample_rate
            )));
        }
        if !matches!(self.channels, 1 | 2 | 4) {
            return Err(Error::InvalidConfig(format!(
                "channels must be 1, 2 or 4, got {}",
                self.channels
            )));
        }
        if self.bform && self.channels != 4 {
            return Err(Error::InvalidConfig(
                "B-format output needs 4 channels".into(),
            ));
        }
        for &cap in &[self.note_queue, self.command_queue, self.control_queue] {
            if !cap.is_power_of_two() {
                return Err(Error::QueueCapacity(cap));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_odd_channel_count() {
        let config = EngineConfig {
            channels: 3,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_non_pow2_queue() {
        let config = EngineConfig {
            note_queue: 100,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::QueueCapacity(100))));
    }

    #[test]
    fn test_bform_requires_four_channels() {
        let config = EngineConfig {
            bform: true,
            channels: 2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
