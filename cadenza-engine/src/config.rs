//! Engine configuration.
//!
//! Output format, scratch pre-allocation and device buffer preferences.
//! Values can be overlaid from the environment so a deployed player can be
//! tuned without a rebuild.

use crate::error::{EngineError, EngineResult};
use crate::format::AudioFormat;

/// Default output sample rate (48kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Frames per block that scratch buffers are sized for up front.
/// Larger device blocks still work; the scratch grows once.
pub const DEFAULT_BLOCK_FRAMES: usize = 512;

/// Finish events buffered per bus before new ones are dropped.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

pub const ENV_SAMPLE_RATE: &str = "CADENZA_SAMPLE_RATE";
pub const ENV_BLOCK_FRAMES: &str = "CADENZA_BLOCK_FRAMES";
pub const ENV_BUFFER_FRAMES: &str = "CADENZA_BUFFER_FRAMES";

/// Preferred buffer size for the output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferSize {
    /// Let the host choose
    #[default]
    Default,
    /// Request a specific size in frames (the host may adjust it)
    Fixed(u32),
}

impl BufferSize {
    /// Buffer size in frames, or `None` for the host default
    pub fn as_frames(&self) -> Option<u32> {
        match self {
            BufferSize::Default => None,
            BufferSize::Fixed(frames) => Some(*frames),
        }
    }

    /// Latency in milliseconds at a given sample rate
    #[allow(clippy::cast_precision_loss)]
    pub fn latency_ms(&self, sample_rate: u32) -> Option<f32> {
        self.as_frames()
            .map(|frames| (frames as f32 / sample_rate.max(1) as f32) * 1000.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub block_frames: usize,
    pub event_capacity: usize,
    pub buffer_size: BufferSize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: 2,
            block_frames: DEFAULT_BLOCK_FRAMES,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            buffer_size: BufferSize::Default,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    #[must_use]
    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    #[must_use]
    pub fn with_block_frames(mut self, frames: usize) -> Self {
        self.block_frames = frames.max(1);
        self
    }

    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_buffer_size(mut self, size: BufferSize) -> Self {
        self.buffer_size = size;
        self
    }

    #[inline]
    pub fn format(&self) -> AudioFormat {
        AudioFormat::new(self.sample_rate, self.channels)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.sample_rate == 0 {
            return Err(EngineError::InvalidFormat("sample rate must be non-zero".into()));
        }
        if !(1..=2).contains(&self.channels) {
            return Err(EngineError::InvalidFormat(format!(
                "{} output channels requested, 1 or 2 supported",
                self.channels
            )));
        }
        Ok(())
    }

    /// Defaults overlaid with `CADENZA_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Overlay values from a key lookup; unparsable values are logged and ignored.
    pub fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(rate) = parse_var::<u32>(&lookup, ENV_SAMPLE_RATE) {
            self.sample_rate = rate;
        }
        if let Some(frames) = parse_var::<usize>(&lookup, ENV_BLOCK_FRAMES) {
            self.block_frames = frames.max(1);
        }
        if let Some(frames) = parse_var::<u32>(&lookup, ENV_BUFFER_FRAMES) {
            self.buffer_size = BufferSize::Fixed(frames);
        }
        self
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("ignoring {key}={raw:?}: not a valid number");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = EngineConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.format(), AudioFormat::stereo(48_000));
    }

    #[test]
    fn rejects_bad_formats() {
        assert!(EngineConfig::default().with_sample_rate(0).validate().is_err());
        let err = EngineConfig::default().with_channels(6).validate().unwrap_err();
        assert!(err.is_construction());
    }

    #[test]
    fn overlay_parses_and_ignores_garbage() {
        let cfg = EngineConfig::default().overlay(|key| match key {
            ENV_SAMPLE_RATE => Some("44100".into()),
            ENV_BLOCK_FRAMES => Some("lots".into()),
            ENV_BUFFER_FRAMES => Some(" 256 ".into()),
            _ => None,
        });
        assert_eq!(cfg.sample_rate, 44_100);
        assert_eq!(cfg.block_frames, DEFAULT_BLOCK_FRAMES);
        assert_eq!(cfg.buffer_size, BufferSize::Fixed(256));
        assert_eq!(cfg.buffer_size.latency_ms(44_100).map(|ms| ms.round()), Some(6.0));
    }
}
