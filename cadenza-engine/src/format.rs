//! Sample format shared by decoders, sources and the mixer.
//!
//! Audio is `f32`, interleaved. Every source in the graph produces stereo at
//! the mixer's rate; decoders report their native rate and the Track folds
//! the ratio into its resampling step.

use std::time::Duration;

use cadenza_core::dsp::CHANNELS;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::stereo(crate::config::DEFAULT_SAMPLE_RATE)
    }
}

impl AudioFormat {
    #[inline]
    pub const fn new(sample_rate: u32, channels: u16) -> Self {
        Self { sample_rate, channels }
    }

    /// The graph's native layout.
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn stereo(sample_rate: u32) -> Self {
        Self { sample_rate, channels: CHANNELS as u16 }
    }

    /// Interleaved sample count for `frames` frames.
    #[inline]
    pub fn samples_for(&self, frames: usize) -> usize {
        frames * usize::from(self.channels)
    }

    /// Whole frames held by an interleaved buffer of `samples` samples.
    #[inline]
    pub fn frames_in(&self, samples: usize) -> usize {
        samples / usize::from(self.channels.max(1))
    }

    #[inline]
    #[allow(clippy::cast_precision_loss)]
    pub fn frames_to_duration(&self, frames: f64) -> Duration {
        Duration::from_secs_f64((frames / f64::from(self.sample_rate.max(1))).max(0.0))
    }

    /// Exact frame position (fractional) of a duration.
    #[inline]
    pub fn duration_to_frames(&self, d: Duration) -> f64 {
        d.as_secs_f64() * f64::from(self.sample_rate)
    }

    /// Size in bytes of one interleaved `f32` frame.
    #[inline]
    pub fn bytes_per_frame(&self) -> usize {
        self.samples_for(1) * std::mem::size_of::<f32>()
    }
}
