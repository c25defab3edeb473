//! Sample-and-hold bit-crusher.
//!
//! The previous frame is held for `reduction` sub-periods before the next one
//! is captured, producing stair-stepped audio. `reduction` counts samples at
//! 44.1 kHz and is rescaled to the running sample rate, so the effect sounds
//! the same at 48 kHz.

use super::Dsp;
use crate::dsp::{blend, clamp01, CHANNELS, REFERENCE_RATE};

#[derive(Copy, Clone, Debug)]
pub struct BitCrusher {
    sr: f32,
    mix: f32,
    reduction: u32,
    period: f32,
    counter: f32,
    held: [f32; CHANNELS],
}

impl BitCrusher {
    pub fn new(sr: f32) -> Self {
        let mut s = Self {
            sr: sr.max(1.0),
            mix: 1.0,
            reduction: 0,
            period: 0.0,
            counter: 0.0,
            held: [0.0; CHANNELS],
        };
        s.set_reduction(8);
        s.reset();
        s
    }

    pub fn set_reduction(&mut self, reduction: u32) {
        self.reduction = reduction;
        #[allow(clippy::cast_precision_loss)]
        let r = reduction as f32;
        self.period = r * (self.sr / REFERENCE_RATE);
    }

    #[inline] pub fn reduction(&self) -> u32 { self.reduction }

    /// Hold period in samples at the running rate.
    #[inline] pub fn period(&self) -> f32 { self.period }
}

impl Dsp for BitCrusher {
    fn process(&mut self, buf: &mut [f32]) {
        for frame in buf.chunks_exact_mut(CHANNELS) {
            if self.counter >= self.period {
                self.held.copy_from_slice(frame);
                self.counter = if self.period >= 1.0 { self.counter - self.period } else { 0.0 };
            }
            self.counter += 1.0;
            for (s, h) in frame.iter_mut().zip(self.held) {
                *s = blend(*s, h, self.mix);
            }
        }
    }

    fn reset(&mut self) {
        self.held = [0.0; CHANNELS];
        // Capture on the very first frame after a reset.
        self.counter = self.period;
    }

    #[inline] fn mix(&self) -> f32 { self.mix }
    #[inline] fn set_mix(&mut self, mix: f32) { self.mix = clamp01(mix); }
    #[inline] fn sample_rate(&self) -> f32 { self.sr }
}
