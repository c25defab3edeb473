//! Rhythmic gate (trance gate).
//!
//! One cycle of `length` samples is split by `gating` into an open part and a
//! closed part:
//!
//! ```text
//! |------ open ------|fade-out|------ closed ------|fade-in|
//! 0            halfway-fade  halfway          length-fade  length
//! ```
//!
//! The envelope runs between 1 and `low_volume`, then is blended by `mix`.

use super::Dsp;
use crate::clock::Cycle;
use crate::dsp::{blend, clamp, clamp01, seconds_to_samples, CHANNELS};

/// Longest fade, as a fraction of the open part.
const MAX_FADE: f32 = 0.05;

#[derive(Copy, Clone, Debug)]
pub struct Gate {
    sr: f32,
    mix: f32,
    gating: f32,
    low_volume: f32,
    cycle: Cycle,
    halfway: usize,
    fade: usize,
}

impl Gate {
    pub fn new(sr: f32) -> Self {
        let mut s = Self {
            sr: sr.max(1.0),
            mix: 1.0,
            gating: 0.5,
            low_volume: 0.1,
            cycle: Cycle::new(1),
            halfway: 0,
            fade: 0,
        };
        s.set_length(0.25);
        s
    }

    /// Cycle duration in seconds.
    pub fn set_length(&mut self, seconds: f32) {
        self.cycle.set_length(seconds_to_samples(seconds, self.sr));
        self.recalc();
    }

    /// Fraction of each cycle that stays open, clamped to `[0, 1]`.
    pub fn set_gating(&mut self, gating: f32) {
        self.gating = clamp01(gating);
        self.recalc();
    }

    /// Envelope floor while closed.
    pub fn set_low_volume(&mut self, low: f32) {
        self.low_volume = clamp01(low);
    }

    #[inline] pub fn length(&self) -> usize { self.cycle.length() }
    /// Frame index inside the current cycle.
    #[inline] pub fn position(&self) -> usize { self.cycle.position() }
    #[inline] pub fn gating(&self) -> f32 { self.gating }
    #[inline] pub fn low_volume(&self) -> f32 { self.low_volume }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn recalc(&mut self) {
        let len = self.cycle.length();
        self.halfway = ((len as f32 * self.gating) as usize).min(len);
        let fade_ratio = MAX_FADE.min(self.gating * 0.5);
        let closed = len - self.halfway;
        self.fade = ((self.halfway as f32 * fade_ratio) as usize).min(closed / 2);
    }

    /// Open/closed envelope in `[0, 1]` at a position inside the cycle.
    #[allow(clippy::cast_precision_loss)]
    fn shape(&self, pos: usize) -> f32 {
        let len = self.cycle.length();
        let fade = self.fade as f32;
        if pos < self.halfway {
            let fade_start = self.halfway - self.fade;
            if pos >= fade_start && self.fade > 0 {
                1.0 - (pos - fade_start) as f32 / fade
            } else {
                1.0
            }
        } else {
            let fade_in_start = len - self.fade;
            if pos >= fade_in_start && self.fade > 0 {
                (pos - fade_in_start + 1) as f32 / fade
            } else {
                0.0
            }
        }
    }

    /// Gain applied at a cycle position, after the floor and the mix.
    #[inline]
    pub fn gain_at(&self, pos: usize) -> f32 {
        let c = clamp(self.shape(pos), 0.0, 1.0);
        let env = c * (1.0 - self.low_volume) + self.low_volume;
        blend(1.0, env, self.mix)
    }
}

impl Dsp for Gate {
    fn process(&mut self, buf: &mut [f32]) {
        for frame in buf.chunks_exact_mut(CHANNELS) {
            let g = self.gain_at(self.cycle.position());
            for s in frame.iter_mut() {
                *s *= g;
            }
            self.cycle.tick();
        }
    }

    fn reset(&mut self) {
        self.cycle.reset();
    }

    #[inline] fn mix(&self) -> f32 { self.mix }
    #[inline] fn set_mix(&mut self, mix: f32) { self.mix = clamp01(mix); }
    #[inline] fn sample_rate(&self) -> f32 { self.sr }
}
