//! Side-chain style ducking without an external key.
//!
//! Each cycle starts with a short eased dip (the "kick"), then recovers
//! smoothly over the rest of the cycle. `amount` sets the depth of the dip.

use super::Dsp;
use crate::clock::Cycle;
use crate::curves::Curve;
use crate::dsp::{blend, clamp01, seconds_to_samples, CHANNELS};

/// Longest attack, in seconds.
const MAX_ATTACK: f32 = 0.01;

#[derive(Copy, Clone, Debug)]
pub struct SideChain {
    sr: f32,
    mix: f32,
    amount: f32,
    cycle: Cycle,
    attack: usize,
}

impl SideChain {
    pub fn new(sr: f32) -> Self {
        let mut s = Self {
            sr: sr.max(1.0),
            mix: 1.0,
            amount: 1.0,
            cycle: Cycle::new(1),
            attack: 1,
        };
        s.set_length(0.5);
        s
    }

    /// Cycle duration in seconds.
    pub fn set_length(&mut self, seconds: f32) {
        self.cycle.set_length(seconds_to_samples(seconds, self.sr));
        self.recalc();
    }

    /// Ducking depth in `[0, 1]`.
    pub fn set_amount(&mut self, amount: f32) {
        self.amount = clamp01(amount);
    }

    #[inline] pub fn length(&self) -> usize { self.cycle.length() }
    #[inline] pub fn amount(&self) -> f32 { self.amount }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn recalc(&mut self) {
        let len = self.cycle.length();
        let max_attack = (MAX_ATTACK * self.sr) as usize;
        self.attack = max_attack.min(len / 4).max(1);
    }

    /// Duck depth in `[0, 1]` at a cycle position: 0 at the start, 1 at the
    /// end of the attack, back towards 0 at the end of the cycle.
    #[allow(clippy::cast_precision_loss)]
    pub fn duck_at(&self, pos: usize) -> f32 {
        if pos < self.attack {
            Curve::EaseOut.apply(pos as f32 / self.attack as f32)
        } else {
            let release = (self.cycle.length() - self.attack).max(1) as f32;
            1.0 - Curve::Smooth.apply((pos - self.attack) as f32 / release)
        }
    }

    /// Gain applied at a cycle position, after depth and mix.
    #[inline]
    pub fn gain_at(&self, pos: usize) -> f32 {
        let gain = 1.0 - self.amount * self.duck_at(pos);
        blend(1.0, gain, self.mix)
    }
}

impl Dsp for SideChain {
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
