//! Phaser: eight first-order all-passes per channel with a swept break
//! frequency and feedback from the previous output.

use super::Dsp;
use crate::clock::Cycle;
use crate::dsp::{blend, clamp, clamp01, lerp, m_tan, seconds_to_samples, sine01, CHANNELS};
use crate::filters::AllPass1;
use core::f32::consts::PI;

/// All-pass sections per channel.
pub const PHASER_STAGES: usize = 8;

#[derive(Copy, Clone, Debug)]
pub struct Phaser {
    sr: f32,
    mix: f32,
    min_freq: f32,
    max_freq: f32,
    feedback: f32,
    cycle: Cycle,
    stages: [[AllPass1; PHASER_STAGES]; CHANNELS],
    last: [f32; CHANNELS],
}

impl Phaser {
    pub fn new(sr: f32) -> Self {
        let mut s = Self {
            sr: sr.max(1.0),
            mix: 0.5,
            min_freq: 1500.0,
            max_freq: 20_000.0,
            feedback: 0.35,
            cycle: Cycle::new(1),
            stages: [[AllPass1::default(); PHASER_STAGES]; CHANNELS],
            last: [0.0; CHANNELS],
        };
        s.set_frequency_range(1500.0, 20_000.0);
        s.set_period(2.0);
        s
    }

    /// Sweep duration in seconds (one full sine cycle).
    pub fn set_period(&mut self, seconds: f32) {
        self.cycle.set_length(seconds_to_samples(seconds, self.sr));
    }

    pub fn set_frequency_range(&mut self, min: f32, max: f32) {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        let nyq = 0.49 * self.sr;
        self.min_freq = clamp(lo, 10.0, nyq);
        self.max_freq = clamp(hi, 10.0, nyq);
    }

    /// Feedback amount, kept below 1 for stability.
    pub fn set_feedback(&mut self, fb: f32) {
        self.feedback = clamp(fb, 0.0, 0.95);
    }

    #[inline] pub fn frequency_range(&self) -> (f32, f32) { (self.min_freq, self.max_freq) }
    #[inline] pub fn feedback(&self) -> f32 { self.feedback }

    /// All-pass break frequency at the current sweep position.
    #[inline]
    pub fn current_frequency(&self) -> f32 {
        lerp(self.min_freq, self.max_freq, sine01(self.cycle.phase()))
    }

    #[inline]
    fn coeff(&self, freq: f32) -> f32 {
        let t = m_tan(PI * freq / self.sr);
        (1.0 - t) / (1.0 + t)
    }
}

impl Dsp for Phaser {
    fn process(&mut self, buf: &mut [f32]) {
        for frame in buf.chunks_exact_mut(CHANNELS) {
            let a = self.coeff(self.current_frequency());
            for (ch, s) in frame.iter_mut().enumerate() {
                let dry = *s;
                let mut y = dry + self.last[ch] * self.feedback;
                for stage in &mut self.stages[ch] {
                    stage.set_coeff(a);
                    y = stage.process(y);
                }
                self.last[ch] = y;
                *s = blend(dry, 0.5 * (dry + y), self.mix);
            }
            self.cycle.tick();
        }
    }

    fn reset(&mut self) {
        for ch in &mut self.stages {
            for stage in ch.iter_mut() {
                stage.reset();
            }
        }
        self.last = [0.0; CHANNELS];
        self.cycle.reset();
    }

    #[inline] fn mix(&self) -> f32 { self.mix }
    #[inline] fn set_mix(&mut self, mix: f32) { self.mix = clamp01(mix); }
    #[inline] fn sample_rate(&self) -> f32 { self.sr }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn sweep_follows_sine_between_bounds() {
        let mut ph = Phaser::new(48_000.0);
        ph.set_frequency_range(500.0, 4000.0);
        ph.set_period(0.1);
        let start = ph.current_frequency();
        assert!((start - 2250.0).abs() < 1.0, "starts mid-sweep: {start}");
        let mut lo = f32::MAX;
        let mut hi = f32::MIN;
        let mut buf = [0.0_f32; 2];
        for _ in 0..4800 {
            lo = lo.min(ph.current_frequency());
            hi = hi.max(ph.current_frequency());
            ph.process(&mut buf);
        }
        assert!(lo >= 500.0 - 1e-2 && lo < 510.0, "lo={lo}");
        assert!(hi <= 4000.0 + 1e-2 && hi > 3990.0, "hi={hi}");
    }

    #[test]
    fn stays_bounded_with_max_feedback() {
        let mut ph = Phaser::new(44_100.0);
        ph.set_feedback(5.0);
        assert_eq!(ph.feedback(), 0.95);
        ph.set_mix(1.0);
        let mut buf = vec![1.0_f32; 2 * 44_100];
        ph.process(&mut buf);
        assert!(buf.iter().all(|s| s.is_finite() && s.abs() < 20.0));
    }

    #[test]
    fn reset_restarts_sweep() {
        let mut ph = Phaser::new(48_000.0);
        let f0 = ph.current_frequency();
        let mut buf = vec![0.1_f32; 2 * 1000];
        ph.process(&mut buf);
        assert_ne!(ph.current_frequency(), f0);
        ph.reset();
        assert_eq!(ph.current_frequency(), f0);
    }
}
