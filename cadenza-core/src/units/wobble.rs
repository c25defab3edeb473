//! Wobble: a low-pass whose cutoff is swept by a triangle LFO.
//!
//! The sweep is exponential between `min_freq` and `max_freq` so it moves
//! evenly in pitch. The wrapped filter keeps its own mix; `Wobble::mix`
//! blends the whole effect against the dry input.

use super::biquad::BiquadUnit;
use super::Dsp;
use crate::clock::Cycle;
use crate::dsp::{blend, clamp, clamp01, m_powf, seconds_to_samples, triangle01, CHANNELS};

#[derive(Copy, Clone, Debug)]
pub struct Wobble {
    sr: f32,
    mix: f32,
    min_freq: f32,
    max_freq: f32,
    q: f32,
    cycle: Cycle,
    filter: BiquadUnit,
}

impl Wobble {
    pub fn new(sr: f32) -> Self {
        let sr = sr.max(1.0);
        let mut s = Self {
            sr,
            mix: 1.0,
            min_freq: 100.0,
            max_freq: 2000.0,
            q: 1.0,
            cycle: Cycle::new(1),
            filter: BiquadUnit::low_pass(sr, 1.0, 2000.0),
        };
        s.set_frequency_range(100.0, 2000.0);
        s.set_period(0.25);
        s
    }

    /// One full down-and-up sweep, in seconds.
    pub fn set_period(&mut self, seconds: f32) {
        self.cycle.set_length(seconds_to_samples(seconds, self.sr));
    }

    pub fn set_frequency_range(&mut self, min: f32, max: f32) {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        let nyq = 0.49 * self.sr;
        self.min_freq = clamp(lo, 10.0, nyq);
        self.max_freq = clamp(hi, 10.0, nyq);
        self.update_filter();
    }

    pub fn set_q(&mut self, q: f32) {
        self.q = q.max(0.1);
        self.update_filter();
    }

    /// Mix of the wrapped low-pass, separate from the effect mix.
    pub fn set_filter_mix(&mut self, mix: f32) {
        self.filter.set_mix(mix);
    }

    #[inline] pub fn frequency_range(&self) -> (f32, f32) { (self.min_freq, self.max_freq) }
    #[inline] pub fn filter(&self) -> &BiquadUnit { &self.filter }

    /// Cutoff at the current sweep position: `max` at the cycle start,
    /// `min` halfway through.
    #[inline]
    pub fn current_frequency(&self) -> f32 {
        let f = triangle01(self.cycle.phase());
        self.min_freq * m_powf(self.max_freq / self.min_freq, f)
    }

    #[inline]
    fn update_filter(&mut self) {
        let freq = self.current_frequency();
        self.filter.set_low_pass(self.q, freq);
    }
}

impl Dsp for Wobble {
    fn process(&mut self, buf: &mut [f32]) {
        let mut wet = [0.0_f32; CHANNELS];
        for frame in buf.chunks_exact_mut(CHANNELS) {
            self.update_filter();
            wet.copy_from_slice(frame);
            self.filter.process_frame(&mut wet);
            for (s, w) in frame.iter_mut().zip(wet) {
                *s = blend(*s, w, self.mix);
            }
            self.cycle.tick();
        }
    }

    fn reset(&mut self) {
        self.filter.reset();
        self.cycle.reset();
        self.update_filter();
    }

    #[inline] fn mix(&self) -> f32 { self.mix }
    #[inline] fn set_mix(&mut self, mix: f32) { self.mix = clamp01(mix); }
    #[inline] fn sample_rate(&self) -> f32 { self.sr }
}
