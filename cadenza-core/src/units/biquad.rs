//! Biquad filter unit (low-pass / high-pass / peaking) with dry/wet mix.

use super::Dsp;
use crate::dsp::{blend, clamp01, CHANNELS};
use crate::filters::{Biquad, BiquadCoeffs, BiquadMode};

#[derive(Copy, Clone, Debug)]
pub struct BiquadUnit {
    sr: f32,
    mix: f32,
    mode: BiquadMode,
    q: f32,
    freq: f32,
    gain_db: f32,
    filter: Biquad,
}

impl BiquadUnit {
    pub fn new(sr: f32, mode: BiquadMode, q: f32, freq: f32, gain_db: f32) -> Self {
        let mut s = Self {
            sr: sr.max(1.0),
            mix: 1.0,
            mode,
            q,
            freq,
            gain_db,
            filter: Biquad::default(),
        };
        s.recalc();
        s
    }

    #[inline]
    pub fn low_pass(sr: f32, q: f32, freq: f32) -> Self {
        Self::new(sr, BiquadMode::LowPass, q, freq, 0.0)
    }

    #[inline]
    pub fn high_pass(sr: f32, q: f32, freq: f32) -> Self {
        Self::new(sr, BiquadMode::HighPass, q, freq, 0.0)
    }

    #[inline]
    pub fn peaking(sr: f32, q: f32, freq: f32, gain_db: f32) -> Self {
        Self::new(sr, BiquadMode::Peaking, q, freq, gain_db)
    }

    pub fn set_low_pass(&mut self, q: f32, freq: f32) {
        self.set(BiquadMode::LowPass, q, freq, 0.0);
    }

    pub fn set_high_pass(&mut self, q: f32, freq: f32) {
        self.set(BiquadMode::HighPass, q, freq, 0.0);
    }

    pub fn set_peaking(&mut self, q: f32, freq: f32, gain_db: f32) {
        self.set(BiquadMode::Peaking, q, freq, gain_db);
    }

    /// Reconfigure; history is kept so automated sweeps do not click.
    pub fn set(&mut self, mode: BiquadMode, q: f32, freq: f32, gain_db: f32) {
        self.mode = mode;
        self.q = q;
        self.freq = freq;
        self.gain_db = gain_db;
        self.recalc();
    }

    #[inline]
    fn recalc(&mut self) {
        self.filter.set_coeffs(BiquadCoeffs::for_mode(self.mode, self.q, self.freq, self.gain_db, self.sr));
    }

    #[inline] pub fn mode(&self) -> BiquadMode { self.mode }
    #[inline] pub fn q(&self) -> f32 { self.q }
    #[inline] pub fn freq(&self) -> f32 { self.freq }
    #[inline] pub fn gain_db(&self) -> f32 { self.gain_db }

    /// Filter one stereo frame in place.
    #[inline]
    pub fn process_frame(&mut self, frame: &mut [f32]) {
        for (ch, s) in frame.iter_mut().enumerate().take(CHANNELS) {
            let dry = *s;
            let wet = self.filter.tick(ch, dry);
            *s = blend(dry, wet, self.mix);
        }
    }
}

impl Dsp for BiquadUnit {
    fn process(&mut self, buf: &mut [f32]) {
        for frame in buf.chunks_exact_mut(CHANNELS) {
            self.process_frame(frame);
        }
    }

    fn reset(&mut self) {
        self.filter.reset();
    }

    #[inline] fn mix(&self) -> f32 { self.mix }
    #[inline] fn set_mix(&mut self, mix: f32) { self.mix = clamp01(mix); }
    #[inline] fn sample_rate(&self) -> f32 { self.sr }
}
