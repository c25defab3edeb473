//! Filters: RBJ-cookbook biquads and a first-order all-pass.
//!
//! Goals
//! - `no_std`-friendly, allocation free
//! - Stable under per-sample coefficient modulation (wobble/phaser sweeps)
//! - Clear APIs and predictable parameterization
//!
//! Contents
//! - `BiquadMode`   : low-pass / high-pass / peaking selection
//! - `BiquadCoeffs` : normalized second-order coefficients (RBJ derivation)
//! - `Biquad`       : stereo direct-form-I biquad with per-channel history
//! - `AllPass1`     : first-order all-pass section used by the phaser cascade
//!
//! Notes
//! - Coefficients follow Robert Bristow-Johnson's "Audio EQ Cookbook":
//!   `w0 = 2π f / sr`, `alpha = sin(w0) / (2Q)`, `A = 10^(gain/40)`,
//!   then every term is divided by `a0`.
//! - Frequencies are clamped to `(0, 0.49 * sr)` so the bilinear warp never
//!   crosses Nyquist while a sweep is being driven.

use crate::dsp::{db_to_amplitude, kill_denormals, m_cos, m_sin, CHANNELS, TAU};

/// Which response the biquad realises.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BiquadMode {
    LowPass,
    HighPass,
    Peaking,
}

/// Normalized biquad coefficients (`a0 == 1`).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        Self::passthrough()
    }
}

impl BiquadCoeffs {
    /// Unity gain, no filtering.
    #[inline]
    pub const fn passthrough() -> Self {
        Self { b0: 1.0, b1: 0.0, b2: 0.0, a1: 0.0, a2: 0.0 }
    }

    #[inline]
    fn warp(q: f32, freq: f32, sr: f32) -> (f32, f32) {
        let sr = sr.max(1.0);
        let freq = freq.max(1.0).min(0.49 * sr);
        let w0 = TAU * freq / sr;
        let alpha = m_sin(w0) / (2.0 * q.max(1e-3));
        (m_cos(w0), alpha)
    }

    #[inline]
    fn normalized(b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) -> Self {
        let inv = 1.0 / a0;
        Self { b0: b0 * inv, b1: b1 * inv, b2: b2 * inv, a1: a1 * inv, a2: a2 * inv }
    }

    /// Second-order low-pass.
    pub fn low_pass(q: f32, freq: f32, sr: f32) -> Self {
        let (cw0, alpha) = Self::warp(q, freq, sr);
        let b1 = 1.0 - cw0;
        Self::normalized(b1 * 0.5, b1, b1 * 0.5, 1.0 + alpha, -2.0 * cw0, 1.0 - alpha)
    }

    /// Second-order high-pass.
    pub fn high_pass(q: f32, freq: f32, sr: f32) -> Self {
        let (cw0, alpha) = Self::warp(q, freq, sr);
        let b0 = (1.0 + cw0) * 0.5;
        Self::normalized(b0, -(1.0 + cw0), b0, 1.0 + alpha, -2.0 * cw0, 1.0 - alpha)
    }

    /// Peaking EQ with `gain_db` at the center frequency.
    pub fn peaking(q: f32, freq: f32, gain_db: f32, sr: f32) -> Self {
        let (cw0, alpha) = Self::warp(q, freq, sr);
        let a = db_to_amplitude(gain_db);
        Self::normalized(
            1.0 + alpha * a,
            -2.0 * cw0,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cw0,
            1.0 - alpha / a,
        )
    }

    /// Build from a mode; `gain_db` is ignored by the pass filters.
    pub fn for_mode(mode: BiquadMode, q: f32, freq: f32, gain_db: f32, sr: f32) -> Self {
        match mode {
            BiquadMode::LowPass => Self::low_pass(q, freq, sr),
            BiquadMode::HighPass => Self::high_pass(q, freq, sr),
            BiquadMode::Peaking => Self::peaking(q, freq, gain_db, sr),
        }
    }
}

/// Per-channel direct-form-I history.
#[derive(Copy, Clone, Debug, Default)]
struct History {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

/// Stereo biquad. Coefficients can be swapped at any time; the history is
/// kept so sweeps stay continuous.
#[derive(Copy, Clone, Debug, Default)]
pub struct Biquad {
    coeffs: BiquadCoeffs,
    hist: [History; CHANNELS],
}

impl Biquad {
    #[inline]
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self { coeffs, hist: [History::default(); CHANNELS] }
    }

    #[inline] pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) { self.coeffs = coeffs; }
    #[inline] pub fn coeffs(&self) -> BiquadCoeffs { self.coeffs }

    /// Clear the filter history.
    #[inline]
    pub fn reset(&mut self) {
        self.hist = [History::default(); CHANNELS];
    }

    /// Filter one sample on channel `ch` (0 = left, 1 = right).
    #[inline]
    pub fn tick(&mut self, ch: usize, x: f32) -> f32 {
        let c = &self.coeffs;
        let h = &mut self.hist[ch % CHANNELS];
        let y = c.b0 * x + c.b1 * h.x1 + c.b2 * h.x2 - c.a1 * h.y1 - c.a2 * h.y2;
        let y = kill_denormals(y);
        h.x2 = h.x1;
        h.x1 = x;
        h.y2 = h.y1;
        h.y1 = y;
        y
    }

    /// Filter one interleaved stereo frame in place.
    #[inline]
    pub fn tick_frame(&mut self, frame: &mut [f32]) {
        for (ch, s) in frame.iter_mut().enumerate().take(CHANNELS) {
            *s = self.tick(ch, *s);
        }
    }
}

/// First-order all-pass: `y = -a·x + z`, `z = a·y + x`.
#[derive(Copy, Clone, Debug, Default)]
pub struct AllPass1 {
    a: f32,
    z: f32,
}

impl AllPass1 {
    #[inline] pub fn set_coeff(&mut self, a: f32) { self.a = a; }
    #[inline] pub fn reset(&mut self) { self.z = 0.0; }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let y = -self.a * x + self.z;
        self.z = kill_denormals(self.a * y + x);
        y
    }
}

// ------------------------------------ Tests --------------------------------------
