//! Generic DSP utilities and math helpers.
//!
//! Design goals:
//! - `no_std` ready (guarded by the crate feature `no-std`)
//! - Math backend selection that works in both `std` and `no_std` contexts
//! - Optional `fast-math` approximations for the modulation hot paths
//! - Clean, side-effect free helpers that are easy to test
//!
//! Features used by this file:
//! - `fast-math` : enables polynomial approximations for `sin`/`cos`
//! - `simd`      : vectorised `mix_in_place` via `wide`
//!
//! Conventions:
//! - Buffers are interleaved stereo (`[l0, r0, l1, r1, ...]`), see [`CHANNELS`].
//! - All functions are `#[inline]` where useful to help the optimizer.

#![allow(clippy::excessive_precision)]

use core::f32::consts::PI;

use cfg_if::cfg_if;

// ----------------------------- Math backend selection -----------------------------

cfg_if! {
    // micromath preferred if explicitly requested (works in no_std)
    if #[cfg(feature = "micromath")] {
        use micromath::F32Ext as _;
        #[inline] pub(crate) fn m_sin(x: f32) -> f32 { x.sin() }
        #[inline] pub(crate) fn m_cos(x: f32) -> f32 { x.cos() }
        #[inline] pub(crate) fn m_tan(x: f32) -> f32 { x.sin() / x.cos() }
        #[inline] pub(crate) fn m_exp(x: f32) -> f32 { x.exp() }
        #[inline] pub(crate) fn m_powf(x: f32, y: f32) -> f32 { x.powf(y) }
        #[inline] pub(crate) fn m_floor(x: f32) -> f32 { x.floor() }
        #[inline] pub(crate) fn m_abs(x: f32) -> f32 { x.abs() }
    // libm (C math) in no_std
    } else if #[cfg(feature = "no-std")] {
        #[inline] pub(crate) fn m_sin(x: f32) -> f32 { libm::sinf(x) }
        #[inline] pub(crate) fn m_cos(x: f32) -> f32 { libm::cosf(x) }
        #[inline] pub(crate) fn m_tan(x: f32) -> f32 { libm::tanf(x) }
        #[inline] pub(crate) fn m_exp(x: f32) -> f32 { libm::expf(x) }
        #[inline] pub(crate) fn m_powf(x: f32, y: f32) -> f32 { libm::powf(x, y) }
        #[inline] pub(crate) fn m_floor(x: f32) -> f32 { libm::floorf(x) }
        #[inline] pub(crate) fn m_abs(x: f32) -> f32 { libm::fabsf(x) }
    // std backend
    } else {
        #[inline] pub(crate) fn m_sin(x: f32) -> f32 { x.sin() }
        #[inline] pub(crate) fn m_cos(x: f32) -> f32 { x.cos() }
        #[inline] pub(crate) fn m_tan(x: f32) -> f32 { x.tan() }
        #[inline] pub(crate) fn m_exp(x: f32) -> f32 { x.exp() }
        #[inline] pub(crate) fn m_powf(x: f32, y: f32) -> f32 { x.powf(y) }
        #[inline] pub(crate) fn m_floor(x: f32) -> f32 { x.floor() }
        #[inline] pub(crate) fn m_abs(x: f32) -> f32 { x.abs() }
    }
}

// --------------------------------- Constants -------------------------------------

/// 2π (commonly useful)
pub const TAU: f32 = 2.0 * PI;

/// A very small epsilon used in denormal handling and safe divisions.
pub const EPS_SMALL: f32 = 1.0e-20;

/// Every buffer handled by the DSP units is interleaved stereo.
pub const CHANNELS: usize = 2;

/// Reference rate that sample-count parameters (bit-crush reduction, flanger
/// delays) are expressed in. Units scale them by `sample_rate / REFERENCE_RATE`.
pub const REFERENCE_RATE: f32 = 44_100.0;

// --------------------------------- Utilities -------------------------------------

#[inline]
pub fn clamp(x: f32, lo: f32, hi: f32) -> f32 {
    if x < lo { lo } else if x > hi { hi } else { x }
}

/// Clamp to `[0, 1]`; NaN maps to 0.
#[inline]
pub fn clamp01(x: f32) -> f32 {
    if x.is_nan() { 0.0 } else { clamp(x, 0.0, 1.0) }
}

#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Dry/wet blend: `mix = 0` keeps `dry`, `mix = 1` yields `wet`.
#[inline]
pub fn blend(dry: f32, wet: f32, mix: f32) -> f32 {
    lerp(dry, wet, mix)
}

#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = clamp((x - edge0) / (edge1 - edge0), 0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Wrap phase into [0, 1).
#[inline]
pub fn wrap_phase01(p: f32) -> f32 {
    let w = p - m_floor(p);
    if w >= 1.0 { w - 1.0 } else { w }
}

/// Triangle over one period: 1 at phase 0, 0 at phase 0.5, back to 1 at phase 1.
#[inline]
pub fn triangle01(phase: f32) -> f32 {
    m_abs(wrap_phase01(phase) * 2.0 - 1.0)
}

/// Kill denormal/subnormal values. Returns 0.0 if |x| < EPS_SMALL.
#[inline]
pub fn kill_denormals(x: f32) -> f32 {
    if m_abs(x) < EPS_SMALL { 0.0 } else { x }
}

/// Seconds to the nearest whole number of samples (at least one).
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn seconds_to_samples(seconds: f32, sample_rate: f32) -> usize {
    let n = seconds.max(0.0) * sample_rate.max(1.0);
    ((n + 0.5) as usize).max(1)
}

// --------------------------------- dB / linear -----------------------------------

/// Convert dB to linear gain: lin = 10^(db/20).
#[inline]
pub fn db_to_lin(db: f32) -> f32 {
    if db <= -120.0 { 0.0 } else { m_exp(0.11512925464970229_f32 * db) } // ln(10)/20 ≈ 0.115129...
}

/// Peaking-filter amplitude `A = 10^(gain_db / 40)` (RBJ cookbook).
#[inline]
pub fn db_to_amplitude(gain_db: f32) -> f32 {
    m_powf(10.0, gain_db / 40.0)
}

// --------------------------------- Fast trig -------------------------------------

/// Fast sine with range reduction into [-π, π] and 5th-order minimax-style poly.
/// Max abs error ~1e-3 for musical uses when `fast-math` is enabled; falls back to exact otherwise.
#[inline]
pub fn fast_sin(x: f32) -> f32 {
    cfg_if! {
        if #[cfg(feature = "fast-math")] {
            let mut xr = x;
            let k = m_floor(xr / TAU + 0.5);
            xr -= k * TAU;

            // 5th-order odd polynomial: sin(x) ≈ x * (a + b x^2 + c x^4)
            let x2 = xr * xr;
            xr * (0.999_979_313_3 + x2 * (-0.166_624_432_0 + x2 * 0.008_308_978_98))
        } else {
            m_sin(x)
        }
    }
}

/// Sine LFO mapped to [0, 1] for a phase in cycles.
#[inline]
pub fn sine01(phase: f32) -> f32 {
    0.5 * (fast_sin(TAU * phase) + 1.0)
}

// --------------------------------- Buffer helpers --------------------------------

/// In-place mix: `dst[i] += src[i] * gain`. Mismatched lengths mix the common prefix.
#[inline]
pub fn mix_in_place(dst: &mut [f32], src: &[f32], gain: f32) {
    let n = dst.len().min(src.len());
    let (dst, src) = (&mut dst[..n], &src[..n]);

    cfg_if! {
        if #[cfg(feature = "simd")] {
            use wide::f32x4;
            let g = f32x4::splat(gain);
            let mut d4 = dst.chunks_exact_mut(4);
            let mut s4 = src.chunks_exact(4);
            for (d, s) in (&mut d4).zip(&mut s4) {
                let dv = f32x4::new([d[0], d[1], d[2], d[3]]);
                let sv = f32x4::new([s[0], s[1], s[2], s[3]]);
                d.copy_from_slice(&(dv + sv * g).to_array());
            }
            for (d, s) in d4.into_remainder().iter_mut().zip(s4.remainder()) {
                *d += *s * gain;
            }
        } else {
            for (d, s) in dst.iter_mut().zip(src.iter()) {
                *d += *s * gain;
            }
        }
    }
}

/// Multiply every sample by `gain`.
#[inline]
pub fn scale_in_place(buf: &mut [f32], gain: f32) {
    if gain == 1.0 {
        return;
    }
    for s in buf.iter_mut() {
        *s *= gain;
    }
}

/// Hard-clamp every sample into `[lo, hi]`; NaN becomes silence.
#[inline]
pub fn clamp_in_place(buf: &mut [f32], lo: f32, hi: f32) {
    for s in buf.iter_mut() {
        *s = if s.is_nan() { 0.0 } else { clamp(*s, lo, hi) };
    }
}

// --------------------------------- Tests (std only) ------------------------------
