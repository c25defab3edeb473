//! Automation and envelope curves.
//!
//! Every curve is a pure map `[0, 1] -> [0, 1]` with `f(0) = 0` and `f(1) = 1`.
//! Effect parameters sample them with an automation `alpha`; the side-chain
//! and wobble units shape their envelopes with them. Inputs outside `[0, 1]`
//! are clamped first, so callers never see overshoot.

use crate::dsp::{clamp01, m_powf, smoothstep};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Curve {
    #[default]
    Linear,
    /// Quadratic ease-in (slow start).
    EaseIn,
    /// Quadratic ease-out (fast start).
    EaseOut,
    /// Smoothstep S-curve.
    Smooth,
    /// Exponential ease-in, `2^(10(t-1))`, pinned to 0 at `t = 0`.
    ExpIn,
    /// Exponential ease-out, `1 - 2^(-10t)`, pinned to 1 at `t = 1`.
    ExpOut,
}

impl Curve {
    #[inline]
    pub fn apply(self, t: f32) -> f32 {
        let t = clamp01(t);
        match self {
            Curve::Linear => t,
            Curve::EaseIn => t * t,
            Curve::EaseOut => t * (2.0 - t),
            Curve::Smooth => smoothstep(0.0, 1.0, t),
            Curve::ExpIn => {
                if t <= 0.0 { 0.0 } else { m_powf(2.0, 10.0 * (t - 1.0)) }
            }
            Curve::ExpOut => {
                if t >= 1.0 { 1.0 } else { 1.0 - m_powf(2.0, -10.0 * t) }
            }
        }
    }

    /// Interpolate `from -> to` along the curve.
    #[inline]
    pub fn map(self, from: f32, to: f32, t: f32) -> f32 {
        from + (to - from) * self.apply(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Curve; 6] = [
        Curve::Linear,
        Curve::EaseIn,
        Curve::EaseOut,
        Curve::Smooth,
        Curve::ExpIn,
        Curve::ExpOut,
    ];

    #[test]
    fn endpoints_are_pinned() {
        for c in ALL {
            assert!(c.apply(0.0).abs() < 1e-6, "{c:?}");
            assert!((c.apply(1.0) - 1.0).abs() < 1e-6, "{c:?}");
        }
    }

    #[test]
    fn curves_are_monotonic_and_bounded() {
        for c in ALL {
            let mut prev = -1.0;
            for i in 0..=100 {
                let y = c.apply(i as f32 / 100.0);
                assert!((0.0..=1.0).contains(&y), "{c:?} y={y}");
                assert!(y >= prev, "{c:?} not monotonic at {i}");
                prev = y;
            }
        }
    }

    #[test]
    fn out_of_range_inputs_are_clamped() {
        assert_eq!(Curve::Linear.apply(-3.0), 0.0);
        assert_eq!(Curve::EaseOut.apply(4.0), 1.0);
        assert_eq!(Curve::Linear.map(200.0, 800.0, 0.5), 500.0);
    }
}
