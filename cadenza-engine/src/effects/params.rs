//! Automated effect parameters.
//!
//! A parameter is a pure function of the automation value `alpha` in
//! `[0, 1]`: it moves from `from` to `to` along a [`Curve`]. Nothing is
//! cached, so sampling the same alpha twice always gives the same value.

use cadenza_core::curves::Curve;
use cadenza_core::dsp::clamp01;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ParamF {
    pub from: f32,
    pub to: f32,
    pub curve: Curve,
}

impl ParamF {
    pub const fn constant(v: f32) -> Self {
        Self { from: v, to: v, curve: Curve::Linear }
    }

    pub const fn range(from: f32, to: f32) -> Self {
        Self { from, to, curve: Curve::Linear }
    }

    #[must_use]
    pub const fn with_curve(mut self, curve: Curve) -> Self {
        self.curve = curve;
        self
    }

    #[inline]
    pub fn sample(&self, alpha: f32) -> f32 {
        self.curve.map(self.from, self.to, clamp01(alpha))
    }

    /// Largest value over all alphas (curves are monotonic).
    #[inline]
    pub fn max_value(&self) -> f32 {
        self.from.max(self.to)
    }
}

impl From<f32> for ParamF {
    fn from(v: f32) -> Self {
        Self::constant(v)
    }
}

/// Integer parameter: a float range rounded to the nearest step.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ParamI {
    pub from: i32,
    pub to: i32,
    pub curve: Curve,
}

impl ParamI {
    pub const fn constant(v: i32) -> Self {
        Self { from: v, to: v, curve: Curve::Linear }
    }

    pub const fn range(from: i32, to: i32) -> Self {
        Self { from, to, curve: Curve::Linear }
    }

    #[must_use]
    pub const fn with_curve(mut self, curve: Curve) -> Self {
        self.curve = curve;
        self
    }

    #[inline]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn sample(&self, alpha: f32) -> i32 {
        let v = self.curve.map(self.from as f32, self.to as f32, clamp01(alpha));
        v.round() as i32
    }
}

/// Duration of a periodic effect.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Timing {
    /// Multiples of a quarter note.
    Beats(ParamF),
    Seconds(ParamF),
}

impl Timing {
    pub const fn beats(b: f32) -> Self {
        Timing::Beats(ParamF::constant(b))
    }

    pub const fn seconds(s: f32) -> Self {
        Timing::Seconds(ParamF::constant(s))
    }

    /// Seconds at `alpha`, given the current quarter-note duration.
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub fn seconds_at(&self, qn_dur: f64, alpha: f32) -> f32 {
        match self {
            Timing::Beats(p) => (qn_dur * f64::from(p.sample(alpha))) as f32,
            Timing::Seconds(p) => p.sample(alpha),
        }
        .max(0.0)
    }

    /// Longest duration any alpha can produce at `qn_dur`.
    #[inline]
    pub fn max_seconds(&self, qn_dur: f64) -> f32 {
        self.seconds_at(qn_dur, 0.0).max(self.seconds_at(qn_dur, 1.0))
    }
}
