//! Composition: serial chains and parallel groups of units.
//!
//! Both carry a group mix on top of each member's own mix. Scratch buffers
//! grow to the largest block seen and are reused afterwards.

use alloc::vec::Vec;

use super::{Dsp, DspUnit};
use crate::dsp::{blend, clamp01, mix_in_place};

/// Units applied one after another.
#[derive(Clone, Debug)]
pub struct DspChain {
    sr: f32,
    mix: f32,
    units: Vec<DspUnit>,
    dry: Vec<f32>,
}

impl DspChain {
    pub fn new(sr: f32) -> Self {
        Self { sr: sr.max(1.0), mix: 1.0, units: Vec::new(), dry: Vec::new() }
    }

    /// Append a unit; builder style.
    #[must_use]
    pub fn with(mut self, unit: impl Into<DspUnit>) -> Self {
        self.push(unit);
        self
    }

    pub fn push(&mut self, unit: impl Into<DspUnit>) {
        self.units.push(unit.into());
    }

    #[inline] pub fn units(&self) -> &[DspUnit] { &self.units }
    #[inline] pub fn units_mut(&mut self) -> &mut [DspUnit] { &mut self.units }
    #[inline] pub fn len(&self) -> usize { self.units.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.units.is_empty() }
}

impl Dsp for DspChain {
    fn process(&mut self, buf: &mut [f32]) {
        if self.mix <= 0.0 {
            // keep member clocks running
            if self.dry.len() < buf.len() {
                self.dry.resize(buf.len(), 0.0);
            }
            let scratch = &mut self.dry[..buf.len()];
            scratch.copy_from_slice(buf);
            for u in &mut self.units {
                u.process(scratch);
            }
            return;
        }
        let blend_dry = self.mix < 1.0;
        if blend_dry {
            if self.dry.len() < buf.len() {
                self.dry.resize(buf.len(), 0.0);
            }
            self.dry[..buf.len()].copy_from_slice(buf);
        }
        for u in &mut self.units {
            u.process(buf);
        }
        if blend_dry {
            for (s, d) in buf.iter_mut().zip(&self.dry) {
                *s = blend(*d, *s, self.mix);
            }
        }
    }

    fn reset(&mut self) {
        for u in &mut self.units {
            u.reset();
        }
    }

    #[inline] fn mix(&self) -> f32 { self.mix }
    #[inline] fn set_mix(&mut self, mix: f32) { self.mix = clamp01(mix); }
    #[inline] fn sample_rate(&self) -> f32 { self.sr }
}

/// Units fed the same input; their outputs are averaged.
#[derive(Clone, Debug)]
pub struct DspParallel {
    sr: f32,
    mix: f32,
    units: Vec<DspUnit>,
    branch: Vec<f32>,
    sum: Vec<f32>,
}

impl DspParallel {
    pub fn new(sr: f32) -> Self {
        Self { sr: sr.max(1.0), mix: 1.0, units: Vec::new(), branch: Vec::new(), sum: Vec::new() }
    }

    #[must_use]
    pub fn with(mut self, unit: impl Into<DspUnit>) -> Self {
        self.push(unit);
        self
    }

    pub fn push(&mut self, unit: impl Into<DspUnit>) {
        self.units.push(unit.into());
    }

    #[inline] pub fn units(&self) -> &[DspUnit] { &self.units }
    #[inline] pub fn units_mut(&mut self) -> &mut [DspUnit] { &mut self.units }
    #[inline] pub fn len(&self) -> usize { self.units.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.units.is_empty() }
}

impl Dsp for DspParallel {
    fn process(&mut self, buf: &mut [f32]) {
        if self.units.is_empty() {
            return;
        }
        let n = buf.len();
        if self.branch.len() < n {
            self.branch.resize(n, 0.0);
            self.sum.resize(n, 0.0);
        }
        let branch = &mut self.branch[..n];
        let sum = &mut self.sum[..n];
        sum.fill(0.0);

        #[allow(clippy::cast_precision_loss)]
        let weight = 1.0 / self.units.len() as f32;
        for u in &mut self.units {
            branch.copy_from_slice(buf);
            u.process(branch);
            mix_in_place(sum, branch, weight);
        }
        for (s, w) in buf.iter_mut().zip(sum.iter()) {
            *s = blend(*s, *w, self.mix);
        }
    }

    fn reset(&mut self) {
        for u in &mut self.units {
            u.reset();
        }
    }

    #[inline] fn mix(&self) -> f32 { self.mix }
    #[inline] fn set_mix(&mut self, mix: f32) { self.mix = clamp01(mix); }
    #[inline] fn sample_rate(&self) -> f32 { self.sr }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::{BiquadUnit, BitCrusher, Gate};
    use alloc::vec;

    #[test]
    fn chain_applies_units_in_order() {
        let sr = 44_100.0;
        let mut a = BitCrusher::new(sr);
        a.set_reduction(2);
        let mut b = Gate::new(sr);
        b.set_gating(1.0);

        let mut chain = DspChain::new(sr).with(a).with(b);
        let mut expected: Vec<f32> = (0..64).map(|i| i as f32 * 0.01).collect();
        let mut buf = expected.clone();
        chain.process(&mut buf);
        a.process(&mut expected);
        b.process(&mut expected);
        assert_eq!(buf, expected);
    }

    #[test]
    fn chain_group_mix_blends_with_dry() {
        let sr = 48_000.0;
        let mut chain = DspChain::new(sr).with(BiquadUnit::high_pass(sr, 0.707, 500.0));
        chain.set_mix(0.5);
        let mut buf = vec![1.0_f32; 2 * 48_000];
        chain.process(&mut buf);
        assert!((buf[buf.len() - 1] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn parallel_averages_branches() {
        let sr = 48_000.0;
        // DC: the low-pass passes it, the high-pass removes it.
        let mut par = DspParallel::new(sr)
            .with(BiquadUnit::low_pass(sr, 0.707, 1000.0))
            .with(BiquadUnit::high_pass(sr, 0.707, 1000.0));
        let mut buf = vec![1.0_f32; 2 * 4800];
        par.process(&mut buf);
        let last = buf[buf.len() - 1];
        assert!((last - 0.5).abs() < 1e-3, "last={last}");
    }

    #[test]
    fn empty_groups_are_passthrough() {
        let mut chain = DspChain::new(48_000.0);
        let mut par = DspParallel::new(48_000.0);
        let input = vec![0.2_f32, -0.4, 0.6, -0.8];
        let mut a = input.clone();
        let mut b = input.clone();
        chain.process(&mut a);
        par.process(&mut b);
        assert_eq!(a, input);
        assert_eq!(b, input);
    }
}
