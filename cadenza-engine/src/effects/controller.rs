//! Effect controller: a track with a fixed row of effect slots.
//!
//! The track is always read first. Every occupied slot then processes the
//! buffer in order, active or not: an inactive slot runs on a private copy
//! that is thrown away, so its cycles and delay lines stay in time with the
//! music while it is bypassed. Re-enabling a slot resets it.
//!
//! Slot changes are control calls taken under the source lock, so they land
//! between two audio blocks. Units size their buffers for the whole
//! automation range when they are installed, so `update_effect` at the same
//! tempo never allocates.

use std::time::Duration;

use cadenza_core::dsp::{clamp01, scale_in_place};
use cadenza_core::units::{Dsp, DspUnit};

use crate::config::DEFAULT_BLOCK_FRAMES;
use crate::error::{EngineError, EngineResult};
use crate::format::AudioFormat;
use crate::source::{AudioSource, ReadOutcome, SourceCore};
use crate::track::Track;

use super::def::EffectDef;

#[derive(Debug)]
struct Slot {
    def: EffectDef,
    unit: DspUnit,
    active: bool,
    alpha: f32,
    /// Quarter-note duration the buffers were reserved for.
    qn_dur: f64,
}

impl Slot {
    #[allow(clippy::cast_precision_loss)]
    fn build(def: &EffectDef, rate: u32, qn_dur: f64, alpha: f32, mix: f32) -> DspUnit {
        let mut unit = def.create(rate as f32);
        def.reserve(&mut unit, qn_dur);
        def.apply(&mut unit, qn_dur, alpha);
        unit.set_mix(mix);
        unit.reset();
        unit
    }
}

#[derive(Debug)]
pub struct EffectController {
    core: SourceCore,
    track: Track,
    slots: Vec<Option<Slot>>,
    scratch: Vec<f32>,
}

impl EffectController {
    pub fn new(slot_count: usize, track: Track) -> Self {
        let format = track.format();
        Self {
            core: SourceCore::default(),
            track,
            slots: (0..slot_count).map(|_| None).collect(),
            scratch: vec![0.0; format.samples_for(DEFAULT_BLOCK_FRAMES)],
        }
    }

    #[inline] pub fn track(&self) -> &Track { &self.track }
    #[inline] pub fn track_mut(&mut self) -> &mut Track { &mut self.track }
    #[inline] pub fn slot_count(&self) -> usize { self.slots.len() }

    fn check(&self, slot: usize) -> EngineResult<()> {
        if slot < self.slots.len() {
            Ok(())
        } else {
            Err(EngineError::SlotOutOfRange { slot, slots: self.slots.len() })
        }
    }

    /// Install `def` in `slot` (or clear it with `None`).
    ///
    /// The new unit starts fresh and active, with its parameters sampled at
    /// alpha 0 and its dry/wet set to `mix`.
    pub fn set_effect(
        &mut self,
        slot: usize,
        qn_dur: f64,
        def: Option<EffectDef>,
        mix: f32,
    ) -> EngineResult<()> {
        self.check(slot)?;
        let rate = self.track.output_rate();
        self.slots[slot] = def.map(|def| {
            let unit = Slot::build(&def, rate, qn_dur, 0.0, mix);
            log::debug!("slot {slot}: {} (mix {:.2})", def.kind(), unit.mix());
            Slot { def, unit, active: true, alpha: 0.0, qn_dur }
        });
        if self.slots[slot].is_none() {
            log::debug!("slot {slot}: cleared");
        }
        Ok(())
    }

    /// Re-sample the slot's parameters at `alpha` (clamped to `[0, 1]`).
    /// Unit state is kept. An empty slot ignores the call.
    ///
    /// A new `qn_dur` may grow the unit's buffers once; further updates at
    /// that tempo do not allocate.
    pub fn update_effect(&mut self, slot: usize, qn_dur: f64, alpha: f32) -> EngineResult<()> {
        self.check(slot)?;
        if let Some(s) = &mut self.slots[slot] {
            if s.qn_dur.to_bits() != qn_dur.to_bits() {
                s.def.reserve(&mut s.unit, qn_dur);
                s.qn_dur = qn_dur;
            }
            s.alpha = clamp01(alpha);
            s.def.apply(&mut s.unit, qn_dur, s.alpha);
        }
        Ok(())
    }

    /// Bypass or restore a slot. Going from inactive to active resets the
    /// unit; an empty slot ignores the call.
    pub fn set_effect_active(&mut self, slot: usize, active: bool) -> EngineResult<()> {
        self.check(slot)?;
        if let Some(s) = &mut self.slots[slot] {
            if active && !s.active {
                s.unit.reset();
            }
            s.active = active;
        }
        Ok(())
    }

    pub fn set_effect_mix(&mut self, slot: usize, mix: f32) -> EngineResult<()> {
        self.check(slot)?;
        if let Some(s) = &mut self.slots[slot] {
            s.unit.set_mix(mix);
        }
        Ok(())
    }

    pub fn effect(&self, slot: usize) -> Option<&EffectDef> {
        self.slots.get(slot)?.as_ref().map(|s| &s.def)
    }

    pub fn is_effect_active(&self, slot: usize) -> bool {
        self.slots.get(slot).and_then(Option::as_ref).is_some_and(|s| s.active)
    }

    pub fn effect_mix(&self, slot: usize) -> Option<f32> {
        self.slots.get(slot)?.as_ref().map(|s| s.unit.mix())
    }

    /// Last automation value pushed to `slot`.
    pub fn effect_alpha(&self, slot: usize) -> Option<f32> {
        self.slots.get(slot)?.as_ref().map(|s| s.alpha)
    }

    /// The unit running in `slot`.
    pub fn unit(&self, slot: usize) -> Option<&DspUnit> {
        self.slots.get(slot)?.as_ref().map(|s| &s.unit)
    }
}

impl AudioSource for EffectController {
    fn format(&self) -> AudioFormat {
        self.track.format()
    }

    fn read(&mut self, out: &mut [f32]) -> ReadOutcome {
        let outcome = self.track.read(out);
        if self.scratch.len() < out.len() {
            self.scratch.resize(out.len(), 0.0);
        }
        let scratch = &mut self.scratch[..out.len()];
        for s in self.slots.iter_mut().flatten() {
            if s.active {
                s.unit.process(out);
            } else {
                scratch.copy_from_slice(out);
                s.unit.process(scratch);
            }
        }
        scale_in_place(out, self.core.volume());
        outcome
    }

    fn seek(&mut self, position: Duration) -> EngineResult<()> {
        self.track.seek(position)
    }

    /// Moves the track to `rate` and rebuilds every unit for it, keeping
    /// each slot's definition, automation, mix and active flag.
    fn set_output_rate(&mut self, rate: u32) {
        if rate == self.track.output_rate() {
            return;
        }
        self.track.set_output_rate(rate);
        let rate = self.track.output_rate();
        for s in self.slots.iter_mut().flatten() {
            s.unit = Slot::build(&s.def, rate, s.qn_dur, s.alpha, s.unit.mix());
        }
        log::debug!("effect controller: output rate {rate} Hz");
    }

    fn core(&self) -> &SourceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SourceCore {
        &mut self.core
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::MemoryDecoder;
    use crate::effects::def::EffectKind;
    use crate::effects::params::{ParamF, Timing};

    const SR: u32 = 1_000;

    fn controller(slots: usize, value: f32, frames: usize) -> EffectController {
        let dec = MemoryDecoder::from_interleaved(SR, vec![value; frames * 2]);
        let mut track = Track::from_decoder(Box::new(dec));
        track.play();
        EffectController::new(slots, track)
    }

    fn gate(low: f32) -> EffectDef {
        EffectDef::Gate {
            length: Timing::seconds(0.004),
            gating: ParamF::constant(0.5),
            low_volume: ParamF::constant(low),
        }
    }

    #[test]
    fn empty_controller_passes_the_track_through() {
        let mut c = controller(3, 0.5, 16);
        let mut out = vec![0.0_f32; 2 * 8];
        assert_eq!(c.read(&mut out), ReadOutcome::active(8));
        assert!(out.iter().all(|s| *s == 0.5));
    }

    #[test]
    fn slots_are_bounds_checked() {
        let mut c = controller(2, 0.5, 4);
        for r in [
            c.set_effect(2, 0.5, None, 1.0),
            c.update_effect(5, 0.5, 0.0),
            c.set_effect_active(2, false),
            c.set_effect_mix(9, 0.5),
        ] {
            assert!(matches!(r, Err(EngineError::SlotOutOfRange { slots: 2, .. })));
        }
        assert!(c.effect(7).is_none());
        assert!(!c.is_effect_active(7));
    }

    #[test]
    fn gate_shapes_the_output() {
        let mut c = controller(1, 1.0, 64);
        c.set_effect(0, 0.5, Some(gate(0.0)), 1.0).unwrap();
        assert_eq!(c.effect(0).map(EffectDef::kind), Some(EffectKind::Gate));
        assert!(c.is_effect_active(0));
        let mut out = vec![0.0_f32; 2 * 4];
        c.read(&mut out);
        let left: Vec<f32> = out.iter().step_by(2).copied().collect();
        assert_eq!(left, vec![1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn inactive_slots_keep_time_but_not_sound() {
        let mut c = controller(1, 1.0, 64);
        c.set_effect(0, 0.5, Some(gate(0.0)), 1.0).unwrap();
        c.set_effect_active(0, false).unwrap();
        let position = |c: &EffectController| {
            let DspUnit::Gate(g) = c.unit(0).unwrap() else { panic!("not a gate") };
            g.position()
        };
        assert_eq!(position(&c), 0);
        let mut out = vec![0.0_f32; 2 * 3];
        c.read(&mut out);
        assert!(out.iter().all(|s| *s == 1.0));
        assert_eq!(position(&c), 3);
        c.read(&mut out);
        // 6 frames into a 4-frame cycle.
        assert_eq!(position(&c), 2);

        // Re-enabling starts the cycle over.
        c.set_effect_active(0, true).unwrap();
        let mut out = vec![0.0_f32; 2 * 4];
        c.read(&mut out);
        let left: Vec<f32> = out.iter().step_by(2).copied().collect();
        assert_eq!(left, vec![1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn update_clamps_alpha_and_keeps_the_kind() {
        let mut c = controller(1, 0.0, 8);
        let def = EffectDef::LowPass {
            q: ParamF::constant(0.707),
            freq: ParamF::range(400.0, 100.0),
        };
        c.set_effect(0, 0.5, Some(def), 0.6).unwrap();
        c.update_effect(0, 0.5, 3.0).unwrap();
        assert_eq!(c.effect_alpha(0), Some(1.0));
        let DspUnit::Biquad(u) = c.unit(0).unwrap() else { panic!("not a biquad") };
        assert_eq!(u.freq(), 100.0);
        assert!((c.effect_mix(0).unwrap() - 0.6).abs() < 1e-6);

        c.set_effect_mix(0, 4.0).unwrap();
        assert_eq!(c.effect_mix(0), Some(1.0));
        c.set_effect(0, 0.5, None, 1.0).unwrap();
        assert!(c.effect(0).is_none());
        // Empty slots ignore updates.
        c.update_effect(0, 0.5, 0.5).unwrap();
        c.set_effect_active(0, true).unwrap();
        assert!(!c.is_effect_active(0));
    }

    #[test]
    fn volume_applies_after_effects() {
        let mut c = controller(1, 1.0, 16);
        c.set_effect(0, 0.5, Some(gate(0.5)), 1.0).unwrap();
        c.set_volume(0.5);
        let mut out = vec![0.0_f32; 2 * 4];
        c.read(&mut out);
        let left: Vec<f32> = out.iter().step_by(2).copied().collect();
        assert_eq!(left, vec![0.5, 0.5, 0.25, 0.25]);
    }

    #[test]
    fn seek_and_finish_come_from_the_track() {
        let mut c = controller(1, 0.5, 4);
        c.set_effect(0, 0.5, Some(EffectKind::BitCrush.default_def()), 1.0).unwrap();
        c.seek(Duration::from_millis(2)).unwrap();
        assert_eq!(c.track().cursor(), 2);
        let mut out = vec![0.0_f32; 2 * 8];
        assert_eq!(c.read(&mut out).frames, 2);
        assert!(c.read(&mut out).is_finished());
    }

    #[test]
    fn rate_changes_rebuild_units() {
        let mut c = controller(2, 1.0, 64);
        c.set_effect(0, 0.5, Some(gate(0.0)), 0.8).unwrap();
        c.update_effect(0, 0.5, 0.3).unwrap();
        c.set_effect_active(0, false).unwrap();
        AudioSource::set_output_rate(&mut c, 2 * SR);

        assert_eq!(c.track().output_rate(), 2 * SR);
        assert_eq!(c.format().sample_rate, 2 * SR);
        let DspUnit::Gate(g) = c.unit(0).unwrap() else { panic!("not a gate") };
        assert_eq!(g.length(), 8);
        assert_eq!(g.sample_rate(), 2_000.0);
        assert!((c.effect_mix(0).unwrap() - 0.8).abs() < 1e-6);
        assert_eq!(c.effect_alpha(0), Some(0.3));
        assert!(!c.is_effect_active(0));
    }

    #[test]
    fn automation_inside_the_reserved_range_keeps_buffers() {
        let mut c = controller(1, 0.5, 64);
        let def = EffectDef::TapeStop { length: Timing::Seconds(ParamF::range(0.01, 2.0)) };
        c.set_effect(0, 0.5, Some(def), 1.0).unwrap();
        let capacity = |c: &EffectController| {
            let DspUnit::TapeStop(t) = c.unit(0).unwrap() else { panic!("not a tape stop") };
            (t.capacity(), t.length())
        };
        assert_eq!(capacity(&c), (2_000, 10));
        c.update_effect(0, 0.5, 1.0).unwrap();
        assert_eq!(capacity(&c), (2_000, 2_000));
    }
}
