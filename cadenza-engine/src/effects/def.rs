//! Effect definitions: what a slot should run and how it is automated.
//!
//! [`EffectDef`] has one variant per effect kind. A definition builds its
//! unit with [`EffectDef::create`] and pushes automated parameters into it
//! with [`EffectDef::apply`]. Kinds are looked up by name through the static
//! [`FACTORIES`] table, which also holds each kind's default definition.

use cadenza_core::curves::Curve;
use cadenza_core::filters::BiquadMode;
use cadenza_core::units::{
    BiquadUnit, BitCrusher, DspUnit, Flanger, Gate, Phaser, Retrigger, SideChain, TapeStop, Wobble,
};

use super::params::{ParamF, ParamI, Timing};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EffectKind {
    LowPass,
    HighPass,
    Peaking,
    BitCrush,
    Flanger,
    Gate,
    Phaser,
    Retrigger,
    SideChain,
    TapeStop,
    Wobble,
}

impl EffectKind {
    pub const ALL: [EffectKind; 11] = [
        EffectKind::LowPass,
        EffectKind::HighPass,
        EffectKind::Peaking,
        EffectKind::BitCrush,
        EffectKind::Flanger,
        EffectKind::Gate,
        EffectKind::Phaser,
        EffectKind::Retrigger,
        EffectKind::SideChain,
        EffectKind::TapeStop,
        EffectKind::Wobble,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            EffectKind::LowPass => "lowpass",
            EffectKind::HighPass => "highpass",
            EffectKind::Peaking => "peaking",
            EffectKind::BitCrush => "bitcrush",
            EffectKind::Flanger => "flanger",
            EffectKind::Gate => "gate",
            EffectKind::Phaser => "phaser",
            EffectKind::Retrigger => "retrigger",
            EffectKind::SideChain => "sidechain",
            EffectKind::TapeStop => "tapestop",
            EffectKind::Wobble => "wobble",
        }
    }

    /// Case-insensitive; `-`/`_` are ignored (`side-chain`, `Tape_Stop`).
    pub fn from_name(name: &str) -> Option<Self> {
        let norm: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        Self::ALL.into_iter().find(|k| k.name() == norm)
    }

    /// Default definition for this kind.
    pub fn default_def(self) -> EffectDef {
        FACTORIES
            .iter()
            .find(|(k, _)| *k == self)
            .map_or_else(EffectDef::default_low_pass, |(_, make)| make())
    }
}

impl std::fmt::Display for EffectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum EffectDef {
    LowPass { q: ParamF, freq: ParamF },
    HighPass { q: ParamF, freq: ParamF },
    Peaking { q: ParamF, freq: ParamF, gain_db: ParamF },
    /// `reduction` in samples at 44.1 kHz.
    BitCrush { reduction: ParamI },
    /// Delays in samples at 44.1 kHz.
    Flanger { period: Timing, min_delay: ParamF, max_delay: ParamF },
    Gate { length: Timing, gating: ParamF, low_volume: ParamF },
    Phaser { period: Timing, min_freq: ParamF, max_freq: ParamF, feedback: ParamF },
    Retrigger { length: Timing, gating: ParamF, loop_count: ParamI },
    SideChain { length: Timing, amount: ParamF },
    TapeStop { length: Timing },
    Wobble { period: Timing, min_freq: ParamF, max_freq: ParamF, q: ParamF },
}

/// Default definition per kind, indexed in [`EffectKind::ALL`] order.
pub static FACTORIES: [(EffectKind, fn() -> EffectDef); 11] = [
    (EffectKind::LowPass, EffectDef::default_low_pass),
    (EffectKind::HighPass, || EffectDef::HighPass {
        q: ParamF::constant(0.707),
        freq: ParamF::range(20.0, 4000.0).with_curve(Curve::ExpIn),
    }),
    (EffectKind::Peaking, || EffectDef::Peaking {
        q: ParamF::constant(1.0),
        freq: ParamF::constant(1000.0),
        gain_db: ParamF::range(0.0, 12.0),
    }),
    (EffectKind::BitCrush, || EffectDef::BitCrush { reduction: ParamI::range(1, 24) }),
    (EffectKind::Flanger, || EffectDef::Flanger {
        period: Timing::beats(4.0),
        min_delay: ParamF::constant(10.0),
        max_delay: ParamF::constant(40.0),
    }),
    (EffectKind::Gate, || EffectDef::Gate {
        length: Timing::beats(0.5),
        gating: ParamF::constant(0.5),
        low_volume: ParamF::constant(0.1),
    }),
    (EffectKind::Phaser, || EffectDef::Phaser {
        period: Timing::beats(4.0),
        min_freq: ParamF::constant(1500.0),
        max_freq: ParamF::constant(20_000.0),
        feedback: ParamF::constant(0.35),
    }),
    (EffectKind::Retrigger, || EffectDef::Retrigger {
        length: Timing::beats(0.5),
        gating: ParamF::constant(1.0),
        loop_count: ParamI::constant(0),
    }),
    (EffectKind::SideChain, || EffectDef::SideChain {
        length: Timing::beats(1.0),
        amount: ParamF::constant(1.0),
    }),
    (EffectKind::TapeStop, || EffectDef::TapeStop { length: Timing::beats(2.0) }),
    (EffectKind::Wobble, || EffectDef::Wobble {
        period: Timing::beats(0.5),
        min_freq: ParamF::constant(100.0),
        max_freq: ParamF::constant(2000.0),
        q: ParamF::constant(1.0),
    }),
];

impl EffectDef {
    fn default_low_pass() -> Self {
        EffectDef::LowPass {
            q: ParamF::constant(0.707),
            freq: ParamF::range(20_000.0, 300.0).with_curve(Curve::ExpOut),
        }
    }

    pub fn kind(&self) -> EffectKind {
        match self {
            EffectDef::LowPass { .. } => EffectKind::LowPass,
            EffectDef::HighPass { .. } => EffectKind::HighPass,
            EffectDef::Peaking { .. } => EffectKind::Peaking,
            EffectDef::BitCrush { .. } => EffectKind::BitCrush,
            EffectDef::Flanger { .. } => EffectKind::Flanger,
            EffectDef::Gate { .. } => EffectKind::Gate,
            EffectDef::Phaser { .. } => EffectKind::Phaser,
            EffectDef::Retrigger { .. } => EffectKind::Retrigger,
            EffectDef::SideChain { .. } => EffectKind::SideChain,
            EffectDef::TapeStop { .. } => EffectKind::TapeStop,
            EffectDef::Wobble { .. } => EffectKind::Wobble,
        }
    }

    /// A fresh unit of the right kind at `sample_rate`; call [`Self::apply`]
    /// before use.
    pub fn create(&self, sample_rate: f32) -> DspUnit {
        let sr = sample_rate;
        match self {
            EffectDef::LowPass { .. } => BiquadUnit::new(sr, BiquadMode::LowPass, 0.707, 1000.0, 0.0).into(),
            EffectDef::HighPass { .. } => BiquadUnit::new(sr, BiquadMode::HighPass, 0.707, 1000.0, 0.0).into(),
            EffectDef::Peaking { .. } => BiquadUnit::new(sr, BiquadMode::Peaking, 1.0, 1000.0, 0.0).into(),
            EffectDef::BitCrush { .. } => BitCrusher::new(sr).into(),
            EffectDef::Flanger { .. } => Flanger::new(sr).into(),
            EffectDef::Gate { .. } => Gate::new(sr).into(),
            EffectDef::Phaser { .. } => Phaser::new(sr).into(),
            EffectDef::Retrigger { .. } => Retrigger::new(sr).into(),
            EffectDef::SideChain { .. } => SideChain::new(sr).into(),
            EffectDef::TapeStop { .. } => TapeStop::new(sr).into(),
            EffectDef::Wobble { .. } => Wobble::new(sr).into(),
        }
    }

    /// Grow `unit`'s buffers to the largest size any alpha needs at
    /// `qn_dur`, so that [`Self::apply`] at that tempo never allocates.
    pub fn reserve(&self, unit: &mut DspUnit, qn_dur: f64) {
        match (self, unit) {
            (EffectDef::Flanger { min_delay, max_delay, .. }, DspUnit::Flanger(u)) => {
                u.reserve_delay(min_delay.max_value().max(max_delay.max_value()));
            }
            (EffectDef::Retrigger { length, .. }, DspUnit::Retrigger(u)) => {
                u.reserve_length(length.max_seconds(qn_dur));
            }
            (EffectDef::TapeStop { length }, DspUnit::TapeStop(u)) => {
                u.reserve_length(length.max_seconds(qn_dur));
            }
            _ => {}
        }
    }

    /// Sample every automated parameter at `alpha` and push it into `unit`.
    /// State (delay lines, filter history, cycle position) is kept. Returns
    /// `false` if `unit` was built for another kind.
    #[allow(clippy::too_many_lines)]
    pub fn apply(&self, unit: &mut DspUnit, qn_dur: f64, alpha: f32) -> bool {
        let a = alpha;
        match (self, unit) {
            (EffectDef::LowPass { q, freq }, DspUnit::Biquad(u)) => {
                u.set_low_pass(q.sample(a), freq.sample(a));
            }
            (EffectDef::HighPass { q, freq }, DspUnit::Biquad(u)) => {
                u.set_high_pass(q.sample(a), freq.sample(a));
            }
            (EffectDef::Peaking { q, freq, gain_db }, DspUnit::Biquad(u)) => {
                u.set_peaking(q.sample(a), freq.sample(a), gain_db.sample(a));
            }
            (EffectDef::BitCrush { reduction }, DspUnit::BitCrusher(u)) => {
                u.set_reduction(u32::try_from(reduction.sample(a)).unwrap_or(0));
            }
            (EffectDef::Flanger { period, min_delay, max_delay }, DspUnit::Flanger(u)) => {
                u.set_period(period.seconds_at(qn_dur, a));
                u.set_delay_range(min_delay.sample(a), max_delay.sample(a));
            }
            (EffectDef::Gate { length, gating, low_volume }, DspUnit::Gate(u)) => {
                u.set_length(length.seconds_at(qn_dur, a));
                u.set_gating(gating.sample(a));
                u.set_low_volume(low_volume.sample(a));
            }
            (EffectDef::Phaser { period, min_freq, max_freq, feedback }, DspUnit::Phaser(u)) => {
                u.set_period(period.seconds_at(qn_dur, a));
                u.set_frequency_range(min_freq.sample(a), max_freq.sample(a));
                u.set_feedback(feedback.sample(a));
            }
            (EffectDef::Retrigger { length, gating, loop_count }, DspUnit::Retrigger(u)) => {
                u.set_length(length.seconds_at(qn_dur, a));
                u.set_gating(gating.sample(a));
                u.set_loop_count(u32::try_from(loop_count.sample(a)).unwrap_or(0));
            }
            (EffectDef::SideChain { length, amount }, DspUnit::SideChain(u)) => {
                u.set_length(length.seconds_at(qn_dur, a));
                u.set_amount(amount.sample(a));
            }
            (EffectDef::TapeStop { length }, DspUnit::TapeStop(u)) => {
                u.set_length(length.seconds_at(qn_dur, a));
            }
            (EffectDef::Wobble { period, min_freq, max_freq, q }, DspUnit::Wobble(u)) => {
                u.set_period(period.seconds_at(qn_dur, a));
                u.set_frequency_range(min_freq.sample(a), max_freq.sample(a));
                u.set_q(q.sample(a));
            }
            (def, _) => {
                log::warn!("effect {} does not match the slot's unit", def.kind());
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadenza_core::units::Dsp;

    #[test]
    fn factory_table_covers_every_kind() {
        assert_eq!(FACTORIES.len(), EffectKind::ALL.len());
        for (i, kind) in EffectKind::ALL.into_iter().enumerate() {
            assert_eq!(FACTORIES[i].0, kind);
            let def = kind.default_def();
            assert_eq!(def.kind(), kind);
            let mut unit = def.create(48_000.0);
            assert!(def.apply(&mut unit, 0.5, 0.5), "{kind}");
        }
    }

    #[test]
    fn names_round_trip() {
        for kind in EffectKind::ALL {
            assert_eq!(EffectKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(EffectKind::from_name("Side-Chain"), Some(EffectKind::SideChain));
        assert_eq!(EffectKind::from_name("reverb"), None);
    }

    #[test]
    fn apply_rejects_mismatched_units() {
        let gate = EffectKind::Gate.default_def();
        let mut unit = EffectKind::Wobble.default_def().create(44_100.0);
        assert!(!gate.apply(&mut unit, 0.5, 0.0));
    }

    #[test]
    fn alpha_drives_filter_cutoff() {
        let def = EffectDef::LowPass { q: ParamF::constant(0.707), freq: ParamF::range(8000.0, 500.0) };
        let mut unit = def.create(48_000.0);
        def.apply(&mut unit, 0.5, 1.0);
        let DspUnit::Biquad(u) = &unit else { panic!("not a biquad") };
        assert_eq!(u.freq(), 500.0);
        assert_eq!(u.mode(), BiquadMode::LowPass);
        assert_eq!(unit.mix(), 1.0);
    }

    #[test]
    fn reserve_covers_the_whole_automation_range() {
        let def = EffectDef::Retrigger {
            length: Timing::Beats(ParamF::range(0.25, 2.0)),
            gating: ParamF::constant(1.0),
            loop_count: ParamI::constant(0),
        };
        let mut unit = def.create(1_000.0);
        def.reserve(&mut unit, 0.5);
        def.apply(&mut unit, 0.5, 0.0);
        let DspUnit::Retrigger(r) = &unit else { panic!("not a retrigger") };
        assert_eq!(r.length(), 125);
        assert_eq!(r.capacity(), 1_000);

        let def = EffectDef::Flanger {
            period: Timing::beats(1.0),
            min_delay: ParamF::range(300.0, 10.0),
            max_delay: ParamF::range(20.0, 50.0),
        };
        let mut unit = def.create(44_100.0);
        def.reserve(&mut unit, 0.5);
        let DspUnit::Flanger(f) = &unit else { panic!("not a flanger") };
        assert_eq!(f.capacity(), 600);
    }

    #[test]
    fn gate_length_follows_quarter_note() {
        let def = EffectDef::Gate {
            length: Timing::beats(1.0),
            gating: ParamF::constant(0.5),
            low_volume: ParamF::constant(0.0),
        };
        let mut unit = def.create(48_000.0);
        def.apply(&mut unit, 0.5, 0.0);
        let DspUnit::Gate(g) = &unit else { panic!("not a gate") };
        assert_eq!(g.length(), 24_000);
    }
}
