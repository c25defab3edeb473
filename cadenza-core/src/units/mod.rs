//! DSP units: stateful in-place transforms over interleaved stereo buffers.
//!
//! Every unit
//! - processes `[l0, r0, l1, r1, ...]` in place (a trailing odd sample is left untouched),
//! - keeps its state (delay lines, filter history, cycle position) across calls,
//! - clears that state only in [`Dsp::reset`], never when parameters change,
//! - blends its output with the dry signal by `mix`, clamped to `[0, 1]`.
//!
//! Parameter setters allocate only when a delay buffer has to grow; `process`
//! never allocates.
//!
//! Periodic units take their period in seconds. Callers that think in musical
//! time convert a quarter-note duration first (see the engine's effect layer).

pub mod biquad;
pub mod bitcrusher;
pub mod chain;
pub mod flanger;
pub mod gate;
pub mod phaser;
pub mod retrigger;
pub mod sidechain;
pub mod tapestop;
pub mod wobble;

pub use biquad::BiquadUnit;
pub use bitcrusher::BitCrusher;
pub use chain::{DspChain, DspParallel};
pub use flanger::Flanger;
pub use gate::Gate;
pub use phaser::Phaser;
pub use retrigger::Retrigger;
pub use sidechain::SideChain;
pub use tapestop::TapeStop;
pub use wobble::Wobble;

/// The in-place processing contract shared by every unit.
pub trait Dsp {
    /// Process an interleaved stereo buffer in place.
    fn process(&mut self, buf: &mut [f32]);

    /// Clear internal state (delay lines, phase counters, filter history).
    fn reset(&mut self);

    /// Dry/wet amount in `[0, 1]`.
    fn mix(&self) -> f32;

    /// Set the dry/wet amount; out-of-range values are clamped.
    fn set_mix(&mut self, mix: f32);

    fn sample_rate(&self) -> f32;
}

/// Statically dispatched unit. Slots and chains hold these rather than boxed
/// trait objects so swapping effects never touches the allocator on the
/// audio thread.
#[derive(Clone, Debug)]
pub enum DspUnit {
    Biquad(BiquadUnit),
    BitCrusher(BitCrusher),
    Flanger(Flanger),
    Gate(Gate),
    Phaser(Phaser),
    Retrigger(Retrigger),
    SideChain(SideChain),
    TapeStop(TapeStop),
    Wobble(Wobble),
}

macro_rules! dispatch {
    ($self:expr, $u:ident => $body:expr) => {
        match $self {
            DspUnit::Biquad($u) => $body,
            DspUnit::BitCrusher($u) => $body,
            DspUnit::Flanger($u) => $body,
            DspUnit::Gate($u) => $body,
            DspUnit::Phaser($u) => $body,
            DspUnit::Retrigger($u) => $body,
            DspUnit::SideChain($u) => $body,
            DspUnit::TapeStop($u) => $body,
            DspUnit::Wobble($u) => $body,
        }
    };
}

impl Dsp for DspUnit {
    #[inline]
    fn process(&mut self, buf: &mut [f32]) {
        dispatch!(self, u => u.process(buf));
    }

    #[inline]
    fn reset(&mut self) {
        dispatch!(self, u => u.reset());
    }

    #[inline]
    fn mix(&self) -> f32 {
        dispatch!(self, u => u.mix())
    }

    #[inline]
    fn set_mix(&mut self, mix: f32) {
        dispatch!(self, u => u.set_mix(mix));
    }

    #[inline]
    fn sample_rate(&self) -> f32 {
        dispatch!(self, u => u.sample_rate())
    }
}

macro_rules! impl_from_unit {
    ($($variant:ident),* $(,)?) => {
        $(impl From<$variant> for DspUnit {
            fn from(u: $variant) -> Self { DspUnit::$variant(u) }
        })*
    };
}

impl_from_unit!(BitCrusher, Flanger, Gate, Phaser, Retrigger, SideChain, TapeStop, Wobble);

impl From<BiquadUnit> for DspUnit {
    fn from(u: BiquadUnit) -> Self {
        DspUnit::Biquad(u)
    }
}
