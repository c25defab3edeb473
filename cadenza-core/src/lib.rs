#![cfg_attr(not(feature = "std"), no_std)]
//! Cadenza Core: no_std-ready DSP units for the Cadenza mixing engine.
//!
//! Features
//! - `std`      : (default) use the Rust standard library
//! - `no-std`   : build with `#![no_std]` + `alloc` and use the `libm` math backend
//! - `micromath`: use `micromath` instead of `libm`
//! - `fast-math`: polynomial sine/cosine for the modulation LFOs
//! - `simd`     : vectorised buffer mixing via `wide`
//!
//! Modules
//! - [`dsp`]     : math backend, blend/lerp/clamp helpers, buffer helpers
//! - [`filters`] : RBJ biquad (LP/HP/peaking) and a first-order all-pass
//! - [`curves`]  : automation/envelope curves
//! - [`clock`]   : sample-exact cycle counter for periodic units
//! - [`units`]   : the effect units, the [`units::Dsp`] trait, chains and parallel groups
//!
//! Design
//! - Buffers are interleaved stereo; units process them in place
//! - `process` never allocates; delay buffers grow only from parameter setters
//! - Parameter setters keep state, only `reset` clears it

extern crate alloc;

pub mod clock;
pub mod curves;
pub mod dsp;
pub mod filters;
pub mod units;

/// Commonly used types/functions for convenience:
pub mod prelude {
    pub use crate::clock::Cycle;
    pub use crate::curves::Curve;
    pub use crate::dsp::{blend, clamp, clamp01, db_to_lin, lerp, CHANNELS, TAU};
    pub use crate::filters::{Biquad, BiquadCoeffs, BiquadMode};
    pub use crate::units::{
        BiquadUnit, BitCrusher, Dsp, DspChain, DspParallel, DspUnit, Flanger, Gate, Phaser,
        Retrigger, SideChain, TapeStop, Wobble,
    };
}
