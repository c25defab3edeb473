//! Effect layer: automated definitions and the per-track slot controller.
//!
//! - [`params`]     : parameters sampled from an automation value in `[0, 1]`
//! - [`def`]        : one definition per effect kind, plus the factory table
//! - [`controller`] : [`EffectController`], a track followed by effect slots

pub mod controller;
pub mod def;
pub mod params;

pub use controller::EffectController;
pub use def::{EffectDef, EffectKind, FACTORIES};
pub use params::{ParamF, ParamI, Timing};
