//! Cadenza Engine: tracks, effect slots, buses and the mixer.
//!
//! Crate layout:
//! - [`decoder`] : `SampleDecoder` trait, symphonia and in-memory decoders
//! - [`source`]  : `AudioSource` trait, shared handles, test sources
//! - [`track`]   : a decoded, resampled, loopable source
//! - [`effects`] : effect definitions, automation and the slot controller
//! - [`bus`]     : named summing points, finish events
//! - [`mixer`]   : master bus, channel registry, clamped output pull
//! - [`device`]  : CPAL output stream (feature `realtime`)
//!
//! Audio flows by pull: the device asks the mixer for a block, the mixer reads
//! the master bus, and every bus reads its children. The audio path never
//! returns errors and does not allocate once buffers have reached the block
//! size.

pub mod bus;
pub mod config;
pub mod decoder;
pub mod effects;
pub mod error;
pub mod format;
pub mod mixer;
pub mod source;
pub mod track;

cfg_if::cfg_if! {
    if #[cfg(feature = "realtime")] {
        pub mod device;
        pub use device::{list_output_devices, OutputDevice};
    }
}

pub use bus::{assign_channel, Bus, BusEvent, BusHandle};
pub use config::{BufferSize, EngineConfig};
pub use decoder::{MemoryDecoder, SampleDecoder, SymphoniaDecoder, SUPPORTED_EXTENSIONS};
pub use effects::{EffectController, EffectDef, EffectKind, ParamF, ParamI, Timing};
pub use error::{EngineError, EngineResult};
pub use format::AudioFormat;
pub use mixer::Mixer;
pub use source::{shared, AudioSource, ReadOutcome, SharedSource, SourceId, SourceStatus};
pub use track::{PlaybackState, Track, MAX_SPEED, MIN_SPEED};

#[cfg(test)]
mod smoke {
    use super::*;
    use std::time::Duration;

    #[test]
    fn track_through_effects_to_master() {
        let mixer = Mixer::with_format(AudioFormat::stereo(8_000)).unwrap();
        let bus = mixer.add_channel("music").unwrap();

        let dec = MemoryDecoder::from_interleaved(8_000, vec![0.25; 2 * 800]);
        let mut track = Track::from_decoder(Box::new(dec));
        track.play();
        let mut ctl = EffectController::new(2, track);
        ctl.set_effect(1, 0.5, Some(EffectKind::Peaking.default_def()), 1.0).unwrap();
        let ctl = shared(ctl);
        Bus::add_source(&bus, ctl.clone()).unwrap();

        let mut out = vec![0.0_f32; 2 * 64];
        assert_eq!(mixer.render(&mut out), 64);
        // Peaking at 0 dB is transparent.
        assert!(out.iter().all(|s| (*s - 0.25).abs() < 1e-3));
        assert_eq!(ctl.lock().track().cursor(), 64);
        ctl.lock().seek(Duration::from_millis(10)).unwrap();
        assert_eq!(ctl.lock().track().position(), Duration::from_millis(10));
    }
}
