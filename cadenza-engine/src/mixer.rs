//! Mixer: the root of the graph.
//!
//! A mixer owns the master bus and a registry of named channel buses that
//! feed it. It is an ordinary value: create one per engine (or per test) and
//! share it with the output device through an `Arc`.
//!
//! The graph always runs in stereo. A mono output gets the two channels
//! averaged in [`Mixer::render`].

use std::collections::BTreeMap;
use std::sync::Arc;

use cadenza_core::dsp::{clamp_in_place, CHANNELS};
use parking_lot::Mutex;

use crate::bus::{Bus, BusHandle};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::format::AudioFormat;
use crate::source::{AudioSource, SharedSource};

pub const MASTER_NAME: &str = "master";

const SAMPLE_BYTES: usize = std::mem::size_of::<f32>();

pub struct Mixer {
    config: EngineConfig,
    master: BusHandle,
    channels: Mutex<BTreeMap<String, BusHandle>>,
    /// Stereo render target for mono output.
    fold: Mutex<Vec<f32>>,
    /// Float staging for `read_bytes`.
    staging: Mutex<Vec<f32>>,
}

impl std::fmt::Debug for Mixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mixer")
            .field("format", &self.format())
            .field("channels", &self.channel_names())
            .finish_non_exhaustive()
    }
}

impl Mixer {
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let master = Arc::new(Mutex::new(Bus::with_capacity(
            MASTER_NAME,
            AudioFormat::stereo(config.sample_rate),
            config.block_frames,
            config.event_capacity,
        )));
        let scratch = CHANNELS * config.block_frames;
        log::info!(
            "mixer: {} Hz, {} ch, block {} frames",
            config.sample_rate,
            config.channels,
            config.block_frames
        );
        Ok(Self {
            config,
            master,
            channels: Mutex::new(BTreeMap::new()),
            fold: Mutex::new(vec![0.0; scratch]),
            staging: Mutex::new(vec![0.0; scratch]),
        })
    }

    pub fn with_format(format: AudioFormat) -> EngineResult<Self> {
        Self::new(
            EngineConfig::default()
                .with_sample_rate(format.sample_rate)
                .with_channels(format.channels),
        )
    }

    #[inline] pub fn master(&self) -> &BusHandle { &self.master }
    #[inline] pub fn config(&self) -> &EngineConfig { &self.config }

    /// Output format handed to the device.
    #[inline]
    pub fn format(&self) -> AudioFormat {
        self.config.format()
    }

    /// Create a channel bus named `name` and attach it to the master bus.
    pub fn add_channel(&self, name: &str) -> EngineResult<BusHandle> {
        let mut channels = self.channels.lock();
        if channels.contains_key(name) {
            return Err(EngineError::DuplicateChannel(name.to_owned()));
        }
        let bus = Arc::new(Mutex::new(Bus::with_capacity(
            name,
            AudioFormat::stereo(self.config.sample_rate),
            self.config.block_frames,
            self.config.event_capacity,
        )));
        let as_source: SharedSource = bus.clone();
        Bus::add_source(&self.master, as_source)?;
        channels.insert(name.to_owned(), bus.clone());
        log::debug!("mixer: added channel '{name}'");
        Ok(bus)
    }

    /// Detach and forget a channel. Its sources stay attached to it.
    pub fn remove_channel(&self, name: &str) -> Option<BusHandle> {
        let bus = self.channels.lock().remove(name)?;
        let as_source: SharedSource = bus.clone();
        Bus::remove_source(&self.master, &as_source);
        log::debug!("mixer: removed channel '{name}'");
        Some(bus)
    }

    pub fn channel(&self, name: &str) -> Option<BusHandle> {
        self.channels.lock().get(name).cloned()
    }

    /// Registered channel names, sorted.
    pub fn channel_names(&self) -> Vec<String> {
        self.channels.lock().keys().cloned().collect()
    }

    /// Pull one block from the master bus into `out` (interleaved in the
    /// output channel count). Every sample is clamped to `[-1, 1]`. Returns
    /// the number of frames written.
    pub fn render(&self, out: &mut [f32]) -> usize {
        if self.config.channels == 1 {
            let mut fold = self.fold.lock();
            let n = out.len();
            if fold.len() < n * CHANNELS {
                fold.resize(n * CHANNELS, 0.0);
            }
            let stereo = &mut fold[..n * CHANNELS];
            self.master.lock().read(stereo);
            for (o, lr) in out.iter_mut().zip(stereo.chunks_exact(CHANNELS)) {
                *o = 0.5 * (lr[0] + lr[1]);
            }
            clamp_in_place(out, -1.0, 1.0);
            return n;
        }

        let n = out.len() / CHANNELS;
        let used = n * CHANNELS;
        self.master.lock().read(&mut out[..used]);
        out[used..].fill(0.0);
        clamp_in_place(out, -1.0, 1.0);
        n
    }

    /// Byte-oriented pull: fill `bytes[offset..offset + count]` with 32-bit
    /// float little-endian samples. Only whole samples are written; the
    /// return value is the number of bytes written.
    pub fn read_bytes(&self, bytes: &mut [u8], offset: usize, count: usize) -> usize {
        let end = offset.saturating_add(count).min(bytes.len());
        if offset >= end {
            return 0;
        }
        let region = &mut bytes[offset..end];
        let samples = region.len() / SAMPLE_BYTES;
        let mut staging = self.staging.lock();
        if staging.len() < samples {
            staging.resize(samples, 0.0);
        }
        let floats = &mut staging[..samples];
        self.render(floats);
        for (dst, s) in region.chunks_exact_mut(SAMPLE_BYTES).zip(floats.iter()) {
            dst.copy_from_slice(&s.to_le_bytes());
        }
        samples * SAMPLE_BYTES
    }
}
