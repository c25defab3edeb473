//! Bus: a named mixing point that sums child sources.
//!
//! A bus is itself a source, so buses nest (channel buses feed the master).
//! Lock order is always parent before child: the audio thread holds a bus
//! while it reads that bus's sources, and control-side calls never hold a
//! source lock while taking a bus lock.
//!
//! Finished sources are retired from inside `read`. Each finish is reported
//! once on the bus event queue, which the control thread drains at leisure.

use std::sync::Arc;

use cadenza_core::dsp::{mix_in_place, scale_in_place};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use crate::config::{DEFAULT_BLOCK_FRAMES, DEFAULT_EVENT_CAPACITY};
use crate::error::{EngineError, EngineResult};
use crate::format::AudioFormat;
use crate::source::{AudioSource, ReadOutcome, SharedSource, SourceCore, SourceId};

pub type BusHandle = Arc<Mutex<Bus>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BusEvent {
    /// A source returned no audio (or reported finished).
    SourceFinished { bus: Arc<str>, source: SourceId },
}

struct Entry {
    id: SourceId,
    source: SharedSource,
    /// Finish already reported; cleared when the source plays again.
    finished: bool,
}

pub struct Bus {
    core: SourceCore,
    name: Arc<str>,
    format: AudioFormat,
    sources: Vec<Entry>,
    scratch: Vec<f32>,
    persist: bool,
    events_tx: Sender<BusEvent>,
    events_rx: Receiver<BusEvent>,
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("name", &self.name)
            .field("sources", &self.sources.len())
            .field("persist", &self.persist)
            .field("volume", &self.core.volume())
            .finish_non_exhaustive()
    }
}

impl Bus {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self::with_capacity(name, AudioFormat::default(), DEFAULT_BLOCK_FRAMES, DEFAULT_EVENT_CAPACITY)
    }

    /// Scratch pre-sized for `block_frames`; `event_capacity` bounds the finish queue.
    pub fn with_capacity(
        name: impl Into<Arc<str>>,
        format: AudioFormat,
        block_frames: usize,
        event_capacity: usize,
    ) -> Self {
        let (events_tx, events_rx) = bounded(event_capacity.max(1));
        Self {
            core: SourceCore::default(),
            name: name.into(),
            format,
            sources: Vec::new(),
            scratch: vec![0.0; format.samples_for(block_frames)],
            persist: false,
            events_tx,
            events_rx,
        }
    }

    pub fn shared(name: impl Into<Arc<str>>) -> BusHandle {
        Arc::new(Mutex::new(Self::new(name)))
    }

    #[inline] pub fn name(&self) -> &str { &self.name }
    #[inline] pub fn len(&self) -> usize { self.sources.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.sources.is_empty() }

    pub fn contains(&self, source: &SharedSource) -> bool {
        self.contains_id(SourceId::of(source))
    }

    fn contains_id(&self, id: SourceId) -> bool {
        self.sources.iter().any(|e| e.id == id)
    }

    /// Keep finished sources attached instead of retiring them.
    pub fn set_persist_sources(&mut self, persist: bool) {
        self.persist = persist;
    }

    #[inline] pub fn persist_sources(&self) -> bool { self.persist }

    /// Finish notifications. Every clone shares one queue.
    pub fn events(&self) -> Receiver<BusEvent> {
        self.events_rx.clone()
    }

    /// Attach `source` to `bus`, detaching it from its previous bus first.
    pub fn add_source(bus: &BusHandle, source: SharedSource) -> EngineResult<()> {
        assign_channel(&source, Some(bus))
    }

    /// Detach `source` if `bus` holds it.
    pub fn remove_source(bus: &BusHandle, source: &SharedSource) -> bool {
        let removed = bus.lock().detach(SourceId::of(source));
        if removed {
            source.lock().core_mut().clear_channel_if(Arc::as_ptr(bus));
        }
        removed
    }

    /// Children of this bus, in attach order.
    pub fn sources(&self) -> Vec<SharedSource> {
        self.sources.iter().map(|e| e.source.clone()).collect()
    }

    fn attach(&mut self, source: SharedSource) {
        let id = SourceId::of(&source);
        if !self.contains_id(id) {
            self.sources.push(Entry { id, source, finished: false });
        }
    }

    fn detach(&mut self, id: SourceId) -> bool {
        match self.sources.iter().position(|e| e.id == id) {
            Some(i) => {
                self.sources.remove(i);
                true
            }
            None => false,
        }
    }

    fn notify_finished(&self, id: SourceId) {
        let event = BusEvent::SourceFinished { bus: self.name.clone(), source: id };
        if let Err(TrySendError::Full(_)) = self.events_tx.try_send(event) {
            log::warn!("bus '{}': event queue full, dropping finish of {id:?}", self.name);
        }
    }
}

/// Whether `target` is `from` or is reachable below it.
fn reaches(from: &SharedSource, target: SourceId) -> bool {
    if SourceId::of(from) == target {
        return true;
    }
    let guard = from.lock();
    guard
        .as_bus()
        .is_some_and(|bus| bus.sources.iter().any(|e| reaches(&e.source, target)))
}

/// Move `source` to `bus` (or detach it with `None`).
///
/// The source is switched to the bus's sample rate before it is attached.
/// Re-assigning the current bus is a no-op. Attaching a bus under itself, or
/// under one of its own descendants, fails with [`EngineError::BusCycle`].
pub fn assign_channel(source: &SharedSource, bus: Option<&BusHandle>) -> EngineResult<()> {
    let prev = source.lock().core().channel();
    let same = match (&prev, bus) {
        (Some(p), Some(b)) => Arc::ptr_eq(p, b),
        (None, None) => true,
        _ => false,
    };
    if same {
        return Ok(());
    }
    if let Some(b) = bus {
        let as_source: SharedSource = b.clone();
        if reaches(source, SourceId::of(&as_source)) {
            return Err(EngineError::BusCycle);
        }
    }

    let id = SourceId::of(source);
    if let Some(p) = &prev {
        p.lock().detach(id);
    }
    if let Some(b) = bus {
        // Before attaching, so the first read already runs at the bus rate.
        let rate = b.lock().format.sample_rate;
        source.lock().set_output_rate(rate);
        let mut guard = b.lock();
        guard.attach(source.clone());
        log::debug!("source {id:?} -> bus '{}'", guard.name());
    }
    source.lock().core_mut().set_channel(bus);
    Ok(())
}

impl AudioSource for Bus {
    fn format(&self) -> AudioFormat {
        self.format
    }

    /// Always fills the whole request; never finishes.
    fn read(&mut self, out: &mut [f32]) -> ReadOutcome {
        let n = out.len();
        out.fill(0.0);
        if self.scratch.len() < n {
            self.scratch.resize(n, 0.0);
        }
        let channels = usize::from(self.format.channels.max(1));

        // Reverse so removals do not shift entries still to be visited.
        for i in (0..self.sources.len()).rev() {
            let scratch = &mut self.scratch[..n];
            let outcome = {
                let mut src = self.sources[i].source.lock();
                let outcome = src.read(scratch);
                if outcome.is_finished() && !self.persist {
                    src.core_mut().set_channel(None);
                }
                outcome
            };
            let frames = outcome.frames.min(n / channels);
            // Past the longest child the accumulator stays silent.
            mix_in_place(&mut out[..frames * channels], &scratch[..frames * channels], 1.0);

            if outcome.is_finished() {
                let id = self.sources[i].id;
                if !self.sources[i].finished {
                    self.sources[i].finished = true;
                    self.notify_finished(id);
                }
                if !self.persist {
                    self.sources.remove(i);
                }
            } else {
                self.sources[i].finished = false;
            }
        }
        scale_in_place(out, self.core.volume());
        ReadOutcome::active(n / channels)
    }

    /// A nested bus takes its parent's rate and passes it down.
    fn set_output_rate(&mut self, rate: u32) {
        self.format.sample_rate = rate.max(1);
        for e in &self.sources {
            e.source.lock().set_output_rate(self.format.sample_rate);
        }
    }

    fn core(&self) -> &SourceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SourceCore {
        &mut self.core
    }

    fn as_bus(&self) -> Option<&Bus> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{shared, BufferSource, SilentSource};

    fn fmt() -> AudioFormat {
        AudioFormat::stereo(48_000)
    }

    #[test]
    fn sums_children_and_applies_bus_volume() {
        let bus = Bus::shared("music");
        let a: SharedSource = shared(BufferSource::constant(fmt(), 0.25, 64));
        let b: SharedSource = shared(BufferSource::constant(fmt(), 0.5, 64));
        Bus::add_source(&bus, a).unwrap();
        Bus::add_source(&bus, b).unwrap();
        bus.lock().set_volume(0.5);
        let mut out = vec![0.0_f32; 2 * 32];
        let outcome = bus.lock().read(&mut out);
        assert_eq!(outcome, ReadOutcome::active(32));
        assert!(out.iter().all(|s| (*s - 0.375).abs() < 1e-6));
    }

    #[test]
    fn finished_sources_fire_once_and_leave_silence() {
        let bus = Bus::shared("sfx");
        let events = bus.lock().events();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let s: SharedSource = shared(SilentSource::new(fmt(), 0));
            ids.push(SourceId::of(&s));
            Bus::add_source(&bus, s).unwrap();
        }
        let mut out = vec![1.0_f32; 2 * 128];
        assert_eq!(bus.lock().read(&mut out).frames, 128);
        assert!(out.iter().all(|s| *s == 0.0));
        assert!(bus.lock().is_empty());

        bus.lock().read(&mut out);
        let got: Vec<SourceId> = events
            .try_iter()
            .map(|BusEvent::SourceFinished { source, .. }| source)
            .collect();
        assert_eq!(got.len(), 3);
        for id in ids {
            assert!(got.contains(&id));
        }
    }

    #[test]
    fn persisted_sources_stay_and_fire_once() {
        let bus = Bus::shared("persist");
        bus.lock().set_persist_sources(true);
        let events = bus.lock().events();
        let s: SharedSource = shared(SilentSource::new(fmt(), 0));
        Bus::add_source(&bus, s.clone()).unwrap();
        let mut out = vec![0.0_f32; 16];
        for _ in 0..4 {
            bus.lock().read(&mut out);
        }
        assert!(bus.lock().contains(&s));
        assert_eq!(events.try_iter().count(), 1);
    }

    #[test]
    fn short_sources_are_zero_padded() {
        let bus = Bus::shared("pad");
        Bus::add_source(&bus, shared(BufferSource::constant(fmt(), 0.5, 3))).unwrap();
        let mut out = vec![9.0_f32; 2 * 8];
        bus.lock().read(&mut out);
        assert!(out[..6].iter().all(|s| *s == 0.5));
        assert!(out[6..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn moving_a_source_detaches_it_first() {
        let a = Bus::shared("a");
        let b = Bus::shared("b");
        let s: SharedSource = shared(SilentSource::endless(fmt()));
        Bus::add_source(&a, s.clone()).unwrap();
        Bus::add_source(&a, s.clone()).unwrap();
        assert_eq!(a.lock().len(), 1);
        Bus::add_source(&b, s.clone()).unwrap();
        assert!(a.lock().is_empty());
        assert!(b.lock().contains(&s));
        let owner = s.lock().core().channel().unwrap();
        assert!(Arc::ptr_eq(&owner, &b));

        assert!(Bus::remove_source(&b, &s));
        assert!(!Bus::remove_source(&b, &s));
        assert!(s.lock().core().channel().is_none());
    }

    #[test]
    fn cycles_are_rejected() {
        let a = Bus::shared("a");
        let b = Bus::shared("b");
        let a_src: SharedSource = a.clone();
        let b_src: SharedSource = b.clone();
        assert!(matches!(Bus::add_source(&a, a_src.clone()), Err(EngineError::BusCycle)));
        Bus::add_source(&a, b_src).unwrap();
        assert!(matches!(Bus::add_source(&b, a_src), Err(EngineError::BusCycle)));
    }

    #[test]
    fn sources_follow_the_bus_rate() {
        let outer = Arc::new(Mutex::new(Bus::with_capacity("outer", AudioFormat::stereo(44_100), 64, 4)));
        let inner = Bus::shared("inner");
        let dec = crate::decoder::MemoryDecoder::from_interleaved(22_050, vec![0.0; 2 * 16]);
        let track = shared(crate::track::Track::from_decoder(Box::new(dec)));
        Bus::add_source(&inner, track.clone()).unwrap();
        assert_eq!(track.lock().output_rate(), inner.lock().format().sample_rate);

        let inner_src: SharedSource = inner.clone();
        Bus::add_source(&outer, inner_src).unwrap();
        assert_eq!(inner.lock().format().sample_rate, 44_100);
        assert_eq!(track.lock().output_rate(), 44_100);
        assert_eq!(track.lock().step(), 0.5);
    }
}
