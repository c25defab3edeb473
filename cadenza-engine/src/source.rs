//! Pull-based audio sources.
//!
//! Everything the mixer pulls from implements [`AudioSource`]: tracks, effect
//! controllers and buses. Sources are shared between the control thread and
//! the audio callback as [`SharedSource`]; the mutex is the only
//! synchronisation point and is held for one `read` or one control call.
//!
//! Each source scales its own output by its volume, so a bus simply sums
//! what its children return.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::bus::{Bus, BusHandle};
use crate::error::{EngineError, EngineResult};
use crate::format::AudioFormat;

/// A source shared between threads.
pub type SharedSource = Arc<Mutex<dyn AudioSource>>;

/// Wrap a concrete source for the graph.
pub fn shared<S: AudioSource + 'static>(source: S) -> Arc<Mutex<S>> {
    Arc::new(Mutex::new(source))
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SourceStatus {
    Active,
    /// No more audio will come; the owning bus retires the source.
    Finished,
}

/// Result of one `read`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ReadOutcome {
    pub frames: usize,
    pub status: SourceStatus,
}

impl ReadOutcome {
    #[inline]
    pub const fn active(frames: usize) -> Self {
        Self { frames, status: SourceStatus::Active }
    }

    #[inline]
    pub const fn finished(frames: usize) -> Self {
        Self { frames, status: SourceStatus::Finished }
    }

    /// Zero frames count as finished whatever the status says.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.frames == 0 || self.status == SourceStatus::Finished
    }
}

/// Identity of a shared source (address of its allocation).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SourceId(usize);

impl SourceId {
    #[inline]
    pub fn of<T: ?Sized>(source: &Arc<Mutex<T>>) -> Self {
        Self(Arc::as_ptr(source).cast::<()>() as usize)
    }
}

/// State every source carries: volume and the bus it is attached to.
#[derive(Debug)]
pub struct SourceCore {
    volume: f32,
    channel: Option<Weak<Mutex<Bus>>>,
}

impl Default for SourceCore {
    fn default() -> Self {
        Self { volume: 1.0, channel: None }
    }
}

impl SourceCore {
    #[inline] pub fn volume(&self) -> f32 { self.volume }

    /// Clamped to `[0, 1]`; NaN mutes.
    #[inline]
    pub fn set_volume(&mut self, v: f32) {
        self.volume = if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
    }

    /// The bus currently holding this source, if it is still alive.
    pub fn channel(&self) -> Option<BusHandle> {
        self.channel.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn set_channel(&mut self, bus: Option<&BusHandle>) {
        self.channel = bus.map(Arc::downgrade);
    }

    /// Forget the bus only if it is `bus`.
    pub(crate) fn clear_channel_if(&mut self, bus: *const Mutex<Bus>) {
        if self.channel.as_ref().is_some_and(|w| std::ptr::eq(w.as_ptr(), bus)) {
            self.channel = None;
        }
    }
}

pub trait AudioSource: Send {
    /// Output format; graph sources are always stereo.
    fn format(&self) -> AudioFormat;

    /// Fill `out` (interleaved). Must not block for long, allocate in steady
    /// state or panic. Samples past `frames` are silence.
    fn read(&mut self, out: &mut [f32]) -> ReadOutcome;

    fn seek(&mut self, _position: Duration) -> EngineResult<()> {
        Err(EngineError::NotSeekable)
    }

    /// Called before the source joins a bus running at `rate`. Sources
    /// whose output depends on the rate follow it.
    fn set_output_rate(&mut self, _rate: u32) {}

    fn core(&self) -> &SourceCore;
    fn core_mut(&mut self) -> &mut SourceCore;

    fn volume(&self) -> f32 {
        self.core().volume()
    }

    fn set_volume(&mut self, v: f32) {
        self.core_mut().set_volume(v);
    }

    /// Downcast hook used for cycle checks when attaching buses.
    fn as_bus(&self) -> Option<&Bus> {
        None
    }
}

/// Silence for a fixed number of frames (or forever), then finished.
#[derive(Debug)]
pub struct SilentSource {
    core: SourceCore,
    format: AudioFormat,
    remaining: Option<u64>,
}

impl SilentSource {
    pub fn new(format: AudioFormat, frames: u64) -> Self {
        Self { core: SourceCore::default(), format, remaining: Some(frames) }
    }

    pub fn endless(format: AudioFormat) -> Self {
        Self { core: SourceCore::default(), format, remaining: None }
    }
}

impl AudioSource for SilentSource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn read(&mut self, out: &mut [f32]) -> ReadOutcome {
        out.fill(0.0);
        let want = self.format.frames_in(out.len());
        match &mut self.remaining {
            None => ReadOutcome::active(want),
            Some(left) => {
                let n = usize::try_from(*left).map_or(want, |l| l.min(want));
                *left -= n as u64;
                if n == 0 { ReadOutcome::finished(0) } else { ReadOutcome::active(n) }
            }
        }
    }

    fn core(&self) -> &SourceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SourceCore {
        &mut self.core
    }
}

/// Plays a fixed interleaved buffer once at the graph rate.
#[derive(Debug)]
pub struct BufferSource {
    core: SourceCore,
    format: AudioFormat,
    samples: Vec<f32>,
    pos: usize,
}

impl BufferSource {
    pub fn new(format: AudioFormat, samples: Vec<f32>) -> Self {
        Self { core: SourceCore::default(), format, samples, pos: 0 }
    }

    /// `frames` frames of a constant value on every channel.
    pub fn constant(format: AudioFormat, value: f32, frames: usize) -> Self {
        Self::new(format, vec![value; format.samples_for(frames)])
    }
}

impl AudioSource for BufferSource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn read(&mut self, out: &mut [f32]) -> ReadOutcome {
        let want = self.format.samples_for(self.format.frames_in(out.len()));
        let take = want.min(self.samples.len() - self.pos);
        let gain = self.core.volume();
        for (o, s) in out[..take].iter_mut().zip(&self.samples[self.pos..]) {
            *o = *s * gain;
        }
        out[take..].fill(0.0);
        self.pos += take;
        let frames = self.format.frames_in(take);
        if frames == 0 { ReadOutcome::finished(0) } else { ReadOutcome::active(frames) }
    }

    fn seek(&mut self, position: Duration) -> EngineResult<()> {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let frame = self.format.duration_to_frames(position) as usize;
        self.pos = self.format.samples_for(frame).min(self.samples.len());
        Ok(())
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

    #[test]
    fn volume_is_clamped() {
        let mut s = SilentSource::endless(AudioFormat::stereo(48_000));
        s.set_volume(1.7);
        assert_eq!(s.volume(), 1.0);
        s.set_volume(-2.0);
        assert_eq!(s.volume(), 0.0);
        s.set_volume(f32::NAN);
        assert_eq!(s.volume(), 0.0);
    }

    #[test]
    fn silent_source_runs_out() {
        let mut s = SilentSource::new(AudioFormat::stereo(48_000), 5);
        let mut buf = [1.0_f32; 8];
        assert_eq!(s.read(&mut buf), ReadOutcome::active(4));
        assert!(buf.iter().all(|x| *x == 0.0));
        assert_eq!(s.read(&mut buf), ReadOutcome::active(1));
        assert!(s.read(&mut buf).is_finished());
    }

    #[test]
    fn default_seek_is_unsupported() {
        let mut s = SilentSource::endless(AudioFormat::stereo(48_000));
        let err = s.seek(Duration::from_secs(1)).unwrap_err();
        assert!(err.is_unsupported_operation());
    }

    #[test]
    fn ids_follow_the_allocation() {
        let a = shared(SilentSource::endless(AudioFormat::stereo(8_000)));
        let dyn_a: SharedSource = a.clone();
        let b = shared(SilentSource::endless(AudioFormat::stereo(8_000)));
        assert_eq!(SourceId::of(&a), SourceId::of(&dyn_a));
        assert_ne!(SourceId::of(&a), SourceId::of(&b));
    }

    #[test]
    fn buffer_source_applies_volume() {
        let mut s = BufferSource::constant(AudioFormat::stereo(8_000), 0.8, 2);
        s.set_volume(0.5);
        let mut buf = [0.0_f32; 6];
        assert_eq!(s.read(&mut buf).frames, 2);
        assert_eq!(buf, [0.4, 0.4, 0.4, 0.4, 0.0, 0.0]);
    }
}
