//! Track: a decoded, resampled, loopable source.
//!
//! State machine: `Stopped -> Playing (play) -> Stopped (stop)`. While
//! stopped, `read` produces silence for the whole request and a seek is only
//! remembered; it reaches the decoder on the next `play`.
//!
//! Resampling is linear interpolation at a fractional read head advancing
//! `step = speed * source_rate / output_rate` source frames per output frame.
//! Decoded frames wait in `pending`; the head position (`cursor` for the
//! whole frame at `pending[head]`, `phase` for the fraction) is carried
//! across calls, so output does not depend on how callers chunk their reads.
//!
//! With a loop area `[start, end)` the decoder is never read past `end`:
//! reads are split at `end`, the decoder jumps back to `start`, and the
//! cursor wraps by the same rule. Decoding happens in bounded chunks, so even
//! at the highest speeds `pending` stays small.
//!
//! Inside the loop the source repeats every `end - start` frames, so whole
//! laps are skipped without decoding them. Short loops are decoded once when
//! they are set and replayed from memory. If the stream ends inside the loop
//! area, the end of stream becomes the loop end.

use std::path::Path;
use std::time::Duration;

use cadenza_core::dsp::CHANNELS;
use symphonia::core::io::MediaSource;

use crate::decoder::{open_decoder, open_path, SampleDecoder};
use crate::error::{EngineError, EngineResult};
use crate::format::AudioFormat;
use crate::source::{AudioSource, ReadOutcome, SourceCore};

pub const MIN_SPEED: f64 = 0.1;
pub const MAX_SPEED: f64 = 9999.0;

/// Most frames decoded per decoder call.
const FILL_CHUNK: usize = 4096;

/// Loops up to this many frames are kept decoded in memory.
const LOOP_CACHE_FRAMES: u64 = 1 << 16;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
}

pub struct Track {
    core: SourceCore,
    decoder: Box<dyn SampleDecoder>,
    source_rate: u32,
    output_rate: u32,
    state: PlaybackState,
    speed: f64,
    loop_area: Option<(u64, u64)>,
    /// Decoded loop area, when it is short enough to keep.
    loop_cache: Vec<f32>,

    /// Interleaved decoded frames; frames before `head` are already played.
    pending: Vec<f32>,
    head: usize,
    /// Source frame at `pending[head]` (wrapped into the loop area).
    cursor: u64,
    /// Fractional read position relative to `head`.
    phase: f64,
    /// Frame the decoder produces next.
    decoder_pos: u64,
    exhausted: bool,

    /// Seek issued while stopped: (whole frame, fraction).
    deferred: Option<(u64, f64)>,
    /// Exact position reported until audio is produced after a seek.
    anchor: Option<Duration>,
    consumed: u64,
}

impl std::fmt::Debug for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Track")
            .field("state", &self.state)
            .field("speed", &self.speed)
            .field("loop_area", &self.loop_area)
            .field("cursor", &self.cursor)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl Track {
    pub fn from_decoder(decoder: Box<dyn SampleDecoder>) -> Self {
        let source_rate = decoder.format().sample_rate.max(1);
        Self {
            core: SourceCore::default(),
            decoder,
            source_rate,
            output_rate: source_rate,
            state: PlaybackState::Stopped,
            speed: 1.0,
            loop_area: None,
            loop_cache: Vec::new(),
            pending: Vec::with_capacity((FILL_CHUNK + 2) * CHANNELS),
            head: 0,
            cursor: 0,
            phase: 0.0,
            decoder_pos: 0,
            exhausted: false,
            deferred: None,
            anchor: None,
            consumed: 0,
        }
    }

    /// Decode `stream`, choosing the decoder by `extension`.
    pub fn from_stream(extension: &str, stream: Box<dyn MediaSource>) -> EngineResult<Self> {
        let track = Self::from_decoder(open_decoder(extension, stream)?);
        log::info!(
            "track opened ({extension}, {} Hz, {} frames)",
            track.source_rate,
            track.length().map_or_else(|| "?".to_string(), |n| n.to_string())
        );
        Ok(track)
    }

    pub fn open(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let track = Self::from_decoder(open_path(path)?);
        log::info!("track opened: {}", path.display());
        Ok(track)
    }

    // ---- Transport ----

    pub fn play(&mut self) {
        if self.state == PlaybackState::Playing {
            return;
        }
        if let Some((frame, frac)) = self.deferred.take() {
            match self.decoder.seek(frame) {
                Ok(()) => self.reposition(frame, frac),
                Err(e) => {
                    log::warn!("deferred seek to frame {frame} failed, resuming in place: {e}");
                    self.anchor = None;
                }
            }
        }
        self.state = PlaybackState::Playing;
    }

    pub fn stop(&mut self) {
        self.state = PlaybackState::Stopped;
    }

    #[inline] pub fn state(&self) -> PlaybackState { self.state }
    #[inline] pub fn is_playing(&self) -> bool { self.state == PlaybackState::Playing }

    /// Jump to `position`. Past the end clamps to the end.
    pub fn seek(&mut self, position: Duration) -> EngineResult<()> {
        if !self.decoder.can_seek() {
            return Err(EngineError::NotSeekable);
        }
        let fmt = self.source_format();
        let mut target = fmt.duration_to_frames(position);
        let mut anchor = position;
        if let Some(len) = self.length() {
            #[allow(clippy::cast_precision_loss)]
            let len_f = len as f64;
            if target > len_f {
                target = len_f;
                anchor = fmt.frames_to_duration(len_f);
            }
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let frame = target.floor() as u64;
        let frac = target - target.floor();

        match self.state {
            PlaybackState::Stopped => {
                self.deferred = Some((frame, frac));
            }
            PlaybackState::Playing => {
                self.decoder.seek(frame)?;
                self.reposition(frame, frac);
            }
        }
        self.anchor = Some(anchor);
        log::debug!("track seek to {position:?} (frame {frame})");
        Ok(())
    }

    /// Play position. Right after a seek this is exactly the requested time.
    pub fn position(&self) -> Duration {
        if let Some(anchor) = self.anchor {
            return anchor;
        }
        #[allow(clippy::cast_precision_loss)]
        let frames = self.cursor() as f64 + self.phase.fract();
        self.source_format().frames_to_duration(frames)
    }

    /// Whole source frame under the read head.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn cursor(&self) -> u64 {
        self.wrap(self.cursor, self.phase.floor() as u64)
    }

    /// Total frames the read head has advanced over since creation.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn consumed_frames(&self) -> u64 {
        self.consumed + self.phase.floor() as u64
    }

    // ---- Rate ----

    /// Playback speed, clamped to `[0.1, 9999]`. NaN resets to 1.
    pub fn set_speed(&mut self, speed: f64) {
        self.speed = if speed.is_nan() { 1.0 } else { speed.clamp(MIN_SPEED, MAX_SPEED) };
    }

    #[inline] pub fn speed(&self) -> f64 { self.speed }

    /// Rate of the graph this track feeds.
    pub fn set_output_rate(&mut self, rate: u32) {
        self.output_rate = rate.max(1);
    }

    #[inline] pub fn output_rate(&self) -> u32 { self.output_rate }

    /// Source frames advanced per output frame.
    #[inline]
    pub fn step(&self) -> f64 {
        self.speed * f64::from(self.source_rate) / f64::from(self.output_rate)
    }

    // ---- Looping ----

    /// Loop `[start, end)` in source frames. A short loop whose stream ends
    /// before `end` is shortened to the end of stream.
    pub fn set_loop_area(&mut self, start: u64, end: u64) -> EngineResult<()> {
        if !self.decoder.can_seek() {
            return Err(EngineError::NotSeekable);
        }
        if start >= end || self.length().is_some_and(|len| end > len) {
            return Err(EngineError::InvalidLoopArea { start, end });
        }
        let at = self.resume_point();
        let (end, cache) = match self.cache_loop(start, end) {
            Ok(cached) => cached,
            Err(e) => {
                // Caching moved the decoder; put it back under the read head.
                self.resync(at)?;
                return Err(e);
            }
        };
        self.loop_cache = cache;
        self.loop_area = Some((start, end));
        self.resync(at)?;
        log::debug!("track loop area [{start}, {end}), cached: {}", !self.loop_cache.is_empty());
        Ok(())
    }

    pub fn clear_loop_area(&mut self) -> EngineResult<()> {
        if self.loop_area.is_some() {
            let at = self.resume_point();
            self.loop_area = None;
            self.loop_cache.clear();
            self.resync(at)?;
        }
        Ok(())
    }

    #[inline] pub fn loop_area(&self) -> Option<(u64, u64)> { self.loop_area }

    /// Source length in frames, when known.
    #[inline] pub fn length(&self) -> Option<u64> { self.decoder.length() }

    #[inline]
    pub fn source_format(&self) -> AudioFormat {
        AudioFormat::stereo(self.source_rate)
    }

    // ---- Internals ----

    /// Where playback resumes: a pending seek, or the read head.
    fn resume_point(&self) -> (u64, f64) {
        self.deferred.unwrap_or_else(|| (self.cursor(), self.phase.fract()))
    }

    /// Restart decoding at `(frame, frac)` so `pending` matches the current
    /// loop settings. Stopped tracks defer it to `play`.
    fn resync(&mut self, (frame, frac): (u64, f64)) -> EngineResult<()> {
        match self.state {
            PlaybackState::Stopped => self.deferred = Some((frame, frac)),
            PlaybackState::Playing => {
                self.decoder.seek(frame)?;
                self.reposition(frame, frac);
            }
        }
        Ok(())
    }

    /// Decode a short loop area for replay from memory. Returns the loop
    /// end, pulled in to the end of stream when that comes first, and the
    /// decoded frames (empty for long loops).
    fn cache_loop(&mut self, start: u64, end: u64) -> EngineResult<(u64, Vec<f32>)> {
        if end - start > LOOP_CACHE_FRAMES {
            return Ok((end, Vec::new()));
        }
        let frames = usize::try_from(end - start).map_err(|_| EngineError::InvalidLoopArea { start, end })?;
        self.decoder.seek(start)?;
        let mut cache = vec![0.0; frames * CHANNELS];
        let mut got = 0;
        while got < frames {
            let n = self.decoder.read(&mut cache[got * CHANNELS..]);
            if n == 0 {
                break;
            }
            got += n;
        }
        if got == 0 {
            return Err(EngineError::InvalidLoopArea { start, end });
        }
        cache.truncate(got * CHANNELS);
        Ok((start + got as u64, cache))
    }

    fn reposition(&mut self, frame: u64, frac: f64) {
        self.pending.clear();
        self.head = 0;
        self.cursor = frame;
        self.phase = frac;
        self.decoder_pos = frame;
        self.exhausted = false;
    }

    #[inline]
    fn available(&self) -> usize {
        self.pending.len() / CHANNELS - self.head
    }

    /// Drop whole frames the read head has passed.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn advance_head(&mut self) {
        if self.phase < 1.0 {
            return;
        }
        let skip = (self.phase.floor() as u64).min(self.available() as u64);
        if skip == 0 {
            return;
        }
        self.head += skip as usize;
        self.phase -= skip as f64;
        self.consumed += skip;

        self.cursor = self.wrap(self.cursor, skip);
    }

    /// Inside the loop area the frames ahead of the head repeat every lap, so
    /// whole laps of phase are dropped without decoding them.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn skip_laps(&mut self) {
        let Some((start, end)) = self.loop_area else { return };
        if self.cursor < start || self.cursor >= end {
            return;
        }
        let lap = (end - start) as f64;
        if self.phase < lap {
            return;
        }
        let laps = (self.phase / lap).floor();
        self.phase -= laps * lap;
        self.consumed += (laps * lap) as u64;
    }

    /// `from + advance`, wrapped the way the decoder wraps at the loop end.
    fn wrap(&self, from: u64, advance: u64) -> u64 {
        let to = from + advance;
        match self.loop_area {
            Some((start, end)) if from < end && to >= end => start + (to - end) % (end - start),
            _ => to,
        }
    }

    /// Decode one chunk into `pending`. Sets `exhausted` at end of stream.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn fill(&mut self) {
        if self.head > 0 {
            self.pending.drain(..self.head * CHANNELS);
            self.head = 0;
        }
        let have = self.pending.len() / CHANNELS;
        let needed = self.phase.floor() as usize + 2;
        let mut want = needed.saturating_sub(have).clamp(1, FILL_CHUNK);
        if let Some((_, end)) = self.loop_area {
            if self.decoder_pos < end {
                want = want.min(usize::try_from(end - self.decoder_pos).unwrap_or(usize::MAX));
            }
        }

        let got = if let Some(offset) = self.cached_offset() {
            let lap = &self.loop_cache[offset * CHANNELS..];
            let n = want.min(lap.len() / CHANNELS);
            self.pending.extend_from_slice(&lap[..n * CHANNELS]);
            n
        } else {
            let old = self.pending.len();
            self.pending.resize(old + want * CHANNELS, 0.0);
            let got = self.decoder.read(&mut self.pending[old..]);
            self.pending.truncate(old + got * CHANNELS);
            got
        };
        if got == 0 {
            if let Some((start, end)) = self.loop_area {
                if self.decoder_pos > start && self.decoder_pos < end {
                    log::warn!(
                        "stream ended at frame {} inside loop [{start}, {end}), looping there",
                        self.decoder_pos
                    );
                    self.loop_area = Some((start, self.decoder_pos));
                    self.jump_to_loop_start(start);
                    return;
                }
            }
            self.exhausted = true;
            return;
        }

        let before = self.decoder_pos;
        self.decoder_pos += got as u64;
        if let Some((start, end)) = self.loop_area {
            if before < end && self.decoder_pos >= end {
                self.jump_to_loop_start(start);
            }
        }
    }

    /// Offset into `loop_cache` of the next frame to decode, if it is there.
    fn cached_offset(&self) -> Option<usize> {
        let (start, end) = self.loop_area?;
        if self.loop_cache.is_empty() || self.decoder_pos < start || self.decoder_pos >= end {
            return None;
        }
        usize::try_from(self.decoder_pos - start).ok()
    }

    fn jump_to_loop_start(&mut self, start: u64) {
        if !self.loop_cache.is_empty() {
            self.decoder_pos = start;
            return;
        }
        match self.decoder.seek(start) {
            Ok(()) => self.decoder_pos = start,
            Err(e) => {
                log::warn!("loop jump to frame {start} failed, leaving loop: {e}");
                self.loop_area = None;
            }
        }
    }
}

impl AudioSource for Track {
    fn format(&self) -> AudioFormat {
        AudioFormat::stereo(self.output_rate)
    }

    fn read(&mut self, out: &mut [f32]) -> ReadOutcome {
        let n = out.len() / CHANNELS;
        if self.state == PlaybackState::Stopped {
            out.fill(0.0);
            return ReadOutcome::active(n);
        }
        if n == 0 {
            return ReadOutcome::active(0);
        }

        let step = self.step();
        let mut produced = 0;
        while produced < n {
            self.advance_head();
            self.skip_laps();
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let idx = self.phase.floor() as usize;
            if self.available() < idx + 2 && !self.exhausted {
                self.fill();
                continue;
            }
            let avail = self.available();
            if idx >= avail {
                break;
            }
            let i0 = (self.head + idx) * CHANNELS;
            let i1 = (self.head + (idx + 1).min(avail - 1)) * CHANNELS;
            #[allow(clippy::cast_possible_truncation)]
            let frac = (self.phase - self.phase.floor()) as f32;
            let o = produced * CHANNELS;
            for ch in 0..CHANNELS {
                let a = self.pending[i0 + ch];
                let b = self.pending[i1 + ch];
                out[o + ch] = a + (b - a) * frac;
            }
            produced += 1;
            self.phase += step;
        }
        self.advance_head();

        let gain = self.core.volume();
        for s in &mut out[..produced * CHANNELS] {
            *s *= gain;
        }
        out[produced * CHANNELS..].fill(0.0);

        if produced == 0 {
            return ReadOutcome::finished(0);
        }
        self.anchor = None;
        ReadOutcome::active(produced)
    }

    fn seek(&mut self, position: Duration) -> EngineResult<()> {
        Track::seek(self, position)
    }

    fn set_output_rate(&mut self, rate: u32) {
        Track::set_output_rate(self, rate);
    }

    fn core(&self) -> &SourceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SourceCore {
        &mut self.core
    }
}
