//! Sample decoders.
//!
//! A decoder turns an encoded stream into interleaved stereo `f32` frames at
//! its native sample rate. Two implementations:
//!
//! - [`SymphoniaDecoder`]: streaming decode of WAV/FLAC/Ogg Vorbis/MP3 via `symphonia`
//! - [`MemoryDecoder`]: already-decoded samples held in memory
//!
//! [`open_decoder`] selects by file extension and rejects unknown ones before
//! touching the stream.

use std::fs::File;
use std::path::Path;

use cadenza_core::dsp::CHANNELS;
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};

use crate::error::{EngineError, EngineResult};
use crate::format::AudioFormat;

/// Extensions handled by [`SymphoniaDecoder`].
pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["wav", "wave", "flac", "ogg", "oga", "mp3"];

/// A pull-based source of interleaved stereo frames.
pub trait SampleDecoder: Send {
    /// Native rate; `channels` is always 2.
    fn format(&self) -> AudioFormat;

    /// Fill `out` with whole frames. Returns frames written; 0 means end of stream.
    fn read(&mut self, out: &mut [f32]) -> usize;

    /// Jump to an absolute frame.
    fn seek(&mut self, frame: u64) -> EngineResult<()>;

    /// Total frames, when the container declares them.
    fn length(&self) -> Option<u64>;

    fn can_seek(&self) -> bool;
}

/// Normalise an extension (leading dot, case) and check it against the table.
pub fn normalize_extension(ext: &str) -> EngineResult<String> {
    let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
    if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(EngineError::UnsupportedExtension { ext })
    }
}

/// Build a decoder for `stream`, chosen by `extension`.
pub fn open_decoder(extension: &str, stream: Box<dyn MediaSource>) -> EngineResult<Box<dyn SampleDecoder>> {
    let ext = normalize_extension(extension)?;
    let dec = SymphoniaDecoder::open(stream, &ext)?;
    Ok(Box::new(dec))
}

/// Open a file, choosing the decoder by its extension.
pub fn open_path(path: impl AsRef<Path>) -> EngineResult<Box<dyn SampleDecoder>> {
    let path = path.as_ref();
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    let ext = normalize_extension(ext)?;
    let file = File::open(path)?;
    log::debug!("opening {} as {ext}", path.display());
    open_decoder(&ext, Box::new(file))
}

// ---- Memory ----

/// Pre-decoded interleaved stereo samples.
#[derive(Clone, Debug)]
pub struct MemoryDecoder {
    sample_rate: u32,
    samples: Vec<f32>,
    pos: usize,
    seekable: bool,
    declares_length: bool,
}

impl MemoryDecoder {
    /// Interleaved stereo samples; a trailing half frame is dropped.
    pub fn from_interleaved(sample_rate: u32, mut samples: Vec<f32>) -> Self {
        samples.truncate(samples.len() - samples.len() % CHANNELS);
        Self { sample_rate, samples, pos: 0, seekable: true, declares_length: true }
    }

    /// Mono samples, duplicated to both channels.
    pub fn from_mono(sample_rate: u32, samples: &[f32]) -> Self {
        let stereo = samples.iter().flat_map(|s| [*s, *s]).collect();
        Self::from_interleaved(sample_rate, stereo)
    }

    /// Behave like a live stream that cannot seek.
    #[must_use]
    pub fn non_seekable(mut self) -> Self {
        self.seekable = false;
        self
    }

    /// Behave like a stream whose container carries no frame count.
    #[must_use]
    pub fn without_length(mut self) -> Self {
        self.declares_length = false;
        self
    }

    /// Frame the next `read` starts at.
    #[inline] pub fn position(&self) -> u64 { (self.pos / CHANNELS) as u64 }
}

impl SampleDecoder for MemoryDecoder {
    fn format(&self) -> AudioFormat {
        AudioFormat::stereo(self.sample_rate)
    }

    fn read(&mut self, out: &mut [f32]) -> usize {
        let want = out.len() - out.len() % CHANNELS;
        let take = want.min(self.samples.len() - self.pos);
        out[..take].copy_from_slice(&self.samples[self.pos..self.pos + take]);
        self.pos += take;
        take / CHANNELS
    }

    fn seek(&mut self, frame: u64) -> EngineResult<()> {
        if !self.seekable {
            return Err(EngineError::NotSeekable);
        }
        let frame = usize::try_from(frame).unwrap_or(usize::MAX);
        self.pos = frame.saturating_mul(CHANNELS).min(self.samples.len());
        Ok(())
    }

    fn length(&self) -> Option<u64> {
        self.declares_length.then(|| (self.samples.len() / CHANNELS) as u64)
    }

    fn can_seek(&self) -> bool {
        self.seekable
    }
}

// ---- Symphonia ----

/// Streaming decoder over any `symphonia` media source.
///
/// Output is always stereo: mono is duplicated, wider layouts are folded
/// (even channels to the left, odd to the right).
pub struct SymphoniaDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    in_channels: usize,
    sample_rate: u32,
    time_base: Option<TimeBase>,
    n_frames: Option<u64>,
    seekable: bool,
    sample_buf: Option<SampleBuffer<f32>>,
    pending: Vec<f32>,
    /// Frames to discard after an accurate seek landed early.
    skip_frames: u64,
    finished: bool,
}

impl SymphoniaDecoder {
    pub fn open(stream: Box<dyn MediaSource>, extension: &str) -> EngineResult<Self> {
        let seekable = stream.is_seekable();
        let mss = MediaSourceStream::new(stream, MediaSourceStreamOptions::default());

        let mut hint = Hint::new();
        if !extension.is_empty() {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(EngineError::MissingTrack)?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let sample_rate = params.sample_rate.ok_or(EngineError::MissingSampleRate)?;
        let in_channels = params.channels.map_or(0, |c| c.count());
        if in_channels == 0 {
            return Err(EngineError::UnsupportedChannels(0));
        }

        let decoder = symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;

        log::debug!(
            "symphonia: track {track_id}, {sample_rate} Hz, {in_channels} ch, {} frames, seekable={seekable}",
            params.n_frames.map_or_else(|| "?".to_string(), |n| n.to_string())
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            in_channels,
            sample_rate,
            time_base: params.time_base,
            n_frames: params.n_frames,
            seekable,
            sample_buf: None,
            pending: Vec::new(),
            skip_frames: 0,
            finished: false,
        })
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn frame_to_ts(&self, frame: u64) -> u64 {
        match self.time_base {
            Some(tb) => {
                let rate = u64::from(self.sample_rate.max(1));
                let time = Time::new(frame / rate, (frame % rate) as f64 / rate as f64);
                tb.calc_timestamp(time)
            }
            None => frame,
        }
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn ts_to_frames(&self, ts: u64) -> u64 {
        match self.time_base {
            Some(tb) => {
                let t = tb.calc_time(ts);
                let rate = f64::from(self.sample_rate);
                (t.seconds as f64 * rate + t.frac * rate).round() as u64
            }
            None => ts,
        }
    }

    /// Decode the next packet of our track into `pending`. Returns `false` at
    /// end of stream or on an unrecoverable error.
    fn decode_next(&mut self) -> bool {
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return false;
                }
                Err(e) => {
                    log::warn!("symphonia: reading packet failed, ending stream: {e}");
                    return false;
                }
            };
            if packet.track_id() != self.track_id {
                continue;
            }
            match self.decoder.decode(&packet) {
                Ok(audio_buf) => {
                    let spec = SignalSpec::new(audio_buf.spec().rate, audio_buf.spec().channels);
                    let capacity = audio_buf.capacity() as u64;
                    let needs_realloc = self
                        .sample_buf
                        .as_ref()
                        .map_or(true, |buf| buf.capacity() < audio_buf.capacity());
                    if needs_realloc {
                        self.sample_buf = Some(SampleBuffer::<f32>::new(capacity, spec));
                    }
                    let Some(sample_buf) = self.sample_buf.as_mut() else {
                        return false;
                    };
                    sample_buf.copy_interleaved_ref(audio_buf);
                    push_stereo(&mut self.pending, sample_buf.samples(), self.in_channels);
                    return true;
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    log::warn!("symphonia: skipping corrupt packet: {e}");
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                }
                Err(e) => {
                    log::warn!("symphonia: decode failed, ending stream: {e}");
                    return false;
                }
            }
        }
    }
}

impl SampleDecoder for SymphoniaDecoder {
    fn format(&self) -> AudioFormat {
        AudioFormat::stereo(self.sample_rate)
    }

    fn read(&mut self, out: &mut [f32]) -> usize {
        let want = out.len() - out.len() % CHANNELS;
        while !self.finished {
            if self.skip_frames > 0 {
                let pending_frames = self.pending.len() / CHANNELS;
                let drop = usize::try_from(self.skip_frames).map_or(pending_frames, |s| s.min(pending_frames));
                self.pending.drain(..drop * CHANNELS);
                self.skip_frames -= drop as u64;
            }
            if self.skip_frames == 0 && self.pending.len() >= want {
                break;
            }
            if !self.decode_next() {
                self.finished = true;
            }
        }
        let take = want.min(self.pending.len());
        out[..take].copy_from_slice(&self.pending[..take]);
        self.pending.drain(..take);
        take / CHANNELS
    }

    fn seek(&mut self, frame: u64) -> EngineResult<()> {
        if !self.seekable {
            return Err(EngineError::NotSeekable);
        }
        if self.n_frames.is_some_and(|n| frame >= n) {
            self.pending.clear();
            self.skip_frames = 0;
            self.finished = true;
            return Ok(());
        }
        let seeked = self.format.seek(
            SeekMode::Accurate,
            SeekTo::TimeStamp { ts: self.frame_to_ts(frame), track_id: self.track_id },
        )?;
        self.decoder.reset();
        self.pending.clear();
        self.finished = false;
        self.skip_frames = self.ts_to_frames(seeked.required_ts.saturating_sub(seeked.actual_ts));
        log::debug!("symphonia: seek to frame {frame} (skipping {})", self.skip_frames);
        Ok(())
    }

    fn length(&self) -> Option<u64> {
        self.n_frames
    }

    fn can_seek(&self) -> bool {
        self.seekable
    }
}

/// Append decoded samples as clamped stereo frames.
fn push_stereo(out: &mut Vec<f32>, samples: &[f32], in_channels: usize) {
    match in_channels {
        1 => out.extend(samples.iter().flat_map(|s| {
            let s = s.clamp(-1.0, 1.0);
            [s, s]
        })),
        2 => out.extend(samples.iter().map(|s| s.clamp(-1.0, 1.0))),
        n => {
            #[allow(clippy::cast_precision_loss)]
            let (left_n, right_n) = (n.div_ceil(2) as f32, (n / 2) as f32);
            for frame in samples.chunks_exact(n) {
                let (mut l, mut r) = (0.0_f32, 0.0_f32);
                for (ch, s) in frame.iter().enumerate() {
                    if ch % 2 == 0 { l += s } else { r += s }
                }
                out.push((l / left_n).clamp(-1.0, 1.0));
                out.push((r / right_n).clamp(-1.0, 1.0));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn unknown_extensions_fail_before_io() {
        let err = open_decoder("xm", Box::new(Cursor::new(Vec::<u8>::new()))).err();
        assert!(matches!(err, Some(EngineError::UnsupportedExtension { ref ext }) if ext == "xm"));
        let err = open_decoder("", Box::new(Cursor::new(Vec::<u8>::new()))).err();
        assert!(matches!(err, Some(EngineError::UnsupportedExtension { .. })));
        assert_eq!(normalize_extension(".FLAC").ok().as_deref(), Some("flac"));
    }

    #[test]
    fn garbage_with_known_extension_is_a_construction_error() {
        let err = open_decoder("wav", Box::new(Cursor::new(vec![7_u8; 64]))).err();
        assert!(err.is_some_and(|e| e.is_construction()));
    }

    #[test]
    fn memory_decoder_reads_and_seeks_by_frame() {
        let mut dec = MemoryDecoder::from_mono(8_000, &[0.1, 0.2, 0.3, 0.4, 0.5]);
        assert_eq!(dec.length(), Some(5));
        let mut buf = [0.0_f32; 4];
        assert_eq!(dec.read(&mut buf), 2);
        assert_eq!(buf, [0.1, 0.1, 0.2, 0.2]);
        dec.seek(4).unwrap();
        assert_eq!(dec.read(&mut buf), 1);
        assert_eq!(&buf[..2], &[0.5, 0.5]);
        assert_eq!(dec.read(&mut buf), 0);
        dec.seek(100).unwrap();
        assert_eq!(dec.position(), 5);
    }

    #[test]
    fn non_seekable_memory_decoder_refuses() {
        let mut dec = MemoryDecoder::from_interleaved(8_000, vec![0.0; 8]).non_seekable();
        assert!(!dec.can_seek());
        assert!(matches!(dec.seek(1), Err(EngineError::NotSeekable)));
    }

    #[test]
    fn wide_layouts_fold_to_stereo() {
        let mut out = Vec::new();
        push_stereo(&mut out, &[0.2, 0.4, 0.6, 0.8], 4);
        assert!((out[0] - 0.4).abs() < 1e-6 && (out[1] - 0.6).abs() < 1e-6);
        out.clear();
        push_stereo(&mut out, &[2.0, -0.5], 1);
        assert_eq!(out, [1.0, 1.0, -0.5, -0.5]);
    }
}
