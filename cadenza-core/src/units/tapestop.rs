//! Tape-stop: playback slows linearly to a halt over `length` samples.
//!
//! Incoming audio is recorded while a read head trails behind it at
//! `rate = 1 - elapsed / length`. Once the rate reaches zero the unit only
//! outputs silence (blended by `mix`) until it is reset.

use alloc::vec::Vec;

use super::Dsp;
use crate::dsp::{blend, clamp01, lerp, m_floor, seconds_to_samples, CHANNELS};

#[derive(Clone, Debug)]
pub struct TapeStop {
    sr: f32,
    mix: f32,
    length: usize,
    /// Frames recorded since the last reset.
    current: usize,
    read_pos: f32,
    buffer: Vec<f32>,
}

impl TapeStop {
    pub fn new(sr: f32) -> Self {
        let mut s = Self {
            sr: sr.max(1.0),
            mix: 1.0,
            length: 0,
            current: 0,
            read_pos: 0.0,
            buffer: Vec::new(),
        };
        s.set_length(1.0);
        s
    }

    /// Time to come to a full stop, in seconds.
    pub fn set_length(&mut self, seconds: f32) {
        self.length = seconds_to_samples(seconds, self.sr);
        if self.buffer.len() < self.length * CHANNELS {
            self.buffer.resize(self.length * CHANNELS, 0.0);
        }
    }

    /// Size the record buffer for lengths up to `seconds`.
    pub fn reserve_length(&mut self, seconds: f32) {
        let frames = seconds_to_samples(seconds, self.sr);
        if self.buffer.len() < frames * CHANNELS {
            self.buffer.resize(frames * CHANNELS, 0.0);
        }
    }

    #[inline] pub fn capacity(&self) -> usize { self.buffer.len() / CHANNELS }

    #[inline] pub fn length(&self) -> usize { self.length }

    /// Current playback rate in `[0, 1]`.
    #[inline]
    #[allow(clippy::cast_precision_loss)]
    pub fn rate(&self) -> f32 {
        (1.0 - self.current as f32 / self.length as f32).max(0.0)
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.current >= self.length
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn read(&self, ch: usize) -> f32 {
        let base = m_floor(self.read_pos);
        let frac = self.read_pos - base;
        let i0 = (base as usize).min(self.current);
        let i1 = (i0 + 1).min(self.current);
        lerp(self.buffer[i0 * CHANNELS + ch], self.buffer[i1 * CHANNELS + ch], frac)
    }
}

impl Dsp for TapeStop {
    fn process(&mut self, buf: &mut [f32]) {
        for frame in buf.chunks_exact_mut(CHANNELS) {
            if self.is_stopped() {
                for s in frame.iter_mut() {
                    *s = blend(*s, 0.0, self.mix);
                }
                continue;
            }
            let rate = self.rate();
            let base = self.current * CHANNELS;
            self.buffer[base..base + CHANNELS].copy_from_slice(frame);
            for (ch, s) in frame.iter_mut().enumerate() {
                *s = blend(*s, self.read(ch), self.mix);
            }
            self.read_pos += rate;
            self.current += 1;
        }
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.current = 0;
        self.read_pos = 0.0;
    }

    #[inline] fn mix(&self) -> f32 { self.mix }
    #[inline] fn set_mix(&mut self, mix: f32) { self.mix = clamp01(mix); }
    #[inline] fn sample_rate(&self) -> f32 { self.sr }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn ramp(frames: usize) -> Vec<f32> {
        (0..frames).flat_map(|i| [i as f32, i as f32]).collect()
    }

    #[test]
    fn slows_down_then_goes_silent() {
        let mut ts = TapeStop::new(1000.0);
        ts.set_length(0.1); // 100 frames
        let mut buf = ramp(150);
        ts.process(&mut buf);
        let left: Vec<f32> = buf.iter().step_by(2).copied().collect();

        assert_eq!(left[0], 0.0);
        assert_eq!(left[1], 1.0);
        // the read head falls behind the input
        assert!(left[50] < 50.0);
        // and never runs backwards
        assert!(left[..100].windows(2).all(|w| w[1] >= w[0] - 1e-4));
        assert!(left[100..].iter().all(|s| *s == 0.0));
        assert!(ts.is_stopped());
    }

    #[test]
    fn rate_falls_linearly() {
        let mut ts = TapeStop::new(1000.0);
        ts.set_length(0.1);
        assert_eq!(ts.rate(), 1.0);
        let mut buf = vec![0.0_f32; 2 * 50];
        ts.process(&mut buf);
        assert!((ts.rate() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn reset_starts_over() {
        let mut ts = TapeStop::new(1000.0);
        ts.set_length(0.01);
        let mut buf = vec![0.3_f32; 2 * 20];
        ts.process(&mut buf);
        assert!(ts.is_stopped());
        ts.reset();
        assert!(!ts.is_stopped());
        let mut buf = vec![0.3_f32; 2];
        ts.process(&mut buf);
        assert!((buf[0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn reserved_buffer_absorbs_length_changes() {
        let mut ts = TapeStop::new(1000.0);
        ts.reserve_length(4.0);
        let ptr = ts.buffer.as_ptr();
        ts.set_length(0.5);
        ts.set_length(4.0);
        assert_eq!(ts.buffer.as_ptr(), ptr);
        assert_eq!(ts.capacity(), 4000);
    }
}
