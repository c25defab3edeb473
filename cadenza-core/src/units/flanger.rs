//! Flanger: a short modulated delay summed with the dry signal.
//!
//! Delay times are given in samples at 44.1 kHz (rescaled to the running
//! rate). The circular buffer holds `2 * max_delay` frames; the read offset
//! follows a triangle between `min` and `max` over one period and is read with
//! linear interpolation so the sweep is smooth.

use alloc::vec::Vec;

use super::Dsp;
use crate::clock::Cycle;
use crate::dsp::{blend, clamp01, lerp, m_floor, seconds_to_samples, triangle01, CHANNELS, REFERENCE_RATE};

#[derive(Clone, Debug)]
pub struct Flanger {
    sr: f32,
    mix: f32,
    min_delay: f32,
    max_delay: f32,
    /// Interleaved circular buffer, `frames * CHANNELS` long.
    buffer: Vec<f32>,
    frames: usize,
    write: usize,
    cycle: Cycle,
}

impl Flanger {
    pub fn new(sr: f32) -> Self {
        let mut s = Self {
            sr: sr.max(1.0),
            mix: 1.0,
            min_delay: 0.0,
            max_delay: 0.0,
            buffer: Vec::new(),
            frames: 0,
            write: 0,
            cycle: Cycle::new(1),
        };
        s.set_delay_range(10.0, 40.0);
        s.set_period(2.0);
        s
    }

    /// Delay range in samples at 44.1 kHz. `min > max` is swapped.
    pub fn set_delay_range(&mut self, min: f32, max: f32) {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        let scale = self.sr / REFERENCE_RATE;
        self.min_delay = lo.max(0.0) * scale;
        self.max_delay = hi.max(0.0) * scale;

        let frames = Self::frames_for(self.max_delay);
        if self.buffer.len() < frames * CHANNELS {
            self.buffer.resize(frames * CHANNELS, 0.0);
        }
        if frames > self.frames {
            // Frames past the old ring end hold stale audio.
            self.buffer[self.frames * CHANNELS..frames * CHANNELS].fill(0.0);
        }
        self.frames = frames;
        if self.write >= self.frames {
            self.write = 0;
        }
    }

    /// Size the ring for a max delay up to `max` (samples at 44.1 kHz).
    pub fn reserve_delay(&mut self, max: f32) {
        let frames = Self::frames_for(max.max(0.0) * self.sr / REFERENCE_RATE);
        if self.buffer.len() < frames * CHANNELS {
            self.buffer.resize(frames * CHANNELS, 0.0);
        }
    }

    #[inline] pub fn capacity(&self) -> usize { self.buffer.len() / CHANNELS }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn frames_for(max_delay: f32) -> usize {
        ((max_delay * 2.0) as usize).max(2)
    }

    /// Sweep period in seconds.
    pub fn set_period(&mut self, seconds: f32) {
        self.cycle.set_length(seconds_to_samples(seconds, self.sr));
    }

    #[inline] pub fn delay_range(&self) -> (f32, f32) { (self.min_delay, self.max_delay) }

    /// Current delay in samples at the running rate.
    #[inline]
    pub fn current_delay(&self) -> f32 {
        lerp(self.min_delay, self.max_delay, triangle01(self.cycle.phase()))
    }

    #[inline]
    fn read(&self, ch: usize, delay: f32) -> f32 {
        #[allow(clippy::cast_precision_loss)]
        let len = self.frames as f32;
        #[allow(clippy::cast_precision_loss)]
        let mut pos = self.write as f32 - delay;
        if pos < 0.0 {
            pos += len;
        }
        let base = m_floor(pos);
        let frac = pos - base;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let i0 = (base as usize) % self.frames;
        let i1 = (i0 + 1) % self.frames;
        lerp(self.buffer[i0 * CHANNELS + ch], self.buffer[i1 * CHANNELS + ch], frac)
    }
}

impl Dsp for Flanger {
    fn process(&mut self, buf: &mut [f32]) {
        #[allow(clippy::cast_precision_loss)]
        let max_readable = (self.frames - 1) as f32;
        for frame in buf.chunks_exact_mut(CHANNELS) {
            let delay = self.current_delay().min(max_readable);
            let base = self.write * CHANNELS;
            self.buffer[base..base + CHANNELS].copy_from_slice(frame);
            for (ch, s) in frame.iter_mut().enumerate() {
                let dry = *s;
                let wet = 0.5 * (dry + self.read(ch, delay));
                *s = blend(dry, wet, self.mix);
            }
            self.write += 1;
            if self.write >= self.frames {
                self.write = 0;
            }
            self.cycle.tick();
        }
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write = 0;
        self.cycle.reset();
    }

    #[inline] fn mix(&self) -> f32 { self.mix }
    #[inline] fn set_mix(&mut self, mix: f32) { self.mix = clamp01(mix); }
    #[inline] fn sample_rate(&self) -> f32 { self.sr }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn delay_sweeps_between_bounds() {
        let mut fl = Flanger::new(44_100.0);
        fl.set_delay_range(20.0, 60.0);
        fl.set_period(0.01);
        let mut lo = f32::MAX;
        let mut hi = f32::MIN;
        let mut buf = vec![0.0_f32; 2];
        for _ in 0..441 {
            let d = fl.current_delay();
            lo = lo.min(d);
            hi = hi.max(d);
            fl.process(&mut buf);
        }
        assert!(lo >= 20.0 - 1e-3 && lo < 21.0, "lo={lo}");
        assert!(hi <= 60.0 + 1e-3 && hi > 59.0, "hi={hi}");
    }

    #[test]
    fn impulse_reappears_after_the_delay() {
        let mut fl = Flanger::new(44_100.0);
        fl.set_delay_range(30.0, 30.0);
        let mut buf = vec![0.0_f32; 2 * 64];
        buf[0] = 1.0;
        buf[1] = 1.0;
        fl.process(&mut buf);
        assert!((buf[0] - 0.5).abs() < 1e-6, "dry half at t=0: {}", buf[0]);
        assert!((buf[60] - 0.5).abs() < 1e-6, "echo at 30 frames: {}", buf[60]);
        assert!(buf[58].abs() < 1e-6);
    }

    #[test]
    fn range_is_rescaled_to_running_rate() {
        let mut fl = Flanger::new(88_200.0);
        fl.set_delay_range(40.0, 10.0);
        let (lo, hi) = fl.delay_range();
        assert!((lo - 20.0).abs() < 1e-4 && (hi - 80.0).abs() < 1e-4);
    }

    #[test]
    fn reserved_ring_absorbs_delay_changes() {
        let mut fl = Flanger::new(44_100.0);
        fl.reserve_delay(200.0);
        assert_eq!(fl.capacity(), 400);
        let ptr = fl.buffer.as_ptr();
        fl.set_delay_range(5.0, 200.0);
        fl.set_delay_range(1.0, 3.0);
        fl.set_delay_range(10.0, 150.0);
        assert_eq!(fl.buffer.as_ptr(), ptr);
        assert_eq!(fl.frames, 300);
    }

    #[test]
    fn growing_the_ring_clears_stale_frames() {
        let mut fl = Flanger::new(44_100.0);
        fl.set_delay_range(40.0, 40.0);
        let mut buf = vec![1.0_f32; 2 * 80];
        fl.process(&mut buf);
        fl.set_delay_range(2.0, 2.0);
        fl.set_delay_range(40.0, 40.0);
        assert!(fl.buffer[4 * 2..].iter().all(|s| *s == 0.0));
    }
}
