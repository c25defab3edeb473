//! Retrigger (beat repeat).
//!
//! Records `length` samples of input, silencing everything past the gated
//! part, then replays that slice `loop_count` more times before recording a
//! fresh one. `loop_count == 0` keeps replaying the first slice forever.

use alloc::vec::Vec;

use super::Dsp;
use crate::dsp::{blend, clamp01, seconds_to_samples, CHANNELS};

#[derive(Clone, Debug)]
pub struct Retrigger {
    sr: f32,
    mix: f32,
    length: usize,
    gating: f32,
    gate_len: usize,
    loop_count: u32,
    /// Completed passes over the slice; 0 while recording.
    passes: u32,
    pos: usize,
    buffer: Vec<f32>,
}

impl Retrigger {
    pub fn new(sr: f32) -> Self {
        let mut s = Self {
            sr: sr.max(1.0),
            mix: 1.0,
            length: 0,
            gating: 1.0,
            gate_len: 0,
            loop_count: 0,
            passes: 0,
            pos: 0,
            buffer: Vec::new(),
        };
        s.set_length(0.125);
        s
    }

    /// Slice duration in seconds. A changed length starts a new recording.
    pub fn set_length(&mut self, seconds: f32) {
        let length = seconds_to_samples(seconds, self.sr);
        if length == self.length {
            return;
        }
        self.length = length;
        if self.buffer.len() < length * CHANNELS {
            self.buffer.resize(length * CHANNELS, 0.0);
        }
        self.recalc_gate();
        self.restart();
    }

    /// Size the slice buffer for lengths up to `seconds`; `set_length`
    /// inside that range then never allocates.
    pub fn reserve_length(&mut self, seconds: f32) {
        let frames = seconds_to_samples(seconds, self.sr);
        if self.buffer.len() < frames * CHANNELS {
            self.buffer.resize(frames * CHANNELS, 0.0);
        }
    }

    /// Frames the slice buffer holds without growing.
    #[inline] pub fn capacity(&self) -> usize { self.buffer.len() / CHANNELS }

    /// Fraction of the slice kept audible, clamped to `[0, 1]`.
    pub fn set_gating(&mut self, gating: f32) {
        self.gating = clamp01(gating);
        self.recalc_gate();
    }

    /// Replays after each recording before re-recording; 0 = never re-record.
    pub fn set_loop_count(&mut self, loops: u32) {
        self.loop_count = loops;
    }

    #[inline] pub fn length(&self) -> usize { self.length }
    #[inline] pub fn is_recording(&self) -> bool { self.passes == 0 }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn recalc_gate(&mut self) {
        self.gate_len = ((self.length as f32 * self.gating) as usize).min(self.length);
    }

    fn restart(&mut self) {
        self.passes = 0;
        self.pos = 0;
    }
}

impl Dsp for Retrigger {
    fn process(&mut self, buf: &mut [f32]) {
        for frame in buf.chunks_exact_mut(CHANNELS) {
            let base = self.pos * CHANNELS;
            let slot = &mut self.buffer[base..base + CHANNELS];
            if self.passes == 0 {
                if self.pos < self.gate_len {
                    slot.copy_from_slice(frame);
                } else {
                    slot.fill(0.0);
                }
            }
            for (s, r) in frame.iter_mut().zip(slot.iter()) {
                *s = blend(*s, *r, self.mix);
            }

            self.pos += 1;
            if self.pos >= self.length {
                self.pos = 0;
                self.passes += 1;
                if self.loop_count > 0 && self.passes > self.loop_count {
                    self.passes = 0;
                }
            }
        }
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.restart();
    }

    #[inline] fn mix(&self) -> f32 { self.mix }
    #[inline] fn set_mix(&mut self, mix: f32) { self.mix = clamp01(mix); }
    #[inline] fn sample_rate(&self) -> f32 { self.sr }
}
