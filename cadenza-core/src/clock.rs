//! Sample-counting cycle clock shared by the periodic units.
//!
//! The gate, side-chain, flanger, phaser and wobble all divide time into
//! cycles of `length` samples. Counting whole samples (rather than
//! accumulating a float phase like a free-running oscillator) keeps the cycle
//! boundary exact, so a 0.5 s gate at 48 kHz repeats every 24 000 samples no
//! matter how long it runs.


#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Cycle {
    length: usize,
    pos: usize,
}

impl Default for Cycle {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Cycle {
    #[inline]
    pub fn new(length: usize) -> Self {
        Self { length: length.max(1), pos: 0 }
    }

    /// Change the cycle length, keeping the position inside the new cycle.
    #[inline]
    pub fn set_length(&mut self, length: usize) {
        self.length = length.max(1);
        if self.pos >= self.length {
            self.pos %= self.length;
        }
    }

    #[inline] pub fn length(&self) -> usize { self.length }
    #[inline] pub fn position(&self) -> usize { self.pos }
    #[inline] pub fn reset(&mut self) { self.pos = 0; }

    /// Position inside the cycle in `[0, 1)`.
    #[inline]
    #[allow(clippy::cast_precision_loss)]
    pub fn phase(&self) -> f32 {
        self.pos as f32 / self.length as f32
    }

    /// Advance one sample; returns `true` when a new cycle starts.
    #[inline]
    pub fn tick(&mut self) -> bool {
        self.pos += 1;
        if self.pos >= self.length {
            self.pos = 0;
            true
        } else {
            false
        }
    }
}
