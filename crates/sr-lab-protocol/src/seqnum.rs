//! Modular sequence-number arithmetic for a window over a finite sequence space.
//!
//! ```text
//!   base                 base + window - 1
//!    │                          │
//! ───┼──────────────────────────┼────────────▶ seq (mod size)
//!    │ <──── window slots ────▶ │
//! ```
//!
//! A sequence number maps to slot `(seq - base) mod size`; the mapping is only
//! meaningful while [`SeqSpace::contains`] holds.

use sr_lab_abstract::ProtocolConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqSpace {
    window: usize,
    size: i32,
}

impl SeqSpace {
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            window: config.window_size,
            size: config.seq_space,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn size(&self) -> i32 {
        self.size
    }

    pub fn is_valid(&self, seq: i32) -> bool {
        (0..self.size).contains(&seq)
    }

    /// Distance from `base` forward to `seq`, wrapping at the space size.
    pub fn offset(&self, base: i32, seq: i32) -> usize {
        (seq - base).rem_euclid(self.size) as usize
    }

    /// True when `seq` lies in `[base, base + window - 1] mod size`.
    pub fn contains(&self, base: i32, seq: i32) -> bool {
        self.is_valid(seq) && self.offset(base, seq) < self.window
    }

    pub fn advance(&self, seq: i32, by: usize) -> i32 {
        (seq + by as i32).rem_euclid(self.size)
    }
}
