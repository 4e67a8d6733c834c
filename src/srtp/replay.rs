//! Packet-index replay protection
//!
//! A fixed-size bitmap anchored at the highest index ever accepted. Bit `k`
//! set means index `anchor - k` has been accepted. `check` classifies an
//! index without mutating state; `commit` records it, and must only be
//! called after the packet has also passed authentication.

/// Replay window size in packets
pub const REPLAY_WINDOW_SIZE: u64 = 1024;

const WORDS: usize = (REPLAY_WINDOW_SIZE / 64) as usize;

/// Outcome of a replay check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayCheck {
    /// Index is new and inside (or ahead of) the window
    Accept,

    /// Index fell behind the window
    TooOld,

    /// Index was already accepted
    AlreadyReceived,
}

/// Sliding replay window over 48-bit packet indices
#[derive(Debug, Clone)]
pub struct ReplayWindow {
    /// Highest index ever accepted; bit 0 of the bitmap
    anchor: u64,

    /// Rolling bitmap, bit k = index (anchor - k)
    bitmap: [u64; WORDS],
}

impl ReplayWindow {
    pub fn new() -> Self {
        Self {
            anchor: 0,
            bitmap: [0; WORDS],
        }
    }

    /// Highest index ever accepted
    pub fn anchor(&self) -> u64 {
        self.anchor
    }

    fn bit(&self, k: u64) -> bool {
        let word = (k / 64) as usize;
        let bit = k % 64;
        (self.bitmap[word] >> bit) & 1 == 1
    }

    fn set_bit(&mut self, k: u64) {
        let word = (k / 64) as usize;
        let bit = k % 64;
        self.bitmap[word] |= 1 << bit;
    }

    fn shift(&mut self, by: u64) {
        if by >= REPLAY_WINDOW_SIZE {
            self.bitmap = [0; WORDS];
            return;
        }
        let word_shift = (by / 64) as usize;
        let bit_shift = (by % 64) as u32;
        for i in (0..WORDS).rev() {
            let mut v = 0u64;
            if i >= word_shift {
                v = self.bitmap[i - word_shift] << bit_shift;
                if bit_shift > 0 && i > word_shift {
                    v |= self.bitmap[i - word_shift - 1] >> (64 - bit_shift);
                }
            }
            self.bitmap[i] = v;
        }
    }

    /// Classify `index` against the window without mutating state
    pub fn check(&self, index: u64) -> ReplayCheck {
        if index > self.anchor {
            return ReplayCheck::Accept;
        }
        let behind = self.anchor - index;
        if behind >= REPLAY_WINDOW_SIZE {
            return ReplayCheck::TooOld;
        }
        if self.bit(behind) {
            return ReplayCheck::AlreadyReceived;
        }
        ReplayCheck::Accept
    }

    /// Record `index` as accepted. Advances the anchor when the index is a
    /// new high-water mark.
    pub fn commit(&mut self, index: u64) {
        if index > self.anchor {
            let advance = index - self.anchor;
            self.shift(advance);
            self.anchor = index;
            self.set_bit(0);
        } else {
            let behind = self.anchor - index;
            if behind < REPLAY_WINDOW_SIZE {
                self.set_bit(behind);
            }
        }
    }
}

impl Default for ReplayWindow {
    fn default() -> Self {
        Self::new()
    }
}
