// DmaSim - DMA Engine Verification Model
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

/// SplitMix64. Seeded profiles and memory fills must replay bit-exactly
/// from the scenario file, so the sequence is fixed here.
#[derive(Debug, Clone)]
pub struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform value in `min..=max`.
    pub fn range(&mut self, min: u32, max: u32) -> u32 {
        let span = (max - min) as u64 + 1;
        min + (self.next_u64() % span) as u32
    }

    /// True with the given percentage (0..=100).
    pub fn chance(&mut self, percent: u8) -> bool {
        (self.next_u64() % 100) < percent as u64
    }
}
