// DmaSim - DMA Engine Verification Model
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::prng::SplitMix64;
use dmasim_config::{MemoryConfig, MemoryFill, MemorySegment};
use serde::Serialize;

/// A simple flat memory storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearMemory {
    pub data: Vec<u8>,
    pub base_addr: u64,
}

impl LinearMemory {
    pub fn new(size: usize, base_addr: u64) -> Self {
        Self {
            data: vec![0; size],
            base_addr,
        }
    }

    /// Build the initial image for a scenario.
    pub fn from_config(size: usize, base_addr: u64, config: &MemoryConfig) -> Self {
        let mut mem = Self::new(size, base_addr);
        mem.fill(&config.fill);
        for segment in &config.segments {
            if !mem.load_from_segment(segment) {
                tracing::warn!(
                    "Segment at {:#x} (+{} bytes) is outside of memory",
                    segment.base,
                    segment.bytes.len()
                );
            }
        }
        mem
    }

    pub fn end_addr(&self) -> u64 {
        self.base_addr + self.data.len() as u64
    }

    fn offset_of(&self, addr: u64, len: usize) -> Option<usize> {
        let end = addr.checked_add(len as u64)?;
        if addr >= self.base_addr && end <= self.end_addr() {
            Some((addr - self.base_addr) as usize)
        } else {
            None
        }
    }

    pub fn read_u8(&self, addr: u64) -> Option<u8> {
        self.offset_of(addr, 1).map(|off| self.data[off])
    }

    pub fn write_u8(&mut self, addr: u64, value: u8) -> bool {
        match self.offset_of(addr, 1) {
            Some(off) => {
                self.data[off] = value;
                true
            }
            None => false,
        }
    }

    pub fn read_slice(&self, addr: u64, len: usize) -> Option<&[u8]> {
        self.offset_of(addr, len).map(|off| &self.data[off..off + len])
    }

    pub fn write_slice(&mut self, addr: u64, bytes: &[u8]) -> bool {
        match self.offset_of(addr, bytes.len()) {
            Some(off) => {
                self.data[off..off + bytes.len()].copy_from_slice(bytes);
                true
            }
            None => false,
        }
    }

    /// Little-endian read of 1, 2, 4 or 8 bytes.
    pub fn read_le(&self, addr: u64, width: u8) -> Option<u64> {
        let bytes = self.read_slice(addr, width as usize)?;
        Some(
            bytes
                .iter()
                .rev()
                .fold(0u64, |acc, &b| (acc << 8) | b as u64),
        )
    }

    pub fn fill(&mut self, fill: &MemoryFill) {
        match fill {
            MemoryFill::Zero => self.data.fill(0),
            MemoryFill::Incrementing => {
                let base = self.base_addr;
                for (i, byte) in self.data.iter_mut().enumerate() {
                    *byte = (base.wrapping_add(i as u64) & 0xFF) as u8;
                }
            }
            MemoryFill::Seeded { seed } => {
                let mut rng = SplitMix64::new(*seed);
                for chunk in self.data.chunks_mut(8) {
                    let word = rng.next_u64().to_le_bytes();
                    chunk.copy_from_slice(&word[..chunk.len()]);
                }
            }
        }
    }

    pub fn load_from_segment(&mut self, segment: &MemorySegment) -> bool {
        self.write_slice(segment.base, &segment.bytes)
    }
}

/// One byte committed to the actual image by an OKAY write beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WriteRecord {
    pub address: u64,
    pub value: u8,
    /// Issue-order sequence number of the write burst.
    pub seq: u32,
}
