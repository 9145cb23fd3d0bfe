// DmaSim - DMA Engine Verification Model
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::descriptor::{BusGeometry, StartError, TransferDescriptor, ValidatedDescriptor};
use dmasim_config::Direction;
use serde::Serialize;

/// One INCR burst: a single address phase followed by `beat_count` beats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BurstTransaction {
    /// Position in issue order across both directions.
    pub seq: u32,
    /// Burst index within `direction`.
    pub index: u32,
    pub direction: Direction,
    pub address: u64,
    pub beat_count: u32,
    pub beat_bytes: u32,
}

impl BurstTransaction {
    pub fn bytes(&self) -> u64 {
        self.beat_count as u64 * self.beat_bytes as u64
    }

    pub fn beat_address(&self, beat: u32) -> u64 {
        self.address + beat as u64 * self.beat_bytes as u64
    }

    pub fn end(&self) -> u64 {
        self.address + self.bytes()
    }
}

/// Lazily splits a validated descriptor into read/write burst pairs.
///
/// Each chunk yields its read burst (from the source) followed by the
/// matching write burst (to the destination). Chunks are bounded by
/// `max_burst_beats`, the remaining length and, when configured, the
/// next boundary on either side.
#[derive(Debug, Clone)]
pub struct BurstGenerator {
    desc: TransferDescriptor,
    geometry: BusGeometry,
    offset: u64,
    chunk: u32,
    pending_write: Option<BurstTransaction>,
}

impl BurstGenerator {
    pub fn new(validated: ValidatedDescriptor) -> Self {
        Self {
            desc: validated.descriptor(),
            geometry: *validated.geometry(),
            offset: 0,
            chunk: 0,
            pending_write: None,
        }
    }

    /// Validate and build in one go. Fails before any burst exists.
    pub fn plan(desc: TransferDescriptor, geometry: &BusGeometry) -> Result<Self, StartError> {
        Ok(Self::new(desc.validate(geometry)?))
    }

    fn chunk_beats(&self) -> u32 {
        let beat = self.geometry.beat_bytes as u64;
        let remaining = (self.desc.length - self.offset) / beat;
        let mut beats = remaining.min(self.geometry.max_burst_beats as u64);

        if let Some(boundary) = self.geometry.boundary {
            for addr in [self.desc.src + self.offset, self.desc.dst + self.offset] {
                let to_boundary = (boundary - addr % boundary) / beat;
                beats = beats.min(to_boundary);
            }
        }

        beats as u32
    }
}

impl Iterator for BurstGenerator {
    type Item = BurstTransaction;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(write) = self.pending_write.take() {
            return Some(write);
        }
        if self.offset >= self.desc.length {
            return None;
        }

        let beat_count = self.chunk_beats();
        let read = BurstTransaction {
            seq: self.chunk * 2,
            index: self.chunk,
            direction: Direction::Read,
            address: self.desc.src + self.offset,
            beat_count,
            beat_bytes: self.geometry.beat_bytes,
        };
        self.pending_write = Some(BurstTransaction {
            seq: self.chunk * 2 + 1,
            direction: Direction::Write,
            address: self.desc.dst + self.offset,
            ..read
        });

        self.offset += read.bytes();
        self.chunk += 1;
        Some(read)
    }
}

impl std::iter::FusedIterator for BurstGenerator {}

/// Full burst list for a descriptor, e.g. for planning output.
pub fn split(
    desc: TransferDescriptor,
    geometry: &BusGeometry,
) -> Result<Vec<BurstTransaction>, StartError> {
    Ok(BurstGenerator::plan(desc, geometry)?.collect())
}
