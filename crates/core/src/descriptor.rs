// DmaSim - DMA Engine Verification Model
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use dmasim_config::{EngineConfig, ErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed bus parameters the engine was built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BusGeometry {
    pub beat_bytes: u32,
    pub max_burst_beats: u32,
    pub window_base: u64,
    pub window_size: u64,
    /// Power-of-two address boundary no burst may cross.
    pub boundary: Option<u64>,
}

impl Default for BusGeometry {
    fn default() -> Self {
        Self {
            beat_bytes: 4,
            max_burst_beats: 16,
            window_base: 0,
            window_size: 64 * 1024,
            boundary: None,
        }
    }
}

impl BusGeometry {
    pub fn from_config(config: &EngineConfig) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self {
            beat_bytes: config.beat_bytes,
            max_burst_beats: config.max_burst_beats,
            window_base: config.window.base,
            window_size: config.window_size()?,
            boundary: config.boundary_bytes()?,
        })
    }

    pub fn window_end(&self) -> u64 {
        self.window_base + self.window_size
    }

    fn contains(&self, start: u64, length: u64) -> bool {
        match start.checked_add(length) {
            Some(end) => start >= self.window_base && end <= self.window_end(),
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddrField {
    Source,
    Destination,
    Length,
}

impl fmt::Display for AddrField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AddrField::Source => "source",
            AddrField::Destination => "destination",
            AddrField::Length => "length",
        };
        f.write_str(name)
    }
}

/// Start-time validation failures. None of these ever reach the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StartError {
    #[error("transfer length is zero")]
    ZeroLength,
    #[error("{field} {value:#x} is not a multiple of the {beat_bytes}-byte beat")]
    Misaligned {
        field: AddrField,
        value: u64,
        beat_bytes: u32,
    },
    #[error("{field} range at {start:#x} (+{length:#x}) is outside the addressable window")]
    OutOfRange {
        field: AddrField,
        start: u64,
        length: u64,
    },
    #[error("source {src:#x} and destination {dst:#x} overlap over {length:#x} bytes")]
    Overlap { src: u64, dst: u64, length: u64 },
}

impl StartError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StartError::ZeroLength => ErrorKind::ZeroLength,
            StartError::Misaligned { .. } => ErrorKind::Misaligned,
            StartError::OutOfRange { .. } => ErrorKind::OutOfRange,
            StartError::Overlap { .. } => ErrorKind::Overlap,
        }
    }
}

/// Raw descriptor as programmed through SRC/DST/LEN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransferDescriptor {
    pub src: u64,
    pub dst: u64,
    pub length: u64,
}

impl TransferDescriptor {
    pub fn new(src: u64, dst: u64, length: u64) -> Self {
        Self { src, dst, length }
    }

    pub fn validate(self, geometry: &BusGeometry) -> Result<ValidatedDescriptor, StartError> {
        if self.length == 0 {
            return Err(StartError::ZeroLength);
        }

        let beat = geometry.beat_bytes as u64;
        for (field, value) in [
            (AddrField::Source, self.src),
            (AddrField::Destination, self.dst),
            (AddrField::Length, self.length),
        ] {
            if value % beat != 0 {
                return Err(StartError::Misaligned {
                    field,
                    value,
                    beat_bytes: geometry.beat_bytes,
                });
            }
        }

        for (field, start) in [
            (AddrField::Source, self.src),
            (AddrField::Destination, self.dst),
        ] {
            if !geometry.contains(start, self.length) {
                return Err(StartError::OutOfRange {
                    field,
                    start,
                    length: self.length,
                });
            }
        }

        // Both ranges fit in the window, so the sums below cannot overflow.
        if self.src < self.dst + self.length && self.dst < self.src + self.length {
            return Err(StartError::Overlap {
                src: self.src,
                dst: self.dst,
                length: self.length,
            });
        }

        Ok(ValidatedDescriptor {
            desc: self,
            geometry: *geometry,
        })
    }
}

/// A descriptor that passed validation against a specific geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedDescriptor {
    desc: TransferDescriptor,
    geometry: BusGeometry,
}

impl ValidatedDescriptor {
    pub fn descriptor(&self) -> TransferDescriptor {
        self.desc
    }

    pub fn geometry(&self) -> &BusGeometry {
        &self.geometry
    }
}
