// DmaSim - DMA Engine Verification Model
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::engine::DmaEngine;
use crate::status::StatusFlags;
use crate::{SimResult, SimulationError};

pub const CTRL: u64 = 0x00;
pub const STATUS: u64 = 0x04;
pub const SRC: u64 = 0x08;
pub const DST: u64 = 0x0C;
pub const LEN: u64 = 0x10;
pub const ERRCODE: u64 = 0x14;

/// Size of the register window in bytes.
pub const REGISTER_WINDOW: u64 = 0x20;

pub const CTRL_START: u32 = 1 << 0;
pub const CTRL_IRQ_EN: u32 = 1 << 1;

/// Byte-addressed host view of a register block.
pub trait RegisterBlock {
    fn read(&self, offset: u64) -> SimResult<u8>;
    fn write(&mut self, offset: u64, value: u8) -> SimResult<()>;

    /// Little-endian 32-bit read as four byte-lane reads.
    fn read_u32(&self, offset: u64) -> SimResult<u32> {
        let mut value = 0u32;
        for lane in 0..4 {
            value |= (self.read(offset + lane)? as u32) << (lane * 8);
        }
        Ok(value)
    }

    fn write_u32(&mut self, offset: u64, value: u32) -> SimResult<()> {
        for lane in 0..4 {
            self.write(offset + lane, (value >> (lane * 8)) as u8)?;
        }
        Ok(())
    }
}

impl DmaEngine {
    fn read_reg(&self, offset: u64) -> u32 {
        match offset {
            CTRL => {
                if self.status().irq_enable() {
                    CTRL_IRQ_EN
                } else {
                    0
                }
            }
            STATUS => self.status().flags(self.busy()).bits(),
            SRC => self.descriptor().src as u32,
            DST => self.descriptor().dst as u32,
            LEN => self.descriptor().length as u32,
            ERRCODE => self.status().error().map_or(0, |e| e.code() as u32),
            _ => 0,
        }
    }

    fn write_reg(&mut self, offset: u64, value: u32) {
        match offset {
            CTRL => {
                self.set_irq_enable(value & CTRL_IRQ_EN != 0);
                if value & CTRL_START != 0 {
                    if let Err(e) = self.request_start() {
                        tracing::debug!("CTRL.START ignored: {}", e);
                    }
                }
            }
            STATUS => {
                self.clear_status(StatusFlags::from_bits_truncate(value));
            }
            SRC => self.set_source(value as u64),
            DST => self.set_destination(value as u64),
            LEN => self.set_length(value as u64),
            _ => tracing::warn!(
                "Ignoring write of {:#x} to read-only or unmapped DMA register {:#x}",
                value,
                offset
            ),
        }
    }
}

impl RegisterBlock for DmaEngine {
    fn read(&self, offset: u64) -> SimResult<u8> {
        if offset >= REGISTER_WINDOW {
            return Err(SimulationError::RegisterAccess(offset));
        }
        let reg_offset = offset & !3;
        let byte_offset = (offset % 4) as u32;
        let reg_val = self.read_reg(reg_offset);
        Ok(((reg_val >> (byte_offset * 8)) & 0xFF) as u8)
    }

    fn write(&mut self, offset: u64, value: u8) -> SimResult<()> {
        if offset >= REGISTER_WINDOW {
            return Err(SimulationError::RegisterAccess(offset));
        }
        let reg_offset = offset & !3;
        let byte_offset = (offset % 4) as u32;
        let lane = (value as u32) << (byte_offset * 8);
        let reg_val = match reg_offset {
            // RW1C: other lanes must not be written back as ones.
            STATUS => lane,
            _ => {
                let mask = 0xFF << (byte_offset * 8);
                (self.read_reg(reg_offset) & !mask) | lane
            }
        };
        self.write_reg(reg_offset, reg_val);
        Ok(())
    }
}
