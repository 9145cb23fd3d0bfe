// DmaSim - DMA Engine Verification Model
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use bitflags::bitflags;
use dmasim_config::ErrorKind;
use serde::Serialize;

bitflags! {
    /// STATUS register bits. DONE and ERR are RW1C, the rest read-only.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StatusFlags: u32 {
        const DONE = 1 << 0;
        const ERR = 1 << 1;
        const BUSY = 1 << 2;
        const IRQ = 1 << 3;
    }
}

impl StatusFlags {
    pub const STICKY: StatusFlags = StatusFlags::DONE.union(StatusFlags::ERR);
}

/// Sticky completion state plus IRQ_EN.
///
/// DONE/ERR have exactly two mutators: `latch` on the terminal transition
/// and `clear` from the RW1C path. The interrupt level is always derived.
#[derive(Debug, Clone, Default)]
pub struct StatusRegister {
    sticky: StatusFlags,
    irq_enable: bool,
    error: Option<ErrorKind>,
}

impl StatusRegister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn done(&self) -> bool {
        self.sticky.contains(StatusFlags::DONE)
    }

    pub fn err(&self) -> bool {
        self.sticky.contains(StatusFlags::ERR)
    }

    pub fn is_pending(&self) -> bool {
        self.sticky.intersects(StatusFlags::STICKY)
    }

    pub fn irq_enable(&self) -> bool {
        self.irq_enable
    }

    pub fn error(&self) -> Option<ErrorKind> {
        self.error
    }

    pub fn irq(&self) -> bool {
        self.irq_enable && (self.done() || self.err())
    }

    pub fn set_irq_enable(&mut self, enable: bool) {
        self.irq_enable = enable;
    }

    /// Terminal transition. `Ok` sets DONE, `Err` sets ERR with its code.
    pub(crate) fn latch(&mut self, result: Result<(), ErrorKind>) {
        debug_assert!(
            !self.is_pending(),
            "terminal outcome latched over uncleared status"
        );
        match result {
            Ok(()) => self.sticky.insert(StatusFlags::DONE),
            Err(kind) => {
                self.sticky.insert(StatusFlags::ERR);
                self.error = Some(kind);
            }
        }
    }

    /// RW1C write. Returns the bits that actually went from 1 to 0.
    pub fn clear(&mut self, mask: StatusFlags) -> StatusFlags {
        let cleared = self.sticky & mask & StatusFlags::STICKY;
        self.sticky.remove(cleared);
        if cleared.contains(StatusFlags::ERR) {
            self.error = None;
        }
        cleared
    }

    pub fn flags(&self, busy: bool) -> StatusFlags {
        let mut flags = self.sticky;
        flags.set(StatusFlags::BUSY, busy);
        flags.set(StatusFlags::IRQ, self.irq());
        flags
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            done: self.done(),
            err: self.err(),
            irq_enable: self.irq_enable,
            irq: self.irq(),
            error: self.error,
        }
    }
}

/// Externally visible status at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatusSnapshot {
    pub done: bool,
    pub err: bool,
    pub irq_enable: bool,
    pub irq: bool,
    pub error: Option<ErrorKind>,
}

impl StatusSnapshot {
    pub fn irq_equation_holds(&self) -> bool {
        self.irq == (self.irq_enable && (self.done || self.err))
    }

    pub fn is_pending(&self) -> bool {
        self.done || self.err
    }
}
