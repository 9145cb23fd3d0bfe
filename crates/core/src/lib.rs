// DmaSim - DMA Engine Verification Model
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod burst;
pub mod descriptor;
pub mod engine;
pub mod memory;
pub mod metrics;
pub mod prng;
pub mod reference;
pub mod regs;
pub mod responder;
pub mod scenario;
pub mod scoreboard;
pub mod signals;
pub mod status;


pub use burst::{BurstGenerator, BurstTransaction};
pub use descriptor::{BusGeometry, StartError, TransferDescriptor, ValidatedDescriptor};
pub use dmasim_config::{Direction, ErrorKind, Injection, OutcomeKind, Response, StartPolicy};
pub use engine::{DmaEngine, EngineState, ResponseError, TransferOutcome, TransferTrace, UsageError};
pub use reference::{Prediction, ReferenceModel, Stimulus};
pub use responder::{BeatOutcome, BusResponder, MemoryResponder};
pub use scoreboard::{ActualExecution, Divergence, Scoreboard, Verdict};
pub use status::{StatusFlags, StatusRegister, StatusSnapshot};

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("read beat {beat} of transaction {seq} returned {actual} bytes, expected {expected}")]
    ShortReadData {
        seq: u32,
        beat: u32,
        expected: usize,
        actual: usize,
    },
    #[error("write transaction {seq} has no staged read data for beat {beat}")]
    MissingWriteData { seq: u32, beat: u32 },
    #[error("register access at offset {0:#x} is outside the register window")]
    RegisterAccess(u64),
}

pub type SimResult<T> = Result<T, SimulationError>;

/// Trait for observing engine activity in a modular way.
pub trait EngineObserver: std::fmt::Debug + Send + Sync {
    fn on_transfer_start(&self, _desc: &TransferDescriptor) {}
    fn on_transfer_end(&self, _outcome: &TransferOutcome, _cycles: u64) {}
    fn on_start_rejected(&self, _state: EngineState) {}
    fn on_burst_issued(&self, _txn: &BurstTransaction) {}
    fn on_beat(&self, _txn: &BurstTransaction, _outcome: &BeatOutcome) {}
}
