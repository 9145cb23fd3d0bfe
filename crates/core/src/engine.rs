// DmaSim - DMA Engine Verification Model
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::burst::{BurstGenerator, BurstTransaction};
use crate::descriptor::{BusGeometry, StartError, TransferDescriptor, ValidatedDescriptor};
use crate::responder::BusResponder;
use crate::signals::{DigitalLevel, IrqLine};
use crate::status::{StatusFlags, StatusRegister, StatusSnapshot};
use crate::{EngineObserver, SimResult, SimulationError};
use dmasim_config::{Direction, ErrorKind, OutcomeKind, Response, StartPolicy};
use serde::Serialize;
use std::fmt;
use std::iter::Peekable;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Validating,
    Active,
    Done,
    ErrorStart,
    ErrorResp,
}

impl EngineState {
    pub fn is_busy(self) -> bool {
        matches!(self, EngineState::Validating | EngineState::Active)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EngineState::Done | EngineState::ErrorStart | EngineState::ErrorResp
        )
    }
}

/// Where on the bus a non-OKAY response landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BusFault {
    pub seq: u32,
    pub direction: Direction,
    pub burst: u32,
    pub beat: u32,
    pub address: u64,
}

impl fmt::Display for BusFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} burst {} beat {} @ {:#x} (transaction {})",
            self.direction, self.burst, self.beat, self.address, self.seq
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseError {
    #[error("SLVERR on {0}")]
    SlaveError(BusFault),
    #[error("DECERR on {0}")]
    DecodeError(BusFault),
}

impl ResponseError {
    fn from_response(response: Response, fault: BusFault) -> Option<Self> {
        match response {
            Response::Okay => None,
            Response::SlvErr => Some(ResponseError::SlaveError(fault)),
            Response::DecErr => Some(ResponseError::DecodeError(fault)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ResponseError::SlaveError(_) => ErrorKind::SlaveError,
            ResponseError::DecodeError(_) => ErrorKind::DecodeError,
        }
    }

    pub fn fault(&self) -> &BusFault {
        match self {
            ResponseError::SlaveError(f) | ResponseError::DecodeError(f) => f,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    #[error("start-request rejected while {state:?} (DONE/ERR pending: {pending})")]
    StartWhileBusy { state: EngineState, pending: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransferOutcome {
    Done,
    StartError { error: StartError },
    ResponseError { error: ResponseError },
    Rejected,
}

impl TransferOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            TransferOutcome::Done => OutcomeKind::Done,
            TransferOutcome::StartError { .. } => OutcomeKind::StartError,
            TransferOutcome::ResponseError { .. } => OutcomeKind::ResponseError,
            TransferOutcome::Rejected => OutcomeKind::Rejected,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            TransferOutcome::StartError { error } => Some(error.kind()),
            TransferOutcome::ResponseError { error } => Some(error.kind()),
            TransferOutcome::Done | TransferOutcome::Rejected => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    State {
        cycle: u64,
        from: EngineState,
        to: EngineState,
    },
    Status {
        cycle: u64,
        status: StatusSnapshot,
    },
    Irq {
        cycle: u64,
        level: DigitalLevel,
    },
    BurstIssued {
        cycle: u64,
        txn: BurstTransaction,
    },
    Beat {
        cycle: u64,
        seq: u32,
        beat: u32,
        response: Response,
    },
}

/// Everything the engine did for one start-request.
#[derive(Debug, Clone, Serialize)]
pub struct TransferTrace {
    pub descriptor: TransferDescriptor,
    /// `None` until the transfer reaches a terminal state.
    pub outcome: Option<TransferOutcome>,
    pub bursts: Vec<BurstTransaction>,
    pub events: Vec<EngineEvent>,
    pub initial_status: StatusSnapshot,
    /// Level of the interrupt line when the start-request arrived.
    pub initial_irq: bool,
    pub final_status: StatusSnapshot,
    pub final_irq: bool,
    pub start_cycle: u64,
    pub end_cycle: u64,
}

impl TransferTrace {
    fn new(descriptor: TransferDescriptor, cycle: u64, status: StatusSnapshot, irq: bool) -> Self {
        Self {
            descriptor,
            outcome: None,
            bursts: Vec::new(),
            events: Vec::new(),
            initial_status: status,
            initial_irq: irq,
            final_status: status,
            final_irq: irq,
            start_cycle: cycle,
            end_cycle: cycle,
        }
    }

    /// Trace of a refused start: nothing happened.
    pub fn rejected(
        descriptor: TransferDescriptor,
        cycle: u64,
        status: StatusSnapshot,
        irq: bool,
    ) -> Self {
        Self {
            outcome: Some(TransferOutcome::Rejected),
            ..Self::new(descriptor, cycle, status, irq)
        }
    }

    pub fn transactions(&self) -> u32 {
        self.bursts.len() as u32
    }

    pub fn bursts_in(&self, direction: Direction) -> u32 {
        self.bursts
            .iter()
            .filter(|b| b.direction == direction)
            .count() as u32
    }

    /// Pairs every status change with the interrupt level driven right after it.
    pub fn irq_levels(&self) -> Vec<(StatusSnapshot, bool)> {
        let mut level = self.initial_irq;
        let mut current: Option<StatusSnapshot> = None;
        let mut pairs = Vec::new();
        for event in &self.events {
            match event {
                EngineEvent::Status { status, .. } => {
                    if let Some(prev) = current.replace(*status) {
                        pairs.push((prev, level));
                    }
                }
                EngineEvent::Irq { level: l, .. } => level = (*l).into(),
                _ => {}
            }
        }
        if let Some(last) = current {
            pairs.push((last, level));
        }
        pairs
    }

    pub fn status_changes(&self) -> impl Iterator<Item = &StatusSnapshot> {
        self.events.iter().filter_map(|e| match e {
            EngineEvent::Status { status, .. } => Some(status),
            _ => None,
        })
    }

    pub fn irq_edges(&self) -> impl Iterator<Item = (u64, DigitalLevel)> + '_ {
        self.events.iter().filter_map(|e| match e {
            EngineEvent::Irq { cycle, level } => Some((*cycle, *level)),
            _ => None,
        })
    }

    pub fn cycles(&self) -> u64 {
        self.end_cycle - self.start_cycle
    }
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    txn: BurstTransaction,
    next_beat: u32,
}

#[derive(Debug)]
struct ActiveTransfer {
    bursts: Peekable<BurstGenerator>,
    inflight: Option<InFlight>,
    /// Read data of the current chunk, consumed by its write burst.
    staging: Vec<u8>,
}

impl ActiveTransfer {
    fn new(validated: ValidatedDescriptor) -> Self {
        let chunk_bytes = (validated.geometry().max_burst_beats * validated.geometry().beat_bytes) as usize;
        Self {
            bursts: BurstGenerator::new(validated).peekable(),
            inflight: None,
            staging: Vec::with_capacity(chunk_bytes),
        }
    }
}

/// Single-channel memory-to-memory transfer controller.
///
/// Host operations (`program`, `set_irq_enable`, `request_start`,
/// `clear_status`) arrive as discrete events. Bus work happens in `tick`,
/// one beat per call, with at most one burst outstanding.
pub struct DmaEngine {
    geometry: BusGeometry,
    policy: StartPolicy,
    state: EngineState,
    status: StatusRegister,
    irq_line: IrqLine,
    program: TransferDescriptor,
    active: Option<ActiveTransfer>,
    trace: Option<TransferTrace>,
    now: u64,
    start_while_busy: u64,
    pub observers: Vec<Arc<dyn EngineObserver>>,
}

impl DmaEngine {
    pub fn new(geometry: BusGeometry, policy: StartPolicy) -> Self {
        Self {
            geometry,
            policy,
            state: EngineState::Idle,
            status: StatusRegister::new(),
            irq_line: IrqLine::new(),
            program: TransferDescriptor::default(),
            active: None,
            trace: None,
            now: 0,
            start_while_busy: 0,
            observers: Vec::new(),
        }
    }

    pub fn geometry(&self) -> &BusGeometry {
        &self.geometry
    }

    pub fn policy(&self) -> StartPolicy {
        self.policy
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn status(&self) -> &StatusRegister {
        &self.status
    }

    pub fn busy(&self) -> bool {
        self.state.is_busy()
    }

    /// Current level of the interrupt output.
    pub fn irq(&self) -> bool {
        self.irq_line.is_high()
    }

    pub fn irq_line(&self) -> &IrqLine {
        &self.irq_line
    }

    pub fn descriptor(&self) -> TransferDescriptor {
        self.program
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    /// Number of start-requests refused with StartWhileBusy.
    pub fn start_while_busy(&self) -> u64 {
        self.start_while_busy
    }

    pub fn trace(&self) -> Option<&TransferTrace> {
        self.trace.as_ref()
    }

    pub fn take_trace(&mut self) -> Option<TransferTrace> {
        self.trace.take()
    }

    pub fn program(&mut self, desc: TransferDescriptor) {
        self.program = desc;
    }

    pub fn set_source(&mut self, src: u64) {
        self.program.src = src;
    }

    pub fn set_destination(&mut self, dst: u64) {
        self.program.dst = dst;
    }

    pub fn set_length(&mut self, length: u64) {
        self.program.length = length;
    }

    pub fn set_irq_enable(&mut self, enable: bool) {
        if self.status.irq_enable() != enable {
            self.status.set_irq_enable(enable);
            self.status_changed();
        }
    }

    /// RW1C write to STATUS. Writing zeros, or ones over bits that are
    /// already clear, has no effect.
    pub fn clear_status(&mut self, mask: StatusFlags) -> StatusFlags {
        let cleared = self.status.clear(mask);
        if !cleared.is_empty() {
            self.status_changed();
            if self.state.is_terminal() && !self.status.is_pending() {
                self.transition(EngineState::Idle);
            }
        }
        cleared
    }

    pub fn request_start(&mut self) -> Result<(), UsageError> {
        let pending = self.status.is_pending();
        if self.state.is_busy() || (pending && self.policy == StartPolicy::RequireClear) {
            self.start_while_busy += 1;
            warn!(
                "Start-request rejected in state {:?} (DONE/ERR pending: {})",
                self.state, pending
            );
            for observer in &self.observers {
                observer.on_start_rejected(self.state);
            }
            return Err(UsageError::StartWhileBusy {
                state: self.state,
                pending,
            });
        }

        let desc = self.program;
        self.trace = Some(TransferTrace::new(
            desc,
            self.now,
            self.status.snapshot(),
            self.irq_line.is_high(),
        ));
        for observer in &self.observers {
            observer.on_transfer_start(&desc);
        }

        if pending {
            // StartPolicy::ClearOnStart
            self.clear_status(StatusFlags::STICKY);
        }

        self.transition(EngineState::Validating);
        match desc.validate(&self.geometry) {
            Ok(validated) => {
                debug!(
                    "Transfer {:#x} -> {:#x} ({} bytes) accepted",
                    desc.src, desc.dst, desc.length
                );
                self.active = Some(ActiveTransfer::new(validated));
                self.transition(EngineState::Active);
            }
            Err(error) => {
                info!("Transfer rejected at start: {}", error);
                self.finish(TransferOutcome::StartError { error }, EngineState::ErrorStart);
            }
        }
        Ok(())
    }

    /// Advance by one beat. Returns true while the transfer is still active.
    pub fn tick(&mut self, bus: &mut dyn BusResponder) -> SimResult<bool> {
        if self.state != EngineState::Active {
            return Ok(false);
        }
        let Some(active) = self.active.as_mut() else {
            return Ok(false);
        };

        let (txn, beat) = match active.inflight {
            Some(inflight) => (inflight.txn, inflight.next_beat),
            None => match active.bursts.next() {
                Some(txn) => {
                    if txn.direction == Direction::Read {
                        active.staging.clear();
                    }
                    active.inflight = Some(InFlight { txn, next_beat: 0 });
                    debug!(
                        "Issue {:?} burst {} @ {:#x}, {} beats",
                        txn.direction, txn.index, txn.address, txn.beat_count
                    );
                    if let Some(trace) = self.trace.as_mut() {
                        trace.bursts.push(txn);
                        trace.events.push(EngineEvent::BurstIssued {
                            cycle: self.now,
                            txn,
                        });
                    }
                    for observer in &self.observers {
                        observer.on_burst_issued(&txn);
                    }
                    (txn, 0)
                }
                None => {
                    self.finish(TransferOutcome::Done, EngineState::Done);
                    return Ok(false);
                }
            },
        };

        let beat_bytes = txn.beat_bytes as usize;
        let write_data = match txn.direction {
            Direction::Read => None,
            Direction::Write => {
                let start = beat as usize * beat_bytes;
                match active.staging.get(start..start + beat_bytes) {
                    Some(bytes) => Some(bytes),
                    None => {
                        return Err(SimulationError::MissingWriteData { seq: txn.seq, beat });
                    }
                }
            }
        };

        let outcome = bus.respond_beat(&txn, beat, write_data);
        self.now = bus.cycles();
        if let Some(trace) = self.trace.as_mut() {
            trace.events.push(EngineEvent::Beat {
                cycle: self.now,
                seq: txn.seq,
                beat,
                response: outcome.response,
            });
        }
        for observer in &self.observers {
            observer.on_beat(&txn, &outcome);
        }

        let fault = BusFault {
            seq: txn.seq,
            direction: txn.direction,
            burst: txn.index,
            beat,
            address: outcome.address,
        };
        if let Some(error) = ResponseError::from_response(outcome.response, fault) {
            warn!("Transfer aborted: {}", error);
            self.finish(
                TransferOutcome::ResponseError { error },
                EngineState::ErrorResp,
            );
            return Ok(false);
        }

        if txn.direction == Direction::Read {
            match outcome.data {
                Some(data) if data.len() == beat_bytes => active.staging.extend_from_slice(&data),
                other => {
                    return Err(SimulationError::ShortReadData {
                        seq: txn.seq,
                        beat,
                        expected: beat_bytes,
                        actual: other.map_or(0, |d| d.len()),
                    });
                }
            }
        }

        if beat + 1 < txn.beat_count {
            active.inflight = Some(InFlight {
                txn,
                next_beat: beat + 1,
            });
            return Ok(true);
        }

        active.inflight = None;
        if active.bursts.peek().is_some() {
            return Ok(true);
        }

        self.finish(TransferOutcome::Done, EngineState::Done);
        Ok(false)
    }

    /// Tick until the current transfer leaves ACTIVE.
    pub fn run_to_completion(&mut self, bus: &mut dyn BusResponder) -> SimResult<()> {
        while self.tick(bus)? {}
        Ok(())
    }

    fn transition(&mut self, to: EngineState) {
        let from = self.state;
        if from == to {
            return;
        }
        debug!("DMA state {:?} -> {:?}", from, to);
        self.state = to;
        if let Some(trace) = self.trace.as_mut() {
            trace.events.push(EngineEvent::State {
                cycle: self.now,
                from,
                to,
            });
        }
    }

    /// Recompute the interrupt output after any status change.
    fn status_changed(&mut self) {
        let snapshot = self.status.snapshot();
        let edge = self.irq_line.drive(snapshot.irq, self.now);
        if let Some(trace) = self.trace.as_mut() {
            trace.events.push(EngineEvent::Status {
                cycle: self.now,
                status: snapshot,
            });
            if edge {
                trace.events.push(EngineEvent::Irq {
                    cycle: self.now,
                    level: self.irq_line.level(),
                });
            }
        }
    }

    fn finish(&mut self, outcome: TransferOutcome, state: EngineState) {
        self.active = None;
        self.transition(state);
        self.status.latch(match outcome.error_kind() {
            Some(kind) => Err(kind),
            None => Ok(()),
        });
        self.status_changed();

        info!(
            "Transfer finished: {:?} (DONE={}, ERR={}, IRQ={})",
            outcome.kind(),
            self.status.done(),
            self.status.err(),
            self.irq_line.is_high()
        );

        let mut cycles = 0;
        if let Some(trace) = self.trace.as_mut() {
            trace.outcome = Some(outcome);
            trace.end_cycle = self.now;
            trace.final_status = self.status.snapshot();
            trace.final_irq = self.irq_line.is_high();
            cycles = trace.cycles();
        }
        for observer in &self.observers {
            observer.on_transfer_end(&outcome, cycles);
        }
    }
}

impl fmt::Debug for DmaEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DmaEngine")
            .field("state", &self.state)
            .field("status", &self.status)
            .field("program", &self.program)
            .field("now", &self.now)
            .finish()
    }
}
