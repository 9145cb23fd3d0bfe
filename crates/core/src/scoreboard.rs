// DmaSim - DMA Engine Verification Model
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::engine::{TransferOutcome, TransferTrace};
use crate::memory::{LinearMemory, WriteRecord};
use crate::reference::Prediction;
use dmasim_config::{ErrorKind, OutcomeKind, VerdictKind};
use serde::Serialize;
use std::fmt;

/// The observable side of one transfer.
#[derive(Debug, Clone, Copy)]
pub struct ActualExecution<'a> {
    pub trace: &'a TransferTrace,
    /// Bytes the responder committed during this transfer.
    pub writes: &'a [WriteRecord],
    pub memory: &'a LinearMemory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckedField {
    Done,
    Err,
    Irq,
    ErrorCode,
    Outcome,
    TransactionCount,
    FaultLocation,
    IrqEquation,
    Memory,
    UnexpectedWrite,
}

impl fmt::Display for CheckedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CheckedField::Done => "DONE",
            CheckedField::Err => "ERR",
            CheckedField::Irq => "IRQ",
            CheckedField::ErrorCode => "error_code",
            CheckedField::Outcome => "outcome",
            CheckedField::TransactionCount => "transaction_count",
            CheckedField::FaultLocation => "fault_location",
            CheckedField::IrqEquation => "irq_equation",
            CheckedField::Memory => "memory",
            CheckedField::UnexpectedWrite => "unexpected_write",
        };
        f.write_str(name)
    }
}

/// First mismatch between prediction and execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{field} diverged: expected {expected}, actual {actual}")]
pub struct Divergence {
    pub field: CheckedField,
    pub expected: String,
    pub actual: String,
    /// Issue-order index of the transaction the mismatch belongs to.
    pub transaction_index: Option<u32>,
}

impl Divergence {
    fn new(field: CheckedField, expected: impl fmt::Display, actual: impl fmt::Display) -> Self {
        Self {
            field,
            expected: expected.to_string(),
            actual: actual.to_string(),
            transaction_index: None,
        }
    }

    fn at(mut self, transaction_index: Option<u32>) -> Self {
        self.transaction_index = transaction_index;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub transfer: usize,
    pub status: VerdictKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub divergence: Option<Divergence>,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        self.status == VerdictKind::Pass
    }
}

/// Compares executions against predictions, one transfer at a time.
///
/// Comparison stops at the first divergence of a transfer; the next
/// `check` starts from scratch.
#[derive(Debug, Default)]
pub struct Scoreboard {
    verdicts: Vec<Verdict>,
}

impl Scoreboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(
        &mut self,
        transfer: usize,
        actual: &ActualExecution<'_>,
        expected: &Prediction,
    ) -> &Verdict {
        let divergence = first_divergence(actual, expected);
        match &divergence {
            Some(d) => tracing::warn!("Transfer {}: {}", transfer, d),
            None => tracing::debug!("Transfer {}: scoreboard pass", transfer),
        }
        let status = if divergence.is_some() {
            VerdictKind::Fail
        } else {
            VerdictKind::Pass
        };
        self.verdicts.push(Verdict {
            transfer,
            status,
            divergence,
        });
        &self.verdicts[self.verdicts.len() - 1]
    }

    pub fn verdicts(&self) -> &[Verdict] {
        &self.verdicts
    }

    pub fn passed(&self) -> bool {
        self.verdicts.iter().all(Verdict::passed)
    }

    pub fn first_failure(&self) -> Option<&Verdict> {
        self.verdicts.iter().find(|v| !v.passed())
    }
}

fn code(error: Option<ErrorKind>) -> u8 {
    error.map_or(0, ErrorKind::code)
}

fn outcome_name(kind: OutcomeKind) -> String {
    format!("{:?}", kind)
}

fn fault_name(fault: Option<(u32, u32)>) -> String {
    match fault {
        Some((seq, beat)) => format!("transaction {} beat {}", seq, beat),
        None => "none".to_string(),
    }
}

fn first_divergence(actual: &ActualExecution<'_>, expected: &Prediction) -> Option<Divergence> {
    let trace = actual.trace;
    let status = trace.final_status;
    // Status-level mismatches point at the predicted fault, else the last transaction.
    let last_txn = expected
        .fault
        .map(|(seq, _)| seq)
        .or_else(|| trace.transactions().checked_sub(1));

    if status.done != expected.status.done {
        return Some(Divergence::new(CheckedField::Done, expected.status.done, status.done).at(last_txn));
    }
    if status.err != expected.status.err {
        return Some(Divergence::new(CheckedField::Err, expected.status.err, status.err).at(last_txn));
    }
    if trace.final_irq != expected.irq {
        return Some(Divergence::new(CheckedField::Irq, expected.irq, trace.final_irq).at(last_txn));
    }
    if status.error != expected.error {
        return Some(
            Divergence::new(CheckedField::ErrorCode, code(expected.error), code(status.error)).at(last_txn),
        );
    }

    let outcome = trace.outcome.map(|o| o.kind());
    if outcome != Some(expected.outcome) {
        let actual_name = outcome.map_or_else(|| "unfinished".to_string(), outcome_name);
        return Some(Divergence::new(
            CheckedField::Outcome,
            outcome_name(expected.outcome),
            actual_name,
        ));
    }
    if trace.transactions() != expected.transactions {
        let first_extra = trace.transactions().min(expected.transactions);
        return Some(
            Divergence::new(CheckedField::TransactionCount, expected.transactions, trace.transactions())
                .at(Some(first_extra)),
        );
    }
    let fault = match trace.outcome {
        Some(TransferOutcome::ResponseError { error }) => Some((error.fault().seq, error.fault().beat)),
        _ => None,
    };
    if fault != expected.fault {
        return Some(
            Divergence::new(CheckedField::FaultLocation, fault_name(expected.fault), fault_name(fault))
                .at(expected.fault.map(|(seq, _)| seq)),
        );
    }
    // Judge the line as driven, not the IRQ bit the engine reports about itself.
    for (snapshot, level) in trace.irq_levels() {
        let want = snapshot.irq_enable && (snapshot.done || snapshot.err);
        if level != want {
            return Some(Divergence::new(CheckedField::IrqEquation, want, level));
        }
    }

    for (&addr, byte) in &expected.delta {
        let found = actual.memory.read_u8(addr);
        if found != Some(byte.value) {
            let shown = found.map_or_else(|| "unmapped".to_string(), |v| format!("{:#04x}", v));
            return Some(
                Divergence::new(
                    CheckedField::Memory,
                    format!("{:#04x} @ {:#x}", byte.value, addr),
                    format!("{} @ {:#x}", shown, addr),
                )
                .at(Some(byte.seq)),
            );
        }
    }
    if let Some(stray) = actual
        .writes
        .iter()
        .find(|w| !expected.delta.contains_key(&w.address))
    {
        return Some(
            Divergence::new(
                CheckedField::UnexpectedWrite,
                format!("no write @ {:#x}", stray.address),
                format!("{:#04x} @ {:#x}", stray.value, stray.address),
            )
            .at(Some(stray.seq)),
        );
    }

    None
}
