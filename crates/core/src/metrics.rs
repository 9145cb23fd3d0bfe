// DmaSim - DMA Engine Verification Model
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::burst::BurstTransaction;
use crate::descriptor::TransferDescriptor;
use crate::engine::{EngineState, TransferOutcome};
use crate::responder::BeatOutcome;
use crate::EngineObserver;
use dmasim_config::{Direction, OutcomeKind};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug)]
pub struct TransferMetrics {
    transfers_started: AtomicU64,
    start_rejections: AtomicU64,
    bursts: AtomicU64,
    beats: AtomicU64,
    wait_cycles: AtomicU64,
    busy_cycles: AtomicU64,
    beats_by_direction: Mutex<HashMap<Direction, u64>>,
    outcomes: Mutex<HashMap<OutcomeKind, u64>>,
}

impl Default for TransferMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferMetrics {
    pub fn new() -> Self {
        Self {
            transfers_started: AtomicU64::new(0),
            start_rejections: AtomicU64::new(0),
            bursts: AtomicU64::new(0),
            beats: AtomicU64::new(0),
            wait_cycles: AtomicU64::new(0),
            busy_cycles: AtomicU64::new(0),
            beats_by_direction: Mutex::new(HashMap::new()),
            outcomes: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_bursts(&self) -> u64 {
        self.bursts.load(Ordering::SeqCst)
    }

    pub fn get_beats(&self) -> u64 {
        self.beats.load(Ordering::SeqCst)
    }

    pub fn get_beats_in(&self, direction: Direction) -> u64 {
        self.beats_by_direction
            .lock()
            .ok()
            .and_then(|m| m.get(&direction).copied())
            .unwrap_or(0)
    }

    pub fn get_wait_cycles(&self) -> u64 {
        self.wait_cycles.load(Ordering::SeqCst)
    }

    pub fn get_outcomes(&self, kind: OutcomeKind) -> u64 {
        self.outcomes
            .lock()
            .ok()
            .and_then(|m| m.get(&kind).copied())
            .unwrap_or(0)
    }

    pub fn summary(&self) -> MetricsSummary {
        let outcome = |kind| self.get_outcomes(kind);
        MetricsSummary {
            transfers_started: self.transfers_started.load(Ordering::SeqCst),
            start_rejections: self.start_rejections.load(Ordering::SeqCst),
            done: outcome(OutcomeKind::Done),
            start_errors: outcome(OutcomeKind::StartError),
            response_errors: outcome(OutcomeKind::ResponseError),
            bursts: self.get_bursts(),
            beats: self.get_beats(),
            read_beats: self.get_beats_in(Direction::Read),
            write_beats: self.get_beats_in(Direction::Write),
            wait_cycles: self.get_wait_cycles(),
            busy_cycles: self.busy_cycles.load(Ordering::SeqCst),
        }
    }
}

impl EngineObserver for TransferMetrics {
    fn on_transfer_start(&self, _desc: &TransferDescriptor) {
        self.transfers_started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_transfer_end(&self, outcome: &TransferOutcome, cycles: u64) {
        self.busy_cycles.fetch_add(cycles, Ordering::SeqCst);
        if let Ok(mut m) = self.outcomes.lock() {
            *m.entry(outcome.kind()).or_insert(0) += 1;
        }
    }

    fn on_start_rejected(&self, _state: EngineState) {
        self.start_rejections.fetch_add(1, Ordering::SeqCst);
    }

    fn on_burst_issued(&self, _txn: &BurstTransaction) {
        self.bursts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_beat(&self, txn: &BurstTransaction, outcome: &BeatOutcome) {
        self.beats.fetch_add(1, Ordering::SeqCst);
        self.wait_cycles
            .fetch_add(outcome.wait_cycles as u64, Ordering::SeqCst);
        if let Ok(mut m) = self.beats_by_direction.lock() {
            *m.entry(txn.direction).or_insert(0) += 1;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSummary {
    pub transfers_started: u64,
    pub start_rejections: u64,
    pub done: u64,
    pub start_errors: u64,
    pub response_errors: u64,
    pub bursts: u64,
    pub beats: u64,
    pub read_beats: u64,
    pub write_beats: u64,
    pub wait_cycles: u64,
    pub busy_cycles: u64,
}
