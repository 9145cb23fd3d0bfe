// DmaSim - DMA Engine Verification Model
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Expected-outcome oracle.
//!
//! Recomputes validation, chunking and error landing straight from the
//! descriptor and the injection script. Nothing here calls into the engine,
//! the burst generator or descriptor validation, so a bug in one of those
//! shows up as a scoreboard divergence instead of being mirrored.

use crate::descriptor::{BusGeometry, TransferDescriptor};
use crate::memory::LinearMemory;
use crate::status::StatusSnapshot;
use dmasim_config::{Direction, ErrorKind, Injection, OutcomeKind, Response, StartPolicy};
use serde::Serialize;
use std::collections::BTreeMap;

/// What the host did right before the start-request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stimulus {
    pub descriptor: TransferDescriptor,
    pub irq_enable: bool,
    /// Status as observed immediately before the start-request.
    pub prior: StatusSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PredictedByte {
    pub value: u8,
    /// Issue-order sequence number of the write burst carrying this byte.
    pub seq: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prediction {
    pub outcome: OutcomeKind,
    pub error: Option<ErrorKind>,
    pub status: StatusSnapshot,
    pub irq: bool,
    /// Destination bytes the transfer is expected to commit.
    pub delta: BTreeMap<u64, PredictedByte>,
    /// Number of burst transactions expected on the bus.
    pub transactions: u32,
    /// Sequence number and beat of the expected failing beat.
    pub fault: Option<(u32, u32)>,
}

impl Prediction {
    /// Expected image: `initial` with the predicted delta applied.
    pub fn apply(&self, image: &mut LinearMemory) {
        for (&addr, byte) in &self.delta {
            image.write_u8(addr, byte.value);
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReferenceModel {
    beat_bytes: u64,
    max_burst_beats: u64,
    window_base: u64,
    window_size: u64,
    boundary: Option<u64>,
    policy: StartPolicy,
}

impl ReferenceModel {
    pub fn new(geometry: &BusGeometry, policy: StartPolicy) -> Self {
        Self {
            beat_bytes: geometry.beat_bytes as u64,
            max_burst_beats: geometry.max_burst_beats as u64,
            window_base: geometry.window_base,
            window_size: geometry.window_size,
            boundary: geometry.boundary,
            policy,
        }
    }

    /// Predict one start-request against the memory image at start time.
    pub fn predict(
        &self,
        stimulus: &Stimulus,
        injections: &[Injection],
        initial: &LinearMemory,
    ) -> Prediction {
        let prior = stimulus.prior;
        if prior.is_pending() && self.policy == StartPolicy::RequireClear {
            return Prediction {
                outcome: OutcomeKind::Rejected,
                error: prior.error,
                status: prior,
                irq: prior.irq,
                delta: BTreeMap::new(),
                transactions: 0,
                fault: None,
            };
        }

        let desc = stimulus.descriptor;
        if let Some(kind) = self.start_error(&desc) {
            return self.conclude(stimulus, Err(kind), BTreeMap::new(), 0, None);
        }

        let mut delta = BTreeMap::new();
        let mut offset = 0u64;
        let mut chunk = 0u32;
        while offset < desc.length {
            let beats = self.chunk_beats(&desc, offset);
            let read_seq = chunk * 2;
            let write_seq = read_seq + 1;

            let read_fault = earliest(
                self.first_fault(injections, Direction::Read, chunk, beats),
                self.unmapped_beat(initial, desc.src + offset, beats),
            );
            if let Some((beat, response)) = read_fault {
                return self.conclude(
                    stimulus,
                    Err(error_kind(response)),
                    delta,
                    read_seq + 1,
                    Some((read_seq, beat)),
                );
            }

            let write_fault = earliest(
                self.first_fault(injections, Direction::Write, chunk, beats),
                self.unmapped_beat(initial, desc.dst + offset, beats),
            );
            let committed = write_fault.map_or(beats, |(beat, _)| beat as u64);
            for i in 0..committed * self.beat_bytes {
                // Source bytes were checked by unmapped_beat above.
                if let Some(value) = initial.read_u8(desc.src + offset + i) {
                    delta.insert(desc.dst + offset + i, PredictedByte { value, seq: write_seq });
                }
            }
            if let Some((beat, response)) = write_fault {
                return self.conclude(
                    stimulus,
                    Err(error_kind(response)),
                    delta,
                    write_seq + 1,
                    Some((write_seq, beat)),
                );
            }

            offset += beats * self.beat_bytes;
            chunk += 1;
        }

        self.conclude(stimulus, Ok(()), delta, chunk * 2, None)
    }

    fn start_error(&self, desc: &TransferDescriptor) -> Option<ErrorKind> {
        if desc.length == 0 {
            return Some(ErrorKind::ZeroLength);
        }
        if (desc.src | desc.dst | desc.length) & (self.beat_bytes - 1) != 0 {
            return Some(ErrorKind::Misaligned);
        }
        let window_end = self.window_base + self.window_size;
        let outside = |start: u64| match start.checked_add(desc.length) {
            Some(end) => start < self.window_base || end > window_end,
            None => true,
        };
        if outside(desc.src) || outside(desc.dst) {
            return Some(ErrorKind::OutOfRange);
        }
        if desc.src.max(desc.dst) < desc.src.min(desc.dst) + desc.length {
            return Some(ErrorKind::Overlap);
        }
        None
    }

    fn chunk_beats(&self, desc: &TransferDescriptor, offset: u64) -> u64 {
        let mut bytes = (desc.length - offset).min(self.max_burst_beats * self.beat_bytes);
        if let Some(boundary) = self.boundary {
            for addr in [desc.src + offset, desc.dst + offset] {
                bytes = bytes.min(boundary - (addr & (boundary - 1)));
            }
        }
        bytes / self.beat_bytes
    }

    /// Earliest non-OKAY injection landing on this burst.
    fn first_fault(
        &self,
        injections: &[Injection],
        channel: Direction,
        burst: u32,
        beats: u64,
    ) -> Option<(u32, Response)> {
        injections
            .iter()
            .filter(|i| i.channel == channel && i.burst == burst && (i.beat as u64) < beats)
            .filter(|i| !i.response.is_okay())
            .min_by_key(|i| i.beat)
            .map(|i| (i.beat, i.response))
    }

    /// First beat of a burst that falls outside the backing memory.
    fn unmapped_beat(
        &self,
        memory: &LinearMemory,
        address: u64,
        beats: u64,
    ) -> Option<(u32, Response)> {
        (0..beats)
            .find(|&b| {
                let beat_addr = address + b * self.beat_bytes;
                memory.read_u8(beat_addr).is_none()
                    || memory.read_u8(beat_addr + self.beat_bytes - 1).is_none()
            })
            .map(|b| (b as u32, Response::DecErr))
    }

    fn conclude(
        &self,
        stimulus: &Stimulus,
        result: Result<(), ErrorKind>,
        delta: BTreeMap<u64, PredictedByte>,
        transactions: u32,
        fault: Option<(u32, u32)>,
    ) -> Prediction {
        let (outcome, done, error) = match result {
            Ok(()) => (OutcomeKind::Done, true, None),
            Err(kind) if kind.is_start_time() => (OutcomeKind::StartError, false, Some(kind)),
            Err(kind) => (OutcomeKind::ResponseError, false, Some(kind)),
        };
        let err = error.is_some();
        let irq = stimulus.irq_enable && (done || err);
        Prediction {
            outcome,
            error,
            status: StatusSnapshot {
                done,
                err,
                irq_enable: stimulus.irq_enable,
                irq,
                error,
            },
            irq,
            delta,
            transactions,
            fault,
        }
    }
}

/// Injected faults win ties: the responder checks its script first.
fn earliest(
    injected: Option<(u32, Response)>,
    unmapped: Option<(u32, Response)>,
) -> Option<(u32, Response)> {
    match (injected, unmapped) {
        (Some(i), Some(u)) if u.0 < i.0 => Some(u),
        (Some(i), _) => Some(i),
        (None, u) => u,
    }
}

fn error_kind(response: Response) -> ErrorKind {
    match response {
        Response::DecErr => ErrorKind::DecodeError,
        _ => ErrorKind::SlaveError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmasim_config::MemoryFill;

    fn model() -> ReferenceModel {
        ReferenceModel::new(
            &BusGeometry {
                window_size: 0x4000,
                ..BusGeometry::default()
            },
            StartPolicy::RequireClear,
        )
    }

    fn memory() -> LinearMemory {
        let mut mem = LinearMemory::new(0x4000, 0);
        mem.fill(&MemoryFill::Incrementing);
        mem
    }

    fn stimulus(src: u64, dst: u64, length: u64) -> Stimulus {
        Stimulus {
            descriptor: TransferDescriptor::new(src, dst, length),
            irq_enable: true,
            prior: StatusSnapshot {
                irq_enable: true,
                ..StatusSnapshot::default()
            },
        }
    }

    fn inject(channel: Direction, burst: u32, beat: u32, response: Response) -> Injection {
        Injection {
            burst,
            beat,
            channel,
            response,
        }
    }

    #[test]
    fn test_clean_copy_predicts_full_delta() {
        let p = model().predict(&stimulus(0x1000, 0x2000, 96), &[], &memory());
        assert_eq!(p.outcome, OutcomeKind::Done);
        assert!(p.status.done && !p.status.err && p.irq);
        assert_eq!(p.transactions, 4);
        assert_eq!(p.delta.len(), 96);
        assert_eq!(p.delta[&0x2000], PredictedByte { value: 0x00, seq: 1 });
        assert_eq!(p.delta[&0x205F], PredictedByte { value: 0x5F, seq: 3 });
    }

    #[test]
    fn test_start_errors_in_order() {
        let m = model();
        let mem = memory();
        let cases = [
            ((0x1000, 0x2000, 0), ErrorKind::ZeroLength),
            ((0x1001, 0x2000, 0), ErrorKind::ZeroLength),
            ((0x1002, 0x2000, 64), ErrorKind::Misaligned),
            ((0x1000, 0x2000, 6), ErrorKind::Misaligned),
            ((0x3FF0, 0x9000_0000, 64), ErrorKind::OutOfRange),
            ((u64::MAX - 3, 0x2000, 64), ErrorKind::OutOfRange),
            ((0x1000, 0x1020, 64), ErrorKind::Overlap),
        ];
        for ((src, dst, len), kind) in cases {
            let p = m.predict(&stimulus(src, dst, len), &[], &mem);
            assert_eq!(p.outcome, OutcomeKind::StartError, "{src:#x} {dst:#x} {len}");
            assert_eq!(p.error, Some(kind));
            assert!(p.status.err && !p.status.done);
            assert_eq!(p.transactions, 0);
            assert!(p.delta.is_empty());
        }
    }

    #[test]
    fn test_write_injection_keeps_earlier_beats() {
        let p = model().predict(
            &stimulus(0x1000, 0x2000, 64),
            &[inject(Direction::Write, 0, 3, Response::SlvErr)],
            &memory(),
        );
        assert_eq!(p.outcome, OutcomeKind::ResponseError);
        assert_eq!(p.error, Some(ErrorKind::SlaveError));
        assert_eq!(p.fault, Some((1, 3)));
        assert_eq!(p.transactions, 2);
        assert_eq!(p.delta.keys().copied().collect::<Vec<_>>(), (0x2000..0x200C).collect::<Vec<_>>());
    }

    #[test]
    fn test_read_injection_drops_whole_chunk() {
        let p = model().predict(
            &stimulus(0x1000, 0x2000, 96),
            &[inject(Direction::Read, 1, 5, Response::DecErr)],
            &memory(),
        );
        assert_eq!(p.error, Some(ErrorKind::DecodeError));
        assert_eq!(p.fault, Some((2, 5)));
        assert_eq!(p.transactions, 3);
        assert_eq!(p.delta.len(), 64);
    }

    #[test]
    fn test_earliest_injection_in_issue_order_wins() {
        let p = model().predict(
            &stimulus(0x1000, 0x2000, 96),
            &[
                inject(Direction::Read, 1, 0, Response::DecErr),
                inject(Direction::Write, 0, 9, Response::SlvErr),
                inject(Direction::Write, 0, 2, Response::Okay),
            ],
            &memory(),
        );
        assert_eq!(p.error, Some(ErrorKind::SlaveError));
        assert_eq!(p.fault, Some((1, 9)));
        assert_eq!(p.delta.len(), 36);
    }

    #[test]
    fn test_injection_past_end_is_inert() {
        let p = model().predict(
            &stimulus(0x1000, 0x2000, 96),
            &[
                inject(Direction::Write, 1, 8, Response::SlvErr),
                inject(Direction::Read, 2, 0, Response::SlvErr),
            ],
            &memory(),
        );
        assert_eq!(p.outcome, OutcomeKind::Done);
    }

    #[test]
    fn test_boundary_limits_chunks() {
        let m = ReferenceModel::new(
            &BusGeometry {
                window_size: 0x4000,
                boundary: Some(0x1000),
                ..BusGeometry::default()
            },
            StartPolicy::RequireClear,
        );
        let p = m.predict(
            &stimulus(0x0FF8, 0x2000, 64),
            &[inject(Direction::Write, 1, 0, Response::SlvErr)],
            &memory(),
        );
        // First chunk stops at 0x1000: two beats.
        assert_eq!(p.delta.len(), 8);
        assert_eq!(p.fault, Some((3, 0)));
    }

    #[test]
    fn test_pending_status_rejects_under_require_clear() {
        let mut s = stimulus(0x1000, 0x2000, 64);
        s.prior = StatusSnapshot {
            done: true,
            err: false,
            irq_enable: true,
            irq: true,
            error: None,
        };
        let p = model().predict(&s, &[], &memory());
        assert_eq!(p.outcome, OutcomeKind::Rejected);
        assert_eq!(p.status, s.prior);
        assert_eq!(p.transactions, 0);

        let clear_on_start = ReferenceModel::new(
            &BusGeometry {
                window_size: 0x4000,
                ..BusGeometry::default()
            },
            StartPolicy::ClearOnStart,
        );
        let p = clear_on_start.predict(&s, &[], &memory());
        assert_eq!(p.outcome, OutcomeKind::Done);
    }

    #[test]
    fn test_unbacked_source_predicts_decode_error() {
        let mut mem = LinearMemory::new(0x1010, 0);
        mem.fill(&MemoryFill::Incrementing);
        let p = model().predict(&stimulus(0x1000, 0x0100, 32), &[], &mem);
        assert_eq!(p.error, Some(ErrorKind::DecodeError));
        assert_eq!(p.fault, Some((0, 4)));
        assert!(p.delta.is_empty());
    }
}
