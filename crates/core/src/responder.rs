// DmaSim - DMA Engine Verification Model
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::burst::BurstTransaction;
use crate::memory::{LinearMemory, WriteRecord};
use crate::prng::SplitMix64;
use dmasim_config::{Direction, Injection, LatencyProfile, ResponderConfig, Response, StallProfile};
use serde::Serialize;

/// Result of one beat as seen by the initiator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BeatOutcome {
    pub beat: u32,
    pub address: u64,
    pub response: Response,
    /// Read data, present only on an OKAY read.
    pub data: Option<Vec<u8>>,
    /// True only for an OKAY write.
    pub accepted: bool,
    /// Latency plus backpressure spent on this beat.
    pub wait_cycles: u32,
}

/// Trait representing the far end of the memory bus.
///
/// `respond_beat` is the engine's only suspension point: the initiator does
/// not proceed until the beat has been resolved.
pub trait BusResponder {
    fn respond_beat(
        &mut self,
        txn: &BurstTransaction,
        beat: u32,
        write_data: Option<&[u8]>,
    ) -> BeatOutcome;

    /// Simulated time in cycles.
    fn cycles(&self) -> u64;
}

#[derive(Debug, Clone)]
enum LatencySource {
    Fixed(u32),
    Pattern { cycles: Vec<u32>, pos: usize },
    Seeded { min: u32, max: u32, rng: SplitMix64 },
}

impl LatencySource {
    fn new(profile: &LatencyProfile) -> Self {
        match profile {
            LatencyProfile::Fixed { cycles } => LatencySource::Fixed(*cycles),
            LatencyProfile::Pattern { cycles } => LatencySource::Pattern {
                cycles: cycles.clone(),
                pos: 0,
            },
            LatencyProfile::Seeded { min, max, seed } => LatencySource::Seeded {
                min: *min,
                max: *max,
                rng: SplitMix64::new(*seed),
            },
        }
    }

    fn next(&mut self) -> u32 {
        match self {
            LatencySource::Fixed(c) => *c,
            LatencySource::Pattern { cycles, pos } => {
                let c = cycles.get(*pos % cycles.len().max(1)).copied().unwrap_or(0);
                *pos += 1;
                c
            }
            LatencySource::Seeded { min, max, rng } => rng.range(*min, *max),
        }
    }
}

#[derive(Debug, Clone)]
enum StallSource {
    None,
    Periodic { every: u32, cycles: u32, count: u64 },
    Seeded {
        percent: u8,
        max_cycles: u32,
        rng: SplitMix64,
    },
}

impl StallSource {
    fn new(profile: &StallProfile) -> Self {
        match profile {
            StallProfile::None => StallSource::None,
            StallProfile::Periodic { every, cycles } => StallSource::Periodic {
                every: *every,
                cycles: *cycles,
                count: 0,
            },
            StallProfile::Seeded {
                percent,
                max_cycles,
                seed,
            } => StallSource::Seeded {
                percent: *percent,
                max_cycles: *max_cycles,
                rng: SplitMix64::new(*seed),
            },
        }
    }

    fn next(&mut self) -> u32 {
        match self {
            StallSource::None => 0,
            StallSource::Periodic {
                every,
                cycles,
                count,
            } => {
                *count += 1;
                if *every > 0 && *count % *every as u64 == 0 {
                    *cycles
                } else {
                    0
                }
            }
            StallSource::Seeded {
                percent,
                max_cycles,
                rng,
            } => {
                if *max_cycles > 0 && rng.chance(*percent) {
                    rng.range(1, *max_cycles)
                } else {
                    0
                }
            }
        }
    }
}

fn channel(direction: Direction) -> usize {
    match direction {
        Direction::Read => 0,
        Direction::Write => 1,
    }
}

/// Simulated far-end memory.
///
/// Owns the actual memory image; the image changes only on OKAY write
/// beats and every such byte is logged. Bursts are counted per channel
/// as they arrive, independent of how the initiator labels them.
#[derive(Debug, Clone)]
pub struct MemoryResponder {
    memory: LinearMemory,
    latency: LatencySource,
    stall: StallSource,
    injections: Vec<Injection>,
    bursts_seen: [u32; 2],
    current_burst: [u32; 2],
    cycles: u64,
    stall_cycles: u64,
    beats_served: u64,
    write_log: Vec<WriteRecord>,
}

impl MemoryResponder {
    pub fn new(memory: LinearMemory, config: &ResponderConfig) -> Self {
        Self {
            memory,
            latency: LatencySource::new(&config.latency),
            stall: StallSource::new(&config.stall),
            injections: Vec::new(),
            bursts_seen: [0; 2],
            current_burst: [0; 2],
            cycles: 0,
            stall_cycles: 0,
            beats_served: 0,
            write_log: Vec::new(),
        }
    }

    /// Install the injection script for the next transfer and restart burst
    /// counting from zero.
    pub fn arm(&mut self, injections: &[Injection]) {
        self.injections = injections.to_vec();
        self.bursts_seen = [0; 2];
        self.current_burst = [0; 2];
    }

    pub fn memory(&self) -> &LinearMemory {
        &self.memory
    }

    #[cfg(test)]
    pub(crate) fn memory_mut(&mut self) -> &mut LinearMemory {
        &mut self.memory
    }

    pub fn write_log(&self) -> &[WriteRecord] {
        &self.write_log
    }

    pub fn stall_cycles(&self) -> u64 {
        self.stall_cycles
    }

    pub fn beats_served(&self) -> u64 {
        self.beats_served
    }

    /// Resolve a whole burst. Stops after the first non-OKAY beat; the
    /// remaining beats are never presented to memory.
    pub fn respond(&mut self, txn: &BurstTransaction, payload: &[u8]) -> Vec<BeatOutcome> {
        let beat_bytes = txn.beat_bytes as usize;
        let mut outcomes = Vec::with_capacity(txn.beat_count as usize);
        for beat in 0..txn.beat_count {
            let data = match txn.direction {
                Direction::Read => None,
                Direction::Write => {
                    let start = beat as usize * beat_bytes;
                    payload.get(start..start + beat_bytes)
                }
            };
            let outcome = self.respond_beat(txn, beat, data);
            let okay = outcome.response.is_okay();
            outcomes.push(outcome);
            if !okay {
                break;
            }
        }
        outcomes
    }

    fn burst_ordinal(&mut self, direction: Direction, beat: u32) -> u32 {
        let ch = channel(direction);
        if beat == 0 {
            self.current_burst[ch] = self.bursts_seen[ch];
            self.bursts_seen[ch] += 1;
        }
        self.current_burst[ch]
    }

    fn forced_response(&self, direction: Direction, burst: u32, beat: u32) -> Option<Response> {
        self.injections
            .iter()
            .filter(|i| !i.response.is_okay())
            .find(|i| i.channel == direction && i.burst == burst && i.beat == beat)
            .map(|i| i.response)
    }
}

impl BusResponder for MemoryResponder {
    fn respond_beat(
        &mut self,
        txn: &BurstTransaction,
        beat: u32,
        write_data: Option<&[u8]>,
    ) -> BeatOutcome {
        let burst = self.burst_ordinal(txn.direction, beat);
        let stall = self.stall.next();
        let wait_cycles = self.latency.next() + stall;
        self.cycles += wait_cycles as u64;
        self.stall_cycles += stall as u64;
        self.beats_served += 1;

        let address = txn.beat_address(beat);
        let forced = self.forced_response(txn.direction, burst, beat);
        let mut outcome = BeatOutcome {
            beat,
            address,
            response: Response::Okay,
            data: None,
            accepted: false,
            wait_cycles,
        };

        match txn.direction {
            Direction::Read => match forced {
                Some(response) => outcome.response = response,
                None => match self.memory.read_slice(address, txn.beat_bytes as usize) {
                    Some(bytes) => outcome.data = Some(bytes.to_vec()),
                    None => outcome.response = Response::DecErr,
                },
            },
            Direction::Write => match (forced, write_data) {
                (Some(response), _) => outcome.response = response,
                (None, Some(bytes)) => {
                    if self.memory.write_slice(address, bytes) {
                        outcome.accepted = true;
                        self.write_log
                            .extend(bytes.iter().enumerate().map(|(i, &value)| WriteRecord {
                                address: address + i as u64,
                                value,
                                seq: txn.seq,
                            }));
                    } else {
                        outcome.response = Response::DecErr;
                    }
                }
                (None, None) => {
                    tracing::warn!("Write beat {} of burst {} carried no data", beat, txn.seq);
                    outcome.response = Response::SlvErr;
                }
            },
        }

        tracing::debug!(
            "{:?} burst {} beat {} @ {:#x}: {:?} after {} cycles",
            txn.direction,
            burst,
            beat,
            address,
            outcome.response,
            wait_cycles
        );

        outcome
    }

    fn cycles(&self) -> u64 {
        self.cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmasim_config::MemoryFill;

    fn txn(seq: u32, direction: Direction, address: u64, beat_count: u32) -> BurstTransaction {
        BurstTransaction {
            seq,
            index: seq / 2,
            direction,
            address,
            beat_count,
            beat_bytes: 4,
        }
    }

    fn responder(config: &ResponderConfig) -> MemoryResponder {
        let mut mem = LinearMemory::new(0x1000, 0);
        mem.fill(&MemoryFill::Incrementing);
        MemoryResponder::new(mem, config)
    }

    #[test]
    fn test_read_returns_source_data() {
        let mut r = responder(&ResponderConfig::default());
        let outcomes = r.respond(&txn(0, Direction::Read, 0x10, 2), &[]);
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].data, Some(vec![0x10, 0x11, 0x12, 0x13]));
        assert_eq!(outcomes[1].data, Some(vec![0x14, 0x15, 0x16, 0x17]));
        assert!(outcomes.iter().all(|o| o.response == Response::Okay));
        assert!(r.write_log().is_empty());
    }

    #[test]
    fn test_okay_write_updates_memory_and_log() {
        let mut r = responder(&ResponderConfig::default());
        let outcomes = r.respond(&txn(1, Direction::Write, 0x800, 2), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(outcomes.iter().all(|o| o.accepted));
        assert_eq!(r.memory().read_slice(0x800, 8), Some(&[1, 2, 3, 4, 5, 6, 7, 8][..]));
        assert_eq!(r.write_log().len(), 8);
        assert_eq!(r.write_log()[7].address, 0x807);
        assert_eq!(r.write_log()[7].seq, 1);
    }

    #[test]
    fn test_injected_write_error_aborts_burst() {
        let mut r = responder(&ResponderConfig::default());
        r.arm(&[Injection {
            burst: 0,
            beat: 1,
            channel: Direction::Write,
            response: Response::SlvErr,
        }]);
        let outcomes = r.respond(&txn(1, Direction::Write, 0x800, 4), &[0xAA; 16]);
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[1].response, Response::SlvErr);
        assert!(!outcomes[1].accepted);
        // Only beat 0 reached memory.
        assert_eq!(r.write_log().len(), 4);
        assert_eq!(r.memory().read_u8(0x804), Some(0x04));
    }

    #[test]
    fn test_injection_counts_bursts_per_channel() {
        let mut r = responder(&ResponderConfig::default());
        r.arm(&[Injection {
            burst: 1,
            beat: 0,
            channel: Direction::Read,
            response: Response::DecErr,
        }]);
        assert!(r
            .respond(&txn(0, Direction::Read, 0x0, 1), &[])
            .iter()
            .all(|o| o.response.is_okay()));
        assert!(r
            .respond(&txn(1, Direction::Write, 0x800, 1), &[0; 4])
            .iter()
            .all(|o| o.response.is_okay()));
        let second_read = r.respond(&txn(2, Direction::Read, 0x4, 1), &[]);
        assert_eq!(second_read[0].response, Response::DecErr);
        assert_eq!(second_read[0].data, None);
    }

    #[test]
    fn test_forced_okay_is_inert() {
        let mut r = responder(&ResponderConfig::default());
        r.arm(&[Injection {
            burst: 0,
            beat: 0,
            channel: Direction::Write,
            response: Response::Okay,
        }]);
        let outcomes = r.respond(&txn(1, Direction::Write, 0x800, 1), &[9; 4]);
        assert!(outcomes[0].accepted);
    }

    #[test]
    fn test_out_of_memory_read_is_decode_error() {
        let mut r = responder(&ResponderConfig::default());
        let outcomes = r.respond(&txn(0, Direction::Read, 0xFFC, 2), &[]);
        assert_eq!(outcomes[0].response, Response::Okay);
        assert_eq!(outcomes[1].response, Response::DecErr);
    }

    #[test]
    fn test_latency_and_stall_accumulate() {
        let config = ResponderConfig {
            latency: LatencyProfile::Pattern {
                cycles: vec![1, 3],
            },
            stall: StallProfile::Periodic {
                every: 2,
                cycles: 10,
            },
        };
        let mut r = responder(&config);
        let outcomes = r.respond(&txn(0, Direction::Read, 0x0, 4), &[]);
        let waits: Vec<u32> = outcomes.iter().map(|o| o.wait_cycles).collect();
        assert_eq!(waits, vec![1, 13, 1, 13]);
        assert_eq!(r.cycles(), 28);
        assert_eq!(r.stall_cycles(), 20);
        assert_eq!(r.beats_served(), 4);
    }

    #[test]
    fn test_seeded_latency_within_bounds() {
        let config = ResponderConfig {
            latency: LatencyProfile::Seeded {
                min: 2,
                max: 6,
                seed: 11,
            },
            stall: StallProfile::Seeded {
                percent: 50,
                max_cycles: 3,
                seed: 5,
            },
        };
        let mut r = responder(&config);
        for o in r.respond(&txn(0, Direction::Read, 0x0, 16), &[]) {
            assert!((2..=9).contains(&o.wait_cycles));
        }
    }
}
