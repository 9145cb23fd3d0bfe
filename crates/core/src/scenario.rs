// DmaSim - DMA Engine Verification Model
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::descriptor::{BusGeometry, TransferDescriptor};
use crate::engine::{DmaEngine, TransferTrace};
use crate::memory::LinearMemory;
use crate::metrics::{MetricsSummary, TransferMetrics};
use crate::reference::{Prediction, ReferenceModel, Stimulus};
use crate::responder::MemoryResponder;
use crate::scoreboard::{ActualExecution, Scoreboard, Verdict};
use crate::status::{StatusFlags, StatusSnapshot};
use crate::SimResult;
use anyhow::Context;
use dmasim_config::{
    ErrorKind, OutcomeKind, Scenario, ScenarioAssertion, TransferConfig, TransferExpectation,
    VerdictKind,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpectationFailure {
    pub field: &'static str,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    pub index: usize,
    pub descriptor: TransferDescriptor,
    pub outcome: OutcomeKind,
    pub error: Option<ErrorKind>,
    pub transactions: u32,
    pub status: StatusSnapshot,
    pub irq: bool,
    pub cycles: u64,
    pub verdict: Verdict,
    pub expectation_failures: Vec<ExpectationFailure>,
}

impl TransferReport {
    pub fn passed(&self) -> bool {
        self.verdict.passed() && self.expectation_failures.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AssertionReport {
    pub assertion: ScenarioAssertion,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub transfers: Vec<TransferReport>,
    pub assertions: Vec<AssertionReport>,
    /// Every transfer matched its prediction.
    pub scoreboard_passed: bool,
    /// Actual image equals the initial image with all predicted deltas applied.
    pub image_matches: bool,
    pub passed: bool,
    pub cycles: u64,
    pub stall_cycles: u64,
    pub metrics: MetricsSummary,
}

/// Runs every transfer of a scenario through engine, reference model and
/// scoreboard, in order, against one shared memory.
#[derive(Debug)]
pub struct ScenarioRunner {
    scenario: Scenario,
    engine: DmaEngine,
    responder: MemoryResponder,
    reference: ReferenceModel,
    scoreboard: Scoreboard,
    expected_image: LinearMemory,
    metrics: Arc<TransferMetrics>,
}

impl ScenarioRunner {
    pub fn new(scenario: Scenario) -> anyhow::Result<Self> {
        let geometry = BusGeometry::from_config(&scenario.engine)?;
        let size = usize::try_from(geometry.window_size)
            .context("engine.window.size does not fit in host memory")?;
        let memory = LinearMemory::from_config(size, geometry.window_base, &scenario.memory);
        let policy = scenario.engine.start_policy;

        let metrics = Arc::new(TransferMetrics::new());
        let mut engine = DmaEngine::new(geometry, policy);
        engine.observers.push(metrics.clone());

        Ok(Self {
            expected_image: memory.clone(),
            responder: MemoryResponder::new(memory, &scenario.responder),
            reference: ReferenceModel::new(&geometry, policy),
            scoreboard: Scoreboard::new(),
            engine,
            metrics,
            scenario,
        })
    }

    pub fn engine(&self) -> &DmaEngine {
        &self.engine
    }

    pub fn memory(&self) -> &LinearMemory {
        self.responder.memory()
    }

    pub fn run(&mut self) -> SimResult<ScenarioReport> {
        info!(
            "Running scenario '{}' ({} transfers)",
            self.scenario.name,
            self.scenario.transfers.len()
        );

        let transfers = self.scenario.transfers.clone();
        let mut reports = Vec::with_capacity(transfers.len());
        for (index, transfer) in transfers.iter().enumerate() {
            reports.push(self.run_transfer(index, transfer)?);
        }

        let scoreboard_passed = self.scoreboard.passed();
        let image_matches = self.expected_image == *self.responder.memory();
        let assertions: Vec<AssertionReport> = self
            .scenario
            .assertions
            .iter()
            .map(|a| self.evaluate(a, scoreboard_passed))
            .collect();

        let verdict_asserted = self
            .scenario
            .assertions
            .iter()
            .any(|a| matches!(a, ScenarioAssertion::ExpectedVerdict(_)));
        let transfers_passed = reports.iter().all(|r| r.expectation_failures.is_empty());
        let passed = transfers_passed
            && assertions.iter().all(|a| a.passed)
            && (verdict_asserted || (scoreboard_passed && image_matches));

        if passed {
            info!("Scenario '{}' passed", self.scenario.name);
        } else {
            warn!("Scenario '{}' failed", self.scenario.name);
        }

        Ok(ScenarioReport {
            name: self.scenario.name.clone(),
            transfers: reports,
            assertions,
            scoreboard_passed,
            image_matches,
            passed,
            cycles: self.engine.now(),
            stall_cycles: self.responder.stall_cycles(),
            metrics: self.metrics.summary(),
        })
    }

    fn run_transfer(&mut self, index: usize, transfer: &TransferConfig) -> SimResult<TransferReport> {
        if transfer.clear_before {
            self.engine.clear_status(StatusFlags::STICKY);
        }
        self.engine.set_irq_enable(transfer.irq_enable);

        let desc = TransferDescriptor::new(transfer.src, transfer.dst, transfer.length);
        self.engine.program(desc);
        self.responder.arm(&transfer.injections);

        let stimulus = Stimulus {
            descriptor: desc,
            irq_enable: transfer.irq_enable,
            prior: self.engine.status().snapshot(),
        };
        let prediction =
            self.reference
                .predict(&stimulus, &transfer.injections, &self.expected_image);
        prediction.apply(&mut self.expected_image);

        let log_mark = self.responder.write_log().len();
        let trace = match self.engine.request_start() {
            Ok(()) => {
                self.engine.run_to_completion(&mut self.responder)?;
                self.engine.take_trace()
            }
            Err(_) => None,
        }
        .unwrap_or_else(|| self.rejected_trace(desc));

        let actual = ActualExecution {
            trace: &trace,
            writes: &self.responder.write_log()[log_mark..],
            memory: self.responder.memory(),
        };
        let verdict = self.scoreboard.check(index, &actual, &prediction).clone();

        let expectation_failures = transfer
            .expect
            .as_ref()
            .map(|e| check_expectation(e, &trace))
            .unwrap_or_default();
        for failure in &expectation_failures {
            warn!(
                "Transfer {}: expected {} {}, got {}",
                index, failure.field, failure.expected, failure.actual
            );
        }

        Ok(report(index, &trace, &prediction, verdict, expectation_failures))
    }

    fn rejected_trace(&self, desc: TransferDescriptor) -> TransferTrace {
        TransferTrace::rejected(
            desc,
            self.engine.now(),
            self.engine.status().snapshot(),
            self.engine.irq(),
        )
    }

    fn evaluate(&self, assertion: &ScenarioAssertion, scoreboard_passed: bool) -> AssertionReport {
        let (passed, actual) = match assertion {
            ScenarioAssertion::ExpectedVerdict(v) => {
                let actual = if scoreboard_passed {
                    VerdictKind::Pass
                } else {
                    VerdictKind::Fail
                };
                (actual == v.expected_verdict, format!("{:?}", actual).to_lowercase())
            }
            ScenarioAssertion::MemoryValue(mv) => {
                let mv = &mv.memory_value;
                let mask = mv.mask.unwrap_or(u64::MAX);
                match self.responder.memory().read_le(mv.address, mv.width) {
                    Some(value) => (
                        value & mask == mv.expected_value & mask,
                        format!("{:#x}", value),
                    ),
                    None => (false, "unmapped".to_string()),
                }
            }
        };
        AssertionReport {
            assertion: assertion.clone(),
            passed,
            actual: Some(actual),
        }
    }
}

fn check_expectation(expect: &TransferExpectation, trace: &TransferTrace) -> Vec<ExpectationFailure> {
    let mut failures = Vec::new();
    let mut compare = |field: &'static str, expected: String, actual: String| {
        if expected != actual {
            failures.push(ExpectationFailure {
                field,
                expected,
                actual,
            });
        }
    };

    let outcome = trace.outcome.map(|o| o.kind());
    if let Some(want) = expect.outcome {
        compare("outcome", format!("{:?}", Some(want)), format!("{:?}", outcome));
    }
    if let Some(want) = expect.error {
        let error = trace.final_status.error;
        compare("error", format!("{:?}", Some(want)), format!("{:?}", error));
    }
    if let Some(want) = expect.bursts {
        compare("bursts", want.to_string(), trace.transactions().to_string());
    }
    if let Some(want) = expect.irq {
        compare("irq", want.to_string(), trace.final_irq.to_string());
    }
    failures
}

fn report(
    index: usize,
    trace: &TransferTrace,
    prediction: &Prediction,
    verdict: Verdict,
    expectation_failures: Vec<ExpectationFailure>,
) -> TransferReport {
    TransferReport {
        index,
        descriptor: trace.descriptor,
        outcome: trace.outcome.map_or(prediction.outcome, |o| o.kind()),
        error: trace.final_status.error,
        transactions: trace.transactions(),
        status: trace.final_status,
        irq: trace.final_irq,
        cycles: trace.cycles(),
        verdict,
        expectation_failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoreboard::CheckedField;

    const BASE: &str = r#"
schema_version: "1.0"
name: "runner"
memory:
  fill: incrementing
"#;

    fn run(transfers: &str) -> (ScenarioReport, ScenarioRunner) {
        let yaml = format!("{}{}", BASE, transfers);
        let scenario = Scenario::from_yaml(&yaml).unwrap();
        let mut runner = ScenarioRunner::new(scenario).unwrap();
        let report = runner.run().unwrap();
        (report, runner)
    }

    #[test]
    fn test_clean_transfer_passes() {
        let (report, runner) = run(
            r#"
transfers:
  - src: 0x1000
    dst: 0x2000
    length: 64
    expect:
      outcome: done
      bursts: 2
      irq: true
"#,
        );
        assert!(report.passed, "{:#?}", report);
        assert!(report.image_matches);
        assert_eq!(report.transfers[0].transactions, 2);
        assert_eq!(
            runner.memory().read_slice(0x2000, 4),
            Some(&[0x00, 0x01, 0x02, 0x03][..])
        );
        assert_eq!(report.metrics.bursts, 2);
        assert_eq!(report.metrics.write_beats, 16);
    }

    #[test]
    fn test_sticky_rejection_is_predicted() {
        let (report, runner) = run(
            r#"
transfers:
  - src: 0x1000
    dst: 0x2000
    length: 16
  - src: 0x1000
    dst: 0x3000
    length: 16
    clear_before: false
    expect:
      outcome: rejected
      bursts: 0
  - src: 0x1000
    dst: 0x3000
    length: 16
"#,
        );
        assert!(report.passed, "{:#?}", report);
        assert_eq!(report.transfers[1].outcome, OutcomeKind::Rejected);
        assert_eq!(report.metrics.start_rejections, 1);
        assert_eq!(runner.engine().start_while_busy(), 1);
        assert_eq!(report.transfers[2].outcome, OutcomeKind::Done);
    }

    #[test]
    fn test_prediction_ignores_corrupted_actual_memory() {
        let yaml = format!(
            "{}{}",
            BASE,
            r#"
transfers:
  - src: 0x1000
    dst: 0x2000
    length: 16
  - src: 0x2000
    dst: 0x3000
    length: 16
"#
        );
        let mut runner = ScenarioRunner::new(Scenario::from_yaml(&yaml).unwrap()).unwrap();
        runner.responder.memory_mut().write_u8(0x1000, 0xEE);
        let report = runner.run().unwrap();

        assert!(!report.passed);
        assert!(!report.image_matches);
        let d = report.transfers[0].verdict.divergence.clone().unwrap();
        assert_eq!(d.field, CheckedField::Memory);
        assert_eq!(d.expected, "0x00 @ 0x2000");
        assert_eq!(d.actual, "0xee @ 0x2000");
        assert_eq!(d.transaction_index, Some(1));
        // The chained copy is judged against the expected image too.
        let d = report.transfers[1].verdict.divergence.clone().unwrap();
        assert_eq!(d.expected, "0x00 @ 0x3000");
    }

    #[test]
    fn test_failed_expectation_fails_scenario() {
        let (report, _) = run(
            r#"
transfers:
  - src: 0x1000
    dst: 0x2000
    length: 64
    expect:
      bursts: 3
"#,
        );
        assert!(report.scoreboard_passed);
        assert!(!report.passed);
        assert_eq!(report.transfers[0].expectation_failures[0].field, "bursts");
    }

    #[test]
    fn test_memory_assertions() {
        let (report, _) = run(
            r#"
transfers:
  - src: 0x1000
    dst: 0x2000
    length: 16
assertions:
  - memory_value:
      address: 0x2004
      expected_value: 0x07060504
      width: 4
  - memory_value:
      address: 0x2010
      expected_value: 0x10
  - expected_verdict: pass
"#,
        );
        assert!(report.passed, "{:#?}", report);
        assert!(report.assertions.iter().all(|a| a.passed));
    }
}
