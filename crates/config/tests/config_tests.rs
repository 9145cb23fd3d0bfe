// DmaSim - DMA Engine Verification Model
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use dmasim_config::{
    parse_size, EngineConfig, ErrorKind, OutcomeKind, Scenario, ScenarioAssertion, StartPolicy,
    VerdictKind, WindowConfig,
};
use std::path::Path;

#[test]
fn test_bundled_scenarios_parse() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../scenarios");
    let mut count = 0;
    for entry in std::fs::read_dir(&dir).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().is_some_and(|e| e == "yaml") {
            Scenario::from_file(&path).unwrap_or_else(|e| panic!("{}: {:#}", path.display(), e));
            count += 1;
        }
    }
    assert!(count >= 10);
}

#[test]
fn test_size_units() {
    assert_eq!(parse_size("64KiB").unwrap(), 65536);
    assert_eq!(parse_size("64KB").unwrap(), 64000);
    assert_eq!(parse_size("4096").unwrap(), 4096);
    assert_eq!(parse_size(" 1MiB ").unwrap(), 1 << 20);
    assert!(parse_size("lots").is_err());
}

#[test]
fn test_expectations_and_assertions_parse() {
    let yaml = r#"
name: "expectations"
engine:
  start_policy: clear_on_start
  boundary: "4KiB"
transfers:
  - src: 0x1000
    dst: 0x2000
    length: 64
    irq_enable: false
    clear_before: false
    expect: { outcome: response_error, error: slave_error, bursts: 2, irq: false }
assertions:
  - expected_verdict: fail
  - memory_value: { address: 0x2000, expected_value: 0x03020100, width: 4, mask: 0xFFFF }
"#;
    let scenario = Scenario::from_yaml(yaml).unwrap();
    assert_eq!(scenario.engine.start_policy, StartPolicy::ClearOnStart);
    assert_eq!(scenario.engine.boundary_bytes().unwrap(), Some(4096));

    let t = &scenario.transfers[0];
    assert!(!t.irq_enable && !t.clear_before);
    let expect = t.expect.as_ref().unwrap();
    assert_eq!(expect.outcome, Some(OutcomeKind::ResponseError));
    assert_eq!(expect.error, Some(ErrorKind::SlaveError));
    assert_eq!(expect.bursts, Some(2));
    assert_eq!(expect.irq, Some(false));

    match &scenario.assertions[0] {
        ScenarioAssertion::ExpectedVerdict(v) => assert_eq!(v.expected_verdict, VerdictKind::Fail),
        other => panic!("unexpected assertion {:?}", other),
    }
    match &scenario.assertions[1] {
        ScenarioAssertion::MemoryValue(mv) => {
            assert_eq!(mv.memory_value.width, 4);
            assert_eq!(mv.memory_value.mask, Some(0xFFFF));
        }
        other => panic!("unexpected assertion {:?}", other),
    }
}

#[test]
fn test_memory_value_width_validated() {
    let yaml = r#"
name: "bad-width"
transfers:
  - { src: 0x0, dst: 0x100, length: 16 }
assertions:
  - memory_value: { address: 0x100, expected_value: 0, width: 3 }
"#;
    let err = Scenario::from_yaml(yaml).unwrap_err();
    assert!(format!("{:#}", err).contains("assertions[0].memory_value.width"));
}

#[test]
fn test_empty_transfer_list_rejected() {
    let yaml = r#"
name: "empty"
transfers: []
"#;
    let err = Scenario::from_yaml(yaml).unwrap_err();
    assert!(format!("{:#}", err).contains("at least one transfer"));
}

#[test]
fn test_window_limits() {
    let huge = EngineConfig {
        window: WindowConfig {
            base: 0,
            size: "1GiB".to_string(),
        },
        ..EngineConfig::default()
    };
    assert!(huge.validate().unwrap_err().to_string().contains("exceeds"));

    let wrapping = EngineConfig {
        window: WindowConfig {
            base: u64::MAX - 0xFF,
            size: "4KiB".to_string(),
        },
        ..EngineConfig::default()
    };
    assert!(wrapping.validate().unwrap_err().to_string().contains("overflows"));

    let unaligned = EngineConfig {
        window: WindowConfig {
            base: 0x1002,
            size: "4KiB".to_string(),
        },
        ..EngineConfig::default()
    };
    assert!(unaligned.validate().unwrap_err().to_string().contains("not aligned"));
}

#[test]
fn test_boundary_must_be_power_of_two() {
    let cfg = EngineConfig {
        boundary: Some("3000".to_string()),
        ..EngineConfig::default()
    };
    assert!(cfg.validate().unwrap_err().to_string().contains("power of two"));
}

#[test]
fn test_latency_pattern_must_not_be_empty() {
    let yaml = r#"
name: "empty-pattern"
responder:
  latency:
    pattern: { cycles: [] }
transfers:
  - { src: 0x0, dst: 0x100, length: 16 }
"#;
    let err = Scenario::from_yaml(yaml).unwrap_err();
    assert!(format!("{:#}", err).contains("latency.pattern"));
}
