// DmaSim - DMA Engine Verification Model
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push("dmasim-tests");
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    dir.push(format!("{}-{}", prefix, nonce));
    std::fs::create_dir_all(&dir).expect("Failed to create temp dir");
    dir
}

#[test]
fn test_run_writes_result_and_junit() {
    let output_dir = temp_dir("artifacts");
    let scenario = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../scenarios/read_decerr.yaml");

    let output = Command::new(env!("CARGO_BIN_EXE_dmasim"))
        .args([
            "run",
            "--scenario",
            scenario.to_str().unwrap(),
            "--output-dir",
            output_dir.to_str().unwrap(),
        ])
        .output()
        .expect("Failed to run dmasim");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let result: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(output_dir.join("result.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(result["status"], "pass");
    assert_eq!(result["report"]["transfers"][0]["transactions"], 3);
    assert_eq!(result["report"]["scoreboard_passed"], true);

    let junit = std::fs::read_to_string(output_dir.join("junit.xml")).unwrap();
    assert!(junit.contains(r#"<testsuite name="read-decerr" tests="4" failures="0" errors="0""#));
    assert!(junit.contains("transfer 0: 0x1080 -&gt; 0x2000 (96 bytes)"));
}

#[test]
fn test_config_error_still_writes_artifacts() {
    let dir = temp_dir("config-error");
    let scenario = dir.join("broken.yaml");
    std::fs::write(&scenario, "schema_version: \"2.0\"\nname: x\ntransfers: []\n").unwrap();
    let junit_path = dir.join("reports/junit.xml");

    let output = Command::new(env!("CARGO_BIN_EXE_dmasim"))
        .args([
            "run",
            "--scenario",
            scenario.to_str().unwrap(),
            "--output-dir",
            dir.join("out").to_str().unwrap(),
            "--junit",
            junit_path.to_str().unwrap(),
        ])
        .output()
        .expect("Failed to run dmasim");
    assert_eq!(output.status.code(), Some(2));

    let result: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.join("out/result.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(result["status"], "error");
    assert!(result["message"]
        .as_str()
        .unwrap()
        .contains("Unsupported schema_version"));

    let junit = std::fs::read_to_string(&junit_path).unwrap();
    assert!(junit.contains(r#"errors="1""#));
    assert!(junit.contains("config error"));
}
