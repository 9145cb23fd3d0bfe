// DmaSim - DMA Engine Verification Model
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Instant;
use tracing::{error, info};

use dmasim_config::{EngineConfig, Scenario, StartPolicy, WindowConfig};
use dmasim_core::burst::split;
use dmasim_core::scenario::{ScenarioReport, ScenarioRunner};
use dmasim_core::{BusGeometry, BurstTransaction, TransferDescriptor};

const EXIT_PASS: u8 = 0;
const EXIT_ASSERT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

const RESULT_SCHEMA_VERSION: &str = "1.0";

fn parse_u64_addr(s: &str) -> Result<u64, String> {
    let trimmed = s.trim();
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value '{}': {}", s, e))
    } else {
        u64::from_str(trimmed).map_err(|e| format!("Invalid value '{}': {}", s, e))
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "DmaSim DMA engine verification model", long_about = None)]
struct Cli {
    /// Enable beat-level tracing
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a scenario through the engine, reference model and scoreboard.
    Run(RunArgs),

    /// Print the burst breakdown of a single descriptor.
    Plan(PlanArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the scenario (YAML)
    #[arg(short = 'c', long)]
    scenario: PathBuf,

    /// Directory to write artifacts (result.json, junit.xml)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Optional path to write a JUnit XML report for CI systems
    #[arg(long)]
    junit: Option<PathBuf>,

    /// Print result.json to stdout
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct PlanArgs {
    #[arg(long, value_parser = parse_u64_addr)]
    src: u64,

    #[arg(long, value_parser = parse_u64_addr)]
    dst: u64,

    #[arg(long, value_parser = parse_u64_addr)]
    length: u64,

    #[arg(long, default_value = "4")]
    beat_bytes: u32,

    #[arg(long, default_value = "16")]
    max_burst_beats: u32,

    #[arg(long, value_parser = parse_u64_addr, default_value = "0")]
    window_base: u64,

    /// Window size, e.g. "64KiB"
    #[arg(long, default_value = "64KiB")]
    window_size: String,

    /// Optional burst boundary, e.g. "4KiB"
    #[arg(long)]
    boundary: Option<String>,

    /// Print the plan as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct RunResult {
    result_schema_version: String,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    scenario_hash: String,
    duration_ms: u64,
    config: RunConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<ScenarioReport>,
}

#[derive(Debug, Serialize, Clone)]
struct RunConfig {
    scenario: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so --json output on stdout stays machine-readable.
    let level = if cli.trace {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => run_scenario(args),
        Commands::Plan(args) => run_plan(args),
    }
}

fn load_scenario(path: &Path) -> anyhow::Result<(Scenario, String)> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read scenario {:?}", path))?;
    let text = std::str::from_utf8(&bytes)
        .with_context(|| format!("Scenario {:?} is not valid UTF-8", path))?;
    let scenario = Scenario::from_yaml(text)?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok((scenario, format!("{:x}", hasher.finalize())))
}

fn run_scenario(args: RunArgs) -> ExitCode {
    let start = Instant::now();
    let prepared = load_scenario(&args.scenario)
        .and_then(|(scenario, hash)| Ok((ScenarioRunner::new(scenario)?, hash)));
    let (mut runner, scenario_hash) = match prepared {
        Ok(p) => p,
        Err(e) => {
            let msg = format!("{:#}", e);
            error!("{}", msg);
            let result = RunResult {
                result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
                status: "error".to_string(),
                message: Some(msg),
                scenario_hash: String::new(),
                duration_ms: start.elapsed().as_millis() as u64,
                config: RunConfig {
                    scenario: args.scenario.clone(),
                },
                report: None,
            };
            write_outputs(&args, &result, "config error");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let (status, message, report, code) = match runner.run() {
        Ok(report) if report.passed => ("pass", None, Some(report), EXIT_PASS),
        Ok(report) => ("fail", None, Some(report), EXIT_ASSERT_FAIL),
        Err(e) => {
            error!("Simulation error: {}", e);
            ("error", Some(e.to_string()), None, EXIT_RUNTIME_ERROR)
        }
    };

    if let Some(report) = &report {
        for t in &report.transfers {
            info!(
                "Transfer {}: {:#x} -> {:#x} ({} bytes): {:?}, {} transactions, verdict {:?}",
                t.index,
                t.descriptor.src,
                t.descriptor.dst,
                t.descriptor.length,
                t.outcome,
                t.transactions,
                t.verdict.status
            );
            if let Some(d) = &t.verdict.divergence {
                error!("  {}", d);
            }
        }
        info!(
            "Scenario '{}': {} ({} cycles, {} bursts, {} beats)",
            report.name,
            status,
            report.cycles,
            report.metrics.bursts,
            report.metrics.beats
        );
    }

    let result = RunResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: status.to_string(),
        message,
        scenario_hash,
        duration_ms: start.elapsed().as_millis() as u64,
        config: RunConfig {
            scenario: args.scenario.clone(),
        },
        report,
    };
    write_outputs(&args, &result, "runtime error");
    ExitCode::from(code)
}

fn write_outputs(args: &RunArgs, result: &RunResult, error_kind: &str) {
    if args.json {
        match serde_json::to_string_pretty(result) {
            Ok(s) => println!("{}", s),
            Err(e) => error!("Failed to serialize result: {}", e),
        }
    }

    if let Some(output_dir) = &args.output_dir {
        if let Err(e) = std::fs::create_dir_all(output_dir) {
            error!("Failed to create output directory {:?}: {}", output_dir, e);
        } else {
            let result_path = output_dir.join("result.json");
            match std::fs::File::create(&result_path) {
                Ok(f) => {
                    if let Err(e) = serde_json::to_writer_pretty(f, result) {
                        error!("Failed to write result.json: {}", e);
                    }
                }
                Err(e) => error!("Failed to create result.json: {}", e),
            }

            let junit_path = output_dir.join("junit.xml");
            if let Err(e) = write_junit_xml(&junit_path, result, error_kind) {
                error!("Failed to write junit.xml: {}", e);
            }
        }
    }

    if let Some(junit_path) = &args.junit {
        if let Some(parent) = junit_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = write_junit_xml(junit_path, result, error_kind) {
            error!("Failed to write JUnit report {:?}: {}", junit_path, e);
        }
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn write_junit_xml(path: &Path, result: &RunResult, error_kind: &str) -> std::io::Result<()> {
    let time_secs = result.duration_ms as f64 / 1000.0;
    let suite = result
        .report
        .as_ref()
        .map_or("dmasim", |r| r.name.as_str());

    let mut details = String::new();
    details.push_str(&format!(
        "result_schema_version={}\n",
        RESULT_SCHEMA_VERSION
    ));
    details.push_str(&format!("status={}\n", result.status));
    if let Some(msg) = &result.message {
        details.push_str(&format!("message={}\n", msg));
    }
    details.push_str(&format!("scenario={}\n", result.config.scenario.display()));
    details.push_str(&format!("scenario_hash={}\n", result.scenario_hash));
    if let Some(report) = &result.report {
        details.push_str(&format!("cycles={}\n", report.cycles));
        details.push_str(&format!("scoreboard_passed={}\n", report.scoreboard_passed));
        details.push_str(&format!("image_matches={}\n", report.image_matches));
    }

    let mut tests: u64 = 0;
    let mut failures: u64 = 0;
    let mut errors: u64 = 0;
    let mut testcases = String::new();

    // The "run" testcase carries config and runtime errors.
    tests += 1;
    testcases.push_str(&format!(
        "  <testcase classname=\"dmasim\" name=\"run\" time=\"{:.6}\">\n",
        time_secs
    ));
    if result.status == "error" {
        errors += 1;
        testcases.push_str(&format!(
            "    <error message=\"{}\">{}</error>\n",
            xml_escape(error_kind),
            xml_escape(&details)
        ));
    }
    testcases.push_str("  </testcase>\n");

    if let Some(report) = &result.report {
        for t in &report.transfers {
            tests += 1;
            let name = format!(
                "transfer {}: {:#x} -> {:#x} ({} bytes)",
                t.index, t.descriptor.src, t.descriptor.dst, t.descriptor.length
            );
            testcases.push_str(&format!(
                "  <testcase classname=\"dmasim\" name=\"{}\" time=\"0.000000\">\n",
                xml_escape(&name)
            ));
            if !t.passed() {
                failures += 1;
                let mut reason = String::new();
                if let Some(d) = &t.verdict.divergence {
                    reason.push_str(&format!("{}\n", d));
                }
                for f in &t.expectation_failures {
                    reason.push_str(&format!(
                        "expected {} {}, got {}\n",
                        f.field, f.expected, f.actual
                    ));
                }
                testcases.push_str(&format!(
                    "    <failure message=\"transfer failed\">{}</failure>\n",
                    xml_escape(&format!("{}\n{}\n{}", name, reason, details))
                ));
            }
            testcases.push_str("  </testcase>\n");
        }

        for (idx, a) in report.assertions.iter().enumerate() {
            tests += 1;
            let name = format!("assertion {}", idx + 1);
            testcases.push_str(&format!(
                "  <testcase classname=\"dmasim\" name=\"{}\" time=\"0.000000\">\n",
                xml_escape(&name)
            ));
            if !a.passed {
                failures += 1;
                testcases.push_str(&format!(
                    "    <failure message=\"assertion failed\">{}</failure>\n",
                    xml_escape(&format!(
                        "{:?}\nactual={}\n\n{}",
                        a.assertion,
                        a.actual.as_deref().unwrap_or("-"),
                        details
                    ))
                ));
            }
            testcases.push_str("  </testcase>\n");
        }
    }

    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');
    xml.push_str(&format!(
        r#"<testsuite name="{}" tests="{}" failures="{}" errors="{}" time="{:.6}">"#,
        xml_escape(suite),
        tests,
        failures,
        errors,
        time_secs
    ));
    xml.push('\n');
    xml.push_str("  <properties>\n");
    xml.push_str(&format!(
        "    <property name=\"result_schema_version\" value=\"{}\"/>\n",
        xml_escape(RESULT_SCHEMA_VERSION)
    ));
    xml.push_str(&format!(
        "    <property name=\"scenario_hash\" value=\"{}\"/>\n",
        xml_escape(&result.scenario_hash)
    ));
    xml.push_str("  </properties>\n");
    xml.push_str(&testcases);
    xml.push_str("</testsuite>\n");

    std::fs::write(path, xml)
}

fn run_plan(args: PlanArgs) -> ExitCode {
    let engine = EngineConfig {
        beat_bytes: args.beat_bytes,
        max_burst_beats: args.max_burst_beats,
        window: WindowConfig {
            base: args.window_base,
            size: args.window_size.clone(),
        },
        boundary: args.boundary.clone(),
        start_policy: StartPolicy::default(),
    };
    let geometry = match BusGeometry::from_config(&engine) {
        Ok(g) => g,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let desc = TransferDescriptor::new(args.src, args.dst, args.length);
    let bursts = match split(desc, &geometry) {
        Ok(b) => b,
        Err(e) => {
            error!("Descriptor rejected at start: {} (error code {})", e, e.kind().code());
            return ExitCode::from(EXIT_ASSERT_FAIL);
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&bursts) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                error!("Failed to serialize plan: {}", e);
                return ExitCode::from(EXIT_RUNTIME_ERROR);
            }
        }
    } else {
        print_plan(&bursts);
    }
    ExitCode::from(EXIT_PASS)
}

fn print_plan(bursts: &[BurstTransaction]) {
    println!("{:>4}  {:<5}  {:>5}  {:>12}  {:>5}  {:>6}", "seq", "dir", "burst", "address", "beats", "bytes");
    for b in bursts {
        println!(
            "{:>4}  {:<5}  {:>5}  {:>#12x}  {:>5}  {:>6}",
            b.seq,
            format!("{:?}", b.direction).to_lowercase(),
            b.index,
            b.address,
            b.beat_count,
            b.bytes()
        );
    }
    let chunks = bursts.len() / 2;
    println!("{} chunks, {} transactions", chunks, bursts.len());
}
