// DmaSim - DMA Engine Verification Model
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SCHEMA_VERSION: &str = "1.0";

/// The whole window is backed by one byte vector.
pub const MAX_WINDOW_BYTES: u64 = 256 * 1024 * 1024;

/// Default schema version for YAML scenarios
fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

fn default_true() -> bool {
    true
}

fn default_beat_bytes() -> u32 {
    4
}

fn default_max_burst_beats() -> u32 {
    16
}

fn default_window_size() -> String {
    "64KiB".to_string()
}

/// Bus response code returned per beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Response {
    #[serde(alias = "OKAY")]
    Okay,
    #[serde(alias = "SLVERR", alias = "slave_error")]
    SlvErr,
    #[serde(alias = "DECERR", alias = "decode_error")]
    DecErr,
}

impl Response {
    pub fn is_okay(self) -> bool {
        matches!(self, Response::Okay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Read,
    Write,
}

/// Error code reported in the STATUS/ERRCODE register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ZeroLength,
    Misaligned,
    OutOfRange,
    Overlap,
    SlaveError,
    DecodeError,
}

impl ErrorKind {
    /// Encoding used by the ERRCODE register field. Zero means "no error".
    pub fn code(self) -> u8 {
        match self {
            ErrorKind::ZeroLength => 1,
            ErrorKind::Misaligned => 2,
            ErrorKind::OutOfRange => 3,
            ErrorKind::Overlap => 4,
            ErrorKind::SlaveError => 5,
            ErrorKind::DecodeError => 6,
        }
    }

    pub fn is_start_time(self) -> bool {
        matches!(
            self,
            ErrorKind::ZeroLength | ErrorKind::Misaligned | ErrorKind::OutOfRange | ErrorKind::Overlap
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Done,
    StartError,
    ResponseError,
    /// Start-request refused because the engine was busy or status was uncleared.
    Rejected,
}

/// What a start-request does while DONE or ERR is still set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPolicy {
    /// Reject with StartWhileBusy until software clears the sticky bits.
    #[default]
    RequireClear,
    /// Accept the start and clear DONE/ERR as part of it.
    ClearOnStart,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WindowConfig {
    #[serde(default)]
    pub base: u64,
    #[serde(default = "default_window_size")]
    pub size: String, // e.g. "64KiB"
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            base: 0,
            size: default_window_size(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default = "default_beat_bytes")]
    pub beat_bytes: u32,
    #[serde(default = "default_max_burst_beats")]
    pub max_burst_beats: u32,
    #[serde(default)]
    pub window: WindowConfig,
    /// Optional address boundary no burst may cross, e.g. "4KiB".
    #[serde(default)]
    pub boundary: Option<String>,
    #[serde(default)]
    pub start_policy: StartPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            beat_bytes: default_beat_bytes(),
            max_burst_beats: default_max_burst_beats(),
            window: WindowConfig::default(),
            boundary: None,
            start_policy: StartPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn window_size(&self) -> Result<u64> {
        parse_size(&self.window.size)
            .with_context(|| format!("Invalid engine.window.size '{}'", self.window.size))
    }

    pub fn boundary_bytes(&self) -> Result<Option<u64>> {
        self.boundary
            .as_deref()
            .map(|b| parse_size(b).with_context(|| format!("Invalid engine.boundary '{}'", b)))
            .transpose()
    }

    pub fn validate(&self) -> Result<()> {
        if !self.beat_bytes.is_power_of_two() || self.beat_bytes > 128 {
            anyhow::bail!(
                "engine.beat_bytes must be a power of two between 1 and 128, got {}",
                self.beat_bytes
            );
        }
        if self.max_burst_beats == 0 || self.max_burst_beats > 256 {
            anyhow::bail!(
                "engine.max_burst_beats must be between 1 and 256, got {}",
                self.max_burst_beats
            );
        }

        let size = self.window_size()?;
        if size == 0 {
            anyhow::bail!("engine.window.size must be greater than zero");
        }
        if size > MAX_WINDOW_BYTES {
            anyhow::bail!(
                "engine.window.size {} exceeds the {} byte limit of the simulated memory",
                size,
                MAX_WINDOW_BYTES
            );
        }
        if self.window.base.checked_add(size).is_none() {
            anyhow::bail!("engine.window overflows the 64-bit address space");
        }
        if self.window.base % self.beat_bytes as u64 != 0 {
            anyhow::bail!(
                "engine.window.base {:#x} is not aligned to beat_bytes {}",
                self.window.base,
                self.beat_bytes
            );
        }

        if let Some(boundary) = self.boundary_bytes()? {
            if !boundary.is_power_of_two() {
                anyhow::bail!("engine.boundary must be a power of two, got {}", boundary);
            }
            if boundary < self.beat_bytes as u64 {
                anyhow::bail!(
                    "engine.boundary ({}) must be at least one beat ({} bytes)",
                    boundary,
                    self.beat_bytes
                );
            }
        }

        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemoryFill {
    #[default]
    Zero,
    /// Byte at address A holds `A & 0xFF`.
    Incrementing,
    Seeded {
        seed: u64,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MemorySegment {
    pub base: u64,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    #[serde(default)]
    pub fill: MemoryFill,
    #[serde(default)]
    pub segments: Vec<MemorySegment>,
}

/// Per-beat response delay, in cycles.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LatencyProfile {
    Fixed { cycles: u32 },
    /// Cycles repeat over the beats of the scenario.
    Pattern { cycles: Vec<u32> },
    Seeded { min: u32, max: u32, seed: u64 },
}

impl Default for LatencyProfile {
    fn default() -> Self {
        LatencyProfile::Fixed { cycles: 1 }
    }
}

/// Responder backpressure applied on top of latency.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StallProfile {
    #[default]
    None,
    Periodic { every: u32, cycles: u32 },
    Seeded { percent: u8, max_cycles: u32, seed: u64 },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct ResponderConfig {
    #[serde(default)]
    pub latency: LatencyProfile,
    #[serde(default)]
    pub stall: StallProfile,
}

impl ResponderConfig {
    pub fn validate(&self) -> Result<()> {
        match &self.latency {
            LatencyProfile::Pattern { cycles } if cycles.is_empty() => {
                anyhow::bail!("responder.latency.pattern must list at least one value")
            }
            LatencyProfile::Seeded { min, max, .. } if min > max => {
                anyhow::bail!("responder.latency.seeded: min ({}) exceeds max ({})", min, max)
            }
            _ => {}
        }
        match &self.stall {
            StallProfile::Periodic { every: 0, .. } => {
                anyhow::bail!("responder.stall.periodic.every must be greater than zero")
            }
            StallProfile::Seeded { percent, .. } if *percent > 100 => {
                anyhow::bail!("responder.stall.seeded.percent must be at most 100")
            }
            _ => {}
        }
        Ok(())
    }
}

/// A forced response on one beat of one burst.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Injection {
    /// Burst index counted within `channel`.
    pub burst: u32,
    pub beat: u32,
    #[serde(default = "default_injection_channel")]
    pub channel: Direction,
    pub response: Response,
}

fn default_injection_channel() -> Direction {
    Direction::Write
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct TransferExpectation {
    #[serde(default)]
    pub outcome: Option<OutcomeKind>,
    #[serde(default)]
    pub error: Option<ErrorKind>,
    /// Bus transactions issued, read and write bursts together.
    #[serde(default)]
    pub bursts: Option<u32>,
    #[serde(default)]
    pub irq: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TransferConfig {
    pub src: u64,
    pub dst: u64,
    pub length: u64,
    #[serde(default = "default_true")]
    pub irq_enable: bool,
    /// Write DONE|ERR to STATUS before starting.
    #[serde(default = "default_true")]
    pub clear_before: bool,
    #[serde(default)]
    pub injections: Vec<Injection>,
    #[serde(default)]
    pub expect: Option<TransferExpectation>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerdictKind {
    Pass,
    Fail,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct VerdictAssertion {
    pub expected_verdict: VerdictKind,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MemoryValueDetails {
    pub address: u64,
    pub expected_value: u64,
    /// Access width in bytes (1, 2, 4 or 8), little endian.
    #[serde(default = "default_value_width")]
    pub width: u8,
    #[serde(default)]
    pub mask: Option<u64>,
}

fn default_value_width() -> u8 {
    1
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MemoryValueAssertion {
    pub memory_value: MemoryValueDetails,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum ScenarioAssertion {
    ExpectedVerdict(VerdictAssertion),
    MemoryValue(MemoryValueAssertion),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub responder: ResponderConfig,
    pub transfers: Vec<TransferConfig>,
    #[serde(default)]
    pub assertions: Vec<ScenarioAssertion>,
}

impl Scenario {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario at {:?}", path.as_ref()))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let scenario: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Scenario YAML")?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SCHEMA_VERSION {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '{}'",
                self.schema_version,
                SCHEMA_VERSION
            );
        }

        if self.name.trim().is_empty() {
            anyhow::bail!("Scenario 'name' cannot be empty");
        }

        if self.transfers.is_empty() {
            anyhow::bail!("Scenario must list at least one transfer");
        }

        self.engine.validate()?;
        self.responder.validate()?;

        let window_end = self.engine.window.base + self.engine.window_size()?;
        for (i, seg) in self.memory.segments.iter().enumerate() {
            let end = seg.base.checked_add(seg.bytes.len() as u64);
            if seg.base < self.engine.window.base || end.map_or(true, |e| e > window_end) {
                anyhow::bail!(
                    "memory.segments[{}] at {:#x} (+{} bytes) lies outside the window",
                    i,
                    seg.base,
                    seg.bytes.len()
                );
            }
        }

        for (i, assertion) in self.assertions.iter().enumerate() {
            if let ScenarioAssertion::MemoryValue(mv) = assertion {
                if !matches!(mv.memory_value.width, 1 | 2 | 4 | 8) {
                    anyhow::bail!(
                        "assertions[{}].memory_value.width must be 1, 2, 4 or 8, got {}",
                        i,
                        mv.memory_value.width
                    );
                }
            }
        }

        Ok(())
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let trimmed = size_str.trim();
    if let Ok(raw) = trimmed.parse::<u64>() {
        return Ok(raw);
    }
    let s: Size = trimmed
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn test_valid_scenario() {
        let yaml = r#"
schema_version: "1.0"
name: "single-burst"
engine:
  beat_bytes: 4
  max_burst_beats: 16
  window:
    base: 0x0
    size: "64KiB"
transfers:
  - src: 0x1000
    dst: 0x2000
    length: 64
assertions:
  - expected_verdict: pass
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert_eq!(scenario.transfers.len(), 1);
        assert_eq!(scenario.transfers[0].length, 64);
        assert!(scenario.transfers[0].irq_enable);
        assert!(scenario.transfers[0].clear_before);
        assert_eq!(scenario.engine.window_size().unwrap(), 64 * 1024);
        assert_eq!(scenario.assertions.len(), 1);
    }

    #[test]
    fn test_defaults_fill_engine_section() {
        let yaml = r#"
name: "defaults"
transfers:
  - { src: 0x0, dst: 0x100, length: 16 }
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert_eq!(scenario.engine, EngineConfig::default());
        assert_eq!(scenario.responder.latency, LatencyProfile::Fixed { cycles: 1 });
        assert_eq!(scenario.responder.stall, StallProfile::None);
        assert_eq!(scenario.memory.fill, MemoryFill::Zero);
    }

    #[test]
    fn test_invalid_version() {
        let yaml = r#"
schema_version: "2.0"
name: "x"
transfers:
  - { src: 0x0, dst: 0x100, length: 16 }
"#;
        let err = Scenario::from_yaml(yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("Unsupported schema_version"));
    }

    #[test]
    fn test_beat_bytes_must_be_power_of_two() {
        let cfg = EngineConfig {
            beat_bytes: 3,
            ..EngineConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("beat_bytes"));
    }

    #[test]
    fn test_boundary_smaller_than_beat_rejected() {
        let cfg = EngineConfig {
            beat_bytes: 8,
            boundary: Some("4".to_string()),
            ..EngineConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("boundary"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = r#"
name: "typo"
transfers:
  - { src: 0x0, dst: 0x100, length: 16, lenght: 4 }
"#;
        assert!(Scenario::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_injection_defaults_to_write_channel() {
        let yaml = r#"
name: "inject"
transfers:
  - src: 0x1000
    dst: 0x2000
    length: 64
    injections:
      - { burst: 0, beat: 3, response: SLVERR }
      - { burst: 1, beat: 0, channel: read, response: decerr }
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        let inj = &scenario.transfers[0].injections;
        assert_eq!(inj[0].channel, Direction::Write);
        assert_eq!(inj[0].response, Response::SlvErr);
        assert_eq!(inj[1].channel, Direction::Read);
        assert_eq!(inj[1].response, Response::DecErr);
    }

    #[test]
    fn test_profiles_parse() {
        let yaml = r#"
name: "profiles"
responder:
  latency:
    seeded: { min: 1, max: 4, seed: 7 }
  stall:
    periodic: { every: 4, cycles: 3 }
memory:
  fill:
    seeded: { seed: 42 }
transfers:
  - { src: 0x0, dst: 0x100, length: 16 }
"#;
        let scenario = Scenario::from_yaml(yaml).unwrap();
        assert_eq!(
            scenario.responder.latency,
            LatencyProfile::Seeded {
                min: 1,
                max: 4,
                seed: 7
            }
        );
        assert_eq!(
            scenario.responder.stall,
            StallProfile::Periodic {
                every: 4,
                cycles: 3
            }
        );
        assert_eq!(scenario.memory.fill, MemoryFill::Seeded { seed: 42 });
    }

    #[test]
    fn test_segment_outside_window_rejected() {
        let yaml = r#"
name: "bad-segment"
engine:
  window: { base: 0x0, size: "1KB" }
memory:
  segments:
    - { base: 0x3FE, bytes: [1, 2, 3] }
transfers:
  - { src: 0x0, dst: 0x100, length: 16 }
"#;
        let err = Scenario::from_yaml(yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("segments[0]"));
    }

    #[test]
    fn test_error_kind_codes_are_sequential() {
        for (i, kind) in [
            ErrorKind::ZeroLength,
            ErrorKind::Misaligned,
            ErrorKind::OutOfRange,
            ErrorKind::Overlap,
            ErrorKind::SlaveError,
            ErrorKind::DecodeError,
        ]
        .into_iter()
        .enumerate()
        {
            assert_eq!(kind.code() as usize, i + 1);
        }
        assert!(ErrorKind::Overlap.is_start_time());
        assert!(!ErrorKind::SlaveError.is_start_time());
    }

    fn write_temp_file(prefix: &str, contents: &str) -> std::path::PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push("dmasim-config-tests");
        let _ = std::fs::create_dir_all(&dir);

        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = dir.join(format!("{}-{}.yaml", prefix, nonce));
        std::fs::write(&path, contents).expect("Failed to write temp file");
        path
    }

    #[test]
    fn test_from_file() {
        let path = write_temp_file(
            "scenario",
            r#"
name: "from-file"
transfers:
  - { src: 0x0, dst: 0x100, length: 0 }
"#,
        );
        let scenario = Scenario::from_file(&path).unwrap();
        assert_eq!(scenario.name, "from-file");
        assert_eq!(scenario.transfers[0].length, 0);
    }

    #[test]
    fn test_parse_size_accepts_plain_numbers() {
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert_eq!(parse_size("4KB").unwrap(), 4000);
        assert_eq!(parse_size("4KiB").unwrap(), 4096);
    }
}
