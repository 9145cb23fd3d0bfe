// DmaSim - DMA Engine Verification Model
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::Serialize;

/// Represents a digital signal level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DigitalLevel {
    #[default]
    Low,
    High,
}

impl From<bool> for DigitalLevel {
    fn from(b: bool) -> Self {
        if b {
            DigitalLevel::High
        } else {
            DigitalLevel::Low
        }
    }
}

impl From<DigitalLevel> for bool {
    fn from(level: DigitalLevel) -> Self {
        match level {
            DigitalLevel::High => true,
            DigitalLevel::Low => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IrqEdge {
    pub cycle: u64,
    pub level: DigitalLevel,
}

/// Interrupt output pin. It holds no state of its own beyond what was last
/// driven onto it, and records every edge.
#[derive(Debug, Clone, Default)]
pub struct IrqLine {
    level: DigitalLevel,
    edges: Vec<IrqEdge>,
}

impl IrqLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drive the line; returns true on an edge.
    pub fn drive(&mut self, level: impl Into<DigitalLevel>, cycle: u64) -> bool {
        let level = level.into();
        if level == self.level {
            return false;
        }
        self.level = level;
        self.edges.push(IrqEdge { cycle, level });
        true
    }

    pub fn level(&self) -> DigitalLevel {
        self.level
    }

    pub fn is_high(&self) -> bool {
        self.level.into()
    }

    pub fn edges(&self) -> &[IrqEdge] {
        &self.edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digital_level_conversions() {
        assert_eq!(DigitalLevel::from(true), DigitalLevel::High);
        let b: bool = DigitalLevel::Low.into();
        assert!(!b);
    }

    #[test]
    fn test_irq_line_records_edges_only() {
        let mut line = IrqLine::new();
        assert!(!line.is_high());
        assert!(!line.drive(false, 1));
        assert!(line.drive(true, 5));
        assert!(!line.drive(true, 6));
        assert!(line.drive(false, 9));
        assert_eq!(
            line.edges(),
            &[
                IrqEdge {
                    cycle: 5,
                    level: DigitalLevel::High
                },
                IrqEdge {
                    cycle: 9,
                    level: DigitalLevel::Low
                },
            ]
        );
    }
}
