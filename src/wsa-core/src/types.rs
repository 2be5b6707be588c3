// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{WsaError, WsaResult};

/// RF front-end gain level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RfGain {
    High,
    Med,
    Low,
    Vlow,
}

impl RfGain {
    pub fn as_scpi(self) -> &'static str {
        match self {
            RfGain::High => "HIGH",
            RfGain::Med => "MED",
            RfGain::Low => "LOW",
            RfGain::Vlow => "VLOW",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            RfGain::High => 0,
            RfGain::Med => 1,
            RfGain::Low => 2,
            RfGain::Vlow => 3,
        }
    }

    /// Parse a gain reply. The instrument may pad or decorate the token, so
    /// the match is by substring; VLOW is checked before LOW.
    pub fn parse(s: &str) -> WsaResult<Self> {
        let upper = s.trim().to_ascii_uppercase();
        if upper.contains("HIGH") {
            Ok(RfGain::High)
        } else if upper.contains("MED") {
            Ok(RfGain::Med)
        } else if upper.contains("VLOW") {
            Ok(RfGain::Vlow)
        } else if upper.contains("LOW") {
            Ok(RfGain::Low)
        } else {
            Err(WsaError::InvalidRfGain(s.trim().to_string()))
        }
    }
}

impl fmt::Display for RfGain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_scpi())
    }
}

/// PLL reference clock source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PllReference {
    Internal,
    External,
}

impl PllReference {
    pub fn as_scpi(self) -> &'static str {
        match self {
            PllReference::Internal => "INT",
            PllReference::External => "EXT",
        }
    }

    pub fn parse(s: &str) -> WsaResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INT" | "INTERNAL" => Ok(PllReference::Internal),
            "EXT" | "EXTERNAL" => Ok(PllReference::External),
            other => Err(WsaError::InvalidPllReference(other.to_string())),
        }
    }
}

/// Frequency-domain level trigger: fire when a signal between `start_hz`
/// and `stop_hz` exceeds `amplitude_dbm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerLevel {
    pub start_hz: i64,
    pub stop_hz: i64,
    pub amplitude_dbm: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TriggerType {
    None,
    Level,
}

impl TriggerType {
    pub fn as_scpi(self) -> &'static str {
        match self {
            TriggerType::None => "NONE",
            TriggerType::Level => "LEVEL",
        }
    }

    pub fn parse(s: &str) -> WsaResult<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NONE" => Ok(TriggerType::None),
            "LEVEL" => Ok(TriggerType::Level),
            _ => Err(WsaError::RecordSchema(format!(
                "unknown trigger type '{}'",
                s.trim()
            ))),
        }
    }

    /// Map the 0/1 enable flag used by the trigger-type setters.
    pub fn from_enable(enable: i32) -> WsaResult<Self> {
        match enable {
            0 => Ok(TriggerType::None),
            1 => Ok(TriggerType::Level),
            other => Err(WsaError::InvalidTriggerMode(other)),
        }
    }

    pub fn is_enabled(self) -> bool {
        self == TriggerType::Level
    }
}

/// Run state of the remote sweep list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SweepStatus {
    Stopped,
    Running,
}

impl SweepStatus {
    pub fn parse(s: &str) -> WsaResult<Self> {
        match s.trim() {
            "STOPPED" => Ok(SweepStatus::Stopped),
            "RUNNING" => Ok(SweepStatus::Running),
            other => Err(WsaError::SweepModeUndefined(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SweepStatus::Stopped => "STOPPED",
            SweepStatus::Running => "RUNNING",
        }
    }
}

/// Time spent on each sweep step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dwell {
    pub seconds: i32,
    pub microseconds: i32,
}

impl Dwell {
    pub fn new(seconds: i32, microseconds: i32) -> WsaResult<Self> {
        if seconds < 0 || microseconds < 0 {
            return Err(WsaError::InvalidDwell {
                seconds,
                microseconds,
            });
        }
        Ok(Self {
            seconds,
            microseconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rf_gain_parse_prefers_vlow() {
        assert_eq!(RfGain::parse("VLOW").unwrap(), RfGain::Vlow);
        assert_eq!(RfGain::parse("LOW").unwrap(), RfGain::Low);
        assert_eq!(RfGain::parse(" high\n").unwrap(), RfGain::High);
        assert_eq!(RfGain::parse("MED").unwrap(), RfGain::Med);
    }

    #[test]
    fn test_rf_gain_parse_rejects_unknown() {
        assert!(matches!(
            RfGain::parse("LOUD"),
            Err(WsaError::InvalidRfGain(s)) if s == "LOUD"
        ));
    }

    #[test]
    fn test_sweep_status_only_two_states() {
        assert_eq!(SweepStatus::parse("RUNNING\n").unwrap(), SweepStatus::Running);
        assert_eq!(SweepStatus::parse("STOPPED").unwrap(), SweepStatus::Stopped);
        assert!(matches!(
            SweepStatus::parse("PAUSED"),
            Err(WsaError::SweepModeUndefined(_))
        ));
    }

    #[test]
    fn test_trigger_type_from_enable() {
        assert_eq!(TriggerType::from_enable(0).unwrap(), TriggerType::None);
        assert_eq!(TriggerType::from_enable(1).unwrap(), TriggerType::Level);
        assert!(matches!(
            TriggerType::from_enable(2),
            Err(WsaError::InvalidTriggerMode(2))
        ));
    }

    #[test]
    fn test_dwell_rejects_negative() {
        assert!(Dwell::new(0, 500).is_ok());
        assert!(matches!(
            Dwell::new(-1, 0),
            Err(WsaError::InvalidDwell { seconds: -1, .. })
        ));
    }

    #[test]
    fn test_pll_reference_parse() {
        assert_eq!(PllReference::parse("EXT").unwrap(), PllReference::External);
        assert_eq!(PllReference::parse("int").unwrap(), PllReference::Internal);
        assert!(PllReference::parse("GPS").is_err());
    }
}
