// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Sweep entry record.
//!
//! `SWEEP:ENTRY:READ?` answers with one comma-delimited positional record:
//!
//! ```text
//! start,stop,step,shift,decimation,antenna,rf_gain,if_gain,spp,ppb,
//! dwell_s,dwell_us,trigger_type[,trig_start,trig_stop,trig_amplitude]
//! ```
//!
//! The trailing trigger fields are present only when the trigger type is
//! `LEVEL`. Schema errors name the record revision they were checked against.

use serde::{Deserialize, Serialize};

use crate::error::{WsaError, WsaResult};
use crate::types::{Dwell, RfGain, TriggerLevel, TriggerType};

/// Field layout revision understood by [`SweepEntry::apply_record`].
const SWEEP_RECORD_VERSION: u32 = 1;

const FIELDS_V1: [&str; 13] = [
    "start_freq",
    "stop_freq",
    "freq_step",
    "freq_shift",
    "decimation",
    "antenna",
    "rf_gain",
    "if_gain",
    "samples_per_packet",
    "packets_per_block",
    "dwell_seconds",
    "dwell_microseconds",
    "trigger_type",
];
const LEVEL_TRIGGER_FIELDS: usize = 3;

/// One set of capture parameters, either the instrument's template or a
/// saved list position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepEntry {
    pub start_freq_hz: i64,
    pub stop_freq_hz: i64,
    pub freq_step_hz: i64,
    pub freq_shift_hz: f64,
    pub decimation: i32,
    pub antenna: i32,
    pub rf_gain: RfGain,
    pub if_gain_db: i32,
    pub samples_per_packet: i32,
    pub packets_per_block: i32,
    pub dwell: Dwell,
    pub trigger_type: TriggerType,
    /// Meaningful only when `trigger_type` is [`TriggerType::Level`].
    pub trigger_level: TriggerLevel,
}

impl Default for SweepEntry {
    fn default() -> Self {
        Self {
            start_freq_hz: 0,
            stop_freq_hz: 0,
            freq_step_hz: 0,
            freq_shift_hz: 0.0,
            decimation: 0,
            antenna: 1,
            rf_gain: RfGain::High,
            if_gain_db: 0,
            samples_per_packet: 1024,
            packets_per_block: 1,
            dwell: Dwell::default(),
            trigger_type: TriggerType::None,
            trigger_level: TriggerLevel {
                start_hz: 0,
                stop_hz: 0,
                amplitude_dbm: 0,
            },
        }
    }
}

impl SweepEntry {
    /// 0/1 form of the trigger type.
    pub fn trigger_enable(&self) -> i32 {
        i32::from(self.trigger_type.is_enabled())
    }

    /// Parse a record into a fresh entry.
    pub fn parse_record(record: &str) -> WsaResult<Self> {
        let mut entry = Self::default();
        entry.apply_record(record)?;
        Ok(entry)
    }

    /// Overwrite this entry with the fields of `record`.
    ///
    /// The field count is checked before any field is assigned. A `NONE`
    /// trigger stops parsing at the trigger-type field and leaves
    /// `trigger_level` as it was.
    pub fn apply_record(&mut self, record: &str) -> WsaResult<()> {
        let fields: Vec<&str> = record.trim().split(',').map(str::trim).collect();
        if fields.len() < FIELDS_V1.len() {
            return Err(WsaError::RecordSchema(format!(
                "record v{SWEEP_RECORD_VERSION}: expected at least {} fields, got {}",
                FIELDS_V1.len(),
                fields.len()
            )));
        }

        let trigger_type = parse_trigger_type(fields[12])?;
        if trigger_type == TriggerType::Level
            && fields.len() < FIELDS_V1.len() + LEVEL_TRIGGER_FIELDS
        {
            return Err(WsaError::RecordSchema(format!(
                "record v{SWEEP_RECORD_VERSION}: LEVEL trigger needs {} fields, got {}",
                FIELDS_V1.len() + LEVEL_TRIGGER_FIELDS,
                fields.len()
            )));
        }

        let mut parsed = self.clone();
        parsed.start_freq_hz = number(&fields, 0)? as i64;
        parsed.stop_freq_hz = number(&fields, 1)? as i64;
        parsed.freq_step_hz = number(&fields, 2)? as i64;
        parsed.freq_shift_hz = number(&fields, 3)?;
        parsed.decimation = number(&fields, 4)? as i32;
        parsed.antenna = number(&fields, 5)? as i32;
        parsed.rf_gain = RfGain::parse(fields[6])?;
        parsed.if_gain_db = number(&fields, 7)? as i32;
        parsed.samples_per_packet = number(&fields, 8)? as i32;
        parsed.packets_per_block = number(&fields, 9)? as i32;
        parsed.dwell = Dwell {
            seconds: number(&fields, 10)? as i32,
            microseconds: number(&fields, 11)? as i32,
        };
        parsed.trigger_type = trigger_type;
        if trigger_type == TriggerType::Level {
            parsed.trigger_level = TriggerLevel {
                start_hz: number(&fields, 13)? as i64,
                stop_hz: number(&fields, 14)? as i64,
                amplitude_dbm: number(&fields, 15)? as i32,
            };
        }

        *self = parsed;
        Ok(())
    }
}

fn parse_trigger_type(field: &str) -> WsaResult<TriggerType> {
    let upper = field.to_ascii_uppercase();
    if upper.contains("LEVEL") {
        Ok(TriggerType::Level)
    } else if upper.contains("NONE") {
        Ok(TriggerType::None)
    } else {
        Err(WsaError::RecordSchema(format!(
            "field trigger_type: unknown value '{field}'"
        )))
    }
}

fn number(fields: &[&str], idx: usize) -> WsaResult<f64> {
    let name = FIELDS_V1.get(idx).copied().unwrap_or("trigger");
    fields[idx].parse::<f64>().map_err(|_| {
        WsaError::RecordSchema(format!("field {name}: not a number '{}'", fields[idx]))
    })
}
