// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! SCPI line helpers: command termination, reply parsing and error-queue
//! interpretation.

use serde::Serialize;
use wsa_core::{TriggerLevel, WsaError, WsaResult};

pub const LINE_TERMINATOR: char = '\n';

/// Status byte bit: error/event queue not empty.
pub const STB_ERROR_QUEUE: u8 = 0x04;
/// Status byte bit: standard event status register summary.
pub const STB_EVENT_STATUS: u8 = 0x20;

pub const ERROR_QUERY: &str = "SYST:ERR?";
const TRIGGER_CONFLICT_CODE: &str = "-221";

/// Append the line terminator unless `cmd` already ends with one.
pub fn terminate(cmd: &str) -> String {
    let trimmed = cmd.trim_end_matches(['\r', '\n']);
    format!("{trimmed}{LINE_TERMINATOR}")
}

/// Data requests start a capture and produce no error-queue entry worth
/// checking.
pub fn is_data_request(cmd: &str) -> bool {
    cmd.contains("DATA?")
}

pub fn is_query(cmd: &str) -> bool {
    cmd.contains('?')
}

/// Parse an integer reply.
pub fn parse_int(query: &str, resp: &str) -> WsaResult<i64> {
    resp.trim()
        .parse::<i64>()
        .map_err(|_| WsaError::unknown_response(query, resp))
}

/// Parse a numeric reply that may carry a fraction or exponent.
pub fn parse_float(query: &str, resp: &str) -> WsaResult<f64> {
    let value = resp
        .trim()
        .parse::<f64>()
        .map_err(|_| WsaError::unknown_response(query, resp))?;
    if !value.is_finite() {
        return Err(WsaError::unknown_response(query, resp));
    }
    Ok(value)
}

/// Parse a `0`/`1` reply.
pub fn parse_flag(query: &str, resp: &str) -> WsaResult<bool> {
    match resp.trim() {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(WsaError::unknown_response(query, resp)),
    }
}

/// Parse a comma-delimited list of exactly `count` numbers.
pub fn parse_numbers(query: &str, resp: &str, count: usize) -> WsaResult<Vec<f64>> {
    let values = resp
        .trim()
        .split(',')
        .map(|field| parse_float(query, field))
        .collect::<WsaResult<Vec<_>>>()
        .map_err(|_| WsaError::unknown_response(query, resp))?;
    if values.len() != count {
        return Err(WsaError::unknown_response(query, resp));
    }
    Ok(values)
}

/// Parse a `start,stop,amplitude` trigger reply.
pub fn parse_trigger_level(query: &str, resp: &str) -> WsaResult<TriggerLevel> {
    let values = parse_numbers(query, resp, 3)?;
    Ok(TriggerLevel {
        start_hz: values[0] as i64,
        stop_hz: values[1] as i64,
        amplitude_dbm: values[2] as i32,
    })
}

/// Outcome of reading the instrument error queue after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorQueueReply {
    NoError,
    TriggerConflict,
    Error(String),
}

pub fn classify_error_queue(reply: &str) -> ErrorQueueReply {
    let text = reply.trim();
    if text.is_empty() || text.to_ascii_lowercase().contains("no error") {
        ErrorQueueReply::NoError
    } else if text.contains(TRIGGER_CONFLICT_CODE) {
        ErrorQueueReply::TriggerConflict
    } else {
        ErrorQueueReply::Error(text.to_string())
    }
}

/// Fields of an `*IDN?` reply: `manufacturer,model,serial,firmware`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub manufacturer: String,
    pub model: String,
    pub serial: String,
    pub firmware: String,
}

impl Identity {
    pub fn parse(query: &str, resp: &str) -> WsaResult<Self> {
        let mut fields = resp.trim().split(',').map(str::trim);
        let manufacturer = fields.next().unwrap_or_default();
        let model = fields
            .next()
            .filter(|m| !m.is_empty())
            .ok_or_else(|| WsaError::unknown_response(query, resp))?;
        Ok(Self {
            manufacturer: manufacturer.to_string(),
            model: model.to_string(),
            serial: fields.next().unwrap_or_default().to_string(),
            firmware: fields.next().unwrap_or_default().to_string(),
        })
    }
}

/// Split a command script into lines worth sending: anything carrying a
/// SCPI header separator, a common-command star or a query mark. Lines
/// starting with `#` are comments.
pub fn script_lines(text: &str) -> Vec<&str> {
    text.split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .filter(|line| line.contains([':', '*', '?']))
        .collect()
}
