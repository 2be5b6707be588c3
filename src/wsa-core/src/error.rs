// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use thiserror::Error;

/// Error type returned by every instrument operation.
#[derive(Debug, Error)]
pub enum WsaError {
    #[error("invalid interface method '{0}'")]
    InvalidInterface(String),

    #[error("USB transport is not available")]
    UsbNotAvailable,

    #[error("invalid host address {0}")]
    InvalidAddress(String),

    #[error("connection to {addr} failed: {reason}")]
    ConnectFailed { addr: String, reason: String },

    #[error("session is not open")]
    NotConnected,

    #[error("command send failed: {0}")]
    CommandSendFailed(String),

    #[error("no response to '{0}'")]
    QueryNoResponse(String),

    #[error("unparsable response to '{query}': '{response}'")]
    ResponseUnknown { query: String, response: String },

    #[error("response to '{query}' outside the declared range: {value}")]
    ResponseOutOfRange { query: String, value: String },

    #[error("{0} timed out")]
    Timeout(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("frequency {0} Hz is out of bound")]
    FreqOutOfBound(i64),

    #[error("invalid IF gain {0} dB")]
    InvalidIfGain(i32),

    #[error("invalid RF gain '{0}'")]
    InvalidRfGain(String),

    #[error("invalid decimation rate {0}")]
    InvalidDecimation(i32),

    #[error("invalid samples per packet {0}")]
    InvalidSampleSize(i32),

    #[error("invalid packets per block {0}")]
    InvalidPacketsPerBlock(i32),

    #[error("invalid antenna port {0}")]
    InvalidAntennaPort(i32),

    #[error("setting not supported by the {0} front end")]
    UnsupportedSetting(String),

    #[error("sweep start frequency {0} Hz is out of bound")]
    StartOutOfBound(i64),

    #[error("sweep stop frequency {0} Hz is out of bound")]
    StopOutOfBound(i64),

    #[error("stop frequency {stop} Hz must be above start frequency {start} Hz")]
    InvalidStopFreq { start: i64, stop: i64 },

    #[error("invalid dwell time {seconds} s {microseconds} us")]
    InvalidDwell { seconds: i32, microseconds: i32 },

    #[error("sweep entry {id} is out of bound (list size {size})")]
    SweepIdOutOfBound { id: i32, size: i32 },

    #[error("sweep list is empty")]
    SweepListEmpty,

    #[error("sweep list is already running")]
    SweepAlreadyRunning,

    #[error("undefined sweep mode '{0}'")]
    SweepModeUndefined(String),

    #[error("instrument rejected '{command}': {message}")]
    SetFailed { command: String, message: String },

    #[error("trigger conflict reported after '{0}'")]
    TriggerConflict(String),

    #[error("stream id {0:#010x} is not an IQ frame")]
    NotIqFrame(u32),

    #[error("IQ frame carries no integer-seconds timestamp")]
    InvalidTimestamp,

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("invalid trigger mode {0}")]
    InvalidTriggerMode(i32),

    #[error("invalid filter mode {0}")]
    InvalidFilterMode(i32),

    #[error("invalid PLL reference source '{0}'")]
    InvalidPllReference(String),

    #[error("sweep record: {0}")]
    RecordSchema(String),
}

pub type WsaResult<T> = Result<T, WsaError>;

impl WsaError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn unknown_response(query: &str, response: &str) -> Self {
        Self::ResponseUnknown {
            query: query.trim_end().to_string(),
            response: response.to_string(),
        }
    }

    pub fn out_of_range_response(query: &str, value: impl ToString) -> Self {
        Self::ResponseOutOfRange {
            query: query.trim_end().to_string(),
            value: value.to_string(),
        }
    }

    /// True for locally detected argument violations that never reach the wire.
    pub fn is_bounds_violation(&self) -> bool {
        matches!(
            self,
            Self::FreqOutOfBound(_)
                | Self::InvalidIfGain(_)
                | Self::InvalidRfGain(_)
                | Self::InvalidDecimation(_)
                | Self::InvalidSampleSize(_)
                | Self::InvalidPacketsPerBlock(_)
                | Self::InvalidAntennaPort(_)
                | Self::StartOutOfBound(_)
                | Self::StopOutOfBound(_)
                | Self::InvalidStopFreq { .. }
                | Self::InvalidDwell { .. }
                | Self::SweepIdOutOfBound { .. }
                | Self::InvalidTriggerMode(_)
                | Self::InvalidFilterMode(_)
        )
    }

    /// True when a read on a channel failed or returned nothing; these are
    /// the failures a frame reader may retry.
    pub fn is_transient_read(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::QueryNoResponse(_))
    }
}
