// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Static capability table for supported instrument models and RF front-end
//! variants.
//!
//! A [`DeviceDescriptor`] is built once when a session opens and is never
//! mutated afterwards. Adding a new front end means adding one arm to
//! [`DeviceVariant::capabilities`].

use serde::{Deserialize, Serialize};

use crate::error::{WsaError, WsaResult};
use crate::types::RfGain;

pub const MIN_SAMPLES_PER_PACKET: i32 = 128;
pub const MAX_SAMPLES_PER_PACKET: i32 = 65520;
pub const MIN_PACKETS_PER_BLOCK: i32 = 1;

/// Inclusive value range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy> Bounds<T> {
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: T) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductModel {
    Wsa4000,
}

impl ProductModel {
    pub fn name(self) -> &'static str {
        match self {
            ProductModel::Wsa4000 => "WSA4000",
        }
    }

    fn inst_bw_hz(self) -> u64 {
        match self {
            ProductModel::Wsa4000 => 125_000_000,
        }
    }

    fn max_sample_size(self) -> u32 {
        match self {
            ProductModel::Wsa4000 => 2560 * 1024,
        }
    }
}

/// RF front-end board fitted to the instrument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceVariant {
    Rfe0440,
    #[default]
    Rfe0560,
}

/// Per-variant bounds, before firmware strings are known.
struct VariantCaps {
    tune_freq: Bounds<i64>,
    freq_resolution_hz: i64,
    if_gain: Option<Bounds<i32>>,
    decimation: Option<Bounds<i32>>,
    max_antenna_port: Option<i32>,
    preselect_filter: bool,
    abs_max_amp_dbm: [f32; 4],
}

impl DeviceVariant {
    pub const ALL: [DeviceVariant; 2] = [DeviceVariant::Rfe0440, DeviceVariant::Rfe0560];

    pub fn name(self) -> &'static str {
        match self {
            DeviceVariant::Rfe0440 => "RFE0440",
            DeviceVariant::Rfe0560 => "RFE0560",
        }
    }

    /// Look a variant up by name, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(name.trim()))
    }

    fn capabilities(self) -> VariantCaps {
        match self {
            DeviceVariant::Rfe0440 => VariantCaps {
                tune_freq: Bounds::new(200_000_000, 4_000_000_000),
                freq_resolution_hz: 10_000,
                if_gain: None,
                decimation: None,
                max_antenna_port: None,
                preselect_filter: false,
                abs_max_amp_dbm: [-15.0, 0.0, 13.0, 20.0],
            },
            DeviceVariant::Rfe0560 => VariantCaps {
                tune_freq: Bounds::new(100_000, 11_000_000_000),
                freq_resolution_hz: 100_000,
                if_gain: Some(Bounds::new(-10, 34)),
                decimation: Some(Bounds::new(16, 1023)),
                max_antenna_port: Some(2),
                preselect_filter: true,
                abs_max_amp_dbm: [-15.0, 0.0, 13.0, 20.0],
            },
        }
    }
}

/// Immutable capability record for one connected instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub product: ProductModel,
    pub variant: DeviceVariant,
    pub firmware_version: String,
    pub hardware_version: String,
    pub interface: String,
    pub inst_bw_hz: u64,
    pub max_sample_size: u32,
    pub tune_freq: Bounds<i64>,
    pub freq_resolution_hz: i64,
    pub if_gain: Option<Bounds<i32>>,
    pub decimation: Option<Bounds<i32>>,
    pub max_antenna_port: Option<i32>,
    pub preselect_filter: bool,
    /// Indexed by [`RfGain`] order: HIGH, MED, LOW, VLOW.
    pub abs_max_amp_dbm: [f32; 4],
}

impl DeviceDescriptor {
    pub fn new(product: ProductModel, variant: DeviceVariant) -> Self {
        let caps = variant.capabilities();
        Self {
            product,
            variant,
            firmware_version: String::new(),
            hardware_version: String::new(),
            interface: "TCPIP".to_string(),
            inst_bw_hz: product.inst_bw_hz(),
            max_sample_size: product.max_sample_size(),
            tune_freq: caps.tune_freq,
            freq_resolution_hz: caps.freq_resolution_hz,
            if_gain: caps.if_gain,
            decimation: caps.decimation,
            max_antenna_port: caps.max_antenna_port,
            preselect_filter: caps.preselect_filter,
            abs_max_amp_dbm: caps.abs_max_amp_dbm,
        }
    }

    pub fn with_versions(mut self, firmware: &str, hardware: &str) -> Self {
        self.firmware_version = firmware.trim().to_string();
        self.hardware_version = hardware.trim().to_string();
        self
    }

    pub fn product_name(&self) -> &'static str {
        self.product.name()
    }

    pub fn rfe_name(&self) -> &'static str {
        self.variant.name()
    }

    pub fn verify_freq(&self, hz: i64) -> WsaResult<()> {
        if !self.tune_freq.contains(hz) {
            return Err(WsaError::FreqOutOfBound(hz));
        }
        Ok(())
    }

    /// Round down to the tuning resolution of the front end.
    pub fn truncate_to_resolution(&self, hz: i64) -> i64 {
        hz - hz.rem_euclid(self.freq_resolution_hz)
    }

    pub fn verify_freq_shift(&self, hz: f64) -> WsaResult<()> {
        let bw = self.inst_bw_hz as f64;
        if !(-bw..=bw).contains(&hz) {
            return Err(WsaError::FreqOutOfBound(hz as i64));
        }
        Ok(())
    }

    pub fn verify_if_gain(&self, gain_db: i32) -> WsaResult<()> {
        let bounds = self.if_gain.ok_or_else(|| self.unsupported())?;
        if !bounds.contains(gain_db) {
            return Err(WsaError::InvalidIfGain(gain_db));
        }
        Ok(())
    }

    /// Zero turns decimation off and is always accepted where decimation is
    /// supported at all.
    pub fn verify_decimation(&self, rate: i32) -> WsaResult<()> {
        let bounds = self.decimation.ok_or_else(|| self.unsupported())?;
        if rate != 0 && !bounds.contains(rate) {
            return Err(WsaError::InvalidDecimation(rate));
        }
        Ok(())
    }

    pub fn verify_antenna(&self, port: i32) -> WsaResult<()> {
        let max = self.max_antenna_port.ok_or_else(|| self.unsupported())?;
        if port < 1 || port > max {
            return Err(WsaError::InvalidAntennaPort(port));
        }
        Ok(())
    }

    pub fn verify_preselect_filter(&self) -> WsaResult<()> {
        if !self.preselect_filter {
            return Err(self.unsupported());
        }
        Ok(())
    }

    pub fn verify_samples_per_packet(&self, spp: i32) -> WsaResult<()> {
        if !(MIN_SAMPLES_PER_PACKET..=MAX_SAMPLES_PER_PACKET).contains(&spp) {
            return Err(WsaError::InvalidSampleSize(spp));
        }
        Ok(())
    }

    pub fn max_packets_per_block(&self) -> i32 {
        (self.max_sample_size / MIN_SAMPLES_PER_PACKET as u32) as i32
    }

    pub fn verify_packets_per_block(&self, ppb: i32) -> WsaResult<()> {
        if ppb < MIN_PACKETS_PER_BLOCK || ppb > self.max_packets_per_block() {
            return Err(WsaError::InvalidPacketsPerBlock(ppb));
        }
        Ok(())
    }

    pub fn abs_max_amp(&self, gain: RfGain) -> f32 {
        self.abs_max_amp_dbm[gain.index()]
    }

    fn unsupported(&self) -> WsaError {
        WsaError::UnsupportedSetting(self.variant.name().to_string())
    }
}

impl Default for DeviceDescriptor {
    fn default() -> Self {
        Self::new(ProductModel::Wsa4000, DeviceVariant::default())
    }
}
