// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration for wsa-client.
//!
//! Read from the `[wsa-client]` section of `wsa-rs.toml`:
//! 1. Path given with `--config`
//! 2. `./wsa-rs.toml`
//! 3. `~/.config/wsa-rs/wsa-rs.toml`
//! 4. `/etc/wsa-rs/wsa-rs.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use wsa_app::{parse_log_level, ConfigError, ConfigFile};

use crate::session::SessionConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub general: GeneralConfig,
    pub instrument: InstrumentConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Interface specifier, e.g. `TCPIP::192.168.1.20`
    pub interface: Option<String>,
    pub command_timeout_ms: u64,
    pub data_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub query_attempts: u32,
    pub frame_read_retries: u32,
    pub stop_drain_ms: u64,
    pub drain_read_timeout_ms: u64,
    /// Log every command and reply at INFO
    pub debug: bool,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            interface: None,
            command_timeout_ms: 1000,
            data_timeout_ms: 1000,
            connect_timeout_ms: 5000,
            query_attempts: 5,
            frame_read_retries: 5,
            stop_drain_ms: 5000,
            drain_read_timeout_ms: 360,
            debug: false,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(level) = self.general.log_level.as_deref() {
            if parse_log_level(level).is_none() {
                return Err(format!(
                    "[general].log_level '{level}' is invalid (expected one of: trace, debug, info, warn, error)"
                ));
            }
        }

        let inst = &self.instrument;
        if let Some(interface) = &inst.interface {
            if interface.trim().is_empty() {
                return Err("[instrument].interface must not be empty when set".to_string());
            }
        }
        for (name, value) in [
            ("command_timeout_ms", inst.command_timeout_ms),
            ("data_timeout_ms", inst.data_timeout_ms),
            ("connect_timeout_ms", inst.connect_timeout_ms),
            ("drain_read_timeout_ms", inst.drain_read_timeout_ms),
            ("query_attempts", u64::from(inst.query_attempts)),
        ] {
            if value == 0 {
                return Err(format!("[instrument].{name} must be > 0"));
            }
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        let inst = &self.instrument;
        SessionConfig {
            command_timeout: Duration::from_millis(inst.command_timeout_ms),
            data_timeout: Duration::from_millis(inst.data_timeout_ms),
            connect_timeout: Duration::from_millis(inst.connect_timeout_ms),
            query_attempts: inst.query_attempts,
            frame_read_retries: inst.frame_read_retries,
            stop_drain: Duration::from_millis(inst.stop_drain_ms),
            drain_read_timeout: Duration::from_millis(inst.drain_read_timeout_ms),
            debug: inst.debug,
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        <Self as ConfigFile>::load_from_file(path)
    }

    pub fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        <Self as ConfigFile>::load_from_default_paths()
    }

    /// Example configuration as TOML, with its section header.
    pub fn example_toml() -> String {
        let example = ClientConfig {
            general: GeneralConfig {
                log_level: Some("info".to_string()),
            },
            instrument: InstrumentConfig {
                interface: Some("TCPIP::192.168.1.20".to_string()),
                ..InstrumentConfig::default()
            },
        };
        let mut root = toml::Table::new();
        if let Ok(toml::Value::Table(section)) = toml::Value::try_from(&example) {
            root.insert(Self::section_key().to_string(), toml::Value::Table(section));
        }
        toml::to_string_pretty(&root).unwrap_or_default()
    }
}

impl ConfigFile for ClientConfig {
    fn section_key() -> &'static str {
        "wsa-client"
    }
}
