// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Instrument settings. Setters check their argument against the session
//! descriptor before anything is written; getters reject replies outside
//! the descriptor's bounds.

use tracing::debug;
use wsa_core::{PllReference, RfGain, TriggerLevel, TriggerType, WsaError, WsaResult};
use wsa_protocol::scpi;

use crate::session::Session;

impl Session {
    pub async fn frequency(&mut self) -> WsaResult<i64> {
        let query = "FREQ:CENT?";
        let freq = self.query_float(query).await? as i64;
        if self.descriptor().verify_freq(freq).is_err() {
            return Err(WsaError::out_of_range_response(query, freq));
        }
        Ok(freq)
    }

    /// Tune the centre frequency. The instrument truncates to its tuning
    /// resolution.
    pub async fn set_frequency(&mut self, hz: i64) -> WsaResult<()> {
        let descriptor = self.descriptor();
        descriptor.verify_freq(hz)?;
        let tuned = descriptor.truncate_to_resolution(hz);
        if tuned != hz {
            debug!("Instrument will tune {hz} Hz to {tuned} Hz");
        }
        self.send_command(&format!("FREQ:CENT {hz} Hz")).await
    }

    pub async fn freq_shift(&mut self) -> WsaResult<f64> {
        let query = "FREQ:SHIFT?";
        let shift = self.query_float(query).await?;
        if self.descriptor().verify_freq_shift(shift).is_err() {
            return Err(WsaError::out_of_range_response(query, shift));
        }
        Ok(shift)
    }

    pub async fn set_freq_shift(&mut self, hz: f64) -> WsaResult<()> {
        self.descriptor().verify_freq_shift(hz)?;
        self.send_command(&format!("FREQ:SHIFt {hz} Hz")).await
    }

    pub async fn if_gain(&mut self) -> WsaResult<i32> {
        let query = "INPUT:GAIN:IF?";
        let gain = self.query_int(query).await?;
        let gain = i32::try_from(gain).map_err(|_| WsaError::out_of_range_response(query, gain))?;
        if self.descriptor().verify_if_gain(gain).is_err() {
            return Err(WsaError::out_of_range_response(query, gain));
        }
        Ok(gain)
    }

    pub async fn set_if_gain(&mut self, gain_db: i32) -> WsaResult<()> {
        self.descriptor().verify_if_gain(gain_db)?;
        self.send_command(&format!("INPUT:GAIN:IF {gain_db} dB")).await
    }

    pub async fn rf_gain(&mut self) -> WsaResult<RfGain> {
        let query = "INPUT:GAIN:RF?";
        let text = self.query_text(query).await?;
        RfGain::parse(&text).map_err(|_| WsaError::unknown_response(query, &text))
    }

    pub async fn set_rf_gain(&mut self, gain: RfGain) -> WsaResult<()> {
        self.send_command(&format!("INPUT:GAIN:RF {}", gain.as_scpi()))
            .await
    }

    pub async fn antenna(&mut self) -> WsaResult<i32> {
        let query = "INPUT:ANTENNA?";
        let port = self.query_small_int(query).await?;
        if self.descriptor().verify_antenna(port).is_err() {
            return Err(WsaError::out_of_range_response(query, port));
        }
        Ok(port)
    }

    pub async fn set_antenna(&mut self, port: i32) -> WsaResult<()> {
        self.descriptor().verify_antenna(port)?;
        self.send_command(&format!("INPUT:ANTENNA {port}")).await
    }

    /// Preselect filter state, 0 (bypassed) or 1 (in circuit).
    pub async fn preselect_filter(&mut self) -> WsaResult<i32> {
        self.descriptor().verify_preselect_filter()?;
        let query = "INP:FILT:PRES?";
        let mode = self.query_small_int(query).await?;
        if !(0..=1).contains(&mode) {
            return Err(WsaError::out_of_range_response(query, mode));
        }
        Ok(mode)
    }

    pub async fn set_preselect_filter(&mut self, mode: i32) -> WsaResult<()> {
        self.descriptor().verify_preselect_filter()?;
        if !(0..=1).contains(&mode) {
            return Err(WsaError::InvalidFilterMode(mode));
        }
        self.send_command(&format!("INPUT:FILT:PRES {mode}")).await
    }

    pub async fn decimation(&mut self) -> WsaResult<i32> {
        let query = ":SENSE:DEC?";
        let rate = self.query_small_int(query).await?;
        if self.descriptor().verify_decimation(rate).is_err() {
            return Err(WsaError::out_of_range_response(query, rate));
        }
        Ok(rate)
    }

    /// Set the decimation rate; 0 turns decimation off.
    pub async fn set_decimation(&mut self, rate: i32) -> WsaResult<()> {
        self.descriptor().verify_decimation(rate)?;
        self.send_command(&format!("SENSE:DEC {rate}")).await
    }

    pub async fn samples_per_packet(&mut self) -> WsaResult<i32> {
        let query = "TRACE:SPPACKET?";
        let spp = self.query_small_int(query).await?;
        if self.descriptor().verify_samples_per_packet(spp).is_err() {
            return Err(WsaError::out_of_range_response(query, spp));
        }
        Ok(spp)
    }

    pub async fn set_samples_per_packet(&mut self, spp: i32) -> WsaResult<()> {
        self.descriptor().verify_samples_per_packet(spp)?;
        self.send_command(&format!("TRACE:SPPACKET {spp}")).await
    }

    pub async fn packets_per_block(&mut self) -> WsaResult<i32> {
        let query = "TRACE:BLOCK:PACKETS?";
        let ppb = self.query_small_int(query).await?;
        if self.descriptor().verify_packets_per_block(ppb).is_err() {
            return Err(WsaError::out_of_range_response(query, ppb));
        }
        Ok(ppb)
    }

    pub async fn set_packets_per_block(&mut self, ppb: i32) -> WsaResult<()> {
        self.descriptor().verify_packets_per_block(ppb)?;
        self.send_command(&format!("TRACE:BLOCK:PACKETS {ppb}"))
            .await
    }

    pub async fn trigger_level(&mut self) -> WsaResult<TriggerLevel> {
        let query = ":TRIG:LEVEL?";
        let text = self.query_text(query).await?;
        scpi::parse_trigger_level(query, &text)
    }

    /// Configure the level trigger window and amplitude.
    pub async fn set_trigger_level(&mut self, level: TriggerLevel) -> WsaResult<()> {
        verify_trigger_window(self, &level)?;
        self.send_command(&format!(
            ":TRIG:LEVEL {},{},{}",
            level.start_hz, level.stop_hz, level.amplitude_dbm
        ))
        .await
    }

    pub async fn trigger_enable(&mut self) -> WsaResult<TriggerType> {
        let query = ":TRIG:ENABLE?";
        let text = self.query_text(query).await?;
        let enabled = scpi::parse_flag(query, &text)?;
        Ok(if enabled {
            TriggerType::Level
        } else {
            TriggerType::None
        })
    }

    pub async fn set_trigger_enable(&mut self, enable: i32) -> WsaResult<()> {
        let trigger = TriggerType::from_enable(enable)?;
        self.send_command(&format!(":TRIGGER:ENABLE {}", i32::from(trigger.is_enabled())))
            .await
    }

    pub async fn pll_reference(&mut self) -> WsaResult<PllReference> {
        let query = "SOURCE:REFERENCE:PLL?";
        let text = self.query_text(query).await?;
        PllReference::parse(&text).map_err(|_| WsaError::unknown_response(query, &text))
    }

    pub async fn set_pll_reference(&mut self, source: PllReference) -> WsaResult<()> {
        self.send_command(&format!("SOURCE:REFERENCE:PLL {}", source.as_scpi()))
            .await
    }

    pub async fn reset_pll_reference(&mut self) -> WsaResult<()> {
        self.send_command("SOURCE:REFERENCE:PLL:RESET").await
    }

    /// Whether the PLL is locked to its reference.
    pub async fn pll_locked(&mut self) -> WsaResult<bool> {
        let query = "LOCK:REFerence?";
        let text = self.query_text(query).await?;
        scpi::parse_flag(query, &text)
    }

    /// Ask for exclusive acquisition access; true when granted.
    pub async fn request_acquisition_access(&mut self) -> WsaResult<bool> {
        let query = "SYSTem:LOCK:REQuest? ACQuisition";
        let text = self.query_text(query).await?;
        scpi::parse_flag(query, &text)
    }

    pub async fn has_acquisition_access(&mut self) -> WsaResult<bool> {
        let query = ":SYSTem:LOCK:HAVE? ACQuisition";
        let text = self.query_text(query).await?;
        scpi::parse_flag(query, &text)
    }

    /// Absolute maximum input amplitude for `gain`, from the descriptor.
    pub fn abs_max_amp(&self, gain: RfGain) -> f32 {
        self.descriptor().abs_max_amp(gain)
    }

    async fn query_small_int(&mut self, query: &str) -> WsaResult<i32> {
        let value = self.query_int(query).await?;
        i32::try_from(value).map_err(|_| WsaError::out_of_range_response(query, value))
    }
}

fn verify_trigger_window(session: &Session, level: &TriggerLevel) -> WsaResult<()> {
    let descriptor = session.descriptor();
    if descriptor.verify_freq(level.start_hz).is_err() {
        return Err(WsaError::StartOutOfBound(level.start_hz));
    }
    if descriptor.verify_freq(level.stop_hz).is_err() {
        return Err(WsaError::StopOutOfBound(level.stop_hz));
    }
    if level.stop_hz <= level.start_hz {
        return Err(WsaError::InvalidStopFreq {
            start: level.start_hz,
            stop: level.stop_hz,
        });
    }
    Ok(())
}
