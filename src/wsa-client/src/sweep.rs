// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Remote sweep list: the entry template, saved entries and run control.

use tracing::info;

use wsa_core::{
    Dwell, RfGain, SweepEntry, SweepStatus, TriggerLevel, TriggerType, WsaError, WsaResult,
};
use wsa_protocol::scpi;

use crate::session::Session;

impl Session {
    /// Borrow the session as a sweep-list manager.
    pub fn sweep_list(&mut self) -> SweepList<'_> {
        SweepList { session: self }
    }

    pub(crate) async fn sweep_status(&mut self) -> WsaResult<SweepStatus> {
        let text = self.query_text("SWEEP:LIST:STATUS?").await?;
        SweepStatus::parse(&text)
    }
}

/// Operations on the instrument's sweep list. Setters act on the entry
/// template, which [`SweepList::save`] copies into the list.
pub struct SweepList<'a> {
    session: &'a mut Session,
}

impl SweepList<'_> {
    pub async fn status(&mut self) -> WsaResult<SweepStatus> {
        self.session.sweep_status().await
    }

    /// Number of saved entries.
    pub async fn size(&mut self) -> WsaResult<i32> {
        let query = "SWEEP:ENTRY:COUNT?";
        let size = self.session.query_int(query).await?;
        i32::try_from(size)
            .ok()
            .filter(|s| *s >= 0)
            .ok_or_else(|| WsaError::out_of_range_response(query, size))
    }

    /// Reset the template to instrument defaults.
    pub async fn entry_new(&mut self) -> WsaResult<()> {
        self.session.send_command("SWEEP:ENTRY:NEW").await
    }

    /// Save the template at `id`; 0 appends.
    pub async fn save(&mut self, id: i32) -> WsaResult<()> {
        let size = self.size().await?;
        if id < 0 || id > size + 1 {
            return Err(WsaError::SweepIdOutOfBound { id, size });
        }
        self.session
            .send_command(&format!("SWEEP:ENTRY:SAVE {id}"))
            .await
    }

    /// Fetch saved entry `id`.
    pub async fn read(&mut self, id: i32) -> WsaResult<SweepEntry> {
        let mut entry = SweepEntry::default();
        self.read_into(id, &mut entry).await?;
        Ok(entry)
    }

    /// Fetch saved entry `id` into `entry`. A `NONE` trigger leaves the
    /// trigger window of `entry` as it was.
    pub async fn read_into(&mut self, id: i32, entry: &mut SweepEntry) -> WsaResult<()> {
        let size = self.size().await?;
        if id < 1 || id > size {
            return Err(WsaError::SweepIdOutOfBound { id, size });
        }
        let query = format!("SWEEP:ENTRY:READ? {id}");
        let record = self.session.query_text(&query).await?;
        entry.apply_record(&record)
    }

    pub async fn delete(&mut self, id: i32) -> WsaResult<()> {
        let size = self.size().await?;
        if id < 1 || id > size {
            return Err(WsaError::SweepIdOutOfBound { id, size });
        }
        self.session
            .send_command(&format!("SWEEP:ENTRY:DELETE {id}"))
            .await
    }

    pub async fn delete_all(&mut self) -> WsaResult<()> {
        self.session.send_command("SWEEP:ENTRY:DELETE ALL").await
    }

    /// Load saved entry `id` into the template.
    pub async fn copy(&mut self, id: i32) -> WsaResult<()> {
        let size = self.size().await?;
        if size == 0 {
            return Err(WsaError::SweepListEmpty);
        }
        if id < 1 || id > size {
            return Err(WsaError::SweepIdOutOfBound { id, size });
        }
        self.session
            .send_command(&format!("SWEEP:ENTRY:COPY {id}"))
            .await
    }

    pub async fn start(&mut self) -> WsaResult<()> {
        self.check_startable().await?;
        self.session.send_command("SWEEP:LIST:START").await?;
        info!("Sweep list started");
        Ok(())
    }

    /// Continue from the entry where the list last stopped.
    pub async fn resume(&mut self) -> WsaResult<()> {
        self.check_startable().await?;
        self.session.send_command("SWEEP:LIST:RESUME").await?;
        info!("Sweep list resumed");
        Ok(())
    }

    /// Stop the list, flush the instrument and discard data already in
    /// flight. Returns the number of bytes discarded.
    pub async fn stop(&mut self) -> WsaResult<usize> {
        self.session.send_command("SWEEP:LIST:STOP").await?;
        self.session.flush_data().await?;

        let window = self.session.config.stop_drain;
        let read_timeout = self.session.config.drain_read_timeout;
        let drained = self.session.drain_data(window, read_timeout).await?;
        info!("Sweep list stopped");
        Ok(drained)
    }

    async fn check_startable(&mut self) -> WsaResult<()> {
        if self.status().await? == SweepStatus::Running {
            return Err(WsaError::SweepAlreadyRunning);
        }
        if self.size().await? == 0 {
            return Err(WsaError::SweepListEmpty);
        }
        Ok(())
    }

    pub async fn iteration(&mut self) -> WsaResult<u32> {
        let query = "SWEEP:LIST:ITERATION?";
        let count = self.session.query_int(query).await?;
        u32::try_from(count).map_err(|_| WsaError::out_of_range_response(query, count))
    }

    /// Number of passes over the list; 0 sweeps until stopped.
    pub async fn set_iteration(&mut self, count: u32) -> WsaResult<()> {
        self.session
            .send_command(&format!("SWEEP:LIST:ITERATION {count}"))
            .await
    }

    pub async fn antenna(&mut self) -> WsaResult<i32> {
        let value = self.template_int("SWEEP:ENTRY:ANTENNA?").await?;
        self.checked("SWEEP:ENTRY:ANTENNA?", value, |s, v| {
            s.descriptor().verify_antenna(v)
        })
    }

    pub async fn set_antenna(&mut self, port: i32) -> WsaResult<()> {
        self.session.descriptor().verify_antenna(port)?;
        self.session
            .send_command(&format!("SWEEP:ENTRY:ANTENNA {port}"))
            .await
    }

    pub async fn if_gain(&mut self) -> WsaResult<i32> {
        let value = self.template_int("SWEEP:ENTRY:GAIN:IF?").await?;
        self.checked("SWEEP:ENTRY:GAIN:IF?", value, |s, v| {
            s.descriptor().verify_if_gain(v)
        })
    }

    pub async fn set_if_gain(&mut self, gain_db: i32) -> WsaResult<()> {
        self.session.descriptor().verify_if_gain(gain_db)?;
        self.session
            .send_command(&format!("SWEEP:ENTRY:GAIN:IF {gain_db}"))
            .await
    }

    pub async fn rf_gain(&mut self) -> WsaResult<RfGain> {
        let query = "SWEEP:ENTRY:GAIN:RF?";
        let text = self.session.query_text(query).await?;
        RfGain::parse(&text).map_err(|_| WsaError::unknown_response(query, &text))
    }

    pub async fn set_rf_gain(&mut self, gain: RfGain) -> WsaResult<()> {
        self.session
            .send_command(&format!("SWEEP:ENTRY:GAIN:RF {}", gain.as_scpi()))
            .await
    }

    pub async fn samples_per_packet(&mut self) -> WsaResult<i32> {
        let value = self.template_int("SWEEP:ENTRY:SPPACKET?").await?;
        self.checked("SWEEP:ENTRY:SPPACKET?", value, |s, v| {
            s.descriptor().verify_samples_per_packet(v)
        })
    }

    pub async fn set_samples_per_packet(&mut self, spp: i32) -> WsaResult<()> {
        self.session.descriptor().verify_samples_per_packet(spp)?;
        self.session
            .send_command(&format!("SWEEP:ENTRY:SPPACKET {spp}"))
            .await
    }

    pub async fn packets_per_block(&mut self) -> WsaResult<i32> {
        let value = self.template_int("SWEEP:ENTRY:PPBLOCK?").await?;
        self.checked("SWEEP:ENTRY:PPBLOCK?", value, |s, v| {
            s.descriptor().verify_packets_per_block(v)
        })
    }

    pub async fn set_packets_per_block(&mut self, ppb: i32) -> WsaResult<()> {
        self.session.descriptor().verify_packets_per_block(ppb)?;
        self.session
            .send_command(&format!("SWEEP:ENTRY:PPBLOCK {ppb}"))
            .await
    }

    pub async fn decimation(&mut self) -> WsaResult<i32> {
        let value = self.template_int("SWEEP:ENTRY:DECIMATION?").await?;
        self.checked("SWEEP:ENTRY:DECIMATION?", value, |s, v| {
            s.descriptor().verify_decimation(v)
        })
    }

    pub async fn set_decimation(&mut self, rate: i32) -> WsaResult<()> {
        self.session.descriptor().verify_decimation(rate)?;
        self.session
            .send_command(&format!("SWEEP:ENTRY:DECIMATION {rate}"))
            .await
    }

    /// Template start and stop centre frequencies.
    pub async fn freq_range(&mut self) -> WsaResult<(i64, i64)> {
        let query = "SWEEP:ENTRY:FREQ:CENT?";
        let text = self.session.query_text(query).await?;
        let values = scpi::parse_numbers(query, &text, 2)?;
        let (start, stop) = (values[0] as i64, values[1] as i64);
        let descriptor = self.session.descriptor();
        if descriptor.verify_freq(start).is_err() || descriptor.verify_freq(stop).is_err() {
            return Err(WsaError::out_of_range_response(query, text));
        }
        Ok((start, stop))
    }

    pub async fn set_freq_range(&mut self, start_hz: i64, stop_hz: i64) -> WsaResult<()> {
        self.verify_window(start_hz, stop_hz)?;
        self.session
            .send_command(&format!(
                "SWEEP:ENTRY:FREQ:CENT {start_hz} Hz, {stop_hz} Hz"
            ))
            .await
    }

    pub async fn freq_shift(&mut self) -> WsaResult<f64> {
        let query = "SWEEP:ENTRY:FREQ:SHIFT?";
        let shift = self.session.query_float(query).await?;
        if self.session.descriptor().verify_freq_shift(shift).is_err() {
            return Err(WsaError::out_of_range_response(query, shift));
        }
        Ok(shift)
    }

    pub async fn set_freq_shift(&mut self, hz: f64) -> WsaResult<()> {
        self.session.descriptor().verify_freq_shift(hz)?;
        self.session
            .send_command(&format!("SWEEP:ENTRY:FREQ:SHIFt {hz} Hz"))
            .await
    }

    pub async fn freq_step(&mut self) -> WsaResult<i64> {
        Ok(self.session.query_float("SWEEP:ENTRY:FREQ:STEP?").await? as i64)
    }

    pub async fn set_freq_step(&mut self, step_hz: i64) -> WsaResult<()> {
        self.session
            .send_command(&format!("SWEEP:ENTRY:FREQ:STEP {step_hz} Hz"))
            .await
    }

    pub async fn dwell(&mut self) -> WsaResult<Dwell> {
        let query = "SWEEP:ENTRY:DWELL?";
        let text = self.session.query_text(query).await?;
        let values = scpi::parse_numbers(query, &text, 2)?;
        Dwell::new(values[0] as i32, values[1] as i32)
            .map_err(|_| WsaError::out_of_range_response(query, text))
    }

    pub async fn set_dwell(&mut self, dwell: Dwell) -> WsaResult<()> {
        let dwell = Dwell::new(dwell.seconds, dwell.microseconds)?;
        self.session
            .send_command(&format!(
                "SWEEP:ENTRY:DWELL {},{}",
                dwell.seconds, dwell.microseconds
            ))
            .await
    }

    pub async fn trigger_level(&mut self) -> WsaResult<TriggerLevel> {
        let query = "SWEEP:ENTRY:TRIGGER:LEVEL?";
        let text = self.session.query_text(query).await?;
        scpi::parse_trigger_level(query, &text)
    }

    pub async fn set_trigger_level(&mut self, level: TriggerLevel) -> WsaResult<()> {
        self.verify_window(level.start_hz, level.stop_hz)?;
        self.session
            .send_command(&format!(
                "SWEEP:ENTRY:TRIGGER:LEVEL {},{},{}",
                level.start_hz, level.stop_hz, level.amplitude_dbm
            ))
            .await
    }

    pub async fn trigger_type(&mut self) -> WsaResult<TriggerType> {
        let query = "SWEEP:ENTRY:TRIGGER:TYPE?";
        let text = self.session.query_text(query).await?;
        TriggerType::parse(&text).map_err(|_| WsaError::unknown_response(query, &text))
    }

    pub async fn set_trigger_type(&mut self, trigger: TriggerType) -> WsaResult<()> {
        self.session
            .send_command(&format!("SWEEP:ENTRY:TRIGGER:TYPE {}", trigger.as_scpi()))
            .await
    }

    /// Set the trigger type from its 0/1 form.
    pub async fn set_trigger_enable(&mut self, enable: i32) -> WsaResult<()> {
        let trigger = TriggerType::from_enable(enable)?;
        self.set_trigger_type(trigger).await
    }

    /// Write every field of `entry` into the template. All fields are
    /// checked before the first command is sent.
    pub async fn apply_template(&mut self, entry: &SweepEntry) -> WsaResult<()> {
        self.verify_entry(entry)?;

        self.set_freq_range(entry.start_freq_hz, entry.stop_freq_hz)
            .await?;
        self.set_freq_step(entry.freq_step_hz).await?;
        self.set_freq_shift(entry.freq_shift_hz).await?;
        if self.session.descriptor().decimation.is_some() {
            self.set_decimation(entry.decimation).await?;
        }
        if self.session.descriptor().max_antenna_port.is_some() {
            self.set_antenna(entry.antenna).await?;
        }
        self.set_rf_gain(entry.rf_gain).await?;
        if self.session.descriptor().if_gain.is_some() {
            self.set_if_gain(entry.if_gain_db).await?;
        }
        self.set_samples_per_packet(entry.samples_per_packet).await?;
        self.set_packets_per_block(entry.packets_per_block).await?;
        self.set_dwell(entry.dwell).await?;
        if entry.trigger_type == TriggerType::Level {
            self.set_trigger_level(entry.trigger_level).await?;
        }
        self.set_trigger_type(entry.trigger_type).await
    }

    fn verify_entry(&self, entry: &SweepEntry) -> WsaResult<()> {
        let descriptor = self.session.descriptor();
        self.verify_window(entry.start_freq_hz, entry.stop_freq_hz)?;
        descriptor.verify_freq_shift(entry.freq_shift_hz)?;
        if descriptor.decimation.is_some() {
            descriptor.verify_decimation(entry.decimation)?;
        }
        if descriptor.max_antenna_port.is_some() {
            descriptor.verify_antenna(entry.antenna)?;
        }
        if descriptor.if_gain.is_some() {
            descriptor.verify_if_gain(entry.if_gain_db)?;
        }
        descriptor.verify_samples_per_packet(entry.samples_per_packet)?;
        descriptor.verify_packets_per_block(entry.packets_per_block)?;
        Dwell::new(entry.dwell.seconds, entry.dwell.microseconds)?;
        if entry.trigger_type == TriggerType::Level {
            self.verify_window(entry.trigger_level.start_hz, entry.trigger_level.stop_hz)?;
        }
        Ok(())
    }

    fn verify_window(&self, start_hz: i64, stop_hz: i64) -> WsaResult<()> {
        let descriptor = self.session.descriptor();
        if descriptor.verify_freq(start_hz).is_err() {
            return Err(WsaError::StartOutOfBound(start_hz));
        }
        if descriptor.verify_freq(stop_hz).is_err() {
            return Err(WsaError::StopOutOfBound(stop_hz));
        }
        if stop_hz <= start_hz {
            return Err(WsaError::InvalidStopFreq {
                start: start_hz,
                stop: stop_hz,
            });
        }
        Ok(())
    }

    async fn template_int(&mut self, query: &str) -> WsaResult<i32> {
        let value = self.session.query_int(query).await?;
        i32::try_from(value).map_err(|_| WsaError::out_of_range_response(query, value))
    }

    fn checked(
        &self,
        query: &str,
        value: i32,
        verify: impl Fn(&Session, i32) -> WsaResult<()>,
    ) -> WsaResult<i32> {
        verify(&*self.session, value).map_err(|_| WsaError::out_of_range_response(query, value))?;
        Ok(value)
    }
}
