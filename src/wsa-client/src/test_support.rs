// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Scripted instrument double for the client tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use wsa_protocol::scpi;
use wsa_protocol::vrt::{HEADER_WORDS, TRAILER_WORDS};

use crate::session::{Session, SessionConfig};

const DEFAULT_TEMPLATE: &str = "2400000000,2400000000,0,0,0,1,HIGH,0,1024,1,0,0,NONE";

#[derive(Default)]
pub(crate) struct FakeInstrument {
    overrides: HashMap<String, String>,
    silent: HashSet<String>,
    errors_after: Vec<(String, String)>,
    queued_errors: VecDeque<String>,
    entries: Vec<String>,
}

impl FakeInstrument {
    /// Answer `query` with `reply` regardless of instrument state.
    pub(crate) fn reply(mut self, query: &str, reply: &str) -> Self {
        self.overrides.insert(normalize(query), reply.to_string());
        self
    }

    /// Never answer `query`.
    pub(crate) fn silent(mut self, query: &str) -> Self {
        self.silent.insert(normalize(query));
        self
    }

    /// Report `error` on the error-queue read that follows a command
    /// starting with `prefix`.
    pub(crate) fn error_after(mut self, prefix: &str, error: &str) -> Self {
        self.errors_after
            .push((normalize(prefix), error.to_string()));
        self
    }

    pub(crate) fn queued_errors(mut self, errors: &[&str]) -> Self {
        self.queued_errors
            .extend(errors.iter().map(|e| e.to_string()));
        self
    }

    pub(crate) fn with_entries(mut self, records: &[&str]) -> Self {
        self.entries = records.iter().map(|r| r.to_string()).collect();
        self
    }
}

struct FakeState {
    script: FakeInstrument,
    values: HashMap<String, String>,
    received: Vec<String>,
    pending_error: Option<String>,
    template: String,
    running: bool,
}

impl FakeState {
    fn new(script: FakeInstrument) -> Self {
        let values = [
            ("*STB?", "0"),
            ("*ESR?", "0"),
            ("*IDN?", "ThinkRF,WSA4000 RFE0560,SN001,2.5.3"),
            ("FREQ:CENT?", "2400000000"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self {
            script,
            values,
            received: Vec::new(),
            pending_error: None,
            template: DEFAULT_TEMPLATE.to_string(),
            running: false,
        }
    }

    /// Handle one received line, returning the reply to write, if any.
    fn handle(&mut self, line: &str) -> Option<String> {
        self.received.push(line.to_string());
        if scpi::is_data_request(line) {
            return None;
        }
        let key = normalize(line);
        if scpi::is_query(line) {
            if self.script.silent.contains(&key) {
                return None;
            }
            return Some(self.answer(&key));
        }
        self.command(&key);
        None
    }

    fn answer(&mut self, key: &str) -> String {
        if let Some(reply) = self.script.overrides.get(key) {
            return reply.clone();
        }
        if key == scpi::ERROR_QUERY {
            return self
                .pending_error
                .take()
                .or_else(|| self.script.queued_errors.pop_front())
                .unwrap_or_else(|| "0,\"No error\"".to_string());
        }
        if key == "SWEEP:ENTRY:COUNT?" {
            return self.script.entries.len().to_string();
        }
        if key == "SWEEP:LIST:STATUS?" {
            return if self.running { "RUNNING" } else { "STOPPED" }.to_string();
        }
        if let Some(id) = key.strip_prefix("SWEEP:ENTRY:READ? ") {
            return self
                .entry_index(id)
                .and_then(|idx| self.script.entries.get(idx).cloned())
                .unwrap_or_default();
        }
        self.values.get(key).cloned().unwrap_or_default()
    }

    fn command(&mut self, key: &str) {
        if let Some((_, error)) = self
            .script
            .errors_after
            .iter()
            .find(|(prefix, _)| key.starts_with(prefix.as_str()))
        {
            self.pending_error = Some(error.clone());
        }

        let (header, args) = key.split_once(' ').unwrap_or((key, ""));
        let args = args.trim();
        match header {
            "SWEEP:ENTRY:NEW" => self.template = DEFAULT_TEMPLATE.to_string(),
            "SWEEP:ENTRY:SAVE" => {
                let id: usize = args.parse().unwrap_or(0);
                if id == 0 || id > self.script.entries.len() {
                    self.script.entries.push(self.template.clone());
                } else {
                    self.script.entries.insert(id - 1, self.template.clone());
                }
            }
            "SWEEP:ENTRY:DELETE" if args == "ALL" => self.script.entries.clear(),
            "SWEEP:ENTRY:DELETE" => {
                if let Some(idx) = self.entry_index(args) {
                    self.script.entries.remove(idx);
                }
            }
            "SWEEP:ENTRY:COPY" => {
                if let Some(record) = self
                    .entry_index(args)
                    .and_then(|idx| self.script.entries.get(idx).cloned())
                {
                    self.template = record;
                }
            }
            "SWEEP:LIST:START" | "SWEEP:LIST:RESUME" => self.running = true,
            "SWEEP:LIST:STOP" => self.running = false,
            "FREQ:CENT" => {
                let hz: i64 = args.trim_end_matches(" HZ").parse().unwrap_or(0);
                let tuned = wsa_core::DeviceDescriptor::default().truncate_to_resolution(hz);
                self.values.insert("FREQ:CENT?".to_string(), tuned.to_string());
            }
            _ if !args.is_empty() => {
                let value = args.replace(" HZ", "").replace(" DB", "");
                self.values.insert(format!("{header}?"), value);
            }
            _ => {}
        }
    }

    fn entry_index(&self, id: &str) -> Option<usize> {
        let id: usize = id.trim().parse().ok()?;
        (1..=self.script.entries.len())
            .contains(&id)
            .then(|| id - 1)
    }
}

fn normalize(line: &str) -> String {
    line.trim().trim_start_matches(':').to_ascii_uppercase()
}

/// Test-side view of a running fake instrument.
pub(crate) struct FakeHandle {
    state: Arc<Mutex<FakeState>>,
    /// Instrument end of the data channel.
    pub(crate) data: DuplexStream,
}

impl FakeHandle {
    fn with_state<T>(&self, f: impl FnOnce(&FakeState) -> T) -> T {
        let state = self.state.lock().expect("fake state lock");
        f(&state)
    }

    pub(crate) fn received(&self) -> Vec<String> {
        self.with_state(|s| s.received.clone())
    }

    pub(crate) fn count(&self, line: &str) -> usize {
        self.with_state(|s| s.received.iter().filter(|l| *l == line).count())
    }

    pub(crate) fn count_prefix(&self, prefix: &str) -> usize {
        self.with_state(|s| s.received.iter().filter(|l| l.starts_with(prefix)).count())
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.with_state(|s| s.script.entries.clone())
    }

    pub(crate) fn template(&self) -> String {
        self.with_state(|s| s.template.clone())
    }
}

pub(crate) async fn spawn_instrument(fake: FakeInstrument) -> (Session, FakeHandle) {
    spawn_with_config(fake, SessionConfig::default()).await
}

pub(crate) async fn spawn_with_config(
    fake: FakeInstrument,
    config: SessionConfig,
) -> (Session, FakeHandle) {
    let (cmd_client, cmd_server) = tokio::io::duplex(64 * 1024);
    let (data_client, data_server) = tokio::io::duplex(256 * 1024);
    let state = Arc::new(Mutex::new(FakeState::new(fake)));

    let task_state = Arc::clone(&state);
    tokio::spawn(async move {
        let (read, mut write) = tokio::io::split(cmd_server);
        let mut lines = BufReader::new(read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let reply = {
                let mut state = task_state.lock().expect("fake state lock");
                state.handle(line.trim())
            };
            if let Some(reply) = reply {
                if write.write_all(format!("{reply}\n").as_bytes()).await.is_err() {
                    break;
                }
            }
        }
    });

    let session = Session::from_channels(Box::new(cmd_client), Box::new(data_client), config)
        .await
        .expect("session opens");
    (
        session,
        FakeHandle {
            state,
            data: data_server,
        },
    )
}

/// IF data packet with the given stream identifier and sample pairs.
pub(crate) fn iq_packet(stream_id: u32, count: u8, samples: &[(i16, i16)]) -> Vec<u8> {
    let size = (HEADER_WORDS + samples.len() + TRAILER_WORDS) as u32;
    let word0 = 0x1000_0000 | (0b01 << 22) | (0b10 << 20) | (u32::from(count & 0xf) << 16) | size;
    let mut out = Vec::new();
    out.extend_from_slice(&word0.to_be_bytes());
    out.extend_from_slice(&stream_id.to_be_bytes());
    out.extend_from_slice(&1_700_000_000u32.to_be_bytes());
    out.extend_from_slice(&0u64.to_be_bytes());
    for (i, q) in samples {
        out.extend_from_slice(&i.to_be_bytes());
        out.extend_from_slice(&q.to_be_bytes());
    }
    out.extend_from_slice(&0x0004_0000u32.to_be_bytes());
    out
}

pub(crate) fn context_packet(stream_id: u32, indicator: u32, fields: &[u32]) -> Vec<u8> {
    let size = (HEADER_WORDS + 1 + fields.len()) as u32;
    let word0 = 0x4000_0000 | (0b01 << 22) | size;
    let mut out = Vec::new();
    out.extend_from_slice(&word0.to_be_bytes());
    out.extend_from_slice(&stream_id.to_be_bytes());
    out.extend_from_slice(&1_700_000_000u32.to_be_bytes());
    out.extend_from_slice(&0u64.to_be_bytes());
    out.extend_from_slice(&indicator.to_be_bytes());
    for word in fields {
        out.extend_from_slice(&word.to_be_bytes());
    }
    out
}
