// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Command/query transactions on the command channel.
//!
//! Queries are strictly request/reply. Reply bytes that arrive across a
//! timed-out read attempt are kept, so a later attempt completes the same
//! line instead of losing its head.

use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::time;
use tracing::{debug, info, warn};

use wsa_core::{WsaError, WsaResult};
use wsa_protocol::scpi::{self, ErrorQueueReply, ERROR_QUERY};

use crate::session::{Channel, Session};

const MAX_REPLY_BYTES: usize = 64 * 1024;
const MAX_WRITE_RESENDS: usize = 3;
const MAX_LATE_REPLIES: usize = 32;

/// Reply to one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryReply {
    /// Length of the trimmed reply; zero means the instrument answered with
    /// an empty line.
    pub status: usize,
    pub output: String,
}

impl QueryReply {
    fn new(line: &str) -> Self {
        let output = line.trim().to_string();
        Self {
            status: output.len(),
            output,
        }
    }

    /// The reply text, or [`WsaError::QueryNoResponse`] when it is empty.
    pub fn required(self, query: &str) -> WsaResult<String> {
        if self.status == 0 {
            return Err(WsaError::QueryNoResponse(query.trim_end().to_string()));
        }
        Ok(self.output)
    }
}

pub(crate) struct CommandChannel {
    reader: BufReader<Box<dyn Channel>>,
    pending: Vec<u8>,
    /// Set when a query went unanswered; its reply may still arrive.
    desynced: bool,
}

impl CommandChannel {
    pub(crate) fn new(stream: Box<dyn Channel>) -> Self {
        Self {
            reader: BufReader::new(stream),
            pending: Vec::new(),
            desynced: false,
        }
    }

    async fn write_line(&mut self, line: &str, limit: Duration) -> WsaResult<()> {
        let bytes = line.as_bytes();
        let mut offset = 0;
        let mut resends = 0;
        loop {
            let stream = self.reader.get_mut();
            let written = time::timeout(limit, stream.write(&bytes[offset..]))
                .await
                .map_err(|_| WsaError::Timeout(format!("write of '{}'", line.trim_end())))?
                .map_err(|e| WsaError::io("command write failed", e))?;
            offset += written;
            if offset >= bytes.len() {
                break;
            }
            if written == 0 || resends == MAX_WRITE_RESENDS {
                return Err(WsaError::CommandSendFailed(format!(
                    "'{}': {offset} of {} bytes accepted",
                    line.trim_end(),
                    bytes.len()
                )));
            }
            resends += 1;
            warn!(
                "Partial write of '{}' ({offset}/{} bytes), resending",
                line.trim_end(),
                bytes.len()
            );
        }

        time::timeout(limit, self.reader.get_mut().flush())
            .await
            .map_err(|_| WsaError::Timeout("command flush".to_string()))?
            .map_err(|e| WsaError::io("command flush failed", e))
    }

    /// Discard replies to unanswered queries until the channel stays quiet
    /// for `quiet`, so the next query reads its own reply.
    async fn resync(&mut self, quiet: Duration) {
        for _ in 0..MAX_LATE_REPLIES {
            match self.read_line(quiet).await {
                Some(Ok(line)) => warn!("Discarded late reply '{}'", line.trim()),
                Some(Err(_)) | None => break,
            }
        }
        self.pending.clear();
        self.desynced = false;
    }

    /// One timed attempt at completing a reply line.
    async fn read_line(&mut self, limit: Duration) -> Option<WsaResult<String>> {
        let read = read_limited_line(&mut self.reader, &mut self.pending, MAX_REPLY_BYTES);
        match time::timeout(limit, read).await {
            Err(_) => None,
            Ok(Ok(bytes)) => Some(Ok(String::from_utf8_lossy(&bytes).into_owned())),
            Ok(Err(e)) => Some(Err(WsaError::io("command read failed", e))),
        }
    }
}

/// Read up to and including a newline into `line`, returning its bytes.
///
/// Bytes are moved into `line` before they are consumed from `reader`, so a
/// cancelled call loses nothing.
async fn read_limited_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    line: &mut Vec<u8>,
    max_bytes: usize,
) -> std::io::Result<Vec<u8>> {
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if line.is_empty() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "command channel closed by instrument",
                ));
            }
            return Ok(std::mem::take(line));
        }

        let (chunk_len, complete) = match available.iter().position(|b| *b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (available.len(), false),
        };
        if line.len() + chunk_len > max_bytes {
            line.clear();
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("reply exceeds maximum size of {max_bytes} bytes"),
            ));
        }
        line.extend_from_slice(&available[..chunk_len]);
        reader.consume(chunk_len);
        if complete {
            return Ok(std::mem::take(line));
        }
    }
}

impl Session {
    fn command_channel(&mut self) -> WsaResult<&mut CommandChannel> {
        self.command.as_mut().ok_or(WsaError::NotConnected)
    }

    fn log_transaction(&self, direction: &str, text: &str) {
        if self.config.debug {
            info!("{direction} {}", text.trim_end());
        } else {
            debug!("{direction} {}", text.trim_end());
        }
    }

    /// Write one line without checking the error queue.
    pub(crate) async fn write_raw(&mut self, cmd: &str) -> WsaResult<()> {
        let line = scpi::terminate(cmd);
        let limit = self.config.command_timeout;
        self.log_transaction(">>", &line);
        let channel = self.command_channel()?;
        if channel.desynced {
            channel.resync(limit).await;
        }
        channel.write_line(&line, limit).await
    }

    /// Send a command that expects no reply.
    ///
    /// Every command except a data request is followed by an error-queue
    /// read; a non-empty queue fails the command.
    pub async fn send_command(&mut self, cmd: &str) -> WsaResult<()> {
        self.write_raw(cmd).await?;
        if scpi::is_data_request(cmd) {
            return Ok(());
        }

        let reply = self.send_query(ERROR_QUERY).await?;
        match scpi::classify_error_queue(&reply.output) {
            ErrorQueueReply::NoError => Ok(()),
            ErrorQueueReply::TriggerConflict => {
                warn!("Trigger conflict reported after '{}'", cmd.trim_end());
                Err(WsaError::TriggerConflict(cmd.trim_end().to_string()))
            }
            ErrorQueueReply::Error(message) => Err(WsaError::SetFailed {
                command: cmd.trim_end().to_string(),
                message,
            }),
        }
    }

    /// Send a query and wait for its reply line.
    ///
    /// The read is attempted `query_attempts` times, each bounded by the
    /// command timeout, before the query is reported as unanswered. The
    /// next write on the channel first discards any reply that turns up
    /// late.
    pub async fn send_query(&mut self, cmd: &str) -> WsaResult<QueryReply> {
        self.write_raw(cmd).await?;

        let attempts = self.config.query_attempts.max(1);
        let limit = self.config.command_timeout;
        for attempt in 1..=attempts {
            let channel = self.command_channel()?;
            match channel.read_line(limit).await {
                Some(line) => {
                    let reply = QueryReply::new(&line?);
                    self.log_transaction("<<", &reply.output);
                    return Ok(reply);
                }
                None if attempt < attempts => {
                    debug!(
                        "No reply to '{}' yet (attempt {attempt}/{attempts})",
                        cmd.trim_end()
                    );
                }
                None => channel.desynced = true,
            }
        }
        warn!("No reply to '{}' after {attempts} attempts", cmd.trim_end());
        Err(WsaError::QueryNoResponse(cmd.trim_end().to_string()))
    }

    /// Send a query whose reply must not be empty.
    pub async fn query_text(&mut self, cmd: &str) -> WsaResult<String> {
        self.send_query(cmd).await?.required(cmd)
    }

    pub(crate) async fn query_int(&mut self, cmd: &str) -> WsaResult<i64> {
        let text = self.query_text(cmd).await?;
        scpi::parse_int(cmd, &text)
    }

    pub(crate) async fn query_float(&mut self, cmd: &str) -> WsaResult<f64> {
        let text = self.query_text(cmd).await?;
        scpi::parse_float(cmd, &text)
    }

    /// Run a command script.
    ///
    /// Lines carrying `:`, `*` or `?` are sent in order; queries have their
    /// replies collected. Processing stops at the first failure. Returns the
    /// number of lines sent and the collected replies.
    pub async fn send_command_file(
        &mut self,
        path: &Path,
    ) -> WsaResult<(usize, Vec<QueryReply>)> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| WsaError::io(format!("reading {}", path.display()), e))?;

        let mut replies = Vec::new();
        let mut sent = 0;
        for line in scpi::script_lines(&text) {
            if scpi::is_query(line) && !scpi::is_data_request(line) {
                let reply = self.send_query(line).await?;
                info!("{line} -> {}", reply.output);
                replies.push(reply);
            } else {
                self.send_command(line).await?;
            }
            sent += 1;
        }
        Ok((sent, replies))
    }
}
