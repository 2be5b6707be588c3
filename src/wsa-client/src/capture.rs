// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Data-channel reads: VRT frames, whole capture blocks and draining.

use std::time::Duration;

use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::time::{self, Instant};
use tracing::{trace, warn};

use wsa_core::{SweepStatus, WsaError, WsaResult};
use wsa_protocol::vrt::{self, PacketPrefix, PREFIX_BYTES};
use wsa_protocol::{DigitizerContext, Frame, ReceiverContext, StreamKind, VrtHeader, VrtTrailer};

use crate::session::{Channel, Session};

const READ_CHUNK_BYTES: usize = 16 * 1024;

pub(crate) struct DataChannel {
    stream: Box<dyn Channel>,
    pending: Vec<u8>,
}

impl DataChannel {
    pub(crate) fn new(stream: Box<dyn Channel>) -> Self {
        Self {
            stream,
            pending: Vec::new(),
        }
    }

    /// Take exactly `len` bytes, reading with `limit` per read call.
    ///
    /// Bytes read before a timeout stay buffered for the next call.
    async fn read_exact(&mut self, len: usize, limit: Duration) -> WsaResult<Vec<u8>> {
        let mut chunk = vec![0u8; READ_CHUNK_BYTES];
        while self.pending.len() < len {
            let n = time::timeout(limit, self.stream.read(&mut chunk))
                .await
                .map_err(|_| WsaError::Timeout("data channel read".to_string()))?
                .map_err(|e| WsaError::io("data channel read failed", e))?;
            if n == 0 {
                return Err(WsaError::io(
                    "data channel read failed",
                    std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "data channel closed by instrument",
                    ),
                ));
            }
            self.pending.extend_from_slice(&chunk[..n]);
        }
        Ok(self.pending.drain(..len).collect())
    }

    /// Discard everything that arrives within `window`.
    async fn drain(&mut self, window: Duration, read_timeout: Duration) -> usize {
        let mut drained = std::mem::take(&mut self.pending).len();
        let mut chunk = vec![0u8; READ_CHUNK_BYTES];
        let deadline = Instant::now() + window;
        while Instant::now() < deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match time::timeout(read_timeout.min(remaining), self.stream.read(&mut chunk)).await {
                Ok(Ok(0)) | Ok(Err(_)) => break,
                Ok(Ok(n)) => drained += n,
                Err(_) => {}
            }
        }
        drained
    }

    /// Drop buffered bytes, then discard reads until the channel stays quiet
    /// for `quiet` or `window` runs out. Returns the bytes discarded.
    async fn resync(&mut self, window: Duration, quiet: Duration) -> usize {
        let mut discarded = std::mem::take(&mut self.pending).len();
        let mut chunk = vec![0u8; READ_CHUNK_BYTES];
        let deadline = Instant::now() + window;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match time::timeout(quiet.min(remaining), self.stream.read(&mut chunk)).await {
                Ok(Ok(n)) if n > 0 => discarded += n,
                _ => break,
            }
        }
        discarded
    }
}

/// IQ samples of one capture block with the packet metadata seen on the
/// way.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Block {
    pub i: Vec<i16>,
    pub q: Vec<i16>,
    pub headers: Vec<VrtHeader>,
    pub trailers: Vec<VrtTrailer>,
    pub receiver: Option<ReceiverContext>,
    pub digitizer: Option<DigitizerContext>,
}

impl Session {
    fn data_channel(&mut self) -> WsaResult<&mut DataChannel> {
        self.data.as_mut().ok_or(WsaError::NotConnected)
    }

    /// Request one block of `packets_per_block` IF data packets.
    pub async fn capture_block(&mut self) -> WsaResult<()> {
        self.send_command("TRACE:BLOCK:DATA?").await
    }

    /// Stop the capture in progress. Refused while the sweep list runs.
    pub async fn abort_capture(&mut self) -> WsaResult<()> {
        self.refuse_while_sweeping().await?;
        self.send_command("SYSTEM:ABORT").await
    }

    /// Drop data buffered on the instrument. Refused while the sweep list
    /// runs.
    pub async fn flush_data(&mut self) -> WsaResult<()> {
        self.refuse_while_sweeping().await?;
        self.send_command("SWEEP:FLUSH").await
    }

    async fn refuse_while_sweeping(&mut self) -> WsaResult<()> {
        if self.sweep_status().await? == SweepStatus::Running {
            return Err(WsaError::SweepAlreadyRunning);
        }
        Ok(())
    }

    /// Abort after a failed frame read. A failure of the abort itself is
    /// logged and the read error is reported instead.
    async fn abort_after_read_failure(&mut self, cause: &WsaError) {
        warn!("Aborting capture after frame read failure: {cause}");
        self.aborts_issued += 1;
        if let Err(e) = self.write_raw("SYSTEM:ABORT").await {
            warn!("Abort after read failure failed: {e}");
        }
    }

    /// Throw away the rest of a packet whose read failed part way, so the
    /// next read starts on a packet boundary.
    async fn resync_data(&mut self) {
        let window = self.config.stop_drain;
        let quiet = self.config.drain_read_timeout;
        if let Some(channel) = self.data.as_mut() {
            let discarded = channel.resync(window, quiet).await;
            if discarded > 0 {
                warn!("Discarded {discarded} data bytes to resynchronize");
            }
        }
    }

    /// Consume the body of a packet with an unknown stream identifier. If
    /// its declared size cannot be read the channel is resynchronized.
    async fn skip_unknown_packet(&mut self, prefix_bytes: &[u8]) {
        let limit = self.config.data_timeout;
        let skipped = match (vrt::declared_body_len(prefix_bytes), self.data.as_mut()) {
            (Some(len), Some(channel)) => channel.read_exact(len, limit).await.is_ok(),
            _ => false,
        };
        if !skipped {
            self.resync_data().await;
        }
    }

    /// Read one VRT packet from the data channel.
    ///
    /// IF data is de-interleaved into `i_buf`/`q_buf`, which must hold
    /// `samples_per_packet` values; context packets leave them untouched.
    /// An unknown stream identifier, or a read failure inside an IF data
    /// packet, sends one abort command before the error is returned. Either
    /// way the rest of the failed packet is consumed first.
    pub async fn read_frame(
        &mut self,
        i_buf: &mut [i16],
        q_buf: &mut [i16],
        samples_per_packet: usize,
    ) -> WsaResult<Frame> {
        let limit = self.config.data_timeout;
        let prefix_bytes = self.data_channel()?.read_exact(PREFIX_BYTES, limit).await?;
        let prefix = match PacketPrefix::decode(&prefix_bytes) {
            Ok(prefix) => prefix,
            Err(e @ WsaError::NotIqFrame(_)) => {
                self.skip_unknown_packet(&prefix_bytes).await;
                self.abort_after_read_failure(&e).await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        trace!(
            "VRT prefix: type {} count {} size {} words stream {:#010x}",
            prefix.packet_type,
            prefix.packet_count,
            prefix.size_words,
            prefix.stream_id
        );

        let body = match self.data_channel()?.read_exact(prefix.body_len(), limit).await {
            Ok(body) => body,
            Err(e) => {
                if prefix.kind == StreamKind::IfData {
                    self.abort_after_read_failure(&e).await;
                }
                self.resync_data().await;
                return Err(e);
            }
        };

        if prefix.kind == StreamKind::IfData && prefix.payload_samples() != samples_per_packet {
            return Err(WsaError::MalformedFrame(format!(
                "packet carries {} samples, expected {samples_per_packet}",
                prefix.payload_samples()
            )));
        }
        vrt::decode_body(&prefix, &body, i_buf, q_buf)
    }

    /// [`Session::read_frame`], retrying timeouts up to
    /// `frame_read_retries` times. An attempt that aborted the capture is
    /// not retried.
    pub async fn read_frame_retrying(
        &mut self,
        i_buf: &mut [i16],
        q_buf: &mut [i16],
        samples_per_packet: usize,
    ) -> WsaResult<Frame> {
        let retries = self.config.frame_read_retries;
        let mut failures = 0;
        loop {
            let aborts_before = self.aborts_issued;
            match self.read_frame(i_buf, q_buf, samples_per_packet).await {
                Err(e)
                    if e.is_transient_read()
                        && failures < retries
                        && self.aborts_issued == aborts_before =>
                {
                    failures += 1;
                    warn!("Frame read failed ({e}), retry {failures}/{retries}");
                }
                result => return result,
            }
        }
    }

    /// Read `packets_per_block` IF data packets of `samples_per_packet`
    /// samples each, keeping the latest context packets seen in between.
    pub async fn read_block(
        &mut self,
        samples_per_packet: usize,
        packets_per_block: usize,
    ) -> WsaResult<Block> {
        let total = samples_per_packet * packets_per_block;
        let mut block = Block {
            i: vec![0; total],
            q: vec![0; total],
            ..Block::default()
        };

        let mut packets = 0;
        while packets < packets_per_block {
            let range = packets * samples_per_packet..(packets + 1) * samples_per_packet;
            let frame = self
                .read_frame_retrying(
                    &mut block.i[range.clone()],
                    &mut block.q[range],
                    samples_per_packet,
                )
                .await?;
            match frame {
                Frame::Iq { header, trailer } => {
                    block.headers.push(header);
                    block.trailers.push(trailer);
                    packets += 1;
                }
                Frame::Receiver { context, .. } => block.receiver = Some(context),
                Frame::Digitizer { context, .. } => block.digitizer = Some(context),
            }
        }
        Ok(block)
    }

    /// Discard data-channel bytes arriving within `window`, each read bounded
    /// by `read_timeout`. Returns the number of bytes discarded.
    pub async fn drain_data(
        &mut self,
        window: Duration,
        read_timeout: Duration,
    ) -> WsaResult<usize> {
        let drained = self.data_channel()?.drain(window, read_timeout).await;
        if drained > 0 {
            warn!("Discarded {drained} residual data bytes");
        }
        Ok(drained)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context_packet, iq_packet, spawn_instrument, FakeInstrument};
    use tokio::io::AsyncWriteExt;
    use wsa_protocol::vrt::{IF_DATA_STREAM_ID, RECEIVER_CONTEXT_STREAM_ID};

    fn samples(n: usize) -> Vec<(i16, i16)> {
        (0..n as i16).map(|k| (k, -k - 1)).collect()
    }

    #[tokio::test]
    async fn test_read_frame_deinterleaves_payload() {
        let (mut session, mut fake) = spawn_instrument(FakeInstrument::default()).await;
        let pairs = samples(128);
        fake.data
            .write_all(&iq_packet(IF_DATA_STREAM_ID, 3, &pairs))
            .await
            .expect("write");

        let mut i = vec![0i16; 128];
        let mut q = vec![0i16; 128];
        let frame = session.read_frame(&mut i, &mut q, 128).await.expect("frame");
        assert!(frame.is_iq());
        assert_eq!(frame.header().packet_count, 3);
        for (k, (ei, eq)) in pairs.iter().enumerate() {
            assert_eq!(i[k], *ei);
            assert_eq!(q[k], *eq);
        }
        assert_eq!(session.aborts_issued(), 0);
    }

    #[tokio::test]
    async fn test_unknown_stream_aborts_once() {
        let (mut session, mut fake) = spawn_instrument(FakeInstrument::default()).await;
        fake.data
            .write_all(&iq_packet(0x1234_5678, 0, &samples(128)))
            .await
            .expect("write");

        let mut i = vec![0i16; 128];
        let mut q = vec![0i16; 128];
        let err = session
            .read_frame_retrying(&mut i, &mut q, 128)
            .await
            .expect_err("not IQ");
        assert!(matches!(err, WsaError::NotIqFrame(0x1234_5678)));
        assert_eq!(session.aborts_issued(), 1);
        assert!(i.iter().all(|v| *v == 0));

        session.send_query("*STB?").await.expect("sync");
        assert_eq!(fake.count("SYSTEM:ABORT"), 1);
    }

    #[tokio::test]
    async fn test_context_frame_leaves_buffers() {
        let (mut session, mut fake) = spawn_instrument(FakeInstrument::default()).await;
        let freq_fixed = 2_400_000_000i64 << 20;
        let mut fields = vec![(freq_fixed >> 32) as u32, freq_fixed as u32];
        fields.push(0x0000_0a00);
        let indicator = (1 << 27) | (1 << 23);
        fake.data
            .write_all(&context_packet(RECEIVER_CONTEXT_STREAM_ID, indicator, &fields))
            .await
            .expect("write");

        let mut i = vec![7i16; 128];
        let mut q = vec![7i16; 128];
        match session.read_frame(&mut i, &mut q, 128).await.expect("frame") {
            Frame::Receiver { context, .. } => {
                assert_eq!(context.frequency_hz, Some(2_400_000_000.0));
                assert_eq!(context.gain_rf_db, Some(20.0));
            }
            other => panic!("unexpected frame {other:?}"),
        }
        assert!(i.iter().chain(q.iter()).all(|v| *v == 7));
    }

    #[tokio::test]
    async fn test_payload_size_mismatch_is_malformed() {
        let (mut session, mut fake) = spawn_instrument(FakeInstrument::default()).await;
        fake.data
            .write_all(&iq_packet(IF_DATA_STREAM_ID, 0, &samples(128)))
            .await
            .expect("write");
        fake.data
            .write_all(&iq_packet(IF_DATA_STREAM_ID, 1, &samples(256)))
            .await
            .expect("write");

        let mut i = vec![0i16; 256];
        let mut q = vec![0i16; 256];
        assert!(matches!(
            session.read_frame(&mut i, &mut q, 256).await,
            Err(WsaError::MalformedFrame(_))
        ));
        // The short packet was consumed whole; the next one decodes.
        let frame = session.read_frame(&mut i, &mut q, 256).await.expect("frame");
        assert_eq!(frame.header().packet_count, 1);
    }

    #[tokio::test]
    async fn test_unknown_stream_body_is_skipped() {
        let (mut session, mut fake) = spawn_instrument(FakeInstrument::default()).await;
        fake.data
            .write_all(&iq_packet(0x1234_5678, 0, &samples(128)))
            .await
            .expect("write");
        fake.data
            .write_all(&iq_packet(IF_DATA_STREAM_ID, 5, &samples(128)))
            .await
            .expect("write");

        let mut i = vec![0i16; 128];
        let mut q = vec![0i16; 128];
        assert!(matches!(
            session.read_frame(&mut i, &mut q, 128).await,
            Err(WsaError::NotIqFrame(0x1234_5678))
        ));
        let frame = session.read_frame(&mut i, &mut q, 128).await.expect("frame");
        assert_eq!(frame.header().packet_count, 5);
        assert_eq!(i[127], 127);
        assert_eq!(session.aborts_issued(), 1);
    }

    fn short_timeouts() -> crate::session::SessionConfig {
        crate::session::SessionConfig {
            data_timeout: Duration::from_millis(30),
            drain_read_timeout: Duration::from_millis(20),
            frame_read_retries: 3,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_truncated_iq_body_aborts() {
        let (mut session, mut fake) =
            crate::test_support::spawn_with_config(FakeInstrument::default(), short_timeouts())
                .await;
        let packet = iq_packet(IF_DATA_STREAM_ID, 0, &samples(128));
        fake.data.write_all(&packet[..40]).await.expect("write");

        let mut i = vec![0i16; 128];
        let mut q = vec![0i16; 128];
        let err = session
            .read_frame_retrying(&mut i, &mut q, 128)
            .await
            .expect_err("truncated");
        assert!(matches!(err, WsaError::Timeout(_)));
        assert_eq!(session.aborts_issued(), 1);
    }

    #[tokio::test]
    async fn test_read_after_truncated_body_starts_fresh() {
        let (mut session, mut fake) =
            crate::test_support::spawn_with_config(FakeInstrument::default(), short_timeouts())
                .await;
        let packet = iq_packet(IF_DATA_STREAM_ID, 0, &samples(128));
        fake.data.write_all(&packet[..40]).await.expect("write");

        let mut i = vec![0i16; 128];
        let mut q = vec![0i16; 128];
        assert!(matches!(
            session.read_frame(&mut i, &mut q, 128).await,
            Err(WsaError::Timeout(_))
        ));

        fake.data
            .write_all(&iq_packet(IF_DATA_STREAM_ID, 7, &samples(128)))
            .await
            .expect("write");
        let frame = session.read_frame(&mut i, &mut q, 128).await.expect("frame");
        assert_eq!(frame.header().packet_count, 7);
        assert_eq!(q[3], -4);
        assert_eq!(session.aborts_issued(), 1);
    }

    #[tokio::test]
    async fn test_retry_covers_late_packet() {
        let config = crate::session::SessionConfig {
            data_timeout: Duration::from_millis(30),
            frame_read_retries: 5,
            ..Default::default()
        };
        let (mut session, fake) =
            crate::test_support::spawn_with_config(FakeInstrument::default(), config).await;
        let mut data = fake.data;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            let _ = data
                .write_all(&iq_packet(IF_DATA_STREAM_ID, 9, &samples(128)))
                .await;
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let mut i = vec![0i16; 128];
        let mut q = vec![0i16; 128];
        let frame = session
            .read_frame_retrying(&mut i, &mut q, 128)
            .await
            .expect("frame after retries");
        assert_eq!(frame.header().packet_count, 9);
        assert_eq!(session.aborts_issued(), 0);
    }

    #[tokio::test]
    async fn test_read_block_collects_packets_and_context() {
        let (mut session, mut fake) = spawn_instrument(FakeInstrument::default()).await;
        session.capture_block().await.expect("capture");
        fake.data
            .write_all(&context_packet(RECEIVER_CONTEXT_STREAM_ID, 1 << 30, &[42]))
            .await
            .expect("write");
        for count in 0..2u8 {
            let pairs: Vec<(i16, i16)> = (0..128).map(|k| (k + 128 * count as i16, 0)).collect();
            fake.data
                .write_all(&iq_packet(IF_DATA_STREAM_ID, count, &pairs))
                .await
                .expect("write");
        }

        let block = session.read_block(128, 2).await.expect("block");
        assert_eq!(block.headers.len(), 2);
        assert_eq!(block.i.len(), 256);
        assert_eq!(block.i[200], 200);
        assert_eq!(block.receiver.and_then(|c| c.reference_point), Some(42));
        assert!(block.digitizer.is_none());
        assert_eq!(fake.count("TRACE:BLOCK:DATA?"), 1);
    }

    #[tokio::test]
    async fn test_abort_and_flush_refused_while_running() {
        let fake = FakeInstrument::default().reply("SWEEP:LIST:STATUS?", "RUNNING");
        let (mut session, fake) = spawn_instrument(fake).await;
        assert!(matches!(
            session.abort_capture().await,
            Err(WsaError::SweepAlreadyRunning)
        ));
        assert!(matches!(
            session.flush_data().await,
            Err(WsaError::SweepAlreadyRunning)
        ));
        assert_eq!(fake.count("SYSTEM:ABORT"), 0);
        assert_eq!(fake.count("SWEEP:FLUSH"), 0);
    }

    #[tokio::test]
    async fn test_drain_discards_buffered_bytes() {
        let (mut session, mut fake) = spawn_instrument(FakeInstrument::default()).await;
        fake.data.write_all(&[0u8; 100]).await.expect("write");
        let drained = session
            .drain_data(Duration::from_millis(80), Duration::from_millis(20))
            .await
            .expect("drain");
        assert_eq!(drained, 100);
    }
}
