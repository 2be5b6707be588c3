// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time;
use tracing::{info, warn};

use wsa_app::{name_tokens, normalize_name};
use wsa_core::{DeviceDescriptor, DeviceVariant, ProductModel, WsaError, WsaResult};
use wsa_protocol::scpi::{self, ErrorQueueReply, Identity, ERROR_QUERY};

use crate::address::{parse_interface, validate_address, InstrumentEndpoints};
use crate::capture::DataChannel;
use crate::transaction::CommandChannel;

/// Upper bound on error-queue entries drained at open.
const MAX_QUEUED_ERRORS: usize = 32;

/// Byte stream usable as a command or data channel.
pub trait Channel: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Channel for T {}

/// Timeouts and retry counts threaded through a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub command_timeout: Duration,
    pub data_timeout: Duration,
    pub connect_timeout: Duration,
    /// Timed read attempts before a query counts as unanswered.
    pub query_attempts: u32,
    /// Consecutive transient frame-read failures tolerated by
    /// [`Session::read_frame_retrying`].
    pub frame_read_retries: u32,
    /// Window in which residual data is discarded after a sweep stop.
    pub stop_drain: Duration,
    pub drain_read_timeout: Duration,
    /// Log every transaction at INFO instead of DEBUG.
    pub debug: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_millis(1000),
            data_timeout: Duration::from_millis(1000),
            connect_timeout: Duration::from_secs(5),
            query_attempts: 5,
            frame_read_retries: 5,
            stop_drain: Duration::from_millis(5000),
            drain_read_timeout: Duration::from_millis(360),
            debug: false,
        }
    }
}

/// One connection to an instrument: a command channel, a data channel and
/// the descriptor selected at open.
pub struct Session {
    pub(crate) config: SessionConfig,
    descriptor: DeviceDescriptor,
    identity: Option<Identity>,
    pub(crate) command: Option<CommandChannel>,
    pub(crate) data: Option<DataChannel>,
    pub(crate) aborts_issued: u64,
}

impl Session {
    /// Connect to the instrument named by an interface specifier such as
    /// `TCPIP::192.168.1.20` and identify it.
    pub async fn open(interface: &str, config: SessionConfig) -> WsaResult<Self> {
        let endpoints = parse_interface(interface)?;
        let (command, data) = connect_channels(&endpoints, config.connect_timeout).await?;
        let mut session = Self::from_channels(Box::new(command), Box::new(data), config).await?;
        session.descriptor.interface = "TCPIP".to_string();
        info!(
            "Connected to {} {} at {}",
            session.descriptor.product_name(),
            session.descriptor.rfe_name(),
            endpoints.host
        );
        Ok(session)
    }

    /// Build a session over already connected channels and identify the
    /// instrument. Both channels are released if identification fails.
    pub async fn from_channels(
        command: Box<dyn Channel>,
        data: Box<dyn Channel>,
        config: SessionConfig,
    ) -> WsaResult<Self> {
        let mut session = Self {
            config,
            descriptor: DeviceDescriptor::default(),
            identity: None,
            command: Some(CommandChannel::new(command)),
            data: Some(DataChannel::new(data)),
            aborts_issued: 0,
        };
        if let Err(e) = session.initialize().await {
            session.close();
            return Err(e);
        }
        Ok(session)
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.command.is_some() && self.data.is_some()
    }

    /// Abort commands sent because a frame read failed.
    pub fn aborts_issued(&self) -> u64 {
        self.aborts_issued
    }

    /// Release both channels. Safe to call more than once.
    pub fn close(&mut self) {
        let was_open = self.command.is_some() || self.data.is_some();
        self.command = None;
        self.data = None;
        if was_open {
            info!("Session closed");
        }
    }

    async fn initialize(&mut self) -> WsaResult<()> {
        self.check_status_byte().await?;

        let reply = self.query_text("*IDN?").await?;
        let identity = Identity::parse("*IDN?", &reply)?;
        self.descriptor = descriptor_for(&identity);
        self.identity = Some(identity);
        Ok(())
    }

    async fn check_status_byte(&mut self) -> WsaResult<()> {
        let stb = self.query_int("*STB?").await?;
        if stb & i64::from(scpi::STB_ERROR_QUEUE) != 0 {
            self.drain_error_queue().await?;
        }
        if stb & i64::from(scpi::STB_EVENT_STATUS) != 0 {
            let esr = self.query_text("*ESR?").await?;
            warn!("Event status register: {esr}");
        }
        Ok(())
    }

    async fn drain_error_queue(&mut self) -> WsaResult<()> {
        for _ in 0..MAX_QUEUED_ERRORS {
            let reply = self.send_query(ERROR_QUERY).await?;
            match scpi::classify_error_queue(&reply.output) {
                ErrorQueueReply::NoError => return Ok(()),
                _ => warn!("Queued instrument error: {}", reply.output),
            }
        }
        warn!("Error queue still not empty after {MAX_QUEUED_ERRORS} reads");
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

async fn connect_channels(
    endpoints: &InstrumentEndpoints,
    limit: Duration,
) -> WsaResult<(TcpStream, TcpStream)> {
    let command_addr =
        validate_address(&endpoints.host, &endpoints.command_port.to_string()).await?;
    let data_addr = validate_address(&endpoints.host, &endpoints.data_port.to_string()).await?;

    let command = connect(command_addr.to_string(), limit).await?;
    // The command stream is dropped here if the data connect fails.
    let data = connect(data_addr.to_string(), limit).await?;
    Ok((command, data))
}

async fn connect(addr: String, limit: Duration) -> WsaResult<TcpStream> {
    let stream = time::timeout(limit, TcpStream::connect(&addr))
        .await
        .map_err(|_| WsaError::ConnectFailed {
            addr: addr.clone(),
            reason: format!("timed out after {limit:?}"),
        })?
        .map_err(|e| WsaError::ConnectFailed {
            addr: addr.clone(),
            reason: e.to_string(),
        })?;
    if let Err(e) = stream.set_nodelay(true) {
        warn!("Failed to set TCP_NODELAY on {addr}: {e}");
    }
    Ok(stream)
}

/// Pick the descriptor for an identified instrument. The front-end variant
/// is taken from the model field; an unrecognized model falls back to the
/// default variant.
pub fn descriptor_for(identity: &Identity) -> DeviceDescriptor {
    let tokens = name_tokens(&identity.model);
    let variant = DeviceVariant::ALL
        .into_iter()
        .find(|variant| {
            let name = normalize_name(variant.name());
            tokens.iter().any(|token| token.contains(&name))
        })
        .unwrap_or_else(|| {
            warn!(
                "Unrecognized front end in model '{}', assuming {}",
                identity.model,
                DeviceVariant::default().name()
            );
            DeviceVariant::default()
        });
    DeviceDescriptor::new(ProductModel::Wsa4000, variant)
        .with_versions(&identity.firmware, &identity.model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{spawn_instrument, FakeInstrument};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    fn identity(model: &str) -> Identity {
        Identity {
            manufacturer: "ThinkRF".to_string(),
            model: model.to_string(),
            serial: "SN1".to_string(),
            firmware: "2.5.3".to_string(),
        }
    }

    #[test]
    fn test_descriptor_follows_model_variant() {
        let d = descriptor_for(&identity("WSA4000 RFE0440"));
        assert_eq!(d.variant, DeviceVariant::Rfe0440);
        assert_eq!(d.firmware_version, "2.5.3");
        assert!(d.if_gain.is_none());

        let d = descriptor_for(&identity("WSA4000-RFE0440"));
        assert_eq!(d.variant, DeviceVariant::Rfe0440);
        assert_eq!(d.hardware_version, "WSA4000-RFE0440");
    }

    #[test]
    fn test_descriptor_falls_back_to_default_variant() {
        let d = descriptor_for(&identity("WSA4000"));
        assert_eq!(d.variant, DeviceVariant::Rfe0560);
    }

    #[tokio::test]
    async fn test_open_identifies_instrument() {
        let fake = FakeInstrument::default().reply("*IDN?", "ThinkRF,WSA4000 RFE0440,SN9,3.0.1");
        let (session, fake) = spawn_instrument(fake).await;
        assert!(session.is_open());
        assert_eq!(session.descriptor().variant, DeviceVariant::Rfe0440);
        assert_eq!(session.identity().map(|i| i.serial.as_str()), Some("SN9"));
        assert_eq!(fake.received()[..2], ["*STB?".to_string(), "*IDN?".to_string()]);
    }

    #[tokio::test]
    async fn test_open_drains_error_queue_and_reads_esr() {
        let fake = FakeInstrument::default()
            .reply("*STB?", "36")
            .queued_errors(&["-113,\"Undefined header\"", "-222,\"Data out of range\""]);
        let (_session, fake) = spawn_instrument(fake).await;
        assert_eq!(fake.count(ERROR_QUERY), 3);
        assert_eq!(fake.count("*ESR?"), 1);
    }

    #[tokio::test]
    async fn test_open_failure_closes_channels() {
        let (cmd_client, cmd_server) = tokio::io::duplex(1024);
        let (data_client, _data_server) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(cmd_server);
            let mut lines = BufReader::new(read).lines();
            while let Ok(Some(_)) = lines.next_line().await {
                let _ = write.write_all(b"not-a-number\n").await;
            }
        });
        let result = Session::from_channels(
            Box::new(cmd_client),
            Box::new(data_client),
            SessionConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(WsaError::ResponseUnknown { .. })));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut session, _fake) = spawn_instrument(FakeInstrument::default()).await;
        session.close();
        session.close();
        assert!(!session.is_open());
        assert!(matches!(
            session.send_query("*IDN?").await,
            Err(WsaError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_connect_disables_nagle() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        let accept = tokio::spawn(async move { listener.accept().await.expect("accept") });
        let stream = connect(addr, Duration::from_secs(1)).await.expect("connect");
        assert!(stream.nodelay().expect("nodelay"));
        accept.await.expect("join");
    }

    #[tokio::test]
    async fn test_open_over_tcp() {
        let cmd_listener = TcpListener::bind("127.0.0.1:0").await.expect("bind cmd");
        let data_listener = TcpListener::bind("127.0.0.1:0").await.expect("bind data");
        let cmd_port = cmd_listener.local_addr().expect("cmd addr").port();
        let data_port = data_listener.local_addr().expect("data addr").port();

        let server = tokio::spawn(async move {
            let (cmd, _) = cmd_listener.accept().await.expect("accept cmd");
            let (_data, _) = data_listener.accept().await.expect("accept data");
            let (read, mut write) = cmd.into_split();
            let mut lines = BufReader::new(read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let reply = match line.trim() {
                    "*STB?" => "0",
                    "*IDN?" => "ThinkRF,WSA4000 RFE0560,SN2,2.5.3",
                    _ => "",
                };
                if write.write_all(format!("{reply}\n").as_bytes()).await.is_err() {
                    break;
                }
            }
        });

        let interface = format!("TCPIP::127.0.0.1::{cmd_port},{data_port}");
        let mut session = Session::open(&interface, SessionConfig::default())
            .await
            .expect("open");
        assert_eq!(session.descriptor().rfe_name(), "RFE0560");
        assert_eq!(session.descriptor().interface, "TCPIP");
        session.close();
        server.abort();
    }

    #[tokio::test]
    async fn test_open_reports_connect_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);
        let result = Session::open(
            &format!("TCPIP::127.0.0.1::{port},{port}"),
            SessionConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(WsaError::ConnectFailed { .. })));
    }

    #[tokio::test]
    async fn test_open_rejects_usb() {
        assert!(matches!(
            Session::open("USB", SessionConfig::default()).await,
            Err(WsaError::UsbNotAvailable)
        ));
    }
}
