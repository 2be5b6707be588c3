// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::path::PathBuf;

use clap::Parser;
use serde::Serialize;
use tracing::info;

use wsa_app::{init_logging, ConfigFile};
use wsa_client::{ClientConfig, Session};
use wsa_core::DynResult;
use wsa_protocol::scpi;
use wsa_protocol::Frame;

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - WSA instrument client");

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Interface specifier (e.g. TCPIP::192.168.1.20)
    #[arg(short = 'i', long = "interface")]
    interface: Option<String>,
    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long = "log-level")]
    log_level: Option<String>,
    /// Print results as JSON lines
    #[arg(long = "json")]
    json: bool,
    /// SCPI command or query to send (repeatable)
    #[arg(short = 'q', long = "query", value_name = "SCPI")]
    queries: Vec<String>,
    /// Send every SCPI line of a script file
    #[arg(short = 's', long = "script", value_name = "FILE")]
    script: Option<PathBuf>,
    /// Capture one block and print a summary of N IQ frames
    #[arg(long = "capture", value_name = "N")]
    capture: Option<usize>,
}

#[derive(Debug, Serialize)]
struct FrameSummary<'a> {
    frame: &'a Frame,
    i_min: Option<i16>,
    i_max: Option<i16>,
}

fn emit<T: Serialize + std::fmt::Debug>(json: bool, value: &T) -> DynResult<()> {
    if json {
        println!("{}", serde_json::to_string(value)?);
    } else {
        println!("{value:?}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", ClientConfig::example_toml());
        return Ok(());
    }

    let (cfg, config_path) = ClientConfig::load(cli.config.as_deref())?;
    cfg.validate()
        .map_err(|e| format!("Invalid configuration: {e}"))?;

    init_logging(cli.log_level.as_deref().or(cfg.general.log_level.as_deref()));

    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }

    // CLI > config [instrument] section > error
    let interface = cli
        .interface
        .clone()
        .or_else(|| cfg.instrument.interface.clone())
        .ok_or("Interface not specified. Use --interface or set [instrument].interface in config.")?;

    let mut session = Session::open(&interface, cfg.session_config()).await?;
    emit(cli.json, session.descriptor())?;

    let result = run(&cli, &mut session).await;
    session.close();
    result
}

async fn run(cli: &Cli, session: &mut Session) -> DynResult<()> {
    for line in &cli.queries {
        if scpi::is_query(line) && !scpi::is_data_request(line) {
            let reply = session.send_query(line).await?;
            emit(cli.json, &reply)?;
        } else {
            session.send_command(line).await?;
            info!("{line}: OK");
        }
    }

    if let Some(ref path) = cli.script {
        let (sent, replies) = session.send_command_file(path).await?;
        info!("Sent {sent} lines from {}", path.display());
        for reply in &replies {
            emit(cli.json, reply)?;
        }
    }

    if let Some(frames) = cli.capture {
        let spp = usize::try_from(session.samples_per_packet().await?)?;
        session.capture_block().await?;

        let mut i_buf = vec![0i16; spp];
        let mut q_buf = vec![0i16; spp];
        let mut iq_frames = 0;
        while iq_frames < frames {
            let frame = session
                .read_frame_retrying(&mut i_buf, &mut q_buf, spp)
                .await?;
            let (i_min, i_max) = if frame.is_iq() {
                iq_frames += 1;
                (i_buf.iter().min().copied(), i_buf.iter().max().copied())
            } else {
                (None, None)
            };
            emit(
                cli.json,
                &FrameSummary {
                    frame: &frame,
                    i_min,
                    i_max,
                },
            )?;
        }
    }
    Ok(())
}
