// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Async client for WSA spectrum instruments: a session over a SCPI
//! command channel and a VRT data channel.

pub mod address;
pub mod capture;
pub mod config;
pub mod control;
pub mod session;
pub mod sweep;
pub mod transaction;

#[cfg(test)]
mod test_support;

pub use address::{parse_interface, validate_address, InstrumentEndpoints};
pub use capture::Block;
pub use config::ClientConfig;
pub use session::{descriptor_for, Channel, Session, SessionConfig};
pub use sweep::SweepList;
pub use transaction::QueryReply;
