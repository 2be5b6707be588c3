// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Wire formats spoken by the instrument.
//!
//! This crate performs no I/O: the SCPI helpers build and interpret text
//! lines, and the VRT decoder turns caller-supplied byte buffers into typed
//! frames.

pub mod scpi;
pub mod vrt;

pub use scpi::{classify_error_queue, parse_float, parse_int, ErrorQueueReply, Identity};
pub use vrt::{
    declared_body_len, decode_body, decode_packet, DigitizerContext, Frame, PacketPrefix,
    ReceiverContext, StreamKind, Timestamp, VrtHeader, VrtTrailer,
};
