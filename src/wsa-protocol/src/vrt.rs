// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! VITA-49 (VRT) packet decoding.
//!
//! Every packet starts with a two-word prefix (packet header word and
//! stream identifier), followed by a body whose length is given in the
//! header word. All words are big-endian.
//!
//! IF data packet body:
//!
//! ```text
//! | seconds | picoseconds (2 words) | I/Q payload (N words) | trailer |
//! ```
//!
//! Context packet body:
//!
//! ```text
//! | seconds | picoseconds (2 words) | indicator | fields ... |
//! ```

use serde::Serialize;
use wsa_core::{WsaError, WsaResult};

pub const RECEIVER_CONTEXT_STREAM_ID: u32 = 0x9000_0001;
pub const DIGITIZER_CONTEXT_STREAM_ID: u32 = 0x9000_0002;
pub const IF_DATA_STREAM_ID: u32 = 0x9000_0003;

pub const BYTES_PER_WORD: usize = 4;
/// Header word plus stream identifier.
pub const PREFIX_WORDS: usize = 2;
pub const PREFIX_BYTES: usize = PREFIX_WORDS * BYTES_PER_WORD;
/// Prefix, integer seconds and the two picosecond words.
pub const HEADER_WORDS: usize = 5;
pub const TRAILER_WORDS: usize = 1;
const CONTEXT_MIN_WORDS: usize = HEADER_WORDS + 1;
const TIMESTAMP_BYTES: usize = (HEADER_WORDS - PREFIX_WORDS) * BYTES_PER_WORD;

/// Context indicator field bits in the order their data appears, with the
/// number of words each occupies.
const CIF_LAYOUT: [(u32, usize); 13] = [
    (30, 1), // reference point
    (29, 2), // bandwidth
    (28, 2), // IF reference frequency
    (27, 2), // RF reference frequency
    (26, 2), // RF reference frequency offset
    (25, 2), // IF band offset
    (24, 1), // reference level
    (23, 1), // gain
    (22, 1), // over-range count
    (21, 2), // sample rate
    (20, 2), // timestamp adjustment
    (19, 1), // timestamp calibration time
    (18, 1), // temperature
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StreamKind {
    ReceiverContext,
    DigitizerContext,
    IfData,
}

impl StreamKind {
    pub fn from_stream_id(id: u32) -> Option<Self> {
        match id {
            RECEIVER_CONTEXT_STREAM_ID => Some(StreamKind::ReceiverContext),
            DIGITIZER_CONTEXT_STREAM_ID => Some(StreamKind::DigitizerContext),
            IF_DATA_STREAM_ID => Some(StreamKind::IfData),
            _ => None,
        }
    }
}

/// Body length declared by a prefix, whatever its stream identifier.
///
/// `None` when fewer than [`PREFIX_BYTES`] are given or the declared size
/// does not cover the prefix itself.
pub fn declared_body_len(prefix: &[u8]) -> Option<usize> {
    if prefix.len() < PREFIX_BYTES {
        return None;
    }
    let size_words = (be_u32(prefix, 0) & 0xffff) as usize;
    size_words
        .checked_sub(PREFIX_WORDS)
        .map(|words| words * BYTES_PER_WORD)
}

/// The first two words of a packet, enough to size and route the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PacketPrefix {
    pub packet_type: u8,
    pub tsi: u8,
    pub tsf: u8,
    /// 4-bit counter, wraps 15 -> 0.
    pub packet_count: u8,
    pub size_words: u16,
    pub stream_id: u32,
    pub kind: StreamKind,
}

impl PacketPrefix {
    /// Decode and sanity-check a packet prefix.
    ///
    /// An unknown stream identifier yields [`WsaError::NotIqFrame`].
    pub fn decode(bytes: &[u8]) -> WsaResult<Self> {
        if bytes.len() < PREFIX_BYTES {
            return Err(WsaError::MalformedFrame(format!(
                "prefix needs {PREFIX_BYTES} bytes, got {}",
                bytes.len()
            )));
        }
        let word0 = be_u32(bytes, 0);
        let stream_id = be_u32(bytes, BYTES_PER_WORD);
        let kind = StreamKind::from_stream_id(stream_id).ok_or(WsaError::NotIqFrame(stream_id))?;

        let prefix = Self {
            packet_type: (word0 >> 28) as u8,
            tsi: ((word0 >> 22) & 0x3) as u8,
            tsf: ((word0 >> 20) & 0x3) as u8,
            packet_count: ((word0 >> 16) & 0xf) as u8,
            size_words: (word0 & 0xffff) as u16,
            stream_id,
            kind,
        };

        let min_words = match kind {
            StreamKind::IfData => HEADER_WORDS + TRAILER_WORDS,
            _ => CONTEXT_MIN_WORDS,
        };
        if (prefix.size_words as usize) < min_words {
            return Err(WsaError::MalformedFrame(format!(
                "declared size {} words is below the minimum of {min_words}",
                prefix.size_words
            )));
        }
        Ok(prefix)
    }

    /// Bytes that follow the prefix.
    pub fn body_len(&self) -> usize {
        (self.size_words as usize - PREFIX_WORDS) * BYTES_PER_WORD
    }

    /// I/Q sample pairs carried by an IF data packet.
    pub fn payload_samples(&self) -> usize {
        match self.kind {
            StreamKind::IfData => self.size_words as usize - HEADER_WORDS - TRAILER_WORDS,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Timestamp {
    pub seconds: u32,
    pub picoseconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VrtHeader {
    pub packet_type: u8,
    pub packet_count: u8,
    pub size_words: u16,
    pub stream_id: u32,
    pub samples_per_packet: usize,
    pub timestamp: Timestamp,
}

impl VrtHeader {
    fn new(prefix: &PacketPrefix, timestamp: Timestamp) -> Self {
        Self {
            packet_type: prefix.packet_type,
            packet_count: prefix.packet_count,
            size_words: prefix.size_words,
            stream_id: prefix.stream_id,
            samples_per_packet: prefix.payload_samples(),
            timestamp,
        }
    }
}

/// Trailer status bits. An indicator is `None` when its enable bit is clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VrtTrailer {
    pub raw: u32,
    pub valid_data: Option<bool>,
    pub ref_lock: Option<bool>,
    pub over_range: Option<bool>,
    pub sample_loss: Option<bool>,
}

impl VrtTrailer {
    pub fn from_word(raw: u32) -> Self {
        // Enable bits sit twelve positions above their indicator.
        let flag = |indicator: u32| {
            if raw & (1 << (indicator + 12)) == 0 {
                None
            } else {
                Some(raw & (1 << indicator) != 0)
            }
        };
        Self {
            raw,
            valid_data: flag(18),
            ref_lock: flag(17),
            over_range: flag(13),
            sample_loss: flag(12),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ReceiverContext {
    pub indicator: u32,
    pub reference_point: Option<u32>,
    pub frequency_hz: Option<f64>,
    pub gain_if_db: Option<f64>,
    pub gain_rf_db: Option<f64>,
    pub temperature_c: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DigitizerContext {
    pub indicator: u32,
    pub bandwidth_hz: Option<f64>,
    pub rf_frequency_offset_hz: Option<f64>,
    pub reference_level_dbm: Option<f64>,
}

/// One decoded packet. IQ samples go to caller-owned buffers and are not
/// held here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Frame {
    Iq {
        header: VrtHeader,
        trailer: VrtTrailer,
    },
    Receiver {
        header: VrtHeader,
        context: ReceiverContext,
    },
    Digitizer {
        header: VrtHeader,
        context: DigitizerContext,
    },
}

impl Frame {
    pub fn header(&self) -> &VrtHeader {
        match self {
            Frame::Iq { header, .. }
            | Frame::Receiver { header, .. }
            | Frame::Digitizer { header, .. } => header,
        }
    }

    pub fn is_iq(&self) -> bool {
        matches!(self, Frame::Iq { .. })
    }
}

/// Decode a packet body that follows an already decoded `prefix`.
///
/// For IF data the payload is de-interleaved into `i_buf` and `q_buf`,
/// which must each hold at least [`PacketPrefix::payload_samples`] values.
/// Context packets leave both buffers untouched.
pub fn decode_body(
    prefix: &PacketPrefix,
    body: &[u8],
    i_buf: &mut [i16],
    q_buf: &mut [i16],
) -> WsaResult<Frame> {
    if body.len() != prefix.body_len() {
        return Err(WsaError::MalformedFrame(format!(
            "declared {} body bytes, got {}",
            prefix.body_len(),
            body.len()
        )));
    }

    match prefix.kind {
        StreamKind::IfData => decode_iq_body(prefix, body, i_buf, q_buf),
        StreamKind::ReceiverContext => {
            let (header, indicator, fields) = decode_context_body(prefix, body)?;
            Ok(Frame::Receiver {
                header,
                context: ReceiverContext {
                    indicator,
                    reference_point: fields.reference_point,
                    frequency_hz: fields.rf_reference_hz,
                    gain_if_db: fields.gain_if_db,
                    gain_rf_db: fields.gain_rf_db,
                    temperature_c: fields.temperature_c,
                },
            })
        }
        StreamKind::DigitizerContext => {
            let (header, indicator, fields) = decode_context_body(prefix, body)?;
            Ok(Frame::Digitizer {
                header,
                context: DigitizerContext {
                    indicator,
                    bandwidth_hz: fields.bandwidth_hz,
                    rf_frequency_offset_hz: fields.rf_offset_hz,
                    reference_level_dbm: fields.reference_level_dbm,
                },
            })
        }
    }
}

/// Decode one whole packet held in `bytes`.
///
/// The declared word count must fit in the bytes available; trailing bytes
/// beyond the declared size are ignored.
pub fn decode_packet(bytes: &[u8], i_buf: &mut [i16], q_buf: &mut [i16]) -> WsaResult<Frame> {
    let prefix = PacketPrefix::decode(bytes)?;
    let total = prefix.size_words as usize * BYTES_PER_WORD;
    if bytes.len() < total {
        return Err(WsaError::MalformedFrame(format!(
            "declared {} words, only {} bytes available",
            prefix.size_words,
            bytes.len()
        )));
    }
    decode_body(&prefix, &bytes[PREFIX_BYTES..total], i_buf, q_buf)
}

fn decode_timestamp(prefix: &PacketPrefix, body: &[u8]) -> Timestamp {
    Timestamp {
        seconds: be_u32(body, 0),
        picoseconds: if prefix.tsf != 0 { be_u64(body, 4) } else { 0 },
    }
}

fn decode_iq_body(
    prefix: &PacketPrefix,
    body: &[u8],
    i_buf: &mut [i16],
    q_buf: &mut [i16],
) -> WsaResult<Frame> {
    if prefix.tsi == 0 {
        return Err(WsaError::InvalidTimestamp);
    }
    let samples = prefix.payload_samples();
    if i_buf.len() < samples || q_buf.len() < samples {
        return Err(WsaError::MalformedFrame(format!(
            "{samples} samples do not fit buffers of {}/{}",
            i_buf.len(),
            q_buf.len()
        )));
    }

    let payload_end = TIMESTAMP_BYTES + samples * BYTES_PER_WORD;
    let payload = &body[TIMESTAMP_BYTES..payload_end];
    for (k, pair) in payload.chunks_exact(BYTES_PER_WORD).enumerate() {
        i_buf[k] = i16::from_be_bytes([pair[0], pair[1]]);
        q_buf[k] = i16::from_be_bytes([pair[2], pair[3]]);
    }

    Ok(Frame::Iq {
        header: VrtHeader::new(prefix, decode_timestamp(prefix, body)),
        trailer: VrtTrailer::from_word(be_u32(body, payload_end)),
    })
}

#[derive(Default)]
struct ContextFields {
    reference_point: Option<u32>,
    bandwidth_hz: Option<f64>,
    rf_reference_hz: Option<f64>,
    rf_offset_hz: Option<f64>,
    reference_level_dbm: Option<f64>,
    gain_if_db: Option<f64>,
    gain_rf_db: Option<f64>,
    temperature_c: Option<f64>,
}

fn decode_context_body(
    prefix: &PacketPrefix,
    body: &[u8],
) -> WsaResult<(VrtHeader, u32, ContextFields)> {
    let header = VrtHeader::new(prefix, decode_timestamp(prefix, body));
    let indicator = be_u32(body, TIMESTAMP_BYTES);
    let data = &body[TIMESTAMP_BYTES + BYTES_PER_WORD..];

    let mut fields = ContextFields::default();
    let mut pos = 0;
    for (bit, words) in CIF_LAYOUT {
        if indicator & (1 << bit) == 0 {
            continue;
        }
        let len = words * BYTES_PER_WORD;
        let field = data.get(pos..pos + len).ok_or_else(|| {
            WsaError::MalformedFrame(format!("context field bit {bit} runs past packet end"))
        })?;
        match bit {
            30 => fields.reference_point = Some(be_u32(field, 0)),
            29 => fields.bandwidth_hz = Some(fixed_point_hz(field)),
            27 => fields.rf_reference_hz = Some(fixed_point_hz(field)),
            26 => fields.rf_offset_hz = Some(fixed_point_hz(field)),
            24 => fields.reference_level_dbm = Some(low_i16(field) as f64 / 128.0),
            23 => {
                let word = be_u32(field, 0);
                fields.gain_if_db = Some((word >> 16) as u16 as i16 as f64 / 128.0);
                fields.gain_rf_db = Some(word as u16 as i16 as f64 / 128.0);
            }
            18 => fields.temperature_c = Some(low_i16(field) as f64 / 64.0),
            _ => {}
        }
        pos += len;
    }
    Ok((header, indicator, fields))
}

/// 64-bit two's complement with 20 fractional bits.
fn fixed_point_hz(field: &[u8]) -> f64 {
    be_u64(field, 0) as i64 as f64 / (1u64 << 20) as f64
}

fn low_i16(field: &[u8]) -> i16 {
    be_u32(field, 0) as u16 as i16
}

fn be_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn be_u64(bytes: &[u8], offset: usize) -> u64 {
    (u64::from(be_u32(bytes, offset)) << 32) | u64::from(be_u32(bytes, offset + 4))
}
