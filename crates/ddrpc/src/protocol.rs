// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Call envelope wire format.
//!
//! Every transport message carries exactly one packet. The first byte is the
//! packet kind; all integers are little-endian.
//!
//! ```text
//! Request (32 bytes)
//! +------+-----+-------+-----+---------+-------+-------+-------+----------+------------+
//! | 0x01 | ver | flags | rsv | service | major | minor | patch | function | param size |
//! |  1B  | 1B  |  1B   | 1B  |   4B    |  4B   |  4B   |  4B   |    4B    |     8B     |
//! +------+-----+-------+-----+---------+-------+-------+-------+----------+------------+
//!
//! Data            | 0x10 | rsv 3B | size u32 | bytes... |
//! SizeIndicator   | 0x11 | rsv 3B | total u64 |
//! Terminator      | 0x12 | rsv 3B | result i32 |
//! ```
//!
//! A call is one `Request` followed by its parameters as `Data` packets. The
//! response is an optional `SizeIndicator`, zero or more `Data` packets and
//! exactly one `Terminator`.

use crate::error::ResultCode;
use crate::types::{ApiVersion, FunctionId, ServiceId};
use thiserror::Error;

/// Envelope version written into every request
pub const ENVELOPE_VERSION: u8 = 1;

/// Encoded size of a request packet
pub const REQUEST_HEADER_SIZE: usize = 32;

/// Size of the header in front of a data packet's bytes
pub const DATA_HEADER_SIZE: usize = 8;

/// Encoded size of a size-indicator packet
pub const SIZE_INDICATOR_SIZE: usize = 12;

/// Encoded size of a terminator packet
pub const TERMINATOR_SIZE: usize = 8;

/// Request flag: the caller supplied a response writer
const FLAG_HAS_RESPONSE_WRITER: u8 = 0x01;

/// Wire format errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Packet is empty
    #[error("empty packet")]
    Empty,

    /// Packet ends before its fixed header does
    #[error("truncated packet: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    /// First byte is not a known packet kind
    #[error("unknown packet kind 0x{0:02x}")]
    UnknownKind(u8),

    /// Request was produced by an incompatible envelope version
    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u8),

    /// A data packet's declared size differs from its length
    #[error("data packet declares {declared} bytes but carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// Destination buffer cannot hold the encoded packet
    #[error("buffer too small")]
    BufferTooSmall,
}

impl WireError {
    /// Map onto the wire-level status taxonomy.
    pub fn code(&self) -> ResultCode {
        match self {
            Self::BufferTooSmall => ResultCode::BufferTooSmall,
            _ => ResultCode::CorruptedPacket,
        }
    }
}

/// Packet kind tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketKind {
    Request = 0x01,
    Data = 0x10,
    SizeIndicator = 0x11,
    Terminator = 0x12,
}

impl PacketKind {
    /// Convert from the leading packet byte
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Request),
            0x10 => Some(Self::Data),
            0x11 => Some(Self::SizeIndicator),
            0x12 => Some(Self::Terminator),
            _ => None,
        }
    }
}

/// Header of a call request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestHeader {
    pub service_id: ServiceId,
    /// Version of the service the caller was built against
    pub version: ApiVersion,
    pub function_id: FunctionId,
    /// Total parameter bytes following in data packets
    pub param_size: u64,
    /// Whether the caller accepts response bytes
    pub has_response_writer: bool,
}

impl RequestHeader {
    /// Encode into `buf`, returning the number of bytes written.
    pub fn encode_le(&self, buf: &mut [u8]) -> Result<usize, WireError> {
        if buf.len() < REQUEST_HEADER_SIZE {
            return Err(WireError::BufferTooSmall);
        }

        buf[0] = PacketKind::Request as u8;
        buf[1] = ENVELOPE_VERSION;
        buf[2] = if self.has_response_writer {
            FLAG_HAS_RESPONSE_WRITER
        } else {
            0
        };
        buf[3] = 0;
        buf[4..8].copy_from_slice(&self.service_id.to_le_bytes());
        buf[8..12].copy_from_slice(&self.version.major.to_le_bytes());
        buf[12..16].copy_from_slice(&self.version.minor.to_le_bytes());
        buf[16..20].copy_from_slice(&self.version.patch.to_le_bytes());
        buf[20..24].copy_from_slice(&self.function_id.to_le_bytes());
        buf[24..32].copy_from_slice(&self.param_size.to_le_bytes());

        Ok(REQUEST_HEADER_SIZE)
    }

    /// Decode from `src`, returning the header and bytes consumed.
    pub fn decode_le(src: &[u8]) -> Result<(Self, usize), WireError> {
        check_len(src, REQUEST_HEADER_SIZE)?;
        if src[0] != PacketKind::Request as u8 {
            return Err(WireError::UnknownKind(src[0]));
        }
        if src[1] != ENVELOPE_VERSION {
            return Err(WireError::UnsupportedVersion(src[1]));
        }

        let header = Self {
            has_response_writer: src[2] & FLAG_HAS_RESPONSE_WRITER != 0,
            service_id: read_u32(src, 4),
            version: ApiVersion::new(read_u32(src, 8), read_u32(src, 12), read_u32(src, 16)),
            function_id: read_u32(src, 20),
            param_size: u64::from_le_bytes(read_array(src, 24)),
        };

        Ok((header, REQUEST_HEADER_SIZE))
    }
}

/// A decoded packet borrowing from the received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet<'a> {
    Request(RequestHeader),
    Data(&'a [u8]),
    SizeIndicator(u64),
    Terminator(ResultCode),
}

impl<'a> Packet<'a> {
    /// Decode one message. Trailing bytes after fixed-size packets are rejected.
    pub fn decode(src: &'a [u8]) -> Result<Self, WireError> {
        let first = *src.first().ok_or(WireError::Empty)?;
        let kind = PacketKind::from_u8(first).ok_or(WireError::UnknownKind(first))?;

        match kind {
            PacketKind::Request => {
                let (header, used) = RequestHeader::decode_le(src)?;
                check_exact(src, used)?;
                Ok(Self::Request(header))
            }
            PacketKind::Data => {
                check_len(src, DATA_HEADER_SIZE)?;
                let declared = read_u32(src, 4) as usize;
                let body = &src[DATA_HEADER_SIZE..];
                if body.len() != declared {
                    return Err(WireError::LengthMismatch {
                        declared,
                        actual: body.len(),
                    });
                }
                Ok(Self::Data(body))
            }
            PacketKind::SizeIndicator => {
                check_len(src, SIZE_INDICATOR_SIZE)?;
                check_exact(src, SIZE_INDICATOR_SIZE)?;
                Ok(Self::SizeIndicator(u64::from_le_bytes(read_array(src, 4))))
            }
            PacketKind::Terminator => {
                check_len(src, TERMINATOR_SIZE)?;
                check_exact(src, TERMINATOR_SIZE)?;
                let raw = i32::from_le_bytes(read_array(src, 4));
                Ok(Self::Terminator(ResultCode::from_i32(raw)))
            }
        }
    }

    /// Encode into a freshly allocated message.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Request(header) => {
                let mut buf = vec![0u8; REQUEST_HEADER_SIZE];
                // Buffer is sized for the header
                let _ = header.encode_le(&mut buf);
                buf
            }
            Self::Data(bytes) => {
                let mut buf = Vec::with_capacity(DATA_HEADER_SIZE + bytes.len());
                buf.extend_from_slice(&[PacketKind::Data as u8, 0, 0, 0]);
                buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                buf.extend_from_slice(bytes);
                buf
            }
            Self::SizeIndicator(total) => {
                let mut buf = Vec::with_capacity(SIZE_INDICATOR_SIZE);
                buf.extend_from_slice(&[PacketKind::SizeIndicator as u8, 0, 0, 0]);
                buf.extend_from_slice(&total.to_le_bytes());
                buf
            }
            Self::Terminator(code) => {
                let mut buf = Vec::with_capacity(TERMINATOR_SIZE);
                buf.extend_from_slice(&[PacketKind::Terminator as u8, 0, 0, 0]);
                buf.extend_from_slice(&code.as_i32().to_le_bytes());
                buf
            }
        }
    }

    /// Kind tag of this packet
    pub fn kind(&self) -> PacketKind {
        match self {
            Self::Request(_) => PacketKind::Request,
            Self::Data(_) => PacketKind::Data,
            Self::SizeIndicator(_) => PacketKind::SizeIndicator,
            Self::Terminator(_) => PacketKind::Terminator,
        }
    }
}

/// Split `bytes` into chunks that fit one data packet under `max_payload_size`.
pub fn data_chunks(bytes: &[u8], max_payload_size: usize) -> std::slice::Chunks<'_, u8> {
    let chunk = max_payload_size.saturating_sub(DATA_HEADER_SIZE).max(1);
    bytes.chunks(chunk)
}

fn check_len(src: &[u8], needed: usize) -> Result<(), WireError> {
    if src.len() < needed {
        return Err(WireError::Truncated {
            needed,
            got: src.len(),
        });
    }
    Ok(())
}

fn check_exact(src: &[u8], expected: usize) -> Result<(), WireError> {
    if src.len() != expected {
        return Err(WireError::LengthMismatch {
            declared: expected,
            actual: src.len(),
        });
    }
    Ok(())
}

fn read_array<const N: usize>(src: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&src[offset..offset + N]);
    out
}

fn read_u32(src: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(read_array(src, offset))
}
