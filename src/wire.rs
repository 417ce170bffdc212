//! Flat byte encoding used to hand frames across thread boundaries.
//!
//! Layout: `[i32 rows][i32 cols][i32 type code][payload]` in native byte
//! order, payload packed row-major with stride `cols * bytes_per_element`.

use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::capture::frame::{ElementType, Frame};
use crate::error::DecodeError;

/// Three native `i32`s
pub const HEADER_LEN: usize = 3 * std::mem::size_of::<i32>();

/// An encoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage(Bytes);

impl WireMessage {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn decode(&self) -> Result<Frame, DecodeError> {
        decode(&self.0)
    }
}

impl From<Bytes> for WireMessage {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Vec<u8>> for WireMessage {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

/// Encode a frame, packing strided rows as it goes
pub fn encode(frame: &Frame) -> WireMessage {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + frame.packed_len());
    // Frame construction bounds rows/cols to i32::MAX
    buf.put_i32_ne(frame.rows() as i32);
    buf.put_i32_ne(frame.cols() as i32);
    buf.put_i32_ne(frame.element().code());

    if frame.is_contiguous() {
        buf.put_slice(&frame.as_bytes()[..frame.packed_len()]);
    } else {
        for row in frame.row_iter() {
            buf.put_slice(row);
        }
    }
    WireMessage(buf.freeze())
}

/// Decode into a freshly allocated frame that never aliases `bytes`
pub fn decode(bytes: &[u8]) -> Result<Frame, DecodeError> {
    if bytes.len() < HEADER_LEN {
        return Err(DecodeError::Truncated {
            len: bytes.len(),
            header: HEADER_LEN,
        });
    }
    let (mut header, payload) = bytes.split_at(HEADER_LEN);
    let rows = header.get_i32_ne();
    let cols = header.get_i32_ne();
    let code = header.get_i32_ne();

    if rows < 0 || cols < 0 {
        return Err(DecodeError::NegativeDimension { rows, cols });
    }
    let element = ElementType::from_code(code)?;
    let (rows, cols) = (rows as usize, cols as usize);

    let mismatch = |expected| DecodeError::SizeMismatch {
        expected,
        actual: payload.len(),
    };
    let expected = rows
        .checked_mul(cols)
        .and_then(|n| n.checked_mul(element.bytes_per_element()))
        .ok_or_else(|| mismatch(usize::MAX))?;
    if payload.len() != expected {
        return Err(mismatch(expected));
    }

    Frame::new(rows, cols, element, payload.to_vec()).map_err(|_| mismatch(expected))
}

/// Processing time reported by a worker, in seconds
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct TimingSample(f64);

impl TimingSample {
    pub const WIRE_LEN: usize = std::mem::size_of::<f64>();

    pub fn from_secs(secs: f64) -> Self {
        Self(secs)
    }

    pub fn as_secs(self) -> f64 {
        self.0
    }

    /// Raw 8-byte IEEE-754 double, native byte order, no header
    pub fn to_wire(self) -> [u8; Self::WIRE_LEN] {
        self.0.to_ne_bytes()
    }

    pub fn from_wire(bytes: &[u8]) -> Result<Self, DecodeError> {
        let raw: [u8; Self::WIRE_LEN] =
            bytes.try_into().map_err(|_| DecodeError::SizeMismatch {
                expected: Self::WIRE_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self(f64::from_ne_bytes(raw)))
    }
}

impl From<Duration> for TimingSample {
    fn from(elapsed: Duration) -> Self {
        Self(elapsed.as_secs_f64())
    }
}
