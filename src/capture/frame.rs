//! Owned image frames and their element types.
//!
//! Element type codes use the OpenCV packing, `depth + ((channels - 1) << 3)`,
//! so they can cross the wire as a single `i32`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, FrameError};

/// Per-channel sample depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Depth {
    U8 = 0,
    I8 = 1,
    U16 = 2,
    I16 = 3,
    I32 = 4,
    F32 = 5,
    F64 = 6,
    F16 = 7,
}

impl Depth {
    pub const fn bytes(self) -> usize {
        match self {
            Depth::U8 | Depth::I8 => 1,
            Depth::U16 | Depth::I16 | Depth::F16 => 2,
            Depth::I32 | Depth::F32 => 4,
            Depth::F64 => 8,
        }
    }

    fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => Depth::U8,
            1 => Depth::I8,
            2 => Depth::U16,
            3 => Depth::I16,
            4 => Depth::I32,
            5 => Depth::F32,
            6 => Depth::F64,
            7 => Depth::F16,
            _ => return None,
        })
    }
}

/// Element type of a frame: depth plus interleaved channel count.
///
/// The numeric code packs both as `depth + ((channels - 1) << 3)`, so a
/// single-channel 8-bit frame is code 0 and 8-bit BGR is code 16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementType {
    depth: Depth,
    channels: u16,
}

impl ElementType {
    pub const MAX_CHANNELS: u16 = 512;

    pub const GRAY8: ElementType = ElementType::new_unchecked(Depth::U8, 1);
    pub const BGR8: ElementType = ElementType::new_unchecked(Depth::U8, 3);
    pub const BGRA8: ElementType = ElementType::new_unchecked(Depth::U8, 4);
    pub const GRAY16: ElementType = ElementType::new_unchecked(Depth::U16, 1);
    pub const GRAY32F: ElementType = ElementType::new_unchecked(Depth::F32, 1);

    const fn new_unchecked(depth: Depth, channels: u16) -> Self {
        Self { depth, channels }
    }

    pub fn new(depth: Depth, channels: u16) -> Option<Self> {
        (1..=Self::MAX_CHANNELS)
            .contains(&channels)
            .then_some(Self { depth, channels })
    }

    pub fn depth(self) -> Depth {
        self.depth
    }

    pub fn channels(self) -> u16 {
        self.channels
    }

    pub fn bytes_per_element(self) -> usize {
        self.depth.bytes() * self.channels as usize
    }

    pub fn code(self) -> i32 {
        self.depth as i32 + ((self.channels as i32 - 1) << 3)
    }

    pub fn from_code(code: i32) -> Result<Self, DecodeError> {
        if code < 0 {
            return Err(DecodeError::UnknownElementType(code));
        }
        let depth = Depth::from_code(code & 7).ok_or(DecodeError::UnknownElementType(code))?;
        u16::try_from((code >> 3) + 1)
            .ok()
            .and_then(|channels| Self::new(depth, channels))
            .ok_or(DecodeError::UnknownElementType(code))
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}C{}", self.depth, self.channels)
    }
}

/// An owned image buffer, row-major, possibly with padded rows
#[derive(Clone)]
pub struct Frame {
    rows: usize,
    cols: usize,
    element: ElementType,
    stride: usize,
    data: Vec<u8>,
}

impl Frame {
    /// Tightly packed frame; `data` must be exactly `rows * cols * bpe` bytes
    pub fn new(
        rows: usize,
        cols: usize,
        element: ElementType,
        data: Vec<u8>,
    ) -> Result<Self, FrameError> {
        let stride = cols * element.bytes_per_element();
        let frame = Self::with_stride(rows, cols, element, stride, data)?;
        if frame.data.len() != frame.packed_len() {
            return Err(FrameError::BufferSize {
                expected: frame.packed_len(),
                actual: frame.data.len(),
            });
        }
        Ok(frame)
    }

    /// Frame whose rows start every `stride` bytes in `data`
    pub fn with_stride(
        rows: usize,
        cols: usize,
        element: ElementType,
        stride: usize,
        data: Vec<u8>,
    ) -> Result<Self, FrameError> {
        let limit = i32::MAX as usize;
        if rows > limit || cols > limit {
            return Err(FrameError::TooLarge { rows, cols });
        }
        let row_bytes = cols
            .checked_mul(element.bytes_per_element())
            .ok_or(FrameError::TooLarge { rows, cols })?;
        if stride < row_bytes {
            return Err(FrameError::StrideTooShort { stride, row_bytes });
        }
        let expected = match rows {
            0 => 0,
            _ => (rows - 1)
                .checked_mul(stride)
                .and_then(|n| n.checked_add(row_bytes))
                .ok_or(FrameError::TooLarge { rows, cols })?,
        };
        if data.len() < expected {
            return Err(FrameError::BufferSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            rows,
            cols,
            element,
            stride,
            data,
        })
    }

    pub fn zeroed(rows: usize, cols: usize, element: ElementType) -> Result<Self, FrameError> {
        let len = rows
            .checked_mul(cols)
            .and_then(|n| n.checked_mul(element.bytes_per_element()))
            .ok_or(FrameError::TooLarge { rows, cols })?;
        Self::new(rows, cols, element, vec![0; len])
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn element(&self) -> ElementType {
        self.element
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Bytes in one row, excluding padding
    pub fn row_bytes(&self) -> usize {
        self.cols * self.element.bytes_per_element()
    }

    /// Payload size once rows are packed back to back
    pub fn packed_len(&self) -> usize {
        self.rows * self.row_bytes()
    }

    pub fn is_contiguous(&self) -> bool {
        self.stride == self.row_bytes()
    }

    pub fn row(&self, index: usize) -> &[u8] {
        let start = index * self.stride;
        &self.data[start..start + self.row_bytes()]
    }

    pub fn row_iter(&self) -> impl Iterator<Item = &[u8]> + '_ {
        (0..self.rows).map(move |index| self.row(index))
    }

    /// Raw backing buffer including any row padding
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Packed pixel data, dropping row padding if present
    pub fn into_packed(self) -> Vec<u8> {
        if self.is_contiguous() {
            let mut data = self.data;
            data.truncate(self.rows * self.stride);
            return data;
        }
        let mut packed = Vec::with_capacity(self.packed_len());
        for row in self.row_iter() {
            packed.extend_from_slice(row);
        }
        packed
    }

    /// Nearest-neighbour resample into a fresh packed frame
    pub fn resize(&self, rows: usize, cols: usize) -> Result<Frame, FrameError> {
        if rows == self.rows && cols == self.cols {
            return Ok(self.clone());
        }
        let bpe = self.element.bytes_per_element();
        let mut data = Vec::with_capacity(rows * cols * bpe);
        if self.rows == 0 || self.cols == 0 {
            data.resize(rows * cols * bpe, 0);
            return Frame::new(rows, cols, self.element, data);
        }
        let scale_y = self.rows as f64 / rows.max(1) as f64;
        let scale_x = self.cols as f64 / cols.max(1) as f64;
        for y in 0..rows {
            let src_y = ((y as f64 * scale_y) as usize).min(self.rows - 1);
            let src_row = self.row(src_y);
            for x in 0..cols {
                let src_x = ((x as f64 * scale_x) as usize).min(self.cols - 1);
                data.extend_from_slice(&src_row[src_x * bpe..(src_x + 1) * bpe]);
            }
        }
        Frame::new(rows, cols, self.element, data)
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows
            && self.cols == other.cols
            && self.element == other.element
            && self.row_iter().eq(other.row_iter())
    }
}

impl Eq for Frame {}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("element", &self.element)
            .field("stride", &self.stride)
            .finish_non_exhaustive()
    }
}
