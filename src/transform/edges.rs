use image::{imageops, GrayImage};
use serde::{Deserialize, Serialize};

use super::ImageTransform;
use crate::capture::{Depth, ElementType, Frame};
use crate::error::TransformError;

/// Grayscale, Gaussian blur, then Sobel magnitude thresholded to a
/// binary edge map
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeDetect {
    pub sigma: f32,
    pub threshold: f32,
}

impl Default for EdgeDetect {
    fn default() -> Self {
        Self {
            sigma: 1.5,
            threshold: 30.0,
        }
    }
}

impl EdgeDetect {
    fn to_gray(frame: &Frame) -> Result<GrayImage, TransformError> {
        let element = frame.element();
        if element.depth() != Depth::U8 {
            return Err(TransformError::UnsupportedElementType(element));
        }
        let channels = element.channels() as usize;
        let mut gray = Vec::with_capacity(frame.rows() * frame.cols());
        for row in frame.row_iter() {
            match channels {
                1 => gray.extend_from_slice(row),
                3 | 4 => gray.extend(row.chunks_exact(channels).map(|px| {
                    let (b, g, r) = (px[0] as f32, px[1] as f32, px[2] as f32);
                    (0.114 * b + 0.587 * g + 0.299 * r).round() as u8
                })),
                _ => return Err(TransformError::UnsupportedElementType(element)),
            }
        }
        GrayImage::from_raw(frame.cols() as u32, frame.rows() as u32, gray)
            .ok_or_else(|| TransformError::Failed("gray buffer size mismatch".into()))
    }

    fn edges(&self, gray: &GrayImage) -> Vec<u8> {
        let (w, h) = (gray.width() as usize, gray.height() as usize);
        let src = gray.as_raw();
        let mut out = vec![0u8; w * h];
        if w < 3 || h < 3 {
            return out;
        }
        let at = |x: usize, y: usize| src[y * w + x] as f32;
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                let gx = at(x + 1, y - 1) + 2.0 * at(x + 1, y) + at(x + 1, y + 1)
                    - at(x - 1, y - 1)
                    - 2.0 * at(x - 1, y)
                    - at(x - 1, y + 1);
                let gy = at(x - 1, y + 1) + 2.0 * at(x, y + 1) + at(x + 1, y + 1)
                    - at(x - 1, y - 1)
                    - 2.0 * at(x, y - 1)
                    - at(x + 1, y - 1);
                if gx.hypot(gy) >= self.threshold {
                    out[y * w + x] = 255;
                }
            }
        }
        out
    }
}

impl ImageTransform for EdgeDetect {
    fn transform(&self, frame: Frame) -> Result<Frame, TransformError> {
        let gray = Self::to_gray(&frame)?;
        let blurred = if self.sigma > 0.0 && gray.width() > 0 && gray.height() > 0 {
            imageops::blur(&gray, self.sigma)
        } else {
            gray
        };
        let edges = self.edges(&blurred);
        Ok(Frame::new(
            frame.rows(),
            frame.cols(),
            ElementType::GRAY8,
            edges,
        )?)
    }
}
