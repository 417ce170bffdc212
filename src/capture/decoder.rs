//! Camera payload decoding (MJPEG, YUYV) into BGR frames

use image::ImageFormat;

use super::frame::{ElementType, Frame};
use crate::error::CaptureError;
use crate::PixelFormat;

/// Convert a raw device buffer into a packed BGR frame
pub fn decode_frame(
    data: &[u8],
    format: PixelFormat,
    width: usize,
    height: usize,
) -> Result<Frame, CaptureError> {
    match format {
        PixelFormat::Mjpeg => {
            let rgb = image::load_from_memory_with_format(data, ImageFormat::Jpeg)?.into_rgb8();
            let (cols, rows) = (rgb.width() as usize, rgb.height() as usize);
            let mut bgr = rgb.into_raw();
            for px in bgr.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
            Ok(Frame::new(rows, cols, ElementType::BGR8, bgr)?)
        }
        PixelFormat::Yuyv => Ok(Frame::new(
            height,
            width,
            ElementType::BGR8,
            yuyv_to_bgr(data, width, height)?,
        )?),
    }
}

fn yuyv_to_bgr(data: &[u8], width: usize, height: usize) -> Result<Vec<u8>, CaptureError> {
    let expected = width * height * 2;
    if data.len() < expected || width % 2 != 0 {
        return Err(CaptureError::UnsupportedFormat(format!(
            "YUYV buffer of {} bytes for {width}x{height}",
            data.len()
        )));
    }
    let mut out = Vec::with_capacity(width * height * 3);
    // Each 4-byte group carries two pixels sharing chroma (BT.601)
    for group in data[..expected].chunks_exact(4) {
        let (u, v) = (group[1] as f32 - 128.0, group[3] as f32 - 128.0);
        for y in [group[0], group[2]] {
            let y = y as f32;
            let r = y + 1.402 * v;
            let g = y - 0.344 * u - 0.714 * v;
            let b = y + 1.772 * u;
            out.extend_from_slice(&[clamp(b), clamp(g), clamp(r)]);
        }
    }
    Ok(out)
}

fn clamp(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_chroma_yields_gray() {
        let data = [100, 128, 200, 128];
        let frame = decode_frame(&data, PixelFormat::Yuyv, 2, 1).unwrap();
        assert_eq!(frame.row(0), &[100, 100, 100, 200, 200, 200]);
    }

    #[test]
    fn short_yuyv_buffer_is_rejected() {
        assert!(decode_frame(&[0; 6], PixelFormat::Yuyv, 2, 2).is_err());
    }
}
