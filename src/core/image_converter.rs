// Image normalization: turns host image payloads into RGBA frames
// Handles encoded files (with EXIF orientation) and raw camera buffers in
// NV21, BGRA8888 or RGBA8888 layout.

use crate::models::image::{ImageData, ImageMetadata, PixelFormat};
use crate::models::pose::{BridgeError, BridgeResult};
use image::{imageops, DynamicImage, ImageDecoder, ImageReader, RgbaImage};
use std::path::Path;

/// Convert host image data into engine-ready RGBA pixels.
/// The capture timestamp is assigned later, when the frame is handed on.
pub fn normalize(data: &ImageData) -> BridgeResult<RgbaImage> {
    match data {
        ImageData::File { path } => decode_file(path),
        ImageData::Bytes { bytes, metadata } => from_raw_bytes(bytes, metadata),
    }
}

fn invalid(message: impl Into<String>) -> BridgeError {
    BridgeError::InvalidArgument(message.into())
}

/// Decode an image file and apply its EXIF orientation
pub fn decode_file(path: &Path) -> BridgeResult<RgbaImage> {
    let reader = ImageReader::open(path)
        .map_err(|e| invalid(format!("Failed to open image {}: {}", path.display(), e)))?
        .with_guessed_format()
        .map_err(|e| invalid(format!("Failed to read image {}: {}", path.display(), e)))?;

    let mut decoder = reader
        .into_decoder()
        .map_err(|e| invalid(format!("Unsupported image {}: {}", path.display(), e)))?;

    let orientation = decoder.orientation().ok();
    let mut image = DynamicImage::from_decoder(decoder)
        .map_err(|e| invalid(format!("Failed to decode image {}: {}", path.display(), e)))?;

    if let Some(orientation) = orientation {
        image.apply_orientation(orientation);
    }

    Ok(image.to_rgba8())
}

/// Rebuild an RGBA image from a raw pixel buffer
pub fn from_raw_bytes(bytes: &[u8], metadata: &ImageMetadata) -> BridgeResult<RgbaImage> {
    let (width, height) = (metadata.width, metadata.height);
    if width == 0 || height == 0 {
        return Err(invalid(format!("Invalid image size {}x{}", width, height)));
    }

    let rotation = metadata.rotation.unwrap_or(0);
    if ![0, 90, 180, 270].contains(&rotation) {
        return Err(invalid(format!(
            "Invalid rotation {}, must be 0, 90, 180 or 270",
            rotation
        )));
    }

    let format = metadata.pixel_format.unwrap_or(PixelFormat::Nv21);
    let image = match format {
        PixelFormat::Nv21 => nv21_to_rgba(bytes, width, height)?,
        PixelFormat::Bgra8888 | PixelFormat::Rgba8888 => {
            packed_to_rgba(bytes, width, height, metadata.bytes_per_row, format)?
        }
    };

    Ok(rotate(image, rotation))
}

fn nv21_to_rgba(bytes: &[u8], width: u32, height: u32) -> BridgeResult<RgbaImage> {
    let (w, h) = (width as usize, height as usize);
    let chroma_w = w.div_ceil(2);
    let chroma_h = h.div_ceil(2);
    let luma_len = w * h;
    let expected = luma_len + 2 * chroma_w * chroma_h;

    if bytes.len() < expected {
        return Err(invalid(format!(
            "NV21 buffer too small for {}x{}: {} bytes, need {}",
            width,
            height,
            bytes.len(),
            expected
        )));
    }

    let (luma, chroma) = bytes.split_at(luma_len);
    let mut image = RgbaImage::new(width, height);

    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let (x, y) = (x as usize, y as usize);
        let vu = (y / 2) * chroma_w * 2 + (x / 2) * 2;
        let (r, g, b) = yuv_to_rgb(luma[y * w + x], chroma[vu + 1], chroma[vu]);
        *pixel = image::Rgba([r, g, b, 255]);
    }

    Ok(image)
}

/// BT.601 limited-range conversion
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let c = (y as i32 - 16).max(0);
    let d = u as i32 - 128;
    let e = v as i32 - 128;

    let clamp = |value: i32| ((value + 128) >> 8).clamp(0, 255) as u8;
    (
        clamp(298 * c + 409 * e),
        clamp(298 * c - 100 * d - 208 * e),
        clamp(298 * c + 516 * d),
    )
}

fn packed_to_rgba(
    bytes: &[u8],
    width: u32,
    height: u32,
    bytes_per_row: Option<u32>,
    format: PixelFormat,
) -> BridgeResult<RgbaImage> {
    let tight = width as usize * 4;
    let stride = bytes_per_row.map(|s| s as usize).unwrap_or(tight);
    if stride < tight {
        return Err(invalid(format!(
            "bytesPerRow {} is smaller than {} bytes needed for width {}",
            stride, tight, width
        )));
    }

    let expected = stride * (height as usize - 1) + tight;
    if bytes.len() < expected {
        return Err(invalid(format!(
            "Pixel buffer too small for {}x{}: {} bytes, need {}",
            width,
            height,
            bytes.len(),
            expected
        )));
    }

    let mut pixels = Vec::with_capacity(tight * height as usize);
    for row in bytes.chunks(stride).take(height as usize) {
        let row = &row[..tight];
        match format {
            PixelFormat::Bgra8888 => {
                for bgra in row.chunks_exact(4) {
                    pixels.extend_from_slice(&[bgra[2], bgra[1], bgra[0], bgra[3]]);
                }
            }
            _ => pixels.extend_from_slice(row),
        }
    }

    RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| invalid("Pixel buffer does not match image size"))
}

fn rotate(image: RgbaImage, rotation: i32) -> RgbaImage {
    match rotation {
        90 => imageops::rotate90(&image),
        180 => imageops::rotate180(&image),
        270 => imageops::rotate270(&image),
        _ => image,
    }
}
