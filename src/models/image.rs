// Data structures for inbound images and engine-ready frames

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Image payload as sent by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ImageData {
    /// Encoded image file on disk (jpeg, png, ...)
    File { path: PathBuf },
    /// Raw pixel buffer, typically a camera frame
    Bytes {
        bytes: Vec<u8>,
        metadata: ImageMetadata,
    },
}

/// Describes how a raw pixel buffer should be reconstructed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub rotation: Option<i32>, // Clockwise degrees: 0, 90, 180 or 270
    #[serde(default, alias = "image_format")]
    pub pixel_format: Option<PixelFormat>, // Defaults to NV21
    #[serde(default, alias = "bytes_per_row")]
    pub bytes_per_row: Option<u32>, // Row stride of packed formats
}

/// Pixel layouts accepted for raw buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PixelFormatRepr", rename_all = "lowercase")]
pub enum PixelFormat {
    Nv21,
    Bgra8888,
    Rgba8888,
}

impl PixelFormat {
    pub const FOURCC_BGRA: u32 = 0x4247_5241;
    pub const FOURCC_RGBA: u32 = 0x5247_4241;
}

/// Hosts send either a format name or a four-character code
#[derive(Deserialize)]
#[serde(untagged)]
enum PixelFormatRepr {
    Name(String),
    FourCc(u32),
}

impl TryFrom<PixelFormatRepr> for PixelFormat {
    type Error = String;

    fn try_from(repr: PixelFormatRepr) -> Result<Self, Self::Error> {
        match repr {
            PixelFormatRepr::Name(name) => match name.to_lowercase().as_str() {
                "nv21" => Ok(PixelFormat::Nv21),
                "bgra8888" | "bgra" => Ok(PixelFormat::Bgra8888),
                "rgba8888" | "rgba" => Ok(PixelFormat::Rgba8888),
                _ => Err(format!("Unsupported pixel format: {}", name)),
            },
            PixelFormatRepr::FourCc(PixelFormat::FOURCC_BGRA) => Ok(PixelFormat::Bgra8888),
            PixelFormatRepr::FourCc(PixelFormat::FOURCC_RGBA) => Ok(PixelFormat::Rgba8888),
            PixelFormatRepr::FourCc(code) => Err(format!("Unsupported pixel format code: {:#010x}", code)),
        }
    }
}

/// Engine-ready RGBA frame with its capture timestamp
#[derive(Debug, Clone)]
pub struct NormalizedFrame {
    image: RgbaImage,
    timestamp_ms: i64,
}

impl NormalizedFrame {
    pub fn new(image: RgbaImage, timestamp_ms: i64) -> Self {
        Self { image, timestamp_ms }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}
