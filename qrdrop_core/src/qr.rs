//! QR encoding of download URLs.

use crate::error::{Result, ShareError};
use image::{GrayImage, Luma};
use qrcode::render::unicode::Dense1x2;
use qrcode::{EcLevel, QrCode};
use std::path::Path;

/// Default pixel size of one module
pub const DEFAULT_MODULE_PIXELS: u32 = 10;

/// Quiet zone the renderer adds on every side, in modules
pub const QUIET_ZONE_MODULES: u32 = 4;

/// An encoded QR matrix plus the text it carries
pub struct QrArtifact {
    code: QrCode,
    text: String,
    module_pixels: u32,
}

/// Encode the URL's UTF-8 bytes with low error correction
pub fn encode_url(url: &str) -> Result<QrArtifact> {
    let code = QrCode::with_error_correction_level(url.as_bytes(), EcLevel::L)?;
    Ok(QrArtifact {
        code,
        text: url.to_string(),
        module_pixels: DEFAULT_MODULE_PIXELS,
    })
}

impl QrArtifact {
    pub fn with_module_pixels(mut self, pixels: u32) -> Self {
        self.module_pixels = pixels.max(1);
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Width of the matrix in modules, without the quiet zone
    pub fn width(&self) -> usize {
        self.code.width()
    }

    pub fn error_correction(&self) -> EcLevel {
        self.code.error_correction_level()
    }

    /// Grayscale image with square modules and the standard quiet zone
    pub fn to_image(&self) -> GrayImage {
        self.code
            .render::<Luma<u8>>()
            .quiet_zone(true)
            .module_dimensions(self.module_pixels, self.module_pixels)
            .build()
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        self.to_image()
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(|e| ShareError::Qr(format!("cannot write {}: {}", path.display(), e)))
    }

    /// Half-block rendering for terminals (light modules drawn as blocks so
    /// the code reads correctly on dark backgrounds)
    pub fn to_terminal_string(&self) -> String {
        self.code
            .render::<Dense1x2>()
            .dark_color(Dense1x2::Light)
            .light_color(Dense1x2::Dark)
            .quiet_zone(true)
            .build()
    }
}
