//! Output format handling service
//!
//! Maps target paths to encoders and converts the RGBA result into what the
//! chosen format can carry.

use crate::{
    config::OutputFormat,
    error::{BgRemovalError, Result},
};
use image::{DynamicImage, ImageFormat};
use std::path::Path;

/// Input extensions accepted by the image store
pub const SUPPORTED_INPUT_EXTENSIONS: &[&str] =
    &["png", "jpg", "jpeg", "bmp", "gif", "webp", "tiff", "tif"];

/// Service for handling output format conversions
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Infer the output format from a target path's extension
    ///
    /// # Errors
    /// - Missing extension
    /// - Extension with no supported encoder
    pub fn from_path(path: &Path) -> Result<OutputFormat> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| {
                BgRemovalError::unsupported_format(format!(
                    "'{}' has no file extension; use .png to keep transparency",
                    path.display()
                ))
            })?;

        match extension.as_str() {
            "png" => Ok(OutputFormat::Png),
            "jpg" | "jpeg" => Ok(OutputFormat::Jpeg),
            "tif" | "tiff" => Ok(OutputFormat::Tiff),
            "bmp" => Ok(OutputFormat::Bmp),
            #[cfg(feature = "webp-support")]
            "webp" => Ok(OutputFormat::WebP),
            other => Err(BgRemovalError::unsupported_format(format!(
                "cannot write .{other} files (supported: png, jpg, jpeg, tif, tiff, bmp{})",
                if cfg!(feature = "webp-support") { ", webp" } else { "" }
            ))),
        }
    }

    /// Whether a path has an input extension the store accepts
    #[must_use]
    pub fn is_supported_input(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                SUPPORTED_INPUT_EXTENSIONS
                    .iter()
                    .any(|supported| ext.eq_ignore_ascii_case(supported))
            })
    }

    /// Encoder format for an output format
    #[must_use]
    pub fn image_format(format: OutputFormat) -> ImageFormat {
        match format {
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::Jpeg => ImageFormat::Jpeg,
            OutputFormat::WebP => ImageFormat::WebP,
            OutputFormat::Tiff => ImageFormat::Tiff,
            OutputFormat::Bmp => ImageFormat::Bmp,
        }
    }

    /// Check if a format supports transparency (alpha channel)
    #[must_use]
    pub fn supports_transparency(format: OutputFormat) -> bool {
        match format {
            OutputFormat::Png | OutputFormat::WebP | OutputFormat::Tiff => true,
            OutputFormat::Jpeg | OutputFormat::Bmp => false,
        }
    }

    /// Convert an image into a pixel layout the format can encode
    ///
    /// Formats without alpha get the colour channels only; transparent pixels
    /// of a removal result are already black, so the background becomes black.
    #[must_use]
    pub fn prepare_for_format(image: &DynamicImage, format: OutputFormat) -> DynamicImage {
        if Self::supports_transparency(format) {
            return DynamicImage::ImageRgba8(image.to_rgba8());
        }

        if image.color().has_alpha() {
            log::warn!(
                "⚠️ Output format {:?} does not support transparency, flattening to RGB",
                format
            );
        }
        DynamicImage::ImageRgb8(image.to_rgb8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_from_path() {
        let cases = [
            ("a.png", OutputFormat::Png),
            ("a.JPG", OutputFormat::Jpeg),
            ("a.jpeg", OutputFormat::Jpeg),
            ("a.tif", OutputFormat::Tiff),
            ("a.bmp", OutputFormat::Bmp),
        ];
        for (name, expected) in cases {
            let format = OutputFormatHandler::from_path(Path::new(name)).unwrap();
            assert_eq!(format, expected, "{name}");
        }

        let err = OutputFormatHandler::from_path(Path::new("a.xcf")).unwrap_err();
        assert!(matches!(err, BgRemovalError::UnsupportedFormat(_)));
        assert!(OutputFormatHandler::from_path(Path::new("noext")).is_err());
    }

    #[cfg(feature = "webp-support")]
    #[test]
    fn test_from_path_webp() {
        let format = OutputFormatHandler::from_path(Path::new("a.webp")).unwrap();
        assert_eq!(format, OutputFormat::WebP);
    }

    #[test]
    fn test_is_supported_input() {
        for name in ["a.png", "b.JPEG", "c.gif", "d.webp", "e.tif"] {
            assert!(OutputFormatHandler::is_supported_input(Path::new(name)), "{name}");
        }
        assert!(!OutputFormatHandler::is_supported_input(Path::new("a.txt")));
        assert!(!OutputFormatHandler::is_supported_input(Path::new("a")));
    }

    #[test]
    fn test_supports_transparency() {
        assert!(OutputFormatHandler::supports_transparency(OutputFormat::Png));
        assert!(OutputFormatHandler::supports_transparency(OutputFormat::WebP));
        assert!(OutputFormatHandler::supports_transparency(OutputFormat::Tiff));
        assert!(!OutputFormatHandler::supports_transparency(OutputFormat::Jpeg));
        assert!(!OutputFormatHandler::supports_transparency(OutputFormat::Bmp));
    }

    #[test]
    fn test_prepare_for_format() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 128])));

        let png = OutputFormatHandler::prepare_for_format(&image, OutputFormat::Png);
        assert!(matches!(png, DynamicImage::ImageRgba8(_)));

        let jpeg = OutputFormatHandler::prepare_for_format(&image, OutputFormat::Jpeg);
        match jpeg {
            DynamicImage::ImageRgb8(rgb) => assert_eq!(rgb.get_pixel(0, 0).0, [255, 0, 0]),
            other => panic!("expected RGB8 for JPEG, got {:?}", other.color()),
        }
    }
}
