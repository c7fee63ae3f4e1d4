//! Image I/O service
//!
//! [`ImageStore`] is the seam between the workflow and the filesystem;
//! [`FileImageStore`] is the real implementation on top of the `image` crate.

use crate::{
    config::{OutputFormat, RemovalConfig},
    error::{BgRemovalError, Result},
    services::format::OutputFormatHandler,
};
use image::{codecs::jpeg::JpegEncoder, DynamicImage};
use std::fs;
use std::io::Cursor;
use std::path::Path;

/// Decodes source images and encodes results
pub trait ImageStore: Send + Sync {
    /// Read and decode the image at `path`
    ///
    /// # Errors
    /// - `FileNotFound` when the path does not exist
    /// - `Decode` when the file cannot be read or is not a supported image
    fn decode(&self, path: &Path) -> Result<DynamicImage>;

    /// Encode `image` to `path`, format inferred from the extension
    ///
    /// # Errors
    /// - `UnsupportedFormat` for extensions without an encoder
    /// - `Encode` for encoder or filesystem failures
    fn encode(&self, image: &DynamicImage, path: &Path) -> Result<()>;
}

/// Filesystem-backed image store
#[derive(Debug, Clone)]
pub struct FileImageStore {
    jpeg_quality: u8,
}

impl Default for FileImageStore {
    fn default() -> Self {
        Self { jpeg_quality: 90 }
    }
}

impl FileImageStore {
    #[must_use]
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.min(100),
        }
    }

    /// Store using the JPEG quality of a removal configuration
    #[must_use]
    pub fn from_config(config: &RemovalConfig) -> Self {
        Self::new(config.jpeg_quality)
    }

    /// Encode into memory so a failing encoder never leaves a partial file
    fn encode_to_vec(&self, image: &DynamicImage, format: OutputFormat) -> Result<Vec<u8>> {
        let prepared = OutputFormatHandler::prepare_for_format(image, format);
        let mut buffer = Vec::new();

        let result = match format {
            OutputFormat::Jpeg => {
                let encoder = JpegEncoder::new_with_quality(&mut buffer, self.jpeg_quality);
                prepared.write_with_encoder(encoder)
            },
            other => prepared.write_to(
                &mut Cursor::new(&mut buffer),
                OutputFormatHandler::image_format(other),
            ),
        };

        result.map_err(|e| BgRemovalError::encode(format!("Failed to encode as {format:?}: {e}")))?;
        Ok(buffer)
    }
}

impl ImageStore for FileImageStore {
    fn decode(&self, path: &Path) -> Result<DynamicImage> {
        if !path.exists() {
            return Err(BgRemovalError::file_not_found(path));
        }
        if path.is_dir() {
            return Err(BgRemovalError::decode(format!(
                "'{}' is a directory, not an image",
                path.display()
            )));
        }
        if !OutputFormatHandler::is_supported_input(path) {
            log::debug!(
                "Unrecognized extension for {}, relying on content detection",
                path.display()
            );
        }

        // Extension-based detection first, then content sniffing
        match image::open(path) {
            Ok(image) => Ok(image),
            Err(extension_err) => {
                log::debug!(
                    "Extension-based loading failed for {}: {}. Trying content sniffing.",
                    path.display(),
                    extension_err
                );

                let data = fs::read(path).map_err(|e| {
                    BgRemovalError::decode(format!("Cannot read '{}': {e}", path.display()))
                })?;

                image::load_from_memory(&data).map_err(|content_err| {
                    BgRemovalError::decode(format!(
                        "Cannot decode '{}' ({} bytes): {}",
                        path.display(),
                        data.len(),
                        content_err
                    ))
                })
            },
        }
    }

    fn encode(&self, image: &DynamicImage, path: &Path) -> Result<()> {
        let format = OutputFormatHandler::from_path(path)?;
        let bytes = self.encode_to_vec(image, format)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                BgRemovalError::encode(format!(
                    "Cannot create output directory '{}': {e}",
                    parent.display()
                ))
            })?;
        }

        fs::write(path, &bytes).map_err(|e| {
            BgRemovalError::encode(format!("Cannot write '{}': {e}", path.display()))
        })?;

        log::debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }
}
