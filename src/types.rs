//! Core types for background removal results

use crate::error::{BgRemovalError, Result};
use image::{DynamicImage, Rgba, RgbaImage};

/// Binary segmentation mask for background removal
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationMask {
    /// Mask data as grayscale values (0-255), row-major
    pub data: Vec<u8>,

    /// Mask dimensions (width, height)
    pub dimensions: (u32, u32),
}

/// Foreground/background pixel counts of a mask
#[derive(Debug, Clone, PartialEq)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    pub foreground_pixels: usize,
    pub background_pixels: usize,
    pub foreground_ratio: f32,
}

impl SegmentationMask {
    /// Create a new segmentation mask
    #[must_use]
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Self {
        Self { data, dimensions }
    }

    /// Use the mask as the alpha channel of `image`
    ///
    /// Fully transparent pixels are zeroed so encoders do not keep hidden colour.
    ///
    /// # Errors
    /// - Image and mask dimensions differ
    pub fn apply_to_image(&self, image: &RgbaImage) -> Result<RgbaImage> {
        if image.dimensions() != self.dimensions {
            return Err(BgRemovalError::processing(format!(
                "Image ({}x{}) and mask ({}x{}) dimensions do not match",
                image.width(),
                image.height(),
                self.dimensions.0,
                self.dimensions.1
            )));
        }

        let mut result = image.clone();
        for (pixel, &alpha) in result.pixels_mut().zip(self.data.iter()) {
            *pixel = if alpha > 0 {
                Rgba([pixel[0], pixel[1], pixel[2], alpha])
            } else {
                Rgba([0, 0, 0, 0])
            };
        }

        Ok(result)
    }

    /// Get mask statistics (foreground is alpha above 127)
    #[must_use]
    pub fn statistics(&self) -> MaskStatistics {
        let total_pixels = self.data.len();
        let foreground_pixels = self.data.iter().filter(|&&x| x > 127).count();
        let foreground_ratio = if total_pixels == 0 {
            0.0
        } else {
            foreground_pixels as f32 / total_pixels as f32
        };

        MaskStatistics {
            total_pixels,
            foreground_pixels,
            background_pixels: total_pixels - foreground_pixels,
            foreground_ratio,
        }
    }
}

/// Per-stage timings of one removal call, in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessingTimings {
    pub model_load_ms: u64,
    pub preprocessing_ms: u64,
    pub inference_ms: u64,
    pub postprocessing_ms: u64,
    pub total_ms: u64,
}

/// Output of one background removal call
#[derive(Debug, Clone)]
pub struct RemovalResult {
    /// Input pixels with the mask as alpha channel
    pub image: RgbaImage,
    /// Foreground mask at the input resolution
    pub mask: SegmentationMask,
    pub timings: ProcessingTimings,
}

impl RemovalResult {
    #[must_use]
    pub fn into_image(self) -> DynamicImage {
        DynamicImage::ImageRgba8(self.image)
    }
}
