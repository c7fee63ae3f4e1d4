//! Image preprocessing shared by every inference backend
//!
//! Images are letterboxed into the model input: resized preserving aspect
//! ratio, centered on a padded canvas, then normalized into an NCHW tensor.
//! The same [`Letterbox`] geometry maps the model output back onto the
//! original image.

use crate::{
    error::{BgRemovalError, Result},
    models::PreprocessingConfig,
};
use image::{DynamicImage, ImageBuffer, RgbImage};
use ndarray::Array4;

/// Configuration for preprocessing behavior
#[derive(Debug, Clone)]
pub struct PreprocessingOptions {
    /// Padding color for aspect ratio preservation (RGB)
    pub padding_color: [u8; 3],
}

impl Default for PreprocessingOptions {
    fn default() -> Self {
        Self {
            padding_color: [255, 255, 255], // White padding
        }
    }
}

/// Placement of an image inside a model input canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Scale factor from original to canvas coordinates
    pub scale: f32,
    pub offset_x: u32,
    pub offset_y: u32,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub canvas_width: u32,
    pub canvas_height: u32,
}

impl Letterbox {
    /// Fit `original` (width, height) into a `[height, width]` canvas
    ///
    /// # Errors
    /// - Zero-sized image or canvas
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn fit(original: (u32, u32), target_size: [u32; 2]) -> Result<Self> {
        let (orig_width, orig_height) = original;
        let [canvas_height, canvas_width] = target_size;

        if orig_width == 0 || orig_height == 0 {
            return Err(BgRemovalError::processing("Cannot process an empty image"));
        }
        if canvas_width == 0 || canvas_height == 0 {
            return Err(BgRemovalError::invalid_config("Model input size must be non-zero"));
        }

        let scale = (canvas_width as f32 / orig_width as f32)
            .min(canvas_height as f32 / orig_height as f32);

        // Rounding may overshoot by one pixel on extreme aspect ratios
        let scaled_width = ((orig_width as f32 * scale).round() as u32).clamp(1, canvas_width);
        let scaled_height = ((orig_height as f32 * scale).round() as u32).clamp(1, canvas_height);

        Ok(Self {
            scale,
            offset_x: (canvas_width - scaled_width) / 2,
            offset_y: (canvas_height - scaled_height) / 2,
            scaled_width,
            scaled_height,
            canvas_width,
            canvas_height,
        })
    }

    /// Canvas coordinate for an original-image pixel, if it lands on the canvas
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    #[must_use]
    pub fn to_canvas(&self, x: u32, y: u32) -> Option<(u32, u32)> {
        let scaled_x = ((x as f32 + 0.5) * self.scale).floor() as u32;
        let scaled_y = ((y as f32 + 0.5) * self.scale).floor() as u32;

        let canvas_x = scaled_x.min(self.scaled_width - 1) + self.offset_x;
        let canvas_y = scaled_y.min(self.scaled_height - 1) + self.offset_y;

        (canvas_x < self.canvas_width && canvas_y < self.canvas_height)
            .then_some((canvas_x, canvas_y))
    }
}

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Preprocess image for model inference
    ///
    /// Handles RGB conversion, aspect ratio preserving resize, centered
    /// padding to the model input size and mean/std normalization (NCHW).
    ///
    /// # Errors
    /// - Zero-sized image or model input
    pub fn preprocess_image(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
        options: &PreprocessingOptions,
    ) -> Result<(Array4<f32>, Letterbox)> {
        let rgb_image = image.to_rgb8();
        let letterbox = Letterbox::fit(rgb_image.dimensions(), preprocessing_config.target_size)?;

        let resized = image::imageops::resize(
            &rgb_image,
            letterbox.scaled_width,
            letterbox.scaled_height,
            image::imageops::FilterType::Triangle,
        );

        let padding = options.padding_color;
        let mut canvas = ImageBuffer::from_pixel(
            letterbox.canvas_width,
            letterbox.canvas_height,
            image::Rgb([padding[0], padding[1], padding[2]]),
        );
        image::imageops::replace(
            &mut canvas,
            &resized,
            i64::from(letterbox.offset_x),
            i64::from(letterbox.offset_y),
        );

        let tensor = Self::canvas_to_tensor(&canvas, preprocessing_config);
        Ok((tensor, letterbox))
    }

    /// Convert canvas to normalized tensor
    fn canvas_to_tensor(
        canvas: &RgbImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Array4<f32> {
        let (width, height) = canvas.dimensions();
        let mean = preprocessing_config.normalization_mean;
        let std = preprocessing_config.normalization_std;

        Array4::from_shape_fn(
            (1, 3, height as usize, width as usize),
            |(_, channel, y, x)| {
                let value = canvas.get_pixel(x as u32, y as u32)[channel];
                (f32::from(value) / 255.0 - mean[channel]) / std[channel]
            },
        )
    }

    /// Preprocess with default options (white padding)
    ///
    /// # Errors
    /// - Zero-sized image or model input
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<(Array4<f32>, Letterbox)> {
        Self::preprocess_image(image, preprocessing_config, &PreprocessingOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letterbox_landscape() {
        let letterbox = Letterbox::fit((300, 200), [320, 320]).unwrap();
        assert_eq!(letterbox.scaled_width, 320);
        assert_eq!(letterbox.scaled_height, 213);
        assert_eq!(letterbox.offset_x, 0);
        assert_eq!(letterbox.offset_y, 53);

        assert_eq!(letterbox.to_canvas(0, 0), Some((0, 53)));
        let (x, y) = letterbox.to_canvas(299, 199).unwrap();
        assert!(x < 320);
        assert!(y < 53 + 213);
    }

    #[test]
    fn test_letterbox_non_square_canvas() {
        let letterbox = Letterbox::fit((100, 100), [200, 400]).unwrap();
        assert_eq!(letterbox.scaled_width, 200);
        assert_eq!(letterbox.scaled_height, 200);
        assert_eq!(letterbox.offset_x, 100);
        assert_eq!(letterbox.offset_y, 0);
    }

    #[test]
    fn test_letterbox_rejects_empty() {
        assert!(Letterbox::fit((0, 10), [320, 320]).is_err());
        assert!(Letterbox::fit((10, 10), [0, 320]).is_err());
    }

    #[test]
    fn test_preprocess_shape_and_padding() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 20, image::Rgb([0, 0, 0])));
        let config = PreprocessingConfig {
            target_size: [32, 32],
            normalization_mean: [0.0; 3],
            normalization_std: [1.0; 3],
        };

        let (tensor, letterbox) =
            ImagePreprocessor::preprocess_for_inference(&image, &config).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 32, 32]);
        assert_eq!(letterbox.offset_y, 8);

        // White padding above the image, black content in the middle
        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!(tensor[[0, 2, 16, 16]].abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_normalization() {
        let image =
            DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, image::Rgb([255, 255, 255])));
        let config = PreprocessingConfig {
            target_size: [8, 8],
            ..PreprocessingConfig::default()
        };

        let (tensor, _) = ImagePreprocessor::preprocess_for_inference(&image, &config).unwrap();
        let expected_r = (1.0 - 0.485) / 0.229;
        assert!((tensor[[0, 0, 4, 4]] - expected_r).abs() < 1e-4);
    }
}
