//! Background removal service seam

use crate::error::Result;
use image::DynamicImage;

/// Turns an image into the same image with a foreground alpha channel
///
/// Implementations may be slow and may fail. They are invoked from a blocking
/// worker thread, never from the controller's own task.
pub trait BackgroundRemover: Send + Sync {
    /// Remove the background of `image`
    ///
    /// The output has the input's dimensions and an alpha channel.
    ///
    /// # Errors
    /// Any failure of the underlying model or runtime
    fn remove(&self, image: &DynamicImage) -> Result<DynamicImage>;
}
