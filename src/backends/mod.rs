//! Segmentation engines behind [`crate::inference::InferenceBackend`]
//!
//! `onnx` wraps ONNX Runtime and can use hardware execution providers.
//! `tract` runs on the CPU in pure Rust.

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

#[cfg(test)]
pub mod test_utils;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;

#[cfg(feature = "tract")]
pub use self::tract::TractBackend;
