//! Model location and metadata
//!
//! Models are plain ONNX files. A model may be given as a file, or as a
//! directory holding one `.onnx` file and an optional HuggingFace-style
//! `preprocessor_config.json`. Without a sidecar the U2-Net defaults apply.

use crate::error::{BgRemovalError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory (under the home directory) where U2-Net weights conventionally live
pub const DEFAULT_MODEL_DIR: &str = ".u2net";
/// File name of the default model
pub const DEFAULT_MODEL_FILE: &str = "u2net.onnx";
/// Sidecar file overriding preprocessing parameters
pub const PREPROCESSOR_CONFIG_FILE: &str = "preprocessor_config.json";

/// Where the segmentation model comes from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ModelSource {
    /// External model from filesystem path (file or directory)
    External(PathBuf),
    /// `~/.u2net/u2net.onnx`
    #[default]
    DefaultU2Net,
}

impl ModelSource {
    /// Get a display name for tracing and logging
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            ModelSource::External(path) => {
                format!(
                    "external:{}",
                    path.file_name().unwrap_or_default().to_string_lossy()
                )
            },
            ModelSource::DefaultU2Net => format!("default:{DEFAULT_MODEL_FILE}"),
        }
    }

    /// Resolve the source to a filesystem path
    ///
    /// # Errors
    /// - Home directory cannot be determined for the default model
    pub fn resolve(&self) -> Result<PathBuf> {
        match self {
            ModelSource::External(path) => Ok(path.clone()),
            ModelSource::DefaultU2Net => dirs::home_dir()
                .map(|home| home.join(DEFAULT_MODEL_DIR).join(DEFAULT_MODEL_FILE))
                .ok_or_else(|| {
                    BgRemovalError::model(
                        "Cannot determine home directory for the default model; pass --model",
                    )
                }),
        }
    }
}

/// The model a removal config points at
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModelSpec {
    pub source: ModelSource,
}

impl ModelSpec {
    /// Model file or directory on disk
    pub fn external<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            source: ModelSource::External(path.into()),
        }
    }
}

/// Model information and metadata
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub size_bytes: u64,
    pub input_shape: (usize, usize, usize, usize), // NCHW format
}

/// Preprocessing parameters expected by a model
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingConfig {
    /// Input size as `[height, width]`
    pub target_size: [u32; 2],
    pub normalization_mean: [f32; 3],
    pub normalization_std: [f32; 3],
}

impl Default for PreprocessingConfig {
    /// U2-Net: 320x320, ImageNet statistics
    fn default() -> Self {
        Self {
            target_size: [320, 320],
            normalization_mean: [0.485, 0.456, 0.406],
            normalization_std: [0.229, 0.224, 0.225],
        }
    }
}

#[derive(Debug, Deserialize)]
struct HfPreprocessorConfig {
    size: HfSize,
    image_mean: Vec<f32>,
    image_std: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct HfSize {
    height: u32,
    width: u32,
}

impl PreprocessingConfig {
    /// Parse a HuggingFace-style `preprocessor_config.json`
    ///
    /// # Errors
    /// - Malformed JSON or missing `size`, `image_mean`, `image_std`
    /// - Normalization arrays that are not 3 channels
    pub fn from_huggingface_json(content: &str) -> Result<Self> {
        let raw: HfPreprocessorConfig = serde_json::from_str(content).map_err(|e| {
            BgRemovalError::invalid_config(format!(
                "Failed to parse {PREPROCESSOR_CONFIG_FILE}: {e}"
            ))
        })?;

        let channels = |values: &[f32], key: &str| -> Result<[f32; 3]> {
            <[f32; 3]>::try_from(values).map_err(|_| {
                BgRemovalError::invalid_config(format!(
                    "{key} must have 3 values, got {}",
                    values.len()
                ))
            })
        };

        if raw.size.height == 0 || raw.size.width == 0 {
            return Err(BgRemovalError::invalid_config(
                "Preprocessor size must be non-zero",
            ));
        }

        Ok(Self {
            target_size: [raw.size.height, raw.size.width],
            normalization_mean: channels(&raw.image_mean, "image_mean")?,
            normalization_std: channels(&raw.image_std, "image_std")?,
        })
    }
}

/// Resolved model file plus its metadata
#[derive(Debug, Clone)]
pub struct ModelManager {
    model_path: PathBuf,
    info: ModelInfo,
    preprocessing: PreprocessingConfig,
}

impl ModelManager {
    /// Resolve a model source against the filesystem
    ///
    /// # Errors
    /// - Model path missing, or a directory without any `.onnx` file
    /// - Invalid preprocessor sidecar
    pub fn from_spec(spec: &ModelSpec) -> Result<Self> {
        let path = spec.source.resolve()?;
        Self::with_external_model(&path)
    }

    /// Load model metadata from a file or directory path
    ///
    /// # Errors
    /// See [`ModelManager::from_spec`]
    pub fn with_external_model<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(BgRemovalError::model_error_with_context(
                "locate",
                path,
                "path does not exist",
                &[
                    "pass --model with a U2-Net compatible .onnx file",
                    "place u2net.onnx under ~/.u2net/",
                ],
            ));
        }

        let (model_path, sidecar_dir) = if path.is_dir() {
            (Self::find_onnx_file(path)?, path.to_path_buf())
        } else {
            let dir = path.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
            (path.to_path_buf(), dir)
        };

        let preprocessing = Self::load_preprocessing(&sidecar_dir)?;

        let size_bytes = fs::metadata(&model_path)
            .map_err(|e| BgRemovalError::file_io_error("inspect model", &model_path, &e))?
            .len();
        let name = model_path
            .file_stem()
            .map_or_else(|| "model".to_string(), |s| s.to_string_lossy().into_owned());
        let [height, width] = preprocessing.target_size;

        log::debug!(
            "Resolved model {} ({} bytes, input {}x{})",
            model_path.display(),
            size_bytes,
            width,
            height
        );

        Ok(Self {
            info: ModelInfo {
                name,
                size_bytes,
                input_shape: (1, 3, height as usize, width as usize),
            },
            model_path,
            preprocessing,
        })
    }

    fn find_onnx_file(dir: &Path) -> Result<PathBuf> {
        let mut candidates: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|e| BgRemovalError::file_io_error("list model directory", dir, &e))?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("onnx")))
            .collect();
        candidates.sort();

        // Prefer model.onnx when a directory ships several variants
        if let Some(preferred) = candidates
            .iter()
            .find(|p| p.file_name().is_some_and(|n| n == "model.onnx"))
        {
            return Ok(preferred.clone());
        }

        candidates.into_iter().next().ok_or_else(|| {
            BgRemovalError::model_error_with_context(
                "locate",
                dir,
                "directory contains no .onnx file",
                &[],
            )
        })
    }

    fn load_preprocessing(dir: &Path) -> Result<PreprocessingConfig> {
        let sidecar = dir.join(PREPROCESSOR_CONFIG_FILE);
        if !sidecar.is_file() {
            return Ok(PreprocessingConfig::default());
        }

        let content = fs::read_to_string(&sidecar)
            .map_err(|e| BgRemovalError::file_io_error("read preprocessor config", &sidecar, &e))?;
        PreprocessingConfig::from_huggingface_json(&content)
    }

    /// Read the model bytes
    ///
    /// # Errors
    /// - File I/O errors when reading model data
    pub fn load_model(&self) -> Result<Vec<u8>> {
        fs::read(&self.model_path)
            .map_err(|e| BgRemovalError::file_io_error("read model", &self.model_path, &e))
    }

    #[must_use]
    pub fn get_info(&self) -> &ModelInfo {
        &self.info
    }

    #[must_use]
    pub fn get_preprocessing_config(&self) -> &PreprocessingConfig {
        &self.preprocessing
    }

    #[must_use]
    pub fn get_model_path(&self) -> &Path {
        &self.model_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_display_name() {
        assert_eq!(
            ModelSource::External(PathBuf::from("/m/isnet.onnx")).display_name(),
            "external:isnet.onnx"
        );
        assert_eq!(ModelSource::DefaultU2Net.display_name(), "default:u2net.onnx");
    }

    #[test]
    fn test_missing_model_path() {
        let err = ModelManager::with_external_model("/definitely/not/here.onnx").unwrap_err();
        assert!(err.to_string().contains("does not exist"));
        assert!(err.to_string().contains("--model"));
    }

    #[test]
    fn test_model_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let model = dir.path().join("u2net.onnx");
        fs::write(&model, b"not really onnx").unwrap();

        let manager = ModelManager::with_external_model(&model).unwrap();
        assert_eq!(manager.get_model_path(), model.as_path());
        assert_eq!(manager.get_info().name, "u2net");
        assert_eq!(manager.get_info().size_bytes, 15);
        assert_eq!(manager.get_info().input_shape, (1, 3, 320, 320));
        assert_eq!(manager.get_preprocessing_config(), &PreprocessingConfig::default());
        assert_eq!(manager.load_model().unwrap(), b"not really onnx");
    }

    #[test]
    fn test_model_directory_with_sidecar() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("fp16.onnx"), b"a").unwrap();
        fs::write(dir.path().join("model.onnx"), b"b").unwrap();
        fs::write(
            dir.path().join(PREPROCESSOR_CONFIG_FILE),
            r#"{"size": {"height": 1024, "width": 1024}, "image_mean": [0.5, 0.5, 0.5], "image_std": [1.0, 1.0, 1.0], "do_resize": true}"#,
        )
        .unwrap();

        let manager = ModelManager::with_external_model(dir.path()).unwrap();
        assert!(manager.get_model_path().ends_with("model.onnx"));
        assert_eq!(manager.get_preprocessing_config().target_size, [1024, 1024]);
        assert_eq!(manager.get_preprocessing_config().normalization_mean, [0.5; 3]);
        assert_eq!(manager.get_info().input_shape, (1, 3, 1024, 1024));
    }

    #[test]
    fn test_directory_without_model() {
        let dir = tempdir().unwrap();
        let err = ModelManager::with_external_model(dir.path()).unwrap_err();
        assert!(err.to_string().contains("no .onnx file"));
    }

    #[test]
    fn test_invalid_sidecar() {
        let err = PreprocessingConfig::from_huggingface_json(
            r#"{"size": {"height": 320, "width": 320}, "image_mean": [0.5], "image_std": [1.0, 1.0, 1.0]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("image_mean"));

        assert!(PreprocessingConfig::from_huggingface_json("{").is_err());
    }
}
