//! Configuration types for background removal operations

use crate::{
    error::{BgRemovalError, Result},
    models::ModelSpec,
    processor::BackendType,
};

/// Where the ONNX engine runs the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionProvider {
    /// First of CUDA, `CoreML`, CPU that is usable on this machine
    #[default]
    Auto,
    Cpu,
    Cuda,
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl std::str::FromStr for ExecutionProvider {
    type Err = BgRemovalError;

    fn from_str(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(BgRemovalError::invalid_config(format!(
                "Unknown execution provider '{other}' (expected auto, cpu, cuda or coreml)"
            ))),
        }
    }
}

/// Output image format, inferred from the target file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// PNG with alpha channel transparency
    #[default]
    Png,
    /// JPEG (no transparency, flattened RGB output)
    Jpeg,
    /// WebP with alpha channel transparency
    WebP,
    /// TIFF with alpha channel transparency and lossless compression
    Tiff,
    /// BMP (flattened RGB output)
    Bmp,
}

/// Configuration for the background removal service
#[derive(Debug, Clone, PartialEq)]
pub struct RemovalConfig {
    /// Which model file to run
    pub model_spec: ModelSpec,
    /// Inference engine
    pub backend_type: BackendType,
    /// Execution provider for the backend
    pub execution_provider: ExecutionProvider,
    /// JPEG quality used when saving `.jpg` targets (0-100)
    pub jpeg_quality: u8,
    /// Threads inside one operator, 0 picks one per core
    pub intra_threads: usize,
    /// Operators run concurrently, 0 picks a quarter of the cores
    pub inter_threads: usize,
    /// Log tensor statistics while processing
    pub debug: bool,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            model_spec: ModelSpec::default(),
            backend_type: BackendType::default(),
            execution_provider: ExecutionProvider::Auto,
            jpeg_quality: 90,
            intra_threads: 0,
            inter_threads: 0,
            debug: false,
        }
    }
}

impl RemovalConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> RemovalConfigBuilder {
        RemovalConfigBuilder::new()
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// - JPEG quality outside 0-100
    /// - Tract backend combined with a GPU execution provider
    pub fn validate(&self) -> Result<()> {
        if self.jpeg_quality > 100 {
            return Err(BgRemovalError::invalid_config(format!(
                "JPEG quality must be 0-100, got {}",
                self.jpeg_quality
            )));
        }

        if self.backend_type == BackendType::Tract
            && !matches!(
                self.execution_provider,
                ExecutionProvider::Cpu | ExecutionProvider::Auto
            )
        {
            return Err(BgRemovalError::invalid_config(format!(
                "Tract backend only supports the CPU provider, got {}",
                self.execution_provider
            )));
        }

        Ok(())
    }

    /// Intra-op and inter-op thread counts with the `0 = auto` values resolved
    #[must_use]
    pub fn thread_counts(&self) -> (usize, usize) {
        let cores = std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(8);
        let intra = match self.intra_threads {
            0 => cores,
            n => n,
        };
        let inter = match self.inter_threads {
            0 => (cores / 4).max(1),
            n => n,
        };
        (intra, inter)
    }
}

/// Builder for `RemovalConfig`
#[derive(Debug, Default)]
pub struct RemovalConfigBuilder {
    config: RemovalConfig,
}

impl RemovalConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn model_spec(mut self, model_spec: ModelSpec) -> Self {
        self.config.model_spec = model_spec;
        self
    }

    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.clamp(0, 100);
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn inter_threads(mut self, threads: usize) -> Self {
        self.config.inter_threads = threads;
        self
    }

    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// Returns `BgRemovalError::InvalidConfig` when validation fails
    pub fn build(self) -> Result<RemovalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelSource;
    use std::path::PathBuf;

    #[test]
    fn test_builder_defaults() {
        let config = RemovalConfig::builder().build().unwrap();
        assert_eq!(config.execution_provider, ExecutionProvider::Auto);
        assert_eq!(config.jpeg_quality, 90);
        assert_eq!(config.model_spec.source, ModelSource::DefaultU2Net);
    }

    #[test]
    fn test_builder_chain() {
        let config = RemovalConfig::builder()
            .model_spec(ModelSpec::external("/models/u2net.onnx"))
            .backend_type(BackendType::Tract)
            .execution_provider(ExecutionProvider::Cpu)
            .jpeg_quality(150)
            .intra_threads(4)
            .inter_threads(1)
            .debug(true)
            .build()
            .unwrap();

        assert_eq!(
            config.model_spec.source,
            ModelSource::External(PathBuf::from("/models/u2net.onnx"))
        );
        assert_eq!(config.jpeg_quality, 100);
        assert_eq!(config.intra_threads, 4);
        assert!(config.debug);
    }

    #[test]
    fn test_thread_counts_resolve_auto() {
        let (intra, inter) = RemovalConfig::default().thread_counts();
        assert!(intra >= 1);
        assert!(inter >= 1 && inter <= intra);

        let config = RemovalConfig::builder()
            .intra_threads(3)
            .inter_threads(2)
            .build()
            .unwrap();
        assert_eq!(config.thread_counts(), (3, 2));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RemovalConfig::default();
        config.jpeg_quality = 101;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("JPEG quality"));

        let result = RemovalConfig::builder()
            .backend_type(BackendType::Tract)
            .execution_provider(ExecutionProvider::Cuda)
            .build();
        assert!(result.is_err());
    }
}
