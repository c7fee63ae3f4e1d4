//! Execution provider parsing and discovery
//!
//! Providers are named `backend:provider`, e.g. `onnx:auto` or `tract:cpu`.

use crate::{
    config::ExecutionProvider,
    error::{BgRemovalError, Result},
    processor::BackendType,
};

/// One `backend:provider` combination as shown by `--show-providers`
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub name: String,
    pub backend_type: BackendType,
    pub execution_provider: ExecutionProvider,
    pub available: bool,
    pub description: String,
}

impl ProviderInfo {
    #[allow(dead_code)]
    fn compiled_out(
        backend_type: BackendType,
        execution_provider: ExecutionProvider,
        engine: &str,
    ) -> Self {
        Self {
            name: ExecutionProviderManager::provider_to_string(backend_type, execution_provider),
            backend_type,
            execution_provider,
            available: false,
            description: format!("{engine} (feature disabled)"),
        }
    }
}

pub struct ExecutionProviderManager;

impl ExecutionProviderManager {
    /// Parse `backend:provider`, or a bare backend name for its default provider
    ///
    /// # Errors
    /// Unknown backend or provider, or a provider the backend cannot use.
    pub fn parse_provider_string(provider_str: &str) -> Result<(BackendType, ExecutionProvider)> {
        let normalized = provider_str.trim().to_ascii_lowercase();
        let (backend, provider) = match normalized.split_once(':') {
            Some((backend, provider)) => (backend, Some(provider)),
            None => (normalized.as_str(), None),
        };

        match (backend, provider) {
            ("onnx", None) => Ok((BackendType::Onnx, ExecutionProvider::Auto)),
            ("onnx", Some(name)) => Ok((BackendType::Onnx, name.parse()?)),
            ("tract", None | Some("cpu")) => Ok((BackendType::Tract, ExecutionProvider::Cpu)),
            ("tract", Some(name)) => Err(BgRemovalError::invalid_config(format!(
                "Tract runs on the CPU only, '{name}' is not available"
            ))),
            _ => Err(BgRemovalError::invalid_config(format!(
                "Invalid provider '{provider_str}', expected backend:provider like onnx:auto"
            ))),
        }
    }

    /// Format a backend/provider pair as `backend:provider`
    #[must_use]
    pub fn provider_to_string(backend_type: BackendType, provider: ExecutionProvider) -> String {
        format!("{backend_type}:{provider}")
    }

    /// All provider combinations with their availability on this machine
    ///
    /// Backends compiled out by feature flags are listed as unavailable.
    #[must_use]
    pub fn list_all_providers() -> Vec<ProviderInfo> {
        let mut providers = Vec::new();

        #[cfg(feature = "onnx")]
        {
            use crate::backends::OnnxBackend;

            let onnx_providers = OnnxBackend::list_providers();
            let any_available = onnx_providers.iter().any(|(_, available, _)| *available);
            providers.push(ProviderInfo {
                name: "onnx:auto".to_string(),
                backend_type: BackendType::Onnx,
                execution_provider: ExecutionProvider::Auto,
                available: any_available,
                description: "ONNX Runtime with auto-selected provider".to_string(),
            });

            for (name, available, description) in onnx_providers {
                let execution_provider = match name.to_ascii_lowercase().as_str() {
                    "cuda" => ExecutionProvider::Cuda,
                    "coreml" => ExecutionProvider::CoreMl,
                    _ => ExecutionProvider::Cpu,
                };
                providers.push(ProviderInfo {
                    name: format!("onnx:{}", name.to_ascii_lowercase()),
                    backend_type: BackendType::Onnx,
                    execution_provider,
                    available,
                    description,
                });
            }
        }

        #[cfg(not(feature = "onnx"))]
        providers.push(ProviderInfo::compiled_out(
            BackendType::Onnx,
            ExecutionProvider::Auto,
            "ONNX Runtime",
        ));

        #[cfg(feature = "tract")]
        {
            use crate::backends::TractBackend;

            for (name, available, description) in TractBackend::list_providers() {
                providers.push(ProviderInfo {
                    name: format!("tract:{}", name.to_ascii_lowercase()),
                    backend_type: BackendType::Tract,
                    execution_provider: ExecutionProvider::Cpu,
                    available,
                    description,
                });
            }
        }

        #[cfg(not(feature = "tract"))]
        providers.push(ProviderInfo::compiled_out(
            BackendType::Tract,
            ExecutionProvider::Cpu,
            "Pure Rust CPU inference via Tract",
        ));

        providers
    }
}
