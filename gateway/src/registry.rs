//! Model registry: loads the `models:` YAML document into a lookup table
//! keyed by `ModelConfig.id`, and seeds a small mock registry for
//! `LLM_MODE=mock` / tests so the pipeline never needs a real config file
//! on disk to exercise end to end.

use std::collections::HashMap;

use forge_core::{ModelConfig, ModelKind, Pricing};
use serde::Deserialize;

use crate::error::GatewayError;

#[derive(Debug, Deserialize)]
struct RegistryFile {
    models: Vec<ModelConfig>,
}

/// Read-only lookup table of callable models, keyed by `ModelConfig.id`.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, ModelConfig>,
}

impl ModelRegistry {
    pub fn from_configs(configs: impl IntoIterator<Item = ModelConfig>) -> Self {
        ModelRegistry {
            models: configs.into_iter().map(|c| (c.id.clone(), c)).collect(),
        }
    }

    /// Parse a YAML document with a top-level `models:` list.
    pub fn from_yaml(yaml: &str) -> Result<Self, GatewayError> {
        let file: RegistryFile = serde_yaml::from_str(yaml)
            .map_err(|e| GatewayError::InvalidRequest(format!("invalid model registry: {e}")))?;
        Ok(Self::from_configs(file.models))
    }

    pub async fn load_path(path: &str) -> Result<Self, GatewayError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GatewayError::InvalidRequest(format!("cannot read {path}: {e}")))?;
        Self::from_yaml(&contents)
    }

    pub fn get(&self, id: &str) -> Result<&ModelConfig, GatewayError> {
        self.models
            .get(id)
            .ok_or_else(|| GatewayError::UnknownModel(id.to_string()))
    }

    pub fn list(&self) -> Vec<&ModelConfig> {
        self.models.values().collect()
    }

    /// A single deterministic mock model, enough to exercise the whole
    /// pipeline under `LLM_MODE=mock` without any config file.
    pub fn mock() -> Self {
        Self::from_configs([ModelConfig {
            id: "mock:gpt-mini".to_string(),
            provider: "mock".to_string(),
            base_url: "http://localhost/mock".to_string(),
            api_key_env: "MOCK_API_KEY".to_string(),
            kind: ModelKind::Chat,
            currency: "USD".to_string(),
            pricing: Pricing {
                currency_in_per_1k: 0.001,
                currency_out_per_1k: 0.002,
            },
            max_rpm: 60.0,
            max_tpm: 60_000.0,
            tags: vec!["mock".to_string()],
        }])
    }
}
