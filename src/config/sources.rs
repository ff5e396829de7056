use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use super::{ConfigSource, ProviderSettings};
use crate::error::LlmError;
use crate::resilience::ResilienceConfig;
use crate::types::ProviderId;

/// In-memory settings supplied by the deployment or the caller.
#[derive(Debug, Clone, Default)]
pub struct StaticConfig {
    settings: HashMap<ProviderId, ProviderSettings>,
    resilience: HashMap<ProviderId, ResilienceConfig>,
    default_resilience: Option<ResilienceConfig>,
}

impl StaticConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(
        mut self,
        provider: impl Into<ProviderId>,
        settings: ProviderSettings,
    ) -> Self {
        self.settings.insert(provider.into(), settings);
        self
    }

    pub fn with_resilience(
        mut self,
        provider: impl Into<ProviderId>,
        resilience: ResilienceConfig,
    ) -> Self {
        self.resilience.insert(provider.into(), resilience);
        self
    }

    /// Resilience thresholds for providers without a specific entry
    pub fn with_default_resilience(mut self, resilience: ResilienceConfig) -> Self {
        self.default_resilience = Some(resilience);
        self
    }
}

impl ConfigSource for StaticConfig {
    fn settings(&self, provider: &ProviderId) -> Result<Option<ProviderSettings>, LlmError> {
        Ok(self.settings.get(provider).cloned())
    }

    fn resilience(&self, provider: &ProviderId) -> Option<ResilienceConfig> {
        self.resilience
            .get(provider)
            .or(self.default_resilience.as_ref())
            .cloned()
    }
}

type EnvLookup = dyn Fn(&str) -> Option<String> + Send + Sync;

/// Settings read from environment variables.
///
/// For provider `openai` it reads `OPENAI_API_KEY`, `OPENAI_BASE_URL` and
/// `OPENAI_TIMEOUT_MS`. Non-alphanumeric characters in the id become `_`.
#[derive(Clone)]
pub struct EnvConfig {
    lookup: Arc<EnvLookup>,
}

impl std::fmt::Debug for EnvConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvConfig").finish_non_exhaustive()
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvConfig {
    pub fn new() -> Self {
        Self::with_lookup(|key| std::env::var(key).ok())
    }

    /// Use a custom variable lookup instead of the process environment.
    pub fn with_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            lookup: Arc::new(lookup),
        }
    }

    fn prefix(provider: &ProviderId) -> String {
        provider
            .as_str()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl ConfigSource for EnvConfig {
    fn settings(&self, provider: &ProviderId) -> Result<Option<ProviderSettings>, LlmError> {
        let prefix = Self::prefix(provider);
        let api_key = (self.lookup)(&format!("{prefix}_API_KEY"));
        let base_url = (self.lookup)(&format!("{prefix}_BASE_URL"));
        let timeout = match (self.lookup)(&format!("{prefix}_TIMEOUT_MS")) {
            Some(raw) => Some(raw.trim().parse::<u64>().map(Duration::from_millis).map_err(
                |_| {
                    LlmError::ConfigurationError(format!(
                        "{prefix}_TIMEOUT_MS must be an integer number of milliseconds, got '{raw}'"
                    ))
                },
            )?),
            None => None,
        };

        if api_key.is_none() && base_url.is_none() && timeout.is_none() {
            return Ok(None);
        }
        Ok(Some(ProviderSettings {
            base_url,
            api_key: api_key.map(SecretString::from),
            timeout,
            ..Default::default()
        }))
    }
}

/// Ordered stack of sources. Later layers override earlier ones.
#[derive(Clone, Default)]
pub struct LayeredConfig {
    layers: Vec<Arc<dyn ConfigSource>>,
}

impl std::fmt::Debug for LayeredConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayeredConfig")
            .field("layers", &self.layers.len())
            .finish()
    }
}

impl LayeredConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer(mut self, source: impl ConfigSource + 'static) -> Self {
        self.layers.push(Arc::new(source));
        self
    }

    pub fn layer_arc(mut self, source: Arc<dyn ConfigSource>) -> Self {
        self.layers.push(source);
        self
    }
}

impl ConfigSource for LayeredConfig {
    fn settings(&self, provider: &ProviderId) -> Result<Option<ProviderSettings>, LlmError> {
        let mut merged: Option<ProviderSettings> = None;
        for layer in &self.layers {
            if let Some(settings) = layer.settings(provider)? {
                merged = Some(match merged {
                    Some(base) => base.merge(settings),
                    None => settings,
                });
            }
        }
        Ok(merged)
    }

    fn resilience(&self, provider: &ProviderId) -> Option<ResilienceConfig> {
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer.resilience(provider))
    }
}
