//! Provider configuration.
//!
//! The pipeline never reads configuration files. A [`ConfigSource`] resolves
//! the settings for a provider, and the `ResolveConfig` plug attaches the
//! result to the request once. Sources compose with [`LayeredConfig`]: later
//! layers override earlier ones, so the usual order is environment, static
//! deployment settings, then caller overrides.

mod sources;

pub use sources::*;

use std::collections::HashMap;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::LlmError;
use crate::resilience::ResilienceConfig;
use crate::types::ProviderId;

/// Connection settings for one provider. Every field is optional so layers
/// can be merged.
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    pub base_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub headers: HashMap<String, String>,
    /// Per-call deadline used when a plug has none of its own
    pub timeout: Option<Duration>,
    /// Upstream key for breaker/bulkhead state; defaults to the provider id
    pub upstream_key: Option<String>,
}

impl ProviderSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(api_key.into()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_upstream_key(mut self, key: impl Into<String>) -> Self {
        self.upstream_key = Some(key.into());
        self
    }

    /// Overlay `higher` on top of `self`; set fields in `higher` win.
    pub fn merge(mut self, higher: ProviderSettings) -> ProviderSettings {
        if higher.base_url.is_some() {
            self.base_url = higher.base_url;
        }
        if higher.api_key.is_some() {
            self.api_key = higher.api_key;
        }
        if higher.timeout.is_some() {
            self.timeout = higher.timeout;
        }
        if higher.upstream_key.is_some() {
            self.upstream_key = higher.upstream_key;
        }
        self.headers.extend(higher.headers);
        self
    }
}

/// Fully resolved configuration attached to a request.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub provider: ProviderId,
    pub settings: ProviderSettings,
    pub resilience: ResilienceConfig,
}

impl ResolvedConfig {
    pub fn new(provider: impl Into<ProviderId>) -> Self {
        Self {
            provider: provider.into(),
            settings: ProviderSettings::default(),
            resilience: ResilienceConfig::default(),
        }
    }

    pub fn with_settings(mut self, settings: ProviderSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_resilience(mut self, resilience: ResilienceConfig) -> Self {
        self.resilience = resilience;
        self
    }

    /// Key used for breaker and bulkhead state
    pub fn upstream_key(&self) -> &str {
        self.settings
            .upstream_key
            .as_deref()
            .unwrap_or_else(|| self.provider.as_str())
    }
}

/// Resolves per-provider settings.
pub trait ConfigSource: Send + Sync {
    /// Settings this source knows for `provider`, if any
    fn settings(&self, provider: &ProviderId) -> Result<Option<ProviderSettings>, LlmError>;

    /// Resilience thresholds this source knows for `provider`, if any
    fn resilience(&self, _provider: &ProviderId) -> Option<ResilienceConfig> {
        None
    }

    fn resolve(&self, provider: &ProviderId) -> Result<ResolvedConfig, LlmError> {
        let settings = self.settings(provider)?.unwrap_or_default();
        let resilience = self.resilience(provider).unwrap_or_default();
        Ok(ResolvedConfig {
            provider: provider.clone(),
            settings,
            resilience,
        })
    }
}
