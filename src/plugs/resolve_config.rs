use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ConfigSource;
use crate::error::ErrorRecord;
use crate::pipeline::{Plug, PlugOptions};
use crate::types::Request;

/// Attaches the provider's resolved configuration to the request.
///
/// A request that already carries a config keeps it.
#[derive(Clone)]
pub struct ResolveConfig {
    source: Arc<dyn ConfigSource>,
}

impl ResolveConfig {
    pub fn new(source: impl ConfigSource + 'static) -> Self {
        Self::from_arc(Arc::new(source))
    }

    pub fn from_arc(source: Arc<dyn ConfigSource>) -> Self {
        Self { source }
    }
}

impl std::fmt::Debug for ResolveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolveConfig").finish_non_exhaustive()
    }
}

#[async_trait]
impl Plug for ResolveConfig {
    fn name(&self) -> &str {
        "resolve_config"
    }

    async fn call(&self, request: Request, _opts: &PlugOptions) -> Request {
        if request.config().is_some() {
            return request;
        }
        match self.source.resolve(request.provider()) {
            Ok(config) => {
                tracing::debug!(
                    provider = %config.provider,
                    upstream = config.upstream_key(),
                    has_api_key = config.settings.api_key.is_some(),
                    "resolved provider config"
                );
                request.put_config(Arc::new(config))
            }
            Err(err) => {
                request.halt_with_error(ErrorRecord::from_error(&err).with_plug(self.name()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnvConfig, ProviderSettings, ResolvedConfig, StaticConfig};
    use crate::error::ErrorKind;
    use crate::types::ChatMessage;

    fn request() -> Request {
        Request::builder("openai")
            .message(ChatMessage::user("hi"))
            .model("gpt-4o-mini")
            .build()
    }

    #[tokio::test]
    async fn attaches_resolved_settings() {
        let plug = ResolveConfig::new(
            StaticConfig::new()
                .with_provider("openai", ProviderSettings::new().with_base_url("http://local")),
        );
        let out = plug.call(request(), &PlugOptions::default()).await;
        let config = out.config().unwrap();
        assert_eq!(config.settings.base_url.as_deref(), Some("http://local"));
    }

    #[tokio::test]
    async fn keeps_config_supplied_by_caller() {
        let req = Request::builder("openai")
            .message(ChatMessage::user("hi"))
            .model("gpt-4o-mini")
            .config(ResolvedConfig::new("openai").with_settings(
                ProviderSettings::new().with_base_url("http://caller"),
            ))
            .build();
        let plug = ResolveConfig::new(
            StaticConfig::new()
                .with_provider("openai", ProviderSettings::new().with_base_url("http://static")),
        );
        let out = plug.call(req, &PlugOptions::default()).await;
        assert_eq!(
            out.config().unwrap().settings.base_url.as_deref(),
            Some("http://caller")
        );
    }

    #[tokio::test]
    async fn source_failure_halts_with_configuration_error() {
        let plug = ResolveConfig::new(EnvConfig::with_lookup(|key| {
            (key == "OPENAI_TIMEOUT_MS").then(|| "later".to_string())
        }));
        let out = plug.call(request(), &PlugOptions::default()).await;
        assert!(out.is_halted());
        assert_eq!(out.errors()[0].kind, ErrorKind::Configuration);
    }
}
