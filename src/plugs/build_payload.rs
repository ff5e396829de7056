use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{UPSTREAM_BODY_KEY, UPSTREAM_URL_KEY, missing};
use crate::adapters::{ProviderAdapter, join_url};
use crate::error::ErrorRecord;
use crate::pipeline::{Plug, PlugOptions};
use crate::types::Request;

/// Builds the upstream URL and JSON body through the provider adapter.
///
/// Both land in `private`; credentials never do. They are added to the
/// headers by the call plugs at send time.
#[derive(Clone)]
pub struct BuildPayload {
    adapter: Arc<dyn ProviderAdapter>,
}

impl BuildPayload {
    pub fn new(adapter: Arc<dyn ProviderAdapter>) -> Self {
        Self { adapter }
    }
}

impl std::fmt::Debug for BuildPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildPayload")
            .field("provider", &self.adapter.provider_id())
            .finish()
    }
}

#[async_trait]
impl Plug for BuildPayload {
    fn name(&self) -> &str {
        "build_payload"
    }

    async fn call(&self, request: Request, _opts: &PlugOptions) -> Request {
        let Some(config) = request.shared_config() else {
            return request.halt_with_error(missing(self.name(), "provider config"));
        };

        match self.adapter.build_payload(&request) {
            Ok(payload) => {
                let base = config
                    .settings
                    .base_url
                    .as_deref()
                    .unwrap_or_else(|| self.adapter.default_base_url());
                let url = join_url(base, &payload.endpoint);
                tracing::debug!(%url, "built upstream payload");
                request
                    .put_private(UPSTREAM_URL_KEY, Value::String(url))
                    .put_private(UPSTREAM_BODY_KEY, payload.body)
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
    use crate::adapters::OpenAiCompatibleAdapter;
    use crate::config::{ProviderSettings, ResolvedConfig};
    use crate::error::ErrorKind;
    use crate::types::ChatMessage;

    #[tokio::test]
    async fn stores_url_and_body() {
        let req = Request::builder("openai")
            .message(ChatMessage::user("hi"))
            .model("gpt-4o-mini")
            .config(ResolvedConfig::new("openai").with_settings(
                ProviderSettings::new().with_base_url("http://localhost:9000/v1/"),
            ))
            .build();
        let out = BuildPayload::new(Arc::new(OpenAiCompatibleAdapter::new()))
            .call(req, &PlugOptions::default())
            .await;
        assert_eq!(
            out.private()[UPSTREAM_URL_KEY],
            "http://localhost:9000/v1/chat/completions"
        );
        assert_eq!(out.private()[UPSTREAM_BODY_KEY]["model"], "gpt-4o-mini");
    }

    #[tokio::test]
    async fn falls_back_to_adapter_base_url() {
        let req = Request::builder("openai")
            .message(ChatMessage::user("hi"))
            .model("gpt-4o-mini")
            .config(ResolvedConfig::new("openai"))
            .build();
        let out = BuildPayload::new(Arc::new(OpenAiCompatibleAdapter::new()))
            .call(req, &PlugOptions::default())
            .await;
        assert_eq!(
            out.private()[UPSTREAM_URL_KEY],
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn requires_config() {
        let req = Request::builder("openai")
            .message(ChatMessage::user("hi"))
            .model("gpt-4o-mini")
            .build();
        let out = BuildPayload::new(Arc::new(OpenAiCompatibleAdapter::new()))
            .call(req, &PlugOptions::default())
            .await;
        assert!(out.is_halted());
        assert_eq!(out.errors()[0].kind, ErrorKind::Configuration);
    }
}
