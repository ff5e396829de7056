use async_trait::async_trait;
use validator::Validate;

use crate::error::ErrorRecord;
use crate::pipeline::{Plug, PlugOptions};
use crate::types::{MessageRole, Request};

/// Rejects requests that no provider could serve.
///
/// The conversation must hold at least one non-system message and the
/// options must pass their field constraints.
#[derive(Debug, Clone, Default)]
pub struct ValidateInput {
    max_messages: Option<usize>,
}

impl ValidateInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also reject conversations longer than `max`
    pub fn with_max_messages(mut self, max: usize) -> Self {
        self.max_messages = Some(max);
        self
    }

    fn check(&self, request: &Request) -> Result<(), String> {
        let input = request.input();
        if input.is_empty() {
            return Err("input must contain at least one message".into());
        }
        if let Some(max) = self.max_messages.filter(|max| input.len() > *max) {
            return Err(format!("input has {} messages, at most {max} allowed", input.len()));
        }
        if input.iter().all(|m| m.role == MessageRole::System) {
            return Err("input must contain a non-system message".into());
        }
        request
            .options()
            .validate()
            .map_err(|errors| format!("invalid options: {errors}"))
    }
}

#[async_trait]
impl Plug for ValidateInput {
    fn name(&self) -> &str {
        "validate_input"
    }

    async fn call(&self, request: Request, _opts: &PlugOptions) -> Request {
        match self.check(&request) {
            Ok(()) => request,
            Err(message) => {
                tracing::debug!(request_id = %request.id(), %message, "rejecting request");
                request.halt_with_error(ErrorRecord::validation(message).with_plug(self.name()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::{ChatMessage, RequestState};

    #[tokio::test]
    async fn accepts_well_formed_request() {
        let req = Request::builder("openai")
            .message(ChatMessage::user("hi"))
            .model("gpt-4o-mini")
            .temperature(0.7)
            .build();
        let out = ValidateInput::new().call(req, &PlugOptions::default()).await;
        assert!(!out.is_halted());
        assert!(out.errors().is_empty());
    }

    #[tokio::test]
    async fn rejects_empty_input() {
        let req = Request::builder("openai").model("gpt-4o-mini").build();
        let out = ValidateInput::new().call(req, &PlugOptions::default()).await;
        assert!(out.is_halted());
        assert_eq!(out.state(), RequestState::Error);
        assert_eq!(out.errors()[0].kind, ErrorKind::Validation);
        assert_eq!(out.errors()[0].plug.as_deref(), Some("validate_input"));
    }

    #[tokio::test]
    async fn rejects_out_of_range_temperature() {
        let req = Request::builder("openai")
            .message(ChatMessage::user("hi"))
            .model("gpt-4o-mini")
            .temperature(3.5)
            .build();
        let out = ValidateInput::new().call(req, &PlugOptions::default()).await;
        assert!(out.is_halted());
        assert!(out.errors()[0].message.contains("temperature"));
    }

    #[tokio::test]
    async fn rejects_missing_model() {
        let req = Request::builder("openai")
            .message(ChatMessage::user("hi"))
            .build();
        let out = ValidateInput::new().call(req, &PlugOptions::default()).await;
        assert!(out.is_halted());
    }

    #[tokio::test]
    async fn enforces_message_cap() {
        let req = Request::builder("openai")
            .messages((0..3).map(|i| ChatMessage::user(format!("m{i}"))))
            .model("gpt-4o-mini")
            .build();
        let out = ValidateInput::new()
            .with_max_messages(2)
            .call(req, &PlugOptions::default())
            .await;
        assert!(out.is_halted());
    }
}
