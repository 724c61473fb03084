#![cfg(test)]

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::{CoreResult, LlmObsError};
use crate::model::{
    ChatChoice, ChatMessage, ChatRequest, ChatResponse, EmbedRequest, EmbedResponse, Role,
    StopReason, Usage,
};
use crate::provider::{ChatProvider, EmbedProvider};

/// Request with one user message per entry.
pub fn chat_request(contents: &[&str]) -> ChatRequest {
    ChatRequest::new(
        "gpt-4o",
        contents
            .iter()
            .map(|c| ChatMessage::new(Role::User, *c))
            .collect(),
    )
}

/// Response with one assistant choice per entry and no usage object.
pub fn chat_response(choices: &[&str]) -> ChatResponse {
    ChatResponse {
        model: Some("gpt-4o".into()),
        choices: choices
            .iter()
            .map(|c| ChatChoice {
                message: ChatMessage::new(Role::Assistant, *c),
                finish_reason: Some(StopReason::Stop),
            })
            .collect(),
        usage: None,
        provider: "openai".into(),
        request_id: Some("req_123".into()),
    }
}

pub fn embed_response(inputs: usize, usage: Option<Usage>) -> EmbedResponse {
    EmbedResponse {
        model: Some("text-embedding-3-small".into()),
        vectors: (0..inputs).map(|_| vec![0.25_f32; 4]).collect(),
        usage,
        provider: "openai".into(),
        request_id: Some("req_456".into()),
    }
}

#[derive(Debug, Clone, Copy)]
enum Behavior {
    Reply,
    Fail(fn() -> LlmObsError),
    Hang,
}

fn unavailable() -> LlmObsError {
    LlmObsError::ProviderUnavailable {
        provider: "openai".into(),
    }
}

fn rate_limited() -> LlmObsError {
    LlmObsError::RateLimited {
        provider: "openai".into(),
        retry_after: Some(20),
    }
}

fn upstream_error() -> LlmObsError {
    LlmObsError::ProviderError {
        provider: "openai".into(),
        code: "server_error".into(),
        message: "The server had an error while processing your request".into(),
    }
}

/// Provider double with a fixed behaviour that counts its invocations.
pub struct ScriptedProvider {
    behavior: Behavior,
    choices: Vec<String>,
    usage: Option<Usage>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn replying(choices: &[&str], usage: Option<Usage>) -> Self {
        Self {
            behavior: Behavior::Reply,
            choices: choices.iter().map(|c| c.to_string()).collect(),
            usage,
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call fails with `ProviderUnavailable { provider: "openai" }`.
    pub fn failing() -> Self {
        Self::failing_with(unavailable)
    }

    /// Every call fails with `RateLimited` (retry after 20s).
    pub fn rate_limited() -> Self {
        Self::failing_with(rate_limited)
    }

    /// Every call fails with a `ProviderError` carrying an upstream code.
    pub fn upstream_error() -> Self {
        Self::failing_with(upstream_error)
    }

    fn failing_with(error: fn() -> LlmObsError) -> Self {
        Self {
            behavior: Behavior::Fail(error),
            ..Self::replying(&[], None)
        }
    }

    /// Every call stays pending forever.
    pub fn hanging() -> Self {
        Self {
            behavior: Behavior::Hang,
            ..Self::replying(&[], None)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn act(&self) -> CoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Reply => Ok(()),
            Behavior::Fail(error) => Err(error()),
            Behavior::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, _req: ChatRequest) -> CoreResult<ChatResponse> {
        self.act().await?;
        let choices: Vec<&str> = self.choices.iter().map(String::as_str).collect();
        let mut resp = chat_response(&choices);
        resp.usage = self.usage;
        Ok(resp)
    }
}

#[async_trait]
impl EmbedProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn embed(&self, req: EmbedRequest) -> CoreResult<EmbedResponse> {
        self.act().await?;
        Ok(embed_response(req.inputs.len(), self.usage))
    }
}
