use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CoreResult;
use crate::model::{
    ChatChoice, ChatMessage, ChatRequest, ChatResponse, EmbedRequest, EmbedResponse, Role,
    StopReason, Usage,
};

#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn chat(&self, req: ChatRequest) -> CoreResult<ChatResponse>;
}

#[async_trait]
pub trait EmbedProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn embed(&self, req: EmbedRequest) -> CoreResult<EmbedResponse>;
}

// Lets shared `Arc<dyn ChatProvider>` handles be wrapped like concrete providers.
#[async_trait]
impl<P: ChatProvider + ?Sized> ChatProvider for Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn chat(&self, req: ChatRequest) -> CoreResult<ChatResponse> {
        (**self).chat(req).await
    }
}

#[async_trait]
impl<P: EmbedProvider + ?Sized> EmbedProvider for Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn embed(&self, req: EmbedRequest) -> CoreResult<EmbedResponse> {
        (**self).embed(req).await
    }
}

/// A dummy provider implementation that always returns canned responses.
/// Useful for tests, the smoke tool, or as a placeholder.
///
/// Usage figures are character counts, which is enough to see them flow into
/// events. `without_usage` drops the usage object entirely so the token count
/// fallback path can be exercised.
#[derive(Debug, Clone, Copy)]
pub struct NullProvider {
    report_usage: bool,
}

const NULL_REPLY: &str = "[null provider response]";

impl NullProvider {
    pub fn new() -> Self {
        Self { report_usage: true }
    }

    pub fn without_usage() -> Self {
        Self {
            report_usage: false,
        }
    }
}

impl Default for NullProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatProvider for NullProvider {
    fn name(&self) -> &str {
        "null"
    }

    async fn chat(&self, req: ChatRequest) -> CoreResult<ChatResponse> {
        let prompt: u64 = req.messages.iter().map(|m| m.content.len() as u64).sum();
        Ok(ChatResponse {
            model: Some(req.model),
            choices: vec![ChatChoice {
                message: ChatMessage::new(Role::Assistant, NULL_REPLY),
                finish_reason: Some(StopReason::Stop),
            }],
            usage: self
                .report_usage
                .then(|| Usage::new(prompt, NULL_REPLY.len() as u64)),
            provider: "null".into(),
            request_id: None,
        })
    }
}

#[async_trait]
impl EmbedProvider for NullProvider {
    fn name(&self) -> &str {
        "null"
    }

    async fn embed(&self, req: EmbedRequest) -> CoreResult<EmbedResponse> {
        let prompt: u64 = req.inputs.iter().map(|s| s.len() as u64).sum();
        Ok(EmbedResponse {
            vectors: req.inputs.iter().map(|_| vec![0.0_f32; 3]).collect(),
            model: Some(req.model),
            usage: self.report_usage.then(|| Usage {
                prompt_tokens: Some(prompt),
                completion_tokens: None,
                total_tokens: Some(prompt),
            }),
            provider: "null".into(),
            request_id: None,
        })
    }
}
