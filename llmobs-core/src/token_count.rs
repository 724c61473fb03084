//! Token accounting for chat messages and embeddings.
//!
//! Provider usage figures are authoritative. When a response carries no usable
//! usage object, an optional host-supplied callback is asked instead; without
//! one the count stays unknown (`None`).
//!
//! Request-side messages are only attributed `prompt_tokens` when the request
//! has exactly one message. With several messages there is no per-message
//! split, so each of them reports `None`. The same rule applies to response
//! choices, which report `completion_tokens` and otherwise the per-call total.

use std::sync::{Arc, PoisonError, RwLock};

use crate::error::CoreResult;
use crate::model::{ChatRequest, ChatResponse, EmbedRequest, EmbedResponse, Usage};

/// What the fallback callback is asked to count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenCountInput<'a> {
    pub model: Option<&'a str>,
    pub content: &'a str,
}

/// Host-supplied tokenizer. Returning `0` means "could not determine".
pub type TokenCountCallback =
    Arc<dyn Fn(&TokenCountInput<'_>) -> CoreResult<u64> + Send + Sync + 'static>;

/// Which side of the exchange a message belongs to, with the number of
/// messages on that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSide {
    Request { total: usize },
    Response { total: usize },
}

/// Per-message counts for one chat call, in request then response order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatTokenCounts {
    pub request: Vec<Option<u64>>,
    pub response: Vec<Option<u64>>,
}

#[derive(Default)]
pub struct TokenCounter {
    callback: RwLock<Option<TokenCountCallback>>,
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter")
            .field("has_callback", &self.has_callback())
            .finish()
    }
}

impl TokenCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or replace) the fallback tokenizer.
    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn(&TokenCountInput<'_>) -> CoreResult<u64> + Send + Sync + 'static,
    {
        *self.callback.write().unwrap_or_else(PoisonError::into_inner) =
            Some(Arc::new(callback));
    }

    pub fn clear_callback(&self) {
        *self.callback.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn has_callback(&self) -> bool {
        self.callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    // Clone the Arc out so the lock is released before the callback runs.
    fn callback(&self) -> Option<TokenCountCallback> {
        self.callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn fallback(&self, model: Option<&str>, content: &str) -> CoreResult<Option<u64>> {
        let Some(callback) = self.callback() else {
            return Ok(None);
        };
        let count = callback(&TokenCountInput { model, content })?;
        Ok((count > 0).then_some(count))
    }

    /// Token count for a single chat message.
    pub fn message_token_count(
        &self,
        usage: Option<&Usage>,
        side: MessageSide,
        model: Option<&str>,
        content: &str,
    ) -> CoreResult<Option<u64>> {
        match usage.filter(|u| u.is_usable()) {
            Some(usage) => Ok(match side {
                MessageSide::Request { total: 1 } => usage.prompt_tokens,
                MessageSide::Response { total: 1 } => {
                    usage.completion_tokens.or(usage.total_tokens)
                }
                _ => None,
            }),
            None => self.fallback(model, content),
        }
    }

    /// Counts for every request message and response choice of a chat call.
    pub fn chat_token_counts(
        &self,
        req: &ChatRequest,
        resp: &ChatResponse,
    ) -> CoreResult<ChatTokenCounts> {
        let usage = resp.usage.as_ref();
        let model = resp.model.as_deref().or(Some(req.model.as_str()));

        let request_side = MessageSide::Request {
            total: req.messages.len(),
        };
        let request = req
            .messages
            .iter()
            .map(|m| self.message_token_count(usage, request_side, model, &m.content))
            .collect::<CoreResult<Vec<_>>>()?;

        let response_side = MessageSide::Response {
            total: resp.choices.len(),
        };
        let response = resp
            .choices
            .iter()
            .map(|c| self.message_token_count(usage, response_side, model, &c.message.content))
            .collect::<CoreResult<Vec<_>>>()?;

        Ok(ChatTokenCounts { request, response })
    }

    /// Token count for an embedding call; `input` is the text recorded on the event.
    pub fn embedding_token_count(
        &self,
        req: &EmbedRequest,
        resp: &EmbedResponse,
        input: &str,
    ) -> CoreResult<Option<u64>> {
        match resp.usage.as_ref().filter(|u| u.is_usable()) {
            Some(usage) => Ok(usage.prompt_tokens.or(usage.total_tokens)),
            None => {
                let model = resp.model.as_deref().or(Some(req.model.as_str()));
                self.fallback(model, input)
            }
        }
    }
}
