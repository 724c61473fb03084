//! LLM event records and the pure functions that build them.

use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::attributes::CustomAttributes;
use crate::config::Config;
use crate::error::{CoreResult, LlmObsError};
use crate::model::{ChatRequest, ChatResponse, EmbedRequest, EmbedResponse, Role};
use crate::telemetry::keys::{
    EVENT_CHAT_COMPLETION_MESSAGE, EVENT_CHAT_COMPLETION_SUMMARY, EVENT_EMBEDDING,
};
use crate::token_count::ChatTokenCounts;

fn duration_ms<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}

/// Fields shared by every event variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LlmEventBase {
    pub id: String,
    pub vendor: String,
    pub ingest_source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// `llm.`-scoped transaction attributes, prefix stripped. Merged into the
    /// payload by `LlmEvent::to_payload`.
    #[serde(skip)]
    pub custom_attributes: CustomAttributes,
}

/// Timing and outcome of the provider call; `duration` is the segment's.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CallOutcome {
    #[serde(serialize_with = "duration_ms")]
    pub duration: Duration,
    pub error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionSummary {
    #[serde(flatten)]
    pub base: LlmEventBase,
    #[serde(flatten)]
    pub outcome: CallOutcome,
    pub request_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_model: Option<String>,
    pub number_of_messages: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionMessage {
    #[serde(flatten)]
    pub base: LlmEventBase,
    /// Id of the owning `ChatCompletionSummary`.
    pub completion_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub role: Role,
    pub sequence: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_response: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embedding {
    #[serde(flatten)]
    pub base: LlmEventBase,
    #[serde(flatten)]
    pub outcome: CallOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    pub request_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum LlmEvent {
    #[serde(rename = "LlmChatCompletionSummary")]
    ChatCompletionSummary(ChatCompletionSummary),
    #[serde(rename = "LlmChatCompletionMessage")]
    ChatCompletionMessage(ChatCompletionMessage),
    #[serde(rename = "LlmEmbedding")]
    Embedding(Embedding),
}

impl LlmEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ChatCompletionSummary(_) => EVENT_CHAT_COMPLETION_SUMMARY,
            Self::ChatCompletionMessage(_) => EVENT_CHAT_COMPLETION_MESSAGE,
            Self::Embedding(_) => EVENT_EMBEDDING,
        }
    }

    pub fn base(&self) -> &LlmEventBase {
        match self {
            Self::ChatCompletionSummary(e) => &e.base,
            Self::ChatCompletionMessage(e) => &e.base,
            Self::Embedding(e) => &e.base,
        }
    }

    pub fn id(&self) -> &str {
        &self.base().id
    }

    /// Summary-level outcome; messages have none.
    pub fn outcome(&self) -> Option<&CallOutcome> {
        match self {
            Self::ChatCompletionSummary(e) => Some(&e.outcome),
            Self::Embedding(e) => Some(&e.outcome),
            Self::ChatCompletionMessage(_) => None,
        }
    }

    /// Flat attribute map as exported. Intrinsic fields win over custom
    /// attributes with the same name.
    pub fn to_payload(&self) -> CoreResult<serde_json::Map<String, serde_json::Value>> {
        let mut payload = match serde_json::to_value(self).map_err(anyhow::Error::from)? {
            serde_json::Value::Object(map) => map,
            other => {
                return Err(LlmObsError::Other(anyhow::anyhow!(
                    "event serialized to non-object: {other}"
                )));
            }
        };
        for (key, value) in self.base().custom_attributes.iter() {
            payload
                .entry(key.to_string())
                .or_insert_with(|| value.into());
        }
        Ok(payload)
    }
}

/// Builds events from call data. Holds only static settings, so every method
/// is deterministic in its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFactory {
    vendor: String,
    ingest_source: String,
    record_content: bool,
}

impl EventFactory {
    pub fn new(
        vendor: impl Into<String>,
        ingest_source: impl Into<String>,
        record_content: bool,
    ) -> Self {
        Self {
            vendor: vendor.into(),
            ingest_source: ingest_source.into(),
            record_content,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            cfg.vendor.name.to_lowercase(),
            cfg.vendor.agent_language.clone(),
            cfg.ai_monitoring.record_content,
        )
    }

    fn base(
        &self,
        id: String,
        request_id: Option<&str>,
        custom: &CustomAttributes,
    ) -> LlmEventBase {
        LlmEventBase {
            id,
            vendor: self.vendor.clone(),
            ingest_source: self.ingest_source.clone(),
            request_id: request_id.map(str::to_string),
            custom_attributes: custom.clone(),
        }
    }

    fn content(&self, text: &str) -> Option<String> {
        self.record_content.then(|| text.to_string())
    }

    /// Summary for a chat call. `resp` is `None` when the call failed.
    pub fn chat_summary(
        &self,
        id: String,
        req: &ChatRequest,
        resp: Option<&ChatResponse>,
        outcome: CallOutcome,
        custom: &CustomAttributes,
    ) -> ChatCompletionSummary {
        let choices = resp.map_or(0, |r| r.choices.len());
        ChatCompletionSummary {
            base: self.base(id, resp.and_then(|r| r.request_id.as_deref()), custom),
            outcome,
            request_model: req.model.clone(),
            response_model: resp.and_then(|r| r.model.clone()),
            number_of_messages: req.messages.len() + choices,
            request_temperature: req.temperature,
            request_max_tokens: req.max_output_tokens,
            finish_reason: resp
                .and_then(|r| r.choices.first())
                .and_then(|c| c.finish_reason)
                .map(|f| f.as_str().to_string()),
        }
    }

    /// One message per request message, then one per response choice, with
    /// contiguous `sequence` numbers starting at 0.
    pub fn chat_messages(
        &self,
        summary_id: &str,
        req: &ChatRequest,
        resp: &ChatResponse,
        counts: &ChatTokenCounts,
        custom: &CustomAttributes,
    ) -> Vec<ChatCompletionMessage> {
        let request_id = resp.request_id.as_deref();
        let request = req
            .messages
            .iter()
            .zip(counts.request.iter().copied().chain(std::iter::repeat(None)))
            .map(|(m, count)| (m, count, false));
        let response = resp
            .choices
            .iter()
            .map(|c| &c.message)
            .zip(counts.response.iter().copied().chain(std::iter::repeat(None)))
            .map(|(m, count)| (m, count, true));

        request
            .chain(response)
            .enumerate()
            .map(|(sequence, (message, token_count, is_response))| ChatCompletionMessage {
                base: self.base(format!("{summary_id}-{sequence}"), request_id, custom),
                completion_id: summary_id.to_string(),
                content: self.content(&message.content),
                role: message.role,
                sequence,
                is_response: is_response.then_some(true),
                token_count,
                response_model: resp.model.clone(),
            })
            .collect()
    }

    /// Text recorded as an embedding's `input`: the single input verbatim,
    /// several inputs as a JSON array.
    pub fn embedding_input(req: &EmbedRequest) -> String {
        match req.inputs.as_slice() {
            [single] => single.clone(),
            many => serde_json::to_string(many).unwrap_or_default(),
        }
    }

    pub fn embedding(
        &self,
        id: String,
        req: &EmbedRequest,
        resp: Option<&EmbedResponse>,
        outcome: CallOutcome,
        token_count: Option<u64>,
        custom: &CustomAttributes,
    ) -> Embedding {
        Embedding {
            base: self.base(id, resp.and_then(|r| r.request_id.as_deref()), custom),
            outcome,
            input: self.content(&Self::embedding_input(req)),
            request_model: req.model.clone(),
            response_model: resp.and_then(|r| r.model.clone()),
            token_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::attributes::{AttributeValue, extract_llm_attributes};
    use crate::test_util::{chat_request, chat_response, embed_response};

    fn factory() -> EventFactory {
        EventFactory::new("openai", "Rust", true)
    }

    fn custom() -> CustomAttributes {
        extract_llm_attributes(&vec![
            ("llm.conversation_id".to_string(), AttributeValue::from("conv-9")),
            ("ignored".to_string(), AttributeValue::from("x")),
        ])
    }

    fn ok(ms: u64) -> CallOutcome {
        CallOutcome {
            duration: Duration::from_millis(ms),
            error: false,
        }
    }

    #[test]
    fn summary_counts_request_and_response_messages() {
        let req = chat_request(&["a", "b"]);
        let resp = chat_response(&["c"]);
        let s = factory().chat_summary("sum-1".into(), &req, Some(&resp), ok(12), &custom());
        assert_eq!(s.number_of_messages, 3);
        assert_eq!(s.request_model, "gpt-4o");
        assert_eq!(s.response_model.as_deref(), Some("gpt-4o"));
        assert_eq!(s.finish_reason.as_deref(), Some("stop"));
        assert_eq!(s.base.request_id.as_deref(), Some("req_123"));
        assert!(!s.outcome.error);
    }

    #[test]
    fn failed_summary_has_no_response_fields() {
        let req = chat_request(&["a"]);
        let outcome = CallOutcome {
            duration: Duration::from_millis(3),
            error: true,
        };
        let s = factory().chat_summary("sum-2".into(), &req, None, outcome, &custom());
        assert_eq!(s.number_of_messages, 1);
        assert_eq!(s.response_model, None);
        assert_eq!(s.finish_reason, None);
        assert!(s.outcome.error);
    }

    #[test]
    fn messages_are_sequenced_and_linked() {
        let req = chat_request(&["q1", "q2"]);
        let resp = chat_response(&["a1"]);
        let counts = ChatTokenCounts {
            request: vec![None, None],
            response: vec![Some(5)],
        };
        let msgs = factory().chat_messages("sum-3", &req, &resp, &counts, &custom());
        assert_eq!(msgs.len(), 3);
        for (i, m) in msgs.iter().enumerate() {
            assert_eq!(m.sequence, i);
            assert_eq!(m.completion_id, "sum-3");
            assert_eq!(m.base.id, format!("sum-3-{i}"));
        }
        assert_eq!(msgs[0].role, Role::User);
        assert_eq!(msgs[0].is_response, None);
        assert_eq!(msgs[2].role, Role::Assistant);
        assert_eq!(msgs[2].is_response, Some(true));
        assert_eq!(msgs[2].token_count, Some(5));
        assert_eq!(msgs[2].content.as_deref(), Some("a1"));
    }

    #[test]
    fn record_content_off_drops_text() {
        let f = EventFactory::new("openai", "Rust", false);
        let req = chat_request(&["secret"]);
        let resp = chat_response(&["also secret"]);
        let msgs = f.chat_messages("s", &req, &resp, &ChatTokenCounts::default(), &custom());
        assert!(msgs.iter().all(|m| m.content.is_none()));

        let ereq = EmbedRequest::new("text-embedding-3-small", vec!["private".into()]);
        let e = f.embedding("e".into(), &ereq, None, ok(1), None, &custom());
        assert_eq!(e.input, None);
    }

    #[test]
    fn embedding_input_single_and_many() {
        let one = EmbedRequest::new("m", vec!["hello".into()]);
        assert_eq!(EventFactory::embedding_input(&one), "hello");
        let many = EmbedRequest::new("m", vec!["a".into(), "b".into()]);
        assert_eq!(EventFactory::embedding_input(&many), r#"["a","b"]"#);
    }

    #[test]
    fn summary_payload_has_stable_field_names() {
        let req = chat_request(&["hi"]);
        let resp = chat_response(&["yo"]);
        let s = factory().chat_summary("sum-4".into(), &req, Some(&resp), ok(250), &custom());
        let payload = LlmEvent::ChatCompletionSummary(s).to_payload().unwrap();
        assert_eq!(payload["type"], json!("LlmChatCompletionSummary"));
        assert_eq!(payload["id"], json!("sum-4"));
        assert_eq!(payload["vendor"], json!("openai"));
        assert_eq!(payload["ingest_source"], json!("Rust"));
        assert_eq!(payload["duration"], json!(250.0));
        assert_eq!(payload["error"], json!(false));
        assert_eq!(payload["number_of_messages"], json!(2));
        assert_eq!(payload["conversation_id"], json!("conv-9"));
        assert!(!payload.contains_key("ignored"));
        assert!(!payload.contains_key("request_temperature"));
    }

    #[test]
    fn message_payload_omits_absent_optionals() {
        let req = chat_request(&["hi"]);
        let resp = chat_response(&["yo"]);
        let msgs =
            factory().chat_messages("s", &req, &resp, &ChatTokenCounts::default(), &custom());
        let request_msg = LlmEvent::ChatCompletionMessage(msgs[0].clone()).to_payload().unwrap();
        assert_eq!(request_msg["type"], json!("LlmChatCompletionMessage"));
        assert_eq!(request_msg["role"], json!("user"));
        assert!(!request_msg.contains_key("is_response"));
        assert!(!request_msg.contains_key("token_count"));
        let response_msg = LlmEvent::ChatCompletionMessage(msgs[1].clone()).to_payload().unwrap();
        assert_eq!(response_msg["is_response"], json!(true));
    }

    #[test]
    fn intrinsics_win_over_colliding_custom_keys() {
        let custom = extract_llm_attributes(&vec![
            ("llm.role".to_string(), AttributeValue::from("spoofed")),
            ("llm.topic".to_string(), AttributeValue::from("billing")),
        ]);
        let req = chat_request(&["hi"]);
        let resp = chat_response(&["yo"]);
        let msgs = factory().chat_messages("s", &req, &resp, &ChatTokenCounts::default(), &custom);
        let payload = LlmEvent::ChatCompletionMessage(msgs[0].clone()).to_payload().unwrap();
        assert_eq!(payload["role"], json!("user"));
        assert_eq!(payload["topic"], json!("billing"));
    }

    #[test]
    fn embedding_payload() {
        let req = EmbedRequest::new("text-embedding-3-small", vec!["hello".into()]);
        let resp = embed_response(1, None);
        let e = factory().embedding("emb-1".into(), &req, Some(&resp), ok(7), Some(2), &custom());
        let event = LlmEvent::Embedding(e);
        assert_eq!(event.event_type(), "LlmEmbedding");
        assert_eq!(event.outcome().map(|o| o.duration), Some(Duration::from_millis(7)));
        let payload = event.to_payload().unwrap();
        assert_eq!(payload["input"], json!("hello"));
        assert_eq!(payload["token_count"], json!(2));
        assert_eq!(payload["request_model"], json!("text-embedding-3-small"));
        assert_eq!(payload["conversation_id"], json!("conv-9"));
    }
}
