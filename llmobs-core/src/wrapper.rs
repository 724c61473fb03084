//! Instrumenting decorator around chat and embedding providers.
//!
//! `InstrumentedProvider` implements the same provider traits it wraps. Per
//! call it counts the supportability metric, marks the transaction, opens a
//! segment, invokes the inner provider exactly once, and hands the resulting
//! events to the sink. The inner result or error is returned unchanged.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{Span, debug, field, info_span};
use tracing_futures::Instrument;

use crate::attributes::{CustomAttributes, extract_llm_attributes};
use crate::config::{Config, VendorCfg};
use crate::error::{CoreResult, LlmObsError};
use crate::model::{ChatRequest, ChatResponse, EmbedRequest, EmbedResponse};
use crate::provider::{ChatProvider, EmbedProvider};
use crate::telemetry::{
    CallOutcome, EventFactory, LLM_TRANSACTION_MARKER, LlmEvent, LlmEventSink, SEGMENT_ROOT,
    SUPPORTABILITY_ML, SUPPORTABILITY_ROOT,
};
use crate::token_count::TokenCounter;
use crate::tracer::Tracer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Chat,
    Embeddings,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Embeddings => "embeddings",
        }
    }

    /// `Llm/completion/<Vendor>/chat` or `Llm/embedding/<Vendor>/embeddings`.
    pub fn segment_name(&self, vendor: &str) -> String {
        let operation = match self {
            Self::Chat => "completion",
            Self::Embeddings => "embedding",
        };
        format!("{SEGMENT_ROOT}/{operation}/{vendor}/{}", self.as_str())
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Supportability/<language>/ML/<Vendor>/<version>`.
pub fn supportability_metric(vendor: &VendorCfg) -> String {
    format!(
        "{SUPPORTABILITY_ROOT}/{}/{SUPPORTABILITY_ML}/{}/{}",
        vendor.agent_language, vendor.name, vendor.version
    )
}

fn new_event_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Segment that is closed exactly once: explicitly through `close`, or on drop
/// when the call future is cancelled mid-flight.
struct OpenSegment<'t, T: Tracer> {
    tracer: &'t T,
    segment: Option<T::Segment>,
}

impl<'t, T: Tracer> OpenSegment<'t, T> {
    fn open(tracer: &'t T, txn: &T::Transaction, name: &str) -> Self {
        Self {
            tracer,
            segment: Some(tracer.open_segment(txn, name)),
        }
    }

    fn notice_error(&self, error: &LlmObsError) {
        if let Some(segment) = &self.segment {
            self.tracer.notice_error(segment, error);
        }
    }

    fn close(mut self) -> Duration {
        self.segment
            .take()
            .map_or(Duration::ZERO, |segment| self.tracer.close_segment(segment))
    }
}

impl<T: Tracer> Drop for OpenSegment<'_, T> {
    fn drop(&mut self) {
        if let Some(segment) = self.segment.take() {
            debug!("llm call dropped before completion; closing its segment");
            self.tracer.close_segment(segment);
        }
    }
}

/// Transaction-scoped state captured once at call start.
struct CallScope<T: Tracer> {
    txn: T::Transaction,
    custom: CustomAttributes,
}

pub struct InstrumentedProvider<P, T: Tracer> {
    inner: P,
    tracer: Arc<T>,
    counter: Arc<TokenCounter>,
    sink: Arc<dyn LlmEventSink>,
    factory: EventFactory,
    enabled: bool,
    vendor: String,
    metric: String,
}

impl<P, T: Tracer> fmt::Debug for InstrumentedProvider<P, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentedProvider")
            .field("vendor", &self.vendor)
            .field("enabled", &self.enabled)
            .field("metric", &self.metric)
            .finish_non_exhaustive()
    }
}

impl<P, T: Tracer> InstrumentedProvider<P, T> {
    pub fn new(
        inner: P,
        tracer: Arc<T>,
        counter: Arc<TokenCounter>,
        sink: Arc<dyn LlmEventSink>,
        cfg: &Config,
    ) -> Self {
        Self {
            inner,
            tracer,
            counter,
            sink,
            factory: EventFactory::from_config(cfg),
            enabled: cfg.ai_monitoring.enabled,
            vendor: cfg.vendor.name.clone(),
            metric: supportability_metric(&cfg.vendor),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn into_inner(self) -> P {
        self.inner
    }

    /// Metric, marker attribute and `llm.` attribute snapshot. `None` means the
    /// call runs outside any transaction and is passed through.
    fn begin(&self, kind: CallKind) -> Option<CallScope<T>> {
        self.tracer.record_metric(&self.metric, 1);
        let Some(txn) = self.tracer.current_transaction() else {
            debug!(llm.kind = %kind, "no current transaction; llm call not instrumented");
            return None;
        };
        let all = self.tracer.custom_attributes(&txn);
        if !all.iter().any(|(k, _)| k == LLM_TRANSACTION_MARKER) {
            self.tracer
                .set_custom_attribute(&txn, LLM_TRANSACTION_MARKER, true.into());
        }
        let custom = extract_llm_attributes(&all);
        Some(CallScope { txn, custom })
    }

    fn span(&self, kind: CallKind, request_model: &str, segment: &str) -> Span {
        info_span!(
            "llm_call",
            llm.kind = %kind,
            llm.vendor = %self.vendor,
            llm.request_model = %request_model,
            llm.segment = %segment,
            llm.error = field::Empty,
            llm.duration_ms = field::Empty,
        )
    }

    /// Notice the error (if any), close the segment and report the outcome.
    fn finish(
        &self,
        segment: OpenSegment<'_, T>,
        span: &Span,
        error: Option<&LlmObsError>,
    ) -> CallOutcome {
        if let Some(e) = error {
            segment.notice_error(e);
            span.record("llm.error", field::display(e.kind()));
            debug!(parent: span, error = %e, "llm call failed");
        }
        let duration = segment.close();
        span.record("llm.duration_ms", duration.as_secs_f64() * 1000.0);
        CallOutcome {
            duration,
            error: error.is_some(),
        }
    }
}

#[async_trait]
impl<P: ChatProvider, T: Tracer> ChatProvider for InstrumentedProvider<P, T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn chat(&self, req: ChatRequest) -> CoreResult<ChatResponse> {
        if !self.enabled {
            return self.inner.chat(req).await;
        }
        let Some(scope) = self.begin(CallKind::Chat) else {
            return self.inner.chat(req).await;
        };

        let segment_name = CallKind::Chat.segment_name(&self.vendor);
        let span = self.span(CallKind::Chat, &req.model, &segment_name);
        let segment = OpenSegment::open(&*self.tracer, &scope.txn, &segment_name);

        let result = self
            .inner
            .chat(req.clone())
            .instrument(span.clone())
            .await;

        let summary_id = new_event_id();
        let (result, events) = match result {
            Ok(resp) => match self.counter.chat_token_counts(&req, &resp) {
                Ok(counts) => {
                    let outcome = self.finish(segment, &span, None);
                    let summary = self.factory.chat_summary(
                        summary_id.clone(),
                        &req,
                        Some(&resp),
                        outcome,
                        &scope.custom,
                    );
                    let mut events = vec![LlmEvent::ChatCompletionSummary(summary)];
                    events.extend(
                        self.factory
                            .chat_messages(&summary_id, &req, &resp, &counts, &scope.custom)
                            .into_iter()
                            .map(LlmEvent::ChatCompletionMessage),
                    );
                    (Ok(resp), events)
                }
                Err(e) => {
                    let outcome = self.finish(segment, &span, Some(&e));
                    let summary = self.factory.chat_summary(
                        summary_id,
                        &req,
                        Some(&resp),
                        outcome,
                        &scope.custom,
                    );
                    (Err(e), vec![LlmEvent::ChatCompletionSummary(summary)])
                }
            },
            Err(e) => {
                let outcome = self.finish(segment, &span, Some(&e));
                let summary =
                    self.factory
                        .chat_summary(summary_id, &req, None, outcome, &scope.custom);
                (Err(e), vec![LlmEvent::ChatCompletionSummary(summary)])
            }
        };

        self.sink.record_all(events);
        result
    }
}

#[async_trait]
impl<P: EmbedProvider, T: Tracer> EmbedProvider for InstrumentedProvider<P, T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn embed(&self, req: EmbedRequest) -> CoreResult<EmbedResponse> {
        if !self.enabled {
            return self.inner.embed(req).await;
        }
        let Some(scope) = self.begin(CallKind::Embeddings) else {
            return self.inner.embed(req).await;
        };

        let segment_name = CallKind::Embeddings.segment_name(&self.vendor);
        let span = self.span(CallKind::Embeddings, &req.model, &segment_name);
        let segment = OpenSegment::open(&*self.tracer, &scope.txn, &segment_name);

        let result = self
            .inner
            .embed(req.clone())
            .instrument(span.clone())
            .await;

        let id = new_event_id();
        let (result, event) = match result {
            Ok(resp) => {
                let input = EventFactory::embedding_input(&req);
                match self.counter.embedding_token_count(&req, &resp, &input) {
                    Ok(token_count) => {
                        let outcome = self.finish(segment, &span, None);
                        let event = self.factory.embedding(
                            id,
                            &req,
                            Some(&resp),
                            outcome,
                            token_count,
                            &scope.custom,
                        );
                        (Ok(resp), event)
                    }
                    Err(e) => {
                        let outcome = self.finish(segment, &span, Some(&e));
                        let event = self.factory.embedding(
                            id,
                            &req,
                            Some(&resp),
                            outcome,
                            None,
                            &scope.custom,
                        );
                        (Err(e), event)
                    }
                }
            }
            Err(e) => {
                let outcome = self.finish(segment, &span, Some(&e));
                let event = self
                    .factory
                    .embedding(id, &req, None, outcome, None, &scope.custom);
                (Err(e), event)
            }
        };

        self.sink.record(LlmEvent::Embedding(event));
        result
    }
}
