use std::sync::Arc;

use crate::config::Config;
use crate::error::CoreResult;
use crate::telemetry::{HarvestMetadata, LlmEvent, LlmEventAggregator, LlmEventSink};
use crate::token_count::{TokenCountInput, TokenCounter};
use crate::tracer::Tracer;
use crate::wrapper::InstrumentedProvider;

/// Entry point for hosts: owns the token counter and event buffer shared by
/// every provider it instruments.
#[derive(Debug)]
pub struct LlmInstrumentation {
    config: Config,
    counter: Arc<TokenCounter>,
    aggregator: Arc<LlmEventAggregator>,
}

impl LlmInstrumentation {
    pub fn new(config: Config) -> CoreResult<Self> {
        config.validate()?;
        let aggregator = Arc::new(LlmEventAggregator::new(
            config.ai_monitoring.max_samples_stored,
        ));
        tracing::debug!(
            vendor = %config.vendor.name,
            enabled = config.ai_monitoring.enabled,
            capacity = config.ai_monitoring.max_samples_stored,
            "llm instrumentation configured"
        );
        Ok(Self {
            config,
            counter: Arc::new(TokenCounter::new()),
            aggregator,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Tokenizer consulted when a response carries no usable usage object.
    pub fn set_token_count_callback<F>(&self, callback: F)
    where
        F: Fn(&TokenCountInput<'_>) -> CoreResult<u64> + Send + Sync + 'static,
    {
        self.counter.set_callback(callback);
    }

    pub fn clear_token_count_callback(&self) {
        self.counter.clear_callback();
    }

    pub fn token_counter(&self) -> &Arc<TokenCounter> {
        &self.counter
    }

    pub fn aggregator(&self) -> &Arc<LlmEventAggregator> {
        &self.aggregator
    }

    pub fn harvest(&self) -> (HarvestMetadata, Vec<LlmEvent>) {
        self.aggregator.harvest()
    }

    /// Wrap `provider` so its calls report to `tracer` and this instance's buffer.
    pub fn instrument<P, T: Tracer>(
        &self,
        provider: P,
        tracer: Arc<T>,
    ) -> InstrumentedProvider<P, T> {
        let sink: Arc<dyn LlmEventSink> = self.aggregator.clone();
        InstrumentedProvider::new(provider, tracer, self.counter.clone(), sink, &self.config)
    }
}
