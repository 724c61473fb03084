//! LLM event records, their aggregation, and the sink seam the call wrapper
//! writes to.

pub mod aggregator;
pub mod events;
pub mod keys;
#[cfg(test)]
pub mod test_span;

pub use aggregator::{HarvestMetadata, LlmEventAggregator};
pub use events::*;
pub use keys::*;

/// Implement this to receive LLM events.
///
/// Requirements:
/// - Implementations must be thread-safe (`Send + Sync`) and `'static`.
/// - `record` **may** be called from any thread; implementations should avoid panicking.
/// - Keep overhead minimal; this runs right after every provider call.
pub trait LlmEventSink: Send + Sync + 'static {
    fn record(&self, event: LlmEvent);

    /// Record the events of one call. The default forwards one by one;
    /// buffering sinks should append the batch atomically.
    fn record_all(&self, events: Vec<LlmEvent>) {
        for event in events {
            self.record(event);
        }
    }
}
