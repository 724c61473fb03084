//! Seam to the host agent's transaction/segment tracer.
//!
//! The instrumentation never owns transactions. It asks the host for the
//! current one, opens and closes a segment per provider call, and reads or
//! writes custom attributes through this trait. `InMemoryTracer` is a complete
//! in-process implementation for hosts without their own tracer, and for tests.

pub mod memory;

pub use memory::{InMemoryTracer, NoticedError, SegmentRecord, Transaction};

use std::time::Duration;

use crate::attributes::AttributeValue;
use crate::error::LlmObsError;

/// Implement this to plug the instrumentation into a tracing engine.
///
/// Requirements:
/// - Implementations must be thread-safe; calls arrive from any task.
/// - None of these methods may block on I/O: they run around, never across,
///   the provider call.
pub trait Tracer: Send + Sync + 'static {
    type Transaction: Clone + Send + Sync;
    type Segment: Send + Sync;

    /// Transaction the calling task is executing in, if any.
    fn current_transaction(&self) -> Option<Self::Transaction>;

    /// Open a segment as a child of the transaction's active segment.
    fn open_segment(&self, txn: &Self::Transaction, name: &str) -> Self::Segment;

    fn notice_error(&self, segment: &Self::Segment, error: &LlmObsError);

    /// Close the segment and return its measured duration.
    fn close_segment(&self, segment: Self::Segment) -> Duration;

    fn set_custom_attribute(&self, txn: &Self::Transaction, key: &str, value: AttributeValue);

    fn custom_attributes(&self, txn: &Self::Transaction) -> Vec<(String, AttributeValue)>;

    fn record_metric(&self, name: &str, increment: u64);
}
