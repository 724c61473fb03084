use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::attributes::AttributeValue;
use crate::error::LlmObsError;
use crate::tracer::Tracer;

tokio::task_local! {
    static CURRENT_TRANSACTION: Arc<Transaction>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticedError {
    pub kind: String,
    pub message: String,
}

/// Snapshot of one segment of a transaction's tree.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRecord {
    pub name: String,
    /// Index of the parent segment within the same transaction.
    pub parent: Option<usize>,
    /// `None` while the segment is still open.
    pub duration: Option<Duration>,
    pub error: Option<NoticedError>,
}

#[derive(Debug, Default)]
struct TransactionState {
    attributes: Vec<(String, AttributeValue)>,
    segments: Vec<SegmentRecord>,
    // Stack of currently open segment indices; the last one is the active segment.
    open: Vec<usize>,
}

#[derive(Debug)]
pub struct Transaction {
    id: String,
    name: String,
    state: Mutex<TransactionState>,
}

impl Transaction {
    fn new(name: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            state: Mutex::new(TransactionState::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn segments(&self) -> Vec<SegmentRecord> {
        self.state().segments.clone()
    }

    pub fn attributes(&self) -> Vec<(String, AttributeValue)> {
        self.state().attributes.clone()
    }

    pub fn attribute(&self, key: &str) -> Option<AttributeValue> {
        self.state()
            .attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    fn state(&self) -> MutexGuard<'_, TransactionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Open segment handle returned by `InMemoryTracer::open_segment`.
#[derive(Debug)]
pub struct Segment {
    txn: Arc<Transaction>,
    index: usize,
    started: Instant,
}

/// Process-local tracer: the current transaction is task-local, set by
/// `in_transaction`, and metrics are kept in a name → count table.
///
/// A new segment's parent is the most recently opened segment of the
/// transaction that is still open. This assumes calls within one transaction
/// run one after another; two calls polled together (`join!`) in the same
/// transaction nest the second under the first instead of becoming siblings.
#[derive(Debug, Default)]
pub struct InMemoryTracer {
    metrics: Mutex<HashMap<String, u64>>,
}

impl InMemoryTracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fut` as the body of a new transaction named `name`.
    ///
    /// Every `current_transaction` call made from within `fut` (on the same
    /// task) sees the new transaction. Spawned tasks do not inherit it.
    pub async fn in_transaction<F>(&self, name: &str, fut: F) -> (Arc<Transaction>, F::Output)
    where
        F: Future,
    {
        let txn = Arc::new(Transaction::new(name));
        let out = CURRENT_TRANSACTION.scope(Arc::clone(&txn), fut).await;
        (txn, out)
    }

    pub fn metric(&self, name: &str) -> u64 {
        self.metrics().into_iter().find(|(n, _)| n == name).map_or(0, |(_, v)| v)
    }

    /// All metrics, sorted by name.
    pub fn metrics(&self) -> Vec<(String, u64)> {
        let mut all: Vec<(String, u64)> = self
            .metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        all.sort();
        all
    }
}

impl Tracer for InMemoryTracer {
    type Transaction = Arc<Transaction>;
    type Segment = Segment;

    fn current_transaction(&self) -> Option<Arc<Transaction>> {
        CURRENT_TRANSACTION.try_with(Arc::clone).ok()
    }

    // Parent is the top of the open stack; see the type-level note on overlap.
    fn open_segment(&self, txn: &Arc<Transaction>, name: &str) -> Segment {
        let mut state = txn.state();
        let parent = state.open.last().copied();
        let index = state.segments.len();
        state.segments.push(SegmentRecord {
            name: name.to_string(),
            parent,
            duration: None,
            error: None,
        });
        state.open.push(index);
        Segment {
            txn: Arc::clone(txn),
            index,
            started: Instant::now(),
        }
    }

    fn notice_error(&self, segment: &Segment, error: &LlmObsError) {
        let mut state = segment.txn.state();
        if let Some(record) = state.segments.get_mut(segment.index) {
            record.error = Some(NoticedError {
                kind: error.kind().to_string(),
                message: error.to_string(),
            });
        }
    }

    fn close_segment(&self, segment: Segment) -> Duration {
        let duration = segment.started.elapsed();
        let mut state = segment.txn.state();
        if let Some(record) = state.segments.get_mut(segment.index) {
            record.duration = Some(duration);
        }
        state.open.retain(|&i| i != segment.index);
        duration
    }

    fn set_custom_attribute(&self, txn: &Arc<Transaction>, key: &str, value: AttributeValue) {
        let mut state = txn.state();
        match state.attributes.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => state.attributes.push((key.to_string(), value)),
        }
    }

    fn custom_attributes(&self, txn: &Arc<Transaction>) -> Vec<(String, AttributeValue)> {
        txn.attributes()
    }

    fn record_metric(&self, name: &str, increment: u64) {
        let mut metrics = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
        *metrics.entry(name.to_string()).or_default() += increment;
    }
}
