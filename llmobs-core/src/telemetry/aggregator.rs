use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::telemetry::{LlmEvent, LlmEventSink};

/// Returned alongside each harvest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarvestMetadata {
    /// Capacity of the buffer during the harvested period.
    pub reservoir_size: usize,
    /// Events offered since the previous harvest, including dropped ones.
    pub events_seen: u64,
}

#[derive(Debug, Default)]
struct Buffer {
    events: Vec<LlmEvent>,
    seen: u64,
}

/// Shared, append-only buffer of LLM events.
///
/// All mutation happens under one mutex and never across an `.await`;
/// `harvest` swaps the buffer out, so an event lands in exactly one harvest.
#[derive(Debug)]
pub struct LlmEventAggregator {
    capacity: usize,
    buffer: Mutex<Buffer>,
}

impl LlmEventAggregator {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffer: Mutex::new(Buffer::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn buffer(&self) -> MutexGuard<'_, Buffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push_locked(&self, buf: &mut Buffer, events: impl IntoIterator<Item = LlmEvent>) {
        let mut dropped = 0_u64;
        for event in events {
            buf.seen += 1;
            if buf.events.len() < self.capacity {
                buf.events.push(event);
            } else {
                dropped += 1;
            }
        }
        if dropped > 0 {
            tracing::warn!(
                dropped,
                capacity = self.capacity,
                "llm event buffer full; dropping events until next harvest"
            );
        }
    }

    /// Take everything recorded since the last harvest, in insertion order.
    pub fn harvest(&self) -> (HarvestMetadata, Vec<LlmEvent>) {
        let taken = std::mem::take(&mut *self.buffer());
        let meta = HarvestMetadata {
            reservoir_size: self.capacity,
            events_seen: taken.seen,
        };
        tracing::debug!(
            events = taken.events.len(),
            seen = taken.seen,
            "harvested llm events"
        );
        (meta, taken.events)
    }

    pub fn len(&self) -> usize {
        self.buffer().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LlmEventAggregator {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_SAMPLES_STORED)
    }
}

impl LlmEventSink for LlmEventAggregator {
    fn record(&self, event: LlmEvent) {
        let mut buf = self.buffer();
        self.push_locked(&mut buf, [event]);
    }

    fn record_all(&self, events: Vec<LlmEvent>) {
        let mut buf = self.buffer();
        self.push_locked(&mut buf, events);
    }
}
