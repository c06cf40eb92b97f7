//! Shared packet buffer — the only mutable state shared between the
//! producer and the consumer.
//!
//! Invariant: every appended record is consumed by exactly one drain.
//! `take_if_ready` performs the size check and the take-and-clear under a
//! single lock acquisition, so a record can never be lost between a read
//! and a clear, and a drain can never observe a half-appended record.

use std::sync::Mutex;

use crate::extract::PacketRecord;

/// Append-only, periodically drained ordered sequence of records.
#[derive(Debug, Default)]
pub struct PacketBuffer {
    records: Mutex<Vec<PacketRecord>>,
}

impl PacketBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one record. Fast: a lock and a push.
    pub fn append(&self, record: PacketRecord) {
        self.lock().push(record);
    }

    /// Number of buffered records.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Atomic take-and-clear, gated on the drain threshold.
    ///
    /// Returns the full buffer contents and leaves the buffer empty when
    /// at least `threshold` records are present, `None` otherwise. The
    /// returned batch is a frozen snapshot: records appended after the
    /// take go into the next batch.
    pub fn take_if_ready(&self, threshold: usize) -> Option<Vec<PacketRecord>> {
        let mut records = self.lock();
        if records.len() >= threshold {
            Some(std::mem::take(&mut *records))
        } else {
            None
        }
    }

    // A poisoned lock still guards valid records; recover them rather
    // than dropping a batch on the floor.
    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<PacketRecord>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
