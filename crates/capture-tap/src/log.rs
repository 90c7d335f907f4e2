//! Append-only capture log.

use parking_lot::RwLock;
use replay_core_types::Capture;

use crate::shim::RawCapture;

#[derive(Debug, Default)]
struct Inner {
    entries: Vec<Capture>,
    /// Last sequence number handed out; zero before the first capture.
    last_seq: u64,
}

/// Written by the poller only; readable from any thread at any time.
#[derive(Debug, Default)]
pub struct CaptureLog {
    inner: RwLock<Inner>,
}

impl CaptureLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Numbers and appends a batch under one write lock. Returns what was
    /// appended, in order.
    pub(crate) fn append_batch(&self, batch: Vec<RawCapture>) -> Vec<Capture> {
        if batch.is_empty() {
            return Vec::new();
        }
        let mut inner = self.inner.write();
        let mut appended = Vec::with_capacity(batch.len());
        for raw in batch {
            let seq = inner.last_seq + 1;
            if let Some(capture) = raw.into_capture(seq) {
                inner.last_seq = seq;
                inner.entries.push(capture.clone());
                appended.push(capture);
            }
        }
        appended
    }

    pub fn snapshot(&self) -> Vec<Capture> {
        self.inner.read().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_seq(&self) -> u64 {
        self.inner.read().last_seq
    }

    /// Drops every capture but keeps numbering where it was.
    pub fn clear(&self) {
        self.inner.write().entries.clear();
    }

    /// Drops every capture and restarts numbering at zero.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.last_seq = 0;
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&[Capture]) -> R) -> R {
        f(&self.inner.read().entries)
    }
}
