//! Deduplicating work queue.
//!
//! Owns the three disjoint sets an identifier can be in: pending (awaiting
//! submission), in flight (mid-submission) and added (confirmed on the
//! remote list). No I/O happens here; every method is a short critical
//! section so callers can hold it behind a plain mutex.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::model::{Did, Outcome, QueueStats};

/// Default ceiling on pending entries.
pub const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum pending entries admitted by a normal enqueue.
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// What an enqueue did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Queued,
    /// Already pending, in flight, or added.
    Duplicate,
    /// Pending is at capacity; the identifier was dropped.
    Full,
}

impl Admission {
    pub fn as_str(self) -> &'static str {
        match self {
            Admission::Queued => "queued",
            Admission::Duplicate => "duplicate",
            Admission::Full => "full",
        }
    }
}

#[derive(Debug)]
pub struct WorkQueue {
    /// Drained from the tail (newest first).
    pending: Vec<Did>,
    /// Occurrence counts for `pending`; forced enqueues may repeat an entry.
    pending_index: HashMap<Did, usize>,
    in_flight: HashSet<Did>,
    /// Insertion order is kept for the snapshot file.
    added: Vec<Did>,
    added_index: HashSet<Did>,
    capacity: usize,
    ready: bool,
}

impl WorkQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            pending: Vec::new(),
            pending_index: HashMap::new(),
            in_flight: HashSet::new(),
            added: Vec::new(),
            added_index: HashSet::new(),
            capacity: config.capacity,
            ready: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Latch readiness. Pending entries that the baseline already covers are
    /// dropped so every identifier sits in exactly one set.
    pub fn mark_ready(&mut self) {
        let before = self.pending.len();
        let added = &self.added_index;
        self.pending.retain(|did| !added.contains(did));
        let dropped = before - self.pending.len();
        if dropped > 0 {
            self.rebuild_pending_index();
            info!(dropped, "dropped pending entries already on the list");
        }
        self.ready = true;
    }

    /// Admit an identifier for submission.
    ///
    /// With `force` set the dedup and capacity checks are skipped and the
    /// identifier is appended unconditionally.
    pub fn enqueue(&mut self, did: Did, force: bool) -> Result<Admission> {
        if !self.ready {
            return Err(Error::NotReady);
        }
        if !force {
            if self.contains(&did) {
                return Ok(Admission::Duplicate);
            }
            if self.pending.len() >= self.capacity {
                debug!(%did, capacity = self.capacity, "pending full, dropping");
                return Ok(Admission::Full);
            }
        }
        self.push_pending(did);
        Ok(Admission::Queued)
    }

    /// Move the newest pending identifier into flight.
    pub fn drain_one(&mut self) -> Option<Did> {
        let did = self.pending.pop()?;
        self.forget_pending(&did);
        self.in_flight.insert(did.clone());
        Some(did)
    }

    /// Settle an in-flight identifier.
    pub fn resolve_in_flight(&mut self, did: &Did, outcome: Outcome) {
        if !self.in_flight.remove(did) {
            warn!(%did, %outcome, "resolved an identifier that was not in flight");
        }
        match outcome {
            Outcome::Success => {
                self.push_added(did.clone());
            }
            Outcome::Retryable => {
                self.push_pending(did.clone());
            }
            Outcome::Fatal => {
                warn!(%did, "remote rejected identifier permanently, dropping");
            }
        }
    }

    /// Load a pending snapshot. Duplicates and overflow are skipped.
    pub fn restore_pending(&mut self, ids: impl IntoIterator<Item = Did>) -> usize {
        let mut restored = 0;
        let mut skipped = 0;
        for did in ids {
            if self.contains(&did) || self.pending.len() >= self.capacity {
                skipped += 1;
                continue;
            }
            self.push_pending(did);
            restored += 1;
        }
        if skipped > 0 {
            warn!(skipped, "skipped duplicate or overflowing pending entries");
        }
        restored
    }

    /// Load the added baseline. Duplicates are skipped.
    pub fn restore_added(&mut self, ids: impl IntoIterator<Item = Did>) -> usize {
        ids.into_iter()
            .filter(|did| self.push_added(did.clone()))
            .count()
    }

    pub fn contains(&self, did: &Did) -> bool {
        self.added_index.contains(did)
            || self.pending_index.contains_key(did)
            || self.in_flight.contains(did)
    }

    pub fn is_pending(&self, did: &Did) -> bool {
        self.pending_index.contains_key(did)
    }

    pub fn is_in_flight(&self, did: &Did) -> bool {
        self.in_flight.contains(did)
    }

    pub fn is_added(&self, did: &Did) -> bool {
        self.added_index.contains(did)
    }

    pub fn pending(&self) -> &[Did] {
        &self.pending
    }

    pub fn added(&self) -> &[Did] {
        &self.added
    }

    pub fn in_flight(&self) -> impl Iterator<Item = &Did> {
        self.in_flight.iter()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            added: self.added.len(),
            pending: self.pending.len(),
            in_flight: self.in_flight.len(),
        }
    }

    fn push_pending(&mut self, did: Did) {
        *self.pending_index.entry(did.clone()).or_insert(0) += 1;
        self.pending.push(did);
    }

    fn forget_pending(&mut self, did: &Did) {
        if let Some(count) = self.pending_index.get_mut(did) {
            *count -= 1;
            if *count == 0 {
                self.pending_index.remove(did);
            }
        }
    }

    fn push_added(&mut self, did: Did) -> bool {
        if !self.added_index.insert(did.clone()) {
            return false;
        }
        self.added.push(did);
        true
    }

    fn rebuild_pending_index(&mut self) {
        self.pending_index.clear();
        for did in &self.pending {
            *self.pending_index.entry(did.clone()).or_insert(0) += 1;
        }
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}
