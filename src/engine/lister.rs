//! The lister: queue, rate limiter, snapshots and remote client behind one
//! cloneable handle.
//!
//! Every state transition goes through here. Locks are never held across
//! an await, so a submission in progress does not block enqueues from the
//! stream.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use opentelemetry::KeyValue;
use tracing::{Instrument, debug, info, warn};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::model::{Did, Outcome, QueueStats, RateLimitHeaders};
use crate::queue::{Admission, QueueConfig, WorkQueue};
use crate::rate_limit::RateLimiter;
use crate::remote::{ListClient, SubmitErrorKind};
use crate::storage::SnapshotStore;
use crate::telemetry::metrics;
use crate::telemetry::submit::{record_outcome, start_submit_span};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What one drain pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub submitted: usize,
    pub retried: usize,
    pub dropped: usize,
    /// The pass ended because the service reported the quota spent.
    pub quota_exhausted: bool,
}

impl DrainReport {
    pub fn attempts(&self) -> usize {
        self.submitted + self.retried + self.dropped
    }
}

pub struct Lister {
    queue: Arc<Mutex<WorkQueue>>,
    limiter: Arc<Mutex<RateLimiter>>,
    store: Arc<SnapshotStore>,
    client: Arc<dyn ListClient>,
    clock: Arc<dyn Clock>,
    list: Arc<str>,
}

impl Clone for Lister {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            limiter: Arc::clone(&self.limiter),
            store: Arc::clone(&self.store),
            client: Arc::clone(&self.client),
            clock: Arc::clone(&self.clock),
            list: Arc::clone(&self.list),
        }
    }
}

impl Lister {
    pub fn new(
        client: Arc<dyn ListClient>,
        store: SnapshotStore,
        clock: Arc<dyn Clock>,
        list: &str,
        queue_config: QueueConfig,
    ) -> Self {
        let limiter = RateLimiter::new(clock.epoch_seconds());
        Self {
            queue: Arc::new(Mutex::new(WorkQueue::new(queue_config))),
            limiter: Arc::new(Mutex::new(limiter)),
            store: Arc::new(store),
            client,
            clock,
            list: Arc::from(list),
        }
    }

    // -----------------------------------------------------------------------
    // Queue access
    // -----------------------------------------------------------------------

    /// Offer an identifier for submission. Never blocks on I/O.
    pub fn enqueue(&self, did: Did) -> Result<Admission> {
        self.admit(did, false)
    }

    /// Append an identifier even if it is already known or pending is full.
    pub fn enqueue_forced(&self, did: Did) -> Result<Admission> {
        self.admit(did, true)
    }

    fn admit(&self, did: Did, force: bool) -> Result<Admission> {
        let result = lock(&self.queue).enqueue(did, force);
        let label = match &result {
            Ok(admission) => admission.as_str(),
            Err(_) => "not_ready",
        };
        metrics::enqueued().add(1, &[KeyValue::new("result", label)]);
        result
    }

    pub fn is_ready(&self) -> bool {
        lock(&self.queue).is_ready()
    }

    pub fn is_allowed(&self) -> bool {
        lock(&self.limiter).is_allowed(self.clock.epoch_seconds())
    }

    /// Ready and not currently rate limited.
    pub fn is_accepting(&self) -> bool {
        self.is_ready() && self.is_allowed()
    }

    pub fn stats(&self) -> QueueStats {
        lock(&self.queue).stats()
    }

    pub fn rate_limit(&self) -> RateLimiter {
        *lock(&self.limiter)
    }

    pub fn pending_ids(&self) -> Vec<Did> {
        lock(&self.queue).pending().to_vec()
    }

    pub fn added_ids(&self) -> Vec<Did> {
        lock(&self.queue).added().to_vec()
    }

    pub fn contains(&self, did: &Did) -> bool {
        lock(&self.queue).contains(did)
    }

    fn observe(&self, headers: &RateLimitHeaders) {
        if let Err(e) = lock(&self.limiter).observe_headers(headers) {
            debug!("ignoring rate limit headers: {e}");
        }
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Submit pending identifiers one at a time until the queue is empty or
    /// the rate limiter says stop.
    ///
    /// Retryable failures stay in flight until the pass ends and are then
    /// returned to pending, so each identifier is attempted at most once per
    /// pass and a failing head cannot spin the loop.
    pub async fn drain(&self) -> DrainReport {
        let mut report = DrainReport::default();
        let mut retry = Vec::new();

        loop {
            let did = {
                if !lock(&self.limiter).is_allowed(self.clock.epoch_seconds()) {
                    break;
                }
                let mut queue = lock(&self.queue);
                if !queue.is_ready() {
                    break;
                }
                match queue.drain_one() {
                    Some(did) => did,
                    None => break,
                }
            };

            let span = start_submit_span(&did);
            let started = Instant::now();
            let result = self
                .client
                .create_list_entry(&self.list, &did)
                .instrument(span.clone())
                .await;
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

            match result {
                Ok(created) => {
                    if let Some(headers) = &created.rate_limit {
                        self.observe(headers);
                    }
                    metrics::record_submission("success", None, elapsed_ms);
                    record_outcome(&span, Outcome::Success);
                    lock(&self.queue).resolve_in_flight(&did, Outcome::Success);
                    report.submitted += 1;
                }
                Err(err) => {
                    if let Some(headers) = &err.rate_limit {
                        self.observe(headers);
                    }
                    metrics::record_submission(err.kind.as_str(), err.status, elapsed_ms);
                    match err.kind {
                        SubmitErrorKind::QuotaExceeded => {
                            record_outcome(&span, Outcome::Retryable);
                            retry.push(did);
                            report.retried += 1;
                            report.quota_exhausted = true;
                            lock(&self.limiter).exhaust(self.clock.epoch_seconds());
                            break;
                        }
                        SubmitErrorKind::Transient => {
                            warn!(%did, "submission failed, will retry: {err}");
                            record_outcome(&span, Outcome::Retryable);
                            retry.push(did);
                            report.retried += 1;
                        }
                        SubmitErrorKind::Permanent => {
                            warn!(%did, "submission rejected: {err}");
                            record_outcome(&span, Outcome::Fatal);
                            lock(&self.queue).resolve_in_flight(&did, Outcome::Fatal);
                            report.dropped += 1;
                        }
                    }
                }
            }
        }

        if !retry.is_empty() {
            let mut queue = lock(&self.queue);
            for did in &retry {
                queue.resolve_in_flight(did, Outcome::Retryable);
            }
        }

        if report.attempts() > 0 {
            info!(
                submitted = report.submitted,
                retried = report.retried,
                dropped = report.dropped,
                quota_exhausted = report.quota_exhausted,
                "drain pass finished"
            );
        }
        report
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Write both snapshots. Does nothing before bootstrap completes.
    ///
    /// Identifiers still in flight are written to the pending snapshot so a
    /// crash mid-submission retries them instead of losing them.
    pub async fn save(&self) -> Result<bool> {
        let (pending, added) = {
            let queue = lock(&self.queue);
            if !queue.is_ready() {
                return Ok(false);
            }
            // In-flight entries go first so the LIFO drain still favours
            // what was queued most recently.
            let mut pending: Vec<Did> = queue.in_flight().cloned().collect();
            pending.sort();
            pending.extend(queue.pending().iter().cloned());
            (pending, queue.added().to_vec())
        };

        let pending_result = self.store.pending.save(&pending).await;
        record_save("pending", &pending_result);
        let added_result = self.store.added.save(&added).await;
        record_save("added", &added_result);
        pending_result?;
        added_result?;

        info!(pending = pending.len(), added = added.len(), "saved");
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Bootstrap
    // -----------------------------------------------------------------------

    /// Authenticate, restore snapshots (or fetch the list), latch readiness
    /// and run one drain pass.
    pub async fn bootstrap(&self) -> Result<DrainReport> {
        self.restore().await?;
        Ok(self.drain().await)
    }

    /// Everything [`bootstrap`](Self::bootstrap) does except the drain pass.
    pub async fn restore(&self) -> Result<QueueStats> {
        self.client.authenticate().await?;

        if let Some(pending) = self.store.pending.load().await? {
            let restored = lock(&self.queue).restore_pending(pending);
            info!(restored, path = %self.store.pending.path().display(), "pending snapshot loaded");
        }

        let added = match self.store.added.load().await? {
            Some(added) => added,
            None => {
                info!(list = %self.list, "no added snapshot, loading list membership");
                self.fetch_membership().await?
            }
        };

        let stats = {
            let mut queue = lock(&self.queue);
            queue.restore_added(added);
            queue.mark_ready();
            queue.stats()
        };
        info!(%stats, "loaded list");
        Ok(stats)
    }

    async fn fetch_membership(&self) -> Result<Vec<Did>> {
        let mut members = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .client
                .fetch_list_membership(&self.list, cursor.as_deref())
                .await?;
            let empty = page.items.is_empty();
            members.extend(page.items);
            debug!(fetched = members.len(), "list page loaded");

            match page.cursor {
                Some(next) if !empty => {
                    if cursor.as_deref() == Some(next.as_str()) {
                        return Err(Error::Other(format!("list paging stuck on cursor {next}")));
                    }
                    cursor = Some(next);
                }
                _ => break,
            }
        }
        Ok(members)
    }
}

fn record_save(file: &'static str, result: &Result<()>) {
    let outcome = if result.is_ok() { "ok" } else { "error" };
    metrics::snapshot_saves().add(
        1,
        &[KeyValue::new("file", file), KeyValue::new("result", outcome)],
    );
}
