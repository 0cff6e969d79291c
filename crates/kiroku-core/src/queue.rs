//! Pending sync requests, coalesced per (user, item) and drained one at a time.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::models::{SyncKey, SyncOutcome, SyncRequest};
use crate::throttle::Throttle;

/// Processes one dequeued request. Failures are reported as outcomes, never
/// propagated, so one bad item cannot stop the drain.
pub trait SyncHandler: Send + Sync {
    fn process(&self, request: &SyncRequest) -> impl Future<Output = Vec<SyncOutcome>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Appended at the back of the queue.
    Queued,
    /// An entry for the same key was pending and now carries the new request.
    Replaced,
}

/// Summary of one drain invocation.
#[derive(Debug, Default)]
pub struct DrainReport {
    pub processed: usize,
    pub outcomes: Vec<SyncOutcome>,
    /// The drain stopped early; remaining entries stay queued.
    pub cancelled: bool,
}

#[derive(Debug, Default)]
pub struct SyncQueue {
    pending: Mutex<VecDeque<SyncRequest>>,
}

impl SyncQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a request, replacing a pending one for the same key in place.
    pub fn enqueue(&self, request: SyncRequest) -> Enqueued {
        let mut pending = self.lock();
        if let Some(slot) = pending.iter_mut().find(|r| r.same_key(&request)) {
            debug!(user = %request.user_id, item = %request.item_id, "replacing pending sync");
            *slot = request;
            return Enqueued::Replaced;
        }
        pending.push_back(request);
        Enqueued::Queued
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Keys of the pending entries, oldest first.
    pub fn pending(&self) -> Vec<SyncKey> {
        self.lock().iter().map(SyncRequest::key).collect()
    }

    /// Process entries until the queue is empty or `cancel` fires.
    ///
    /// Entries enqueued while the drain runs are picked up before it returns.
    pub async fn drain<H: SyncHandler>(
        &self,
        handler: &H,
        throttle: &Throttle,
        cancel: &CancellationToken,
    ) -> DrainReport {
        let mut report = DrainReport::default();

        loop {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let Some(request) = self.pop() else {
                break;
            };

            if throttle.acquire(cancel).await.is_err() {
                self.requeue(request);
                report.cancelled = true;
                break;
            }

            debug!(user = %request.user_id, item = %request.item_id, "processing sync");
            let outcomes = handler.process(&request).await;
            report.processed += 1;
            report.outcomes.extend(outcomes);
        }

        info!(
            processed = report.processed,
            remaining = self.len(),
            cancelled = report.cancelled,
            "sync drain finished"
        );
        report
    }

    fn pop(&self) -> Option<SyncRequest> {
        self.lock().pop_front()
    }

    /// Put an unprocessed request back at the front, unless a newer one for
    /// the same key arrived meanwhile.
    fn requeue(&self, request: SyncRequest) {
        let mut pending = self.lock();
        if !pending.iter().any(|r| r.same_key(&request)) {
            pending.push_front(request);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<SyncRequest>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}
