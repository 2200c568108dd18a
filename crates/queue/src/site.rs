//! Site task queue: the single-consumer work sink for one partition.

use crate::TransactionTask;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use strata_types::SiteId;
use tracing::trace;

/// Counters describing a site queue's traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SiteQueueStats {
    /// Tasks offered since creation.
    pub offered: u64,
    /// Highest depth observed.
    pub max_depth: usize,
}

/// FIFO of runnable tasks drained by the site's execution thread.
///
/// Producers are the transaction task queues of this and other sites
/// (scoreboard releases deliver across sites); the only consumer is the
/// site's own thread.
#[derive(Debug)]
pub struct SiteTaskQueue {
    site_id: SiteId,
    inner: Mutex<SiteQueueInner>,
    available: Condvar,
}

#[derive(Debug, Default)]
struct SiteQueueInner {
    tasks: VecDeque<Arc<TransactionTask>>,
    stats: SiteQueueStats,
}

impl SiteTaskQueue {
    /// Create an empty queue for `site_id`.
    pub fn new(site_id: SiteId) -> Self {
        Self {
            site_id,
            inner: Mutex::new(SiteQueueInner::default()),
            available: Condvar::new(),
        }
    }

    pub fn site_id(&self) -> SiteId {
        self.site_id
    }

    /// Append a runnable task and wake the consumer.
    pub fn offer(&self, task: Arc<TransactionTask>) {
        let mut inner = self.inner.lock();
        trace!(
            site = self.site_id.0,
            txn_id = %task.txn_id(),
            kind = ?task.kind(),
            "Task runnable"
        );
        inner.tasks.push_back(task);
        inner.stats.offered += 1;
        inner.stats.max_depth = inner.stats.max_depth.max(inner.tasks.len());
        drop(inner);
        self.available.notify_one();
    }

    /// Remove the next task without waiting.
    pub fn poll(&self) -> Option<Arc<TransactionTask>> {
        self.inner.lock().tasks.pop_front()
    }

    /// Remove the next task, waiting until one is available.
    pub fn take(&self) -> Arc<TransactionTask> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(task) = inner.tasks.pop_front() {
                return task;
            }
            self.available.wait(&mut inner);
        }
    }

    /// Remove the next task, waiting at most `timeout`.
    pub fn take_timeout(&self, timeout: Duration) -> Option<Arc<TransactionTask>> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if let Some(task) = inner.tasks.pop_front() {
                return Some(task);
            }
            if self.available.wait_until(&mut inner, deadline).timed_out() {
                return inner.tasks.pop_front();
            }
        }
    }

    /// Remove every queued task in order.
    pub fn drain(&self) -> Vec<Arc<TransactionTask>> {
        self.inner.lock().tasks.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().tasks.is_empty()
    }

    pub fn stats(&self) -> SiteQueueStats {
        self.inner.lock().stats
    }
}
