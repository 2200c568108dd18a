//! Per-site transaction task queue.
//!
//! The backlog's head is the first fragment of the MP transaction that
//! currently holds the site. Every task behind the head is parked until
//! the head's transaction is done and [`TransactionTaskQueue::flush`] is
//! called for it.

use crate::{Admission, QueueError, Scoreboard, SiteTaskQueue, TaskKind, TaskQueueConfig, TransactionTask};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use strata_types::{SiteIndex, TxnId};
use tracing::{debug, trace, warn};

/// What `offer` did with a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Handed to the site task queue.
    Dispatched,
    /// Parked in the backlog behind the active transaction.
    Parked,
    /// Waiting in the scoreboard for the other sites.
    Held,
    /// Stale completion, dropped.
    Discarded,
}

/// Where a transaction stands at this site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnPhase {
    /// No task of the transaction is known here.
    Unseen,
    /// Tasks wait in the backlog.
    Parked,
    /// The transaction holds the site.
    Active,
    /// Completed and flushed, or marked done and awaiting flush.
    ///
    /// MP ids are ordered globally, so once a site has resolved an id every
    /// lower id is reported `Done` too, including ids this site never saw:
    /// none of them can take the site any more.
    Done,
}

#[derive(Debug, Default)]
struct QueueInner {
    backlog: VecDeque<Arc<TransactionTask>>,
    site_index: Option<SiteIndex>,
    last_resolved: Option<TxnId>,
}

/// Ordering gatekeeper in front of one site's [`SiteTaskQueue`].
///
/// Safe for concurrent producers: the backlog and blocking slot are guarded
/// by one mutex. Lock order is queue, then scoreboard, then site queue.
#[derive(Debug)]
pub struct TransactionTaskQueue {
    site_queue: Arc<SiteTaskQueue>,
    scoreboard: Arc<Scoreboard>,
    config: TaskQueueConfig,
    inner: Mutex<QueueInner>,
}

impl TransactionTaskQueue {
    pub fn new(
        site_queue: Arc<SiteTaskQueue>,
        scoreboard: Arc<Scoreboard>,
        config: TaskQueueConfig,
    ) -> Self {
        Self {
            site_queue,
            scoreboard,
            config,
            inner: Mutex::new(QueueInner::default()),
        }
    }

    pub fn site_queue(&self) -> &Arc<SiteTaskQueue> {
        &self.site_queue
    }

    pub fn scoreboard(&self) -> &Arc<Scoreboard> {
        &self.scoreboard
    }

    /// Register this site with the shared scoreboard.
    pub fn initialize_scoreboard(&self, site_index: SiteIndex) -> Result<(), QueueError> {
        self.scoreboard.initialize_site(site_index)?;
        self.inner.lock().site_index = Some(site_index);
        Ok(())
    }

    /// Clear the shared scoreboard for every site in the process.
    pub fn reset_scoreboards(&self) {
        self.scoreboard.reset();
    }

    /// Number of tasks in the backlog, the active head included.
    pub fn len(&self) -> usize {
        self.inner.lock().backlog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().backlog.is_empty()
    }

    /// MP transaction currently holding the site.
    pub fn active_txn(&self) -> Option<TxnId> {
        self.inner.lock().backlog.front().map(|head| head.txn_id())
    }

    /// Where `txn_id` stands at this site.
    ///
    /// Ids at or below the highest resolved id are `Done`, whether or not
    /// this site saw them. Restart completions do not resolve an id.
    pub fn status(&self, txn_id: TxnId) -> TxnPhase {
        let inner = self.inner.lock();
        if let Some(head) = inner.backlog.front() {
            if head.txn_id() == txn_id {
                return if head.state().is_done() {
                    TxnPhase::Done
                } else {
                    TxnPhase::Active
                };
            }
        }
        if inner
            .backlog
            .iter()
            .any(|task| task.is_multi_partition() && task.txn_id() == txn_id)
        {
            return TxnPhase::Parked;
        }
        match inner.last_resolved {
            Some(resolved) if txn_id <= resolved => TxnPhase::Done,
            _ => TxnPhase::Unseen,
        }
    }

    /// Accept a task in the order physically received.
    ///
    /// SP work runs unless an MP transaction holds the site. Tasks of the
    /// active transaction pass through; later MP transactions park. Work for
    /// an older MP transaction is a repair and passes through.
    pub fn offer(&self, task: Arc<TransactionTask>) -> Result<Disposition, QueueError> {
        task.validate()?;
        let mut inner = self.inner.lock();
        let site = self.coordinated_site(&inner);
        let txn_id = task.txn_id();

        let Some(head) = inner.backlog.front().cloned() else {
            return Ok(match task.kind() {
                TaskKind::SpProcedure => self.dispatch(task),
                TaskKind::Complete => {
                    let restart = task.completion_message().is_some_and(|m| m.is_restart());
                    let disposition = self.admit_completion(site, task);
                    if disposition != Disposition::Discarded {
                        self.retire(&mut inner, site, txn_id, restart);
                    }
                    disposition
                }
                TaskKind::Fragment => {
                    inner.backlog.push_back(task.clone());
                    self.admit_head(site, task)
                }
            });
        };

        if !task.is_multi_partition() {
            return Ok(self.park(&mut inner, task));
        }

        let head_txn = head.txn_id();
        if txn_id == head_txn {
            return Ok(match task.kind() {
                TaskKind::Complete => self.admit_completion(site, task),
                TaskKind::Fragment if !task.same_incarnation(&head) => {
                    debug!(txn_id = %txn_id, "Fragment of a new incarnation takes the site");
                    inner.backlog[0] = task.clone();
                    if let Some(site) = site {
                        self.scoreboard.begin_incarnation(site, txn_id);
                    }
                    self.admit_head(site, task)
                }
                _ => self.admit_follower(site, task),
            });
        }

        if task.state().is_read_only() || txn_id > head_txn {
            return Ok(self.park(&mut inner, task));
        }

        trace!(txn_id = %txn_id, active = %head_txn, "Work for an older transaction passes");
        Ok(match task.kind() {
            TaskKind::Complete => self.admit_completion(site, task),
            _ => self.dispatch(task),
        })
    }

    /// Release the backlog once `txn_id`, the active transaction, is done.
    ///
    /// Pops the head, then releases parked tasks in arrival order until the
    /// next MP fragment, which takes the site. Parked tasks of that next
    /// transaction are pulled forward with it. Returns the number of parked
    /// tasks released; stale completions dropped on the way count zero.
    pub fn flush(&self, txn_id: TxnId) -> usize {
        let mut inner = self.inner.lock();
        let head_done = inner
            .backlog
            .front()
            .is_some_and(|head| head.txn_id() == txn_id && head.state().is_done());
        if !head_done {
            return 0;
        }
        inner.backlog.pop_front();
        Self::note_resolved(&mut inner, txn_id);
        let site = self.coordinated_site(&inner);
        if let Some(site) = site {
            self.scoreboard.resolve(site, txn_id);
        }

        let mut released = 0;
        while let Some(task) = inner.backlog.pop_front() {
            match task.kind() {
                TaskKind::SpProcedure => {
                    self.dispatch(task);
                    released += 1;
                }
                TaskKind::Complete => {
                    if self.admit_completion(site, task) != Disposition::Discarded {
                        released += 1;
                    }
                }
                TaskKind::Fragment => {
                    let next_txn = task.txn_id();
                    inner.backlog.push_front(task.clone());
                    self.admit_head(site, task);
                    released += 1;
                    released += self.pull_forward(&mut inner, site, next_txn);
                    break;
                }
            }
        }

        debug!(
            txn_id = %txn_id,
            released,
            remaining = inner.backlog.len(),
            "Backlog flushed"
        );
        released
    }

    /// Pass through a completion for a transaction this site never saw.
    ///
    /// The transaction is marked done and the task dispatched with no
    /// backlog. Returns false if the completion was stale.
    pub fn handle_completion_for_missing_txn(
        &self,
        task: Arc<TransactionTask>,
    ) -> Result<bool, QueueError> {
        task.validate()?;
        if task.kind() != TaskKind::Complete {
            return Err(QueueError::NotACompletion {
                txn_id: task.txn_id(),
                kind: task.kind(),
            });
        }
        let txn_id = task.txn_id();
        let mut inner = self.inner.lock();
        if inner
            .backlog
            .iter()
            .any(|queued| queued.is_multi_partition() && queued.txn_id() == txn_id)
        {
            return Err(QueueError::TxnInBacklog(txn_id));
        }
        let site = self.coordinated_site(&inner);
        let restart = task.completion_message().is_some_and(|m| m.is_restart());
        if let (Some(site), Some(msg)) = (site, task.completion_message()) {
            if !self.scoreboard.check_and_record(site, txn_id, msg.sequence) {
                return Ok(false);
            }
        }
        self.retire(&mut inner, site, txn_id, restart);
        task.state().set_done();
        debug!(txn_id = %txn_id, "Completion for missing transaction");
        self.dispatch(task);
        Ok(true)
    }

    fn note_resolved(inner: &mut QueueInner, txn_id: TxnId) {
        inner.last_resolved = Some(inner.last_resolved.map_or(txn_id, |prev| prev.max(txn_id)));
    }

    /// Account for a completion of `txn_id` that never took the site.
    ///
    /// A restart leaves the transaction open for its next incarnation.
    fn retire(&self, inner: &mut QueueInner, site: Option<SiteIndex>, txn_id: TxnId, restart: bool) {
        if !restart {
            Self::note_resolved(inner, txn_id);
        }
        if let Some(site) = site {
            self.scoreboard.prune_records(site, txn_id);
        }
    }

    fn coordinated_site(&self, inner: &QueueInner) -> Option<SiteIndex> {
        if self.config.scoreboard_enabled {
            inner.site_index
        } else {
            None
        }
    }

    fn park(&self, inner: &mut QueueInner, task: Arc<TransactionTask>) -> Disposition {
        if task.kind() == TaskKind::Fragment {
            let before = inner.backlog.len();
            let txn_id = task.txn_id();
            // The head is never the same id here, so it is never purged
            inner.backlog.retain(|queued| {
                !(queued.kind() == TaskKind::Fragment
                    && queued.txn_id() == txn_id
                    && !queued.same_incarnation(&task))
            });
            let purged = before - inner.backlog.len();
            if purged > 0 {
                debug!(txn_id = %txn_id, purged, "Purged fragments of an older incarnation");
            }
        }
        trace!(txn_id = %task.txn_id(), kind = ?task.kind(), "Task parked");
        inner.backlog.push_back(task);
        if inner.backlog.len() > self.config.backlog_warn_threshold {
            warn!(
                backlog = inner.backlog.len(),
                threshold = self.config.backlog_warn_threshold,
                "Transaction backlog over threshold"
            );
        }
        Disposition::Parked
    }

    fn pull_forward(
        &self,
        inner: &mut QueueInner,
        site: Option<SiteIndex>,
        txn_id: TxnId,
    ) -> usize {
        let mut released = 0;
        let mut idx = 1;
        while idx < inner.backlog.len() {
            let matches = inner.backlog[idx].is_multi_partition()
                && inner.backlog[idx].txn_id() == txn_id;
            if !matches {
                idx += 1;
                continue;
            }
            let Some(task) = inner.backlog.remove(idx) else {
                break;
            };
            let disposition = match task.kind() {
                TaskKind::Complete => self.admit_completion(site, task),
                _ => self.admit_follower(site, task),
            };
            if disposition != Disposition::Discarded {
                released += 1;
            }
        }
        released
    }

    fn dispatch(&self, task: Arc<TransactionTask>) -> Disposition {
        trace!(txn_id = %task.txn_id(), kind = ?task.kind(), "Task dispatched");
        self.site_queue.offer(task);
        Disposition::Dispatched
    }

    fn admit_head(&self, site: Option<SiteIndex>, task: Arc<TransactionTask>) -> Disposition {
        if let Some(site) = site {
            if self.scoreboard.forget_restart(site, task.txn_id()) {
                debug!(txn_id = %task.txn_id(), "Fragment after restart starts a new incarnation");
            }
        }
        match site {
            Some(site) if !task.state().is_read_only() => {
                let admission = self.scoreboard.admit_first_fragment(site, task.clone());
                self.settle(&task, admission)
            }
            _ => self.dispatch(task),
        }
    }

    fn admit_follower(&self, site: Option<SiteIndex>, task: Arc<TransactionTask>) -> Disposition {
        match site {
            Some(site) if !task.state().is_read_only() => {
                let admission = self.scoreboard.admit_follower(site, task.clone());
                self.settle(&task, admission)
            }
            _ => self.dispatch(task),
        }
    }

    fn admit_completion(&self, site: Option<SiteIndex>, task: Arc<TransactionTask>) -> Disposition {
        match site {
            Some(site) => {
                let coordinate = !task.state().is_read_only();
                let admission = self.scoreboard.admit_completion(site, task.clone(), coordinate);
                self.settle(&task, admission)
            }
            None => self.dispatch(task),
        }
    }

    /// Deliver released tasks to their site queues.
    fn settle(&self, task: &Arc<TransactionTask>, admission: Admission) -> Disposition {
        match admission {
            Admission::Stale => {
                debug!(txn_id = %task.txn_id(), "Stale completion discarded");
                Disposition::Discarded
            }
            Admission::Held => {
                trace!(txn_id = %task.txn_id(), kind = ?task.kind(), "Task held in scoreboard");
                Disposition::Held
            }
            Admission::Released(tasks) => {
                let mut own = false;
                for released in tasks {
                    own |= Arc::ptr_eq(&released, task);
                    match released.site_queue().upgrade() {
                        Some(site_queue) => site_queue.offer(released),
                        None => warn!(
                            txn_id = %released.txn_id(),
                            "Released task for a site queue that no longer exists"
                        ),
                    }
                }
                if own {
                    Disposition::Dispatched
                } else {
                    Disposition::Held
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::TransactionState;
    use strata_messages::{CompleteTransactionMessage, FragmentTaskMessage, InitiateTaskMessage};
    use strata_types::{BatchId, CompletionSequence, RestartSequenceGenerator, SiteId, SpHandle};
    use tracing_test::traced_test;

    struct Harness {
        site: Arc<SiteTaskQueue>,
        queue: TransactionTaskQueue,
        next_handle: u64,
    }

    impl Harness {
        fn new(config: TaskQueueConfig) -> Self {
            let site = Arc::new(SiteTaskQueue::new(SiteId(1337)));
            let queue = TransactionTaskQueue::new(site.clone(), Arc::new(Scoreboard::new(2)), config);
            Self {
                site,
                queue,
                next_handle: 0,
            }
        }

        /// Sole site of its own scoreboard, so stale completions are caught.
        fn registered() -> Self {
            let site = Arc::new(SiteTaskQueue::new(SiteId(1337)));
            let queue = TransactionTaskQueue::new(
                site.clone(),
                Arc::new(Scoreboard::new(1)),
                TaskQueueConfig::default(),
            );
            queue.initialize_scoreboard(SiteIndex(0)).unwrap();
            Self {
                site,
                queue,
                next_handle: 0,
            }
        }

        fn handle(&mut self) -> SpHandle {
            let handle = SpHandle(self.next_handle);
            self.next_handle += 1;
            handle
        }

        fn sp(&mut self) -> Arc<TransactionTask> {
            let handle = self.handle();
            let state = Arc::new(TransactionState::single_partition(handle, false));
            Arc::new(TransactionTask::sp_procedure(
                &self.queue,
                state,
                InitiateTaskMessage::new(handle, "TestProc", false),
            ))
        }

        fn first_frag(&mut self, txn: u64) -> Arc<TransactionTask> {
            let handle = self.handle();
            let msg = FragmentTaskMessage::new(TxnId(txn), SiteId(0), BatchId(0), false);
            let state = Arc::new(TransactionState::participant(handle, &msg));
            Arc::new(TransactionTask::fragment(&self.queue, state, msg))
        }

        fn next_frag(&self, state: &Arc<TransactionState>) -> Arc<TransactionTask> {
            let msg = FragmentTaskMessage::new(state.txn_id(), SiteId(0), BatchId(1), false);
            Arc::new(TransactionTask::fragment(&self.queue, state.clone(), msg))
        }

        fn complete(&self, state: &Arc<TransactionState>) -> Arc<TransactionTask> {
            let msg = CompleteTransactionMessage::new(state.txn_id(), false);
            Arc::new(TransactionTask::completion(&self.queue, state.clone(), msg))
        }

        fn complete_with(
            &self,
            state: &Arc<TransactionState>,
            sequence: CompletionSequence,
        ) -> Arc<TransactionTask> {
            let msg = CompleteTransactionMessage::with_sequence(state.txn_id(), sequence, false);
            Arc::new(TransactionTask::completion(&self.queue, state.clone(), msg))
        }

        fn add(&self, task: &Arc<TransactionTask>) -> Disposition {
            let disposition = self.queue.offer(task.clone()).unwrap();
            self.queue.flush(task.txn_id());
            disposition
        }
    }

    fn handles(tasks: &[Arc<TransactionTask>]) -> Vec<(SpHandle, TxnId)> {
        tasks.iter().map(|t| (t.sp_handle(), t.txn_id())).collect()
    }

    #[test]
    fn test_sp_tasks_pass_straight_through() {
        let mut h = Harness::new(TaskQueueConfig::default());
        let tasks: Vec<_> = (0..3).map(|_| h.sp()).collect();
        for task in &tasks {
            assert_eq!(h.add(task), Disposition::Dispatched);
        }
        assert_eq!(h.queue.len(), 0);
        assert_eq!(handles(&h.site.drain()), handles(&tasks));
    }

    #[test]
    fn test_basic_participant_ops() {
        let mut h = Harness::new(TaskQueueConfig::default());
        let mut expected = Vec::new();

        // A few SP procs squirt through
        for _ in 0..3 {
            let task = h.sp();
            h.add(&task);
            expected.push(task);
        }
        assert_eq!(h.queue.len(), 0);

        // A fragment blocks the site
        let block = h.first_frag(0);
        h.add(&block);
        expected.push(block.clone());
        assert_eq!(h.queue.len(), 1);
        assert_eq!(h.queue.active_txn(), Some(TxnId(0)));

        // Tasks that will be blocked
        let mut blocked = Vec::new();
        for _ in 0..2 {
            let task = h.sp();
            assert_eq!(h.add(&task), Disposition::Parked);
            blocked.push(task);
        }

        // The next blocker, plus its completion arriving early
        let next = h.first_frag(1);
        assert_eq!(h.add(&next), Disposition::Parked);
        blocked.push(next.clone());
        assert_eq!(h.queue.len(), blocked.len() + 1);
        let next_done = h.complete(next.state());
        assert_eq!(h.add(&next_done), Disposition::Parked);
        blocked.push(next_done);
        assert_eq!(h.queue.len(), blocked.len() + 1);
        assert_eq!(h.queue.status(TxnId(1)), TxnPhase::Parked);

        // More work on the active transaction passes through
        let more = h.next_frag(block.state());
        assert_eq!(h.add(&more), Disposition::Dispatched);
        expected.push(more);
        assert_eq!(h.queue.len(), blocked.len() + 1);

        let done = h.complete(block.state());
        assert_eq!(h.add(&done), Disposition::Dispatched);
        expected.push(done);
        assert_eq!(h.queue.len(), blocked.len() + 1);

        // Done: everything up to and including the next blocker goes
        block.state().set_done();
        assert_eq!(h.queue.status(TxnId(0)), TxnPhase::Done);
        let offered = h.queue.flush(block.txn_id());
        assert_eq!(offered, blocked.len());
        assert_eq!(h.queue.len(), 1);
        assert_eq!(h.queue.active_txn(), Some(TxnId(1)));
        assert_eq!(h.queue.status(TxnId(0)), TxnPhase::Done);

        expected.extend(blocked);
        assert_eq!(handles(&h.site.drain()), handles(&expected));
    }

    #[test]
    fn test_flush_ignores_unfinished_or_inactive_txn() {
        let mut h = Harness::new(TaskQueueConfig::default());
        let block = h.first_frag(5);
        h.add(&block);
        let parked = h.sp();
        h.add(&parked);

        assert_eq!(h.queue.flush(TxnId(5)), 0);
        block.state().set_done();
        assert_eq!(h.queue.flush(TxnId(6)), 0);
        assert_eq!(h.queue.flush(TxnId(5)), 1);
        // A second flush has nothing left to release
        assert_eq!(h.queue.flush(TxnId(5)), 0);
        assert!(h.queue.is_empty());
    }

    #[test]
    fn test_completion_without_fragments_never_blocks() {
        let h = Harness::new(TaskQueueConfig::default());
        let state = Arc::new(TransactionState::multi_partition(TxnId(3), SpHandle(0), false));
        assert_eq!(h.add(&h.complete(&state)), Disposition::Dispatched);
        assert_eq!(h.queue.len(), 0);
        assert_eq!(h.site.len(), 1);
    }

    #[test]
    fn test_missing_txn_completion_dispatches_and_marks_done() {
        let h = Harness::new(TaskQueueConfig::default());
        let state = Arc::new(TransactionState::multi_partition(TxnId(8), SpHandle(0), false));
        let task = h.complete(&state);
        assert!(h.queue.handle_completion_for_missing_txn(task).unwrap());
        assert!(state.is_done());
        assert_eq!(h.site.len(), 1);
        assert_eq!(h.queue.len(), 0);
    }

    #[test]
    fn test_missing_txn_completion_for_queued_txn_fails() {
        let mut h = Harness::new(TaskQueueConfig::default());
        let block = h.first_frag(8);
        h.add(&block);
        let result = h.queue.handle_completion_for_missing_txn(h.complete(block.state()));
        assert_eq!(result, Err(QueueError::TxnInBacklog(TxnId(8))));
    }

    #[test]
    fn test_missing_txn_path_requires_completion() {
        let mut h = Harness::new(TaskQueueConfig::default());
        let frag = h.first_frag(8);
        assert!(matches!(
            h.queue.handle_completion_for_missing_txn(frag),
            Err(QueueError::NotACompletion { .. })
        ));
    }

    #[test]
    fn test_restart_at_idle_site_admits_new_incarnation() {
        let mut h = Harness::registered();
        let restart = RestartSequenceGenerator::new(0, true).next();

        // This site never saw the first incarnation
        let old = Arc::new(TransactionState::multi_partition(TxnId(1), SpHandle(99), false));
        assert_eq!(h.add(&h.complete_with(&old, restart)), Disposition::Dispatched);

        let block = h.first_frag(1);
        assert_eq!(h.add(&block), Disposition::Dispatched);
        assert_eq!(h.queue.status(TxnId(1)), TxnPhase::Active);

        let done = h.complete(block.state());
        assert_eq!(h.add(&done), Disposition::Dispatched);
        block.state().set_done();
        h.queue.flush(TxnId(1));
        assert!(h.queue.is_empty());
        assert_eq!(h.site.len(), 3);
        assert_eq!(
            h.queue.scoreboard().recorded_sequence(SiteIndex(0), TxnId(1)),
            Some(CompletionSequence::INITIAL)
        );
    }

    #[test]
    fn test_idle_completions_prune_records() {
        let h = Harness::registered();
        for txn in 1..=5 {
            let state = Arc::new(TransactionState::multi_partition(TxnId(txn), SpHandle(0), false));
            assert_eq!(h.add(&h.complete(&state)), Disposition::Dispatched);
        }
        let state = Arc::new(TransactionState::multi_partition(TxnId(6), SpHandle(0), false));
        assert!(h
            .queue
            .handle_completion_for_missing_txn(h.complete(&state))
            .unwrap());

        let scoreboard = h.queue.scoreboard();
        assert_eq!(scoreboard.record_count(SiteIndex(0)), 1);
        assert!(scoreboard.recorded_sequence(SiteIndex(0), TxnId(6)).is_some());
        assert_eq!(h.queue.status(TxnId(6)), TxnPhase::Done);
    }

    #[test]
    fn test_older_txn_work_passes_active_barrier() {
        let mut h = Harness::new(TaskQueueConfig::default());
        let block = h.first_frag(10);
        h.add(&block);

        let repair_state =
            Arc::new(TransactionState::multi_partition(TxnId(4), SpHandle(99), false));
        assert_eq!(h.add(&h.complete(&repair_state)), Disposition::Dispatched);
        assert_eq!(h.queue.len(), 1);
    }

    #[test]
    fn test_newer_incarnation_purges_parked_fragments() {
        let mut h = Harness::new(TaskQueueConfig::default());
        let block = h.first_frag(1);
        h.add(&block);

        let stale = h.first_frag(2);
        h.add(&stale);
        let stale_follow = h.next_frag(stale.state());
        h.add(&stale_follow);
        assert_eq!(h.queue.len(), 3);

        let fresh = h.first_frag(2);
        assert_eq!(h.add(&fresh), Disposition::Parked);
        assert_eq!(h.queue.len(), 2);

        block.state().set_done();
        assert_eq!(h.queue.flush(TxnId(1)), 1);
        let released = h.site.drain();
        assert!(Arc::ptr_eq(released.last().unwrap(), &fresh));
    }

    #[test]
    fn test_mismatched_task_rejected() {
        let mut h = Harness::new(TaskQueueConfig::default());
        let handle = h.handle();
        let sp_state = Arc::new(TransactionState::single_partition(handle, false));
        let task = Arc::new(TransactionTask::completion(
            &h.queue,
            sp_state,
            CompleteTransactionMessage::new(handle.as_txn_id(), false),
        ));
        assert!(matches!(
            h.queue.offer(task),
            Err(QueueError::KindMismatch { .. })
        ));
        assert!(h.site.is_empty());
    }

    #[test]
    fn test_status_transitions() {
        let mut h = Harness::new(TaskQueueConfig::default());
        assert_eq!(h.queue.status(TxnId(1)), TxnPhase::Unseen);
        let block = h.first_frag(1);
        h.add(&block);
        assert_eq!(h.queue.status(TxnId(1)), TxnPhase::Active);
        block.state().set_done();
        h.queue.flush(TxnId(1));
        assert_eq!(h.queue.status(TxnId(1)), TxnPhase::Done);
        assert_eq!(h.queue.status(TxnId(2)), TxnPhase::Unseen);
        // Lower ids can no longer take the site, seen here or not
        assert_eq!(h.queue.status(TxnId(0)), TxnPhase::Done);
    }

    #[traced_test]
    #[test]
    fn test_backlog_threshold_warns() {
        let mut h = Harness::new(TaskQueueConfig::default().with_backlog_warn_threshold(2));
        let block = h.first_frag(1);
        h.add(&block);
        for _ in 0..2 {
            let task = h.sp();
            h.add(&task);
        }
        assert!(logs_contain("Transaction backlog over threshold"));
    }

    #[test]
    fn test_disabled_scoreboard_dispatches_directly() {
        let config = TaskQueueConfig::default().with_scoreboard_enabled(false);
        let mut h = Harness::new(config);
        h.queue.initialize_scoreboard(SiteIndex(0)).unwrap();
        // Two registered sites would otherwise hold this fragment
        h.queue.scoreboard().initialize_site(SiteIndex(1)).unwrap();

        let block = h.first_frag(1);
        assert_eq!(h.add(&block), Disposition::Dispatched);
        assert_eq!(h.add(&h.complete(block.state())), Disposition::Dispatched);
    }
}
