//! Multi-site ordering scenarios: normal MP flow, repair, restart and
//! stale resends across sites sharing one scoreboard.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::thread;
use strata_core::TransactionState;
use strata_messages::{CompleteTransactionMessage, FragmentTaskMessage, InitiateTaskMessage};
use strata_queue::{
    Disposition, Scoreboard, SiteTaskQueue, TaskQueueConfig, TransactionTask,
    TransactionTaskQueue, TxnPhase,
};
use strata_types::{
    BatchId, CompletionSequence, RestartSequenceGenerator, SiteId, SiteIndex, SpHandle, TxnId,
};

const SITE_COUNT: usize = 3;

struct Cluster {
    sites: Vec<Arc<SiteTaskQueue>>,
    queues: Vec<TransactionTaskQueue>,
    expected: Vec<Vec<Arc<TransactionTask>>>,
    local_handles: Vec<u64>,
}

impl Cluster {
    fn new() -> Self {
        let scoreboard = Arc::new(Scoreboard::new(SITE_COUNT));
        let mut sites = Vec::new();
        let mut queues = Vec::new();
        for i in 0..SITE_COUNT {
            let site = Arc::new(SiteTaskQueue::new(SiteId(i as u64)));
            let queue =
                TransactionTaskQueue::new(site.clone(), scoreboard.clone(), TaskQueueConfig::default());
            queue.initialize_scoreboard(SiteIndex(i)).unwrap();
            sites.push(site);
            queues.push(queue);
        }
        Self {
            sites,
            queues,
            expected: vec![Vec::new(); SITE_COUNT],
            local_handles: vec![0; SITE_COUNT],
        }
    }

    fn handle(&mut self, site: usize) -> SpHandle {
        let handle = SpHandle(self.local_handles[site]);
        self.local_handles[site] += 1;
        handle
    }

    /// First fragment of an MP transaction: a fresh participant state.
    fn first_frag(&mut self, site: usize, txn: u64) -> Arc<TransactionTask> {
        let handle = self.handle(site);
        let msg = FragmentTaskMessage::new(TxnId(txn), SiteId(0), BatchId(0), false);
        let state = Arc::new(TransactionState::participant(handle, &msg));
        Arc::new(TransactionTask::fragment(&self.queues[site], state, msg))
    }

    /// Follow-on fragment bound to an existing state.
    fn frag(&self, site: usize, state: &Arc<TransactionState>) -> Arc<TransactionTask> {
        let msg = FragmentTaskMessage::new(state.txn_id(), SiteId(0), BatchId(1), false);
        Arc::new(TransactionTask::fragment(&self.queues[site], state.clone(), msg))
    }

    fn complete(
        &self,
        site: usize,
        state: &Arc<TransactionState>,
        sequence: CompletionSequence,
    ) -> Arc<TransactionTask> {
        let msg = CompleteTransactionMessage::with_sequence(state.txn_id(), sequence, false);
        Arc::new(TransactionTask::completion(&self.queues[site], state.clone(), msg))
    }

    fn sp(&mut self, site: usize) -> Arc<TransactionTask> {
        let handle = self.handle(site);
        let state = Arc::new(TransactionState::single_partition(handle, false));
        Arc::new(TransactionTask::sp_procedure(
            &self.queues[site],
            state,
            InitiateTaskMessage::new(handle, "TestProc", false),
        ))
    }

    /// Offer then flush, recording the task as expected at the site if asked.
    fn add(&mut self, site: usize, task: &Arc<TransactionTask>, expect: bool) -> Disposition {
        if expect {
            self.expected[site].push(task.clone());
        }
        let disposition = self.queues[site].offer(task.clone()).unwrap();
        self.queues[site].flush(task.txn_id());
        disposition
    }

    fn verify(&mut self) {
        for site in 0..SITE_COUNT {
            let expected = std::mem::take(&mut self.expected[site]);
            assert_eq!(
                expected.len(),
                self.sites[site].len(),
                "site {site} released a different number of tasks"
            );
            for want in expected {
                let got = self.sites[site].poll().unwrap();
                assert_eq!(got.sp_handle(), want.sp_handle(), "site {site}");
                assert_eq!(got.txn_id(), want.txn_id(), "site {site}");
                assert!(Arc::ptr_eq(&got, &want), "site {site} released another task");
            }
        }
    }
}

#[test]
fn test_basic_multi_fragment_mp() {
    let mut c = Cluster::new();
    let first: Vec<_> = (0..SITE_COUNT).map(|i| c.first_frag(i, 0)).collect();
    for i in 0..SITE_COUNT {
        c.add(i, &first[i], true);
    }
    for i in 0..SITE_COUNT {
        let next = c.frag(i, first[i].state());
        c.add(i, &next, true);
    }
    for i in 0..SITE_COUNT {
        let comp = c.complete(i, first[i].state(), CompletionSequence::INITIAL);
        c.add(i, &comp, true);
    }
    c.verify();
}

#[test]
fn test_first_fragment_waits_for_every_site() {
    let mut c = Cluster::new();
    let first: Vec<_> = (0..SITE_COUNT).map(|i| c.first_frag(i, 0)).collect();
    for i in 0..SITE_COUNT - 1 {
        assert_eq!(c.add(i, &first[i], true), Disposition::Held);
        assert!(c.sites[i].is_empty());
    }
    assert_eq!(c.add(SITE_COUNT - 1, &first[SITE_COUNT - 1], true), Disposition::Dispatched);
    c.verify();
}

#[test]
fn test_no_fragment_mp() {
    let mut c = Cluster::new();
    for i in 0..SITE_COUNT {
        let state = Arc::new(TransactionState::multi_partition(TxnId(0), SpHandle(0), false));
        let comp = c.complete(i, &state, CompletionSequence::INITIAL);
        c.add(i, &comp, true);
    }
    for queue in &c.queues {
        assert_eq!(queue.len(), 0);
    }
    c.verify();
}

// Coordinator fails mid-transaction: the previous transaction is repaired and
// the current one restarted.
#[test]
fn test_mp_repair() {
    let mut c = Cluster::new();
    let repair_gen = RestartSequenceGenerator::new(0, false);
    let restart_gen = RestartSequenceGenerator::new(0, true);

    let first: Vec<_> = (0..SITE_COUNT).map(|i| c.first_frag(i, 0)).collect();
    for i in 0..SITE_COUNT {
        c.add(i, &first[i], true);
    }

    // Not every site receives the completion
    for i in 0..SITE_COUNT - 1 {
        let comp = c.complete(i, first[i].state(), CompletionSequence::INITIAL);
        assert_eq!(c.add(i, &comp, false), Disposition::Held);
    }

    // The next transaction stays in the backlog
    let next: Vec<_> = (0..SITE_COUNT - 1).map(|i| c.first_frag(i, 1)).collect();
    for i in 0..SITE_COUNT - 1 {
        assert_eq!(c.add(i, &next[i], false), Disposition::Parked);
    }

    // Repair the previous transaction everywhere
    let repair = repair_gen.next();
    for i in 0..SITE_COUNT {
        let comp = c.complete(i, first[i].state(), repair);
        first[i].state().set_done();
        c.add(i, &comp, true);
    }

    // Restart the current one
    let restart = restart_gen.next();
    for i in 0..SITE_COUNT {
        let state = match next.get(i) {
            Some(task) => task.state().clone(),
            None => Arc::new(TransactionState::multi_partition(TxnId(1), SpHandle(99), false)),
        };
        let comp = c.complete(i, &state, restart);
        c.add(i, &comp, true);
    }

    // Re-run its fragments and complete it
    let restarted: Vec<_> = (0..SITE_COUNT).map(|i| c.first_frag(i, 1)).collect();
    for i in 0..SITE_COUNT {
        c.add(i, &restarted[i], true);
    }
    for i in 0..SITE_COUNT {
        let comp = c.complete(i, restarted[i].state(), CompletionSequence::INITIAL);
        c.add(i, &comp, true);
    }

    for queue in &c.queues {
        assert_eq!(queue.active_txn(), Some(TxnId(1)));
        assert_eq!(queue.len(), 1);
    }
    c.verify();
}

// A slow network delivers the original completion after the restart.
#[test]
fn test_stale_completion() {
    let mut c = Cluster::new();
    let restart_gen = RestartSequenceGenerator::new(0, true);

    let first: Vec<_> = (0..SITE_COUNT).map(|i| c.first_frag(i, 0)).collect();
    for i in 0..SITE_COUNT {
        c.add(i, &first[i], true);
    }

    for i in 0..SITE_COUNT - 1 {
        let comp = c.complete(i, first[i].state(), CompletionSequence::INITIAL);
        c.add(i, &comp, false);
    }

    let restart = restart_gen.next();
    for i in 0..SITE_COUNT {
        let comp = c.complete(i, first[i].state(), restart);
        first[i].state().set_done();
        c.add(i, &comp, true);
    }

    let last = SITE_COUNT - 1;
    let stale = c.complete(last, first[last].state(), CompletionSequence::INITIAL);
    assert_eq!(c.add(last, &stale, false), Disposition::Discarded);

    for queue in &c.queues {
        assert_eq!(queue.status(TxnId(0)), TxnPhase::Done);
        assert!(queue.is_empty());
    }
    c.verify();
}

// Every promotion interrupts repair, so the same transaction is restarted
// several times in a row.
#[test]
fn test_multiple_failures() {
    let mut c = Cluster::new();
    let restart_gen = RestartSequenceGenerator::new(0, true);

    let first: Vec<_> = (0..SITE_COUNT).map(|i| c.first_frag(i, 0)).collect();
    for i in 0..SITE_COUNT {
        c.add(i, &first[i], true);
    }
    for i in 0..SITE_COUNT {
        let comp = c.complete(i, first[i].state(), CompletionSequence::INITIAL);
        first[i].state().set_done();
        c.add(i, &comp, true);
    }

    let next: Vec<_> = (0..SITE_COUNT).map(|i| c.first_frag(i, 1)).collect();
    for i in 0..SITE_COUNT {
        c.add(i, &next[i], true);
    }

    for _round in 0..3 {
        let restart = restart_gen.next();
        for i in 0..SITE_COUNT {
            let comp = c.complete(i, next[i].state(), restart);
            c.add(i, &comp, true);
            let restarted = c.first_frag(i, 1);
            c.add(i, &restarted, true);
        }
        for i in 0..SITE_COUNT {
            // Already resolved, nothing to release
            assert_eq!(c.queues[i].flush(TxnId(0)), 0);
            assert_eq!(c.queues[i].len(), 1);
        }
    }

    // [f0, c0, f1] then [restart, new fragment] for each round
    for site in &c.expected {
        assert_eq!(site.len(), 3 + 2 * 3);
    }
    c.verify();
}

#[test]
fn test_restart_supersedes_repair() {
    let mut c = Cluster::new();
    let repair_gen = RestartSequenceGenerator::new(1, false);
    let restart_gen = RestartSequenceGenerator::new(0, true);
    for _ in 0..100 {
        repair_gen.next();
    }

    let first: Vec<_> = (0..SITE_COUNT).map(|i| c.first_frag(i, 0)).collect();
    for i in 0..SITE_COUNT {
        c.add(i, &first[i], true);
    }

    let repair = repair_gen.next();
    for i in 0..SITE_COUNT - 1 {
        let comp = c.complete(i, first[i].state(), repair);
        c.add(i, &comp, false);
    }

    let restart = restart_gen.next();
    assert!(restart.counter() < repair.counter());
    for i in 0..SITE_COUNT {
        let comp = c.complete(i, first[i].state(), restart);
        c.add(i, &comp, true);
    }

    // The repair reaching the last site late loses to the restart
    let last = SITE_COUNT - 1;
    let late = c.complete(last, first[last].state(), repair);
    assert_eq!(c.add(last, &late, false), Disposition::Discarded);
    assert!(!first[last].state().is_done());
    c.verify();
}

#[test]
fn test_missing_txn_completion() {
    let mut c = Cluster::new();
    let states: Vec<_> = (0..SITE_COUNT)
        .map(|_| Arc::new(TransactionState::multi_partition(TxnId(7), SpHandle(0), false)))
        .collect();
    for i in 0..SITE_COUNT {
        let comp = c.complete(i, &states[i], CompletionSequence::INITIAL);
        c.expected[i].push(comp.clone());
        assert!(c.queues[i].handle_completion_for_missing_txn(comp).unwrap());
        c.queues[i].flush(TxnId(7));
        assert!(states[i].is_done());
        assert_eq!(c.queues[i].len(), 0);
    }

    // A resend is stale
    let resend = c.complete(0, &states[0], CompletionSequence::INITIAL);
    assert!(!c.queues[0].handle_completion_for_missing_txn(resend).unwrap());
    c.verify();
}

#[test]
fn test_second_mp_waits_for_first() {
    let mut c = Cluster::new();
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    let first: Vec<_> = (0..SITE_COUNT).map(|i| c.first_frag(i, 0)).collect();
    for i in 0..SITE_COUNT {
        c.add(i, &first[i], true);
    }

    let mut parked = vec![Vec::new(); SITE_COUNT];
    for i in 0..SITE_COUNT {
        for _ in 0..rng.gen_range(1..6) {
            let sp = c.sp(i);
            assert_eq!(c.add(i, &sp, false), Disposition::Parked);
            parked[i].push(sp);
        }
        let second = c.first_frag(i, 1);
        assert_eq!(c.add(i, &second, false), Disposition::Parked);
        parked[i].push(second);
        for _ in 0..rng.gen_range(0..4) {
            let sp = c.sp(i);
            c.add(i, &sp, false);
        }
    }
    c.verify();

    for i in 0..SITE_COUNT {
        let comp = c.complete(i, first[i].state(), CompletionSequence::INITIAL);
        c.add(i, &comp, true);
    }
    c.verify();

    // Each site releases its SP work and the next blocker once done
    for i in 0..SITE_COUNT {
        first[i].state().set_done();
        let released = c.queues[i].flush(TxnId(0));
        assert_eq!(released, parked[i].len());
        assert_eq!(c.queues[i].active_txn(), Some(TxnId(1)));
    }
    for i in 0..SITE_COUNT {
        let drained = c.sites[i].drain();
        assert_eq!(drained.len(), parked[i].len());
        for (got, want) in drained.iter().zip(&parked[i]) {
            assert!(Arc::ptr_eq(got, want));
        }
    }
}

#[test]
fn test_sp_tasks_release_in_offer_order() {
    let mut c = Cluster::new();
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    for _ in 0..200 {
        let site = rng.gen_range(0..SITE_COUNT);
        let sp = c.sp(site);
        assert_eq!(c.add(site, &sp, true), Disposition::Dispatched);
    }
    c.verify();
}

#[test]
fn test_concurrent_sites_agree_on_order() {
    let c = Cluster::new();
    let Cluster { sites, queues, .. } = c;
    let queues: Vec<_> = queues.into_iter().map(Arc::new).collect();

    let workers: Vec<_> = queues
        .iter()
        .cloned()
        .map(|queue| {
            thread::spawn(move || {
                let msg = FragmentTaskMessage::new(TxnId(0), SiteId(0), BatchId(0), false);
                let state = Arc::new(TransactionState::participant(SpHandle(0), &msg));
                let frag = Arc::new(TransactionTask::fragment(&queue, state.clone(), msg));
                let comp = Arc::new(TransactionTask::completion(
                    &queue,
                    state,
                    CompleteTransactionMessage::new(TxnId(0), false),
                ));
                queue.offer(frag).unwrap();
                queue.offer(comp).unwrap();
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    for site in &sites {
        let kinds: Vec<_> = site.drain().iter().map(|t| t.kind()).collect();
        assert_eq!(
            kinds,
            vec![strata_queue::TaskKind::Fragment, strata_queue::TaskKind::Complete]
        );
    }
}
