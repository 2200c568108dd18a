//! Process-wide scoreboard for repair and restart.
//!
//! Every site's transaction task queue in one process shares a single
//! [`Scoreboard`]. It has two jobs:
//!
//! 1. Remember, per site and transaction, the newest completion sequence
//!    admitted, so a slow resend of an already-superseded completion is
//!    rejected.
//! 2. Hold MP write completions and first fragments until every site has
//!    the same one, so no site runs a completion or a new incarnation that
//!    some other site never received.
//!
//! Released tasks are returned to the caller, which delivers them to their
//! site queues after the scoreboard lock is dropped.

use crate::{QueueError, TransactionTask};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use strata_types::{CompletionSequence, SiteIndex, TxnId};
use tracing::{debug, trace};

/// Result of handing a task to the scoreboard.
#[derive(Debug)]
pub enum Admission {
    /// Superseded completion; drop it.
    Stale,
    /// Waiting for other sites.
    Held,
    /// Ready to run. May include tasks of other sites released by this one.
    Released(Vec<Arc<TransactionTask>>),
}

#[derive(Debug, Default)]
struct SiteSlot {
    /// Pending completions, at most one per transaction id.
    completions: Vec<Arc<TransactionTask>>,
    /// Fragments of the transaction taking the site, held until every site
    /// has its first fragment.
    held: Vec<Arc<TransactionTask>>,
}

/// Shared repair/restart state for all sites of one process.
#[derive(Debug)]
pub struct Scoreboard {
    site_count: usize,
    sequences: DashMap<SiteIndex, BTreeMap<TxnId, CompletionSequence>>,
    slots: Mutex<BTreeMap<SiteIndex, SiteSlot>>,
}

impl Scoreboard {
    /// Create a scoreboard for a process hosting `site_count` sites.
    pub fn new(site_count: usize) -> Self {
        Self {
            site_count,
            sequences: DashMap::new(),
            slots: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn site_count(&self) -> usize {
        self.site_count
    }

    /// Register a site. Rendezvous waits on every registered site.
    pub fn initialize_site(&self, site: SiteIndex) -> Result<(), QueueError> {
        if site.0 >= self.site_count {
            return Err(QueueError::SiteIndexOutOfRange {
                index: site,
                site_count: self.site_count,
            });
        }
        self.slots.lock().entry(site).or_default();
        self.sequences.entry(site).or_default();
        debug!(site = site.0, "Scoreboard site initialized");
        Ok(())
    }

    /// Number of registered sites.
    pub fn registered_sites(&self) -> usize {
        self.slots.lock().len()
    }

    /// Clear every record and pending task. Registrations are kept.
    pub fn reset(&self) {
        for mut records in self.sequences.iter_mut() {
            records.clear();
        }
        for slot in self.slots.lock().values_mut() {
            slot.completions.clear();
            slot.held.clear();
        }
        debug!("Scoreboard reset");
    }

    /// Last completion sequence admitted for `txn_id` at `site`.
    pub fn recorded_sequence(&self, site: SiteIndex, txn_id: TxnId) -> Option<CompletionSequence> {
        self.sequences
            .get(&site)
            .and_then(|records| records.get(&txn_id).copied())
    }

    /// Record `sequence` for `txn_id` at `site` unless an equal or newer
    /// completion was already admitted. Returns false for stale sequences.
    pub fn check_and_record(
        &self,
        site: SiteIndex,
        txn_id: TxnId,
        sequence: CompletionSequence,
    ) -> bool {
        let mut records = self.sequences.entry(site).or_default();
        match records.get(&txn_id).copied() {
            Some(prior) if !sequence.supersedes(prior) => {
                debug!(
                    site = site.0,
                    txn_id = %txn_id,
                    sequence = %sequence,
                    recorded = %prior,
                    "Stale completion"
                );
                false
            }
            _ => {
                records.insert(txn_id, sequence);
                true
            }
        }
    }

    /// Admit a completion task for `site`.
    ///
    /// With `coordinate` false (read-only work) the completion is only
    /// checked for staleness. Otherwise it replaces any pending completion
    /// for the same transaction at this site and is released once every
    /// registered site holds a completion with the same sequence. A restart
    /// also drops this site's held fragments of the transaction.
    pub fn admit_completion(
        &self,
        site: SiteIndex,
        task: Arc<TransactionTask>,
        coordinate: bool,
    ) -> Admission {
        let txn_id = task.txn_id();
        let sequence = match task.completion_message() {
            Some(msg) => msg.sequence,
            None => return Admission::Released(vec![task]),
        };
        if !self.check_and_record(site, txn_id, sequence) {
            return Admission::Stale;
        }
        if !coordinate {
            return Admission::Released(vec![task]);
        }

        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(&site) else {
            return Admission::Released(vec![task]);
        };
        slot.completions.retain(|pending| pending.txn_id() != txn_id);
        if sequence.is_restart() {
            let before = slot.held.len();
            slot.held.retain(|held| held.txn_id() != txn_id);
            if slot.held.len() != before {
                debug!(
                    site = site.0,
                    txn_id = %txn_id,
                    dropped = before - slot.held.len(),
                    "Restart dropped held fragments"
                );
            }
        }
        slot.completions.push(task);

        let ready = slots.values().all(|slot| {
            slot.completions.iter().any(|pending| {
                pending.txn_id() == txn_id
                    && pending.completion_message().map(|m| m.sequence) == Some(sequence)
            })
        });
        if !ready {
            trace!(site = site.0, txn_id = %txn_id, sequence = %sequence, "Completion held");
            return Admission::Held;
        }

        let mut released = Vec::with_capacity(slots.len());
        for slot in slots.values_mut() {
            if let Some(pos) = slot.completions.iter().position(|p| p.txn_id() == txn_id) {
                released.push(slot.completions.remove(pos));
            }
        }
        debug!(
            txn_id = %txn_id,
            sequence = %sequence,
            sites = released.len(),
            "Completion rendezvous released"
        );
        Admission::Released(released)
    }

    /// Admit the first fragment of the transaction taking `site`.
    ///
    /// Released, together with any followers held behind it, once every
    /// registered site holds a first fragment for the same transaction.
    pub fn admit_first_fragment(&self, site: SiteIndex, task: Arc<TransactionTask>) -> Admission {
        let txn_id = task.txn_id();
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(&site) else {
            return Admission::Released(vec![task]);
        };
        slot.held.push(task);

        let ready = slots
            .values()
            .all(|slot| slot.held.iter().any(|held| held.txn_id() == txn_id));
        if !ready {
            trace!(site = site.0, txn_id = %txn_id, "First fragment held");
            return Admission::Held;
        }

        let mut released = Vec::new();
        for slot in slots.values_mut() {
            let (matching, rest): (Vec<_>, Vec<_>) = slot
                .held
                .drain(..)
                .partition(|held| held.txn_id() == txn_id);
            slot.held = rest;
            released.extend(matching);
        }
        debug!(txn_id = %txn_id, tasks = released.len(), "Fragment rendezvous released");
        Admission::Released(released)
    }

    /// Admit a later fragment of the transaction taking `site`.
    ///
    /// Held behind the first fragment while that is still waiting; otherwise
    /// released at once.
    pub fn admit_follower(&self, site: SiteIndex, task: Arc<TransactionTask>) -> Admission {
        let txn_id = task.txn_id();
        let mut slots = self.slots.lock();
        match slots.get_mut(&site) {
            Some(slot) if slot.held.iter().any(|held| held.txn_id() == txn_id) => {
                slot.held.push(task);
                Admission::Held
            }
            _ => Admission::Released(vec![task]),
        }
    }

    /// Start a new incarnation of `txn_id` at `site`.
    ///
    /// Forgets the recorded completion sequence so the new incarnation's own
    /// completion is admitted, and drops fragments of the old incarnation
    /// still held. Pending completions are kept: a restart still waiting for
    /// other sites must run before the new incarnation's fragments.
    pub fn begin_incarnation(&self, site: SiteIndex, txn_id: TxnId) {
        if let Some(mut records) = self.sequences.get_mut(&site) {
            records.remove(&txn_id);
        }
        if let Some(slot) = self.slots.lock().get_mut(&site) {
            slot.held.retain(|held| held.txn_id() != txn_id);
        }
        debug!(site = site.0, txn_id = %txn_id, "New transaction incarnation");
    }

    /// Forget a restart recorded for `txn_id` at `site`.
    ///
    /// A fragment that takes an idle site after a restart belongs to the
    /// new incarnation, whose own completion is judged afresh. Returns
    /// whether a restart record was dropped.
    pub fn forget_restart(&self, site: SiteIndex, txn_id: TxnId) -> bool {
        let Some(mut records) = self.sequences.get_mut(&site) else {
            return false;
        };
        if records.get(&txn_id).is_some_and(|seq| seq.is_restart()) {
            records.remove(&txn_id);
            true
        } else {
            false
        }
    }

    /// Drop completion records older than `txn_id` at `site`.
    ///
    /// Records of transactions with a completion still waiting for other
    /// sites are kept.
    pub fn prune_records(&self, site: SiteIndex, txn_id: TxnId) {
        let pending: BTreeSet<TxnId> = self
            .slots
            .lock()
            .get(&site)
            .map(|slot| slot.completions.iter().map(|p| p.txn_id()).collect())
            .unwrap_or_default();
        if let Some(mut records) = self.sequences.get_mut(&site) {
            let before = records.len();
            records.retain(|txn, _| *txn >= txn_id || pending.contains(txn));
            let pruned = before - records.len();
            if pruned > 0 {
                trace!(site = site.0, txn_id = %txn_id, pruned, "Completion records pruned");
            }
        }
    }

    /// Number of completion records kept for `site`.
    pub fn record_count(&self, site: SiteIndex) -> usize {
        self.sequences.get(&site).map_or(0, |records| records.len())
    }

    /// Prune state for transactions older than `txn_id` at `site`.
    ///
    /// The record for `txn_id` itself is kept so late resends are still
    /// rejected.
    pub fn resolve(&self, site: SiteIndex, txn_id: TxnId) {
        if let Some(mut records) = self.sequences.get_mut(&site) {
            records.retain(|txn, _| *txn >= txn_id);
        }
        if let Some(slot) = self.slots.lock().get_mut(&site) {
            slot.completions.retain(|pending| pending.txn_id() >= txn_id);
            slot.held.retain(|held| held.txn_id() >= txn_id);
        }
    }

    /// Completions waiting at `site`.
    pub fn pending_completions(&self, site: SiteIndex) -> usize {
        self.slots
            .lock()
            .get(&site)
            .map_or(0, |slot| slot.completions.len())
    }

    /// Fragments waiting at `site`.
    pub fn held_fragments(&self, site: SiteIndex) -> usize {
        self.slots.lock().get(&site).map_or(0, |slot| slot.held.len())
    }
}
