//! Multi-partition transaction state machine.

use crate::{DependencyGraph, GraphOffer, MpConfig, MpError};
use std::collections::BTreeSet;
use std::sync::Arc;
use strata_core::{BatchPlan, ExecutionContext, OutboundMessage, Sender, TransactionState};
use strata_messages::{CompleteTransactionMessage, FragmentResponseMessage, FragmentTaskMessage};
use strata_types::{CompletionSequence, DependencyId, DependencyResults, SiteId, Table, TxnId};
use tracing::{debug, trace, warn};

/// Result of [`MpTransactionState::recursable_run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The procedure issued no further batch. Holds the results of the
    /// last batch, keyed by its resume dependencies.
    Complete(DependencyResults),
    /// Remote responses are still outstanding for these dependencies.
    /// Offer them and call `recursable_run` again.
    Deferred { waiting_on: Vec<DependencyId> },
}

impl RunOutcome {
    pub fn into_results(self) -> Option<DependencyResults> {
        match self {
            RunOutcome::Complete(results) => Some(results),
            RunOutcome::Deferred { .. } => None,
        }
    }
}

/// One pending batch on the explicit batch stack.
#[derive(Debug)]
struct BatchFrame {
    is_final: bool,
    deps_to_resume: Vec<DependencyId>,
    local: Option<FragmentTaskMessage>,
    remote: Option<FragmentTaskMessage>,
    /// The local site has run its share of the remote work.
    remote_ran_locally: bool,
}

/// Coordinator-side state for one MP transaction.
///
/// Driven by the procedure runner on the coordinator's site thread. For
/// each batch the runner calls [`setup_procedure_resume`], then
/// [`create_local_fragment_work`] and [`create_all_participating_fragment_work`],
/// feeds participant responses through [`offer_received_fragment_response`],
/// and finally [`recursable_run`].
///
/// The coordinator's own site is always a respondent: it runs the remote
/// work itself in addition to the participants.
///
/// [`setup_procedure_resume`]: Self::setup_procedure_resume
/// [`create_local_fragment_work`]: Self::create_local_fragment_work
/// [`create_all_participating_fragment_work`]: Self::create_all_participating_fragment_work
/// [`offer_received_fragment_response`]: Self::offer_received_fragment_response
/// [`recursable_run`]: Self::recursable_run
pub struct MpTransactionState {
    state: Arc<TransactionState>,
    local_site: SiteId,
    participants: Vec<SiteId>,
    sender: Arc<dyn Sender>,
    config: MpConfig,
    graph: DependencyGraph,
    frames: Vec<BatchFrame>,
    remote_failure: Option<(SiteId, String)>,
    restarts: u32,
}

impl std::fmt::Debug for MpTransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpTransactionState")
            .field("txn_id", &self.state.txn_id())
            .field("local_site", &self.local_site)
            .field("participants", &self.participants)
            .field("pending_batches", &self.frames.len())
            .field("restarts", &self.restarts)
            .finish()
    }
}

impl MpTransactionState {
    /// Create the coordinator state. Participants are `all_sites` minus
    /// `local_site`.
    pub fn new(
        state: Arc<TransactionState>,
        local_site: SiteId,
        all_sites: &[SiteId],
        sender: Arc<dyn Sender>,
        config: MpConfig,
    ) -> Self {
        Self {
            state,
            local_site,
            participants: Self::remotes(all_sites, local_site),
            sender,
            config,
            graph: DependencyGraph::new(),
            frames: Vec::new(),
            remote_failure: None,
            restarts: 0,
        }
    }

    fn remotes(all_sites: &[SiteId], local_site: SiteId) -> Vec<SiteId> {
        let mut remotes: Vec<_> = all_sites
            .iter()
            .copied()
            .filter(|site| *site != local_site)
            .collect();
        remotes.sort_unstable();
        remotes.dedup();
        remotes
    }

    pub fn txn_id(&self) -> TxnId {
        self.state.txn_id()
    }

    pub fn state(&self) -> &Arc<TransactionState> {
        &self.state
    }

    pub fn local_site(&self) -> SiteId {
        self.local_site
    }

    pub fn participants(&self) -> &[SiteId] {
        &self.participants
    }

    pub fn restart_count(&self) -> u32 {
        self.restarts
    }

    pub fn has_pending_batch(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Dependencies still waiting on a respondent.
    pub fn pending_dependencies(&self) -> Vec<DependencyId> {
        self.graph.missing()
    }

    /// Replace the participant set. Only allowed between batches.
    pub fn update_participants(&mut self, all_sites: &[SiteId]) -> Result<(), MpError> {
        if self.has_pending_batch() {
            return Err(MpError::BatchInProgress(self.txn_id()));
        }
        self.participants = Self::remotes(all_sites, self.local_site);
        debug!(
            txn_id = %self.txn_id(),
            participants = self.participants.len(),
            "Participants updated"
        );
        Ok(())
    }

    /// Declare the dependencies the procedure resumes on after the next
    /// batch. Must precede the batch's fragment work.
    pub fn setup_procedure_resume(
        &mut self,
        is_final: bool,
        deps_to_resume: Vec<DependencyId>,
    ) -> Result<(), MpError> {
        if self.has_pending_batch() {
            return Err(MpError::BatchInProgress(self.txn_id()));
        }
        self.frames.push(BatchFrame {
            is_final,
            deps_to_resume,
            local: None,
            remote: None,
            remote_ran_locally: false,
        });
        Ok(())
    }

    /// Register the fragments the coordinator runs itself for this batch.
    pub fn create_local_fragment_work(
        &mut self,
        batch: FragmentTaskMessage,
        is_final: bool,
    ) -> Result<(), MpError> {
        self.check_txn(batch.txn_id)?;
        let txn_id = self.txn_id();
        let frame = self
            .frames
            .last_mut()
            .ok_or(MpError::NoActiveBatch(txn_id))?;
        frame.local = Some(batch.with_final(is_final));
        Ok(())
    }

    /// Register the batch every participant runs and fan it out.
    ///
    /// Read-only batches over replicated tables are satisfied by the local
    /// execution alone and nothing is sent. Otherwise the batch goes to
    /// every participant in one send: `send` for a single remote,
    /// `send_many` for several.
    pub fn create_all_participating_fragment_work(
        &mut self,
        batch: FragmentTaskMessage,
    ) -> Result<(), MpError> {
        self.check_txn(batch.txn_id)?;
        let txn_id = self.txn_id();
        if self.frames.is_empty() {
            return Err(MpError::NoActiveBatch(txn_id));
        }

        let single_fragment =
            self.config.single_fragment_optimization && batch.is_single_fragment_eligible();
        let fan_out = !single_fragment && !self.participants.is_empty();

        let mut respondents = BTreeSet::from([self.local_site]);
        if fan_out {
            respondents.extend(self.participants.iter().copied());
        }
        for dep in batch.output_dep_ids() {
            self.graph.expect(dep, respondents.clone());
        }

        if single_fragment {
            debug!(txn_id = %txn_id, batch = %batch.batch_id, "Single-fragment batch, no fan-out");
        } else if fan_out {
            debug!(
                txn_id = %txn_id,
                batch = %batch.batch_id,
                destinations = self.participants.len(),
                "Fanning out fragment batch"
            );
            let message = OutboundMessage::FragmentTask(batch.clone());
            match self.participants.as_slice() {
                [only] => self.sender.send(*only, message)?,
                remotes => self.sender.send_many(remotes, message)?,
            }
        }

        if let Some(frame) = self.frames.last_mut() {
            frame.remote = Some(batch);
        }
        Ok(())
    }

    /// Record one participant's response.
    ///
    /// Returns whether the response was accepted. Tables for unknown
    /// dependencies or from unexpected sites are ignored, as are repeats.
    /// A failure response is accepted and surfaces from the next
    /// [`recursable_run`](Self::recursable_run).
    pub fn offer_received_fragment_response(
        &mut self,
        response: FragmentResponseMessage,
    ) -> Result<bool, MpError> {
        self.check_txn(response.txn_id)?;
        let site = response.executor;
        if let strata_messages::ResponseStatus::Failure(reason) = response.status {
            warn!(txn_id = %response.txn_id, site = site.0, reason = %reason, "Remote fragment failure");
            if self.remote_failure.is_none() {
                self.remote_failure = Some((site, reason));
            }
            return Ok(true);
        }

        let mut accepted = false;
        for (dep, table) in response.dependencies {
            match self.graph.offer(dep, site, table) {
                GraphOffer::Recorded => accepted = true,
                GraphOffer::Unexpected => {
                    warn!(txn_id = %response.txn_id, site = site.0, dep = %dep, "Unexpected fragment response");
                }
                GraphOffer::Duplicate => {
                    debug!(txn_id = %response.txn_id, site = site.0, dep = %dep, "Duplicate fragment response");
                }
            }
        }
        Ok(accepted)
    }

    /// Drive the procedure until it finishes or waits on remote responses.
    ///
    /// For the batch on top of the stack: run the remote work locally once,
    /// defer if any dependency is still missing, otherwise run the local
    /// fragments on the collected inputs and hand the resume results to the
    /// procedure. A follow-on batch is pushed and driven in the same call.
    pub fn recursable_run(
        &mut self,
        ctx: &mut dyn ExecutionContext,
    ) -> Result<RunOutcome, MpError> {
        let txn_id = self.txn_id();
        let mut batches_run = 0usize;

        loop {
            if let Some((site, reason)) = self.remote_failure.take() {
                return Err(MpError::RemoteFailure { site, reason });
            }

            let frame = self
                .frames
                .last_mut()
                .ok_or(MpError::NoActiveBatch(txn_id))?;
            if !frame.remote_ran_locally {
                if let Some(remote) = &frame.remote {
                    for fragment in &remote.fragments {
                        let table = ctx.execute_fragment(txn_id, fragment, &[], remote.read_only)?;
                        let offer = self.graph.offer(fragment.output_dep, self.local_site, table);
                        if offer != GraphOffer::Recorded {
                            warn!(
                                txn_id = %txn_id,
                                dep = %fragment.output_dep,
                                outcome = ?offer,
                                "Local fragment result not recorded"
                            );
                        }
                    }
                }
                frame.remote_ran_locally = true;
            }

            let waiting_on = self.graph.missing();
            if !waiting_on.is_empty() {
                trace!(txn_id = %txn_id, waiting = waiting_on.len(), "Batch deferred");
                return Ok(RunOutcome::Deferred { waiting_on });
            }

            // The batch stays on the stack until its local work succeeds
            let frame = self
                .frames
                .last()
                .ok_or(MpError::NoActiveBatch(txn_id))?;
            let results = self.run_local(ctx, frame)?;
            let is_final = frame.is_final;
            self.frames.pop();
            self.graph.clear();
            batches_run += 1;

            if is_final {
                return Ok(RunOutcome::Complete(results));
            }
            match ctx.next_batch(txn_id, &results) {
                Some(plan) => {
                    if batches_run >= self.config.batch_depth_warn {
                        warn!(txn_id = %txn_id, batches = batches_run, "Deep batch chain");
                    }
                    self.install(plan)?;
                }
                None => return Ok(RunOutcome::Complete(results)),
            }
        }
    }

    /// Run the batch's local fragments and collect the resume results.
    fn run_local(
        &self,
        ctx: &mut dyn ExecutionContext,
        frame: &BatchFrame,
    ) -> Result<DependencyResults, MpError> {
        let txn_id = self.txn_id();
        let mut produced = DependencyResults::new();
        if let Some(local) = &frame.local {
            for fragment in &local.fragments {
                let inputs: Vec<Table> = match fragment.input_dep {
                    Some(dep) => self
                        .graph
                        .tables(dep)
                        .ok_or(strata_core::ExecutionError::InvalidInput(dep))?,
                    None => Vec::new(),
                };
                let table = ctx.execute_fragment(txn_id, fragment, &inputs, local.read_only)?;
                produced.entry(fragment.output_dep).or_default().push(table);
            }
        }

        let mut results = DependencyResults::new();
        for dep in &frame.deps_to_resume {
            let tables = match produced.swap_remove(dep) {
                Some(tables) => tables,
                None => self
                    .graph
                    .tables(*dep)
                    .ok_or(MpError::MissingResumeDependency(*dep))?,
            };
            results.insert(*dep, tables);
        }
        Ok(results)
    }

    fn install(&mut self, plan: BatchPlan) -> Result<(), MpError> {
        self.setup_procedure_resume(plan.is_final, plan.deps_to_resume)?;
        self.create_local_fragment_work(plan.local, plan.is_final)?;
        if let Some(remote) = plan.remote {
            self.create_all_participating_fragment_work(remote)?;
        }
        Ok(())
    }

    /// Send the completion to every site, this one included, in one send.
    pub fn send_completion(
        &self,
        sequence: CompletionSequence,
        rollback: bool,
    ) -> Result<(), MpError> {
        let mut dests: Vec<_> = self.participants.clone();
        dests.push(self.local_site);
        dests.sort_unstable();
        let message = OutboundMessage::CompleteTransaction(CompleteTransactionMessage::with_sequence(
            self.txn_id(),
            sequence,
            rollback,
        ));
        debug!(
            txn_id = %self.txn_id(),
            sequence = %sequence,
            rollback,
            destinations = dests.len(),
            "Sending completion"
        );
        self.sender.send_many(&dests, message)?;
        Ok(())
    }

    /// Drop all batch state after a coordinator failover.
    pub fn restart(&mut self) {
        self.graph.clear();
        self.frames.clear();
        self.remote_failure = None;
        self.restarts += 1;
        debug!(txn_id = %self.txn_id(), restarts = self.restarts, "Transaction restarted");
    }

    fn check_txn(&self, got: TxnId) -> Result<(), MpError> {
        if got != self.txn_id() {
            return Err(MpError::WrongTransaction {
                expected: self.txn_id(),
                got,
            });
        }
        Ok(())
    }
}
