//! Message fixtures.

use strata_messages::{FragmentResponseMessage, FragmentTaskMessage, PlanFragment};
use strata_types::{BatchId, DependencyId, FragmentId, SiteId, Table, TxnId};

/// Offset between a statement's local output dependency and the
/// distributed dependency feeding it.
pub const DISTRIBUTED_DEP_OFFSET: i32 = 1000;

/// Remote work, local work and the responses every remote would send for
/// one batch of `batch_size` statements.
#[derive(Debug, Clone)]
pub struct MpTestPlan {
    pub remote_work: FragmentTaskMessage,
    pub local_work: FragmentTaskMessage,
    pub responses: Vec<FragmentResponseMessage>,
    pub deps_to_resume: Vec<DependencyId>,
}

/// Lay out a batch the way a procedure runner does.
///
/// Statement `i` resumes on dependency `i`. Unless the batch is a read of
/// replicated tables only, every statement also gets a distributed
/// fragment producing dependency `i + 1000`, which feeds the local
/// fragment for that statement.
pub fn mp_test_plan(
    txn_id: TxnId,
    coordinator: SiteId,
    batch_id: BatchId,
    batch_size: usize,
    read_only: bool,
    replicated: bool,
    remotes: &[SiteId],
) -> MpTestPlan {
    let single_frag = read_only && replicated;
    let params = vec![0x10, 0xe1, 0x16, 0x2e];

    let mut remote_work = FragmentTaskMessage::new(txn_id, coordinator, batch_id, read_only)
        .with_replicated_only(replicated);
    let mut local_work = FragmentTaskMessage::new(txn_id, coordinator, batch_id, read_only);
    let mut deps_to_resume = Vec::with_capacity(batch_size);

    for i in 0..batch_size {
        let dep = DependencyId(i as i32);
        deps_to_resume.push(dep);
        let mut local = PlanFragment::new(FragmentId(i as u64), dep, params.clone());
        if !single_frag {
            let distributed = DependencyId(i as i32 + DISTRIBUTED_DEP_OFFSET);
            remote_work.add_fragment(PlanFragment::new(
                FragmentId(i as u64 + DISTRIBUTED_DEP_OFFSET as u64),
                distributed,
                params.clone(),
            ));
            local = local.with_input_dep(distributed);
        }
        local_work.add_fragment(local);
    }

    let responses = if single_frag {
        Vec::new()
    } else {
        remotes
            .iter()
            .map(|site| {
                remote_work.output_dep_ids().fold(
                    FragmentResponseMessage::new(txn_id, *site),
                    |resp, dep| resp.with_dependency(dep, Table::new(["BOGO"])),
                )
            })
            .collect()
    };

    MpTestPlan {
        remote_work,
        local_work,
        responses,
        deps_to_resume,
    }
}

/// All sites `0..count`, and those other than `local`.
pub fn site_membership(count: u64, local: SiteId) -> (Vec<SiteId>, Vec<SiteId>) {
    let all: Vec<_> = (0..count).map(SiteId).collect();
    let remotes = all.iter().copied().filter(|s| *s != local).collect();
    (all, remotes)
}
