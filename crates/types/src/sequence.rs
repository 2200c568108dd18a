//! Completion sequence numbers for repair and restart.
//!
//! Ordinary completions carry [`CompletionSequence::INITIAL`]. When a
//! coordinator fails over, the new coordinator resends completions stamped
//! by a [`RestartSequenceGenerator`]. The encoding is:
//!
//! ```text
//!  63   62 ............................ 15  14 ........ 0
//! [R ] [           counter (48 bits)      ] [ node id   ]
//! ```
//!
//! `R` is set for restart completions. A restart therefore compares
//! numerically above every repair, and within one kind a later-issued
//! sequence from the same generator compares above an earlier one.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

const RESTART_BIT: u64 = 1 << 63;
const NODE_ID_BITS: u32 = 15;
const NODE_ID_MASK: u64 = (1 << NODE_ID_BITS) - 1;
const COUNTER_MASK: u64 = (1 << 48) - 1;

/// Kind of completion a sequence number was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionKind {
    /// Ordinary completion from the original coordinator.
    Initial,
    /// Repair completion resent after failover.
    Repair,
    /// Restart completion: the transaction is replaced by a new incarnation.
    Restart,
}

/// Sequence stamp carried by a completion message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CompletionSequence(pub u64);

impl CompletionSequence {
    /// Sequence carried by every ordinary completion.
    pub const INITIAL: CompletionSequence = CompletionSequence(0);

    /// Which kind of completion this sequence belongs to.
    pub fn kind(&self) -> CompletionKind {
        if self.0 == 0 {
            CompletionKind::Initial
        } else if self.0 & RESTART_BIT != 0 {
            CompletionKind::Restart
        } else {
            CompletionKind::Repair
        }
    }

    /// True if this is a restart completion sequence.
    pub fn is_restart(&self) -> bool {
        self.kind() == CompletionKind::Restart
    }

    /// Node id of the generator that issued this sequence.
    pub fn node_id(&self) -> u16 {
        (self.0 & NODE_ID_MASK) as u16
    }

    /// Per-generator counter value.
    pub fn counter(&self) -> u64 {
        (self.0 >> NODE_ID_BITS) & COUNTER_MASK
    }

    /// Whether a completion with this sequence replaces one previously
    /// recorded with `prior`.
    ///
    /// A restart supersedes any repair or initial completion. Otherwise the
    /// later-issued (numerically greater) sequence wins. An initial
    /// completion never supersedes anything.
    pub fn supersedes(&self, prior: CompletionSequence) -> bool {
        match (self.kind(), prior.kind()) {
            (CompletionKind::Initial, _) => false,
            (CompletionKind::Restart, CompletionKind::Repair | CompletionKind::Initial) => true,
            (CompletionKind::Repair, CompletionKind::Restart) => false,
            _ => self.0 > prior.0,
        }
    }
}

impl Default for CompletionSequence {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl fmt::Display for CompletionSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            CompletionKind::Initial => write!(f, "Seq(initial)"),
            CompletionKind::Repair => {
                write!(f, "Seq(repair {}@{})", self.counter(), self.node_id())
            }
            CompletionKind::Restart => {
                write!(f, "Seq(restart {}@{})", self.counter(), self.node_id())
            }
        }
    }
}

/// Issues strictly increasing repair or restart sequence numbers.
///
/// Safe to share between threads; each call to [`next`](Self::next)
/// claims a distinct counter value.
#[derive(Debug)]
pub struct RestartSequenceGenerator {
    node_id: u16,
    for_restart: bool,
    counter: AtomicU64,
}

impl RestartSequenceGenerator {
    /// Create a generator seeded with this node's id.
    ///
    /// Only the low 15 bits of `node_id` are encoded.
    pub fn new(node_id: u16, for_restart: bool) -> Self {
        Self {
            node_id: node_id & NODE_ID_MASK as u16,
            for_restart,
            counter: AtomicU64::new(1),
        }
    }

    /// Whether this generator issues restart sequences.
    pub fn is_for_restart(&self) -> bool {
        self.for_restart
    }

    /// Claim the next sequence number.
    pub fn next(&self) -> CompletionSequence {
        let counter = self.counter.fetch_add(1, Ordering::Relaxed) & COUNTER_MASK;
        let mut value = (counter << NODE_ID_BITS) | u64::from(self.node_id);
        if self.for_restart {
            value |= RESTART_BIT;
        }
        CompletionSequence(value)
    }
}
