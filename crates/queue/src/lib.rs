//! Per-site transaction ordering.
//!
//! Each partition ("site") runs a single execution thread that drains its
//! [`SiteTaskQueue`]. Tasks reach that queue through the site's
//! [`TransactionTaskQueue`], which decides whether a task may run now or
//! must wait in the backlog behind the active multi-partition transaction.
//!
//! # Ordering rules
//!
//! - SP work runs immediately unless an MP transaction holds the site.
//! - At most one MP transaction holds the site at a time. Its own
//!   fragments and completions pass through; everything else parks.
//! - When the active transaction is done, [`TransactionTaskQueue::flush`]
//!   releases the backlog in arrival order up to the next MP transaction,
//!   which then takes the site.
//!
//! # Repair and restart
//!
//! A process-wide [`Scoreboard`] shared by every site's queue records the
//! newest completion sequence seen per transaction and holds MP write
//! completions until every site has the same one. Stale resends are
//! discarded; a restart replaces an in-flight transaction with a new
//! incarnation everywhere.

mod config;
mod error;
mod queue;
mod scoreboard;
mod site;
mod task;

pub use config::TaskQueueConfig;
pub use error::QueueError;
pub use queue::{Disposition, TransactionTaskQueue, TxnPhase};
pub use scoreboard::{Admission, Scoreboard};
pub use site::{SiteQueueStats, SiteTaskQueue};
pub use task::{TaskKind, TaskOutcome, TaskWork, TransactionTask};
