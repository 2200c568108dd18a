//! Coordinator-side driver for multi-partition transactions.
//!
//! [`MpTransactionState`] fans each fragment batch out to the participating
//! sites (or skips fan-out entirely when one local execution suffices),
//! collects their per-dependency results in a [`DependencyGraph`], runs the
//! local fragments once every input has arrived, and keeps going while the
//! procedure issues further batches.

mod config;
mod error;
mod graph;
mod state;

pub use config::MpConfig;
pub use error::MpError;
pub use graph::{DependencyGraph, GraphOffer};
pub use state::{MpTransactionState, RunOutcome};
