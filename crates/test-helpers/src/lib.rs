//! In-memory collaborators and fixtures for tests.
//!
//! - [`RecordingSender`]: a [`Sender`](strata_core::Sender) that records every send
//! - [`ScriptedExecutor`]: a fragment executor and procedure body driven by
//!   scripted tables, failures and follow-on batches
//! - [`fixtures`]: message builders mirroring how a procedure runner lays
//!   out remote and local fragment work

mod executor;
pub mod fixtures;
mod sender;

pub use executor::{ExecutedFragment, ScriptedExecutor};
pub use sender::{RecordingSender, SentMessage};
