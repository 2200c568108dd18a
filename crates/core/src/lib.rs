//! Core types shared by the site queue and the MP coordinator.
//!
//! The ordering core depends on two external collaborators, both expressed
//! as narrow capability traits so they can be replaced with in-memory fakes:
//!
//! - [`Sender`]: the mailbox/transport that delivers messages to sites
//! - [`FragmentExecutor`]: the engine that runs one plan fragment and
//!   returns a table
//!
//! [`ExecutionContext`] extends the executor with the procedure body that
//! may issue further batches once earlier results are in.

mod error;
mod message;
mod plan;
mod state;
mod traits;

pub use error::{ExecutionError, SendError};
pub use message::OutboundMessage;
pub use plan::BatchPlan;
pub use state::TransactionState;
pub use traits::{ExecutionContext, FragmentExecutor, Sender};
