//! Messages exchanged between a multi-partition coordinator and sites.
//!
//! Payloads are opaque to the ordering core beyond the fields it needs to
//! route, block and resume work. Serialization derives are provided so an
//! embedding transport can carry them, but no wire format is defined here.

mod complete;
mod fragment;
mod initiate;
mod response;

pub use complete::CompleteTransactionMessage;
pub use fragment::{FragmentTaskMessage, PlanFragment};
pub use initiate::InitiateTaskMessage;
pub use response::{FragmentResponseMessage, ResponseStatus};
