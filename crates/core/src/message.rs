//! Outbound message types handed to the transport.

use strata_messages::{CompleteTransactionMessage, FragmentResponseMessage, FragmentTaskMessage};
use strata_types::TxnId;

/// Messages the ordering core asks the transport to deliver.
///
/// The transport owns encoding and delivery; this enum only names what is
/// being sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Fragment batch fanned out by a coordinator.
    FragmentTask(FragmentTaskMessage),

    /// A site's results for a fragment batch, sent back to the coordinator.
    FragmentResponse(FragmentResponseMessage),

    /// Commit, rollback, repair or restart of an MP transaction.
    CompleteTransaction(CompleteTransactionMessage),
}

impl OutboundMessage {
    /// Get a human-readable name for this message type.
    pub fn type_name(&self) -> &'static str {
        match self {
            OutboundMessage::FragmentTask(_) => "FragmentTask",
            OutboundMessage::FragmentResponse(_) => "FragmentResponse",
            OutboundMessage::CompleteTransaction(_) => "CompleteTransaction",
        }
    }

    /// Transaction this message concerns.
    pub fn txn_id(&self) -> TxnId {
        match self {
            OutboundMessage::FragmentTask(m) => m.txn_id,
            OutboundMessage::FragmentResponse(m) => m.txn_id,
            OutboundMessage::CompleteTransaction(m) => m.txn_id,
        }
    }

    /// Check if this is a fragment batch.
    pub fn is_fragment_task(&self) -> bool {
        matches!(self, OutboundMessage::FragmentTask(_))
    }

    /// Check if this is a completion.
    pub fn is_completion(&self) -> bool {
        matches!(self, OutboundMessage::CompleteTransaction(_))
    }
}
