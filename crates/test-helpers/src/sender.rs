//! Recording sender.

use parking_lot::Mutex;
use strata_core::{OutboundMessage, SendError, Sender};
use strata_types::SiteId;

/// One recorded call on [`RecordingSender`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub dests: Vec<SiteId>,
    pub message: OutboundMessage,
    /// Issued through `send_many`.
    pub multi: bool,
}

/// Sender that records calls instead of delivering them.
#[derive(Debug, Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<SentMessage>>,
    fail_with: Option<SendError>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sender that rejects every call with `error`.
    pub fn failing(error: SendError) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_with: Some(error),
        }
    }

    /// Every call so far.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    /// Calls made through `send`.
    pub fn single_sends(&self) -> Vec<SentMessage> {
        self.sent.lock().iter().filter(|s| !s.multi).cloned().collect()
    }

    /// Calls made through `send_many`.
    pub fn multi_sends(&self) -> Vec<SentMessage> {
        self.sent.lock().iter().filter(|s| s.multi).cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    fn record(&self, dests: Vec<SiteId>, message: OutboundMessage, multi: bool) -> Result<(), SendError> {
        if let Some(error) = &self.fail_with {
            return Err(error.clone());
        }
        self.sent.lock().push(SentMessage {
            dests,
            message,
            multi,
        });
        Ok(())
    }
}

impl Sender for RecordingSender {
    fn send(&self, dest: SiteId, message: OutboundMessage) -> Result<(), SendError> {
        self.record(vec![dest], message, false)
    }

    fn send_many(&self, dests: &[SiteId], message: OutboundMessage) -> Result<(), SendError> {
        self.record(dests.to_vec(), message, true)
    }
}
