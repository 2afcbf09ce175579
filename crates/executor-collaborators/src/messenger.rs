//! Peer-to-peer messenger collaborator (spec §6 "Messenger collaborator").

use async_trait::async_trait;
#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use executor_types::ExecutorKey;

use crate::errors::MessengerError;

/// Tags used by the core (spec §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageTag {
    SuccessfulEndBatch,
    UnsuccessfulEndBatch,
}

/// One outbound, one-shot message (spec §6 "`sendMessage({receiver, tag,
/// content: bytes})` is one-shot").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    pub receiver: ExecutorKey,
    pub tag: MessageTag,
    /// The canonical serialization of the corresponding opinion (spec §6).
    pub content: Vec<u8>,
}

/// An inbound message as delivered to a subscriber (spec §6).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub sender: ExecutorKey,
    pub tag: MessageTag,
    pub content: Vec<u8>,
}

#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait MessengerClient: Send + Sync {
    async fn send_message(&self, message: OutboundMessage) -> Result<(), MessengerError>;
}
