//! Events landing on a contract's single-threaded event loop (spec §5:
//! "block published, peer message, blockchain event, storage reply, VM
//! reply, timer"). [`crate::coordinator::ContractCoordinator::handle_event`]
//! is the sole entry point that consumes these.

use executor_collaborators::{CallExecutionResult, ModificationId, SandboxModificationHandle, StorageError, StorageHashResult, StorageModificationHandle, VmError};
use executor_types::{BlockHash, EndBatchOpinion, ExecutorKey, PublishedEndBatchInfo};

#[derive(Debug)]
pub enum ContractEvent {
    BlockPublished { height: u64, hash: BlockHash },
    PeerOpinion { sender: ExecutorKey, opinion: EndBatchOpinion },
    EndBatchExecutionPublished(PublishedEndBatchInfo),
    ActualModificationIdQueried { result: Result<ModificationId, StorageError> },
    ModificationsInitiated { batch_index: u64, result: Result<StorageModificationHandle, StorageError> },
    SandboxModificationInitiated {
        batch_index: u64,
        call_index: usize,
        result: Result<SandboxModificationHandle, StorageError>,
    },
    CallExecuted { batch_index: u64, call_index: usize, result: Result<CallExecutionResult, VmError> },
    SandboxModificationApplied { batch_index: u64, call_index: usize, result: Result<(), StorageError> },
    StorageHashEvaluated { batch_index: u64, result: Result<StorageHashResult, StorageError> },
    UnsuccessfulTimerFired { batch_index: u64 },
    ApprovalExpectationTimerFired { batch_index: u64 },
    SynchronizationCompleted { target_storage_hash: executor_types::StorageHash, result: Result<(), StorageError> },
    RemovalCompleted,
}

impl ContractEvent {
    /// The batch a batch-scoped event belongs to, if any. Used by the
    /// coordinator to route the event to the active
    /// [`crate::execution_task::BatchExecutionTask`] and to discard events
    /// addressed to a batch no longer current (spec §8 Testable Property #8
    /// "idempotence of event replay").
    pub fn batch_index(&self) -> Option<u64> {
        match self {
            Self::ModificationsInitiated { batch_index, .. }
            | Self::SandboxModificationInitiated { batch_index, .. }
            | Self::CallExecuted { batch_index, .. }
            | Self::SandboxModificationApplied { batch_index, .. }
            | Self::StorageHashEvaluated { batch_index, .. }
            | Self::UnsuccessfulTimerFired { batch_index }
            | Self::ApprovalExpectationTimerFired { batch_index } => Some(*batch_index),
            Self::EndBatchExecutionPublished(info) => Some(info.batch_index),
            Self::PeerOpinion { opinion, .. } => Some(opinion.batch_index()),
            Self::BlockPublished { .. }
            | Self::SynchronizationCompleted { .. }
            | Self::ActualModificationIdQueried { .. }
            | Self::RemovalCompleted => None,
        }
    }
}
