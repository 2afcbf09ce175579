//! Init, Synchronize, and Remove tasks (spec §4.5): the auxiliary task
//! variants a [`crate::coordinator::ContractCoordinator`] runs instead of a
//! [`crate::execution_task::BatchExecutionTask`] when one is pending.

use executor_collaborators::{ModificationId, StorageError};
use executor_types::{DriveKey, PublishedEndBatchInfo, StorageHash};
use tracing::debug;

/// Commands an [`InitTask`] asks its owner to issue.
#[derive(Debug)]
pub enum InitCommand {
    QueryActualModificationId { drive_key: DriveKey },
    ArmRetryTimer,
    WaitForPublish,
    TriggerSynchronize { target_storage_hash: StorageHash, next_batch_index: u64 },
    Done,
}

/// `InitTask` (spec §4.5): brings a freshly-started contract's storage to a
/// recognized state before any batch execution begins.
pub struct InitTask {
    drive_key: DriveKey,
    contract_deployment_base_modification_id: ModificationId,
    has_historical_batches: bool,
}

impl InitTask {
    pub fn new(
        drive_key: DriveKey,
        contract_deployment_base_modification_id: ModificationId,
        has_historical_batches: bool,
    ) -> Self {
        Self { drive_key, contract_deployment_base_modification_id, has_historical_batches }
    }

    /// `start()`: a contract with no historical batches polls
    /// `actualModificationId`; one with history waits for the next
    /// publication instead (spec §4.5 "Init Task").
    pub fn start(&self) -> InitCommand {
        if self.has_historical_batches {
            InitCommand::WaitForPublish
        } else {
            InitCommand::QueryActualModificationId { drive_key: self.drive_key }
        }
    }

    pub fn on_actual_modification_id(
        &self,
        result: Result<ModificationId, StorageError>,
    ) -> InitCommand {
        match result {
            Ok(actual) if actual == self.contract_deployment_base_modification_id => InitCommand::Done,
            Ok(_) => InitCommand::ArmRetryTimer,
            Err(StorageError::StorageUnavailable) => InitCommand::ArmRetryTimer,
            Err(_) => InitCommand::ArmRetryTimer,
        }
    }

    pub fn on_retry_timer(&self) -> InitCommand {
        InitCommand::QueryActualModificationId { drive_key: self.drive_key }
    }

    /// A contract with history completes Init on the next publication, which
    /// in turn schedules a Synchronize Task (spec §4.5: "... triggers a
    /// follow-up Synchronize Task and then proceeds").
    pub fn on_end_batch_execution_published(&self, info: &PublishedEndBatchInfo) -> InitCommand {
        InitCommand::TriggerSynchronize {
            target_storage_hash: info.drive_state,
            next_batch_index: info.batch_index + 1,
        }
    }
}

/// Commands a [`SynchronizeTask`] asks its owner to issue.
#[derive(Debug)]
pub enum SynchronizeCommand {
    SynchronizeStorage { drive_key: DriveKey, modification_id: ModificationId, target_storage_hash: StorageHash },
    ArmRetryTimer,
    EmitSingleTransaction,
    SkipBatchesAndResetPoEx { next_batch_index: u64 },
}

/// `SynchronizeTask` (spec §4.5): brings storage into line with a
/// quorum-established `targetStorageHash` after a mismatch or a late Init.
pub struct SynchronizeTask {
    drive_key: DriveKey,
    modification_id: ModificationId,
    target_storage_hash: StorageHash,
    next_batch_index: u64,
}

impl SynchronizeTask {
    pub fn new(
        drive_key: DriveKey,
        modification_id: ModificationId,
        target_storage_hash: StorageHash,
        next_batch_index: u64,
    ) -> Self {
        Self { drive_key, modification_id, target_storage_hash, next_batch_index }
    }

    pub fn start(&self) -> SynchronizeCommand {
        SynchronizeCommand::SynchronizeStorage {
            drive_key: self.drive_key,
            modification_id: self.modification_id,
            target_storage_hash: self.target_storage_hash,
        }
    }

    /// On success: emit the synchronize single-transaction, skip Assembly
    /// forward, and reset PoEx to `nextBatchIndex + 1` (spec §4.5, taken
    /// literally — see `DESIGN.md`). Retries on `storage_unavailable`.
    pub fn on_synchronize_storage(&self, result: Result<(), StorageError>) -> Vec<SynchronizeCommand> {
        match result {
            Ok(()) => {
                debug!(next_batch_index = self.next_batch_index, "storage synchronized");
                vec![
                    SynchronizeCommand::EmitSingleTransaction,
                    SynchronizeCommand::SkipBatchesAndResetPoEx { next_batch_index: self.next_batch_index },
                ]
            }
            Err(_) => vec![SynchronizeCommand::ArmRetryTimer],
        }
    }

    pub fn on_retry_timer(&self) -> SynchronizeCommand {
        self.start()
    }
}

/// `RemoveTask` (spec §4.5): "finalizes cleanly and signals the owning
/// Executor." No collaborator calls of its own; it exists to occupy the
/// Coordinator's single active-task slot while in-flight work drains.
pub struct RemoveTask;

impl RemoveTask {
    pub fn finalize(&self) -> RemoveOutcome {
        RemoveOutcome::SignalOwningExecutor
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    SignalOwningExecutor,
}
