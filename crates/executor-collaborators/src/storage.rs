//! Storage collaborator boundary (spec §6 "Storage collaborator").

use async_trait::async_trait;
#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use executor_types::{ContractKey, DriveKey, StorageHash};

use crate::errors::StorageError;

/// Opaque modification id, `H(contractKey ‖ batchIndex)` (spec §4.3
/// `initiateModifications`).
pub type ModificationId = [u8; 32];

pub fn modification_id(contract_key: &ContractKey, batch_index: u64) -> ModificationId {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(contract_key.as_bytes());
    hasher.update(batch_index.to_be_bytes());
    hasher.finalize().into()
}

/// Handle over an in-flight batch-level storage modification (spec §4.3
/// step 1, §6 `applyStorageModification`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StorageModificationHandle(pub ModificationId);

/// Handle over an in-flight call-scoped sandbox modification (spec §3
/// "Sandbox Modification", §4.3 `initiateSandboxModification`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SandboxModificationHandle(pub u64);

/// `evaluateStorageHash` result (spec §4.3 step 3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StorageHashResult {
    pub storage_hash: StorageHash,
    pub used_size: u64,
    pub meta_size: u64,
    pub fs_tree_size: u64,
}

/// A file handle opened through a [`SandboxHandle`] (spec §6 file
/// primitives `open/read/write/flush/close`).
pub type FileHandle = u64;

/// A directory iterator handle (spec §6 "directory iterators
/// create/hasNext/next/destroy").
pub type DirIterHandle = u64;

/// Batch/contract-level storage operations (spec §6 "Storage collaborator").
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn initiate_modifications(
        &self,
        drive_key: DriveKey,
        modification_id: ModificationId,
    ) -> Result<StorageModificationHandle, StorageError>;

    async fn synchronize_storage(
        &self,
        drive_key: DriveKey,
        modification_id: ModificationId,
        target_storage_hash: StorageHash,
    ) -> Result<(), StorageError>;

    async fn actual_modification_id(
        &self,
        drive_key: DriveKey,
    ) -> Result<ModificationId, StorageError>;

    async fn initiate_sandbox_modification(
        &self,
        modification: StorageModificationHandle,
    ) -> Result<SandboxModificationHandle, StorageError>;

    async fn apply_sandbox_modification(
        &self,
        sandbox: SandboxModificationHandle,
        accept: bool,
    ) -> Result<(), StorageError>;

    async fn apply_storage_modification(
        &self,
        modification: StorageModificationHandle,
        accept: bool,
    ) -> Result<(), StorageError>;

    async fn evaluate_storage_hash(
        &self,
        modification: StorageModificationHandle,
    ) -> Result<StorageHashResult, StorageError>;
}

/// File/directory/filesystem primitives exposed to a running call through a
/// `StorageQueryHandler` wrapping the sandbox (spec §6, supplemented from
/// `StorageQueryHandler.cpp`/`.h` per `DESIGN.md`).
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait SandboxHandle: Send + Sync {
    async fn open(&mut self, path: &str, write: bool) -> Result<FileHandle, StorageError>;
    async fn read(&mut self, file: FileHandle, len: u32) -> Result<Vec<u8>, StorageError>;
    async fn write(&mut self, file: FileHandle, data: &[u8]) -> Result<(), StorageError>;
    async fn flush(&mut self, file: FileHandle) -> Result<(), StorageError>;
    async fn close(&mut self, file: FileHandle) -> Result<(), StorageError>;

    async fn create_dir_iter(&mut self, path: &str) -> Result<DirIterHandle, StorageError>;
    async fn dir_has_next(&mut self, iter: DirIterHandle) -> Result<bool, StorageError>;
    async fn dir_next(&mut self, iter: DirIterHandle) -> Result<String, StorageError>;
    async fn destroy_dir_iter(&mut self, iter: DirIterHandle) -> Result<(), StorageError>;

    async fn path_exists(&mut self, path: &str) -> Result<bool, StorageError>;
    async fn is_file(&mut self, path: &str) -> Result<bool, StorageError>;
    async fn file_size(&mut self, path: &str) -> Result<u64, StorageError>;
    async fn create_dir(&mut self, path: &str) -> Result<(), StorageError>;
    async fn move_path(&mut self, from: &str, to: &str) -> Result<(), StorageError>;
    async fn remove(&mut self, path: &str) -> Result<(), StorageError>;
}

#[cfg(test)]
mod storage_test {
    use super::*;

    #[test]
    fn modification_id_is_deterministic_in_its_inputs() {
        let key = ContractKey::from([7u8; 32]);
        assert_eq!(modification_id(&key, 3), modification_id(&key, 3));
        assert_ne!(modification_id(&key, 3), modification_id(&key, 4));
    }
}
