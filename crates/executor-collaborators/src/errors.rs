//! Collaborator error kinds (spec §6 "expected<T, ...Error>", §7 "Error
//! handling design"). None of these are fatal to the contract; the task
//! inspects and locally decides (spec §7 "Propagation policy").

use thiserror::Error;

/// Storage collaborator failures (spec §6 "Storage collaborator").
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage is unavailable")]
    StorageUnavailable,
    #[error("failed to open file")]
    OpenFileError,
    #[error("failed to write file")]
    WriteFileError,
    #[error("failed to read file")]
    ReadFileError,
    #[error("failed to flush file")]
    FlushFileError,
    #[error("failed to close file")]
    CloseFileError,
    #[error("failed to create directory")]
    CreateDirError,
    #[error("failed to move path")]
    MoveError,
    #[error("failed to remove path")]
    RemoveError,
    #[error("path does not exist")]
    PathNotFound,
    #[error("modification id does not match the actual one on disk")]
    ModificationIdMismatch,
}

/// Virtual machine collaborator failures (spec §6 "Virtual Machine
/// collaborator").
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("the virtual machine service is unavailable")]
    ServiceUnavailable,
    #[error("the call trapped during execution")]
    Trapped,
    #[error("a handler rejected a query from the running call: {0}")]
    IncorrectQuery(#[from] HandlerError),
}

/// A typed rejection returned to the VM from one of the per-call handlers
/// (internet, blockchain, storage) (spec §7 "incorrect_query").
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    #[error("internet connection budget exhausted")]
    ConnectionBudgetExhausted,
    #[error("revocation check effort budget exhausted")]
    RevocationBudgetExhausted,
    #[error("query not supported for this call's level")]
    UnsupportedForLevel,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Messenger collaborator failures (spec §6 "Messenger collaborator").
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessengerError {
    #[error("the messenger service is unavailable")]
    ServiceUnavailable,
    #[error("no route to the given receiver")]
    UnknownReceiver,
}

/// Blockchain collaborator failures (spec §6 "Blockchain collaborator").
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockchainError {
    #[error("the blockchain client is unavailable")]
    ServiceUnavailable,
}
