//! Data model for the off-chain smart-contract execution coordinator
//! (spec §3). Pure types and canonical serialization; no behavior.

pub mod batch;
pub mod call;
pub mod directory;
pub mod ids;
pub mod opinion;
pub mod poex_types;
pub mod published;

pub use batch::{Batch, BatchInvariantError, DraftBatch, DraftBatchStatus};
pub use call::{CallLevel, CallRequest, ManualCallInfo, ServicePayment};
pub use directory::{ExecutorDirectory, ExecutorDirectoryEntry};
pub use ids::{
    BlockHash,
    CallId,
    CallerKey,
    ContractKey,
    DriveKey,
    ExecutorKey,
    Signature,
    StorageHash,
    TransactionHash,
};
pub use opinion::{
    EndBatchOpinion,
    SuccessfulCallExecutionOpinion,
    SuccessfulEndBatchOpinion,
    UnsuccessfulEndBatchOpinion,
};
pub use poex_types::{GroupElementBytes, PoExProof, PoExVerificationInfo, ScalarBytes};
pub use published::{PublishedEndBatchInfo, SingleTransactionKind};
