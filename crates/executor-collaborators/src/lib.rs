//! The trait-level boundary to the execution coordinator's external
//! collaborators (spec §1 "Deliberately OUT of scope", §6 "External
//! interfaces"). Real RPC implementations of these traits are out of scope;
//! only the trait boundary and its mock doubles live here.

pub mod blockchain;
pub mod errors;
pub mod handle;
pub mod messenger;
pub mod storage;
pub mod vm;

pub use blockchain::{
    BlockchainClient,
    BlockchainEvent,
    EndBatchMultisigTransaction,
    EndBatchSingleTransaction,
    ExecutorEventHandler,
    ReleasedTransactionsBundle,
};
pub use errors::{BlockchainError, HandlerError, MessengerError, StorageError, VmError};
pub use handle::{query_pair, QueryHandle, QueryResponder};
pub use messenger::{InboundMessage, MessageTag, MessengerClient, OutboundMessage};
pub use storage::{
    modification_id,
    DirIterHandle,
    FileHandle,
    ModificationId,
    SandboxHandle,
    SandboxModificationHandle,
    StorageClient,
    StorageHashResult,
    StorageModificationHandle,
};
pub use vm::{
    AutorunBlockchainQueryHandler,
    BlockchainQueryHandler,
    BlockchainQueryHandlerKind,
    CallExecutionResult,
    CallHandlers,
    EmittedTransaction,
    InternetQueryHandler,
    StorageQueryHandler,
    VirtualMachineClient,
};

#[cfg(any(test, feature = "testing"))]
pub use blockchain::{MockBlockchainClient, MockExecutorEventHandler};
#[cfg(any(test, feature = "testing"))]
pub use messenger::MockMessengerClient;
#[cfg(any(test, feature = "testing"))]
pub use storage::{MockSandboxHandle, MockStorageClient};
#[cfg(any(test, feature = "testing"))]
pub use vm::MockVirtualMachineClient;
