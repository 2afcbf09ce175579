//! Blockchain collaborator boundary: events pushed in, and the
//! `ExecutorEventHandler` surface used to push transactions out (spec §6
//! "Blockchain collaborator").

use async_trait::async_trait;
#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use executor_types::{
    ContractKey,
    ExecutorKey,
    GroupElementBytes,
    PoExProof,
    PublishedEndBatchInfo,
    Signature,
    SingleTransactionKind,
    StorageHash,
};

use crate::errors::BlockchainError;
use crate::vm::EmittedTransaction;

/// Events the blockchain client pushes into the core (spec §6 "Events
/// pushed in").
#[derive(Clone, Debug, PartialEq)]
pub enum BlockchainEvent {
    BlockPublished { height: u64 },
    EndBatchExecutionPublished(PublishedEndBatchInfo),
    EndBatchExecutionSingleTransactionPublished {
        contract_key: ContractKey,
        batch_index: u64,
        executor_key: ExecutorKey,
        proof: PoExProof,
    },
    EndBatchExecutionFailed { contract_key: ContractKey, batch_index: u64 },
    StorageSynchronizedPublished { contract_key: ContractKey, batch_index: u64 },
}

/// The aggregated multisig transaction handed to the blockchain client once
/// quorum and the approval-expectation delay have both elapsed (spec §4.3).
#[derive(Clone, Debug, PartialEq)]
pub struct EndBatchMultisigTransaction {
    pub contract_key: ContractKey,
    pub batch_index: u64,
    pub automatic_executions_checked_up_to: u64,
    pub batch_success: bool,
    pub storage_hash: Option<StorageHash>,
    pub poex_verification_info: Option<GroupElementBytes>,
    pub cosigners: Vec<ExecutorKey>,
    pub signatures: Vec<Signature>,
    pub proofs: Vec<PoExProof>,
}

/// A single-signature transaction: the synchronize-single-transaction of
/// §4.5, or the end-batch single-transaction of §4.3 when the local peer is
/// not among the cosigners (spec's `SingleTransactionKind` supplement, see
/// `DESIGN.md`).
#[derive(Clone, Debug, PartialEq)]
pub struct EndBatchSingleTransaction {
    pub contract_key: ContractKey,
    pub batch_index: u64,
    pub executor_key: ExecutorKey,
    pub signature: Signature,
    pub proof: PoExProof,
    pub kind: SingleTransactionKind,
}

/// Released transactions broadcast once a published-successful batch is
/// committed (spec §4.3 "broadcast any released transactions").
#[derive(Clone, Debug, PartialEq)]
pub struct ReleasedTransactionsBundle {
    pub contract_key: ContractKey,
    pub batch_index: u64,
    pub transactions: Vec<EmittedTransaction>,
}

/// Events pushed out to the blockchain client (spec §6 "Events pushed out
/// (via ExecutorEventHandler)").
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ExecutorEventHandler: Send + Sync {
    async fn end_batch_transaction_is_ready(&self, transaction: EndBatchMultisigTransaction);
    async fn end_batch_single_transaction_is_ready(&self, transaction: EndBatchSingleTransaction);
    async fn synchronization_single_transaction_is_ready(
        &self,
        transaction: EndBatchSingleTransaction,
    );
    async fn released_transactions_are_ready(&self, bundle: ReleasedTransactionsBundle);
}

/// Optional `block(height)` queries (spec §6).
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait BlockchainClient: Send + Sync {
    async fn block_hash(&self, height: u64) -> Result<Option<executor_types::BlockHash>, BlockchainError>;
}
