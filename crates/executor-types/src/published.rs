//! On-chain authoritative batch outcomes (spec §3 "PublishedEndBatchInfo",
//! §6 blockchain events).

use serde::{Deserialize, Serialize};

use crate::ids::{ExecutorKey, StorageHash};
use crate::poex_types::PoExVerificationInfo;

/// The authoritative result of a batch, as published on-chain (spec §3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PublishedEndBatchInfo {
    pub batch_index: u64,
    pub automatic_executions_checked_up_to: u64,
    pub automatic_executions_enabled_since: Option<u64>,
    pub batch_success: bool,
    pub drive_state: StorageHash,
    pub poex_verification_info: PoExVerificationInfo,
    pub cosigners: Vec<ExecutorKey>,
}

/// Distinguishes the two call sites that emit a single-signature
/// transaction rather than a multisig one (spec §4.3 publication
/// reconciliation, §4.5 Synchronize Task).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SingleTransactionKind {
    /// This peer was not among the cosigners of a published-successful
    /// batch; it publishes its own PoEx proof alone.
    EndBatch,
    /// Emitted after a successful `synchronizeStorage` call (spec §4.5
    /// Synchronize Task).
    Synchronize,
}
