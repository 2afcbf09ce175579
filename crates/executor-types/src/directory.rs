//! The executor directory (spec §3 "Executor directory").

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ids::ExecutorKey;
use crate::poex_types::{GroupElementBytes, ScalarBytes};

/// Per-peer bookkeeping mutated whenever the blockchain publishes a new
/// end-batch transaction naming this peer as a cosigner (spec §3, §4.5).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutorDirectoryEntry {
    pub initial_batch: u64,
    pub next_batch_to_approve: u64,
    /// `(T, r)` checkpoint of the peer's latest published proof, used as
    /// the replay starting point in `verifyProof` (spec §4.1).
    pub latest_batch_proof: Option<(GroupElementBytes, ScalarBytes)>,
}

impl ExecutorDirectoryEntry {
    pub fn new(initial_batch: u64) -> Self {
        Self { initial_batch, next_batch_to_approve: initial_batch, latest_batch_proof: None }
    }
}

/// Maps `ExecutorKey -> ExecutorDirectoryEntry` (spec §3).
pub type ExecutorDirectory = HashMap<ExecutorKey, ExecutorDirectoryEntry>;
