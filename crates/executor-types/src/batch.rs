//! Batches: the unit the coordinator executes and agrees on (spec §3).

use serde::{Deserialize, Serialize};

use crate::call::{CallLevel, CallRequest};

/// A contract-local, strictly monotonic batch of calls tied to a block
/// height upper bound (spec §3 "Batch").
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub batch_index: u64,
    pub block_height_upper_bound: u64,
    pub calls: Vec<CallRequest>,
}

/// Errors that indicate a [`Batch`] was built in violation of spec §3's
/// invariant ("all blockHeights inside are <= blockHeightUpperBound; within
/// a batch, MANUAL calls precede at most one AUTOMATIC call").
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchInvariantError {
    #[error("call {call_index} has block_height {block_height} above upper bound {upper_bound}")]
    BlockHeightAboveUpperBound { call_index: usize, block_height: u64, upper_bound: u64 },
    #[error("automatic call found at index {index}, which is not the last call in the batch")]
    AutomaticCallNotTail { index: usize },
    #[error("batch contains more than one automatic call")]
    MultipleAutomaticCalls,
}

impl Batch {
    pub fn new(
        batch_index: u64,
        block_height_upper_bound: u64,
        calls: Vec<CallRequest>,
    ) -> Result<Self, BatchInvariantError> {
        let batch = Self { batch_index, block_height_upper_bound, calls };
        batch.check_invariants()?;
        Ok(batch)
    }

    pub fn check_invariants(&self) -> Result<(), BatchInvariantError> {
        let mut seen_automatic = false;
        for (index, call) in self.calls.iter().enumerate() {
            if call.block_height > self.block_height_upper_bound {
                return Err(BatchInvariantError::BlockHeightAboveUpperBound {
                    call_index: index,
                    block_height: call.block_height,
                    upper_bound: self.block_height_upper_bound,
                });
            }
            if call.level == CallLevel::Automatic {
                if seen_automatic {
                    return Err(BatchInvariantError::MultipleAutomaticCalls);
                }
                if index != self.calls.len() - 1 {
                    return Err(BatchInvariantError::AutomaticCallNotTail { index });
                }
                seen_automatic = true;
            }
        }
        Ok(())
    }

    pub fn has_automatic_tail(&self) -> bool {
        self.calls.last().map(|c| c.level == CallLevel::Automatic).unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Drops the automatic tail, if present. Used when delaying a batch
    /// whose tail became invalid (spec §4.2 "delayBatch").
    pub fn drop_automatic_tail(&mut self) {
        if self.has_automatic_tail() {
            self.calls.pop();
        }
    }
}

/// Lifecycle status of a not-yet-finalized batch under assembly (spec §3
/// "DraftBatch").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DraftBatchStatus {
    /// Still accepting manual calls for this block height.
    AcceptingManual,
    /// Manual calls are closed; waiting on the autorun probe's result.
    AwaitingAutorun,
    /// The draft is complete and may be handed to Assembly's caller as the
    /// next batch.
    Finished,
}

/// A draft batch under assembly, keyed by block height (spec §3).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftBatch {
    pub block_height: u64,
    pub status: DraftBatchStatus,
    pub calls: Vec<CallRequest>,
}

impl DraftBatch {
    pub fn new(block_height: u64) -> Self {
        Self { block_height, status: DraftBatchStatus::AcceptingManual, calls: Vec::new() }
    }

    pub fn has_automatic_tail(&self) -> bool {
        self.calls.last().map(|c| c.level == CallLevel::Automatic).unwrap_or(false)
    }
}

#[cfg(test)]
mod batch_test {
    use super::*;
    use crate::ids::{CallId, CallerKey, ContractKey};

    fn manual_call(block_height: u64) -> CallRequest {
        CallRequest {
            call_id: CallId::zero(),
            contract_key: ContractKey::zero(),
            file: "f".into(),
            function: "g".into(),
            arguments: vec![],
            execution_payment: 1,
            download_payment: 1,
            caller_key: CallerKey::zero(),
            block_height,
            level: CallLevel::Manual,
            manual_info: None,
        }
    }

    fn automatic_call(block_height: u64) -> CallRequest {
        let mut c = manual_call(block_height);
        c.level = CallLevel::Automatic;
        c
    }

    #[test]
    fn rejects_call_above_upper_bound() {
        let err = Batch::new(0, 10, vec![manual_call(11)]).unwrap_err();
        assert_eq!(
            err,
            BatchInvariantError::BlockHeightAboveUpperBound {
                call_index: 0,
                block_height: 11,
                upper_bound: 10
            }
        );
    }

    #[test]
    fn rejects_automatic_call_not_at_tail() {
        let err = Batch::new(0, 10, vec![automatic_call(10), manual_call(10)]).unwrap_err();
        assert_eq!(err, BatchInvariantError::AutomaticCallNotTail { index: 0 });
    }

    #[test]
    fn accepts_manual_calls_followed_by_one_automatic_tail() {
        let batch = Batch::new(0, 10, vec![manual_call(9), manual_call(10), automatic_call(10)])
            .expect("valid batch");
        assert!(batch.has_automatic_tail());
    }

    #[test]
    fn drop_automatic_tail_removes_only_the_tail() {
        let mut batch =
            Batch::new(0, 10, vec![manual_call(9), automatic_call(10)]).expect("valid batch");
        batch.drop_automatic_tail();
        assert_eq!(batch.calls.len(), 1);
        assert!(!batch.has_automatic_tail());
    }
}
