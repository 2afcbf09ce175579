//! Opinions: signed per-executor claims about a batch outcome (spec §3,
//! §4.4, §6).

use serde::{Deserialize, Serialize};

use crate::ids::{CallId, ContractKey, ExecutorKey, Signature, StorageHash, TransactionHash};
use crate::poex_types::{PoExProof, PoExVerificationInfo};

/// One executor's view of a single call inside a batch (spec §3
/// "SuccessfulCallExecutionOpinion").
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessfulCallExecutionOpinion {
    pub call_id: CallId,
    pub is_manual: bool,
    /// `0` on success, `1` on sandbox failure (spec §4.3).
    pub status: u16,
    pub released_transaction_hash: Option<TransactionHash>,
    pub execution_payment_used: u64,
    pub download_payment_used: u64,
}

/// A signed, fully-formed opinion that the batch succeeded (spec §3
/// "SuccessfulEndBatchOpinion").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SuccessfulEndBatchOpinion {
    pub contract_key: ContractKey,
    pub batch_index: u64,
    pub automatic_executions_checked_up_to: u64,
    pub storage_hash: StorageHash,
    pub used_size: u64,
    pub meta_size: u64,
    pub poex_verification_info: PoExVerificationInfo,
    pub calls_execution_info: Vec<SuccessfulCallExecutionOpinion>,
    pub proof: PoExProof,
    pub executor_key: ExecutorKey,
    pub signature: Signature,
}

/// The delayed fallback opinion formed when no quorum on success is reached
/// within `unsuccessfulApprovalDelayMs` (spec §3
/// "UnsuccessfulEndBatchOpinion"). Carries the same call list but strips the
/// storage/hash fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnsuccessfulEndBatchOpinion {
    pub contract_key: ContractKey,
    pub batch_index: u64,
    pub automatic_executions_checked_up_to: u64,
    pub calls_execution_info: Vec<SuccessfulCallExecutionOpinion>,
    pub proof: PoExProof,
    pub executor_key: ExecutorKey,
    pub signature: Signature,
}

/// Either shape of end-batch opinion, as received over the wire tagged by
/// messenger tag (spec §6: `SUCCESSFUL_END_BATCH` / `UNSUCCESSFUL_END_BATCH`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EndBatchOpinion {
    Successful(SuccessfulEndBatchOpinion),
    Unsuccessful(UnsuccessfulEndBatchOpinion),
}

impl EndBatchOpinion {
    pub fn batch_index(&self) -> u64 {
        match self {
            Self::Successful(o) => o.batch_index,
            Self::Unsuccessful(o) => o.batch_index,
        }
    }

    pub fn executor_key(&self) -> ExecutorKey {
        match self {
            Self::Successful(o) => o.executor_key,
            Self::Unsuccessful(o) => o.executor_key,
        }
    }

    pub fn signature(&self) -> Signature {
        match self {
            Self::Successful(o) => o.signature,
            Self::Unsuccessful(o) => o.signature,
        }
    }
}

/// Serializes an opinion's fields in exactly the order the signature covers
/// (spec §6 "Canonical opinion serialization"):
///
/// `contractKey, batchIndex, storageHash, usedSize, metaSize,
/// PoExVerificationInfo, foreach call {callId, isManual, status,
/// releasedTransactionHash}, PoExProof, foreach call
/// {executionPaymentUsed, downloadPaymentUsed}`.
///
/// For the unsuccessful shape, `storageHash`/`usedSize`/`metaSize` are
/// omitted and `PoExVerificationInfo` is the identity element (spec §4.4:
/// "the zero batch contribution case").
pub mod canonical {
    use super::*;

    fn push_call_head(buf: &mut Vec<u8>, call: &SuccessfulCallExecutionOpinion) {
        buf.extend_from_slice(&call.call_id.0);
        buf.push(call.is_manual as u8);
        buf.extend_from_slice(&call.status.to_le_bytes());
        match &call.released_transaction_hash {
            Some(hash) => {
                buf.push(1);
                buf.extend_from_slice(&hash.0);
            }
            None => buf.push(0),
        }
    }

    fn push_call_tail(buf: &mut Vec<u8>, call: &SuccessfulCallExecutionOpinion) {
        buf.extend_from_slice(&call.execution_payment_used.to_le_bytes());
        buf.extend_from_slice(&call.download_payment_used.to_le_bytes());
    }

    fn push_proof(buf: &mut Vec<u8>, proof: &PoExProof) {
        buf.extend_from_slice(&proof.initial_batch.to_le_bytes());
        buf.extend_from_slice(&proof.t.0);
        buf.extend_from_slice(&proof.r.0);
        buf.extend_from_slice(&proof.f.0);
        buf.extend_from_slice(&proof.k.0);
    }

    /// Bytes covered by [`SuccessfulEndBatchOpinion::signature`].
    pub fn successful_signing_bytes(opinion: &SuccessfulEndBatchOpinion) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&opinion.contract_key.0);
        buf.extend_from_slice(&opinion.batch_index.to_le_bytes());
        buf.extend_from_slice(&opinion.storage_hash.0);
        buf.extend_from_slice(&opinion.used_size.to_le_bytes());
        buf.extend_from_slice(&opinion.meta_size.to_le_bytes());
        buf.extend_from_slice(&opinion.poex_verification_info.0);
        for call in &opinion.calls_execution_info {
            push_call_head(&mut buf, call);
        }
        push_proof(&mut buf, &opinion.proof);
        for call in &opinion.calls_execution_info {
            push_call_tail(&mut buf, call);
        }
        buf
    }

    /// Bytes covered by [`UnsuccessfulEndBatchOpinion::signature`].
    pub fn unsuccessful_signing_bytes(opinion: &UnsuccessfulEndBatchOpinion) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&opinion.contract_key.0);
        buf.extend_from_slice(&opinion.batch_index.to_le_bytes());
        for call in &opinion.calls_execution_info {
            push_call_head(&mut buf, call);
        }
        push_proof(&mut buf, &opinion.proof);
        for call in &opinion.calls_execution_info {
            push_call_tail(&mut buf, call);
        }
        buf
    }
}

#[cfg(test)]
mod opinion_test {
    use super::*;
    use crate::poex_types::{GroupElementBytes, ScalarBytes};

    fn sample_call() -> SuccessfulCallExecutionOpinion {
        SuccessfulCallExecutionOpinion {
            call_id: CallId([1u8; 32]),
            is_manual: true,
            status: 0,
            released_transaction_hash: Some(TransactionHash([2u8; 32])),
            execution_payment_used: 10,
            download_payment_used: 5,
        }
    }

    fn sample_proof() -> PoExProof {
        PoExProof {
            initial_batch: 0,
            t: GroupElementBytes([3u8; 33]),
            r: ScalarBytes([4u8; 32]),
            f: GroupElementBytes([5u8; 33]),
            k: ScalarBytes([6u8; 32]),
        }
    }

    fn sample_opinion() -> SuccessfulEndBatchOpinion {
        SuccessfulEndBatchOpinion {
            contract_key: ContractKey::zero(),
            batch_index: 3,
            automatic_executions_checked_up_to: 9,
            storage_hash: StorageHash([9u8; 32]),
            used_size: 100,
            meta_size: 7,
            poex_verification_info: GroupElementBytes([8u8; 33]),
            calls_execution_info: vec![sample_call()],
            proof: sample_proof(),
            executor_key: ExecutorKey::zero(),
            signature: Signature([0u8; 64]),
        }
    }

    #[test]
    fn signing_bytes_are_deterministic_across_equal_opinions() {
        let a = canonical::successful_signing_bytes(&sample_opinion());
        let b = canonical::successful_signing_bytes(&sample_opinion());
        assert_eq!(a, b);
    }

    #[test]
    fn tampering_with_a_single_scalar_changes_the_signing_bytes() {
        let base = canonical::successful_signing_bytes(&sample_opinion());
        let mut tampered = sample_opinion();
        tampered.used_size += 1;
        let changed = canonical::successful_signing_bytes(&tampered);
        assert_ne!(base, changed);
    }
}
