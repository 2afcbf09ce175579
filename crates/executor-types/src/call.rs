//! Call requests (spec §3 "CallRequest").

use serde::{Deserialize, Serialize};

use crate::ids::{CallId, CallerKey, ContractKey, TransactionHash};

/// How a call entered the system. Determines the query surface the VM sees
/// (spec §4.3) and whether it may appear at most once as the "automatic
/// tail" of a batch (spec §3 "Batch" invariant).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallLevel {
    /// Submitted by a caller with an on-chain transaction backing it.
    Manual,
    /// The synthesized tail call appended to a batch by an autorun probe
    /// that returned success (spec §4.2 "addBlock").
    Automatic,
    /// The synthetic, never-persisted probe call used to decide whether an
    /// [`CallLevel::Automatic`] call should be appended (spec §4.2).
    Autorun,
}

/// Payment information that only exists for [`CallLevel::Manual`] calls
/// (spec §3).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualCallInfo {
    pub transaction_hash: TransactionHash,
    pub service_payments: Vec<ServicePayment>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePayment {
    pub service: CallerKey,
    pub amount: u64,
}

/// An immutable request to execute one WASM function against a contract's
/// drive (spec §3).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRequest {
    pub call_id: CallId,
    pub contract_key: ContractKey,
    pub file: String,
    pub function: String,
    pub arguments: Vec<u8>,
    pub execution_payment: u64,
    pub download_payment: u64,
    pub caller_key: CallerKey,
    pub block_height: u64,
    pub level: CallLevel,
    /// Present iff `level == Manual`.
    pub manual_info: Option<ManualCallInfo>,
}

impl CallRequest {
    pub fn is_manual(&self) -> bool {
        self.level == CallLevel::Manual
    }

    /// Builds the deterministic autorun probe call for a given contract and
    /// block height (spec §4.2: "a synthetic WASM call whose callId is a
    /// deterministic hash over (contractKey, height)").
    pub fn autorun_probe(
        contract_key: ContractKey,
        block_height: u64,
        file: String,
        function: String,
        gas_limit: u64,
        probe_call_id: CallId,
    ) -> Self {
        Self {
            call_id: probe_call_id,
            contract_key,
            file,
            function,
            arguments: Vec::new(),
            execution_payment: gas_limit,
            download_payment: 0,
            caller_key: CallerKey::zero(),
            block_height,
            level: CallLevel::Autorun,
            manual_info: None,
        }
    }
}
