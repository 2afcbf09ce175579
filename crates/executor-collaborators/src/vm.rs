//! Virtual machine collaborator boundary, and the per-call handler surfaces
//! the VM invokes back into during execution (spec §6 "Virtual Machine
//! collaborator", §4.3 step 2, §5 "Resource caps").

use async_trait::async_trait;
#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use executor_types::{CallRequest, ServicePayment, TransactionHash};

use crate::errors::{HandlerError, VmError};
use crate::storage::SandboxHandle;

/// A transaction a call emitted during execution (spec §4.3 "if the call
/// emitted a transaction, aggregate-sign it and remember its hash").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmittedTransaction {
    pub hash: TransactionHash,
    pub payload: Vec<u8>,
}

/// `CallExecutionResult` (spec §6).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallExecutionResult {
    pub success: bool,
    pub return_code: i32,
    pub execution_gas_consumed: u64,
    pub download_gas_consumed: u64,
    pub proof_of_execution_secret_data: u64,
    pub transaction: Option<EmittedTransaction>,
}

/// `InternetQueryHandler`, bounded by `maxInternetConnections` and a
/// revocation-check effort cap (spec §5 "Resource caps"; the effort cap is
/// a supplemented feature grounded in `InternetUtils.h`/`.cpp`, see
/// `DESIGN.md`).
pub struct InternetQueryHandler {
    connections_remaining: u32,
    revocation_budget_remaining: u32,
}

impl InternetQueryHandler {
    pub fn new(max_connections: u32, revocation_check_budget: u32) -> Self {
        Self {
            connections_remaining: max_connections,
            revocation_budget_remaining: revocation_check_budget,
        }
    }

    /// Reserves one of the call's allotted internet connections.
    pub fn open_connection(&mut self) -> Result<(), HandlerError> {
        if self.connections_remaining == 0 {
            return Err(HandlerError::ConnectionBudgetExhausted);
        }
        self.connections_remaining -= 1;
        Ok(())
    }

    /// Charges one unit of the revocation-check effort budget.
    pub fn charge_revocation_check(&mut self) -> Result<(), HandlerError> {
        if self.revocation_budget_remaining == 0 {
            return Err(HandlerError::RevocationBudgetExhausted);
        }
        self.revocation_budget_remaining -= 1;
        Ok(())
    }
}

/// The manual/automatic split of the blockchain query surface a running
/// call sees (spec §4.3 "a `BlockchainQueryHandler` specialized for MANUAL
/// ... vs AUTOMATIC"; kept as one spec'd type, split internally per
/// `DESIGN.md`).
pub enum BlockchainQueryHandlerKind {
    Manual { transaction_hash: TransactionHash, service_payments: Vec<ServicePayment> },
    Automatic,
}

pub struct BlockchainQueryHandler {
    pub block_height: u64,
    pub kind: BlockchainQueryHandlerKind,
}

impl BlockchainQueryHandler {
    /// `None` for AUTOMATIC calls (spec §4.3: AUTOMATIC "omits them").
    pub fn transaction_hash(&self) -> Option<TransactionHash> {
        match &self.kind {
            BlockchainQueryHandlerKind::Manual { transaction_hash, .. } => Some(*transaction_hash),
            BlockchainQueryHandlerKind::Automatic => None,
        }
    }

    pub fn service_payments(&self) -> Option<&[ServicePayment]> {
        match &self.kind {
            BlockchainQueryHandlerKind::Manual { service_payments, .. } => {
                Some(service_payments.as_slice())
            }
            BlockchainQueryHandlerKind::Automatic => None,
        }
    }
}

/// The minimal query surface handed to the autorun probe: block hash and
/// generation time only, no payments (supplemented feature grounded in
/// `AutorunBlockchainQueryHandler.cpp`, see `DESIGN.md`).
pub struct AutorunBlockchainQueryHandler {
    pub block_height: u64,
    pub block_hash: executor_types::BlockHash,
    pub generation_time_ms: u64,
}

/// `StorageQueryHandler`: the sandbox wrapped with the call's configured
/// path prefix (spec §4.3). Owns its sandbox so it can cross the
/// `VirtualMachineClient` boundary by value.
pub struct StorageQueryHandler {
    sandbox: Box<dyn SandboxHandle>,
    path_prefix: String,
}

impl StorageQueryHandler {
    pub fn new(sandbox: Box<dyn SandboxHandle>, path_prefix: impl Into<String>) -> Self {
        Self { sandbox, path_prefix: path_prefix.into() }
    }

    fn prefixed(&self, path: &str) -> String {
        format!("{}/{}", self.path_prefix.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    pub async fn open(
        &mut self,
        path: &str,
        write: bool,
    ) -> Result<crate::storage::FileHandle, crate::errors::StorageError> {
        let prefixed = self.prefixed(path);
        self.sandbox.open(&prefixed, write).await
    }

    pub async fn path_exists(&mut self, path: &str) -> Result<bool, crate::errors::StorageError> {
        let prefixed = self.prefixed(path);
        self.sandbox.path_exists(&prefixed).await
    }
}

/// The full handler bundle passed into `executeCall`, invoked by the VM as
/// callbacks during execution (spec §6 "Handlers are callbacks invoked by
/// the VM during execution").
pub struct CallHandlers {
    pub internet: InternetQueryHandler,
    pub blockchain: BlockchainQueryHandler,
    pub storage: StorageQueryHandler,
}

/// `executeCall` (spec §6 "Virtual Machine collaborator").
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait VirtualMachineClient: Send + Sync {
    async fn execute_call(
        &self,
        request: CallRequest,
        gas_limit: u64,
        handlers: CallHandlers,
    ) -> Result<CallExecutionResult, VmError>;
}
