//! Batch Execution Task (spec §4.3): the per-batch pipeline state machine.
//!
//! Every cross-collaborator call is modeled as a [`TaskCommand`] the task
//! asks its owner (the Contract Coordinator) to issue, and every reply or
//! external trigger arrives as a [`TaskEvent`] fed back into
//! [`BatchExecutionTask::handle_event`] — the async-query-handle /
//! single-threaded-event-loop model of spec §5, kept explicit so the task
//! itself never blocks or owns an executor.

use executor_collaborators::{
    BlockchainQueryHandlerKind,
    CallExecutionResult,
    EmittedTransaction,
    ModificationId,
    SandboxModificationHandle,
    StorageError,
    StorageHashResult,
    StorageModificationHandle,
    VmError,
};
use executor_config::ContractConfig;
use executor_poex::{PoExAccumulator, PoExKeyPair};
use executor_types::{
    Batch,
    CallRequest,
    ContractKey,
    DriveKey,
    EndBatchOpinion,
    PublishedEndBatchInfo,
    SingleTransactionKind,
    StorageHash,
    SuccessfulCallExecutionOpinion,
    SuccessfulEndBatchOpinion,
    UnsuccessfulEndBatchOpinion,
};
use tracing::{debug, instrument};

use crate::opinion_exchange::{
    assemble_successful_multisig,
    assemble_unsuccessful_multisig,
    enough_opinions,
    AssembledMultisig,
};

/// `INIT → SANDBOXING → EXECUTING_CALL_i → APPLYING_CALL_i → ... →
/// HASHING → OPINION_EXCHANGE → (PUBLISHED_OK | PUBLISHED_FAIL |
/// PUBLISHED_MISMATCH) → DONE`, terminal shortcut `ABORT` (spec §4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Init,
    Sandboxing { call_index: usize },
    ExecutingCall { call_index: usize },
    ApplyingCall { call_index: usize },
    Hashing,
    OpinionExchange,
    PublishedOk,
    PublishedFail,
    PublishedMismatch,
    Done,
    Abort,
}

/// Outgoing requests to collaborators, or to the owning Coordinator (spec
/// §5 "drives deterministic outgoing requests to the collaborators").
#[derive(Debug)]
pub enum TaskCommand {
    InitiateModifications { drive_key: DriveKey, modification_id: ModificationId },
    InitiateSandboxModification { modification: StorageModificationHandle },
    ExecuteCall { call_index: usize, request: CallRequest, gas_limit: u64, blockchain_handler: BlockchainQueryHandlerKind },
    ApplySandboxModification { sandbox: SandboxModificationHandle, accept: bool },
    EvaluateStorageHash { modification: StorageModificationHandle },
    ApplyStorageModification { modification: StorageModificationHandle, accept: bool },
    ShareOpinion(EndBatchOpinion),
    ArmUnsuccessfulTimer,
    ArmShareOpinionTimer,
    ArmApprovalExpectationTimer { successful: bool },
    EmitMultisig { successful: bool, assembled: AssembledMultisig, info: SuccessfulEndBatchOpinion },
    EmitMultisigUnsuccessful { assembled: AssembledMultisig, info: UnsuccessfulEndBatchOpinion },
    EmitSingleTransaction { kind: SingleTransactionKind },
    ReleaseTransactions(Vec<EmittedTransaction>),
    ReturnBatchToAssembly(Batch),
    ArmServiceUnavailableRetryTimer,
    EnqueueSynchronizeTask { target_storage_hash: StorageHash },
}

/// Events delivered back into the task (spec §5).
#[derive(Debug)]
pub enum TaskEvent {
    ModificationsInitiated(Result<StorageModificationHandle, StorageError>),
    SandboxModificationInitiated(Result<SandboxModificationHandle, StorageError>),
    CallExecuted(Result<CallExecutionResult, VmError>),
    SandboxModificationApplied(Result<(), StorageError>),
    StorageHashEvaluated(Result<StorageHashResult, StorageError>),
    PeerSuccessfulOpinionAccepted(SuccessfulEndBatchOpinion),
    PeerUnsuccessfulOpinionAccepted(UnsuccessfulEndBatchOpinion),
    UnsuccessfulTimerFired,
    ApprovalExpectationTimerFired,
    EndBatchExecutionPublished(PublishedEndBatchInfo),
}

/// The per-batch pipeline (spec §4.3). Owns the in-flight storage
/// modification handle and its own timers; the PoEx accumulator and signing
/// key are borrowed from the Coordinator for the duration of opinion
/// formation (spec §3 "Ownership").
pub struct BatchExecutionTask {
    pub contract_key: ContractKey,
    pub drive_key: DriveKey,
    pub batch: Batch,
    pub config: ContractConfig,
    pub peer_count: usize,

    state: TaskState,
    modification: Option<StorageModificationHandle>,
    sandboxes: Vec<Option<SandboxModificationHandle>>,
    calls_execution_info: Vec<SuccessfulCallExecutionOpinion>,
    released_transactions: Vec<EmittedTransaction>,
    storage_result: Option<StorageHashResult>,
    pending_execution: Option<CallExecutionResult>,

    local_successful: Option<SuccessfulEndBatchOpinion>,
    local_unsuccessful: Option<UnsuccessfulEndBatchOpinion>,
    accepted_successful: Vec<SuccessfulEndBatchOpinion>,
    accepted_unsuccessful: Vec<UnsuccessfulEndBatchOpinion>,
    successful_quorum_reached: bool,
    unsuccessful_quorum_reached: bool,
    /// Whether a multisig transaction has already been handed to the
    /// blockchain client for this batch (spec §4.3 "the *Sent* flag").
    sent: bool,
}

impl BatchExecutionTask {
    pub fn new(
        contract_key: ContractKey,
        drive_key: DriveKey,
        batch: Batch,
        config: ContractConfig,
        peer_count: usize,
    ) -> Self {
        let n = batch.calls.len();
        Self {
            contract_key,
            drive_key,
            batch,
            config,
            peer_count,
            state: TaskState::Init,
            modification: None,
            sandboxes: vec![None; n],
            calls_execution_info: Vec::with_capacity(n),
            released_transactions: Vec::new(),
            storage_result: None,
            pending_execution: None,
            local_successful: None,
            local_unsuccessful: None,
            accepted_successful: Vec::new(),
            accepted_unsuccessful: Vec::new(),
            successful_quorum_reached: false,
            unsuccessful_quorum_reached: false,
            sent: false,
        }
    }

    pub fn state(&self) -> &TaskState {
        &self.state
    }

    pub fn local_successful(&self) -> Option<&SuccessfulEndBatchOpinion> {
        self.local_successful.as_ref()
    }

    pub fn local_unsuccessful(&self) -> Option<&UnsuccessfulEndBatchOpinion> {
        self.local_unsuccessful.as_ref()
    }

    fn modification_id(&self) -> ModificationId {
        executor_collaborators::modification_id(&self.contract_key, self.batch.batch_index)
    }

    /// Step 1: `initiateModifications` (spec §4.3).
    #[instrument(skip(self), fields(batch_index = self.batch.batch_index, contract_key = %self.contract_key))]
    pub fn start(&mut self) -> Vec<TaskCommand> {
        debug!("batch execution task starting");
        vec![TaskCommand::InitiateModifications {
            drive_key: self.drive_key,
            modification_id: self.modification_id(),
        }]
    }

    fn gas_limit_for(&self, call_index: usize) -> u64 {
        self.batch.calls[call_index].execution_payment.saturating_mul(self.config.payment_multiplier)
    }

    fn blockchain_handler_for(&self, call_index: usize) -> BlockchainQueryHandlerKind {
        let call = &self.batch.calls[call_index];
        match &call.manual_info {
            Some(info) => BlockchainQueryHandlerKind::Manual {
                transaction_hash: info.transaction_hash,
                service_payments: info.service_payments.clone(),
            },
            None => BlockchainQueryHandlerKind::Automatic,
        }
    }

    fn caller_declared_caps(&self, call_index: usize) -> (u64, u64) {
        let call = &self.batch.calls[call_index];
        (call.execution_payment, call.download_payment)
    }

    /// Handles one event, returning the commands it produces. This is the
    /// sole entry point once [`Self::start`] has been called.
    pub fn handle_event(&mut self, event: TaskEvent) -> Vec<TaskCommand> {
        match event {
            TaskEvent::ModificationsInitiated(result) => self.on_modifications_initiated(result),
            TaskEvent::SandboxModificationInitiated(result) => {
                self.on_sandbox_modification_initiated(result)
            }
            TaskEvent::CallExecuted(result) => self.on_call_executed(result),
            TaskEvent::SandboxModificationApplied(result) => {
                self.on_sandbox_modification_applied(result)
            }
            TaskEvent::StorageHashEvaluated(result) => self.on_storage_hash_evaluated(result),
            TaskEvent::PeerSuccessfulOpinionAccepted(opinion) => {
                self.on_peer_successful_opinion(opinion)
            }
            TaskEvent::PeerUnsuccessfulOpinionAccepted(opinion) => {
                self.on_peer_unsuccessful_opinion(opinion)
            }
            TaskEvent::UnsuccessfulTimerFired => self.on_unsuccessful_timer(),
            TaskEvent::ApprovalExpectationTimerFired => self.on_approval_expectation_timer(),
            TaskEvent::EndBatchExecutionPublished(info) => self.on_end_batch_execution_published(info),
        }
    }

    fn on_modifications_initiated(
        &mut self,
        result: Result<StorageModificationHandle, StorageError>,
    ) -> Vec<TaskCommand> {
        match result {
            Ok(handle) => {
                self.modification = Some(handle);
                self.begin_next_call(0)
            }
            Err(StorageError::StorageUnavailable) => self.abort_for_retry(),
            Err(_) => self.abort_for_retry(),
        }
    }

    fn begin_next_call(&mut self, index: usize) -> Vec<TaskCommand> {
        if index >= self.batch.calls.len() {
            self.state = TaskState::Hashing;
            let modification = self.modification.expect("modification initiated before hashing");
            return vec![TaskCommand::EvaluateStorageHash { modification }];
        }
        self.state = TaskState::Sandboxing { call_index: index };
        let modification = self.modification.expect("modification initiated before sandboxing");
        vec![TaskCommand::InitiateSandboxModification { modification }]
    }

    fn on_sandbox_modification_initiated(
        &mut self,
        result: Result<SandboxModificationHandle, StorageError>,
    ) -> Vec<TaskCommand> {
        let TaskState::Sandboxing { call_index } = self.state else {
            return Vec::new();
        };
        match result {
            Ok(sandbox) => {
                self.sandboxes[call_index] = Some(sandbox);
                self.state = TaskState::ExecutingCall { call_index };
                vec![TaskCommand::ExecuteCall {
                    call_index,
                    request: self.batch.calls[call_index].clone(),
                    gas_limit: self.gas_limit_for(call_index),
                    blockchain_handler: self.blockchain_handler_for(call_index),
                }]
            }
            Err(_) => self.abort_for_retry(),
        }
    }

    fn on_call_executed(&mut self, result: Result<CallExecutionResult, VmError>) -> Vec<TaskCommand> {
        let TaskState::ExecutingCall { call_index } = self.state else {
            return Vec::new();
        };
        match result {
            Ok(execution) => {
                self.state = TaskState::ApplyingCall { call_index };
                let sandbox = self.sandboxes[call_index].expect("sandbox initiated before executing");
                let accept = execution.success;
                self.pending_execution = Some(execution);
                vec![TaskCommand::ApplySandboxModification { sandbox, accept }]
            }
            Err(VmError::ServiceUnavailable) => self.abort_for_retry(),
            Err(_) => self.abort_for_retry(),
        }
    }

    fn on_sandbox_modification_applied(
        &mut self,
        result: Result<(), StorageError>,
    ) -> Vec<TaskCommand> {
        let TaskState::ApplyingCall { call_index } = self.state else {
            return Vec::new();
        };
        if result.is_err() {
            return self.abort_for_retry();
        }
        let execution = self.pending_execution.take().expect("call executed before applying");
        let (execution_payment, download_payment) = self.caller_declared_caps(call_index);
        let multiplier = self.config.payment_multiplier.max(1);
        let actual_execution_payment =
            div_ceil(execution.execution_gas_consumed, multiplier).min(execution_payment);
        let actual_download_payment =
            div_ceil(execution.download_gas_consumed, multiplier).min(download_payment);

        let call = &self.batch.calls[call_index];
        self.calls_execution_info.push(SuccessfulCallExecutionOpinion {
            call_id: call.call_id,
            is_manual: call.is_manual(),
            status: if execution.success { 0 } else { 1 },
            released_transaction_hash: execution.transaction.as_ref().map(|t| t.hash),
            execution_payment_used: actual_execution_payment,
            download_payment_used: actual_download_payment,
        });
        if let Some(transaction) = execution.transaction {
            self.released_transactions.push(transaction);
        }
        self.begin_next_call(call_index + 1)
    }

    fn on_storage_hash_evaluated(
        &mut self,
        result: Result<StorageHashResult, StorageError>,
    ) -> Vec<TaskCommand> {
        match result {
            Ok(hash_result) => {
                self.storage_result = Some(hash_result);
                self.state = TaskState::OpinionExchange;
                vec![TaskCommand::ArmUnsuccessfulTimer, TaskCommand::ArmShareOpinionTimer]
            }
            Err(_) => self.abort_for_retry(),
        }
    }

    /// Step 4: `formSuccessfulEndBatchOpinion` (spec §4.3). Consumes
    /// `poex.addToProof(secretData)`; the commands it returns tell the
    /// Coordinator to share the opinion.
    pub fn form_successful_opinion(
        &mut self,
        accumulator: &mut PoExAccumulator,
        keypair: &PoExKeyPair,
        secret_data: u64,
    ) -> Vec<TaskCommand> {
        let hash_result = self.storage_result.expect("hashing completed before opinion formation");
        let verification_info = accumulator.add_to_proof(secret_data);
        let verification_point =
            executor_poex::curve::point_from_bytes(&verification_info).expect("freshly produced point");
        accumulator.add_batch_verification_information(self.batch.batch_index, verification_point);
        let proof = accumulator.build_actual_proof().to_wire();

        let mut opinion = SuccessfulEndBatchOpinion {
            contract_key: self.contract_key,
            batch_index: self.batch.batch_index,
            automatic_executions_checked_up_to: self.batch.block_height_upper_bound,
            storage_hash: hash_result.storage_hash,
            used_size: hash_result.used_size,
            meta_size: hash_result.meta_size,
            poex_verification_info: verification_info,
            calls_execution_info: self.calls_execution_info.clone(),
            proof,
            executor_key: keypair_to_executor_key(keypair),
            signature: executor_types::Signature::zero(),
        };
        let signing_bytes = executor_types::opinion::canonical::successful_signing_bytes(&opinion);
        opinion.signature = executor_poex::sign_message(keypair, &signing_bytes);

        self.local_successful = Some(opinion.clone());
        vec![TaskCommand::ShareOpinion(EndBatchOpinion::Successful(opinion))]
    }

    /// The `unsuccessfulExecutionTimer` firing (spec §4.3): synthesizes an
    /// `UnsuccessfulEndBatchOpinion` reusing the call list but using
    /// `poex.buildPreviousProof()`.
    fn on_unsuccessful_timer(&mut self) -> Vec<TaskCommand> {
        vec![TaskCommand::ArmApprovalExpectationTimer { successful: false }]
    }

    /// Forms the unsuccessful opinion; called by the Coordinator with the
    /// accumulator/keypair borrowed, mirroring [`Self::form_successful_opinion`].
    pub fn form_unsuccessful_opinion(
        &mut self,
        accumulator: &PoExAccumulator,
        keypair: &PoExKeyPair,
    ) -> Vec<TaskCommand> {
        if self.local_successful.is_some() {
            return Vec::new();
        }
        let proof = accumulator.build_previous_proof().to_wire();
        let mut opinion = UnsuccessfulEndBatchOpinion {
            contract_key: self.contract_key,
            batch_index: self.batch.batch_index,
            automatic_executions_checked_up_to: self.batch.block_height_upper_bound,
            calls_execution_info: self.calls_execution_info.clone(),
            proof,
            executor_key: keypair_to_executor_key(keypair),
            signature: executor_types::Signature::zero(),
        };
        let signing_bytes = executor_types::opinion::canonical::unsuccessful_signing_bytes(&opinion);
        opinion.signature = executor_poex::sign_message(keypair, &signing_bytes);

        self.local_unsuccessful = Some(opinion.clone());
        vec![TaskCommand::ShareOpinion(EndBatchOpinion::Unsuccessful(opinion))]
    }

    fn on_peer_successful_opinion(&mut self, opinion: SuccessfulEndBatchOpinion) -> Vec<TaskCommand> {
        self.accepted_successful.push(opinion);
        if !self.successful_quorum_reached
            && enough_opinions(self.accepted_successful.len() + 1, self.peer_count)
        {
            self.successful_quorum_reached = true;
            return vec![TaskCommand::ArmApprovalExpectationTimer { successful: true }];
        }
        Vec::new()
    }

    fn on_peer_unsuccessful_opinion(&mut self, opinion: UnsuccessfulEndBatchOpinion) -> Vec<TaskCommand> {
        self.accepted_unsuccessful.push(opinion);
        if !self.unsuccessful_quorum_reached
            && self.local_unsuccessful.is_some()
            && enough_opinions(self.accepted_unsuccessful.len() + 1, self.peer_count)
        {
            self.unsuccessful_quorum_reached = true;
            return vec![TaskCommand::ArmApprovalExpectationTimer { successful: false }];
        }
        Vec::new()
    }

    fn on_approval_expectation_timer(&mut self) -> Vec<TaskCommand> {
        if self.sent {
            return Vec::new();
        }
        if self.successful_quorum_reached {
            if let Some(local) = &self.local_successful {
                let assembled = assemble_successful_multisig(local, &self.accepted_successful);
                self.sent = true;
                return vec![TaskCommand::EmitMultisig {
                    successful: true,
                    assembled,
                    info: local.clone(),
                }];
            }
        } else if self.unsuccessful_quorum_reached {
            if let Some(local) = &self.local_unsuccessful {
                let assembled = assemble_unsuccessful_multisig(local, &self.accepted_unsuccessful);
                self.sent = true;
                return vec![TaskCommand::EmitMultisigUnsuccessful { assembled, info: local.clone() }];
            }
        }
        Vec::new()
    }

    /// `onEndBatchExecutionPublished` (spec §4.3 "Publication
    /// reconciliation"): three outcomes.
    fn on_end_batch_execution_published(&mut self, info: PublishedEndBatchInfo) -> Vec<TaskCommand> {
        if !info.batch_success {
            self.state = TaskState::PublishedFail;
            self.state = TaskState::Done;
            let modification = self.modification.expect("modification exists by publication time");
            return vec![TaskCommand::ApplyStorageModification { modification, accept: false }];
        }

        let local_matches = self
            .local_successful
            .as_ref()
            .is_some_and(|local| local.storage_hash == info.drive_state);
        if local_matches {
            self.state = TaskState::PublishedOk;
            self.state = TaskState::Done;
            let modification = self.modification.expect("modification exists by publication time");
            let mut commands = Vec::new();
            if !self.released_transactions.is_empty() {
                commands.push(TaskCommand::ReleaseTransactions(std::mem::take(
                    &mut self.released_transactions,
                )));
            }
            commands.push(TaskCommand::ApplyStorageModification { modification, accept: true });
            let local_key = self.local_successful.as_ref().map(|o| o.executor_key);
            if local_key.is_some_and(|key| !info.cosigners.contains(&key)) {
                commands.push(TaskCommand::EmitSingleTransaction { kind: SingleTransactionKind::EndBatch });
            }
            commands
        } else {
            self.state = TaskState::PublishedMismatch;
            self.state = TaskState::Done;
            vec![TaskCommand::EnqueueSynchronizeTask { target_storage_hash: info.drive_state }]
        }
    }

    fn abort_for_retry(&mut self) -> Vec<TaskCommand> {
        self.state = TaskState::Abort;
        vec![
            TaskCommand::ReturnBatchToAssembly(self.batch.clone()),
            TaskCommand::ArmServiceUnavailableRetryTimer,
        ]
    }
}

fn div_ceil(value: u64, divisor: u64) -> u64 {
    value.div_ceil(divisor.max(1))
}

fn keypair_to_executor_key(keypair: &PoExKeyPair) -> executor_types::ExecutorKey {
    let bytes = executor_poex::curve::point_to_bytes(&keypair.public_key);
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes.0[..32]);
    executor_types::ExecutorKey::from(key)
}
