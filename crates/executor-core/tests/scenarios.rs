//! End-to-end scenarios over the public `ContractCoordinator` surface: a
//! happy-path batch reaching quorum, a storage-hash mismatch triggering
//! synchronization, a peer opinion that arrives before the local one exists,
//! and a mid-batch storage outage that aborts and restarts the batch.

use ark_ff::UniformRand;
use executor_collaborators::{
    CallExecutionResult,
    SandboxModificationHandle,
    StorageError,
    StorageHashResult,
    StorageModificationHandle,
};
use executor_config::ContractConfig;
use executor_core::{BatchAssembly, ContractCoordinator, ContractEvent, CoordinatorCommand, TaskCommand};
use executor_poex::curve::{point_from_bytes, point_to_bytes, Scalar};
use executor_poex::{PoExAccumulator, PoExKeyPair};
use executor_types::{
    CallId,
    CallLevel,
    CallRequest,
    CallerKey,
    ContractKey,
    DriveKey,
    EndBatchOpinion,
    ExecutorDirectoryEntry,
    ExecutorKey,
    PublishedEndBatchInfo,
    StorageHash,
    SuccessfulCallExecutionOpinion,
    SuccessfulEndBatchOpinion,
};
use rand::thread_rng;

fn keypair() -> PoExKeyPair {
    PoExKeyPair::from_private_key(Scalar::rand(&mut thread_rng()))
}

fn executor_key_for(keypair: &PoExKeyPair) -> ExecutorKey {
    let bytes = point_to_bytes(&keypair.public_key);
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes.0[..32]);
    ExecutorKey::from(key)
}

fn manual_call(height: u64) -> CallRequest {
    CallRequest {
        call_id: CallId::from([1u8; 32]),
        contract_key: ContractKey::zero(),
        file: "main.wasm".into(),
        function: "run".into(),
        arguments: vec![],
        execution_payment: 100,
        download_payment: 100,
        caller_key: CallerKey::zero(),
        block_height: height,
        level: CallLevel::Manual,
        manual_info: None,
    }
}

fn new_coordinator(peer_count: usize) -> ContractCoordinator {
    let contract_key = ContractKey::zero();
    let local_keypair = keypair();
    ContractCoordinator::new(
        contract_key,
        DriveKey::zero(),
        ContractConfig::default(),
        peer_count,
        BatchAssembly::new(contract_key, 0),
        PoExAccumulator::new(0, 16, local_keypair),
        local_keypair,
    )
}

fn successful_execution() -> CallExecutionResult {
    CallExecutionResult {
        success: true,
        return_code: 0,
        execution_gas_consumed: 10,
        download_gas_consumed: 5,
        proof_of_execution_secret_data: 0,
        transaction: None,
    }
}

/// Drives one call's worth of the pipeline from `InitiateModifications`
/// through the `ArmUnsuccessfulTimer`/`ArmShareOpinionTimer`/`ShareOpinion`
/// triple that follows a successful `StorageHashEvaluated`, returning those
/// final commands.
fn run_single_call_batch_to_opinion_exchange(
    coordinator: &mut ContractCoordinator,
    storage_hash: StorageHash,
) -> Vec<CoordinatorCommand> {
    coordinator.handle_event(ContractEvent::ModificationsInitiated {
        batch_index: 0,
        result: Ok(StorageModificationHandle([0u8; 32])),
    });
    coordinator.handle_event(ContractEvent::SandboxModificationInitiated {
        batch_index: 0,
        call_index: 0,
        result: Ok(SandboxModificationHandle(0)),
    });
    coordinator.handle_event(ContractEvent::CallExecuted {
        batch_index: 0,
        call_index: 0,
        result: Ok(successful_execution()),
    });
    coordinator.handle_event(ContractEvent::SandboxModificationApplied {
        batch_index: 0,
        call_index: 0,
        result: Ok(()),
    });
    coordinator.handle_event(ContractEvent::StorageHashEvaluated {
        batch_index: 0,
        result: Ok(StorageHashResult { storage_hash, used_size: 10, meta_size: 1, fs_tree_size: 11 }),
    })
}

fn find_local_successful(commands: &[CoordinatorCommand]) -> SuccessfulEndBatchOpinion {
    commands
        .iter()
        .find_map(|c| match c {
            CoordinatorCommand::Task(TaskCommand::ShareOpinion(EndBatchOpinion::Successful(o))) => {
                Some(o.clone())
            }
            _ => None,
        })
        .expect("a local opinion must have been formed and shared")
}

/// Builds a second, independently-keyed peer opinion that genuinely
/// verifies against the coordinator's own accumulator: `Y = addToProof(batch
/// index)` is identical across independently-keyed executors for the same
/// batch index, so replaying the same `addToProof`/
/// `addBatchVerificationInformation`/`buildActualProof` sequence under the
/// peer's own keypair produces a proof that verifies under the peer's own
/// public key.
fn honest_peer_opinion(
    peer_kp: &PoExKeyPair,
    peer_key: ExecutorKey,
    batch_index: u64,
    contract_key: ContractKey,
    automatic_executions_checked_up_to: u64,
    storage_hash: StorageHash,
    used_size: u64,
    meta_size: u64,
    calls_execution_info: Vec<SuccessfulCallExecutionOpinion>,
) -> SuccessfulEndBatchOpinion {
    let mut peer_acc = PoExAccumulator::new(0, 16, *peer_kp);
    let verification_info = peer_acc.add_to_proof(batch_index);
    let verification_point = point_from_bytes(&verification_info).expect("freshly produced point");
    peer_acc.add_batch_verification_information(batch_index, verification_point);
    let proof = peer_acc.build_actual_proof().to_wire();

    let mut opinion = SuccessfulEndBatchOpinion {
        contract_key,
        batch_index,
        automatic_executions_checked_up_to,
        storage_hash,
        used_size,
        meta_size,
        poex_verification_info: verification_info,
        calls_execution_info,
        proof,
        executor_key: peer_key,
        signature: executor_types::Signature::zero(),
    };
    let signing_bytes = executor_types::opinion::canonical::successful_signing_bytes(&opinion);
    opinion.signature = executor_poex::sign_message(peer_kp, &signing_bytes);
    opinion
}

/// S1: two executors, one manual call, VM success, storage hashes agree,
/// quorum reached, multisig emitted, publication commits storage and
/// advances the directory.
#[test]
fn s1_happy_path_single_call_reaches_quorum_and_commits() {
    let mut coordinator = new_coordinator(2);

    let peer_kp = keypair();
    let peer_key = executor_key_for(&peer_kp);
    coordinator.directory.insert(peer_key, ExecutorDirectoryEntry::new(0));
    coordinator.register_peer_public_key(peer_key, point_to_bytes(&peer_kp.public_key));

    coordinator.assembly.add_manual_call(manual_call(10));
    coordinator.assembly.add_block(10, "main.wasm", "autorun", 1_000_000);

    let start = coordinator.advance();
    assert!(matches!(start, CoordinatorCommand::Task(TaskCommand::InitiateModifications { .. })));

    let storage_hash = StorageHash::from([7u8; 32]);
    let commands = run_single_call_batch_to_opinion_exchange(&mut coordinator, storage_hash);
    assert!(matches!(
        commands.as_slice(),
        [
            CoordinatorCommand::Task(TaskCommand::ArmUnsuccessfulTimer),
            CoordinatorCommand::Task(TaskCommand::ArmShareOpinionTimer),
            CoordinatorCommand::Task(TaskCommand::ShareOpinion(EndBatchOpinion::Successful(_))),
        ]
    ));
    let local_opinion = find_local_successful(&commands);

    let peer_opinion = honest_peer_opinion(
        &peer_kp,
        peer_key,
        local_opinion.batch_index,
        local_opinion.contract_key,
        local_opinion.automatic_executions_checked_up_to,
        local_opinion.storage_hash,
        local_opinion.used_size,
        local_opinion.meta_size,
        local_opinion.calls_execution_info.clone(),
    );
    assert_eq!(peer_opinion.poex_verification_info, local_opinion.poex_verification_info);

    let commands = coordinator.handle_event(ContractEvent::PeerOpinion {
        sender: peer_key,
        opinion: EndBatchOpinion::Successful(peer_opinion.clone()),
    });
    assert!(matches!(
        commands.as_slice(),
        [CoordinatorCommand::Task(TaskCommand::ArmApprovalExpectationTimer { successful: true })]
    ));

    let commands = coordinator.handle_event(ContractEvent::ApprovalExpectationTimerFired { batch_index: 0 });
    let assembled = commands
        .iter()
        .find_map(|c| match c {
            CoordinatorCommand::Task(TaskCommand::EmitMultisig { assembled, .. }) => Some(assembled.clone()),
            _ => None,
        })
        .expect("quorum reached, multisig must be emitted");
    assert_eq!(assembled.cosigners.len(), 2);
    assert!(assembled.cosigners.contains(&peer_key));

    let local_key = local_opinion.executor_key;
    let commands = coordinator.handle_event(ContractEvent::EndBatchExecutionPublished(PublishedEndBatchInfo {
        batch_index: 0,
        automatic_executions_checked_up_to: local_opinion.automatic_executions_checked_up_to,
        automatic_executions_enabled_since: None,
        batch_success: true,
        drive_state: storage_hash,
        poex_verification_info: local_opinion.poex_verification_info,
        cosigners: vec![local_key, peer_key],
    }));
    assert!(matches!(
        commands.as_slice(),
        [CoordinatorCommand::Task(TaskCommand::ApplyStorageModification { accept: true, .. })]
    ));

    assert_eq!(coordinator.directory.get(&local_key).map(|e| e.next_batch_to_approve), Some(1));
    assert_eq!(coordinator.directory.get(&peer_key).map(|e| e.next_batch_to_approve), Some(1));
}

/// S2: the published drive state disagrees with the local one. The task
/// enqueues a Synchronize task instead of committing; once synchronization
/// succeeds, Assembly is skipped forward and PoEx is reset, freeing the
/// active-task slot for the next batch.
#[test]
fn s2_published_mismatch_triggers_synchronize() {
    let mut coordinator = new_coordinator(2);
    coordinator.assembly.add_manual_call(manual_call(10));
    coordinator.assembly.add_block(10, "main.wasm", "autorun", 1_000_000);
    coordinator.advance();

    let local_hash = StorageHash::from([7u8; 32]);
    let commands = run_single_call_batch_to_opinion_exchange(&mut coordinator, local_hash);
    let local_opinion = find_local_successful(&commands);

    let published_hash = StorageHash::from([9u8; 32]);
    let commands = coordinator.handle_event(ContractEvent::EndBatchExecutionPublished(PublishedEndBatchInfo {
        batch_index: 0,
        automatic_executions_checked_up_to: local_opinion.automatic_executions_checked_up_to,
        automatic_executions_enabled_since: None,
        batch_success: true,
        drive_state: published_hash,
        poex_verification_info: local_opinion.poex_verification_info,
        cosigners: vec![],
    }));
    assert!(matches!(
        commands.as_slice(),
        [CoordinatorCommand::Task(TaskCommand::EnqueueSynchronizeTask { target_storage_hash }) ]
            if *target_storage_hash == published_hash
    ));

    coordinator.request_synchronize(published_hash, 1);
    let cmd = coordinator.advance();
    assert!(matches!(
        cmd,
        CoordinatorCommand::Synchronize(executor_core::SynchronizeCommand::SynchronizeStorage {
            target_storage_hash,
            ..
        }) if target_storage_hash == published_hash
    ));

    let commands = coordinator.handle_event(ContractEvent::SynchronizationCompleted {
        target_storage_hash: published_hash,
        result: Ok(()),
    });
    assert_eq!(commands.len(), 2, "EmitSingleTransaction + SkipBatchesAndResetPoEx");

    // The active slot must have been released: Assembly has nothing queued,
    // so the next `advance()` goes idle rather than re-running Synchronize.
    assert!(matches!(coordinator.advance(), CoordinatorCommand::Idle));
    assert_eq!(coordinator.accumulator.initial_batch(), 2);
}

/// S5: a peer's opinion for a batch arrives before any local task for that
/// batch even exists. It must be buffered unvalidated and replayed once the
/// local opinion forms, counting toward quorum synchronously rather than
/// requiring the peer to resend it.
#[test]
fn s5_peer_opinion_arriving_before_local_task_is_buffered_then_replayed() {
    let mut coordinator = new_coordinator(2);
    let peer_kp = keypair();
    let peer_key = executor_key_for(&peer_kp);
    coordinator.directory.insert(peer_key, ExecutorDirectoryEntry::new(0));
    coordinator.register_peer_public_key(peer_key, point_to_bytes(&peer_kp.public_key));

    let storage_hash = StorageHash::from([7u8; 32]);
    let call = manual_call(10);
    let call_execution_info = SuccessfulCallExecutionOpinion {
        call_id: call.call_id,
        is_manual: true,
        status: 0,
        released_transaction_hash: None,
        execution_payment_used: 10,
        download_payment_used: 5,
    };
    let peer_opinion = honest_peer_opinion(
        &peer_kp,
        peer_key,
        0,
        ContractKey::zero(),
        10,
        storage_hash,
        10,
        1,
        vec![call_execution_info],
    );

    let commands = coordinator.handle_event(ContractEvent::PeerOpinion {
        sender: peer_key,
        opinion: EndBatchOpinion::Successful(peer_opinion),
    });
    assert!(commands.is_empty(), "no active task yet: the opinion must be buffered, not dropped");

    coordinator.assembly.add_manual_call(call);
    coordinator.assembly.add_block(10, "main.wasm", "autorun", 1_000_000);
    coordinator.advance();

    let commands = run_single_call_batch_to_opinion_exchange(&mut coordinator, storage_hash);
    assert!(
        commands.iter().any(|c| matches!(
            c,
            CoordinatorCommand::Task(TaskCommand::ArmApprovalExpectationTimer { successful: true })
        )),
        "the buffered peer opinion must replay synchronously and push the batch over quorum"
    );
}

/// S6: storage becomes unavailable while applying a call's sandbox
/// modification. The task aborts, hands the batch back to Assembly, and a
/// fresh task restarts the same batch from the beginning once re-queued.
#[test]
fn s6_storage_unavailable_mid_batch_aborts_and_restarts() {
    let mut coordinator = new_coordinator(2);
    coordinator.assembly.add_manual_call(manual_call(10));
    coordinator.assembly.add_block(10, "main.wasm", "autorun", 1_000_000);
    coordinator.advance();

    coordinator.handle_event(ContractEvent::ModificationsInitiated {
        batch_index: 0,
        result: Ok(StorageModificationHandle([0u8; 32])),
    });
    coordinator.handle_event(ContractEvent::SandboxModificationInitiated {
        batch_index: 0,
        call_index: 0,
        result: Ok(SandboxModificationHandle(0)),
    });
    coordinator.handle_event(ContractEvent::CallExecuted {
        batch_index: 0,
        call_index: 0,
        result: Ok(successful_execution()),
    });
    let commands = coordinator.handle_event(ContractEvent::SandboxModificationApplied {
        batch_index: 0,
        call_index: 0,
        result: Err(StorageError::StorageUnavailable),
    });

    let batch = commands
        .iter()
        .find_map(|c| match c {
            CoordinatorCommand::Task(TaskCommand::ReturnBatchToAssembly(batch)) => Some(batch.clone()),
            _ => None,
        })
        .expect("aborting must hand the batch back to Assembly");
    assert!(commands.iter().any(|c| matches!(
        c,
        CoordinatorCommand::Task(TaskCommand::ArmServiceUnavailableRetryTimer)
    )));
    assert_eq!(batch.batch_index, 0);

    coordinator.assembly.delay_batch(batch);
    assert!(coordinator.assembly.has_next_batch());

    let restart = coordinator.advance();
    assert!(
        matches!(restart, CoordinatorCommand::Task(TaskCommand::InitiateModifications { .. })),
        "a fresh task must restart the same batch from the beginning"
    );
}
