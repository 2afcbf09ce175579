//! Contract Coordinator (spec §4.5): single-threaded per-contract
//! dispatcher. Keeps at most one active task and owns the long-lived state
//! (Batch Assembly, the PoEx accumulator, the executor directory) that
//! outlives any one task.

use std::collections::HashMap;

use executor_config::ContractConfig;
use executor_poex::{PoExAccumulator, PoExKeyPair};
use executor_types::{
    ContractKey,
    DriveKey,
    EndBatchOpinion,
    ExecutorDirectory,
    ExecutorDirectoryEntry,
    ExecutorKey,
    PublishedEndBatchInfo,
    SuccessfulEndBatchOpinion,
    UnsuccessfulEndBatchOpinion,
};
use tracing::{debug, info};

use crate::aux_tasks::{InitTask, RemoveTask, SynchronizeTask};
use crate::execution_task::{BatchExecutionTask, TaskCommand, TaskEvent};
use crate::events::ContractEvent;
use crate::opinion_exchange::{log_rejection, validate_successful_opinion, validate_unsuccessful_opinion};

/// Which task currently holds the Coordinator's single active-task slot
/// (spec §4.5 "Keeps at most one active Task").
pub enum ActiveTask {
    None,
    Init(InitTask),
    Synchronize(SynchronizeTask),
    Remove(RemoveTask),
    BatchExecution(BatchExecutionTask),
}

impl ActiveTask {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    fn batch_index(&self) -> Option<u64> {
        match self {
            Self::BatchExecution(task) => Some(task.batch.batch_index),
            _ => None,
        }
    }
}

/// A command the Coordinator asks its owner to issue, unifying the
/// per-task command shapes behind one type so the event loop driving this
/// Coordinator only needs to match on one enum.
pub enum CoordinatorCommand {
    Task(TaskCommand),
    Init(crate::aux_tasks::InitCommand),
    Synchronize(crate::aux_tasks::SynchronizeCommand),
    Remove(crate::aux_tasks::RemoveOutcome),
    /// The autorun probe call Assembly asked for (spec §4.2 `addBlock`),
    /// dispatched outside any `BatchExecutionTask` since the probe result
    /// feeds back into Assembly itself via
    /// [`crate::assembly::BatchAssembly::resolve_autorun_probe`].
    ExecuteAutorunProbe { request: executor_types::CallRequest, gas_limit: u64 },
    Idle,
}

/// Single-threaded per-contract dispatcher (spec §4.5). Task succession on
/// completion: Remove > Synchronize > BatchExecution > idle.
pub struct ContractCoordinator {
    contract_key: ContractKey,
    drive_key: DriveKey,
    config: ContractConfig,
    peer_count: usize,

    pub assembly: crate::assembly::BatchAssembly,
    pub accumulator: PoExAccumulator,
    keypair: PoExKeyPair,
    pub directory: ExecutorDirectory,

    active: ActiveTask,
    remove_pending: bool,
    synchronize_pending: Option<(executor_types::StorageHash, u64)>,

    /// Peer PoEx public keys, known at deployment time (spec §4.4 validation
    /// needs the peer's raw curve point; the directory only tracks
    /// per-batch bookkeeping, not key material).
    peer_public_keys: HashMap<ExecutorKey, executor_types::GroupElementBytes>,

    buffered_successful: HashMap<u64, Vec<SuccessfulEndBatchOpinion>>,
    buffered_unsuccessful: HashMap<u64, Vec<UnsuccessfulEndBatchOpinion>>,
    buffered_publications: HashMap<u64, PublishedEndBatchInfo>,
    /// `(T, r)` checkpoints captured from the multisig this peer assembled
    /// for a batch, consumed once the matching `EndBatchExecutionPublished`
    /// arrives to update the executor directory (spec §4.5 "record the
    /// cosigners' (T, r) that appears in the published transaction").
    pending_checkpoints: HashMap<u64, Vec<(ExecutorKey, executor_types::GroupElementBytes, executor_types::ScalarBytes)>>,
}

impl ContractCoordinator {
    pub fn new(
        contract_key: ContractKey,
        drive_key: DriveKey,
        config: ContractConfig,
        peer_count: usize,
        assembly: crate::assembly::BatchAssembly,
        accumulator: PoExAccumulator,
        keypair: PoExKeyPair,
    ) -> Self {
        Self {
            contract_key,
            drive_key,
            config,
            peer_count,
            assembly,
            accumulator,
            keypair,
            directory: ExecutorDirectory::new(),
            active: ActiveTask::None,
            remove_pending: false,
            synchronize_pending: None,
            peer_public_keys: HashMap::new(),
            buffered_successful: HashMap::new(),
            buffered_unsuccessful: HashMap::new(),
            buffered_publications: HashMap::new(),
            pending_checkpoints: HashMap::new(),
        }
    }

    /// Runs once at contract bootstrap, before the steady-state
    /// Remove/Synchronize/BatchExecution dispatch in [`Self::advance`]
    /// applies (spec §4.5 "Init Task").
    pub fn start_init(&mut self, init: InitTask) -> crate::aux_tasks::InitCommand {
        let command = init.start();
        self.active = ActiveTask::Init(init);
        command
    }

    /// Registers a peer's PoEx public key, needed to validate its opinions
    /// and verify its proofs (spec §4.4).
    pub fn register_peer_public_key(&mut self, key: ExecutorKey, public_key: executor_types::GroupElementBytes) {
        self.peer_public_keys.insert(key, public_key);
    }

    pub fn request_removal(&mut self) {
        self.remove_pending = true;
    }

    pub fn request_synchronize(&mut self, target_storage_hash: executor_types::StorageHash, next_batch_index: u64) {
        self.synchronize_pending = Some((target_storage_hash, next_batch_index));
    }

    /// Task succession (spec §4.5): called whenever the active task slot is
    /// empty, in priority order Remove > Synchronize > BatchExecution > idle.
    pub fn advance(&mut self) -> CoordinatorCommand {
        if !self.active.is_none() {
            return CoordinatorCommand::Idle;
        }
        if self.remove_pending {
            self.remove_pending = false;
            self.active = ActiveTask::Remove(RemoveTask);
            let ActiveTask::Remove(task) = &self.active else { unreachable!() };
            return CoordinatorCommand::Remove(task.finalize());
        }
        if let Some((target_storage_hash, next_batch_index)) = self.synchronize_pending.take() {
            let modification_id =
                executor_collaborators::modification_id(&self.contract_key, next_batch_index);
            let task = SynchronizeTask::new(self.drive_key, modification_id, target_storage_hash, next_batch_index);
            let command = task.start();
            self.active = ActiveTask::Synchronize(task);
            return CoordinatorCommand::Synchronize(command);
        }
        if self.assembly.has_next_batch() {
            let batch = self.assembly.next_batch().expect("has_next_batch was checked");
            let batch_index = batch.batch_index;
            let mut task = BatchExecutionTask::new(self.contract_key, self.drive_key, batch, self.config.clone(), self.peer_count);
            let commands = task.start();
            self.active = ActiveTask::BatchExecution(task);
            return self
                .capture_and_forward(batch_index, commands)
                .into_iter()
                .next()
                .expect("start always issues at least one command");
        }
        CoordinatorCommand::Idle
    }

    /// Replays any buffered opinions/publication for `batch_index` into the
    /// active task (spec §4.5 "replayed into the new task in
    /// arrival-preserving order"). Called once the task has a freshly-formed
    /// local opinion to validate against — buffered opinions are accepted
    /// unvalidated while no local opinion exists yet (§9 Open Question
    /// "accept now, validate later"), so replaying any earlier than this
    /// would reject every one of them as `UnknownPeer`.
    fn replay_buffered_into_active(&mut self, batch_index: u64) -> Vec<TaskCommand> {
        let successful = self.buffered_successful.remove(&batch_index).unwrap_or_default();
        let unsuccessful = self.buffered_unsuccessful.remove(&batch_index).unwrap_or_default();
        let publication = self.buffered_publications.remove(&batch_index);

        let mut commands = Vec::new();
        let ActiveTask::BatchExecution(task) = &mut self.active else { return commands };
        for opinion in successful {
            let sender = opinion.executor_key;
            match validate_successful(&self.directory, &self.peer_public_keys, &self.accumulator, task, &opinion) {
                Ok(()) => commands.extend(task.handle_event(TaskEvent::PeerSuccessfulOpinionAccepted(opinion))),
                Err(rejection) => log_rejection(sender, batch_index, &rejection),
            }
        }
        for opinion in unsuccessful {
            let sender = opinion.executor_key;
            match validate_unsuccessful(&self.directory, &self.peer_public_keys, &self.accumulator, task, &opinion) {
                Ok(()) => commands.extend(task.handle_event(TaskEvent::PeerUnsuccessfulOpinionAccepted(opinion))),
                Err(rejection) => log_rejection(sender, batch_index, &rejection),
            }
        }
        if let Some(info) = publication {
            commands.extend(task.handle_event(TaskEvent::EndBatchExecutionPublished(info)));
        }
        commands
    }

    /// Captures `(T, r)` checkpoints out of an outgoing `EmitMultisig` /
    /// `EmitMultisigUnsuccessful` command before forwarding it, keyed by the
    /// batch the multisig is for (spec §4.5, see `pending_checkpoints`).
    fn capture_and_forward(&mut self, batch_index: u64, commands: Vec<TaskCommand>) -> Vec<CoordinatorCommand> {
        let mut forwarded = Vec::with_capacity(commands.len());
        for command in commands {
            if let TaskCommand::EmitMultisig { ref assembled, .. }
            | TaskCommand::EmitMultisigUnsuccessful { ref assembled, .. } = command
            {
                let checkpoints = assembled
                    .cosigners
                    .iter()
                    .zip(assembled.proofs.iter())
                    .map(|(key, proof)| (*key, proof.t, proof.r))
                    .collect();
                self.pending_checkpoints.insert(batch_index, checkpoints);
            }
            forwarded.push(CoordinatorCommand::Task(command));
        }
        forwarded
    }

    /// Evicts buffered entries below `assembly.min_batch_index()` (spec §5
    /// "Resource caps"; buffers are capped by eviction on
    /// `assembly.minBatchIndex()`).
    pub fn evict_stale_buffers(&mut self) {
        let floor = self.assembly.min_batch_index();
        self.buffered_successful.retain(|&index, _| index >= floor);
        self.buffered_unsuccessful.retain(|&index, _| index >= floor);
        self.buffered_publications.retain(|&index, _| index >= floor);
    }

    /// Updates the executor directory on every `EndBatchExecutionPublished`
    /// (spec §4.5: "for every cosigner, set nextBatchToApprove = batchIndex
    /// + 1, and record the cosigners' (T, r) ... as the latest checkpoint").
    fn update_directory(&mut self, info: &PublishedEndBatchInfo, checkpoints: &[(ExecutorKey, executor_types::GroupElementBytes, executor_types::ScalarBytes)]) {
        for &executor_key in &info.cosigners {
            let checkpoint = checkpoints.iter().find(|(key, ..)| *key == executor_key);
            let entry = self
                .directory
                .entry(executor_key)
                .or_insert_with(|| ExecutorDirectoryEntry::new(self.accumulator.initial_batch()));
            entry.next_batch_to_approve = info.batch_index + 1;
            if let Some((_, t, r)) = checkpoint {
                entry.latest_batch_proof = Some((*t, *r));
            }
        }
    }

    pub fn handle_event(&mut self, event: ContractEvent) -> Vec<CoordinatorCommand> {
        match event {
            ContractEvent::BlockPublished { height, .. } => {
                let outcome = self.assembly.add_block(
                    height,
                    &self.config.autorun_file,
                    &self.config.autorun_function,
                    self.config.autorun_gas_limit,
                );
                match outcome {
                    crate::assembly::AddBlockOutcome::NoProbeNeeded => Vec::new(),
                    crate::assembly::AddBlockOutcome::ProbeNeeded(probe) => {
                        vec![CoordinatorCommand::ExecuteAutorunProbe {
                            request: probe,
                            gas_limit: self.config.autorun_gas_limit,
                        }]
                    }
                }
            }
            ContractEvent::PeerOpinion { sender, opinion } => self.on_peer_opinion(sender, opinion),
            ContractEvent::EndBatchExecutionPublished(info) => self.on_end_batch_execution_published(info),
            ContractEvent::RemovalCompleted => {
                self.active = ActiveTask::None;
                Vec::new()
            }
            ContractEvent::SynchronizationCompleted { result, .. } => {
                let ActiveTask::Synchronize(task) = &self.active else { return Vec::new() };
                let commands = task.on_synchronize_storage(result);
                if let Some(crate::aux_tasks::SynchronizeCommand::SkipBatchesAndResetPoEx { next_batch_index }) =
                    commands.iter().find(|c| matches!(c, crate::aux_tasks::SynchronizeCommand::SkipBatchesAndResetPoEx { .. }))
                {
                    self.assembly.skip_batches(*next_batch_index);
                    self.accumulator.reset(*next_batch_index + 1);
                    self.active = ActiveTask::None;
                }
                commands.into_iter().map(CoordinatorCommand::Synchronize).collect()
            }
            ContractEvent::ActualModificationIdQueried { result } => {
                let ActiveTask::Init(init) = &self.active else { return Vec::new() };
                let command = init.on_actual_modification_id(result);
                if matches!(command, crate::aux_tasks::InitCommand::Done) {
                    self.active = ActiveTask::None;
                }
                vec![CoordinatorCommand::Init(command)]
            }
            other => {
                let Some(batch_index) = other.batch_index() else { return Vec::new() };
                self.route_to_active_task(batch_index, other)
            }
        }
    }

    /// Routes a peer opinion to the active task, validating it immediately
    /// if the task already has a local opinion to validate against;
    /// otherwise buffers it unvalidated for replay once one is formed (spec
    /// §9 "accept now, validate later" — see `DESIGN.md`).
    fn on_peer_opinion(&mut self, sender: ExecutorKey, opinion: EndBatchOpinion) -> Vec<CoordinatorCommand> {
        let batch_index = opinion.batch_index();
        if self.active.batch_index() == Some(batch_index) {
            let verdict = {
                let ActiveTask::BatchExecution(task) = &self.active else { return Vec::new() };
                match &opinion {
                    EndBatchOpinion::Successful(o) => task.local_successful().map(|_| {
                        validate_successful(&self.directory, &self.peer_public_keys, &self.accumulator, task, o)
                    }),
                    EndBatchOpinion::Unsuccessful(o) => task.local_unsuccessful().map(|_| {
                        validate_unsuccessful(&self.directory, &self.peer_public_keys, &self.accumulator, task, o)
                    }),
                }
            };
            match verdict {
                None => {
                    match opinion {
                        EndBatchOpinion::Successful(o) => {
                            self.buffered_successful.entry(batch_index).or_default().push(o)
                        }
                        EndBatchOpinion::Unsuccessful(o) => {
                            self.buffered_unsuccessful.entry(batch_index).or_default().push(o)
                        }
                    }
                    return Vec::new();
                }
                Some(Err(rejection)) => {
                    log_rejection(sender, batch_index, &rejection);
                    return Vec::new();
                }
                Some(Ok(())) => {}
            }
            debug!(%sender, batch_index, "routing peer opinion to active task");
            let event = match opinion {
                EndBatchOpinion::Successful(o) => TaskEvent::PeerSuccessfulOpinionAccepted(o),
                EndBatchOpinion::Unsuccessful(o) => TaskEvent::PeerUnsuccessfulOpinionAccepted(o),
            };
            let commands = {
                let ActiveTask::BatchExecution(task) = &mut self.active else { return Vec::new() };
                task.handle_event(event)
            };
            return self.capture_and_forward(batch_index, commands);
        }
        if batch_index < self.assembly.min_batch_index() {
            debug!(batch_index, "dropping opinion for a batch already past Assembly's floor");
            return Vec::new();
        }
        match opinion {
            EndBatchOpinion::Successful(o) => self.buffered_successful.entry(batch_index).or_default().push(o),
            EndBatchOpinion::Unsuccessful(o) => self.buffered_unsuccessful.entry(batch_index).or_default().push(o),
        }
        Vec::new()
    }

    fn on_end_batch_execution_published(&mut self, info: PublishedEndBatchInfo) -> Vec<CoordinatorCommand> {
        info!(batch_index = info.batch_index, success = info.batch_success, "end batch execution published");
        let checkpoints = self.pending_checkpoints.remove(&info.batch_index).unwrap_or_default();
        self.update_directory(&info, &checkpoints);

        if self.active.batch_index() == Some(info.batch_index) {
            let batch_index = info.batch_index;
            let (commands, done) = {
                let ActiveTask::BatchExecution(task) = &mut self.active else { return Vec::new() };
                let commands = task.handle_event(TaskEvent::EndBatchExecutionPublished(info));
                (commands, matches!(task.state(), crate::execution_task::TaskState::Done))
            };
            if done {
                self.active = ActiveTask::None;
                self.evict_stale_buffers();
            }
            return self.capture_and_forward(batch_index, commands);
        }

        let ActiveTask::Init(init) = &self.active else {
            self.buffered_publications.insert(info.batch_index, info);
            return Vec::new();
        };
        match init.on_end_batch_execution_published(&info) {
            crate::aux_tasks::InitCommand::TriggerSynchronize { target_storage_hash, next_batch_index } => {
                self.active = ActiveTask::None;
                self.request_synchronize(target_storage_hash, next_batch_index);
                Vec::new()
            }
            other => vec![CoordinatorCommand::Init(other)],
        }
    }

    /// Routes a batch-scoped collaborator reply to the active task. Two
    /// events additionally trigger opinion formation right here, since
    /// [`BatchExecutionTask::form_successful_opinion`] /
    /// `form_unsuccessful_opinion` need the accumulator and signing key the
    /// Coordinator owns (spec §4.3 steps 4 and the unsuccessful-timer path).
    fn route_to_active_task(&mut self, batch_index: u64, event: ContractEvent) -> Vec<CoordinatorCommand> {
        if self.active.batch_index() != Some(batch_index) {
            debug!(batch_index, "dropping stale batch-scoped event");
            return Vec::new();
        }
        let task_event = match event {
            ContractEvent::ModificationsInitiated { result, .. } => TaskEvent::ModificationsInitiated(result),
            ContractEvent::SandboxModificationInitiated { result, .. } => {
                TaskEvent::SandboxModificationInitiated(result)
            }
            ContractEvent::CallExecuted { result, .. } => TaskEvent::CallExecuted(result),
            ContractEvent::SandboxModificationApplied { result, .. } => {
                TaskEvent::SandboxModificationApplied(result)
            }
            ContractEvent::StorageHashEvaluated { result, .. } => TaskEvent::StorageHashEvaluated(result),
            ContractEvent::UnsuccessfulTimerFired { .. } => TaskEvent::UnsuccessfulTimerFired,
            ContractEvent::ApprovalExpectationTimerFired { .. } => TaskEvent::ApprovalExpectationTimerFired,
            _ => return Vec::new(),
        };
        let forms_successful_opinion = matches!(task_event, TaskEvent::StorageHashEvaluated(Ok(_)));
        let forms_unsuccessful_opinion = matches!(task_event, TaskEvent::UnsuccessfulTimerFired);

        let mut opinion_just_formed = false;
        let mut commands = {
            let ActiveTask::BatchExecution(task) = &mut self.active else { return Vec::new() };
            let mut commands = task.handle_event(task_event);

            if forms_successful_opinion
                && matches!(task.state(), crate::execution_task::TaskState::OpinionExchange)
            {
                let secret_data = task.batch.batch_index;
                commands.extend(task.form_successful_opinion(&mut self.accumulator, &self.keypair, secret_data));
                opinion_just_formed = true;
            }
            if forms_unsuccessful_opinion {
                let formed = task.form_unsuccessful_opinion(&self.accumulator, &self.keypair);
                opinion_just_formed |= !formed.is_empty();
                commands.extend(formed);
            }
            commands
        };

        // A local opinion just formed: replay anything buffered for this
        // batch (peer opinions, and a publication that arrived before this
        // task could compare against it) now that there is something to
        // validate it against.
        if opinion_just_formed {
            commands.extend(self.replay_buffered_into_active(batch_index));
        }

        let finished = {
            let ActiveTask::BatchExecution(task) = &self.active else {
                return self.capture_and_forward(batch_index, commands);
            };
            matches!(
                task.state(),
                crate::execution_task::TaskState::Abort | crate::execution_task::TaskState::Done
            )
        };
        if finished {
            self.active = ActiveTask::None;
            self.evict_stale_buffers();
        }
        self.capture_and_forward(batch_index, commands)
    }
}

/// Free functions rather than `&self` methods: called while `self.active` is
/// already borrowed mutably (to reach the task under validation), and a
/// `&self` receiver would borrow the whole coordinator instead of the
/// disjoint `directory`/`peer_public_keys`/`accumulator` fields these
/// actually read.
fn validate_successful(
    directory: &executor_types::ExecutorDirectory,
    peer_public_keys: &HashMap<ExecutorKey, executor_types::GroupElementBytes>,
    accumulator: &PoExAccumulator,
    task: &BatchExecutionTask,
    opinion: &SuccessfulEndBatchOpinion,
) -> Result<(), crate::errors::OpinionRejection> {
    let Some(local) = task.local_successful() else {
        return Err(crate::errors::OpinionRejection::UnknownPeer);
    };
    validate_successful_opinion(
        local,
        opinion,
        &task.batch.calls,
        directory.get(&opinion.executor_key),
        peer_public_keys.get(&opinion.executor_key).copied(),
        accumulator,
    )
}

fn validate_unsuccessful(
    directory: &executor_types::ExecutorDirectory,
    peer_public_keys: &HashMap<ExecutorKey, executor_types::GroupElementBytes>,
    accumulator: &PoExAccumulator,
    task: &BatchExecutionTask,
    opinion: &UnsuccessfulEndBatchOpinion,
) -> Result<(), crate::errors::OpinionRejection> {
    let Some(local) = task.local_unsuccessful() else {
        return Err(crate::errors::OpinionRejection::UnknownPeer);
    };
    validate_unsuccessful_opinion(
        local,
        opinion,
        &task.batch.calls,
        directory.get(&opinion.executor_key),
        peer_public_keys.get(&opinion.executor_key).copied(),
        accumulator,
    )
}

#[cfg(test)]
mod coordinator_test {
    use ark_ff::UniformRand;
    use executor_types::{CallId, CallerKey, CallLevel, CallRequest};
    use rand::thread_rng;

    use super::*;

    fn keypair() -> PoExKeyPair {
        let mut rng = thread_rng();
        PoExKeyPair::from_private_key(executor_poex::curve::Scalar::rand(&mut rng))
    }

    fn coordinator() -> ContractCoordinator {
        let contract_key = ContractKey::zero();
        ContractCoordinator::new(
            contract_key,
            DriveKey::zero(),
            ContractConfig::default(),
            4,
            crate::assembly::BatchAssembly::new(contract_key, 0),
            PoExAccumulator::new(0, 16, keypair()),
            keypair(),
        )
    }

    #[test]
    fn idle_when_assembly_has_no_next_batch() {
        let mut coordinator = coordinator();
        assert!(matches!(coordinator.advance(), CoordinatorCommand::Idle));
    }

    #[test]
    fn remove_takes_priority_over_everything() {
        let mut coordinator = coordinator();
        coordinator.assembly.add_manual_call(CallRequest {
            call_id: CallId::zero(),
            contract_key: ContractKey::zero(),
            file: "f".into(),
            function: "g".into(),
            arguments: vec![],
            execution_payment: 1,
            download_payment: 1,
            caller_key: CallerKey::zero(),
            block_height: 1,
            level: CallLevel::Manual,
            manual_info: None,
        });
        coordinator.assembly.add_block(1, "a.wasm", "run", 100);
        coordinator.request_removal();
        assert!(matches!(coordinator.advance(), CoordinatorCommand::Remove(_)));
    }

    #[test]
    fn stale_opinion_events_are_dropped_without_a_matching_active_task() {
        let mut coordinator = coordinator();
        let commands = coordinator.route_to_active_task(
            0,
            ContractEvent::StorageHashEvaluated { batch_index: 0, result: Err(executor_collaborators::StorageError::StorageUnavailable) },
        );
        assert!(commands.is_empty());
    }
}
