//! The off-chain smart-contract Execution Coordinator: Batch Assembly
//! (spec §4.2), the Batch Execution Task pipeline (spec §4.3), Opinion
//! Exchange (spec §4.4), and the per-contract Coordinator and its
//! auxiliary tasks (spec §4.5).

pub mod assembly;
pub mod aux_tasks;
pub mod coordinator;
pub mod errors;
pub mod events;
pub mod execution_task;
pub mod opinion_exchange;

pub use assembly::{AddBlockOutcome, AutorunProbeResult, BatchAssembly};
pub use aux_tasks::{InitCommand, InitTask, RemoveOutcome, RemoveTask, SynchronizeCommand, SynchronizeTask};
pub use coordinator::{ActiveTask, ContractCoordinator, CoordinatorCommand};
pub use errors::{OpinionRejection, SignatureVerificationFailed};
pub use events::ContractEvent;
pub use execution_task::{BatchExecutionTask, TaskCommand, TaskEvent, TaskState};
pub use opinion_exchange::{
    assemble_successful_multisig,
    assemble_unsuccessful_multisig,
    enough_opinions,
    log_rejection,
    validate_successful_opinion,
    validate_unsuccessful_opinion,
    AssembledMultisig,
    ExecutorParticipation,
};
