//! Error kinds internal to the coordinator (spec §7 "Error handling design").

use thiserror::Error;

/// Why a peer's opinion was rejected (spec §7 "invalid_peer_opinion:
/// silently rejected; opinion is dropped. Logged at warn level with the
/// specific failed field"). Never propagated past the task boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OpinionRejection {
    #[error("peer key is not present in the executor directory")]
    UnknownPeer,
    #[error("field {field} did not match the local opinion")]
    FieldMismatch { field: &'static str },
    #[error("call list length differs from the local opinion: local {local}, peer {peer}")]
    CallListLengthMismatch { local: usize, peer: usize },
    #[error("call {index} field {field} did not match the local opinion")]
    CallFieldMismatch { index: usize, field: &'static str },
    #[error("call {index} claims payment usage above the caller-declared cap")]
    PaymentAboveCap { index: usize },
    #[error("the peer's PoEx proof failed verification")]
    InvalidPoExProof,
    #[error("the opinion's signature does not verify against the executor's key")]
    InvalidSignature,
}

/// `signature_verification_failed` (spec §7): dropped before the opinion
/// ever reaches a task.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("inbound message signature verification failed")]
pub struct SignatureVerificationFailed;
