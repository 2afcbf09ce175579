//! Wire types for the Proof-of-Execution accumulator (spec §3, §4.1).
//!
//! This crate only carries the serializable shapes. The scalar/group-element
//! arithmetic lives in `executor-poex`, which converts to and from these
//! opaque byte wrappers at its boundary — the same separation the teacher
//! draws between `starknet_api`'s wire types and `blockifier`'s arithmetic.

use serde::{Deserialize, Serialize};

/// A compressed point on the PoEx curve (spec §4.1: "group-element ... types
/// over a prime-order curve"). Opaque here; `executor-poex` interprets the
/// bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupElementBytes(pub [u8; 33]);

impl std::fmt::Debug for GroupElementBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GroupElementBytes(0x{})", hex::encode(self.0))
    }
}

/// A scalar on the PoEx curve.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScalarBytes(pub [u8; 32]);

impl std::fmt::Debug for ScalarBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ScalarBytes(0x{})", hex::encode(self.0))
    }
}

/// The per-batch verification info `Y` that on-chain observers and peers use
/// to validate a PoEx proof at or after this batch (spec §4.1 "Verification
/// Info").
pub type PoExVerificationInfo = GroupElementBytes;

/// A Schnorr-style replay proof over the accumulator history (spec §4.1
/// "buildActualProof / buildPreviousProof / verifyProof").
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoExProof {
    pub initial_batch: u64,
    pub t: GroupElementBytes,
    pub r: ScalarBytes,
    pub f: GroupElementBytes,
    pub k: ScalarBytes,
}
