//! The Proof-of-Execution cumulative accumulator (spec §4.1).
//!
//! `executor-types` carries the wire shapes (`PoExProof`, `GroupElementBytes`,
//! `ScalarBytes`); this crate carries the curve arithmetic and converts to
//! and from those byte wrappers at its boundary, mirroring the split the
//! teacher draws between `starknet_api` types and `blockifier` computation.

pub mod accumulator;
pub mod curve;
pub mod nonce;
pub mod signing;

use executor_types::{ExecutorDirectoryEntry, ExecutorKey, PoExProof as WirePoExProof};
use thiserror::Error;

pub use accumulator::{DirectoryCheckpoint, PoExAccumulator, PoExKeyPair, Proof};
pub use curve::CurveCodecError;
pub use signing::{sign_message, verify_signature};

/// A wire-level PoEx proof together with the per-batch verification info
/// needed to check it (spec §4.1, §6 "over the wire").
#[derive(Error, Debug)]
pub enum PoExError {
    #[error("malformed curve data in a PoEx proof or directory entry: {0}")]
    Malformed(#[from] CurveCodecError),
}

/// Verifies a wire-encoded PoEx proof against a peer's directory entry,
/// without requiring callers outside this crate to touch curve types
/// directly (spec §4.1 `verifyProof`, invoked from opinion validation in
/// `executor-core`).
pub fn verify_wire_proof(
    accumulator: &PoExAccumulator,
    peer_key_bytes: &executor_types::GroupElementBytes,
    peer_directory_entry: &ExecutorDirectoryEntry,
    proof: &WirePoExProof,
    batch_id: u64,
    verification_info: &executor_types::GroupElementBytes,
) -> Result<bool, PoExError> {
    let peer_key = curve::point_from_bytes(peer_key_bytes)?;
    let checkpoint = DirectoryCheckpoint::from_wire(peer_directory_entry)?;
    let proof = Proof::from_wire(proof)?;
    let verification_info = curve::point_from_bytes(verification_info)?;
    Ok(accumulator.verify_proof(peer_key, &checkpoint, &proof, batch_id, verification_info))
}

/// Used only to keep `ExecutorKey` linked to the PoEx public-key type at the
/// API boundary; the accumulator itself is keyed by raw curve material.
pub type PeerKey = ExecutorKey;

#[cfg(test)]
mod lib_test {
    use ark_ff::UniformRand;
    use rand::thread_rng;

    use super::*;

    #[test]
    fn wire_round_trip_verifies() {
        let mut rng = thread_rng();
        let keypair = PoExKeyPair::from_private_key(curve::Scalar::rand(&mut rng));
        let mut acc = PoExAccumulator::new(0, 16, keypair);
        let y = acc.add_to_proof(42);
        let y_point = curve::point_from_bytes(&y).unwrap();
        acc.add_batch_verification_information(0, y_point);
        let proof = acc.build_actual_proof().to_wire();

        let peer_key_bytes = curve::point_to_bytes(&acc.public_key());
        let entry = ExecutorDirectoryEntry::new(0);

        let ok = verify_wire_proof(&acc, &peer_key_bytes, &entry, &proof, 0, &y).unwrap();
        assert!(ok);
    }
}
