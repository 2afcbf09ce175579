//! The PoEx cumulative accumulator (spec §4.1).

use std::collections::VecDeque;

use executor_types::{ExecutorDirectoryEntry, GroupElementBytes, PoExProof as WirePoExProof};
use tracing::{debug, trace, warn};

use crate::curve::{
    self,
    add,
    base_point,
    fiat_shamir_challenge,
    hash_u64_to_scalar,
    mul,
    point_from_bytes,
    point_to_bytes,
    schnorr_challenge,
    scalar_from_bytes,
    scalar_to_bytes,
    sub,
    Point,
    Scalar,
};
use crate::nonce::{derive_v, derive_w};

/// This executor's PoEx signing material (spec §4.1 "selfPubKey").
#[derive(Clone, Copy)]
pub struct PoExKeyPair {
    pub private_key: Scalar,
    pub public_key: Point,
}

impl PoExKeyPair {
    pub fn from_private_key(private_key: Scalar) -> Self {
        Self { private_key, public_key: mul(&base_point(), private_key) }
    }
}

/// A proof as produced by `buildActualProof`/`buildPreviousProof` (spec
/// §4.1), in curve-native form.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Proof {
    pub initial_batch: u64,
    pub t: Point,
    pub r: Scalar,
    pub f: Point,
    pub k: Scalar,
}

impl Proof {
    pub fn to_wire(self) -> WirePoExProof {
        WirePoExProof {
            initial_batch: self.initial_batch,
            t: point_to_bytes(&self.t),
            r: scalar_to_bytes(&self.r),
            f: point_to_bytes(&self.f),
            k: scalar_to_bytes(&self.k),
        }
    }

    pub fn from_wire(wire: &WirePoExProof) -> Result<Self, crate::curve::CurveCodecError> {
        Ok(Self {
            initial_batch: wire.initial_batch,
            t: point_from_bytes(&wire.t)?,
            r: scalar_from_bytes(&wire.r)?,
            f: point_from_bytes(&wire.f)?,
            k: scalar_from_bytes(&wire.k)?,
        })
    }
}

/// The replay checkpoint a verifier uses as its starting reference, derived
/// from a peer's directory entry (spec §4.1 `verifyProof`, §3 "Executor
/// directory").
#[derive(Clone, Copy, Default)]
pub struct DirectoryCheckpoint {
    pub initial_batch: u64,
    pub next_batch_to_approve: u64,
    pub latest_batch_proof: Option<(Point, Scalar)>,
}

impl DirectoryCheckpoint {
    pub fn from_wire(entry: &ExecutorDirectoryEntry) -> Result<Self, crate::curve::CurveCodecError> {
        let latest_batch_proof = match &entry.latest_batch_proof {
            Some((t, r)) => Some((point_from_bytes(t)?, scalar_from_bytes(r)?)),
            None => None,
        };
        Ok(Self {
            initial_batch: entry.initial_batch,
            next_batch_to_approve: entry.next_batch_to_approve,
            latest_batch_proof,
        })
    }
}

/// The cumulative commitment over per-batch random scalars (spec §3 "PoEx
/// state per executor", §4.1).
pub struct PoExAccumulator {
    x: Scalar,
    x_prev: Scalar,
    initial_batch: u64,
    /// `batchIndex -> verification info Y`, capped by `history_cap`, oldest
    /// evicted first (spec §3 invariant `|history| <= historyCap`).
    history: VecDeque<(u64, Point)>,
    history_cap: usize,
    keypair: PoExKeyPair,
}

impl PoExAccumulator {
    pub fn new(initial_batch: u64, history_cap: usize, keypair: PoExKeyPair) -> Self {
        use ark_ff::Zero;
        Self {
            x: Scalar::zero(),
            x_prev: Scalar::zero(),
            initial_batch,
            history: VecDeque::new(),
            history_cap,
            keypair,
        }
    }

    pub fn initial_batch(&self) -> u64 {
        self.initial_batch
    }

    pub fn public_key(&self) -> Point {
        self.keypair.public_key
    }

    /// `addToProof(digest) -> Y` (spec §4.1).
    pub fn add_to_proof(&mut self, digest: u64) -> GroupElementBytes {
        let alpha = hash_u64_to_scalar(digest);
        let base = base_point();
        let y = mul(&base, alpha);
        let c = fiat_shamir_challenge(&base, &y, &self.keypair.public_key);
        self.x_prev = self.x;
        self.x += c * alpha;
        trace!("poex accumulator advanced");
        point_to_bytes(&y)
    }

    /// `popFromProof()` (spec §4.1): undoes the last `addToProof`, used when
    /// the published batch turned out unsuccessful (spec §4.3 "Published
    /// unsuccessful rollback").
    pub fn pop_from_proof(&mut self) {
        self.x = self.x_prev;
    }

    /// `buildActualProof()` (spec §4.1).
    pub fn build_actual_proof(&self) -> Proof {
        self.build_proof_from(self.x)
    }

    /// `buildPreviousProof()` (spec §4.1), used to form an
    /// `UnsuccessfulEndBatchOpinion` (spec §4.3).
    pub fn build_previous_proof(&self) -> Proof {
        self.build_proof_from(self.x_prev)
    }

    fn build_proof_from(&self, s: Scalar) -> Proof {
        let base = base_point();
        let v = derive_v(&self.keypair.private_key, &s);
        let t = mul(&base, v);
        let r = v - s;
        let w = derive_w(&self.keypair.private_key, &s);
        let f = mul(&base, w);
        let d = schnorr_challenge(&f, &t, &self.keypair.public_key);
        let k = w - d * v;
        Proof { initial_batch: self.initial_batch, t, r, f, k }
    }

    /// `addBatchVerificationInformation(batchId, Y)` (spec §4.1): appends,
    /// evicting the oldest entry if the cap is exceeded.
    pub fn add_batch_verification_information(&mut self, batch_id: u64, y: Point) {
        self.history.push_back((batch_id, y));
        while self.history.len() > self.history_cap {
            self.history.pop_front();
        }
    }

    /// `reset(nextBatch)` (spec §4.1), invoked by the Synchronize Task.
    pub fn reset(&mut self, next_batch: u64) {
        use ark_ff::Zero;
        self.x = Scalar::zero();
        self.x_prev = Scalar::zero();
        self.initial_batch = next_batch;
        self.history.clear();
        debug!(next_batch, "poex accumulator reset");
    }

    fn history_lookup(&self, batch_id: u64) -> Option<Point> {
        self.history.iter().find(|(id, _)| *id == batch_id).map(|(_, y)| *y)
    }

    /// `verifyProof(peerKey, peerDirectoryEntry, proof, batchId,
    /// verificationInfo) -> bool` (spec §4.1). Never fatal: the only
    /// verifier-visible failure is returning `false` (spec §4.1 "Failure
    /// semantics").
    pub fn verify_proof(
        &self,
        peer_key: Point,
        peer_directory_entry: &DirectoryCheckpoint,
        proof: &Proof,
        batch_id: u64,
        verification_info: Point,
    ) -> bool {
        // Schnorr check: F == k*B + d*T.
        let base = base_point();
        let d = schnorr_challenge(&proof.f, &proof.t, &peer_key);
        let rhs = add(&mul(&base, proof.k), &mul(&proof.t, d));
        if proof.f != rhs {
            warn!("poex proof failed inner schnorr check");
            return false;
        }

        let Some((verify_start, prev_t, prev_r)) =
            self.select_replay_start(proof, peer_directory_entry)
        else {
            warn!("poex proof has no usable replay starting point");
            return false;
        };
        if verify_start > batch_id {
            warn!(verify_start, batch_id, "poex proof initial batch is after the target batch");
            return false;
        }

        let mut right = mul(&base, proof.r - prev_r);
        for batch in verify_start..=batch_id {
            let y_i = if batch == batch_id {
                Some(verification_info)
            } else {
                self.history_lookup(batch)
            };
            let Some(y_i) = y_i else {
                warn!(batch, "poex verification missing historical verification info");
                return false;
            };
            let c_i = fiat_shamir_challenge(&base, &y_i, &peer_key);
            right = add(&right, &mul(&y_i, c_i));
        }

        let left = sub(&proof.t, &prev_t);
        left == right
    }

    fn select_replay_start(
        &self,
        proof: &Proof,
        peer_directory_entry: &DirectoryCheckpoint,
    ) -> Option<(u64, Point, Scalar)> {
        if proof.initial_batch == peer_directory_entry.initial_batch {
            Some((peer_directory_entry.initial_batch, curve::identity(), {
                use ark_ff::Zero;
                Scalar::zero()
            }))
        } else if peer_directory_entry.next_batch_to_approve <= proof.initial_batch + 1 {
            let (t, r) = peer_directory_entry.latest_batch_proof?;
            Some((proof.initial_batch, t, r))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod accumulator_test {
    use ark_ff::UniformRand;
    use rand::thread_rng;

    use super::*;

    fn keypair() -> PoExKeyPair {
        let mut rng = thread_rng();
        PoExKeyPair::from_private_key(Scalar::rand(&mut rng))
    }

    /// Directory checkpoint for a peer who has approved nothing yet and
    /// whose proofs all start at the accumulator's own initial batch.
    fn fresh_checkpoint(initial_batch: u64) -> DirectoryCheckpoint {
        DirectoryCheckpoint { initial_batch, next_batch_to_approve: initial_batch, latest_batch_proof: None }
    }

    #[test]
    fn honest_proof_over_a_single_batch_verifies() {
        let mut acc = PoExAccumulator::new(0, 16, keypair());
        let y = acc.add_to_proof(7);
        let y_point = point_from_bytes(&y).unwrap();
        acc.add_batch_verification_information(0, y_point);
        let proof = acc.build_actual_proof();

        let ok = acc.verify_proof(acc.public_key(), &fresh_checkpoint(0), &proof, 0, y_point);
        assert!(ok, "an honest single-batch proof must verify");
    }

    #[test]
    fn honest_proof_over_multiple_batches_verifies() {
        let mut acc = PoExAccumulator::new(0, 16, keypair());
        let mut last_y = curve::identity();
        for (batch, digest) in [(0u64, 1u64), (1, 2), (2, 3)] {
            let y = acc.add_to_proof(digest);
            last_y = point_from_bytes(&y).unwrap();
            acc.add_batch_verification_information(batch, last_y);
        }
        let proof = acc.build_actual_proof();
        let ok = acc.verify_proof(acc.public_key(), &fresh_checkpoint(0), &proof, 2, last_y);
        assert!(ok);
    }

    #[test]
    fn tampering_with_r_fails_verification() {
        let mut acc = PoExAccumulator::new(0, 16, keypair());
        let y = acc.add_to_proof(7);
        let y_point = point_from_bytes(&y).unwrap();
        acc.add_batch_verification_information(0, y_point);
        let mut proof = acc.build_actual_proof();
        proof.r += Scalar::from(1u64);

        let ok = acc.verify_proof(acc.public_key(), &fresh_checkpoint(0), &proof, 0, y_point);
        assert!(!ok, "a tampered scalar must fail verification");
    }

    #[test]
    fn tampering_with_verification_info_fails_verification() {
        let mut acc = PoExAccumulator::new(0, 16, keypair());
        let y = acc.add_to_proof(7);
        let y_point = point_from_bytes(&y).unwrap();
        acc.add_batch_verification_information(0, y_point);
        let proof = acc.build_actual_proof();

        let wrong_y = mul(&base_point(), Scalar::from(999u64));
        let ok = acc.verify_proof(acc.public_key(), &fresh_checkpoint(0), &proof, 0, wrong_y);
        assert!(!ok);
    }

    #[test]
    fn pop_from_proof_restores_previous_state() {
        let mut acc = PoExAccumulator::new(0, 16, keypair());
        let before = acc.build_actual_proof();
        acc.add_to_proof(7);
        acc.pop_from_proof();
        let after = acc.build_actual_proof();
        assert_eq!(before.t, after.t, "rollback must restore the pre-addToProof accumulator");
    }

    #[test]
    fn reset_zeroes_accumulator_and_clears_history() {
        let mut acc = PoExAccumulator::new(0, 16, keypair());
        acc.add_to_proof(7);
        acc.add_batch_verification_information(0, curve::identity());
        acc.reset(5);
        assert_eq!(acc.initial_batch(), 5);
        assert!(acc.history_lookup(0).is_none());
    }
}
