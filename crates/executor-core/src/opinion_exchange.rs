//! Opinion Exchange (spec §4.4): validates peer opinions against the local
//! one and assembles the multisig transaction body once quorum is reached.

use executor_poex::curve::{identity, point_to_bytes};
use executor_poex::PoExAccumulator;
use executor_types::{
    CallRequest,
    ExecutorDirectoryEntry,
    ExecutorKey,
    GroupElementBytes,
    PoExProof,
    Signature,
    SuccessfulCallExecutionOpinion,
    SuccessfulEndBatchOpinion,
    UnsuccessfulEndBatchOpinion,
};
use tracing::warn;

use crate::errors::OpinionRejection;

/// `enoughOpinions(k, n)` (spec §4.3 "Quorum rule"): strictly more than two
/// thirds including self.
pub fn enough_opinions(aligned: usize, total_peers: usize) -> bool {
    3 * (aligned as u64) > 2 * (total_peers as u64)
}

fn validate_call_lists(
    local: &[SuccessfulCallExecutionOpinion],
    peer: &[SuccessfulCallExecutionOpinion],
    declared_calls: &[CallRequest],
) -> Result<(), OpinionRejection> {
    if local.len() != peer.len() {
        return Err(OpinionRejection::CallListLengthMismatch { local: local.len(), peer: peer.len() });
    }
    for (index, (local_call, peer_call)) in local.iter().zip(peer.iter()).enumerate() {
        if local_call.call_id != peer_call.call_id {
            return Err(OpinionRejection::CallFieldMismatch { index, field: "call_id" });
        }
        if local_call.is_manual != peer_call.is_manual {
            return Err(OpinionRejection::CallFieldMismatch { index, field: "is_manual" });
        }
        if local_call.status != peer_call.status {
            return Err(OpinionRejection::CallFieldMismatch { index, field: "status" });
        }
        if local_call.released_transaction_hash != peer_call.released_transaction_hash {
            return Err(OpinionRejection::CallFieldMismatch {
                index,
                field: "released_transaction_hash",
            });
        }
        let declared = declared_calls.get(index);
        let within_cap = declared.is_some_and(|c| {
            peer_call.execution_payment_used <= c.execution_payment
                && peer_call.download_payment_used <= c.download_payment
        });
        if !within_cap {
            return Err(OpinionRejection::PaymentAboveCap { index });
        }
    }
    Ok(())
}

/// Validates a peer's [`SuccessfulEndBatchOpinion`] against the local one
/// (spec §4.4).
pub fn validate_successful_opinion(
    local: &SuccessfulEndBatchOpinion,
    peer: &SuccessfulEndBatchOpinion,
    declared_calls: &[CallRequest],
    peer_directory_entry: Option<&ExecutorDirectoryEntry>,
    peer_public_key: Option<GroupElementBytes>,
    accumulator: &PoExAccumulator,
) -> Result<(), OpinionRejection> {
    let directory_entry = peer_directory_entry.ok_or(OpinionRejection::UnknownPeer)?;
    let public_key = peer_public_key.ok_or(OpinionRejection::UnknownPeer)?;

    if peer.automatic_executions_checked_up_to != local.automatic_executions_checked_up_to {
        return Err(OpinionRejection::FieldMismatch { field: "automatic_executions_checked_up_to" });
    }
    if peer.poex_verification_info != local.poex_verification_info {
        return Err(OpinionRejection::FieldMismatch { field: "poex_verification_info" });
    }
    if peer.storage_hash != local.storage_hash {
        return Err(OpinionRejection::FieldMismatch { field: "storage_hash" });
    }
    if peer.used_size != local.used_size {
        return Err(OpinionRejection::FieldMismatch { field: "used_size" });
    }
    if peer.meta_size != local.meta_size {
        return Err(OpinionRejection::FieldMismatch { field: "meta_size" });
    }
    validate_call_lists(&local.calls_execution_info, &peer.calls_execution_info, declared_calls)?;

    let proof_ok = executor_poex::verify_wire_proof(
        accumulator,
        &public_key,
        directory_entry,
        &peer.proof,
        peer.batch_index,
        &peer.poex_verification_info,
    )
    .unwrap_or(false);
    if !proof_ok {
        return Err(OpinionRejection::InvalidPoExProof);
    }
    Ok(())
}

/// Validates a peer's [`UnsuccessfulEndBatchOpinion`]: the subset of checks
/// above that do not refer to storage fields, using the identity group
/// element as verification info (spec §4.4 "the zero batch contribution
/// case").
pub fn validate_unsuccessful_opinion(
    local: &UnsuccessfulEndBatchOpinion,
    peer: &UnsuccessfulEndBatchOpinion,
    declared_calls: &[CallRequest],
    peer_directory_entry: Option<&ExecutorDirectoryEntry>,
    peer_public_key: Option<GroupElementBytes>,
    accumulator: &PoExAccumulator,
) -> Result<(), OpinionRejection> {
    let directory_entry = peer_directory_entry.ok_or(OpinionRejection::UnknownPeer)?;
    let public_key = peer_public_key.ok_or(OpinionRejection::UnknownPeer)?;

    if peer.automatic_executions_checked_up_to != local.automatic_executions_checked_up_to {
        return Err(OpinionRejection::FieldMismatch { field: "automatic_executions_checked_up_to" });
    }
    validate_call_lists(&local.calls_execution_info, &peer.calls_execution_info, declared_calls)?;

    let identity_info = point_to_bytes(&identity());
    let proof_ok = executor_poex::verify_wire_proof(
        accumulator,
        &public_key,
        directory_entry,
        &peer.proof,
        peer.batch_index,
        &identity_info,
    )
    .unwrap_or(false);
    if !proof_ok {
        return Err(OpinionRejection::InvalidPoExProof);
    }
    Ok(())
}

/// Logs a rejection at warn level with the specific failed field (spec §7
/// "invalid_peer_opinion ... Logged at warn level with the specific failed
/// field").
pub fn log_rejection(peer_key: ExecutorKey, batch_index: u64, rejection: &OpinionRejection) {
    warn!(?peer_key, batch_index, %rejection, "rejected peer opinion");
}

/// One cosigner's declared payment usage for one call, appended to the
/// call's participation vector during multisig assembly (spec §4.4
/// "executorParticipation", supplemented per `DESIGN.md`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutorParticipation {
    pub executor_key: ExecutorKey,
    pub execution_payment_used: u64,
    pub download_payment_used: u64,
}

/// The assembled multisig transaction body (spec §4.4 "Multisig assembly").
#[derive(Clone, Debug, PartialEq)]
pub struct AssembledMultisig {
    pub cosigners: Vec<ExecutorKey>,
    pub signatures: Vec<Signature>,
    pub proofs: Vec<PoExProof>,
    /// One vector per call, in the same order as `local.calls_execution_info`.
    pub call_participations: Vec<Vec<ExecutorParticipation>>,
}

/// Assembles the multisig body from the local opinion (canonical for the
/// transaction) plus every accepted peer opinion, local peer included
/// (spec §4.4).
pub fn assemble_successful_multisig(
    local: &SuccessfulEndBatchOpinion,
    accepted_peers: &[SuccessfulEndBatchOpinion],
) -> AssembledMultisig {
    let mut call_participations: Vec<Vec<ExecutorParticipation>> = local
        .calls_execution_info
        .iter()
        .map(|call| {
            vec![ExecutorParticipation {
                executor_key: local.executor_key,
                execution_payment_used: call.execution_payment_used,
                download_payment_used: call.download_payment_used,
            }]
        })
        .collect();

    let mut cosigners = vec![local.executor_key];
    let mut signatures = vec![local.signature];
    let mut proofs = vec![local.proof.clone()];

    for peer in accepted_peers {
        cosigners.push(peer.executor_key);
        signatures.push(peer.signature);
        proofs.push(peer.proof.clone());
        for (index, call) in peer.calls_execution_info.iter().enumerate() {
            if let Some(participations) = call_participations.get_mut(index) {
                participations.push(ExecutorParticipation {
                    executor_key: peer.executor_key,
                    execution_payment_used: call.execution_payment_used,
                    download_payment_used: call.download_payment_used,
                });
            }
        }
    }

    AssembledMultisig { cosigners, signatures, proofs, call_participations }
}

/// Same as [`assemble_successful_multisig`] for the unsuccessful shape.
pub fn assemble_unsuccessful_multisig(
    local: &UnsuccessfulEndBatchOpinion,
    accepted_peers: &[UnsuccessfulEndBatchOpinion],
) -> AssembledMultisig {
    let mut call_participations: Vec<Vec<ExecutorParticipation>> = local
        .calls_execution_info
        .iter()
        .map(|call| {
            vec![ExecutorParticipation {
                executor_key: local.executor_key,
                execution_payment_used: call.execution_payment_used,
                download_payment_used: call.download_payment_used,
            }]
        })
        .collect();

    let mut cosigners = vec![local.executor_key];
    let mut signatures = vec![local.signature];
    let mut proofs = vec![local.proof.clone()];

    for peer in accepted_peers {
        cosigners.push(peer.executor_key);
        signatures.push(peer.signature);
        proofs.push(peer.proof.clone());
        for (index, call) in peer.calls_execution_info.iter().enumerate() {
            if let Some(participations) = call_participations.get_mut(index) {
                participations.push(ExecutorParticipation {
                    executor_key: peer.executor_key,
                    execution_payment_used: call.execution_payment_used,
                    download_payment_used: call.download_payment_used,
                });
            }
        }
    }

    AssembledMultisig { cosigners, signatures, proofs, call_participations }
}

#[cfg(test)]
mod opinion_exchange_test {
    use ark_ff::UniformRand;
    use executor_poex::curve::{point_from_bytes, point_to_bytes, Scalar};
    use executor_poex::PoExKeyPair;
    use executor_types::{
        CallId,
        CallLevel,
        CallerKey,
        ContractKey,
        ExecutorDirectoryEntry,
        Signature,
        StorageHash,
    };
    use rand::thread_rng;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(3, 4, true)]
    #[case(2, 4, false)]
    #[case(3, 3, true)]
    #[case(2, 2, true)]
    #[case(1, 2, false)]
    fn quorum_rule_matches_three_k_greater_than_two_n(
        #[case] aligned: usize,
        #[case] total: usize,
        #[case] expected: bool,
    ) {
        assert_eq!(enough_opinions(aligned, total), expected);
    }

    #[test]
    fn quorum_boundary_is_smallest_k_with_3k_over_2n_property_5() {
        for n in 1..=12usize {
            let smallest = (1..=n).find(|&k| enough_opinions(k, n)).unwrap();
            let expected = (2 * n) / 3 + 1;
            assert_eq!(smallest, expected, "n = {n}");
        }
    }

    fn keypair() -> PoExKeyPair {
        PoExKeyPair::from_private_key(Scalar::rand(&mut thread_rng()))
    }

    fn declared_call() -> CallRequest {
        CallRequest {
            call_id: CallId::zero(),
            contract_key: ContractKey::zero(),
            file: "f".into(),
            function: "g".into(),
            arguments: vec![],
            execution_payment: 10,
            download_payment: 10,
            caller_key: CallerKey::zero(),
            block_height: 1,
            level: CallLevel::Manual,
            manual_info: None,
        }
    }

    fn call_opinion(execution_payment_used: u64) -> SuccessfulCallExecutionOpinion {
        SuccessfulCallExecutionOpinion {
            call_id: CallId::zero(),
            is_manual: true,
            status: 0,
            released_transaction_hash: None,
            execution_payment_used,
            download_payment_used: 5,
        }
    }

    /// A `SuccessfulEndBatchOpinion` whose PoEx proof is built from a real
    /// accumulator run under `keypair`, so it genuinely verifies.
    fn peer_opinion(keypair: &PoExKeyPair, storage_hash: StorageHash) -> SuccessfulEndBatchOpinion {
        let mut acc = PoExAccumulator::new(0, 16, *keypair);
        let verification_info = acc.add_to_proof(0);
        let verification_point = point_from_bytes(&verification_info).unwrap();
        acc.add_batch_verification_information(0, verification_point);
        let proof = acc.build_actual_proof().to_wire();
        SuccessfulEndBatchOpinion {
            contract_key: ContractKey::zero(),
            batch_index: 0,
            automatic_executions_checked_up_to: 1,
            storage_hash,
            used_size: 10,
            meta_size: 1,
            poex_verification_info: verification_info,
            calls_execution_info: vec![call_opinion(5)],
            proof,
            executor_key: ExecutorKey::zero(),
            signature: Signature::zero(),
        }
    }

    #[test]
    fn validate_successful_accepts_an_honest_matching_peer_opinion() {
        let peer_keypair = keypair();
        let storage_hash = StorageHash::from([1u8; 32]);
        let peer = peer_opinion(&peer_keypair, storage_hash);
        let local = peer.clone();
        let accumulator = PoExAccumulator::new(0, 16, keypair());
        let entry = ExecutorDirectoryEntry::new(0);
        let public_key = point_to_bytes(&peer_keypair.public_key);
        let declared = vec![declared_call()];

        let verdict =
            validate_successful_opinion(&local, &peer, &declared, Some(&entry), Some(public_key), &accumulator);
        assert_eq!(verdict, Ok(()));
    }

    #[test]
    fn validate_successful_rejects_unknown_peer() {
        let peer_keypair = keypair();
        let storage_hash = StorageHash::from([1u8; 32]);
        let peer = peer_opinion(&peer_keypair, storage_hash);
        let local = peer.clone();
        let accumulator = PoExAccumulator::new(0, 16, keypair());

        let verdict = validate_successful_opinion(&local, &peer, &[declared_call()], None, None, &accumulator);
        assert_eq!(verdict, Err(OpinionRejection::UnknownPeer));
    }

    #[test]
    fn validate_successful_rejects_storage_hash_mismatch() {
        let peer_keypair = keypair();
        let peer = peer_opinion(&peer_keypair, StorageHash::from([1u8; 32]));
        let mut local = peer.clone();
        local.storage_hash = StorageHash::from([2u8; 32]);
        let accumulator = PoExAccumulator::new(0, 16, keypair());
        let entry = ExecutorDirectoryEntry::new(0);
        let public_key = point_to_bytes(&peer_keypair.public_key);

        let verdict = validate_successful_opinion(
            &local,
            &peer,
            &[declared_call()],
            Some(&entry),
            Some(public_key),
            &accumulator,
        );
        assert_eq!(verdict, Err(OpinionRejection::FieldMismatch { field: "storage_hash" }));
    }

    #[test]
    fn validate_successful_rejects_payment_above_caller_declared_cap() {
        let peer_keypair = keypair();
        let storage_hash = StorageHash::from([1u8; 32]);
        let mut peer = peer_opinion(&peer_keypair, storage_hash);
        peer.calls_execution_info[0].execution_payment_used = 999;
        let mut local = peer.clone();
        local.calls_execution_info[0].execution_payment_used = 5;
        let accumulator = PoExAccumulator::new(0, 16, keypair());
        let entry = ExecutorDirectoryEntry::new(0);
        let public_key = point_to_bytes(&peer_keypair.public_key);

        let verdict = validate_successful_opinion(
            &local,
            &peer,
            &[declared_call()],
            Some(&entry),
            Some(public_key),
            &accumulator,
        );
        assert_eq!(verdict, Err(OpinionRejection::PaymentAboveCap { index: 0 }));
    }

    #[test]
    fn validate_successful_rejects_call_list_length_mismatch() {
        let peer_keypair = keypair();
        let peer = peer_opinion(&peer_keypair, StorageHash::from([1u8; 32]));
        let mut local = peer.clone();
        local.calls_execution_info.push(call_opinion(1));
        let accumulator = PoExAccumulator::new(0, 16, keypair());
        let entry = ExecutorDirectoryEntry::new(0);
        let public_key = point_to_bytes(&peer_keypair.public_key);

        let verdict = validate_successful_opinion(
            &local,
            &peer,
            &[declared_call()],
            Some(&entry),
            Some(public_key),
            &accumulator,
        );
        assert_eq!(verdict, Err(OpinionRejection::CallListLengthMismatch { local: 2, peer: 1 }));
    }

    /// An `UnsuccessfulEndBatchOpinion` whose proof is `buildPreviousProof`
    /// over a fresh accumulator (`x == x_prev == 0`), so it genuinely
    /// verifies against the identity verification point.
    fn peer_unsuccessful_opinion(keypair: &PoExKeyPair) -> UnsuccessfulEndBatchOpinion {
        let acc = PoExAccumulator::new(0, 16, *keypair);
        let proof = acc.build_previous_proof().to_wire();
        UnsuccessfulEndBatchOpinion {
            contract_key: ContractKey::zero(),
            batch_index: 0,
            automatic_executions_checked_up_to: 1,
            calls_execution_info: vec![call_opinion(5)],
            proof,
            executor_key: ExecutorKey::zero(),
            signature: Signature::zero(),
        }
    }

    #[test]
    fn validate_unsuccessful_accepts_an_honest_matching_peer_opinion() {
        let peer_keypair = keypair();
        let peer = peer_unsuccessful_opinion(&peer_keypair);
        let local = peer.clone();
        let accumulator = PoExAccumulator::new(0, 16, keypair());
        let entry = ExecutorDirectoryEntry::new(0);
        let public_key = point_to_bytes(&peer_keypair.public_key);

        let verdict = validate_unsuccessful_opinion(
            &local,
            &peer,
            &[declared_call()],
            Some(&entry),
            Some(public_key),
            &accumulator,
        );
        assert_eq!(verdict, Ok(()));
    }

    #[test]
    fn validate_unsuccessful_rejects_unknown_peer() {
        let peer_keypair = keypair();
        let peer = peer_unsuccessful_opinion(&peer_keypair);
        let local = peer.clone();
        let accumulator = PoExAccumulator::new(0, 16, keypair());

        let verdict = validate_unsuccessful_opinion(&local, &peer, &[declared_call()], None, None, &accumulator);
        assert_eq!(verdict, Err(OpinionRejection::UnknownPeer));
    }

    #[test]
    fn validate_unsuccessful_rejects_checked_up_to_mismatch() {
        let peer_keypair = keypair();
        let peer = peer_unsuccessful_opinion(&peer_keypair);
        let mut local = peer.clone();
        local.automatic_executions_checked_up_to = 2;
        let accumulator = PoExAccumulator::new(0, 16, keypair());
        let entry = ExecutorDirectoryEntry::new(0);
        let public_key = point_to_bytes(&peer_keypair.public_key);

        let verdict = validate_unsuccessful_opinion(
            &local,
            &peer,
            &[declared_call()],
            Some(&entry),
            Some(public_key),
            &accumulator,
        );
        assert_eq!(
            verdict,
            Err(OpinionRejection::FieldMismatch { field: "automatic_executions_checked_up_to" })
        );
    }

    #[test]
    fn validate_unsuccessful_rejects_invalid_proof() {
        let peer_keypair = keypair();
        let mut peer = peer_unsuccessful_opinion(&peer_keypair);
        peer.proof.k.0[0] ^= 0xff;
        let local = peer.clone();
        let accumulator = PoExAccumulator::new(0, 16, keypair());
        let entry = ExecutorDirectoryEntry::new(0);
        let public_key = point_to_bytes(&peer_keypair.public_key);

        let verdict = validate_unsuccessful_opinion(
            &local,
            &peer,
            &[declared_call()],
            Some(&entry),
            Some(public_key),
            &accumulator,
        );
        assert_eq!(verdict, Err(OpinionRejection::InvalidPoExProof));
    }

    #[test]
    fn assemble_successful_multisig_orders_cosigners_local_first_then_peers() {
        let local_keypair = keypair();
        let peer_keypair = keypair();
        let mut local = peer_opinion(&local_keypair, StorageHash::from([1u8; 32]));
        local.executor_key = ExecutorKey::from([9u8; 32]);
        local.calls_execution_info[0].execution_payment_used = 5;
        let mut peer = peer_opinion(&peer_keypair, StorageHash::from([1u8; 32]));
        peer.executor_key = ExecutorKey::from([7u8; 32]);
        peer.calls_execution_info[0].execution_payment_used = 7;

        let assembled = assemble_successful_multisig(&local, &[peer.clone()]);

        assert_eq!(assembled.cosigners, vec![local.executor_key, peer.executor_key]);
        assert_eq!(assembled.signatures, vec![local.signature, peer.signature]);
        assert_eq!(assembled.proofs, vec![local.proof.clone(), peer.proof.clone()]);
        assert_eq!(assembled.call_participations.len(), 1);
        let participations = &assembled.call_participations[0];
        assert_eq!(participations.len(), 2);
        assert_eq!(participations[0].executor_key, local.executor_key);
        assert_eq!(participations[0].execution_payment_used, 5);
        assert_eq!(participations[1].executor_key, peer.executor_key);
        assert_eq!(participations[1].execution_payment_used, 7);
    }

    #[test]
    fn assemble_unsuccessful_multisig_skips_peer_calls_beyond_local_length() {
        let local_keypair = keypair();
        let peer_keypair = keypair();
        let local = peer_unsuccessful_opinion(&local_keypair);
        let mut peer = peer_unsuccessful_opinion(&peer_keypair);
        peer.calls_execution_info.push(call_opinion(1));

        let assembled = assemble_unsuccessful_multisig(&local, &[peer.clone()]);

        assert_eq!(assembled.cosigners, vec![local.executor_key, peer.executor_key]);
        assert_eq!(assembled.call_participations.len(), 1);
        assert_eq!(assembled.call_participations[0].len(), 2);
    }
}
