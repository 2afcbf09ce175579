//! Opinion signing (spec §3 "signature is verifiable with executorKey over
//! the canonical serialization", §4.4, §8 Testable Property #3).
//!
//! `spec.md` leaves the concrete signature scheme as "an implementation
//! detail" (§6: "concrete encodings ... are implementation details"). We
//! reuse the same curve stack PoEx is built on: a challenge-response Schnorr
//! signature whose `(e, s)` pair is exactly the 64 bytes `Signature` is
//! sized for, with the nonce derived deterministically from the private key
//! and the message so that signing the same opinion twice never reuses a
//! nonce (same rationale as `crate::nonce`).

use ark_ff::{PrimeField, UniformRand};
use executor_types::Signature;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha256};

use crate::curve::{add, base_point, mul, point_to_bytes, scalar_from_bytes, scalar_to_bytes, Point, Scalar};
use crate::PoExKeyPair;

fn derive_nonce(private_key: &Scalar, message: &[u8]) -> Scalar {
    let mut hasher = Sha256::new();
    hasher.update(b"opinion/nonce");
    hasher.update(scalar_to_bytes(private_key).0);
    hasher.update(message);
    let seed: [u8; 32] = hasher.finalize().into();
    let mut rng = ChaCha20Rng::from_seed(seed);
    Scalar::rand(&mut rng)
}

fn challenge(r: &Point, public_key: &Point, message: &[u8]) -> Scalar {
    let mut hasher = Sha256::new();
    hasher.update(b"opinion/sign");
    hasher.update(point_to_bytes(r).0);
    hasher.update(point_to_bytes(public_key).0);
    hasher.update(message);
    Scalar::from_le_bytes_mod_order(&hasher.finalize())
}

/// Signs `message` (the canonical serialization of an opinion, spec §6).
pub fn sign_message(keypair: &PoExKeyPair, message: &[u8]) -> Signature {
    let k = derive_nonce(&keypair.private_key, message);
    let r = mul(&base_point(), k);
    let e = challenge(&r, &keypair.public_key, message);
    let s = k - e * keypair.private_key;

    let mut bytes = [0u8; 64];
    bytes[..32].copy_from_slice(&scalar_to_bytes(&e).0);
    bytes[32..].copy_from_slice(&scalar_to_bytes(&s).0);
    Signature(bytes)
}

/// Verifies `signature` was produced by the holder of `public_key` over
/// `message` (spec §8 Testable Property #3: "`verify(sign(opinion)) ==
/// true`").
pub fn verify_signature(public_key: Point, message: &[u8], signature: &Signature) -> bool {
    let mut e_bytes = [0u8; 32];
    let mut s_bytes = [0u8; 32];
    e_bytes.copy_from_slice(&signature.0[..32]);
    s_bytes.copy_from_slice(&signature.0[32..]);
    let Ok(e) = scalar_from_bytes(&executor_types::ScalarBytes(e_bytes)) else { return false };
    let Ok(s) = scalar_from_bytes(&executor_types::ScalarBytes(s_bytes)) else { return false };

    let r_prime = add(&mul(&base_point(), s), &mul(&public_key, e));
    challenge(&r_prime, &public_key, message) == e
}

#[cfg(test)]
mod signing_test {
    use ark_ff::UniformRand;
    use rand::thread_rng;

    use super::*;

    fn keypair() -> PoExKeyPair {
        let mut rng = thread_rng();
        PoExKeyPair::from_private_key(Scalar::rand(&mut rng))
    }

    #[test]
    fn verify_accepts_an_honest_signature() {
        let keypair = keypair();
        let message = b"batch opinion bytes";
        let signature = sign_message(&keypair, message);
        assert!(verify_signature(keypair.public_key, message, &signature));
    }

    #[test]
    fn verify_rejects_a_tampered_message() {
        let keypair = keypair();
        let signature = sign_message(&keypair, b"original message");
        assert!(!verify_signature(keypair.public_key, b"tampered message", &signature));
    }

    #[test]
    fn verify_rejects_the_wrong_public_key() {
        let keypair = keypair();
        let other = keypair();
        let message = b"batch opinion bytes";
        let signature = sign_message(&keypair, message);
        assert!(!verify_signature(other.public_key, message, &signature));
    }

    #[test]
    fn signing_the_same_message_twice_is_deterministic() {
        let keypair = keypair();
        let message = b"batch opinion bytes";
        assert_eq!(sign_message(&keypair, message), sign_message(&keypair, message));
    }
}
