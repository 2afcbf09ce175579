//! Deterministic nonce derivation (spec §9 "Determinism of PoEx nonces").
//!
//! `buildActualProof`/`buildPreviousProof` draw two fresh scalars per call
//! (`v` and `w`). If two honest peers ever reused a nonce for the same
//! secret scalar, a standard Schnorr nonce-reuse attack would leak their
//! PoEx secret key. We derive both nonces as a pseudo-random function of
//! `(private key, secret scalar, domain tag)`, so the same `(key, scalar)`
//! pair always yields the same nonce and distinct domain tags keep `v` and
//! `w` independent.

use ark_ff::UniformRand;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha256};

use crate::curve::{scalar_to_bytes, Scalar};

/// Domain-separated PRF seed derivation. Not a general-purpose MAC: the
/// private scalar is mixed in as keying material ahead of the message, the
/// same construction `HMAC` uses for its inner hash, which is sufficient
/// here since both inputs are high-entropy curve scalars.
fn derive_seed(private_key: &Scalar, secret_scalar: &Scalar, domain: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(scalar_to_bytes(private_key).0);
    hasher.update(domain);
    hasher.update(scalar_to_bytes(secret_scalar).0);
    hasher.finalize().into()
}

/// Deterministic nonce for the outer Schnorr proof (`v` in `buildActualProof`).
pub fn derive_v(private_key: &Scalar, secret_scalar: &Scalar) -> Scalar {
    let seed = derive_seed(private_key, secret_scalar, b"poex/nonce/v");
    let mut rng = ChaCha20Rng::from_seed(seed);
    Scalar::rand(&mut rng)
}

/// Deterministic nonce for the inner Schnorr proof (`w` in `buildActualProof`).
pub fn derive_w(private_key: &Scalar, secret_scalar: &Scalar) -> Scalar {
    let seed = derive_seed(private_key, secret_scalar, b"poex/nonce/w");
    let mut rng = ChaCha20Rng::from_seed(seed);
    Scalar::rand(&mut rng)
}
