//! Scalar/group-element primitives over the fixed prime-order curve PoEx
//! runs on (spec §4.1: "a fixed prime-order curve with base point B").
//!
//! We use secp256k1 via `ark-secp256k1`, already part of this workspace's
//! dependency stack for curve arithmetic elsewhere (see `DESIGN.md`). Points
//! serialize to the 33-byte compressed form and scalars to 32 bytes, which
//! is why `executor_types::{GroupElementBytes, ScalarBytes}` are sized the
//! way they are.

use ark_ec::short_weierstrass::Affine as SwAffine;
use ark_ec::{AffineRepr, CurveGroup, PrimeGroup};
use ark_ff::{BigInteger, PrimeField};
use ark_secp256k1::{Config, Fr};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use executor_types::{GroupElementBytes, ScalarBytes};
use sha2::{Digest, Sha256};

pub type Scalar = Fr;
pub type Point = SwAffine<Config>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CurveCodecError {
    #[error("failed to deserialize a curve point from its compressed form")]
    InvalidPoint,
    #[error("failed to deserialize a scalar")]
    InvalidScalar,
}

/// The curve's fixed base point `B` (spec §4.1).
pub fn base_point() -> Point {
    ark_secp256k1::Projective::generator().into_affine()
}

pub fn point_to_bytes(point: &Point) -> GroupElementBytes {
    let mut buf = [0u8; 33];
    point.serialize_compressed(&mut buf[..]).expect("secp256k1 point is always 33 bytes compressed");
    GroupElementBytes(buf)
}

pub fn point_from_bytes(bytes: &GroupElementBytes) -> Result<Point, CurveCodecError> {
    Point::deserialize_compressed(&bytes.0[..]).map_err(|_| CurveCodecError::InvalidPoint)
}

pub fn scalar_to_bytes(scalar: &Scalar) -> ScalarBytes {
    let mut buf = [0u8; 32];
    let be = scalar.into_bigint().to_bytes_be();
    // `to_bytes_be` is at most 32 bytes for this field; left-pad with zeros.
    buf[32 - be.len()..].copy_from_slice(&be);
    ScalarBytes(buf)
}

pub fn scalar_from_bytes(bytes: &ScalarBytes) -> Result<Scalar, CurveCodecError> {
    Ok(Scalar::from_be_bytes_mod_order(&bytes.0))
}

/// `H(digest)` from spec §4.1's `addToProof`: a 64-bit call-site digest
/// reduced to a scalar.
pub fn hash_u64_to_scalar(digest: u64) -> Scalar {
    let mut hasher = Sha256::new();
    hasher.update(b"poex/alpha");
    hasher.update(digest.to_le_bytes());
    Scalar::from_le_bytes_mod_order(&hasher.finalize())
}

/// The Fiat-Shamir challenge `c = H(B, Y, peerKey)` (spec §4.1), used both
/// when forming `x += c*alpha` and when the verifier reconstructs the same
/// challenge per historical batch.
pub fn fiat_shamir_challenge(base: &Point, y: &Point, signer_key: &Point) -> Scalar {
    hash_points(b"poex/challenge", &[base, y, signer_key])
}

/// The Schnorr challenge `d = H(F, T, selfPubKey)` used inside
/// `buildActualProof`/`buildPreviousProof`/`verifyProof` (spec §4.1).
pub fn schnorr_challenge(f: &Point, t: &Point, signer_key: &Point) -> Scalar {
    hash_points(b"poex/schnorr", &[f, t, signer_key])
}

fn hash_points(domain: &[u8], points: &[&Point]) -> Scalar {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    for point in points {
        let mut buf = [0u8; 33];
        point.serialize_compressed(&mut buf[..]).expect("compressed point is 33 bytes");
        hasher.update(buf);
    }
    Scalar::from_le_bytes_mod_order(&hasher.finalize())
}

/// The additive identity (point at infinity).
pub fn identity() -> Point {
    use ark_ff::Zero;
    Point::zero()
}

pub fn add(a: &Point, b: &Point) -> Point {
    (a.into_group() + b.into_group()).into_affine()
}

pub fn sub(a: &Point, b: &Point) -> Point {
    (a.into_group() - b.into_group()).into_affine()
}

pub fn mul(point: &Point, scalar: Scalar) -> Point {
    (*point * scalar).into_affine()
}

#[cfg(test)]
mod curve_test {
    use ark_ff::UniformRand;
    use rand::thread_rng;

    use super::*;

    #[test]
    fn point_round_trips_through_bytes() {
        let mut rng = thread_rng();
        let scalar = Scalar::rand(&mut rng);
        let point = (base_point() * scalar).into_affine();
        let bytes = point_to_bytes(&point);
        let decoded = point_from_bytes(&bytes).expect("valid point");
        assert_eq!(point, decoded);
    }

    #[test]
    fn scalar_round_trips_through_bytes() {
        let mut rng = thread_rng();
        let scalar = Scalar::rand(&mut rng);
        let bytes = scalar_to_bytes(&scalar);
        let decoded = scalar_from_bytes(&bytes).expect("valid scalar");
        assert_eq!(scalar, decoded);
    }

    #[test]
    fn hash_u64_to_scalar_is_deterministic() {
        assert_eq!(hash_u64_to_scalar(42), hash_u64_to_scalar(42));
        assert_ne!(hash_u64_to_scalar(42), hash_u64_to_scalar(43));
    }
}
