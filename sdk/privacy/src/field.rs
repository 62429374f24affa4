//! BN254 scalar field helpers
//!
//! Every hash in the protocol (commitments, nullifiers, merkle nodes) is a
//! Poseidon sponge over the BN254 scalar field, so the parameters are derived
//! once per process and shared.
//!
//! Encoding convention: field elements travel as 32 little-endian bytes.
//! The prover expects big-endian, see [`to_be_bytes`].

use std::sync::LazyLock;

pub use ark_bn254::Fr;
use ark_crypto_primitives::sponge::{
    CryptographicSponge,
    poseidon::{PoseidonConfig, PoseidonSponge, find_poseidon_ark_and_mds},
};
use ark_ff::{BigInt, BigInteger, PrimeField};

/// Modulus of the scalar field.
pub const FIELD_PRIME: BigInt<4> = <Fr as PrimeField>::MODULUS;

pub const FIELD_BYTES: usize = 32;

/// Poseidon over BN254 Fr: rate 2, capacity 1, 8 full / 57 partial rounds, alpha 5.
static POSEIDON: LazyLock<PoseidonConfig<Fr>> = LazyLock::new(|| {
    let prime_bits = u64::from(<Fr as PrimeField>::MODULUS_BIT_SIZE);
    let rate: usize = 2;
    let capacity: usize = 1;
    let full_rounds: u64 = 8;
    let partial_rounds: u64 = 57;
    let alpha: u64 = 5;

    let (ark, mds) =
        find_poseidon_ark_and_mds::<Fr>(prime_bits, rate, full_rounds, partial_rounds, 0);

    PoseidonConfig::new(
        full_rounds as usize,
        partial_rounds as usize,
        alpha,
        mds,
        ark,
        rate,
        capacity,
    )
});

/// Absorb `inputs` in order and squeeze one element.
pub fn poseidon(inputs: &[Fr]) -> Fr {
    let mut sponge = PoseidonSponge::new(&POSEIDON);
    for input in inputs {
        sponge.absorb(input);
    }
    sponge.squeeze_field_elements::<Fr>(1)[0]
}

pub fn to_le_bytes(f: &Fr) -> [u8; FIELD_BYTES] {
    let bytes = f.into_bigint().to_bytes_le();
    let mut arr = [0u8; FIELD_BYTES];
    arr[..bytes.len()].copy_from_slice(&bytes);
    arr
}

/// Bytes are reduced modulo the prime.
pub fn from_le_bytes(bytes: &[u8; FIELD_BYTES]) -> Fr {
    Fr::from_le_bytes_mod_order(bytes)
}

/// Big-endian encoding, the byte-reversed form of [`to_le_bytes`].
pub fn to_be_bytes(f: &Fr) -> [u8; FIELD_BYTES] {
    let mut arr = to_le_bytes(f);
    arr.reverse();
    arr
}

pub fn fits_u64(f: &Fr) -> bool {
    f.into_bigint().num_bits() <= 64
}

pub fn to_u64(f: &Fr) -> Option<u64> {
    fits_u64(f).then(|| f.into_bigint().0[0])
}

/// Interpret `f` under the wrap-around sign convention: values below 2^64
/// are positive, values within 2^64 of the prime are negative.
pub fn to_signed(f: &Fr) -> Option<i128> {
    if let Some(v) = to_u64(f) {
        return Some(i128::from(v));
    }
    to_u64(&-*f).map(|v| -i128::from(v))
}
