//! Deterministic bucketing hash.

const FNV_OFFSET_BASIS: u64 = 0xCBF29CE484222325;
const FNV_PRIME: u64 = 0x100000001B3;

/// Map `key` and `salt` to a stable fraction in `[0.0, 1.0)`.
///
/// The value is the 64-bit FNV-1a hash of `key` followed by `salt`, reduced modulo 100. The
/// two-decimal resolution matches the resolution of rollout percentages and variant splits, and
/// must stay byte-for-byte compatible with server-side evaluation.
pub fn normalized_hash(key: &str, salt: &str) -> f64 {
    let hash = key
        .bytes()
        .chain(salt.bytes())
        .fold(FNV_OFFSET_BASIS, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
        });
    (hash % 100) as f64 / 100.0
}
