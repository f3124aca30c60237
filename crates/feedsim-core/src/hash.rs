//! The portable hash family `H` used for content-addressed ids and the
//! ranker's seeded tie-break.
//!
//! Two distinct jobs share the name "hash" here, and it's deliberate that
//! they use different algorithms:
//!
//! - **Id derivation** (`derive_id`) needs collision resistance across an
//!   unbounded universe of caller-supplied strings (`op_id`s), so it goes
//!   through `blake3`.
//! - **Ranker tie-break** (`splitmix64`) needs to be *fast* (it runs once per
//!   candidate post per timeline) and only needs to scatter a 64-bit seed
//!   across a 64-bit range, so a splitmix-style integer mixer is enough and
//!   avoids pulling a cryptographic hash onto the ranker's hot path.

/// Derives a stable 16-byte id from a sequence of domain-separated byte
/// strings, e.g. `derive_id(&[b"post", op_id.as_bytes()])`.
///
/// Each part is length-prefixed before hashing so that `derive_id(&[a, b])`
/// can never collide with `derive_id(&[ab])` for some split of the same
/// concatenation.
pub fn derive_id(parts: &[&[u8]]) -> [u8; 16] {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest.as_bytes()[..16]);
    out
}

/// The 64-bit splitmix mixer (Steele, Lea & Flood 2014), used here purely as
/// a deterministic integer scrambler, not as a PRNG stream.
pub fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Folds an arbitrary byte string down to `u64` by XOR-ing it 8 bytes at a
/// time (zero-padding the final chunk). Order-dependent, so distinct ids
/// reliably fold to distinct values in practice even though this isn't a
/// cryptographic reduction.
fn fold_to_u64(bytes: &[u8]) -> u64 {
    let mut acc = 0u64;
    for chunk in bytes.chunks(8) {
        let mut buf = [0u8; 8];
        buf[..chunk.len()].copy_from_slice(chunk);
        acc ^= u64::from_le_bytes(buf);
    }
    acc
}

/// `H(seed, id_bytes)`: the deterministic tie-break key used by the ranker
/// and, degenerately, anywhere else two 64-bit values need a
/// stable, portable combination.
pub fn mix_seed_with_bytes(seed: u64, id_bytes: &[u8]) -> u64 {
    splitmix64(seed ^ splitmix64(fold_to_u64(id_bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn derive_id_is_deterministic_and_domain_separated() {
        let a = derive_id(&[b"post", b"op-1"]);
        let b = derive_id(&[b"post", b"op-1"]);
        assert_eq!(a, b);

        let c = derive_id(&[b"comment", b"op-1"]);
        assert_ne!(a, c, "different kind tag must not collide");

        // Length-prefixing must prevent a naive-concatenation collision.
        let split_ab = derive_id(&[b"ab", b"cd"]);
        let split_a_bcd = derive_id(&[b"a", b"bcd"]);
        assert_ne!(split_ab, split_a_bcd);
    }

    #[test_log::test]
    fn tie_break_changes_with_seed() {
        let id_bytes = derive_id(&[b"post", b"x"]);
        let a = mix_seed_with_bytes(42, &id_bytes);
        let b = mix_seed_with_bytes(43, &id_bytes);
        assert_ne!(a, b);
    }

    #[test_log::test]
    fn splitmix64_is_pure() {
        assert_eq!(splitmix64(0), splitmix64(0));
        assert_ne!(splitmix64(0), splitmix64(1));
    }
}
