//! Hashing for index keys.
//!
//! Host keys are 64-bit: two Murmur3 passes with different seeds, so
//! unrelated hosts practically never share a bucket. Token keys are a single
//! 32-bit pass. The bucket maps hash these precomputed keys again through
//! xxHash.

use std::collections::HashMap;
use std::hash::BuildHasherDefault;

use twox_hash::XxHash64;

/// Hasher used by every bucket map in the match index.
pub type IndexHasher = BuildHasherDefault<XxHash64>;

/// Bucket map keyed by a precomputed hash.
pub type BucketMap<K> = HashMap<K, Vec<u32>, IndexHasher>;

/// 64-bit host key as two 32-bit halves. Never all zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hash64 {
    pub lo: u32,
    pub hi: u32,
}

impl Hash64 {
    #[inline]
    pub const fn to_u64(self) -> u64 {
        ((self.hi as u64) << 32) | (self.lo as u64)
    }
}

const HOST_SEED_LO: u32 = 0x9e37_79b9;
const HOST_SEED_HI: u32 = 0x85eb_ca6b;
const TOKEN_SEED: u32 = 0x811c_9dc5;

const C1: u32 = 0xcc9e_2d51;
const C2: u32 = 0x1b87_3593;

#[inline(always)]
fn scramble(k: u32) -> u32 {
    k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2)
}

#[inline(always)]
fn finalize(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^ (h >> 16)
}

/// Murmur3 x86 32-bit.
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    let mut chunks = data.chunks_exact(4);
    let mut h = seed;

    for chunk in &mut chunks {
        let k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        h = (h ^ scramble(k)).rotate_left(13).wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let k = tail
            .iter()
            .rev()
            .fold(0u32, |acc, &b| (acc << 8) | u32::from(b));
        h ^= scramble(k);
    }

    finalize(h ^ data.len() as u32)
}

/// Host bucket key. Case-insensitive.
pub fn hash_domain(domain: &str) -> Hash64 {
    let lower = domain.to_ascii_lowercase();
    let bytes = lower.as_bytes();

    let hi = murmur3_32(bytes, HOST_SEED_HI);
    let lo = match murmur3_32(bytes, HOST_SEED_LO) {
        0 if hi == 0 => 1,
        lo => lo,
    };
    Hash64 { lo, hi }
}

/// Token bucket key. Callers pass lowercased bytes. Never zero.
pub fn hash_token(token: &[u8]) -> u32 {
    murmur3_32(token, TOKEN_SEED).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn murmur3_reference_vectors() {
        assert_eq!(murmur3_32(b"", 0), 0);
        assert_eq!(murmur3_32(b"", 1), 0x514e_28b7);
        assert_eq!(murmur3_32(b"hello", 0), 0x248b_fa47);
        assert_eq!(murmur3_32(b"Hello, world!", 1234), 0xfaf6_cdb3);
    }

    #[test]
    fn seeds_and_inputs_change_the_hash() {
        assert_ne!(murmur3_32(b"example.com", 0), murmur3_32(b"example.org", 0));
        assert_ne!(murmur3_32(b"example.com", 0), murmur3_32(b"example.com", 1));
    }

    #[test]
    fn domain_keys_ignore_case() {
        assert_eq!(hash_domain("Ads.Example.COM"), hash_domain("ads.example.com"));
        assert_ne!(hash_domain("ads.example.com"), hash_domain("example.com"));
        assert_ne!(hash_domain("").to_u64(), 0);
    }

    #[test]
    fn token_keys_are_nonzero() {
        for token in [&b"banner"[..], b"ads", b"js", b""] {
            assert_ne!(hash_token(token), 0);
        }
    }

    #[test]
    fn bucket_map_round_trip() {
        let mut map: BucketMap<u64> = BucketMap::default();
        map.entry(hash_domain("ads.example.com").to_u64()).or_default().push(3);
        assert_eq!(map.get(&hash_domain("ADS.example.com").to_u64()), Some(&vec![3]));
    }
}
