use std::io::Cursor;

use fnv::FnvHasher;
use murmur3::murmur3_32;
use serde::{Deserialize, Serialize};
use std::hash::Hasher;

/// Mask that clears the sign bit of a 64-bit value, so every emitted index
/// can be reduced with `%` without sign handling.
const POSITIVE_MASK: u64 = i64::MAX as u64;

const C1: u64 = 0x87c37b91114253d5;
const C2: u64 = 0x4cf5ad432745937f;

/// Hashing strategy used to derive bit and bucket indices from an item.
///
/// Every strategy fills a caller-provided slice with non-negative 64-bit
/// values using the double-hashing scheme `h1 + i * h2`, so a single pass
/// over the item yields as many effectively independent indices as a filter
/// needs.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
pub enum HasherKind {
    /// 128-bit murmur3 mix; the two halves seed the double-hashing chain.
    /// This is the default and the only strategy with guaranteed test
    /// vectors.
    #[default]
    Murmur128,
    /// 32-bit murmur3 applied twice, the first digest seeding the second.
    Murmur32,
    /// 32-bit murmur3 combined with FNV-1a, a cheaper pairing for short
    /// keys.
    Murmur32Fnv,
}

impl HasherKind {
    /// Fill `out` with `out.len()` non-negative indices for `item`.
    pub fn hashes(&self, item: &[u8], out: &mut [u64]) {
        match self {
            HasherKind::Murmur128 => {
                let (h1, h2) = murmur3_x64_128(item, 0);
                let mut combined = h1;
                for slot in out.iter_mut() {
                    *slot = combined & POSITIVE_MASK;
                    combined = combined.wrapping_add(h2);
                }
            }
            HasherKind::Murmur32 => {
                let h1 = hash_murmur32(item, 0) as i32;
                let h2 = hash_murmur32(item, h1 as u32) as i32;
                combine32(h1, h2, out);
            }
            HasherKind::Murmur32Fnv => {
                let h1 = hash_murmur32(item, 0) as i32;
                let h2 = hash_fnv32(item) as i32;
                combine32(h1, h2, out);
            }
        }
    }
}

/// `h1 + i * h2` over 32-bit halves, flipping the bits of negative values to
/// keep every index non-negative.
fn combine32(h1: i32, h2: i32, out: &mut [u64]) {
    for (i, slot) in out.iter_mut().enumerate() {
        let mut combined = h1.wrapping_add((i as i32 + 1).wrapping_mul(h2));
        if combined < 0 {
            combined = !combined;
        }
        *slot = combined as u64;
    }
}

pub(crate) fn hash_murmur32(key: &[u8], seed: u32) -> u32 {
    let mut cursor = Cursor::new(key);
    murmur3_32(&mut cursor, seed).expect("murmur3 over an in-memory cursor cannot fail")
}

pub(crate) fn hash_fnv32(key: &[u8]) -> u32 {
    let mut hasher = FnvHasher::default();
    hasher.write(key);
    hasher.finish() as u32
}

/// All-ones mask covering the low `bits` bits; `bits` must be below 64.
pub(crate) fn ones_mask(bits: u32) -> u64 {
    debug_assert!(bits < 64);
    (1u64 << bits) - 1
}

/// Derive a tag from a 64-bit hash by keeping its low `bits_per_tag` bits.
///
/// Tag value 0 is reserved as the empty-slot sentinel, so a zero result is
/// re-mixed through a 32-bit murmur round (seed 17, sign-extended as the
/// 32-bit digest widens) until a nonzero tag appears.
pub(crate) fn fingerprint(hash: u64, bits_per_tag: u32) -> u64 {
    let mask = ones_mask(bits_per_tag);
    let mut hash = hash;
    let mut tag = hash & mask;
    while tag == 0 {
        hash = hash_murmur32(&hash.to_le_bytes(), 17) as i32 as i64 as u64;
        tag = hash & mask;
    }
    tag
}

/// One-shot murmur3 x64/128.
///
/// This is the authoritative mix for index derivation: it must stay
/// bit-for-bit stable because file-mapped filters written by one process are
/// reopened by another.
pub(crate) fn murmur3_x64_128(data: &[u8], seed: u64) -> (u64, u64) {
    let mut h1 = seed;
    let mut h2 = seed;

    let nblocks = data.len() / 16;
    for block in 0..nblocks {
        let k1 = read_u64_le(&data[block * 16..block * 16 + 8]);
        let k2 = read_u64_le(&data[block * 16 + 8..block * 16 + 16]);

        h1 ^= mix_k1(k1);
        h1 = h1.rotate_left(27);
        h1 = h1.wrapping_add(h2);
        h1 = h1.wrapping_mul(5).wrapping_add(0x52dce729);

        h2 ^= mix_k2(k2);
        h2 = h2.rotate_left(31);
        h2 = h2.wrapping_add(h1);
        h2 = h2.wrapping_mul(5).wrapping_add(0x38495ab5);
    }

    let tail = &data[nblocks * 16..];
    if !tail.is_empty() {
        if tail.len() > 8 {
            h2 ^= mix_k2(read_u64_le(&tail[8..]));
        }
        h1 ^= mix_k1(read_u64_le(&tail[..tail.len().min(8)]));
    }

    h1 ^= data.len() as u64;
    h2 ^= data.len() as u64;
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);
    h1 = fmix64(h1);
    h2 = fmix64(h2);
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);
    (h1, h2)
}

/// Little-endian read of up to 8 bytes, zero-padded on the high end.
fn read_u64_le(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

fn mix_k1(mut k1: u64) -> u64 {
    k1 = k1.wrapping_mul(C1);
    k1 = k1.rotate_left(31);
    k1.wrapping_mul(C2)
}

fn mix_k2(mut k2: u64) -> u64 {
    k2 = k2.wrapping_mul(C2);
    k2 = k2.rotate_left(33);
    k2.wrapping_mul(C1)
}

/// Finalization mix, forcing all bits to avalanche.
fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51afd7ed558ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ceb9fe1a85ec53);
    k ^ (k >> 33)
}

/// Optimal bit vector size for `n` expected items at false positive rate
/// `fpp`.
///
/// The formula is `m = -n * ln(fpp) / ln(2)^2`, rounded up: the bit count
/// that minimizes the false positive rate once the hash count is also chosen
/// optimally.
pub fn optimal_num_of_bits(n: u64, fpp: f64) -> u64 {
    let ln2 = std::f64::consts::LN_2;
    ((-(n as f64) * fpp.ln()) / (ln2 * ln2)).ceil() as u64
}

/// Optimal number of hash functions for `n` expected items over `m` bits,
/// `k = (m/n) * ln(2)`, never below 1.
pub fn optimal_num_of_hash_functions(n: u64, m: u64) -> usize {
    let k = ((m as f64 / n as f64) * std::f64::consts::LN_2).round() as i64;
    k.max(1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn murmur128_reference_vectors() {
        let cases: [(&[u8], u64, u64, u64); 6] = [
            (b"hell", 0, 0x629942693e10f867, 0x92db0b82baeb5347),
            (b"hello", 0, 0xa78ddff5adae8d10, 0x128900ef20900135),
            (
                b"The quick brown fox jumps over the lazy dog",
                0,
                0xe34bbc7bbc071b6c,
                0x7a433ca9c49a9347,
            ),
            (
                b"The quick brown fox jumps over the lazy cog",
                0,
                0x658ca970ff85269a,
                0x43fee3eaa68e5c3e,
            ),
            (b"hello ", 2, 0x8a486b23f422e826, 0xf962a2c58947765f),
            (b"hello w", 3, 0x2ea59f466f6bed8c, 0xc610990acc428a17),
        ];
        for (input, seed, h1, h2) in cases {
            assert_eq!(
                murmur3_x64_128(input, seed),
                (h1, h2),
                "mismatch for {:?} seed {}",
                String::from_utf8_lossy(input),
                seed
            );
        }
    }

    #[test]
    fn murmur128_hashes_are_positive_and_chained() {
        let item = b"chained hashes";
        let mut hashes = [0u64; 8];
        HasherKind::Murmur128.hashes(item, &mut hashes);

        let (h1, h2) = murmur3_x64_128(item, 0);
        let mut expected = h1;
        for hash in hashes {
            assert_eq!(hash, expected & POSITIVE_MASK);
            assert!(hash <= i64::MAX as u64, "index must be non-negative");
            expected = expected.wrapping_add(h2);
        }
    }

    #[test]
    fn all_strategies_emit_positive_indices() {
        let mut hashes = [0u64; 16];
        for kind in [
            HasherKind::Murmur128,
            HasherKind::Murmur32,
            HasherKind::Murmur32Fnv,
        ] {
            kind.hashes(b"strategy check", &mut hashes);
            assert!(hashes.iter().all(|&h| h <= i64::MAX as u64));
        }
    }

    #[test]
    fn fingerprint_never_zero() {
        for bits in [1u32, 4, 8, 16, 31] {
            for hash in [0u64, 1, 0xdeadbeef, u64::MAX, 1u64 << 40] {
                let tag = fingerprint(hash, bits);
                assert_ne!(tag, 0, "tag must avoid the empty sentinel");
                assert!(tag <= ones_mask(bits));
            }
        }
    }

    #[test]
    fn sizing_matches_known_values() {
        // 10_000 items at 1% sit near 95_851 bits with 7 hash functions.
        let m = optimal_num_of_bits(10_000, 0.01);
        assert!((90_000..100_000).contains(&m), "unexpected bit count: {m}");
        assert_eq!(optimal_num_of_hash_functions(10_000, m), 7);

        // The hash count never drops below one, however oversized the input.
        assert_eq!(optimal_num_of_hash_functions(1_000_000, 8), 1);
    }
}
