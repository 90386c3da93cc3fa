use rand::Rng;
use tracing::debug;

use crate::bucket::BucketSet;
use crate::config::FilterConfig;
use crate::error::{FilterError, Result};
use crate::filters::Filter;
use crate::hash::{ones_mask, optimal_num_of_bits, optimal_num_of_hash_functions, HasherKind};
use crate::stripes::Stripes;

/// Stable bloom filter: counter buckets that are randomly decremented on
/// every insertion, continuously evicting stale information.
///
/// Unlike the classic filter, whose false positive rate eventually reaches 1,
/// the stable filter's rate converges to a fixed constant (the stable
/// point), at the cost of a non-zero false negative rate for items whose
/// counters were evicted. Useful for deduplicating unbounded streams under a
/// memory bound.
pub struct StableBloomFilter {
    buckets: BucketSet,
    num_hash_functions: usize,
    num_buckets: u64,
    /// Counter width; larger values tolerate larger gaps between duplicate
    /// items.
    bits_per_bucket: u32,
    buckets_to_decrement: u64,
    hasher: HasherKind,
    stripes: Stripes,
}

impl StableBloomFilter {
    pub fn create(config: FilterConfig) -> Result<Self> {
        config.validate()?;
        let num_buckets = optimal_num_of_bits(config.capacity, config.false_positive_rate);
        let num_hash_functions =
            optimal_num_of_hash_functions(config.capacity, num_buckets);
        let buckets_to_decrement = optimal_p(
            num_buckets,
            num_hash_functions,
            config.bits_per_bucket,
            config.false_positive_rate,
        );
        debug!(
            num_buckets,
            num_hash_functions,
            bits_per_bucket = config.bits_per_bucket,
            buckets_to_decrement,
            "creating stable bloom filter"
        );
        let bits = config.new_bit_vector(num_buckets * config.bits_per_bucket as u64)?;
        Ok(Self {
            // One counter per bucket.
            buckets: BucketSet::new(config.bits_per_bucket, 1, num_buckets, bits),
            num_hash_functions,
            num_buckets,
            bits_per_bucket: config.bits_per_bucket,
            buckets_to_decrement,
            hasher: config.hasher,
            stripes: Stripes::new(),
        })
    }

    pub fn num_hash_functions(&self) -> usize {
        self.num_hash_functions
    }

    pub fn merge_in_place(&self, other: &StableBloomFilter) -> Result<()> {
        if self.buckets.size_in_bits() != other.buckets.size_in_bits() {
            return Err(FilterError::IncompatibleMerge(
                "cannot merge stable bloom filters with different bit size".into(),
            ));
        }
        if self.num_hash_functions != other.num_hash_functions {
            return Err(FilterError::IncompatibleMerge(
                "cannot merge stable bloom filters with different number of hash functions".into(),
            ));
        }
        let _barrier = self.stripes.write_all();
        self.buckets.put_all(&other.buckets)
    }

    /// Decrement one random counter and `P - 1` adjacent ones. The picks are
    /// not independent, but each cell still has probability `P/m` of being
    /// touched per insertion, and one random draw is cheaper than `P`.
    fn decrement(&self) {
        let pivot = rand::thread_rng().gen_range(0..self.num_buckets);
        for step in 0..self.buckets_to_decrement {
            let index = (pivot + step) % self.num_buckets;
            let _guard = self.stripes.write(index);
            let value = self.buckets.read_tag(index, 0);
            if value != 0 {
                self.buckets.write_tag(index, 0, value - 1);
            }
        }
    }

    /// Limit of the expected fraction of zero counters as insertions go to
    /// infinity; once reached, the filter is considered stable.
    fn stable_point(&self) -> f64 {
        let max_value = ones_mask(self.bits_per_bucket) as f64;
        let sub_denom = self.buckets_to_decrement as f64
            * (1.0 / self.num_hash_functions as f64 - 1.0 / self.num_buckets as f64);
        let denom = 1.0 + 1.0 / sub_denom;
        (1.0 / denom).powf(max_value)
    }
}

/// Number of counters to decrement per insertion, solved from the target
/// false positive rate at the stable point; clamped to at least 1.
fn optimal_p(
    num_buckets: u64,
    num_hash_functions: usize,
    bits_per_bucket: u32,
    fpp: f64,
) -> u64 {
    let max_value = ones_mask(bits_per_bucket) as f64;
    let sub_denom = (1.0 - fpp.powf(1.0 / num_hash_functions as f64)).powf(1.0 / max_value);
    let denom = (1.0 / sub_denom - 1.0)
        * (1.0 / num_hash_functions as f64 - 1.0 / num_buckets as f64);
    let p = (1.0 / denom) as i64;
    if p <= 0 {
        1
    } else {
        p as u64
    }
}

impl Filter for StableBloomFilter {
    fn put(&self, item: &[u8]) -> bool {
        let mut hashes = vec![0u64; self.num_hash_functions];
        self.hasher.hashes(item, &mut hashes);

        // Make room for the new item, then saturate its target counters.
        self.decrement();
        let max_value = ones_mask(self.bits_per_bucket);
        for hash in hashes {
            let index = hash % self.num_buckets;
            let _guard = self.stripes.write(index);
            self.buckets.write_tag(index, 0, max_value);
        }
        // Always true: the counters are overwritten unconditionally.
        true
    }

    fn might_contain(&self, item: &[u8]) -> bool {
        let mut hashes = vec![0u64; self.num_hash_functions];
        self.hasher.hashes(item, &mut hashes);

        for hash in hashes {
            let index = hash % self.num_buckets;
            let _guard = self.stripes.read(index);
            if self.buckets.read_tag(index, 0) == 0 {
                return false;
            }
        }
        true
    }

    fn remove(&self, _item: &[u8]) -> Result<bool> {
        Err(FilterError::Unsupported("remove"))
    }

    fn expected_fpp(&self) -> f64 {
        (1.0 - self.stable_point()).powi(self.num_hash_functions as i32)
    }

    fn clear(&self) {
        let _barrier = self.stripes.write_all();
        self.buckets.clear();
    }

    fn close(&mut self) {
        self.buckets.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimal_p_clamps_to_one() {
        // A tiny filter drives the formula non-positive.
        assert_eq!(optimal_p(10, 1, 1, 0.9), 1);
    }

    #[test]
    fn optimal_p_grows_with_tighter_fpp() {
        let loose = optimal_p(100_000, 7, 8, 0.1);
        let tight = optimal_p(100_000, 7, 8, 0.001);
        assert!(
            tight >= loose,
            "tighter fpp should decrement at least as many buckets ({tight} < {loose})"
        );
    }
}
