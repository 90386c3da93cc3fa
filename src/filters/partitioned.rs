use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::bits::BitVector;
use crate::config::FilterConfig;
use crate::error::{FilterError, Result};
use crate::filters::Filter;
use crate::hash::{optimal_num_of_bits, optimal_num_of_hash_functions, HasherKind};
use crate::stripes::Stripes;

/// Bloom filter whose bit vector is partitioned into `k` equal slices, one
/// per hash function; each item occupies exactly one bit per slice.
///
/// The uniform per-item footprint makes the fill ratio a reliable growth
/// signal, which is why [`crate::ScalableBloomFilter`] builds on this
/// variant rather than the classic one.
pub struct PartitionedBloomFilter {
    bits: BitVector,
    num_hash_functions: usize,
    hasher: HasherKind,
    slice_size: u64,
    num_items: AtomicU64,
    stripes: Stripes,
}

impl PartitionedBloomFilter {
    pub fn create(config: FilterConfig) -> Result<Self> {
        config.validate()?;
        let mut num_bits = optimal_num_of_bits(config.capacity, config.false_positive_rate);
        let num_hash_functions = optimal_num_of_hash_functions(config.capacity, num_bits);
        // Align the bit count to a multiple of k so every slice is equal.
        num_bits = num_bits.div_ceil(num_hash_functions as u64) * num_hash_functions as u64;
        let slice_size = num_bits / num_hash_functions as u64;
        debug!(
            num_bits,
            num_hash_functions, slice_size, "creating partitioned bloom filter"
        );
        let bits = config.new_bit_vector(num_bits)?;
        Ok(Self {
            bits,
            num_hash_functions,
            hasher: config.hasher,
            slice_size,
            num_items: AtomicU64::new(0),
            stripes: Stripes::new(),
        })
    }

    pub fn num_hash_functions(&self) -> usize {
        self.num_hash_functions
    }

    pub fn bit_size(&self) -> u64 {
        self.bits.bit_size()
    }

    /// Estimated fraction of each slice consumed by the items inserted so
    /// far, `1 - e^(-n/m)` for `n` items over slices of `m` bits.
    pub fn estimated_fill_ratio(&self) -> f64 {
        let items = self.num_items.load(Ordering::Relaxed) as f64;
        1.0 - (-items / self.slice_size as f64).exp()
    }

    pub fn merge_in_place(&self, other: &PartitionedBloomFilter) -> Result<()> {
        if self.bit_size() != other.bit_size() {
            return Err(FilterError::IncompatibleMerge(
                "cannot merge bloom filters with different bit size".into(),
            ));
        }
        if self.num_hash_functions != other.num_hash_functions {
            return Err(FilterError::IncompatibleMerge(
                "cannot merge bloom filters with different number of hash functions".into(),
            ));
        }
        let _barrier = self.stripes.write_all();
        self.bits.put_all(&other.bits)
    }
}

impl Filter for PartitionedBloomFilter {
    fn put(&self, item: &[u8]) -> bool {
        let mut hashes = vec![0u64; self.num_hash_functions];
        self.hasher.hashes(item, &mut hashes);

        let mut bits_changed = false;
        for (slice, hash) in hashes.into_iter().enumerate() {
            let index = slice as u64 * self.slice_size + hash % self.slice_size;
            let _guard = self.stripes.write(index);
            bits_changed |= self.bits.set(index);
        }
        if bits_changed {
            self.num_items.fetch_add(1, Ordering::Relaxed);
        }
        bits_changed
    }

    fn might_contain(&self, item: &[u8]) -> bool {
        let mut hashes = vec![0u64; self.num_hash_functions];
        self.hasher.hashes(item, &mut hashes);

        for (slice, hash) in hashes.into_iter().enumerate() {
            let index = slice as u64 * self.slice_size + hash % self.slice_size;
            let _guard = self.stripes.read(index);
            if !self.bits.get(index) {
                return false;
            }
        }
        true
    }

    fn remove(&self, _item: &[u8]) -> Result<bool> {
        Err(FilterError::Unsupported("remove"))
    }

    fn expected_fpp(&self) -> f64 {
        let fill = self.bits.cardinality() as f64 / self.bits.bit_size() as f64;
        fill.powi(self.num_hash_functions as i32)
    }

    fn clear(&self) {
        let _barrier = self.stripes.write_all();
        self.bits.clear();
        // num_items is kept: a cleared member of a scalable filter still
        // reports its old fill ratio until replaced.
    }

    fn close(&mut self) {
        self.bits.close();
    }
}

impl PartialEq for PartitionedBloomFilter {
    fn eq(&self, other: &Self) -> bool {
        self.num_hash_functions == other.num_hash_functions && self.bits == other.bits
    }
}
