use tracing::debug;

use crate::bits::BitVector;
use crate::config::FilterConfig;
use crate::error::{FilterError, Result};
use crate::filters::Filter;
use crate::hash::{optimal_num_of_bits, optimal_num_of_hash_functions, HasherKind};
use crate::stripes::Stripes;

/// Classic bloom filter: each item sets `k` bits in one shared vector.
///
/// No false negatives; the false positive rate degrades as the vector fills.
pub struct BloomFilter {
    bits: BitVector,
    num_hash_functions: usize,
    hasher: HasherKind,
    stripes: Stripes,
}

impl BloomFilter {
    pub fn create(config: FilterConfig) -> Result<Self> {
        config.validate()?;
        let num_bits = optimal_num_of_bits(config.capacity, config.false_positive_rate);
        let num_hash_functions = optimal_num_of_hash_functions(config.capacity, num_bits);
        debug!(num_bits, num_hash_functions, "creating bloom filter");
        let bits = config.new_bit_vector(num_bits)?;
        Ok(Self {
            bits,
            num_hash_functions,
            hasher: config.hasher,
            stripes: Stripes::new(),
        })
    }

    pub fn num_hash_functions(&self) -> usize {
        self.num_hash_functions
    }

    pub fn bit_size(&self) -> u64 {
        self.bits.bit_size()
    }

    /// Merge `other` into this filter with a bitwise OR. Both filters must
    /// have the same bit size and hash count.
    pub fn merge_in_place(&self, other: &BloomFilter) -> Result<()> {
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

impl Filter for BloomFilter {
    fn put(&self, item: &[u8]) -> bool {
        let bit_size = self.bits.bit_size();
        let mut hashes = vec![0u64; self.num_hash_functions];
        self.hasher.hashes(item, &mut hashes);

        let mut bits_changed = false;
        for hash in hashes {
            let index = hash % bit_size;
            let _guard = self.stripes.write(index);
            bits_changed |= self.bits.set(index);
        }
        bits_changed
    }

    fn might_contain(&self, item: &[u8]) -> bool {
        let bit_size = self.bits.bit_size();
        let mut hashes = vec![0u64; self.num_hash_functions];
        self.hasher.hashes(item, &mut hashes);

        for hash in hashes {
            let index = hash % bit_size;
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
    }

    fn close(&mut self) {
        self.bits.close();
    }
}

impl PartialEq for BloomFilter {
    fn eq(&self, other: &Self) -> bool {
        self.num_hash_functions == other.num_hash_functions && self.bits == other.bits
    }
}
