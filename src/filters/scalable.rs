use std::collections::VecDeque;

use parking_lot::RwLock;
use tracing::{debug, error};

use crate::config::{FilterConfig, ScalableFilterConfig};
use crate::error::{FilterError, Result};
use crate::filters::{Filter, PartitionedBloomFilter};
use crate::hash::HasherKind;

/// Scalable bloom filter: an ordered collection of partitioned filters that
/// grows geometrically as members fill up.
///
/// Useful when the size of the data set is not known up front and memory is
/// not the binding constraint; for bounded memory consider
/// [`crate::StableBloomFilter`] instead. Each new member targets a tighter
/// false positive rate so the compound rate stays close to the configured
/// one.
pub struct ScalableBloomFilter {
    false_positive_rate: f64,
    /// Fill ratio that marks the active member as full; doubles as the
    /// per-level fpp tightening multiplier.
    partition_fill_ratio: f64,
    capacity_hint: u64,
    use_off_heap_memory: bool,
    hasher: HasherKind,
    /// Members, newest first. The write lock is the single-writer guard for
    /// growth; reads iterate under the read lock.
    filters: RwLock<VecDeque<PartitionedBloomFilter>>,
}

impl ScalableBloomFilter {
    pub fn create(config: ScalableFilterConfig) -> Result<Self> {
        config.validate()?;
        let filter = Self {
            false_positive_rate: config.false_positive_rate,
            partition_fill_ratio: config.partition_fill_ratio,
            capacity_hint: config.capacity,
            use_off_heap_memory: config.use_off_heap_memory,
            hasher: config.hasher,
            filters: RwLock::new(VecDeque::new()),
        };
        let first = filter.new_member(0)?;
        filter.filters.write().push_front(first);
        Ok(filter)
    }

    /// Number of member filters currently held.
    pub fn num_members(&self) -> usize {
        self.filters.read().len()
    }

    pub fn merge_in_place(&self, _other: &ScalableBloomFilter) -> Result<()> {
        Err(FilterError::Unsupported("merge_in_place"))
    }

    /// Allocate the member for `level`, tightening its target fpp so the
    /// compound rate stays near the configured one.
    fn new_member(&self, level: usize) -> Result<PartitionedBloomFilter> {
        let fpp = self.false_positive_rate * self.partition_fill_ratio.powi(level as i32);
        debug!(level, fpp, "growing scalable bloom filter");
        PartitionedBloomFilter::create(FilterConfig {
            capacity: self.capacity_hint,
            false_positive_rate: fpp,
            use_off_heap_memory: self.use_off_heap_memory,
            mapped_file: None,
            hasher: self.hasher,
            bits_per_bucket: 1,
        })
    }
}

impl Filter for ScalableBloomFilter {
    fn put(&self, item: &[u8]) -> bool {
        // Double-checked promotion: cheap read-side check first, re-checked
        // under the write lock that also publishes the new member.
        let needs_growth = {
            let filters = self.filters.read();
            let active = filters.front().expect("scalable filter has no members");
            active.estimated_fill_ratio() >= self.partition_fill_ratio
        };
        if needs_growth {
            let mut filters = self.filters.write();
            let active = filters.front().expect("scalable filter has no members");
            if active.estimated_fill_ratio() >= self.partition_fill_ratio {
                match self.new_member(filters.len()) {
                    Ok(member) => filters.push_front(member),
                    Err(err) => {
                        error!("cannot grow scalable bloom filter: {err}");
                        return false;
                    }
                }
            }
        }

        let filters = self.filters.read();
        let active = filters.front().expect("scalable filter has no members");
        active.put(item)
    }

    fn might_contain(&self, item: &[u8]) -> bool {
        self.filters
            .read()
            .iter()
            .any(|filter| filter.might_contain(item))
    }

    fn remove(&self, _item: &[u8]) -> Result<bool> {
        Err(FilterError::Unsupported("remove"))
    }

    fn expected_fpp(&self) -> f64 {
        let compound: f64 = self
            .filters
            .read()
            .iter()
            .map(|filter| 1.0 - filter.expected_fpp())
            .product();
        1.0 - compound
    }

    /// Close every member but one and clear the survivor's bits. The
    /// survivor keeps its item counter, so the next insertion may
    /// immediately allocate a fresh member.
    fn clear(&self) {
        let mut filters = self.filters.write();
        while filters.len() > 1 {
            if let Some(mut filter) = filters.pop_front() {
                filter.close();
            }
        }
        if let Some(filter) = filters.front() {
            filter.clear();
        }
    }

    fn close(&mut self) {
        let filters = self.filters.get_mut();
        while let Some(mut filter) = filters.pop_front() {
            filter.close();
        }
    }
}
