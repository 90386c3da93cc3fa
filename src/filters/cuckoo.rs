use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use tracing::{debug, warn};

use crate::bucket::BucketSet;
use crate::config::FilterConfig;
use crate::error::{FilterError, Result};
use crate::filters::Filter;
use crate::hash::{fingerprint, HasherKind};
use crate::stripes::Stripes;

/// Maximum number of evictions before an insertion is abandoned and the
/// filter reports itself full.
const MAX_KICK_NUM: usize = 500;

const MAX_ENTRIES_PER_BUCKET: usize = 8;
const MIN_ENTRIES_PER_BUCKET: usize = 2;

/// Lowest supported false positive rate, 2^-60.
const MIN_FPP: f64 = 1.0 / (1u64 << 60) as f64;

/// Multiplier for the partial-key alternate index; any large odd constant
/// works, this one is borrowed from murmur hashing.
const ALT_INDEX_SEED: u64 = 0x5bd1e995;

/// Cuckoo filter: stores short fingerprints in two candidate buckets with an
/// eviction chain, supporting removal.
///
/// An item is present iff its fingerprint appears in its primary or
/// alternate bucket. Removing an item inserted twice under the same
/// fingerprint may remove both sightings at once; that imprecision is
/// accepted.
pub struct CuckooFilter {
    table: BucketSet,
    bits_per_tag: u32,
    num_buckets: u64,
    tags_per_bucket: usize,
    count: AtomicU64,
    hasher: HasherKind,
    stripes: Stripes,
}

/// Tags per bucket for a target false positive rate.
fn optimal_entries_per_bucket(fpp: f64) -> usize {
    if fpp <= 0.00001 {
        MAX_ENTRIES_PER_BUCKET
    } else if fpp <= 0.002 {
        MAX_ENTRIES_PER_BUCKET / 2
    } else {
        MIN_ENTRIES_PER_BUCKET
    }
}

/// Achievable load factor for a bucket width; fuller buckets absorb more
/// collisions before the eviction chain gives up.
fn optimal_load_factor(tags_per_bucket: usize) -> f64 {
    debug_assert!(matches!(tags_per_bucket, 2 | 4 | 8));
    match tags_per_bucket {
        2 => 0.84,
        4 => 0.955,
        _ => 0.98,
    }
}

fn optimal_bits_per_entry(fpp: f64, tags_per_bucket: usize) -> Result<u32> {
    if fpp < MIN_FPP {
        return Err(FilterError::InvalidConfig(format!(
            "false positive rate ({fpp}) is below the supported minimum ({MIN_FPP})"
        )));
    }
    Ok(((1.0 / fpp + 3.0).log2() / optimal_load_factor(tags_per_bucket)).ceil() as u32)
}

/// Smallest even bucket count able to hold `n` items at the target load
/// factor. An even count is required for the alternate-index function to be
/// an involution.
fn optimal_number_of_buckets(n: u64, tags_per_bucket: usize) -> u64 {
    let per_load = (n as f64 / optimal_load_factor(tags_per_bucket)).ceil() as u64;
    even_ceil(divide(per_load, tags_per_bucket as u64))
}

fn divide(p: u64, q: u64) -> u64 {
    p / q + 1
}

fn even_ceil(n: u64) -> u64 {
    (n + 1) / 2 * 2
}

impl CuckooFilter {
    pub fn create(config: FilterConfig) -> Result<Self> {
        config.validate()?;
        let tags_per_bucket = optimal_entries_per_bucket(config.false_positive_rate);
        let num_buckets = optimal_number_of_buckets(config.capacity, tags_per_bucket);
        let bits_per_tag = optimal_bits_per_entry(config.false_positive_rate, tags_per_bucket)?;
        debug!(
            num_buckets,
            tags_per_bucket, bits_per_tag, "creating cuckoo filter"
        );
        let total_bits = bits_per_tag as u64 * tags_per_bucket as u64 * num_buckets;
        let bits = config.new_bit_vector(total_bits)?;
        Ok(Self {
            table: BucketSet::new(bits_per_tag, tags_per_bucket, num_buckets, bits),
            bits_per_tag,
            num_buckets,
            tags_per_bucket,
            count: AtomicU64::new(0),
            hasher: config.hasher,
            stripes: Stripes::new(),
        })
    }

    /// Number of successfully inserted and not yet removed items.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn merge_in_place(&self, _other: &CuckooFilter) -> Result<()> {
        Err(FilterError::Unsupported("merge_in_place"))
    }

    fn indices(&self, item: &[u8]) -> (u64, u64) {
        let mut hashes = [0u64; 2];
        self.hasher.hashes(item, &mut hashes);
        (
            hashes[0] % self.num_buckets,
            fingerprint(hashes[1], self.bits_per_tag),
        )
    }

    /// Walk the eviction chain starting at the alternate bucket, displacing
    /// a random resident tag whenever the current bucket is full. Each hop
    /// holds only the stripe of the bucket it rewrites.
    fn put_in_alt(&self, bucket: u64, mut tag: u64) -> bool {
        let mut alt = self.alt_index(bucket, tag);
        let mut added = false;
        let mut kicks = 0;
        while !added && kicks < MAX_KICK_NUM {
            {
                let _guard = self.stripes.write(alt);
                added = self.table.append(alt, tag);
                if !added {
                    let victim = rand::thread_rng().gen_range(0..self.tags_per_bucket);
                    let evicted = self.table.read_tag(alt, victim);
                    self.table.write_tag(alt, victim, tag);
                    tag = evicted;
                }
            }
            if !added {
                alt = self.alt_index(alt, tag);
            }
            kicks += 1;
        }
        added
    }

    /// Alternate bucket for `tag`, computed from the current bucket alone so
    /// a displaced tag can always find its partner:
    /// `alt_index(alt_index(b, t), t) == b`.
    fn alt_index(&self, bucket: u64, tag: u64) -> u64 {
        let hash2 = tag.wrapping_mul(ALT_INDEX_SEED) & i64::MAX as u64;
        let offset = (hash2 | 1) as i64 * parsign(bucket);
        let modulus = self.num_buckets as i64;
        protected_sum(bucket as i64, offset, modulus).rem_euclid(modulus) as u64
    }
}

/// +1 for even bucket indices, -1 for odd ones; paired with an odd offset
/// and an even bucket count this makes the alternate index reversible.
fn parsign(bucket: u64) -> i64 {
    if bucket & 1 == 0 {
        1
    } else {
        -1
    }
}

/// `index + offset` with the index reduced by the modulus until the sum can
/// no longer overflow.
fn protected_sum(mut index: i64, offset: i64, modulus: i64) -> i64 {
    while !can_sum(index, offset) {
        index -= modulus;
    }
    index + offset
}

fn can_sum(a: i64, b: i64) -> bool {
    (a ^ b) < 0 || (a ^ a.wrapping_add(b)) >= 0
}

impl Filter for CuckooFilter {
    fn put(&self, item: &[u8]) -> bool {
        let (bucket, tag) = self.indices(item);
        let mut added = {
            let _guard = self.stripes.write(bucket);
            self.table.append(bucket, tag)
        };
        if !added {
            added = self.put_in_alt(bucket, tag);
        }
        if added {
            self.count.fetch_add(1, Ordering::Relaxed);
        } else {
            warn!(
                count = self.count(),
                "cuckoo table exceeded capacity, dropping item"
            );
        }
        added
    }

    fn might_contain(&self, item: &[u8]) -> bool {
        let (bucket, tag) = self.indices(item);
        let in_primary = {
            let _guard = self.stripes.read(bucket);
            self.table.check_tag(bucket, tag).is_some()
        };
        if in_primary {
            return true;
        }
        let alt = self.alt_index(bucket, tag);
        let _guard = self.stripes.read(alt);
        self.table.check_tag(alt, tag).is_some()
    }

    fn remove(&self, item: &[u8]) -> Result<bool> {
        let (bucket, tag) = self.indices(item);
        let mut deleted = {
            let _guard = self.stripes.write(bucket);
            match self.table.check_tag(bucket, tag) {
                Some(pos) => {
                    self.table.delete_tag(bucket, pos);
                    true
                }
                None => false,
            }
        };
        if !deleted {
            let alt = self.alt_index(bucket, tag);
            let _guard = self.stripes.write(alt);
            if let Some(pos) = self.table.check_tag(alt, tag) {
                self.table.delete_tag(alt, pos);
                deleted = true;
            }
        }
        if deleted {
            self.count.fetch_sub(1, Ordering::Relaxed);
        }
        Ok(deleted)
    }

    fn expected_fpp(&self) -> f64 {
        let slots = (self.num_buckets * self.tags_per_bucket as u64) as f64;
        let load = self.count() as f64 / slots;
        let tag_space = (self.bits_per_tag as f64).exp2();
        1.0 - ((tag_space - 2.0) / (tag_space - 1.0))
            .powf(2.0 * self.tags_per_bucket as f64 * load)
    }

    fn clear(&self) {
        let _barrier = self.stripes.write_all();
        self.table.clear();
        self.count.store(0, Ordering::Relaxed);
    }

    fn close(&mut self) {
        self.table.close();
    }
}
