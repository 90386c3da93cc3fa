//! Approximate set-membership filters over a shared bit-level storage layer.
//!
//! This crate provides a family of probabilistic filters with different
//! accuracy and lifecycle trade-offs, all built on the same primitives:
//!
//!   * [`BloomFilter`]: the classic variant, `k` bits per item in one
//!     vector, no false negatives, remove unsupported.
//!   * [`PartitionedBloomFilter`]: the vector split into `k` equal slices,
//!     one bit per slice per item; the building block of the scalable
//!     filter.
//!   * [`StableBloomFilter`]: counter buckets with random decrement on
//!     insert; bounded steady-state false positive rate at the cost of
//!     false negatives for stale items.
//!   * [`CuckooFilter`]: fingerprint storage with two candidate buckets and
//!     an eviction chain; supports removal.
//!   * [`ScalableBloomFilter`]: a cascade of partitioned filters added as
//!     each one fills, for data sets of unknown size.
//!
//! Underneath, a [`BitVector`] holds the bits on the heap, in anonymous
//! off-heap memory, or mapped over a file (in which case the raw
//! little-endian word image survives the process and can be reopened), and
//! a [`BucketSet`] packs fixed-width tags into fixed-capacity buckets for
//! the stable and cuckoo variants.
//!
//! All filters are thread-safe: bit words are atomic and every filter
//! stripes its operations over 32 read-write locks, so concurrent inserts
//! and queries only contend when they collide on a stripe.
//!
//! Filters are built from a [`FilterConfig`] (or [`ScalableFilterConfig`])
//! via each variant's `create`:
//!
//! ```
//! use bloomset::{BloomFilter, Filter, FilterConfigBuilder};
//!
//! let config = FilterConfigBuilder::default()
//!     .capacity(10_000)
//!     .false_positive_rate(0.01)
//!     .build()
//!     .unwrap();
//! let filter = BloomFilter::create(config).unwrap();
//! filter.put(b"item");
//! assert!(filter.might_contain(b"item"));
//! ```

pub mod bits;
pub mod bucket;
pub mod config;
pub mod error;
pub mod filters;
pub mod hash;
mod stripes;

pub use bits::BitVector;
pub use bucket::BucketSet;
pub use config::{
    FilterConfig, FilterConfigBuilder, ScalableFilterConfig, ScalableFilterConfigBuilder,
};
pub use error::{FilterError, Result};
pub use filters::{
    BloomFilter, CuckooFilter, Filter, PartitionedBloomFilter, ScalableBloomFilter,
    StableBloomFilter,
};
pub use hash::{optimal_num_of_bits, optimal_num_of_hash_functions, HasherKind};
