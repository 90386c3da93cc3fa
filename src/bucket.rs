use tracing::debug;

use crate::bits::BitVector;
use crate::error::Result;

/// Logical view over a [`BitVector`] that packs fixed-width tags into
/// fixed-capacity buckets.
///
/// Bucket `b`, position `p` occupies the `bits_per_tag` bits starting at
/// `(b * tags_per_bucket + p) * bits_per_tag`, written big-endian within the
/// slot. Tag value 0 marks an empty slot, so writers must never store 0 as a
/// live tag.
pub struct BucketSet {
    bits_per_tag: u32,
    tags_per_bucket: usize,
    num_buckets: u64,
    bits: BitVector,
}

impl BucketSet {
    pub(crate) fn new(
        bits_per_tag: u32,
        tags_per_bucket: usize,
        num_buckets: u64,
        bits: BitVector,
    ) -> Self {
        debug_assert!((1..64).contains(&bits_per_tag));
        debug_assert!(bits.bit_size() >= bits_per_tag as u64 * tags_per_bucket as u64 * num_buckets);
        debug!(
            num_buckets,
            tags_per_bucket,
            bits_per_tag,
            total_bits = bits.bit_size(),
            "creating bucket set"
        );
        Self {
            bits_per_tag,
            tags_per_bucket,
            num_buckets,
            bits,
        }
    }

    fn start_pos(&self, bucket: u64, pos: usize) -> u64 {
        (bucket * self.tags_per_bucket as u64 + pos as u64) * self.bits_per_tag as u64
    }

    /// Read the tag at `(bucket, pos)`.
    pub fn read_tag(&self, bucket: u64, pos: usize) -> u64 {
        let start = self.start_pos(bucket, pos);
        let mut tag = 0u64;
        let mut mask = 1u64 << (self.bits_per_tag - 1);
        for index in start..start + self.bits_per_tag as u64 {
            if self.bits.get(index) {
                tag |= mask;
            }
            mask >>= 1;
        }
        tag
    }

    /// Overwrite the slot at `(bucket, pos)` with `tag`.
    pub fn write_tag(&self, bucket: u64, pos: usize, tag: u64) {
        let start = self.start_pos(bucket, pos);
        let mut mask = 1u64 << (self.bits_per_tag - 1);
        for index in start..start + self.bits_per_tag as u64 {
            if tag & mask == 0 {
                self.bits.unset(index);
            } else {
                self.bits.set(index);
            }
            mask >>= 1;
        }
    }

    /// Clear the slot at `(bucket, pos)` back to the empty sentinel.
    pub fn delete_tag(&self, bucket: u64, pos: usize) {
        self.write_tag(bucket, pos, 0);
    }

    /// Scan the bucket for `tag`, returning the first position holding it.
    pub fn check_tag(&self, bucket: u64, tag: u64) -> Option<usize> {
        (0..self.tags_per_bucket).find(|&pos| self.read_tag(bucket, pos) == tag)
    }

    /// First empty slot in the bucket, if any.
    pub fn free_pos_in_bucket(&self, bucket: u64) -> Option<usize> {
        self.check_tag(bucket, 0)
    }

    /// Append `tag` to the bucket. Returns true if the tag was written or is
    /// already present, false if the bucket is full.
    pub fn append(&self, bucket: u64, tag: u64) -> bool {
        if self.check_tag(bucket, tag).is_some() {
            return true;
        }
        match self.free_pos_in_bucket(bucket) {
            Some(pos) => {
                self.write_tag(bucket, pos, tag);
                true
            }
            None => false,
        }
    }

    pub fn put_all(&self, other: &BucketSet) -> Result<()> {
        self.bits.put_all(&other.bits)
    }

    pub fn clear(&self) {
        self.bits.clear();
    }

    pub fn size_in_bits(&self) -> u64 {
        self.bits.bit_size()
    }

    pub fn close(&mut self) {
        self.bits.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket_set(bits_per_tag: u32, tags_per_bucket: usize, num_buckets: u64) -> BucketSet {
        let total = bits_per_tag as u64 * tags_per_bucket as u64 * num_buckets;
        BucketSet::new(
            bits_per_tag,
            tags_per_bucket,
            num_buckets,
            BitVector::on_heap(total).unwrap(),
        )
    }

    #[test]
    fn widest_tag_round_trips() {
        let buckets = bucket_set(31, 7, 13);
        let tag = (1u64 << 31) - 1;
        assert!(buckets.append(10, tag));
        assert_eq!(buckets.check_tag(10, tag), Some(0));
        assert_eq!(buckets.read_tag(10, 0), tag);
        buckets.delete_tag(10, 0);
        assert_eq!(buckets.check_tag(10, tag), None);
    }

    #[test]
    fn write_read_round_trip_across_slots() {
        let buckets = bucket_set(9, 4, 8);
        for pos in 0..4 {
            let tag = 0x155 ^ pos as u64;
            buckets.write_tag(3, pos, tag);
            assert_eq!(buckets.read_tag(3, pos), tag);
        }
        // Neighbouring buckets are untouched.
        for pos in 0..4 {
            assert_eq!(buckets.read_tag(2, pos), 0);
            assert_eq!(buckets.read_tag(4, pos), 0);
        }
    }

    #[test]
    fn check_tag_returns_lowest_position() {
        let buckets = bucket_set(8, 4, 4);
        buckets.write_tag(1, 1, 42);
        buckets.write_tag(1, 3, 42);
        assert_eq!(buckets.check_tag(1, 42), Some(1));
    }

    #[test]
    fn append_is_idempotent_and_bounded() {
        let buckets = bucket_set(8, 2, 4);
        assert!(buckets.append(0, 7));
        assert!(buckets.append(0, 7), "existing tag reports success");
        assert!(buckets.append(0, 9));
        assert!(!buckets.append(0, 11), "full bucket rejects a new tag");
        assert_eq!(buckets.free_pos_in_bucket(0), None);
    }
}
