use std::fs::{File, OpenOptions};
use std::path::Path;
use std::slice;
use std::sync::atomic::{AtomicU64, Ordering};

use memmap2::MmapMut;
use tracing::{debug, error};

use crate::error::{FilterError, Result};

/// Contiguous addressable bit array backed by heap words, anonymous off-heap
/// memory, or a read-write file mapping.
///
/// Bit `i` lives in word `i >> 6` at position `i & 63`; words are 64 bits
/// and the file-mapped image stores them little-endian with no header, so a
/// process reopening the same file with the same bit size observes the
/// stored state.
///
/// Words are atomic: single-bit reads and writes are safe under the striped
/// locks of the owning filter even when neighbouring bits of the same word
/// belong to different stripes.
pub struct BitVector {
    backing: Backing,
    num_bits: u64,
    cardinality: AtomicU64,
}

enum Backing {
    /// Heap-resident words. `close` is a no-op for this backing.
    Heap(Box<[AtomicU64]>),
    /// Anonymous off-heap mapping, freed on close.
    Anon(MmapMut),
    /// File mapping; the handle keeps the file open until close unmaps it.
    FileMapped { map: MmapMut, _file: File },
    /// Terminal state once an off-heap vector is closed.
    Closed,
}

fn num_words(num_bits: u64) -> Result<usize> {
    if num_bits == 0 {
        return Err(FilterError::InvalidConfig(
            "bit vector size must be positive".into(),
        ));
    }
    Ok(num_bits.div_ceil(64) as usize)
}

fn map_words(map: &MmapMut, len: usize) -> &[AtomicU64] {
    debug_assert_eq!(map.len(), len * 8);
    // Mappings are page-aligned, which satisfies AtomicU64 alignment.
    unsafe { slice::from_raw_parts(map.as_ptr() as *const AtomicU64, len) }
}

impl BitVector {
    /// Create a zeroed heap-resident bit vector.
    pub fn on_heap(num_bits: u64) -> Result<Self> {
        let words = num_words(num_bits)?;
        let data = (0..words).map(|_| AtomicU64::new(0)).collect();
        Ok(Self {
            backing: Backing::Heap(data),
            num_bits,
            cardinality: AtomicU64::new(0),
        })
    }

    /// Create a zeroed bit vector in anonymous off-heap memory.
    pub fn off_heap(num_bits: u64) -> Result<Self> {
        let words = num_words(num_bits)?;
        debug!(num_bits, "allocating off-heap memory");
        let map = MmapMut::map_anon(words * 8)?;
        Ok(Self {
            backing: Backing::Anon(map),
            num_bits,
            cardinality: AtomicU64::new(0),
        })
    }

    /// Map a bit vector over `path`, opening the file read-write and
    /// extending it to the required word-aligned byte length. Reopening an
    /// existing file of the same length restores the stored bits; the
    /// cardinality is recomputed from the mapped words.
    pub fn file_mapped(path: &Path, num_bits: u64) -> Result<Self> {
        let words = num_words(num_bits)?;
        debug!(?path, num_bits, "mapping bit vector to file");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.set_len(words as u64 * 8)?;
        let map = unsafe { MmapMut::map_mut(&file)? };
        let cardinality = map_words(&map, words)
            .iter()
            .map(|word| word.load(Ordering::Relaxed).count_ones() as u64)
            .sum();
        Ok(Self {
            backing: Backing::FileMapped { map, _file: file },
            num_bits,
            cardinality: AtomicU64::new(cardinality),
        })
    }

    fn words(&self) -> &[AtomicU64] {
        match &self.backing {
            Backing::Heap(data) => data,
            Backing::Anon(map) => map_words(map, self.num_bits.div_ceil(64) as usize),
            Backing::FileMapped { map, .. } => {
                map_words(map, self.num_bits.div_ceil(64) as usize)
            }
            Backing::Closed => panic!("bit vector used after close"),
        }
    }

    pub fn get(&self, index: u64) -> bool {
        debug_assert!(index < self.num_bits);
        let mask = 1u64 << (index & 63);
        self.words()[(index >> 6) as usize].load(Ordering::Acquire) & mask != 0
    }

    /// Set bit `index`, returning true iff it transitioned 0 to 1.
    pub fn set(&self, index: u64) -> bool {
        debug_assert!(index < self.num_bits);
        let mask = 1u64 << (index & 63);
        let prev = self.words()[(index >> 6) as usize].fetch_or(mask, Ordering::AcqRel);
        if prev & mask == 0 {
            self.cardinality.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Unset bit `index`, returning true iff it transitioned 1 to 0.
    pub fn unset(&self, index: u64) -> bool {
        debug_assert!(index < self.num_bits);
        let mask = 1u64 << (index & 63);
        let prev = self.words()[(index >> 6) as usize].fetch_and(!mask, Ordering::AcqRel);
        if prev & mask != 0 {
            self.cardinality.fetch_sub(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Number of set bits.
    pub fn cardinality(&self) -> u64 {
        self.cardinality.load(Ordering::Relaxed)
    }

    /// Number of addressable bits.
    pub fn bit_size(&self) -> u64 {
        self.num_bits
    }

    /// Zero every bit.
    pub fn clear(&self) {
        for word in self.words() {
            word.store(0, Ordering::Release);
        }
        self.cardinality.store(0, Ordering::Relaxed);
    }

    /// In-place bitwise OR of `other` into `self`. Both vectors must share
    /// the backing kind (heap with heap, off-heap with off-heap) and the bit
    /// size. The cardinality is recomputed from the merged words.
    pub fn put_all(&self, other: &BitVector) -> Result<()> {
        let compatible = matches!(
            (&self.backing, &other.backing),
            (Backing::Heap(_), Backing::Heap(_))
                | (
                    Backing::Anon(_) | Backing::FileMapped { .. },
                    Backing::Anon(_) | Backing::FileMapped { .. },
                )
        );
        if !compatible {
            return Err(FilterError::IncompatibleMerge(
                "cannot merge bit vectors with different backings".into(),
            ));
        }
        if self.num_bits != other.num_bits {
            return Err(FilterError::IncompatibleMerge(
                "cannot merge bit vectors of different size".into(),
            ));
        }

        let mut cardinality = 0u64;
        for (dst, src) in self.words().iter().zip(other.words()) {
            let merged = dst.load(Ordering::Acquire) | src.load(Ordering::Acquire);
            dst.store(merged, Ordering::Release);
            cardinality += merged.count_ones() as u64;
        }
        self.cardinality.store(cardinality, Ordering::Relaxed);
        Ok(())
    }

    /// Release off-heap memory or unmap the file. Heap vectors stay usable;
    /// closing twice is a no-op.
    pub fn close(&mut self) {
        if matches!(self.backing, Backing::Heap(_) | Backing::Closed) {
            return;
        }
        if let Backing::FileMapped { map, .. } = &self.backing {
            if let Err(err) = map.flush() {
                error!("failed to flush file-mapped bit vector: {err}");
            }
        }
        // Dropping the mapping unmaps it and closes the file handle.
        self.backing = Backing::Closed;
    }
}

impl PartialEq for BitVector {
    fn eq(&self, other: &Self) -> bool {
        self.num_bits == other.num_bits
            && self
                .words()
                .iter()
                .zip(other.words())
                .all(|(a, b)| a.load(Ordering::Acquire) == b.load(Ordering::Acquire))
    }
}
