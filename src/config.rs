use std::path::PathBuf;

use bincode::{Decode, Encode};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::bits::BitVector;
use crate::error::{FilterError, Result};
use crate::hash::HasherKind;

/// Construction parameters shared by the classic, partitioned, stable and
/// cuckoo filters.
///
/// The mapped-file image carries no metadata, so callers that persist a
/// filter are expected to persist its config next to it; [`Self::to_bytes`]
/// and [`Self::from_bytes`] provide the wire form.
#[derive(Clone, Debug, Builder, Serialize, Deserialize, Decode, Encode)]
#[builder(pattern = "owned")]
pub struct FilterConfig {
    /// Expected number of distinct items.
    pub capacity: u64,

    #[builder(default = "0.03")]
    pub false_positive_rate: f64,

    /// Place the bit vector in anonymous off-heap memory instead of the
    /// heap. Required when `mapped_file` is set.
    #[builder(default = "false")]
    pub use_off_heap_memory: bool,

    /// Map the bit vector over this file; reopening an existing file of the
    /// same geometry restores the stored bits.
    #[builder(default = "None")]
    pub mapped_file: Option<PathBuf>,

    #[builder(default)]
    pub hasher: HasherKind,

    /// Counter width for the stable filter, in `(0, 64)`. Ignored by the
    /// other variants.
    #[builder(default = "1")]
    pub bits_per_bucket: u32,
}

impl FilterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(FilterError::InvalidConfig(
                "expected number of items must be > 0".into(),
            ));
        }
        if self.false_positive_rate <= 0.0 || self.false_positive_rate >= 1.0 {
            return Err(FilterError::InvalidConfig(format!(
                "false positive rate ({}) must be in range (0, 1)",
                self.false_positive_rate
            )));
        }
        if self.bits_per_bucket == 0 || self.bits_per_bucket >= 64 {
            return Err(FilterError::InvalidConfig(format!(
                "bits per bucket ({}) must be in range (0, 64)",
                self.bits_per_bucket
            )));
        }
        if self.mapped_file.is_some() && !self.use_off_heap_memory {
            return Err(FilterError::InvalidConfig(format!(
                "cannot map file {:?} to an on-heap bit vector",
                self.mapped_file
            )));
        }
        Ok(())
    }

    /// Allocate the backing selected by this config: file-mapped when a path
    /// is given, anonymous off-heap when requested, heap words otherwise.
    pub(crate) fn new_bit_vector(&self, num_bits: u64) -> Result<BitVector> {
        match &self.mapped_file {
            Some(path) => BitVector::file_mapped(path, num_bits),
            None if self.use_off_heap_memory => BitVector::off_heap(num_bits),
            None => BitVector::on_heap(num_bits),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| FilterError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::decode_from_slice(bytes, bincode::config::standard())
            .map(|(config, _)| config)
            .map_err(|e| FilterError::Serialization(e.to_string()))
    }
}

/// Construction parameters for the scalable filter.
#[derive(Clone, Debug, Builder, Serialize, Deserialize, Decode, Encode)]
#[builder(pattern = "owned")]
pub struct ScalableFilterConfig {
    /// Target capacity of each member filter.
    pub capacity: u64,

    #[builder(default = "0.03")]
    pub false_positive_rate: f64,

    /// Fill ratio at which the active member is considered full and a new
    /// one is allocated. Also the per-level fpp tightening multiplier. The
    /// default of 0.5 is the fill an optimally sized member reaches at its
    /// target capacity.
    #[builder(default = "0.5")]
    pub partition_fill_ratio: f64,

    #[builder(default = "false")]
    pub use_off_heap_memory: bool,

    #[builder(default)]
    pub hasher: HasherKind,
}

impl ScalableFilterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(FilterError::InvalidConfig(
                "expected number of items must be > 0".into(),
            ));
        }
        if self.false_positive_rate <= 0.0 || self.false_positive_rate >= 1.0 {
            return Err(FilterError::InvalidConfig(format!(
                "false positive rate ({}) must be in range (0, 1)",
                self.false_positive_rate
            )));
        }
        if self.partition_fill_ratio <= 0.0 || self.partition_fill_ratio >= 1.0 {
            return Err(FilterError::InvalidConfig(format!(
                "partition fill ratio ({}) must be in range (0, 1)",
                self.partition_fill_ratio
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = FilterConfigBuilder::default()
            .capacity(1_000)
            .build()
            .expect("config should build");
        assert!(config.validate().is_ok());
        assert_eq!(config.hasher, HasherKind::Murmur128);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let zero_capacity = FilterConfigBuilder::default().capacity(0).build().unwrap();
        assert!(zero_capacity.validate().is_err());

        for fpp in [0.0, 1.0, -0.5, 1.5] {
            let config = FilterConfigBuilder::default()
                .capacity(100)
                .false_positive_rate(fpp)
                .build()
                .unwrap();
            assert!(config.validate().is_err(), "fpp {fpp} should be rejected");
        }

        for bits in [0u32, 64, 80] {
            let config = FilterConfigBuilder::default()
                .capacity(100)
                .bits_per_bucket(bits)
                .build()
                .unwrap();
            assert!(
                config.validate().is_err(),
                "bits per bucket {bits} should be rejected"
            );
        }
    }

    #[test]
    fn mapped_file_requires_off_heap() {
        let config = FilterConfigBuilder::default()
            .capacity(100)
            .mapped_file(Some(PathBuf::from("filter.bin")))
            .build()
            .unwrap();
        assert!(config.validate().is_err());

        let config = FilterConfigBuilder::default()
            .capacity(100)
            .use_off_heap_memory(true)
            .mapped_file(Some(PathBuf::from("filter.bin")))
            .build()
            .unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_round_trips_through_bytes() {
        let config = FilterConfigBuilder::default()
            .capacity(42)
            .false_positive_rate(0.01)
            .hasher(HasherKind::Murmur32)
            .build()
            .unwrap();
        let decoded = FilterConfig::from_bytes(&config.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.capacity, 42);
        assert_eq!(decoded.false_positive_rate, 0.01);
        assert_eq!(decoded.hasher, HasherKind::Murmur32);
    }

    #[test]
    fn scalable_config_bounds() {
        for ratio in [0.0, 1.0] {
            let config = ScalableFilterConfigBuilder::default()
                .capacity(100)
                .partition_fill_ratio(ratio)
                .build()
                .unwrap();
            assert!(config.validate().is_err());
        }
    }
}
