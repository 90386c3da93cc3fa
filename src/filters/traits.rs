use crate::error::Result;

/// Common surface of every filter variant.
///
/// All operations take `&self`: thread safety is provided internally by each
/// filter's striped locks and atomic counters, except `close`, which needs
/// exclusive access to tear down the backing storage.
pub trait Filter {
    /// Insert an item. Returns true if the filter accepted it (for bit-based
    /// variants: at least one bit changed, or the write was otherwise
    /// absorbed); a cuckoo filter returns false when its eviction chain gave
    /// up.
    fn put(&self, item: &[u8]) -> bool;

    /// Whether the item might be in the set. False is definitive except for
    /// the stable filter, which evicts stale items by design.
    fn might_contain(&self, item: &[u8]) -> bool;

    /// Remove an item. Only the cuckoo filter supports removal; every other
    /// variant reports [`crate::FilterError::Unsupported`].
    fn remove(&self, item: &[u8]) -> Result<bool>;

    /// Expected false positive probability at the current fill.
    fn expected_fpp(&self) -> f64;

    /// Reset the filter to its empty state.
    fn clear(&self);

    /// Release backing resources. Idempotent; cascades to owned storage.
    fn close(&mut self);

    /// Insert a string item; empty strings are ignored.
    fn put_str(&self, item: &str) -> bool {
        !item.is_empty() && self.put(item.as_bytes())
    }

    /// Query a string item; empty strings are never contained.
    fn might_contain_str(&self, item: &str) -> bool {
        !item.is_empty() && self.might_contain(item.as_bytes())
    }
}
