/// Options used when creating a [`ConcurrentBag`](crate::data_structures::ConcurrentBag).
///
/// ```
/// use starfish_bag::{BagOptions, ConcurrentBag};
///
/// let bag: ConcurrentBag<u32> =
///     ConcurrentBag::with_options(BagOptions::default().with_spin_limit(4));
/// bag.add(1);
/// ```
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BagOptions {
    /// Allows a newly claimed worker id to take over a list released by
    /// another worker, instead of always appending a new list.
    pub reuse_released_lists: bool,

    /// Number of backoff steps a waiting thread spins before it starts
    /// yielding its time slice.
    pub spin_limit: u32,
}

impl BagOptions {
    pub const DEFAULT_SPIN_LIMIT: u32 = 6;

    pub fn new() -> Self {
        BagOptions {
            reuse_released_lists: true,
            spin_limit: Self::DEFAULT_SPIN_LIMIT,
        }
    }

    pub fn with_reuse_released_lists(mut self, reuse: bool) -> Self {
        self.reuse_released_lists = reuse;
        self
    }

    pub fn with_spin_limit(mut self, spin_limit: u32) -> Self {
        self.spin_limit = spin_limit;
        self
    }
}

impl Default for BagOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::BagOptions;

    #[test]
    fn test_default_options() {
        let options = BagOptions::default();
        assert!(options.reuse_released_lists);
        assert_eq!(options.spin_limit, BagOptions::DEFAULT_SPIN_LIMIT);
    }

    #[test]
    fn test_builder_setters() {
        let options = BagOptions::new()
            .with_reuse_released_lists(false)
            .with_spin_limit(0);
        assert!(!options.reuse_released_lists);
        assert_eq!(options.spin_limit, 0);
    }
}
