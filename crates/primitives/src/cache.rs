//! Write-once cache for values derived from a file.

use std::sync::OnceLock;

/// Holds a value computed at most once.
///
/// Computation may fail; a failed attempt leaves the cache empty so a later
/// call can try again.
#[derive(Debug)]
pub(crate) struct OnceCache<T> {
    value: OnceLock<T>,
}

impl<T> OnceCache<T> {
    /// Create a new empty cache
    pub(crate) const fn new() -> Self {
        Self {
            value: OnceLock::new(),
        }
    }

    /// Get the cached value if it exists
    #[cfg(test)]
    pub(crate) fn get(&self) -> Option<&T> {
        self.value.get()
    }

    /// Get the cached value, computing it with `compute_fn` if necessary.
    ///
    /// Two threads racing on an empty cache may both compute; the first stored
    /// value wins and both callers observe it.
    pub(crate) fn get_or_try_compute<E, F>(&self, compute_fn: F) -> Result<&T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(value) = self.value.get() {
            return Ok(value);
        }
        let computed = compute_fn()?;
        Ok(self.value.get_or_init(|| computed))
    }
}

impl<T> Default for OnceCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_compute_leaves_cache_empty() {
        let cache = OnceCache::<u32>::new();
        let failed = cache.get_or_try_compute(|| Err::<u32, _>("boom"));
        assert_eq!(failed, Err("boom"));
        assert!(cache.get().is_none());

        assert_eq!(cache.get_or_try_compute(|| Ok::<_, &str>(7)), Ok(&7));
        assert_eq!(cache.get_or_try_compute(|| Ok::<_, &str>(9)), Ok(&7));
    }
}
