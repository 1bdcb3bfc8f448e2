//! Distinct-until-changed filtering

/// Passes a value only when its key differs from the key of the last value
/// that passed. Comparison is against the immediately preceding emission, so
/// returning to an older key counts as a change.
#[derive(Debug, Clone)]
pub struct DistinctUntilChanged<K> {
    last: Option<K>,
}

impl<K: PartialEq> DistinctUntilChanged<K> {
    pub fn new() -> Self {
        Self { last: None }
    }

    /// Record `key` and report whether it differs from the previous one.
    pub fn check(&mut self, key: K) -> bool {
        if self.last.as_ref() == Some(&key) {
            return false;
        }
        self.last = Some(key);
        true
    }

    pub fn last(&self) -> Option<&K> {
        self.last.as_ref()
    }
}

impl<K: PartialEq> Default for DistinctUntilChanged<K> {
    fn default() -> Self {
        Self::new()
    }
}
