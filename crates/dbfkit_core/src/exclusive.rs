//! Exclusive-open registry.
//!
//! The engine does not report the mode a table was opened in, so each
//! session records the aliases it opened exclusively. An alias is present
//! exactly while its table is open exclusively in that session.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// Lower-cased aliases of exclusively opened tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusiveRegistry {
    aliases: Vec<String>,
    limit: usize,
    capacity: usize,
}

impl ExclusiveRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(initial_limit: usize, capacity: usize) -> Self {
        Self {
            aliases: Vec::new(),
            limit: initial_limit.clamp(1, capacity.max(1)),
            capacity,
        }
    }

    /// Records an alias, growing the limit when it is reached.
    pub fn insert(&mut self, alias: &str) -> CoreResult<()> {
        let alias = alias.trim().to_lowercase();
        if self.aliases.contains(&alias) {
            return Ok(());
        }
        if self.aliases.len() >= self.capacity {
            return Err(CoreError::ExclusiveRegistryFull {
                capacity: self.capacity,
            });
        }
        if self.aliases.len() >= self.limit {
            self.limit = (self.limit * 2).min(self.capacity);
        }
        self.aliases.push(alias);
        Ok(())
    }

    /// Forgets an alias. Returns whether it was present.
    pub fn remove(&mut self, alias: &str) -> bool {
        let alias = alias.trim().to_lowercase();
        let before = self.aliases.len();
        self.aliases.retain(|a| *a != alias);
        self.aliases.len() != before
    }

    /// Returns whether an alias is recorded.
    #[must_use]
    pub fn contains(&self, alias: &str) -> bool {
        let alias = alias.trim().to_lowercase();
        self.aliases.contains(&alias)
    }

    /// Recorded aliases in insertion order.
    #[must_use]
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Number of recorded aliases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    /// Returns true if nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// Current high-water limit.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Forgets every alias.
    pub fn clear(&mut self) {
        self.aliases.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_are_case_folded() {
        let mut registry = ExclusiveRegistry::new(2, 4);
        registry.insert("Cust").unwrap();
        assert!(registry.contains("CUST"));
        registry.insert("cust").unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.remove("CuSt"));
        assert!(!registry.remove("cust"));
        assert!(registry.is_empty());
    }

    #[test]
    fn limit_grows_to_capacity() {
        let mut registry = ExclusiveRegistry::new(1, 3);
        assert_eq!(registry.limit(), 1);
        registry.insert("a").unwrap();
        registry.insert("b").unwrap();
        assert_eq!(registry.limit(), 2);
        registry.insert("c").unwrap();
        assert_eq!(registry.limit(), 3);
        assert!(matches!(
            registry.insert("d"),
            Err(CoreError::ExclusiveRegistryFull { capacity: 3 })
        ));
        assert_eq!(registry.aliases(), ["a", "b", "c"]);
    }
}
