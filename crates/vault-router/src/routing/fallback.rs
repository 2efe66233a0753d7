//! Fallback table: primary intent -> secondary intent tried once when the
//! primary execution fails or comes back empty.

use std::collections::HashMap;

use crate::error::ConfigError;
use crate::intent::Intent;

const DEFAULT_FALLBACKS: &[(Intent, Intent)] = &[
    (Intent::Open, Intent::Search),
    (Intent::Read, Intent::Search),
    (Intent::Summarize, Intent::Read),
    (Intent::Comment, Intent::Read),
    (Intent::Update, Intent::Read),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackTable {
    entries: HashMap<Intent, Intent>,
}

impl Default for FallbackTable {
    fn default() -> Self {
        Self {
            entries: DEFAULT_FALLBACKS.iter().copied().collect(),
        }
    }
}

impl FallbackTable {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Default table with overrides applied. `Some(x)` replaces or adds an
    /// entry, `None` removes it.
    pub fn with_overrides(overrides: &HashMap<Intent, Option<Intent>>) -> Result<Self, ConfigError> {
        let mut table = Self::default();
        for (&primary, &secondary) in overrides {
            if primary == Intent::Unknown {
                return Err(ConfigError::InvalidFallback(
                    "'unknown' cannot have a fallback".into(),
                ));
            }
            match secondary {
                Some(Intent::Unknown) => {
                    return Err(ConfigError::InvalidFallback(format!(
                        "'{}' cannot fall back to 'unknown'",
                        primary
                    )));
                }
                Some(target) if target == primary => {
                    return Err(ConfigError::InvalidFallback(format!(
                        "'{}' cannot fall back to itself",
                        primary
                    )));
                }
                Some(target) => {
                    table.entries.insert(primary, target);
                }
                None => {
                    table.entries.remove(&primary);
                }
            }
        }
        Ok(table)
    }

    pub fn lookup(&self, intent: Intent) -> Option<Intent> {
        self.entries.get(&intent).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_entries() {
        let table = FallbackTable::default();
        assert_eq!(table.lookup(Intent::Open), Some(Intent::Search));
        assert_eq!(table.lookup(Intent::Read), Some(Intent::Search));
        assert_eq!(table.lookup(Intent::Summarize), Some(Intent::Read));
        assert_eq!(table.lookup(Intent::Comment), Some(Intent::Read));
        assert_eq!(table.lookup(Intent::Update), Some(Intent::Read));
        assert_eq!(table.lookup(Intent::Search), None);
        assert_eq!(table.lookup(Intent::Table), None);
        assert_eq!(table.lookup(Intent::Unknown), None);
        assert_eq!(table.len(), 5);
    }

    #[test]
    fn test_overrides_replace_add_and_remove() {
        let overrides = HashMap::from([
            (Intent::Open, Some(Intent::Read)),
            (Intent::Table, Some(Intent::Read)),
            (Intent::Comment, None),
        ]);
        let table = FallbackTable::with_overrides(&overrides).unwrap();
        assert_eq!(table.lookup(Intent::Open), Some(Intent::Read));
        assert_eq!(table.lookup(Intent::Table), Some(Intent::Read));
        assert_eq!(table.lookup(Intent::Comment), None);
        assert_eq!(table.lookup(Intent::Read), Some(Intent::Search));
    }

    #[test]
    fn test_invalid_overrides() {
        let self_map = HashMap::from([(Intent::Search, Some(Intent::Search))]);
        assert!(matches!(
            FallbackTable::with_overrides(&self_map),
            Err(ConfigError::InvalidFallback(_))
        ));

        let to_unknown = HashMap::from([(Intent::Open, Some(Intent::Unknown))]);
        assert!(FallbackTable::with_overrides(&to_unknown).is_err());

        let from_unknown = HashMap::from([(Intent::Unknown, Some(Intent::Search))]);
        assert!(FallbackTable::with_overrides(&from_unknown).is_err());
    }
}
