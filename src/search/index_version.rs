//! Naming of physical indices behind an alias.

use chrono::{DateTime, NaiveDateTime, Utc};

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const TIMESTAMP_LEN: usize = 14;

/// A physical index named `<alias>_<YYYYMMDDHHMMSS>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexVersion {
    pub alias: String,
    pub created_at: DateTime<Utc>,
}

impl IndexVersion {
    pub fn new(alias: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            alias: alias.into(),
            created_at,
        }
    }

    pub fn name(&self) -> String {
        format!("{}_{}", self.alias, self.created_at.format(TIMESTAMP_FORMAT))
    }

    /// Parse a physical index name belonging to `alias`.
    ///
    /// Returns `None` for names with a different prefix or a suffix that is
    /// not a valid compact timestamp.
    pub fn parse(alias: &str, name: &str) -> Option<Self> {
        let suffix = name.strip_prefix(alias)?.strip_prefix('_')?;
        if suffix.len() != TIMESTAMP_LEN || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let naive = NaiveDateTime::parse_from_str(suffix, TIMESTAMP_FORMAT).ok()?;
        Some(Self::new(alias, naive.and_utc()))
    }

    /// Wildcard pattern matching every version of `alias`.
    pub fn pattern(alias: &str) -> String {
        format!("{}_*", alias)
    }
}
