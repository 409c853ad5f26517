//! Excursion records and their identifiers.
//!
//! Identifiers are strings in the store so that a multi-day excursion can be
//! written as one row per day sharing the integer prefix:
//!
//! ```text
//! { id: "12",   sticks_collected: 10 }
//! { id: "12.1", sticks_collected: 18 }
//! { id: "12.2", sticks_collected: 3 }
//! ```

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Suffix levels allowed after the integer base (`12.1.4` is the deepest).
pub const MAX_SUFFIX_DEPTH: usize = 2;

/// A persisted excursion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Excursion {
    pub id: ExcursionId,
    pub sticks_collected: i64,
}

/// Typed excursion identifier: an integer base plus up to two suffix levels.
///
/// Ordering is numeric, segment by segment, so `9 < 10` and
/// `12 < 12.1 < 12.2 < 13`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExcursionId {
    base: u64,
    suffix: Vec<u32>,
}

impl ExcursionId {
    /// A top-level identifier with no suffix.
    pub fn top_level(base: u64) -> Self {
        Self {
            base,
            suffix: Vec::new(),
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn suffix(&self) -> &[u32] {
        &self.suffix
    }

    pub fn is_top_level(&self) -> bool {
        self.suffix.is_empty()
    }

    /// The next fresh excursion: base + 1, suffix dropped.
    pub fn next_top_level(&self) -> Result<Self> {
        self.base
            .checked_add(1)
            .map(Self::top_level)
            .ok_or_else(|| Error::InvalidExcursionId(format!("{self} has no successor")))
    }

    /// The next day of the same excursion: `12` → `12.1`, `12.1` → `12.2`.
    pub fn continuation(&self) -> Result<Self> {
        let mut suffix = self.suffix.clone();
        match suffix.last_mut() {
            Some(last) => {
                *last = last.checked_add(1).ok_or_else(|| {
                    Error::InvalidExcursionId(format!("{self} has no continuation"))
                })?;
            }
            None => suffix.push(1),
        }
        Ok(Self {
            base: self.base,
            suffix,
        })
    }

    /// Parse only the leading integer of an identifier, ignoring any suffix.
    ///
    /// This is what allocation needs from the stored maximum: `"12.2"` → 12.
    pub fn leading_base(s: &str) -> Result<u64> {
        let head = s.split('.').next().unwrap_or_default();
        parse_segment(head).ok_or_else(|| Error::InvalidExcursionId(s.to_string()))
    }
}

fn parse_segment<T: FromStr>(s: &str) -> Option<T> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl FromStr for ExcursionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidExcursionId(s.to_string());
        let mut parts = s.split('.');

        let base = parts.next().and_then(parse_segment::<u64>).ok_or_else(invalid)?;
        let suffix = parts
            .map(|p| parse_segment::<u32>(p).ok_or_else(invalid))
            .collect::<Result<Vec<_>>>()?;

        if suffix.len() > MAX_SUFFIX_DEPTH {
            return Err(invalid());
        }
        Ok(Self { base, suffix })
    }
}

impl TryFrom<String> for ExcursionId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<ExcursionId> for String {
    fn from(id: ExcursionId) -> Self {
        id.to_string()
    }
}

impl std::fmt::Display for ExcursionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.base)?;
        for part in &self.suffix {
            write!(f, ".{part}")?;
        }
        Ok(())
    }
}
