// src/ingest/types.rs
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Raw feed record as delivered by a provider. Only the normalizer looks inside.
pub type RawItem = serde_json::Value;

/// Decimal item identifier compared by numeric value.
///
/// Feed ids routinely exceed 2^53 (and may exceed u64), so the value is kept as a
/// canonical digit string (no leading zeros) and ordered by length first, then digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId(String);

impl ItemId {
    /// The implicit cursor of a source that has never been committed.
    pub fn zero() -> Self {
        Self("0".to_string())
    }

    /// Parse a decimal string. Surrounding whitespace is ignored; anything else
    /// that is not an ASCII digit is rejected.
    pub fn parse(s: &str) -> Option<Self> {
        let t = s.trim();
        if t.is_empty() || !t.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let canonical = t.trim_start_matches('0');
        if canonical.is_empty() {
            Some(Self::zero())
        } else {
            Some(Self(canonical.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for ItemId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.as_bytes().cmp(other.0.as_bytes()))
    }
}

impl PartialOrd for ItemId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ItemId {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&s).ok_or_else(|| format!("not a decimal item id: {s:?}"))
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> Self {
        id.0
    }
}

/// Media descriptor kept after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlimMedia {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub preview_url: String,
}

/// Nested shared (reblogged) item, one level deep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedItem {
    pub id: String,
    pub created_at: String,
    pub url: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<Vec<SlimMedia>>,
}

/// The unit the delivery pipeline works on. Built once by [`crate::ingest::normalize::normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedItem {
    pub id: String,
    pub created_at: String,
    pub url: String,
    /// Never empty: stripped text or one of the placeholders.
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<Vec<SlimMedia>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared: Option<SharedItem>,
}

impl NormalizedItem {
    /// Numeric id, if the feed gave us a well-formed one.
    pub fn item_id(&self) -> Option<ItemId> {
        ItemId::parse(&self.id)
    }

    pub fn media_count(&self) -> usize {
        self.media.as_ref().map_or(0, Vec::len)
    }
}

/// Feed retrieval collaborator: one call returns the current page of a source, in feed order.
#[async_trait::async_trait]
pub trait FeedProvider: Send + Sync {
    async fn fetch(&self, source: &str) -> Result<Vec<RawItem>>;
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_order_beats_lexicographic() {
        let nine = ItemId::parse("9").unwrap();
        let ten = ItemId::parse("10").unwrap();
        assert!(nine < ten);
        assert!("9" > "10");
    }

    #[test]
    fn ids_beyond_u64_compare_by_value() {
        let a = ItemId::parse("113560044384924395").unwrap();
        let b = ItemId::parse("113560044384924396").unwrap();
        let huge = ItemId::parse("340282366920938463463374607431768211456").unwrap();
        assert!(a < b);
        assert!(b < huge);
    }

    #[test]
    fn leading_zeros_are_canonicalised() {
        assert_eq!(ItemId::parse("0007").unwrap(), ItemId::parse("7").unwrap());
        assert_eq!(ItemId::parse("000").unwrap(), ItemId::zero());
        assert_eq!(ItemId::parse(" 42 ").unwrap().as_str(), "42");
    }

    #[test]
    fn rejects_non_decimal() {
        for bad in ["", "  ", "-1", "1e9", "12a", "0x10", "1.5"] {
            assert!(ItemId::parse(bad).is_none(), "{bad:?} should be rejected");
        }
    }
}
