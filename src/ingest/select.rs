// src/ingest/select.rs
use crate::ingest::types::{ItemId, NormalizedItem};

/// Keep items strictly newer than `cursor`, oldest first.
///
/// Items whose id is not a decimal number cannot be placed relative to the cursor and are
/// dropped with a warning. Duplicate ids inside one batch are collapsed to the first occurrence.
pub fn select_new(batch: Vec<NormalizedItem>, cursor: &ItemId) -> Vec<NormalizedItem> {
    let mut keyed: Vec<(ItemId, NormalizedItem)> = Vec::with_capacity(batch.len());
    for item in batch {
        let Some(id) = item.item_id() else {
            tracing::warn!(id = %item.id, "skipping item with non-numeric id");
            continue;
        };
        if &id > cursor {
            keyed.push((id, item));
        }
    }

    // Stable sort keeps feed order among equal ids, so dedup keeps the first seen.
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.dedup_by(|later, earlier| later.0 == earlier.0);

    keyed.into_iter().map(|(_, item)| item).collect()
}
