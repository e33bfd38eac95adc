// src/ingest/normalize.rs
//! Single choke point between the loose feed JSON and [`NormalizedItem`].

use serde_json::Value;

use crate::ingest::strip_markup;
use crate::ingest::types::{NormalizedItem, RawItem, SharedItem, SlimMedia};

pub const MEDIA_ONLY_PLACEHOLDER: &str = "A post with image(s) or media but no text.";
pub const EMPTY_POST_PLACEHOLDER: &str = "Empty post content.";

/// Slim a raw status down to what enrichment and delivery need.
///
/// `null` (or anything that is not an object) yields an item whose string fields are all empty.
pub fn normalize(raw: &RawItem) -> NormalizedItem {
    if !raw.is_object() {
        return NormalizedItem {
            id: String::new(),
            created_at: String::new(),
            url: String::new(),
            body: String::new(),
            display_name: None,
            media: None,
            shared: None,
        };
    }

    let media = slim_media(raw);
    let shared = raw
        .get("reblog")
        .filter(|r| r.is_object())
        .map(normalize_shared);

    NormalizedItem {
        id: string_field(raw, "id"),
        created_at: string_field(raw, "created_at"),
        url: string_field(raw, "url"),
        body: body_text(raw, media.is_some()),
        display_name: display_name(raw),
        media,
        shared,
    }
}

fn normalize_shared(raw: &Value) -> SharedItem {
    let media = slim_media(raw);
    SharedItem {
        id: string_field(raw, "id"),
        created_at: string_field(raw, "created_at"),
        url: string_field(raw, "url"),
        body: body_text(raw, media.is_some()),
        display_name: display_name(raw),
        media,
    }
}

fn body_text(raw: &Value, has_media: bool) -> String {
    let content = raw.get("content").and_then(Value::as_str).unwrap_or("");
    let text = strip_markup(content);
    match (text.is_empty(), has_media) {
        (false, _) => text,
        (true, true) => MEDIA_ONLY_PLACEHOLDER.to_string(),
        (true, false) => EMPTY_POST_PLACEHOLDER.to_string(),
    }
}

/// `None` when the item carries no attachments, never `Some(vec![])`.
fn slim_media(raw: &Value) -> Option<Vec<SlimMedia>> {
    let list = raw.get("media_attachments")?.as_array()?;
    let out: Vec<SlimMedia> = list
        .iter()
        .filter(|m| m.is_object())
        .map(|m| SlimMedia {
            kind: string_field(m, "type"),
            url: string_field(m, "url"),
            preview_url: string_field(m, "preview_url"),
        })
        .collect();
    (!out.is_empty()).then_some(out)
}

fn display_name(raw: &Value) -> Option<String> {
    raw.get("account")
        .and_then(|a| a.get("display_name"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Ids occasionally arrive as JSON numbers; render those without quotes.
fn string_field(raw: &Value, key: &str) -> String {
    match raw.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}
