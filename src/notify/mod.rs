// src/notify/mod.rs
pub mod bluesky;
pub mod log;
pub mod slack;

use anyhow::Result;
use serde::Serialize;

use crate::ingest::types::NormalizedItem;

const LINK_PREFIX: &str = "\nLink: ";
const ELLIPSIS: &str = "...";

/// Byte range of the embedded link inside [`PrimaryPost::text`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkSpan {
    pub byte_start: usize,
    pub byte_end: usize,
    pub uri: String,
}

/// Message for the primary sink: summary plus a clickable link back to the item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrimaryPost {
    pub text: String,
    pub link: LinkSpan,
}

/// Build the primary message within `max_chars`.
///
/// Only the summary is shortened (trailing whitespace trimmed, `...` appended); the link
/// suffix is always kept whole. When fewer chars than the ellipsis remain, the summary is
/// cut without one. A link longer than the bound on its own still goes out intact.
pub fn compose_post(summary: &str, url: &str, max_chars: usize) -> PrimaryPost {
    let suffix_chars = LINK_PREFIX.chars().count() + url.chars().count();
    let available = max_chars.saturating_sub(suffix_chars);

    let head = if summary.chars().count() <= available {
        summary.to_string()
    } else if available < ELLIPSIS.len() {
        let cut: String = summary.chars().take(available).collect();
        cut.trim_end().to_string()
    } else {
        let cut: String = summary.chars().take(available - ELLIPSIS.len()).collect();
        format!("{}{ELLIPSIS}", cut.trim_end())
    };

    let byte_start = head.len() + LINK_PREFIX.len();
    let text = format!("{head}{LINK_PREFIX}{url}");
    PrimaryPost {
        link: LinkSpan {
            byte_start,
            byte_end: byte_start + url.len(),
            uri: url.to_string(),
        },
        text,
    }
}

/// Audit-trail message for the notification sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub source: String,
    pub title: String,
    pub quote: String,
    pub link: String,
    pub created_at: String,
    pub item_id: String,
}

impl Notice {
    pub fn for_item(source: &str, item: &NormalizedItem, summary: &str) -> Self {
        let who = item.display_name.as_deref().unwrap_or(source);
        Self {
            source: source.to_string(),
            title: format!("New post from {who}"),
            quote: summary.to_string(),
            link: item.url.clone(),
            created_at: item.created_at.clone(),
            item_id: item.id.clone(),
        }
    }
}

#[async_trait::async_trait]
pub trait PrimarySink: Send + Sync {
    async fn publish(&self, post: &PrimaryPost) -> Result<()>;
    fn name(&self) -> &'static str;
}

#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notice: &Notice) -> Result<()>;
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://truthsocial.com/@realDonaldTrump/113560044384924395";

    fn assert_link_intact(post: &PrimaryPost, url: &str) {
        assert_eq!(&post.text[post.link.byte_start..post.link.byte_end], url);
        assert!(post.text.ends_with(url));
    }

    #[test]
    fn short_summary_is_untouched() {
        let post = compose_post("Short summary.", URL, 300);
        assert_eq!(post.text, format!("Short summary.\nLink: {URL}"));
        assert_link_intact(&post, URL);
    }

    #[test]
    fn trailing_whitespace_is_trimmed_before_ellipsis() {
        // 234 chars fit beside the link; the cut lands right after a space.
        let summary = format!("{} tail", "a".repeat(230));
        let post = compose_post(&summary, URL, 300);
        assert!(post.text.starts_with(&format!("{}...", "a".repeat(230))));
        assert_link_intact(&post, URL);
    }

    #[test]
    fn long_summary_is_cut_and_link_survives() {
        let summary = "word ".repeat(100);
        let post = compose_post(&summary, URL, 300);
        assert_eq!(post.text.chars().count(), 300);
        assert!(post.text.contains(&format!("...{LINK_PREFIX}")));
        assert_link_intact(&post, URL);
    }

    #[test]
    fn exact_fit_is_not_truncated() {
        let available = 300 - LINK_PREFIX.len() - URL.len();
        let summary = "x".repeat(available);
        let post = compose_post(&summary, URL, 300);
        assert_eq!(post.text.chars().count(), 300);
        assert!(!post.text.contains(ELLIPSIS));
    }

    #[test]
    fn multibyte_text_keeps_byte_span_correct() {
        let summary = "Zpráva o cle ⚠️ ".repeat(40);
        let post = compose_post(&summary, URL, 300);
        assert!(post.text.chars().count() <= 300);
        assert_link_intact(&post, URL);
        assert!(post.text.len() > post.text.chars().count());
    }

    #[test]
    fn link_longer_than_limit_is_kept_whole() {
        let url = format!("https://example.test/{}", "a".repeat(400));
        let post = compose_post("summary", &url, 300);
        assert_link_intact(&post, &url);
        assert!(post.text.starts_with(LINK_PREFIX));
    }

    #[test]
    fn link_leaving_less_than_ellipsis_room_stays_within_bound() {
        // 7 + 292 leaves a single char for the summary.
        let url = format!("https://example.test/{}", "a".repeat(292 - 21));
        assert_eq!(url.chars().count(), 292);
        let post = compose_post("summary", &url, 300);
        assert_eq!(post.text.chars().count(), 300);
        assert!(post.text.starts_with(&format!("s{LINK_PREFIX}")));
        assert_link_intact(&post, &url);

        let url = format!("https://example.test/{}", "a".repeat(291 - 21));
        let post = compose_post("summary", &url, 300);
        assert!(post.text.chars().count() <= 300);
        assert!(!post.text.contains(ELLIPSIS));
        assert_link_intact(&post, &url);
    }

    #[test]
    fn notice_uses_display_name_or_source() {
        let mut item = NormalizedItem {
            id: "7".into(),
            created_at: "2025-01-20T17:00:00Z".into(),
            url: URL.into(),
            body: "b".into(),
            display_name: Some("Donald J. Trump".into()),
            media: None,
            shared: None,
        };
        let n = Notice::for_item("107780257626128497", &item, "sum");
        assert_eq!(n.title, "New post from Donald J. Trump");
        assert_eq!(n.item_id, "7");
        item.display_name = None;
        let n = Notice::for_item("107780257626128497", &item, "sum");
        assert_eq!(n.title, "New post from 107780257626128497");
    }
}
