// src/ingest/mod.rs
pub mod config;
pub mod normalize;
pub mod providers;
pub mod scheduler;
pub mod select;
pub mod types;

use crate::ingest::types::{FeedProvider, RawItem};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "relay_items_fetched_total",
            "Raw items returned by feed providers."
        );
        describe_counter!(
            "relay_items_selected_total",
            "Items newer than the stored cursor."
        );
        describe_counter!(
            "relay_items_delivered_total",
            "Items delivered to both sinks."
        );
        describe_counter!("relay_fetch_errors_total", "Feed fetch/parse errors.");
        describe_counter!(
            "relay_delivery_failures_total",
            "Aborted batches, labelled by failing stage."
        );
        describe_counter!("relay_cursor_commits_total", "Cursor writes.");
        describe_counter!("relay_runs_total", "Pipeline invocations.");
        describe_histogram!("relay_parse_ms", "Statuses parse time in milliseconds.");
        describe_histogram!("relay_enrich_ms", "Enrichment latency in milliseconds.");
        describe_gauge!(
            "relay_last_run_ts",
            "Unix ts when the pipeline last finished."
        );
    });
}

/// Remove tag-like substrings, decode entities, trim.
pub fn strip_markup(s: &str) -> String {
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"<[^>]*>").expect("static regex"));
    let text = re_tags.replace_all(s, "");
    html_escape::decode_html_entities(&text).trim().to_string()
}

/// Fetch one source. Failures are logged and counted here; the caller treats them as an
/// empty batch for this source only, so one unreachable feed never blocks the others.
pub async fn fetch_batch(provider: &dyn FeedProvider, source: &str) -> anyhow::Result<Vec<RawItem>> {
    ensure_metrics_described();
    match provider.fetch(source).await {
        Ok(items) => {
            counter!("relay_items_fetched_total").increment(items.len() as u64);
            Ok(items)
        }
        Err(e) => {
            tracing::warn!(error = ?e, provider = provider.name(), source, "feed fetch failed");
            counter!("relay_fetch_errors_total").increment(1);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_markup_removes_tags_and_decodes() {
        let s = "<p>Hello&nbsp;<b>world</b> &ldquo;ok&rdquo;</p>";
        assert_eq!(strip_markup(s), "Hello\u{a0}world \u{201c}ok\u{201d}");
    }

    #[test]
    fn strip_markup_of_only_tags_is_empty() {
        assert_eq!(strip_markup("<p></p><br/>"), "");
        assert_eq!(strip_markup("  &nbsp; "), "");
        assert_eq!(strip_markup(""), "");
    }

    #[test]
    fn escaped_angle_brackets_survive_as_text() {
        assert_eq!(strip_markup("<p>1 &lt; 2</p>"), "1 < 2");
    }
}
