// tests/providers_statuses.rs
//
// Fixture-backed provider → normalize → select, no network.

use feed_relay::ingest::normalize::{normalize, EMPTY_POST_PLACEHOLDER, MEDIA_ONLY_PLACEHOLDER};
use feed_relay::ingest::providers::statuses::StatusesProvider;
use feed_relay::ingest::select::select_new;
use feed_relay::{FeedProvider, ItemId, NormalizedItem};

const FIXTURE: &str = include_str!("fixtures/statuses.json");

async fn normalized() -> Vec<NormalizedItem> {
    let provider = StatusesProvider::from_fixture_str(FIXTURE);
    let raw = provider.fetch("107780257626128497").await.expect("fixture parses");
    raw.iter().map(normalize).collect()
}

#[tokio::test]
async fn fixture_normalizes_every_shape() {
    let items = normalized().await;
    assert_eq!(items.len(), 4);

    let shared_post = &items[0];
    let shared = shared_post.shared.as_ref().expect("reblog kept");
    assert_eq!(shared.id, "113899999999999990");
    assert_eq!(shared.body, "Shared thought with a link");
    assert_eq!(shared.display_name.as_deref(), Some("Other Person"));
    assert_eq!(shared.media.as_ref().map(Vec::len), Some(1));
    assert_eq!(shared_post.body, EMPTY_POST_PLACEHOLDER);

    let media_only = &items[1];
    assert_eq!(media_only.body, MEDIA_ONLY_PLACEHOLDER);
    assert_eq!(media_only.media_count(), 1);

    let text = &items[2];
    assert_eq!(text.body, "Big news today\u{a0}& more tomorrow.Stay tuned!");
    assert!(text.media.is_none());

    let blank = &items[3];
    assert_eq!(blank.body, EMPTY_POST_PLACEHOLDER);
    assert_eq!(blank.display_name, None);
}

#[tokio::test]
async fn fixture_selects_oldest_first_after_cursor() {
    let items = normalized().await;
    let cursor = ItemId::parse("113900000000000002").unwrap();
    let ids: Vec<String> = select_new(items, &cursor).into_iter().map(|i| i.id).collect();
    assert_eq!(ids, vec!["113900000000000003", "113900000000000004"]);
}

#[tokio::test]
async fn unknown_source_without_fixture_fails() {
    let provider = StatusesProvider::from_source_fixtures([("known", FIXTURE)]);
    assert_eq!(provider.fetch("known").await.unwrap().len(), 4);
    assert!(provider.fetch("unknown").await.is_err());
}
