//! Primary sink: posts to Bluesky through the AT protocol XRPC endpoints.
//!
//! One session is created lazily and reused for the life of the process. The async mutex
//! makes the publisher the single writer of that session.

use anyhow::{anyhow, Context, Result};
use chrono::{SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;

use super::{PrimaryPost, PrimarySink};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    access_jwt: String,
    did: String,
}

pub struct BlueskyPublisher {
    service: String,
    identifier: String,
    password: String,
    client: Client,
    session: Mutex<Option<Session>>,
}

#[derive(Serialize)]
struct CreateSessionReq<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct CreateRecordReq<'a> {
    repo: &'a str,
    collection: &'static str,
    record: serde_json::Value,
}

/// Result of one `createRecord` attempt.
enum Attempt {
    Done,
    SessionExpired,
}

impl BlueskyPublisher {
    pub fn new(service: &str, identifier: String, password: String) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .build()
            .context("building bluesky http client")?;
        Ok(Self {
            service: service.trim_end_matches('/').to_string(),
            identifier,
            password,
            client,
            session: Mutex::new(None),
        })
    }

    fn xrpc(&self, method: &str) -> String {
        format!("{}/xrpc/{method}", self.service)
    }

    async fn login(&self) -> Result<Session> {
        let session: Session = self
            .client
            .post(self.xrpc("com.atproto.server.createSession"))
            .json(&CreateSessionReq {
                identifier: &self.identifier,
                password: &self.password,
            })
            .send()
            .await
            .context("bluesky createSession")?
            .error_for_status()
            .context("bluesky createSession non-2xx")?
            .json()
            .await
            .context("bluesky session json")?;
        tracing::info!(did = %session.did, "bluesky session created");
        Ok(session)
    }

    async fn create_record(&self, session: &Session, post: &PrimaryPost) -> Result<Attempt> {
        let req = CreateRecordReq {
            repo: &session.did,
            collection: "app.bsky.feed.post",
            record: post_record(post, &Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        };
        let resp = self
            .client
            .post(self.xrpc("com.atproto.repo.createRecord"))
            .bearer_auth(&session.access_jwt)
            .json(&req)
            .send()
            .await
            .context("bluesky createRecord")?;

        let status = resp.status();
        if status.is_success() {
            return Ok(Attempt::Done);
        }
        let body = resp.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED
            || (status == StatusCode::BAD_REQUEST && body.contains("ExpiredToken"))
        {
            return Ok(Attempt::SessionExpired);
        }
        Err(anyhow!("bluesky createRecord failed with {status}: {body}"))
    }
}

/// `app.bsky.feed.post` record with a link facet over the recorded byte span.
pub fn post_record(post: &PrimaryPost, created_at: &str) -> serde_json::Value {
    serde_json::json!({
        "$type": "app.bsky.feed.post",
        "text": post.text,
        "createdAt": created_at,
        "facets": [
            {
                "index": {
                    "byteStart": post.link.byte_start,
                    "byteEnd": post.link.byte_end
                },
                "features": [
                    { "$type": "app.bsky.richtext.facet#link", "uri": post.link.uri }
                ]
            }
        ]
    })
}

#[async_trait::async_trait]
impl PrimarySink for BlueskyPublisher {
    async fn publish(&self, post: &PrimaryPost) -> Result<()> {
        let mut guard = self.session.lock().await;
        let session = match guard.as_ref() {
            Some(s) => s.clone(),
            None => {
                let s = self.login().await?;
                *guard = Some(s.clone());
                s
            }
        };

        match self.create_record(&session, post).await? {
            Attempt::Done => Ok(()),
            Attempt::SessionExpired => {
                tracing::info!("bluesky session expired, logging in again");
                let fresh = self.login().await?;
                *guard = Some(fresh.clone());
                match self.create_record(&fresh, post).await? {
                    Attempt::Done => Ok(()),
                    Attempt::SessionExpired => {
                        *guard = None;
                        Err(anyhow!("bluesky rejected a fresh session"))
                    }
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "bluesky"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::compose_post;

    #[test]
    fn record_facet_points_at_link() {
        let post = compose_post("Summary.", "https://example.test/9", 300);
        let rec = post_record(&post, "2025-01-20T17:00:00.000Z");
        let text = rec["text"].as_str().unwrap();
        let start = rec["facets"][0]["index"]["byteStart"].as_u64().unwrap() as usize;
        let end = rec["facets"][0]["index"]["byteEnd"].as_u64().unwrap() as usize;
        assert_eq!(&text[start..end], "https://example.test/9");
        assert_eq!(
            rec["facets"][0]["features"][0]["uri"],
            "https://example.test/9"
        );
        assert_eq!(rec["createdAt"], "2025-01-20T17:00:00.000Z");
    }

    #[test]
    fn xrpc_urls_ignore_trailing_slash() {
        let p = BlueskyPublisher::new("https://bsky.social/", "h".into(), "p".into()).unwrap();
        assert_eq!(
            p.xrpc("com.atproto.server.createSession"),
            "https://bsky.social/xrpc/com.atproto.server.createSession"
        );
    }
}
