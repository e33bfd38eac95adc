use anyhow::Result;

use super::{Notice, NotificationSink, PrimaryPost, PrimarySink};

/// Dry-run sink: logs what would have been published and always succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait::async_trait]
impl PrimarySink for LogSink {
    async fn publish(&self, post: &PrimaryPost) -> Result<()> {
        tracing::info!(
            target: "dry_run",
            text = %post.text,
            link_start = post.link.byte_start,
            link_end = post.link.byte_end,
            "would publish post"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[async_trait::async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, notice: &Notice) -> Result<()> {
        tracing::info!(
            target: "dry_run",
            title = %notice.title,
            item_id = %notice.item_id,
            link = %notice.link,
            "would send notice"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
