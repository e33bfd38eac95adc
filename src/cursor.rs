//! Cursor store: the highest fully delivered item id per source.
//!
//! `get` materialises a `"0"` row for unknown sources; `set` overwrites unconditionally
//! (last writer wins). Errors are returned as-is so the invocation fails without advancing.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::fs;

use crate::ingest::types::ItemId;

#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn get(&self, source: &str) -> Result<ItemId>;
    async fn set(&self, source: &str, value: &ItemId) -> Result<()>;
}

/// Process-local store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    rows: Mutex<BTreeMap<String, String>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cursor(self, source: &str, value: &str) -> Self {
        self.rows
            .lock()
            .expect("cursor mutex poisoned")
            .insert(source.to_string(), value.to_string());
        self
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.rows.lock().expect("cursor mutex poisoned").clone()
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn get(&self, source: &str) -> Result<ItemId> {
        let mut rows = self.rows.lock().map_err(|_| anyhow!("cursor mutex poisoned"))?;
        let raw = rows
            .entry(source.to_string())
            .or_insert_with(|| "0".to_string());
        parse_stored(source, raw)
    }

    async fn set(&self, source: &str, value: &ItemId) -> Result<()> {
        let mut rows = self.rows.lock().map_err(|_| anyhow!("cursor mutex poisoned"))?;
        rows.insert(source.to_string(), value.to_string());
        Ok(())
    }
}

/// JSON file of `{ "<source>": "<last id>" }`, rewritten atomically (tmp + rename).
///
/// The async mutex serialises writers inside one process; separate processes sharing the
/// file are last-writer-wins, same as the row semantics.
pub struct FileCursorStore {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl FileCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn read_rows(&self) -> Result<BTreeMap<String, String>> {
        match fs::read_to_string(&self.path).await {
            Ok(s) if s.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(s) => serde_json::from_str(&s)
                .with_context(|| format!("parsing cursor file {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => {
                Err(e).with_context(|| format!("reading cursor file {}", self.path.display()))
            }
        }
    }

    async fn write_rows(&self, rows: &BTreeMap<String, String>) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(rows).context("serialising cursors")?;
        fs::write(&tmp, json)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl CursorStore for FileCursorStore {
    async fn get(&self, source: &str) -> Result<ItemId> {
        let _guard = self.lock.lock().await;
        let mut rows = self.read_rows().await?;
        if let Some(raw) = rows.get(source) {
            return parse_stored(source, raw);
        }
        rows.insert(source.to_string(), "0".to_string());
        self.write_rows(&rows).await?;
        Ok(ItemId::zero())
    }

    async fn set(&self, source: &str, value: &ItemId) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut rows = self.read_rows().await?;
        rows.insert(source.to_string(), value.to_string());
        self.write_rows(&rows).await
    }
}

/// A blank row means "never committed" and reads as zero.
fn parse_stored(source: &str, raw: &str) -> Result<ItemId> {
    if raw.trim().is_empty() {
        return Ok(ItemId::zero());
    }
    ItemId::parse(raw).ok_or_else(|| anyhow!("stored cursor for {source} is not numeric: {raw:?}"))
}
