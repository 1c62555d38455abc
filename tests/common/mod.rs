//! Shared helpers for the integration tests.

// Each integration test file uses only part of common
#![allow(dead_code)]

pub mod mock_chat;
pub use mock_chat::{MockChat, PostedCall};

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use color_eyre::eyre::{eyre, Result};

use butler::chat::DeliveryHandler;
use butler::dispatch::{Dispatcher, JobQueue, RunningDispatcher};
use butler::store::{DedupStore, SqliteStore};
use butler::watchers::codinglove::{CodingLove, CodingLoveSettings, POSTS_BUCKET};
use butler::watchers::{Extract, Extracted, Fetch};

pub const CHANNEL: &str = "C0TEST";
pub const SOURCE_URL: &str = "http://codinglove.test/";

/// Serves a fixed document, or fails while `fail` is set.
pub struct ScriptedFetcher {
    document: Mutex<String>,
    fail: Mutex<bool>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new(document: &str) -> Self {
        Self {
            document: Mutex::new(document.to_string()),
            fail: Mutex::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetch for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail.lock().unwrap() {
            return Err(eyre!("GET {} failed: connection refused", url));
        }
        Ok(self.document.lock().unwrap().clone())
    }
}

/// Ignores the document and returns whatever was last set.
pub struct StaticExtractor {
    items: Mutex<Extracted>,
}

impl StaticExtractor {
    /// `(image_url, title)` pairs, all with an image.
    pub fn new(items: &[(&str, &str)]) -> Self {
        let extractor = Self {
            items: Mutex::new(Extracted::default()),
        };
        extractor.set(items);
        extractor
    }

    pub fn set(&self, items: &[(&str, &str)]) {
        *self.items.lock().unwrap() = Extracted {
            images: items.iter().map(|(img, _)| Some(img.to_string())).collect(),
            titles: items.iter().map(|(_, title)| title.to_string()).collect(),
        };
    }

    pub fn set_raw(&self, extracted: Extracted) {
        *self.items.lock().unwrap() = extracted;
    }
}

impl Extract for StaticExtractor {
    fn extract(&self, _document: &str) -> Extracted {
        self.items.lock().unwrap().clone()
    }
}

/// SQLite store that fails `exists` or `put` for chosen keys.
pub struct FailingStore {
    inner: Arc<SqliteStore>,
    fail_exists: Mutex<HashSet<String>>,
    fail_put: Mutex<HashSet<String>>,
}

impl FailingStore {
    pub fn new(inner: Arc<SqliteStore>) -> Self {
        Self {
            inner,
            fail_exists: Mutex::new(HashSet::new()),
            fail_put: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_exists_for(&self, key: &str) {
        self.fail_exists.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_put_for(&self, key: &str) {
        self.fail_put.lock().unwrap().insert(key.to_string());
    }

    pub fn heal(&self) {
        self.fail_exists.lock().unwrap().clear();
        self.fail_put.lock().unwrap().clear();
    }
}

#[async_trait]
impl DedupStore for FailingStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        if self.fail_exists.lock().unwrap().contains(key) {
            return Err(eyre!("database is locked"));
        }
        self.inner.exists(key).await
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        if self.fail_put.lock().unwrap().contains(key) {
            return Err(eyre!("disk I/O error"));
        }
        self.inner.put(key, value).await
    }

    async fn insert_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        if self.fail_put.lock().unwrap().contains(key) {
            return Err(eyre!("disk I/O error"));
        }
        self.inner.insert_if_absent(key, value).await
    }
}

pub fn settings(interval: Duration) -> CodingLoveSettings {
    CodingLoveSettings {
        source_url: SOURCE_URL.to_string(),
        channel_id: CHANNEL.to_string(),
        interval,
    }
}

pub fn memory_store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::in_memory(POSTS_BUCKET).unwrap())
}

/// Everything a CodingLove test pokes at
pub struct Harness {
    pub watcher: Arc<CodingLove>,
    pub fetcher: Arc<ScriptedFetcher>,
    pub extractor: Arc<StaticExtractor>,
    pub store: Arc<SqliteStore>,
    pub chat: Arc<MockChat>,
}

impl Harness {
    pub fn new(items: &[(&str, &str)], chat: MockChat, interval: Duration) -> Self {
        Self::with_store(items, chat, interval, memory_store())
    }

    pub fn with_store(
        items: &[(&str, &str)],
        chat: MockChat,
        interval: Duration,
        store: Arc<SqliteStore>,
    ) -> Self {
        Self::build(items, chat, interval, store.clone(), store)
    }

    /// Harness whose watcher goes through a [`FailingStore`]; `store` is
    /// the SQLite store behind it.
    pub fn with_failing_store(items: &[(&str, &str)], chat: MockChat) -> (Self, Arc<FailingStore>) {
        let store = memory_store();
        let failing = Arc::new(FailingStore::new(store.clone()));
        let harness = Self::build(
            items,
            chat,
            Duration::from_secs(3600),
            store,
            failing.clone(),
        );
        (harness, failing)
    }

    fn build(
        items: &[(&str, &str)],
        chat: MockChat,
        interval: Duration,
        store: Arc<SqliteStore>,
        dedup: Arc<dyn DedupStore>,
    ) -> Self {
        let fetcher = Arc::new(ScriptedFetcher::new("<html></html>"));
        let extractor = Arc::new(StaticExtractor::new(items));
        let watcher = Arc::new(CodingLove::new(
            settings(interval),
            fetcher.clone(),
            extractor.clone(),
            dedup,
        ));
        Self {
            watcher,
            fetcher,
            extractor,
            store,
            chat: Arc::new(chat),
        }
    }

    pub fn handler(&self) -> Arc<DeliveryHandler> {
        Arc::new(DeliveryHandler::new(self.chat.clone()))
    }

    /// A running dispatcher delivering through this harness' chat.
    pub fn dispatcher(&self, workers: usize) -> (RunningDispatcher, JobQueue) {
        Dispatcher::new(workers, self.handler()).start()
    }
}

/// Poll `cond` every few milliseconds for up to two seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
