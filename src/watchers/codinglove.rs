//! Watcher for thecodinglove.com.
//!
//! Every tick: fetch the front page, extract (image, title) pairs, skip the
//! ones already recorded, post each new one and wait for its delivery, and
//! record it only after the chat API confirmed it. The first failed
//! delivery ends the tick; whatever was not recorded is retried next tick.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use color_eyre::eyre::{Context, Result};
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use super::extract::{Extract, Extracted, PostExtractor};
use super::fetch::{Fetch, HttpFetcher};
use crate::chat::{ChatError, PostParams};
use crate::config::CodingLoveConfig;
use crate::dispatch::{Job, JobQueue, Message, MessageResponse};
use crate::sender::{Sender, StopSignal};
use crate::store::{DedupStore, SqliteStore};

pub const NAME: &str = "codinglove";
pub const POSTS_BUCKET: &str = "posts";
pub const DEFAULT_SOURCE_URL: &str = "http://thecodinglove.com/";
pub const MESSAGE_TEXT: &str = "New codinglove post";

/// Where to look, where to post, how often.
#[derive(Debug, Clone)]
pub struct CodingLoveSettings {
    pub source_url: String,
    pub channel_id: String,
    pub interval: Duration,
}

/// Why a tick ended before going through every item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanAbort {
    /// The source document could not be retrieved.
    FetchFailed,
    /// Image and title counts differ; the page layout is not trusted.
    Misaligned { images: usize, titles: usize },
    /// Reading or writing the dedup record for `key` failed.
    StoreFailed { key: String },
    /// The chat API did not accept the post for `key`.
    DeliveryFailed { key: String },
    /// The dispatcher is gone.
    QueueClosed,
    /// Stop was requested between two items.
    Stopped,
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Keys delivered and recorded, in order.
    pub delivered: Vec<String>,
    pub skipped_seen: usize,
    pub skipped_missing_key: usize,
    pub aborted: Option<ScanAbort>,
}

pub struct CodingLove {
    settings: CodingLoveSettings,
    fetcher: Arc<dyn Fetch>,
    extractor: Arc<dyn Extract>,
    store: Arc<dyn DedupStore>,
    stop: StopSignal,
}

impl CodingLove {
    pub fn new(
        settings: CodingLoveSettings,
        fetcher: Arc<dyn Fetch>,
        extractor: Arc<dyn Extract>,
        store: Arc<dyn DedupStore>,
    ) -> Self {
        Self {
            settings,
            fetcher,
            extractor,
            store,
            stop: StopSignal::new(),
        }
    }

    /// Production wiring: HTTP fetcher, post extractor, SQLite store at
    /// the configured path.
    pub fn from_config(config: &CodingLoveConfig) -> Result<Self> {
        let posts_db = config.posts_db_path()?;
        let store = SqliteStore::open(&posts_db, POSTS_BUCKET)
            .wrap_err_with(|| format!("cannot open posts db {}", posts_db.display()))?;

        Ok(Self::new(
            CodingLoveSettings {
                source_url: config.source_url.clone(),
                channel_id: config.channel.clone(),
                interval: Duration::from_secs(config.interval_secs),
            },
            Arc::new(HttpFetcher::new()?),
            Arc::new(PostExtractor::new()?),
            Arc::new(store),
        ))
    }

    pub fn settings(&self) -> &CodingLoveSettings {
        &self.settings
    }

    /// Run a single tick outside the timer loop.
    pub async fn scan_once(&self, jobs: &JobQueue) -> ScanReport {
        self.scan(jobs).await
    }

    async fn watch(&self, jobs: &JobQueue, mut stop_rx: watch::Receiver<bool>) {
        let period = self.settings.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *stop_rx.borrow_and_update() {
                return;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.scan(jobs).await;
                    info!(
                        delivered = report.delivered.len(),
                        seen = report.skipped_seen,
                        missing_key = report.skipped_missing_key,
                        aborted = ?report.aborted,
                        "scan finished"
                    );
                }
                changed = stop_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }

    async fn scan(&self, jobs: &JobQueue) -> ScanReport {
        let url = &self.settings.source_url;
        let mut report = ScanReport::default();
        debug!(url = %url, "checking for new posts");

        let document = match self.fetcher.fetch(url).await {
            Ok(doc) => doc,
            Err(e) => {
                error!(url = %url, error = %format!("{:#}", e), "cannot read source page");
                report.aborted = Some(ScanAbort::FetchFailed);
                return report;
            }
        };

        let Extracted { images, titles } = self.extractor.extract(&document);
        if images.len() != titles.len() {
            error!(
                images = images.len(),
                titles = titles.len(),
                "found images are unequal to found titles"
            );
            report.aborted = Some(ScanAbort::Misaligned {
                images: images.len(),
                titles: titles.len(),
            });
            return report;
        }

        for (image, title) in images.into_iter().zip(titles) {
            if self.stop.is_fired() {
                report.aborted = Some(ScanAbort::Stopped);
                break;
            }

            let Some(key) = image else {
                debug!(title = %title, "post has no image source");
                report.skipped_missing_key += 1;
                continue;
            };

            match self.store.exists(&key).await {
                Ok(true) => {
                    debug!(gif = %key, "gif is already recorded");
                    report.skipped_seen += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    error!(gif = %key, error = %format!("{:#}", e), "cannot read posts db");
                    report.aborted = Some(ScanAbort::StoreFailed { key });
                    break;
                }
            }

            let response = match self.deliver(jobs, &key, &title).await {
                Ok(resp) => resp,
                Err(abort) => {
                    report.aborted = Some(abort);
                    break;
                }
            };

            if let Some(err) = response.error {
                error!(
                    channel_id = %response.channel_id,
                    gif = %key,
                    error = %err,
                    "error while posting message"
                );
                report.aborted = Some(ScanAbort::DeliveryFailed { key });
                break;
            }

            // A record must be non-empty to count, so fall back to the key.
            let value = if title.trim().is_empty() { &key } else { &title };
            if let Err(e) = self.store.put(&key, value).await {
                error!(gif = %key, error = %format!("{:#}", e), "cannot record delivered post");
                report.aborted = Some(ScanAbort::StoreFailed { key });
                break;
            }

            debug!(
                title = %title,
                gif = %key,
                channel_id = %response.channel_id,
                "message sent"
            );
            report.delivered.push(key);
        }

        report
    }

    /// Submit one post and wait for its own response.
    async fn deliver(
        &self,
        jobs: &JobQueue,
        key: &str,
        title: &str,
    ) -> Result<MessageResponse, ScanAbort> {
        let channel_id = &self.settings.channel_id;
        let (msg, response) = Message::new(
            channel_id.as_str(),
            MESSAGE_TEXT,
            PostParams::with_image(title, key),
        );

        if jobs.submit(Job::Message(msg)).await.is_err() {
            error!("dispatcher queue closed, cannot post");
            return Err(ScanAbort::QueueClosed);
        }

        Ok(response
            .await
            .unwrap_or_else(|_| MessageResponse::failed(channel_id.as_str(), ChatError::Dropped)))
    }
}

#[async_trait]
impl Sender for CodingLove {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self, jobs: JobQueue) {
        let stop_rx = self.stop.arm();
        debug!(
            url = %self.settings.source_url,
            interval_secs = self.settings.interval.as_secs(),
            "starting codinglove watcher"
        );
        self.watch(&jobs, stop_rx).await;
        self.stop.finish();
    }

    async fn stop(&self) {
        self.stop.fire().await;
        debug!("codinglove watcher stopped");
    }
}
