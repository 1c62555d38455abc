// Each integration test file uses only part of MockChat
#![allow(dead_code)]

//! Test-only chat API.
//!
//! Implements `ChatApi` in memory: records every call, fails posts whose
//! image URL was marked with [`MockChat::fail_url`], and tracks how many
//! posts are in flight at once.
//!
//! ```rust
//! let chat = MockChat::new();
//! chat.fail_url("b.gif");
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use butler::chat::{ChatApi, ChatError, PostParams, Posted};

/// One recorded `post_message` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedCall {
    pub channel_id: String,
    pub text: String,
    pub as_user: bool,
    pub title: Option<String>,
    pub image_url: Option<String>,
}

pub struct MockChat {
    calls: Mutex<Vec<PostedCall>>,
    failing: Mutex<HashSet<String>>,
    fail_all: bool,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockChat {
    pub fn new() -> Self {
        Self::build(false, Duration::ZERO)
    }

    /// Every post takes `delay` before answering.
    pub fn slow(delay: Duration) -> Self {
        Self::build(false, delay)
    }

    /// Every post is rejected.
    pub fn broken() -> Self {
        Self::build(true, Duration::ZERO)
    }

    fn build(fail_all: bool, delay: Duration) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            fail_all,
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Reject posts carrying this image URL until [`MockChat::heal`].
    pub fn fail_url(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn calls(&self) -> Vec<PostedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Image URLs of all calls, in call order.
    pub fn posted_urls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| c.image_url)
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Highest number of concurrent `post_message` calls seen.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatApi for MockChat {
    async fn post_message(
        &self,
        channel_id: &str,
        text: &str,
        params: &PostParams,
    ) -> Result<Posted, ChatError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let attachment = params.attachments.first();
        let call = PostedCall {
            channel_id: channel_id.to_string(),
            text: text.to_string(),
            as_user: params.as_user,
            title: attachment.map(|a| a.title.clone()),
            image_url: attachment.map(|a| a.image_url.clone()),
        };
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(call.clone());
            calls.len()
        };

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let rejected = self.fail_all
            || call
                .image_url
                .as_ref()
                .is_some_and(|url| self.failing.lock().unwrap().contains(url));
        if rejected {
            return Err(ChatError::Api("channel_not_found".to_string()));
        }

        Ok(Posted {
            channel_id: channel_id.to_string(),
            timestamp: format!("1500000000.{:06}", n),
        })
    }
}
