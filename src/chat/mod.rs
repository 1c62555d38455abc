//! Chat delivery: the capability to post a message and the dispatcher
//! handler built on top of it.

pub mod slack;

pub use slack::SlackClient;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::dispatch::{Job, JobHandler, Message, MessageResponse};

/// Why a message could not be delivered. Travels as a value inside
/// [`MessageResponse`], so it is `Clone` and carries no sources.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// The chat service answered but refused the message.
    #[error("chat API rejected the message: {0}")]
    Api(String),
    /// The request never produced a usable answer.
    #[error("chat API request failed: {0}")]
    Http(String),
    /// The job was dropped before any worker responded.
    #[error("message was dropped before delivery")]
    Dropped,
}

/// Image attachment shown under the message text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub title: String,
    pub image_url: String,
}

/// Formatting and attachment options for a post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostParams {
    /// Post as the bot user instead of an anonymous integration.
    pub as_user: bool,
    pub attachments: Vec<Attachment>,
}

impl PostParams {
    /// Post as the bot user with a single titled image.
    pub fn with_image(title: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            as_user: true,
            attachments: vec![Attachment {
                title: title.into(),
                image_url: image_url.into(),
            }],
        }
    }
}

/// A message the server accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posted {
    pub channel_id: String,
    pub timestamp: String,
}

/// Anything that can post a message to a chat channel. Each call returns
/// exactly one result.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn post_message(
        &self,
        channel_id: &str,
        text: &str,
        params: &PostParams,
    ) -> Result<Posted, ChatError>;
}

/// Dispatcher handler that delivers [`Job::Message`] through a [`ChatApi`].
///
/// Every job it receives gets exactly one [`MessageResponse`], including
/// when the API fails, so a submitter waiting on the response never hangs.
pub struct DeliveryHandler {
    api: Arc<dyn ChatApi>,
}

impl DeliveryHandler {
    pub fn new(api: Arc<dyn ChatApi>) -> Self {
        Self { api }
    }

    async fn deliver(&self, msg: Message) {
        let Message {
            channel_id,
            text,
            params,
            response,
        } = msg;

        let outcome = match self.api.post_message(&channel_id, &text, &params).await {
            Ok(posted) => MessageResponse::delivered(posted.channel_id, posted.timestamp),
            Err(e) => {
                warn!(channel_id = %channel_id, error = %e, "message delivery failed");
                MessageResponse::failed(channel_id, e)
            }
        };

        if response.send(outcome).is_err() {
            debug!("submitter stopped waiting before the response arrived");
        }
    }
}

#[async_trait]
impl JobHandler for DeliveryHandler {
    async fn handle(&self, job: Job) {
        match job {
            Job::Message(msg) => self.deliver(msg).await,
        }
    }
}
