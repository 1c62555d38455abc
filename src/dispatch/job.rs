//! Units of work handed to the dispatcher.
//!
//! A [`Job`] is a closed set of payloads the delivery handler understands.
//! Every [`Message`] owns its own one-shot response channel, which is the
//! only link between a submitted job and its outcome.

use tokio::sync::oneshot;

use crate::chat::{ChatError, PostParams};

/// Work item submitted on the shared job queue.
#[derive(Debug)]
pub enum Job {
    /// Post a chat message and report the outcome on the message's channel.
    Message(Message),
}

/// An outbound chat message together with its private response channel.
#[derive(Debug)]
pub struct Message {
    pub channel_id: String,
    pub text: String,
    pub params: PostParams,
    /// Written exactly once by the dispatcher worker that picked the job up.
    pub response: oneshot::Sender<MessageResponse>,
}

impl Message {
    /// Build a message with a fresh response channel.
    ///
    /// The returned receiver is the only way to learn the delivery outcome,
    /// so the caller must keep it until the response arrives.
    pub fn new(
        channel_id: impl Into<String>,
        text: impl Into<String>,
        params: PostParams,
    ) -> (Self, oneshot::Receiver<MessageResponse>) {
        let (response, rx) = oneshot::channel();
        (
            Self {
                channel_id: channel_id.into(),
                text: text.into(),
                params,
                response,
            },
            rx,
        )
    }
}

/// Final outcome of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageResponse {
    pub channel_id: String,
    /// Server-assigned message timestamp; `None` when delivery failed.
    pub timestamp: Option<String>,
    pub error: Option<ChatError>,
}

impl MessageResponse {
    pub fn delivered(channel_id: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            timestamp: Some(timestamp.into()),
            error: None,
        }
    }

    pub fn failed(channel_id: impl Into<String>, error: ChatError) -> Self {
        Self {
            channel_id: channel_id.into(),
            timestamp: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}
