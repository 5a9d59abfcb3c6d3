//! Outbound chat channel.
//!
//! The pipeline and the control panel only need three things from a chat
//! platform: look up a channel, post a message, post a message with an image.
//! [`ChatService`] is that seam; [`discord::DiscordClient`] implements it over
//! the Discord REST API and tests plug in in-memory fakes.

pub mod discord;

use crate::error::{DeliveryError, WatchError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// A resolved, postable channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHandle {
    pub id: String,
    pub name: Option<String>,
}

/// An image uploaded together with a message.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("filename", &self.filename)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// One outbound message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutboundMessage {
    pub content: Option<String>,
    pub embed: Option<Embed>,
    pub attachment: Option<Attachment>,
}

impl OutboundMessage {
    /// Plain text, forwarded verbatim.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn embed(embed: Embed) -> Self {
        Self {
            embed: Some(embed),
            ..Self::default()
        }
    }

    pub fn with_attachment(mut self, filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.attachment = Some(Attachment {
            filename: filename.into(),
            bytes,
        });
        self
    }
}

/// Rich message card, serialised in Discord's embed shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedImage {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

impl Embed {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            timestamp: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    /// Show an attachment uploaded with the same message.
    pub fn attached_image(mut self, filename: &str) -> Self {
        self.image = Some(EmbedImage {
            url: format!("attachment://{filename}"),
        });
        self
    }

    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(EmbedFooter {
            text: text.into(),
            icon_url: None,
        });
        self
    }
}

/// Chat platform operations the watcher depends on.
#[async_trait]
pub trait ChatService: Send + Sync {
    /// `Ok(None)` when the channel does not exist or is not visible.
    async fn channel(&self, id: &str) -> Result<Option<ChannelHandle>, DeliveryError>;

    async fn send(&self, channel: &ChannelHandle, message: &OutboundMessage) -> Result<(), DeliveryError>;
}

/// The configured destination channel, resolved on every use.
#[derive(Clone)]
pub struct Outbound {
    chat: Arc<dyn ChatService>,
    channel_id: String,
}

impl Outbound {
    pub fn new(chat: Arc<dyn ChatService>, channel_id: impl Into<String>) -> Self {
        Self {
            chat,
            channel_id: channel_id.into(),
        }
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn service(&self) -> &dyn ChatService {
        self.chat.as_ref()
    }

    /// Look up the channel; `None` if it is gone or the lookup failed.
    pub async fn resolve(&self) -> Option<ChannelHandle> {
        match self.chat.channel(&self.channel_id).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Channel lookup for {} failed: {}", self.channel_id, e);
                None
            }
        }
    }

    /// Post plain text to the channel.
    pub async fn send_text(&self, text: &str) -> Result<(), WatchError> {
        let channel = self
            .resolve()
            .await
            .ok_or_else(|| DeliveryError::ChannelUnavailable(self.channel_id.clone()))?;
        self.chat.send(&channel, &OutboundMessage::text(text)).await?;
        Ok(())
    }
}
