//! Discord REST client.
//!
//! Only the two endpoints the watcher needs are used:
//! `GET /channels/{id}` and `POST /channels/{id}/messages`. Messages with an
//! image are sent as `multipart/form-data` with a `payload_json` part and a
//! `files[0]` part, which lets the embed show the upload via
//! `attachment://<filename>`.

use super::{Attachment, ChannelHandle, ChatService, Embed, OutboundMessage};
use crate::error::DeliveryError;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Longest server-requested back-off we are willing to sleep through.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(10);

/// Error bodies are clipped to this many characters before logging.
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Bot-token authenticated Discord client.
#[derive(Clone)]
pub struct DiscordClient {
    client: reqwest::Client,
    base_url: String,
    auth: String,
}

impl std::fmt::Debug for DiscordClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl DiscordClient {
    pub fn new(token: &str, timeout: Duration) -> Result<Self, DeliveryError> {
        Self::with_base_url(token, timeout, DEFAULT_API_BASE)
    }

    /// Point the client at another API root (used by tests).
    pub fn with_base_url(
        token: &str,
        timeout: Duration,
        base_url: impl Into<String>,
    ) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(
                "DiscordBot (https://github.com/subwatch, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .build()
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth: format!("Bot {token}"),
        })
    }

    fn request(
        &self,
        url: &str,
        payload: &str,
        attachment: Option<&Attachment>,
    ) -> Result<reqwest::RequestBuilder, DeliveryError> {
        let req = self.client.post(url).header(AUTHORIZATION, &self.auth);
        Ok(match attachment {
            Some(att) => {
                let file = Part::bytes(att.bytes.clone())
                    .file_name(att.filename.clone())
                    .mime_str("image/png")
                    .map_err(|e| DeliveryError::Transport(e.to_string()))?;
                let form = Form::new()
                    .text("payload_json", payload.to_string())
                    .part("files[0]", file);
                req.multipart(form)
            }
            None => req
                .header(CONTENT_TYPE, "application/json")
                .body(payload.to_string()),
        })
    }
}

#[derive(Deserialize)]
struct ChannelResponse {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct RateLimitResponse {
    retry_after: f64,
}

#[derive(Serialize)]
struct AttachmentRef<'a> {
    id: u32,
    filename: &'a str,
}

#[derive(Serialize)]
struct MessagePayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    embeds: Vec<&'a Embed>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<AttachmentRef<'a>>,
}

impl<'a> From<&'a OutboundMessage> for MessagePayload<'a> {
    fn from(msg: &'a OutboundMessage) -> Self {
        Self {
            content: msg.content.as_deref(),
            embeds: msg.embed.iter().collect(),
            attachments: msg
                .attachment
                .iter()
                .map(|a| AttachmentRef {
                    id: 0,
                    filename: &a.filename,
                })
                .collect(),
        }
    }
}

fn transport(e: reqwest::Error) -> DeliveryError {
    DeliveryError::Transport(e.to_string())
}

async fn api_error(response: reqwest::Response) -> DeliveryError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let body = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
    DeliveryError::Api { status, body }
}

#[async_trait]
impl ChatService for DiscordClient {
    async fn channel(&self, id: &str) -> Result<Option<ChannelHandle>, DeliveryError> {
        let url = format!("{}/channels/{}", self.base_url, id);
        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, &self.auth)
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            s if s.is_success() => {
                let channel: ChannelResponse = response.json().await.map_err(transport)?;
                Ok(Some(ChannelHandle {
                    id: channel.id,
                    name: channel.name,
                }))
            }
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => {
                debug!("Channel {} not visible ({})", id, response.status());
                Ok(None)
            }
            _ => Err(api_error(response).await),
        }
    }

    async fn send(&self, channel: &ChannelHandle, message: &OutboundMessage) -> Result<(), DeliveryError> {
        let url = format!("{}/channels/{}/messages", self.base_url, channel.id);
        let payload = serde_json::to_string(&MessagePayload::from(message))
            .map_err(|e| DeliveryError::Transport(format!("payload serialisation: {e}")))?;

        let mut retried = false;
        loop {
            let response = self
                .request(&url, &payload, message.attachment.as_ref())?
                .send()
                .await
                .map_err(transport)?;

            let status = response.status();
            if status.is_success() {
                return Ok(());
            }
            if status != StatusCode::TOO_MANY_REQUESTS {
                return Err(api_error(response).await);
            }

            let retry_after_secs = response
                .json::<RateLimitResponse>()
                .await
                .map(|r| r.retry_after)
                .unwrap_or(1.0);
            if retried {
                return Err(DeliveryError::RateLimited { retry_after_secs });
            }
            let wait = Duration::from_secs_f64(retry_after_secs.clamp(0.0, MAX_RETRY_AFTER.as_secs_f64()));
            warn!("Rate limited by Discord, retrying in {:?}", wait);
            tokio::time::sleep(wait).await;
            retried = true;
        }
    }
}
