//! Operator notifications: plain channel messages and rich webhook cards.
//!
//! Delivery is fire-and-forget. A notification failure is logged and
//! dropped; it never changes the outcome of the action that triggered it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use crate::config::NotificationsConfig;
use crate::probe;

/// Card color for a successful on-chain action.
pub const COLOR_SUCCESS: u32 = 0x0042_b24e;
/// Card color for a failed action that needs an operator.
pub const COLOR_FAILURE: u32 = 0x00e8_3938;
/// Card color for informational pruning notices.
pub const COLOR_INFO: u32 = 0x00ff_a500;
/// Card color for a newly scheduled action.
pub const COLOR_SCHEDULED: u32 = 0x0000_ff00;

/// A plain text message addressed to a named operator channel.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChannelMessage {
    /// The channel the message is routed to.
    #[serde(rename = "channelAlias")]
    pub channel_alias: String,
    /// One-line summary.
    pub subject: String,
    /// The message body.
    pub message: String,
}

/// A named field of a [`Card`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CardField {
    /// Field label.
    pub name: String,
    /// Field content.
    pub value: String,
    /// Whether the field renders next to its neighbors.
    pub inline: bool,
}

/// A rich webhook card: a title, a status color, optional link, and a
/// list of fields.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Card {
    /// Card title.
    pub title: String,
    /// Accent color, as a 24-bit RGB value.
    pub color: u32,
    /// An optional link the title points at, usually a block explorer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// The card fields, rendered in order.
    pub fields: Vec<CardField>,
}

impl Card {
    /// Creates a card with the given title and color and no fields.
    pub fn new<S: Into<String>>(title: S, color: u32) -> Self {
        Self {
            title: title.into(),
            color,
            url: None,
            fields: Vec::new(),
        }
    }

    /// Sets the link the card title points at.
    pub fn url<S: Into<String>>(mut self, url: S) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Appends a field.
    pub fn field<N, V>(mut self, name: N, value: V, inline: bool) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        self.fields.push(CardField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }
}

/// The webhook wire shape: an empty content string and exactly one embed.
#[derive(Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
    embeds: [&'a Card; 1],
}

/// Somewhere notifications can be delivered to.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Delivers a plain channel message.
    async fn channel_message(&self, message: ChannelMessage);

    /// Delivers a rich card.
    async fn card(&self, card: Card);
}

/// Delivers notifications over HTTP: channel messages to the internal
/// notification endpoint, cards to a chat webhook. Either endpoint may be
/// left unconfigured, in which case its notifications are dropped with a
/// debug log.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    channel_endpoint: Option<Url>,
    webhook: Option<Url>,
}

impl WebhookNotifier {
    /// Creates a notifier from the notifications configuration.
    pub fn new(config: &NotificationsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            channel_endpoint: config.channel_endpoint.clone(),
            webhook: config.webhook.clone().map(Into::into),
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, url: &Url, payload: &T) {
        let outcome = self
            .client
            .post(url.clone())
            .json(payload)
            .send()
            .await
            .and_then(|r| r.error_for_status());
        if let Err(e) = outcome {
            tracing::error!(
                target: probe::TARGET,
                kind = %probe::Kind::Notify,
                error = %e,
                "failed to deliver a notification",
            );
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn channel_message(&self, message: ChannelMessage) {
        let Some(url) = &self.channel_endpoint else {
            tracing::debug!(
                subject = %message.subject,
                "no channel endpoint configured, dropping message",
            );
            return;
        };
        self.post(url, &message).await;
        tracing::trace!(
            target: probe::TARGET,
            kind = %probe::Kind::Notify,
            subject = %message.subject,
            "channel message sent",
        );
    }

    async fn card(&self, card: Card) {
        let Some(url) = &self.webhook else {
            tracing::debug!(
                title = %card.title,
                "no webhook configured, dropping card",
            );
            return;
        };
        let payload = WebhookPayload {
            content: "",
            embeds: [&card],
        };
        self.post(url, &payload).await;
        tracing::trace!(
            target: probe::TARGET,
            kind = %probe::Kind::Notify,
            title = %card.title,
            "card sent",
        );
    }
}

/// A cloneable handle the tasks hold: a sink plus the channel alias all
/// channel messages are routed to.
#[derive(Clone)]
pub struct Notifications {
    sink: Arc<dyn NotificationSink>,
    channel_alias: String,
}

impl std::fmt::Debug for Notifications {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifications")
            .field("channel_alias", &self.channel_alias)
            .finish()
    }
}

impl Notifications {
    /// Creates a handle routing channel messages to `channel_alias`.
    pub fn new<S: Into<String>>(
        sink: Arc<dyn NotificationSink>,
        channel_alias: S,
    ) -> Self {
        Self {
            sink,
            channel_alias: channel_alias.into(),
        }
    }

    /// Sends a plain channel message.
    pub async fn channel<S, M>(&self, subject: S, message: M)
    where
        S: Into<String>,
        M: Into<String>,
    {
        self.sink
            .channel_message(ChannelMessage {
                channel_alias: self.channel_alias.clone(),
                subject: subject.into(),
                message: message.into(),
            })
            .await;
    }

    /// Sends a rich card.
    pub async fn card(&self, card: Card) {
        self.sink.card(card).await;
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use parking_lot::Mutex;

    /// Records everything sent through it, for assertions in task tests.
    #[derive(Default)]
    pub struct RecordingSink {
        pub messages: Mutex<Vec<ChannelMessage>>,
        pub cards: Mutex<Vec<Card>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn channel_message(&self, message: ChannelMessage) {
            self.messages.lock().push(message);
        }

        async fn card(&self, card: Card) {
            self.cards.lock().push(card);
        }
    }
}
