use crate::config::{Config, NotifierConfig};
use crate::error::{Result, ScraperError};
use crate::models::{Audience, NotificationMessage};
use crate::report::plain_text;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{error, info, warn};

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Delivers a message to whoever sits behind an audience.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &NotificationMessage) -> Result<()>;

    /// Whether this notifier has a destination for `audience`.
    fn reaches(&self, audience: Audience) -> bool;
}

/// Builds the notifier named in the configuration.
pub fn from_config(config: &Config) -> Result<Box<dyn Notifier>> {
    let notifier: Box<dyn Notifier> = match &config.notifier {
        NotifierConfig::Telegram {
            bot_token,
            chat_id,
            diagnostic_chat_id,
        } => Box::new(TelegramNotifier::new(
            bot_token,
            chat_id,
            diagnostic_chat_id.clone(),
        )?),
        NotifierConfig::Webhook {
            url,
            token,
            recipient,
            diagnostic_recipient,
        } => Box::new(WebhookNotifier::new(
            url,
            token.clone(),
            recipient,
            diagnostic_recipient.clone(),
        )?),
    };

    Ok(notifier)
}

fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(SEND_TIMEOUT).build()?)
}

/// Sends through the Telegram Bot API.
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
    diagnostic_chat_id: Option<String>,
}

#[derive(Deserialize)]
struct TelegramResponse {
    ok: bool,
    description: Option<String>,
}

impl TelegramNotifier {
    pub fn new(bot_token: &str, chat_id: &str, diagnostic_chat_id: Option<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            api_base: TELEGRAM_API_BASE.to_string(),
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
            diagnostic_chat_id,
        })
    }

    /// Points the notifier at another Bot API server.
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn chat_for(&self, audience: Audience) -> Option<&str> {
        match audience {
            Audience::Primary => Some(self.chat_id.as_str()),
            Audience::Diagnostic => self.diagnostic_chat_id.as_deref(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, message: &NotificationMessage) -> Result<()> {
        let chat_id = self.chat_for(message.audience).ok_or_else(|| {
            ScraperError::Notify(format!("no Telegram chat for {:?}", message.audience))
        })?;

        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let payload = serde_json::json!({
            "chat_id": chat_id,
            "text": message.body,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        // The request URL carries the bot token, so it is stripped from errors.
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ScraperError::Notify(e.without_url().to_string()))?;

        let status = response.status();
        let reply: TelegramResponse = response
            .json()
            .await
            .map_err(|e| ScraperError::Notify(e.without_url().to_string()))?;

        if !status.is_success() || !reply.ok {
            return Err(ScraperError::Notify(format!(
                "Telegram answered HTTP {}: {}",
                status.as_u16(),
                reply.description.unwrap_or_default()
            )));
        }

        Ok(())
    }

    fn reaches(&self, audience: Audience) -> bool {
        self.chat_for(audience).is_some()
    }
}

/// Posts `{"to": ..., "body": ...}` to a messaging gateway, as plain text.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    recipient: String,
    diagnostic_recipient: Option<String>,
}

impl WebhookNotifier {
    pub fn new(
        url: &str,
        token: Option<String>,
        recipient: &str,
        diagnostic_recipient: Option<String>,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            url: url.to_string(),
            token,
            recipient: recipient.to_string(),
            diagnostic_recipient,
        })
    }

    fn recipient_for(&self, audience: Audience) -> Option<&str> {
        match audience {
            Audience::Primary => Some(self.recipient.as_str()),
            Audience::Diagnostic => self.diagnostic_recipient.as_deref(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, message: &NotificationMessage) -> Result<()> {
        let recipient = self.recipient_for(message.audience).ok_or_else(|| {
            ScraperError::Notify(format!("no gateway recipient for {:?}", message.audience))
        })?;

        let mut request = self.client.post(&self.url).json(&serde_json::json!({
            "to": recipient,
            "body": plain_text(&message.body),
        }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ScraperError::Notify(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ScraperError::Notify(format!(
                "gateway answered HTTP {}",
                response.status().as_u16()
            )));
        }

        Ok(())
    }

    fn reaches(&self, audience: Audience) -> bool {
        self.recipient_for(audience).is_some()
    }
}

/// Prints messages instead of sending them.
pub struct StdoutNotifier;

#[async_trait]
impl Notifier for StdoutNotifier {
    async fn send(&self, message: &NotificationMessage) -> Result<()> {
        println!("[{:?}]\n{}", message.audience, message.body);
        Ok(())
    }

    fn reaches(&self, _audience: Audience) -> bool {
        true
    }
}

/// What happened to a run's message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Failed,
    /// No destination for the message's audience.
    Suppressed,
}

/// Hands messages to the notifier, suppressing those nobody should receive.
pub struct NotificationRouter {
    notifier: Box<dyn Notifier>,
}

impl NotificationRouter {
    pub fn new(notifier: Box<dyn Notifier>) -> Self {
        Self { notifier }
    }

    pub async fn dispatch(&self, message: &NotificationMessage) -> Delivery {
        if !self.notifier.reaches(message.audience) {
            warn!(
                "No destination for {:?} messages, not sending:\n{}",
                message.audience, message.body
            );
            return Delivery::Suppressed;
        }

        match self.notifier.send(message).await {
            Ok(()) => {
                info!("Sent {:?} notification", message.audience);
                Delivery::Delivered
            }
            Err(e) => {
                error!("{}", e);
                Delivery::Failed
            }
        }
    }
}
