use crate::error::{Result, ScraperError};
use crate::models::{Credential, DelayConfig};
use crate::parsers::endpoint::DEFAULT_ATTENDANCE_PATH;
use std::fmt;
use std::time::Duration;
use url::Url;

pub const DEFAULT_LOGIN_URL: &str = "https://mgit.winnou.net/index.php";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Where notifications go.
#[derive(Clone)]
pub enum NotifierConfig {
    Telegram {
        bot_token: String,
        chat_id: String,
        /// Operator chat for failures. Without it failures are only logged.
        diagnostic_chat_id: Option<String>,
    },
    /// A messaging gateway taking `{"to", "body"}` JSON posts.
    Webhook {
        url: String,
        token: Option<String>,
        recipient: String,
        diagnostic_recipient: Option<String>,
    },
}

impl fmt::Debug for NotifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifierConfig::Telegram {
                chat_id,
                diagnostic_chat_id,
                ..
            } => f
                .debug_struct("Telegram")
                .field("bot_token", &"<redacted>")
                .field("chat_id", chat_id)
                .field("diagnostic_chat_id", diagnostic_chat_id)
                .finish(),
            NotifierConfig::Webhook {
                url,
                recipient,
                diagnostic_recipient,
                ..
            } => f
                .debug_struct("Webhook")
                .field("url", url)
                .field("token", &"<redacted>")
                .field("recipient", recipient)
                .field("diagnostic_recipient", diagnostic_recipient)
                .finish(),
        }
    }
}

/// Everything a run needs, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// The portal login page. Relative links on the portal resolve against it.
    pub login_url: String,
    /// Skips endpoint resolution when set.
    pub attendance_url: Option<String>,
    /// Used when the portal page gives no hint of the attendance report.
    pub default_attendance_path: String,
    pub credential: Credential,
    pub notifier: NotifierConfig,
    /// Per-request timeout.
    pub timeout: Duration,
    pub use_browser: bool,
    pub browser_command: Option<String>,
    pub delay: DelayConfig,
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration from any key/value source.
    ///
    /// Every missing required key is reported at once; blank values count as
    /// missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut missing: Vec<String> = Vec::new();
        let mut require = |key: &str| {
            get(key).unwrap_or_else(|| {
                missing.push(key.to_string());
                String::new()
            })
        };

        let username = require("PORTAL_USERNAME");
        let password = require("PORTAL_PASSWORD");

        let notifier_kind = get("NOTIFIER").unwrap_or_else(|| "telegram".to_string());
        let notifier = match notifier_kind.to_ascii_lowercase().as_str() {
            "telegram" => Some(NotifierConfig::Telegram {
                bot_token: require("TELEGRAM_BOT_TOKEN"),
                chat_id: require("TELEGRAM_CHAT_ID"),
                diagnostic_chat_id: get("TELEGRAM_DIAGNOSTIC_CHAT_ID"),
            }),
            "webhook" => Some(NotifierConfig::Webhook {
                url: require("WEBHOOK_URL"),
                token: get("WEBHOOK_TOKEN"),
                recipient: require("WEBHOOK_RECIPIENT"),
                diagnostic_recipient: get("WEBHOOK_DIAGNOSTIC_RECIPIENT"),
            }),
            _ => None,
        };

        let use_browser = get("USE_BROWSER")
            .map(|value| parse_flag("USE_BROWSER", &value))
            .transpose();
        let browser_command = get("BROWSER_COMMAND");
        if matches!(use_browser, Ok(Some(true))) && browser_command.is_none() {
            require("BROWSER_COMMAND");
        }

        // Invalid values are reported only once nothing is missing.
        if !missing.is_empty() {
            return Err(ScraperError::ConfigMissing(missing));
        }
        let notifier = notifier.ok_or(ScraperError::ConfigInvalid {
            key: "NOTIFIER".to_string(),
            value: notifier_kind,
        })?;
        let use_browser = use_browser?.unwrap_or(false);

        let login_url = get("LOGIN_URL").unwrap_or_else(|| DEFAULT_LOGIN_URL.to_string());
        Url::parse(&login_url).map_err(|_| ScraperError::ConfigInvalid {
            key: "LOGIN_URL".to_string(),
            value: login_url.clone(),
        })?;

        let timeout_secs = match get("TIMEOUT_SECONDS") {
            Some(value) => value
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ScraperError::ConfigInvalid {
                    key: "TIMEOUT_SECONDS".to_string(),
                    value,
                })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let delay = match get("REQUEST_DELAY_MS") {
            Some(value) => DelayConfig::from_range(&value).ok_or(ScraperError::ConfigInvalid {
                key: "REQUEST_DELAY_MS".to_string(),
                value,
            })?,
            None => DelayConfig::default(),
        };

        Ok(Self {
            login_url,
            attendance_url: get("ATTENDANCE_URL"),
            default_attendance_path: get("ATTENDANCE_DEFAULT_PATH")
                .unwrap_or_else(|| DEFAULT_ATTENDANCE_PATH.to_string()),
            credential: Credential::new(username, password),
            notifier,
            timeout: Duration::from_secs(timeout_secs),
            use_browser,
            browser_command,
            delay,
        })
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ScraperError::ConfigInvalid {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
