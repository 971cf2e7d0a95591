//! Telegram Bot API notifier.
//!
//! Posts every notification to one chat with `POST /bot{token}/sendMessage`.
//! Borrower and staff messages share the chat; the text already names the
//! book and dates it concerns.

use crate::retry::{retry_with_predicate, RetryPolicy};
use lending_core::notification::{Notification, Notifier, NotifyError};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Public Bot API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Connection settings for [`TelegramNotifier`].
#[derive(Clone)]
pub struct TelegramConfig {
    /// Bot token issued by `@BotFather`
    pub bot_token: String,
    /// Target chat id or `@channel` name
    pub chat_id: String,
    /// API base URL
    pub api_url: String,
    /// Per-attempt request timeout
    pub timeout: Duration,
    /// Retries for transient failures
    pub retry: RetryPolicy,
}

impl TelegramConfig {
    /// Settings for the public API with a 10s timeout and the default retry policy
    #[must_use]
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            api_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .field("api_url", &self.api_url)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
}

#[derive(Error, Debug)]
enum SendError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("status {status}: {message}")]
    Rejected { status: u16, message: String },
}

impl SendError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rejected { status, .. } => {
                *status >= 500 || *status == StatusCode::TOO_MANY_REQUESTS.as_u16()
            },
        }
    }
}

/// [`Notifier`] that posts to a Telegram chat.
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    config: TelegramConfig,
}

impl TelegramNotifier {
    /// Create a client from `config`
    ///
    /// # Errors
    ///
    /// Returns `NotifyError` if the HTTP client cannot be built.
    pub fn new(config: TelegramConfig) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| NotifyError(e.to_string()))?;

        Ok(Self { client, config })
    }

    async fn send_message(&self, text: &str) -> Result<(), SendError> {
        let response = self
            .client
            .post(format!(
                "{}/bot{}/sendMessage",
                self.config.api_url.trim_end_matches('/'),
                self.config.bot_token
            ))
            .json(&SendMessage {
                chat_id: &self.config.chat_id,
                text,
            })
            .send()
            .await
            // Error text can carry the URL, and with it the token
            .map_err(|e| SendError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let parsed = serde_json::from_str::<ApiResponse>(&body).ok();

        match parsed {
            Some(ApiResponse { ok: true, .. }) if status.is_success() => Ok(()),
            parsed => Err(SendError::Rejected {
                status: status.as_u16(),
                message: parsed.and_then(|r| r.description).unwrap_or(body),
            }),
        }
    }
}

impl fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Notifier for TelegramNotifier {
    fn send(
        &self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        Box::pin(async move {
            retry_with_predicate(
                &self.config.retry,
                || self.send_message(&notification.text),
                SendError::is_transient,
            )
            .await
            .map_err(|e| NotifyError(e.to_string()))
        })
    }
}
