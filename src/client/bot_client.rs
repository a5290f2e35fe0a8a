use std::time::Duration;

use thiserror::Error;

use crate::broker::message::{Acknowledgment, Bot, Notification, PublishRequest};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("request to {url} timed out")]
    Timeout {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("response from {url} is not an acknowledgment: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl NotifyError {
    /// Whether the bot failed to answer within the request timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, NotifyError::Timeout { .. })
    }

    fn classify(url: &str, source: reqwest::Error) -> Self {
        let url = url.to_string();
        if source.is_timeout() {
            NotifyError::Timeout { url, source }
        } else if source.is_decode() {
            NotifyError::Decode { url, source }
        } else {
            NotifyError::Transport { url, source }
        }
    }
}

/// HTTP client for bot endpoints. Every bot listens on the same port.
#[derive(Debug, Clone)]
pub struct BotClient {
    http: reqwest::Client,
    bot_port: u16,
}

impl BotClient {
    /// Builds a client whose requests (send and response body) give up after
    /// `timeout`.
    pub fn new(bot_port: u16, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()?;
        Ok(Self { http, bot_port })
    }

    /// The URL notifications for `bot` are POSTed to.
    pub fn endpoint(&self, bot: &Bot) -> String {
        format!("http://{}:{}/", bot.address, self.bot_port)
    }

    /// Sends `request` to `bot` and waits for its acknowledgment. The status
    /// code is ignored; only the body decides.
    pub async fn notify(
        &self,
        bot: &Bot,
        request: &PublishRequest,
    ) -> Result<Acknowledgment, NotifyError> {
        let url = self.endpoint(bot);
        let response = self
            .http
            .post(&url)
            .json(&Notification::new(bot, request))
            .send()
            .await
            .map_err(|e| NotifyError::classify(&url, e))?;

        response
            .json::<Acknowledgment>()
            .await
            .map_err(|e| NotifyError::classify(&url, e))
    }
}
