//! Remote game relay client.

use std::future::Future;

use serde_json::Value;
use thiserror::Error;

/// Failure of one fetch cycle against the relay. Recoverable: a later poll
/// may succeed.
#[derive(Error, Debug, Clone)]
pub enum FeedError {
    #[error("Request error: {0}")]
    Transport(String),

    #[error("HTTP {status}")]
    Upstream {
        status: u16,
        /// `error` field of the relay's JSON failure body, when present.
        message: Option<String>,
    },
}

/// Something that can fetch the raw move record for a remote game.
pub trait GameFeed: Send + Sync + 'static {
    fn fetch(&self, game_id: &str) -> impl Future<Output = Result<String, FeedError>> + Send;
}

/// Production relay client (`GET <relay_url>?game=<id>`).
pub struct HttpRelay {
    client: reqwest::Client,
    relay_url: String,
}

impl HttpRelay {
    pub fn new(relay_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("Kibitz/1.0")
            .build()
            .unwrap();
        Self {
            client,
            relay_url: relay_url.into(),
        }
    }
}

impl GameFeed for HttpRelay {
    fn fetch(&self, game_id: &str) -> impl Future<Output = Result<String, FeedError>> + Send {
        async move {
            let response = self
                .client
                .get(&self.relay_url)
                .query(&[("game", game_id)])
                .send()
                .await
                .map_err(|e| FeedError::Transport(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let message = response.json::<Value>().await.ok().and_then(|body| {
                    body.get("error")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                });
                return Err(FeedError::Upstream {
                    status: status.as_u16(),
                    message,
                });
            }

            response
                .text()
                .await
                .map_err(|e| FeedError::Transport(e.to_string()))
        }
    }
}
