//! Pushbullet notification channel.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use seatwatch::{Notifier, TrackerError, TrackerResult};

pub const PUSHBULLET_ENDPOINT: &str = "https://api.pushbullet.com/v2/pushes";

#[derive(Serialize)]
struct Push<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    title: &'a str,
    body: &'a str,
}

/// Sends note pushes to every device on a Pushbullet account.
pub struct PushbulletNotifier {
    client: reqwest::Client,
    token: String,
    endpoint: String,
}

impl PushbulletNotifier {
    pub fn new(token: &str, timeout: Duration) -> TrackerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TrackerError::Config(format!("cannot build http client: {e}")))?;
        Ok(Self {
            client,
            token: token.to_string(),
            endpoint: PUSHBULLET_ENDPOINT.to_string(),
        })
    }

    /// Send pushes somewhere other than the public API.
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }
}

#[async_trait]
impl Notifier for PushbulletNotifier {
    async fn notify(&self, title: &str, body: &str) -> TrackerResult<()> {
        let push = Push {
            kind: "note",
            title,
            body,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .header("Access-Token", &self.token)
            .json(&push)
            .send()
            .await
            .map_err(|e| TrackerError::Notify(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(TrackerError::Notify(format!("pushbullet returned HTTP {status}: {detail}")));
        }
        tracing::debug!(title, "push delivered");
        Ok(())
    }
}
