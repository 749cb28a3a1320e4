//! Forwarding to the local-agent hook.
//!
//! The hook is the external collaborator that receives accepted knocks and
//! delivered messages. Forwarding is fire-and-forget relative to the HTTP
//! response: the sender's contract is "received", not "processed", so a
//! hook failure is logged and absorbed, never retried here and never turned
//! into a failure response.

use porter_types::HookNotification;
use std::time::Duration;

/// HTTP client for the local hook endpoint.
#[derive(Clone)]
pub struct HookClient {
    client: reqwest::Client,
    url: Option<String>,
    token: Option<String>,
}

impl HookClient {
    /// Builds a client with a bounded per-request timeout. A `None` url
    /// disables forwarding entirely.
    pub fn new(
        url: Option<String>,
        token: Option<String>,
        timeout_seconds: u64,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;
        Ok(Self { client, url, token })
    }

    /// Whether a hook URL is configured.
    pub fn enabled(&self) -> bool {
        self.url.is_some()
    }

    /// Spawns the forward and returns immediately.
    pub fn forward(&self, notification: HookNotification) {
        let Some(url) = self.url.clone() else {
            tracing::debug!(kind = %notification.kind, "no hook configured, dropping notification");
            return;
        };
        let client = self.client.clone();
        let token = self.token.clone();

        tokio::spawn(async move {
            let mut req = client.post(&url).json(&notification);
            if let Some(token) = &token {
                req = req.bearer_auth(token);
            }
            match req.send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::debug!(kind = %notification.kind, "hook notified");
                }
                Ok(resp) => {
                    tracing::warn!(
                        kind = %notification.kind,
                        status = %resp.status(),
                        "hook rejected notification"
                    );
                }
                Err(e) => {
                    tracing::warn!(kind = %notification.kind, "hook forward failed: {}", e);
                }
            }
        });
    }
}
