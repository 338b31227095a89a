use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

const PUSH_URL: &str = "http://www.pushplus.plus/send";
const TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from the PushPlus transport.
#[derive(Debug, Error)]
pub enum PushError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("push rejected (code {code}): {message}")]
    Rejected { code: i64, message: String },
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
}

/// PushPlus WeChat notification transport.
///
/// Fire-and-forget: a failed send means the alert is undelivered, nothing
/// more. Success is response body `code == 200`.
pub struct PushPlusClient {
    token: String,
    endpoint: String,
    http: Client,
}

impl PushPlusClient {
    pub fn new(token: String) -> Self {
        Self::with_endpoint(token, PUSH_URL.to_string())
    }

    pub fn with_endpoint(token: String, endpoint: String) -> Self {
        Self {
            token,
            endpoint,
            http: Client::new(),
        }
    }

    /// Send one HTML notification.
    pub async fn send(&self, title: &str, html_body: &str) -> Result<(), PushError> {
        let payload = serde_json::json!({
            "token": self.token,
            "title": title,
            "content": html_body,
            "template": "html",
        });

        let resp = self
            .http
            .post(&self.endpoint)
            .timeout(TIMEOUT)
            .json(&payload)
            .send()
            .await?;
        let body: PushResponse = resp.json().await?;

        if body.code == 200 {
            tracing::info!(title = %title, "push delivered");
            Ok(())
        } else {
            Err(PushError::Rejected {
                code: body.code,
                message: body.msg,
            })
        }
    }
}
