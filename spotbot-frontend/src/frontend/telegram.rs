use crate::config::TelegramConfig;
use crate::utils::{MessageSink, SinkError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize, Debug)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_thread_id: Option<i64>,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Deserialize, Debug, Default)]
struct ApiResponse {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Deserialize, Debug, Default)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Bot API `sendMessage` to one fixed chat / topic in HTML parse mode
pub struct TelegramSink {
    client: reqwest::Client,
    endpoint: String,
    target: String,
    chat_id: i64,
    topic_id: Option<i64>,
    disable_web_page_preview: bool,
}

impl TelegramSink {
    pub fn new(config: &TelegramConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.send_message_url(),
            target: config.target(),
            chat_id: config.chat_id,
            topic_id: config.topic_id,
            disable_web_page_preview: config.disable_web_page_preview,
        })
    }
}

/// Map a non-2xx Bot API answer onto the delivery taxonomy
fn classify_failure(status: u16, body: &str) -> SinkError {
    let response: ApiResponse = serde_json::from_str(body).unwrap_or_default();
    let description = response
        .description
        .unwrap_or_else(|| format!("HTTP {}", status));

    match status {
        429 => match response.parameters.and_then(|p| p.retry_after) {
            Some(secs) => SinkError::RateLimited(Duration::from_secs(secs)),
            None => SinkError::Server { status, description },
        },
        400 if description.to_lowercase().contains("can't parse entities") => {
            SinkError::BadMarkup(description)
        }
        400..=499 => SinkError::Rejected { status, description },
        500..=599 => SinkError::Server { status, description },
        _ => SinkError::Unexpected(description),
    }
}

#[async_trait]
impl MessageSink for TelegramSink {
    fn target(&self) -> String {
        self.target.clone()
    }

    async fn send(&self, text: &str) -> Result<(), SinkError> {
        let request = SendMessageRequest {
            chat_id: self.chat_id,
            message_thread_id: self.topic_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: self.disable_web_page_preview,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(SinkError::from_transport)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.map_err(SinkError::from_transport)?;
        tracing::debug!("Telegram answered {}: {}", status, body);
        Err(classify_failure(status.as_u16(), &body))
    }
}
