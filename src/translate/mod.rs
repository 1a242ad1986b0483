//! Translation capability behind a trait so the relay (and its tests)
//! never care which provider sits on the other side.

use crate::config::TranslationConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Value, json};

#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` between two provider language codes.
    async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String>;
}

/// Google Cloud Translation v3 over REST.
pub struct GoogleTranslator {
    client: reqwest::Client,
    endpoint: String,
    project_id: String,
    access_token: String,
}

impl GoogleTranslator {
    pub fn new(config: &TranslationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .with_context(|| "Failed to build translation HTTP client")?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: &TranslationConfig) -> Self {
        Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            access_token: config.access_token.clone(),
        }
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(&self, text: &str, from: &str, to: &str) -> Result<String> {
        let url = format!(
            "{}/v3/projects/{}/locations/global:translateText",
            self.endpoint, self.project_id
        );
        let payload = json!({
            "contents": [text],
            "mimeType": "text/plain",
            "sourceLanguageCode": from,
            "targetLanguageCode": to,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await
            .with_context(|| "translation request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("translation provider returned {}", response.status());
        }

        let body: Value = response
            .json()
            .await
            .with_context(|| "translation response was not JSON")?;
        body.get("translations")
            .and_then(Value::as_array)
            .and_then(|t| t.first())
            .and_then(|t| t.get("translatedText"))
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .with_context(|| "translation response missing translatedText")
    }
}
