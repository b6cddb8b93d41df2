use async_trait::async_trait;
use bookfinder_common::{BookFinderError, Result};
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::llm_trait::LlmClient;
use crate::types::{EmbedRequest, EmbedResponse, GenerateRequest, GenerateResponse, TagsResponse};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Ollama API client
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    client: Client,
    max_retries: u32,
}

impl OllamaClient {
    /// Create new Ollama client
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Create new Ollama client with a custom request timeout
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BookFinderError::llm(format!("Failed to create HTTP client: {}", e)))?;

        info!("Ollama client initialized: {}", base_url);
        Ok(Self {
            base_url,
            client,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// Builder: attempts per request (at least 1)
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run an operation with exponential backoff between attempts
    async fn with_retry<T, F, Fut>(&self, label: &str, mut attempt_fn: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            match attempt_fn().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if attempt < self.max_retries {
                        let delay = Duration::from_secs(2u64.pow(attempt - 1));
                        warn!(
                            "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                            label, attempt, self.max_retries, e, delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| BookFinderError::llm(format!("{}: all retries failed", label))))
    }

    /// Generate text with Ollama (with retry logic)
    pub async fn generate(&self, request: GenerateRequest) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        debug!(
            "Sending generate request to Ollama - Model: {}, Prompt length: {}",
            request.model,
            request.prompt.len()
        );

        let response = self
            .with_retry("Ollama generate", || self.try_generate(&url, &request))
            .await?;

        debug!("Received response from Ollama - Length: {}", response.len());
        Ok(response)
    }

    /// Single attempt to generate text
    async fn try_generate(&self, url: &str, request: &GenerateRequest) -> Result<String> {
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| BookFinderError::network(format!("Failed to send request: {}", e)))?
            .error_for_status()
            .map_err(|e| BookFinderError::llm(format!("Ollama API error: {}", e)))?;

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| BookFinderError::llm(format!("Failed to parse response: {}", e)))?;

        if result.response.is_empty() {
            return Err(BookFinderError::llm("Empty response from Ollama"));
        }

        Ok(result.response)
    }

    /// Generate embedding for text (with retry logic)
    pub async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);

        debug!("Generating embedding - Model: {}, Text length: {}", model, text.len());

        let request = EmbedRequest {
            model: model.to_string(),
            prompt: text.to_string(),
        };

        let embedding = self
            .with_retry("Ollama embedding", || self.try_embed(&url, &request))
            .await?;

        debug!("Received embedding - Dimension: {}", embedding.len());
        Ok(embedding)
    }

    /// Single attempt to generate embedding
    async fn try_embed(&self, url: &str, request: &EmbedRequest) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| BookFinderError::network(format!("Failed to send embedding request: {}", e)))?
            .error_for_status()
            .map_err(|e| BookFinderError::llm(format!("Ollama embedding API error: {}", e)))?;

        let result: EmbedResponse = response
            .json()
            .await
            .map_err(|e| BookFinderError::llm(format!("Failed to parse embedding response: {}", e)))?;

        if result.embedding.is_empty() {
            return Err(BookFinderError::llm("Empty embedding from Ollama"));
        }

        Ok(result.embedding)
    }

    /// Installed model names
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let tags: TagsResponse = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BookFinderError::network(format!("Failed to connect to Ollama: {}", e)))?
            .error_for_status()
            .map_err(|e| BookFinderError::llm(format!("Ollama API error: {}", e)))?
            .json()
            .await
            .map_err(|e| BookFinderError::llm(format!("Failed to parse model list: {}", e)))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Test connection to Ollama
    pub async fn test_connection(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BookFinderError::network(format!("Failed to connect to Ollama: {}", e)))?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(&self, request: GenerateRequest) -> Result<String> {
        OllamaClient::generate(self, request).await
    }

    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        OllamaClient::embed(self, model, text).await
    }

    async fn test_connection(&self) -> Result<bool> {
        OllamaClient::test_connection(self).await
    }
}
