//! Draft text generation
//!
//! [`HttpGenerator`] talks to any OpenAI-compatible chat completions
//! endpoint (OpenAI, vLLM, Ollama, ...). [`PromptRotation`] varies the prompt
//! between attempts so a rejected draft is not simply regenerated.

use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::{header, Client};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GenerationConfig;
use crate::error::{GenerationError, Result};

/// Source of draft text
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce a draft for `prompt`
    ///
    /// # Errors
    ///
    /// `GenerationError::Empty` when the upstream returned only whitespace.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageResponse,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Option<String>,
}

pub struct HttpGenerator {
    client: Client,
    endpoint: String,
    model: String,
    system_prompt: Option<String>,
    api_key: Option<SecretString>,
}

impl HttpGenerator {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        system_prompt: Option<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Request(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            system_prompt,
            api_key,
        })
    }

    /// Build from config, reading the API key from `api_key_env`.
    ///
    /// A missing variable means no `Authorization` header, which local
    /// servers such as Ollama accept.
    pub fn from_config(config: &GenerationConfig, timeout: Duration) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from);
        if api_key.is_none() {
            debug!("{} not set; sending generation requests without a key", config.api_key_env);
        }
        Self::new(
            config.endpoint.clone(),
            config.model.clone(),
            config.system_prompt.clone(),
            api_key,
            timeout,
        )
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let mut request = self.client.post(&self.endpoint).json(&ChatRequest {
            model: &self.model,
            messages,
        });
        if let Some(key) = &self.api_key {
            request = request.header(
                header::AUTHORIZATION,
                format!("Bearer {}", key.expose_secret()),
            );
        }

        let response = request
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| GenerationError::Malformed(e.to_string()))?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(GenerationError::Empty.into());
        }
        Ok(text)
    }
}

/// Picks a prompt per attempt and tags it with a fresh variation number
#[derive(Debug, Clone)]
pub struct PromptRotation {
    prompts: Vec<String>,
    next_variation: u32,
}

impl PromptRotation {
    /// Blank prompts are dropped. The starting variation is drawn from `rng`.
    pub fn new<R: Rng + ?Sized>(prompts: &[String], rng: &mut R) -> Self {
        Self {
            prompts: prompts
                .iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            next_variation: rng.gen_range(1..10_000),
        }
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// Next prompt; consecutive calls never return the same text
    pub fn next_prompt<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<String> {
        let base = self.prompts.choose(rng)?;
        let variation = self.next_variation;
        self.next_variation = self.next_variation.wrapping_add(1);
        Some(format!("{} (variation {})", base, variation))
    }
}
