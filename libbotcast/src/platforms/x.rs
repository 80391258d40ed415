//! X (Twitter) API v2 client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PlatformError, Result};
use crate::platforms::{Platform, SubmitResult};

/// Free-tier post limit
pub const DEFAULT_CHARACTER_LIMIT: usize = 280;

#[derive(Debug, Serialize)]
struct CreateTweet<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<ReplySettings<'a>>,
}

#[derive(Debug, Serialize)]
struct ReplySettings<'a> {
    in_reply_to_tweet_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateTweetResponse {
    data: CreatedTweet,
}

#[derive(Debug, Deserialize)]
struct CreatedTweet {
    id: String,
}

pub struct XPlatform {
    client: Client,
    api_base: String,
    character_limit: usize,
}

impl XPlatform {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PlatformError::Network(e.to_string()))?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            character_limit: DEFAULT_CHARACTER_LIMIT,
        })
    }

    /// Override the limit, e.g. for accounts with long-post access
    pub fn with_character_limit(mut self, limit: usize) -> Self {
        self.character_limit = limit;
        self
    }

    fn tweets_url(&self) -> String {
        format!("{}/tweets", self.api_base)
    }
}

#[async_trait]
impl Platform for XPlatform {
    async fn submit(
        &self,
        access_token: &str,
        text: &str,
        reply_to: Option<&str>,
    ) -> SubmitResult {
        let body = CreateTweet {
            text,
            reply: reply_to.map(|id| ReplySettings {
                in_reply_to_tweet_id: id,
            }),
        };

        let response = self
            .client
            .post(self.tweets_url())
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        if status != 200 && status != 201 {
            return Err(PlatformError::from_status(status, body));
        }

        let created: CreateTweetResponse =
            serde_json::from_str(&body).map_err(|e| PlatformError::Malformed(e.to_string()))?;
        debug!("Created post {}", created.data.id);
        Ok(created.data.id)
    }

    fn name(&self) -> &str {
        "x"
    }

    fn character_limit(&self) -> Option<usize> {
        Some(self.character_limit)
    }
}
