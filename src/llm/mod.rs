//! Planner adapters.
//!
//! The `LlmProvider` trait is the single seam between the orchestration
//! loop and a language model. Each provider has its own request/response
//! format, but they all implement the same trait so the loop never branches
//! on provider.
//!
//! The model is treated as an untrusted planner: adapters only translate
//! shapes. Tool arguments stay raw text until the dispatcher validates them.

pub mod anthropic;
pub mod openai_compatible;

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::AppConfig;
use crate::types::{ChatRequest, ChatResponse};
use anthropic::AnthropicProvider;
use openai_compatible::OpenAiCompatibleProvider;

/// Trait that all planner providers must implement.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request and wait for the full response.
    ///
    /// Transport failures, non-2xx statuses and undecodable bodies are
    /// errors; the loop surfaces them to the request boundary.
    async fn chat_completion(&self, request: &ChatRequest) -> Result<ChatResponse>;

    /// The provider's display name (for logging).
    fn name(&self) -> &str;
}

/// Create the planner provider selected in the config.
pub fn create_provider(config: &AppConfig, client: reqwest::Client) -> Result<Arc<dyn LlmProvider>> {
    let api_key = config.api_key()?;
    let api_base = config.llm.api_base.clone();

    match config.llm.provider.as_str() {
        "anthropic" => Ok(Arc::new(AnthropicProvider::new(api_key, api_base, client))),
        "openai_compatible" | "openai" => {
            Ok(Arc::new(OpenAiCompatibleProvider::new(api_key, api_base, client)))
        }
        other => {
            bail!(
                "Unknown provider: '{}'. Supported: 'anthropic', 'openai_compatible'",
                other
            )
        }
    }
}
