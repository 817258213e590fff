//! Answer generation over retrieved context.
//!
//! Prompt assembly is deterministic and local; only the final completion
//! call crosses the network. The system prompt pins the model to the
//! supplied context so it declines rather than guesses when the corpus
//! has no answer.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::ChatConfig;
use crate::retrieve::QueryContext;

/// Grounding instructions sent with every question.
pub const SYSTEM_PROMPT: &str = "\
You are a document assistant. Answer the user's question using ONLY the \
context blocks provided. Each block is labeled with its source file and \
chunk number. Rules:
1. If the context does not contain the answer, reply exactly: Data not found!
2. Never use outside knowledge or make assumptions beyond the context.
3. When you answer, mention which file the information came from.
4. Keep answers concise and factual.";

/// Build the user message for a question and its assembled context.
///
/// When retrieval came back empty the prompt says so explicitly instead
/// of sending an empty context section, which models tend to fill with
/// guesses.
pub fn build_prompt(context: &QueryContext, context_block: &str) -> String {
    if context_block.trim().is_empty() {
        return format!(
            "No context was found in the document index for this question.\n\nQuestion: {}",
            context.question
        );
    }
    format!(
        "Context:\n\n{}\n\nQuestion: {}",
        context_block, context.question
    )
}

/// Chat completion backend.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

pub fn create_chat_provider(config: &ChatConfig) -> Result<Box<dyn ChatProvider>> {
    match config.provider.as_str() {
        "ollama" => Ok(Box::new(OllamaChat::new(config)?)),
        other => bail!("Unknown chat provider: {}", other),
    }
}

/// Retrieve-then-answer in one call: assembles the prompt from an already
/// retrieved context and asks the chat model.
pub async fn answer(
    provider: &dyn ChatProvider,
    context: &QueryContext,
    context_block: &str,
) -> Result<String> {
    let user = build_prompt(context, context_block);
    provider.complete(SYSTEM_PROMPT, &user).await
}

/// Ollama `/api/chat` client, non-streaming.
pub struct OllamaChat {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaChat {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl ChatProvider for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "stream": false,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Chat request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Chat request failed with status {}: {}", status, text);
        }

        let json: serde_json::Value = response
            .json()
            .await
            .context("Failed to parse chat response")?;

        json.get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.trim().to_string())
            .context("Chat response missing message content")
    }
}
