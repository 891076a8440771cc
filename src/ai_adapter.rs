//! AI adapter: completion provider abstraction for reply synthesis.
//! Any failure (missing key, transport error, non-OK status, empty content,
//! timeout) is a first-class `None` outcome — the caller routes it to the
//! fallback tier system, never to the user as an error.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::prompt::{ChatTurn, Role};

/// Result returned by completion providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

/// What the engine hands a provider for one synthesis call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub turns: Vec<ChatTurn>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Trait object used by the engine and tests.
pub trait CompletionClient: Send + Sync {
    fn complete<'a>(
        &'a self,
        req: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Option<Completion>> + Send + 'a>>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

/// Convenient alias used by callers.
pub type DynCompletionClient = Arc<dyn CompletionClient>;

/// Factory: real OpenAI client when a key is configured, disabled otherwise.
pub fn build_completion_client(model: &str) -> DynCompletionClient {
    let api_key = std::env::var(crate::config::ENV_OPENAI_API_KEY).unwrap_or_default();
    if api_key.is_empty() {
        return Arc::new(DisabledClient);
    }
    Arc::new(OpenAiClient::new(model, api_key))
}

/// OpenAI provider (Chat Completions API).
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(model: &str, api_key: String) -> Self {
        // Timeout expiry is treated exactly like a failed call.
        let http = reqwest::Client::builder()
            .user_agent("amora-reply-engine/0.1 (+github.com/amora-app/amora-reply-engine)")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            model: model.to_string(),
        }
    }

    async fn complete_impl(&self, req: &CompletionRequest) -> Option<Completion> {
        if self.api_key.is_empty() {
            return None;
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
            #[serde(default)]
            usage: Option<Usage>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }
        #[derive(Deserialize)]
        struct Usage {
            prompt_tokens: u32,
            completion_tokens: u32,
        }

        let mut messages = Vec::with_capacity(req.turns.len() + 1);
        messages.push(Msg {
            role: "system",
            content: &req.system,
        });
        for t in &req.turns {
            messages.push(Msg {
                role: match t.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: &t.content,
            });
        }

        let body = Req {
            model: &self.model,
            messages,
            temperature: req.temperature,
            max_tokens: req.max_tokens,
        };

        let resp = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .ok()?;

        if !resp.status().is_success() {
            tracing::warn!(status = %resp.status(), "completion call failed");
            return None;
        }
        let parsed: Resp = resp.json().await.ok()?;
        let text = parsed
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();
        if text.is_empty() {
            return None;
        }
        Some(Completion {
            text,
            prompt_tokens: parsed.usage.as_ref().map(|u| u.prompt_tokens),
            completion_tokens: parsed.usage.as_ref().map(|u| u.completion_tokens),
        })
    }
}

impl CompletionClient for OpenAiClient {
    fn complete<'a>(
        &'a self,
        req: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Option<Completion>> + Send + 'a>> {
        Box::pin(self.complete_impl(req))
    }
    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

/// Returns `None` always; used when no API key is configured.
pub struct DisabledClient;

impl CompletionClient for DisabledClient {
    fn complete<'a>(
        &'a self,
        _req: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Option<Completion>> + Send + 'a>> {
        Box::pin(async { None })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Deterministic client for tests and local runs.
#[derive(Clone)]
pub struct MockClient {
    pub fixed: Option<Completion>,
}

impl MockClient {
    pub fn replying(text: &str) -> Self {
        Self {
            fixed: Some(Completion {
                text: text.to_string(),
                prompt_tokens: Some(42),
                completion_tokens: Some(7),
            }),
        }
    }

    /// Simulates an upstream failure (e.g. HTTP 500) on every call.
    pub fn failing() -> Self {
        Self { fixed: None }
    }
}

impl CompletionClient for MockClient {
    fn complete<'a>(
        &'a self,
        _req: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Option<Completion>> + Send + 'a>> {
        let out = self.fixed.clone();
        Box::pin(async move { out })
    }
    fn provider_name(&self) -> &'static str {
        "mock"
    }
}
