use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_name: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: usize,
    /// Context-length bound of the model, when the provider knows it.
    pub max_token_allowed: Option<usize>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_name: String::new(),
            temperature: 0.2,
            top_p: 0.95,
            max_tokens: 1024,
            max_token_allowed: None,
        }
    }
}

impl ModelConfig {
    /// Caps a requested completion length at the model's context bound.
    pub fn clamp_max_tokens(&self, requested: usize) -> usize {
        match self.max_token_allowed {
            Some(limit) => requested.min(limit),
            None => requested,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LLMRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub model: String,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// Report from a local inference server's health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub model: Option<String>,
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok")
    }
}

/// A callable model handle bound to one inference endpoint.
#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn complete(&self, request: LLMRequest) -> Result<LLMResponse>;
    async fn health(&self) -> Result<HealthStatus>;
    fn model_name(&self) -> &str;
    fn base_url(&self) -> &str;
}
