use crate::adapters::{LLMAdapter, ModelConfig, OpenAIAdapter};
use crate::providers::ProviderError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// Credential sent to local inference servers, which do not check it.
pub const LOCAL_API_KEY: &str = "not-needed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub name: &'static str,
    pub label: &'static str,
    pub provider: &'static str,
    pub max_token_allowed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProviderConfig {
    /// Settings/environment key holding the base URL.
    pub base_url_key: &'static str,
    pub default_base_url: Option<&'static str>,
    pub api_token_key: Option<&'static str>,
}

/// Generation parameters a provider's server is tuned for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplingDefaults {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: usize,
}

impl Default for SamplingDefaults {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_p: 0.95,
            max_tokens: 1024,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSetting {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

/// Everything the host knows when it asks for a model instance.
#[derive(Debug, Clone, Default)]
pub struct ResolutionContext {
    pub api_keys: HashMap<String, String>,
    pub provider_settings: HashMap<String, ProviderSetting>,
    pub server_env: HashMap<String, String>,
}

impl ResolutionContext {
    fn setting(&self, provider: &str) -> Option<&ProviderSetting> {
        self.provider_settings.get(provider)
    }

    fn env(&self, key: &str) -> Option<&str> {
        self.server_env.get(key).map(String::as_str)
    }
}

#[cfg(test)]
impl ResolutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.server_env.insert(key.into(), value.into());
        self
    }

    pub fn with_setting(mut self, provider: impl Into<String>, setting: ProviderSetting) -> Self {
        self.provider_settings.insert(provider.into(), setting);
        self
    }

    pub fn with_api_key(mut self, provider: impl Into<String>, key: impl Into<String>) -> Self {
        self.api_keys.insert(provider.into(), key.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseUrlSource {
    Settings,
    Environment,
    Default,
}

impl fmt::Display for BaseUrlSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaseUrlSource::Settings => write!(f, "provider settings"),
            BaseUrlSource::Environment => write!(f, "environment"),
            BaseUrlSource::Default => write!(f, "built-in default"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedEndpoint {
    pub base_url: Option<String>,
    pub source: Option<BaseUrlSource>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    fn api_key_link(&self) -> Option<&'static str> {
        None
    }

    fn config(&self) -> &ProviderConfig;
    fn static_models(&self) -> &[ModelInfo];

    fn sampling_defaults(&self) -> SamplingDefaults {
        SamplingDefaults::default()
    }

    fn get_model_instance(
        &self,
        model: &str,
        context: &ResolutionContext,
    ) -> Result<Box<dyn LLMAdapter>>;

    fn find_model(&self, model: &str) -> Option<&ModelInfo> {
        self.static_models().iter().find(|info| info.name == model)
    }

    /// Base URL precedence: provider settings, then the environment key named
    /// by the config, then the config default.
    fn resolve(&self, context: &ResolutionContext) -> ResolvedEndpoint {
        let config = self.config();
        let setting = context.setting(self.name());

        let (base_url, source) = if let Some(url) =
            setting.and_then(|s| non_blank(s.base_url.as_deref()))
        {
            (Some(url), Some(BaseUrlSource::Settings))
        } else if let Some(url) = non_blank(context.env(config.base_url_key)) {
            (Some(url), Some(BaseUrlSource::Environment))
        } else if let Some(url) = non_blank(config.default_base_url) {
            (Some(url), Some(BaseUrlSource::Default))
        } else {
            (None, None)
        };

        let api_key = non_blank(context.api_keys.get(self.name()).map(String::as_str))
            .or_else(|| non_blank(setting.and_then(|s| s.api_key.as_deref())))
            .or_else(|| config.api_token_key.and_then(|key| non_blank(context.env(key))));

        ResolvedEndpoint {
            base_url: base_url.map(strip_trailing_slash),
            source,
            api_key,
        }
    }
}

/// Surrounding whitespace is dropped; a value that is only whitespace is absent.
fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn strip_trailing_slash(mut url: String) -> String {
    if url.ends_with('/') {
        url.pop();
    }
    url
}

/// Builds a handle for a provider backed by a local, unauthenticated
/// OpenAI-compatible server.
pub fn local_model_instance(
    provider: &dyn Provider,
    model: &str,
    context: &ResolutionContext,
) -> Result<Box<dyn LLMAdapter>> {
    let resolved = provider.resolve(context);
    let base_url = resolved
        .base_url
        .ok_or_else(|| ProviderError::MissingBaseUrl {
            provider: provider.name().to_string(),
        })?;

    if resolved.api_key.is_some() {
        debug!(
            "{} ignores the supplied API key; using placeholder credential",
            provider.name()
        );
    }

    let model_info = provider.find_model(model);
    if model_info.is_none() {
        warn!(
            "Model {} is not listed for {}; passing it through to the server",
            model,
            provider.name()
        );
    }

    if let Some(source) = resolved.source {
        debug!("{} base URL {} from {}", provider.name(), base_url, source);
    }

    let defaults = provider.sampling_defaults();
    let config = ModelConfig {
        model_name: model.to_string(),
        temperature: defaults.temperature,
        top_p: defaults.top_p,
        max_tokens: defaults.max_tokens,
        max_token_allowed: model_info.map(|info| info.max_token_allowed),
    };

    let adapter = OpenAIAdapter::new(config, base_url, LOCAL_API_KEY.to_string())?;
    Ok(Box::new(adapter))
}
