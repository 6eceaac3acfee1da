use crate::providers::base::{ModelInfo, Provider};
use crate::providers::{CodeLlamaLocalProvider, DeepseekLocalProvider, ProviderError};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::sync::Arc;

static BUILTIN: Lazy<ProviderRegistry> = Lazy::new(ProviderRegistry::builtin);

/// Lookup table of providers keyed by name.
pub struct ProviderRegistry {
    providers: BTreeMap<&'static str, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: BTreeMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CodeLlamaLocalProvider));
        registry.register(Arc::new(DeepseekLocalProvider));
        registry
    }

    /// Process-wide registry of the built-in providers.
    pub fn global() -> &'static ProviderRegistry {
        &BUILTIN
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.name(), provider);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Provider>, ProviderError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider(name.to_string()))
    }

    pub fn providers(&self) -> impl Iterator<Item = &Arc<dyn Provider>> {
        self.providers.values()
    }

    /// Provider whose static list contains `model`.
    pub fn find_model(&self, model: &str) -> Option<(Arc<dyn Provider>, &ModelInfo)> {
        self.providers.values().find_map(|provider| {
            provider
                .static_models()
                .iter()
                .find(|info| info.name == model)
                .map(|info| (Arc::clone(provider), info))
        })
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::LLMRequest;
    use crate::providers::base::{ProviderSetting, ResolutionContext};

    #[test]
    fn builtin_registers_local_providers() {
        let registry = ProviderRegistry::builtin();
        let names: Vec<&str> = registry.providers().map(|p| p.name()).collect();
        assert_eq!(names, vec!["CodeLlamaLocal", "DeepseekLocal"]);
        assert!(registry.get("CodeLlamaLocal").is_ok());
    }

    #[test]
    fn unknown_provider_is_reported() {
        let err = ProviderRegistry::global().get("Nope").err().unwrap();
        assert_eq!(err, ProviderError::UnknownProvider("Nope".to_string()));
    }

    #[test]
    fn find_model_returns_owner() {
        let registry = ProviderRegistry::builtin();
        let (provider, info) = registry.find_model("deepseek-coder-6.7b-instruct").unwrap();
        assert_eq!(provider.name(), "DeepseekLocal");
        assert_eq!(info.max_token_allowed, 8192);
        assert!(registry.find_model("gpt-4o").is_none());
    }

    #[test]
    fn model_lists_name_their_owner() {
        for provider in ProviderRegistry::global().providers() {
            for model in provider.static_models() {
                assert_eq!(model.provider, provider.name());
            }
        }
    }

    #[test]
    fn every_provider_prefers_settings_then_environment() {
        for provider in ProviderRegistry::global().providers() {
            let key = provider.config().base_url_key;
            let model = provider.static_models()[0].name;

            let env_only = ResolutionContext::new().with_env(key, "http://env:1");
            let handle = provider.get_model_instance(model, &env_only).unwrap();
            assert_eq!(handle.base_url(), "http://env:1");

            let both = env_only.with_setting(
                provider.name(),
                ProviderSetting {
                    base_url: Some("http://settings:2".to_string()),
                    api_key: None,
                },
            );
            let handle = provider.get_model_instance(model, &both).unwrap();
            assert_eq!(handle.base_url(), "http://settings:2");
        }
    }

    #[test]
    fn every_provider_fails_without_base_url() {
        for provider in ProviderRegistry::global().providers() {
            let model = provider.static_models()[0].name;
            let err = provider
                .get_model_instance(model, &ResolutionContext::new())
                .err()
                .unwrap();
            assert!(err.to_string().contains(provider.name()));
        }
    }

    #[tokio::test]
    async fn every_provider_sends_placeholder_credential() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer not-needed")
            .with_status(200)
            .with_body(r#"{"model":"local","choices":[{"message":{"role":"assistant","content":"ok"}}]}"#)
            .expect(2)
            .create_async()
            .await;

        for provider in ProviderRegistry::global().providers() {
            let context = ResolutionContext::new()
                .with_api_key(provider.name(), "sk-real-key")
                .with_setting(
                    provider.name(),
                    ProviderSetting {
                        base_url: Some(format!("{}/v1", server.url())),
                        api_key: Some("sk-settings-key".to_string()),
                    },
                );
            let model = provider.static_models()[0].name;
            let handle = provider.get_model_instance(model, &context).unwrap();

            let response = handle
                .complete(LLMRequest {
                    user_prompt: "ping".to_string(),
                    ..LLMRequest::default()
                })
                .await
                .unwrap();
            assert_eq!(response.content, "ok");
        }

        mock.assert_async().await;
    }
}
