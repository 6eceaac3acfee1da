use crate::adapters::LLMAdapter;
use crate::providers::base::{
    local_model_instance, ModelInfo, Provider, ProviderConfig, ResolutionContext, SamplingDefaults,
};
use anyhow::Result;

pub struct DeepseekLocalProvider;

const CONFIG: ProviderConfig = ProviderConfig {
    base_url_key: "DEEPSEEK_LOCAL_API_BASE_URL",
    default_base_url: None,
    api_token_key: None,
};

const MODELS: &[ModelInfo] = &[ModelInfo {
    name: "deepseek-coder-6.7b-instruct",
    label: "DeepSeek Coder 6.7B (Local)",
    provider: "DeepseekLocal",
    max_token_allowed: 8192,
}];

impl Provider for DeepseekLocalProvider {
    fn name(&self) -> &'static str {
        "DeepseekLocal"
    }

    fn config(&self) -> &ProviderConfig {
        &CONFIG
    }

    fn static_models(&self) -> &[ModelInfo] {
        MODELS
    }

    // Lower temperature suits code generation.
    fn sampling_defaults(&self) -> SamplingDefaults {
        SamplingDefaults {
            temperature: 0.2,
            top_p: 0.95,
            max_tokens: 1024,
        }
    }

    fn get_model_instance(
        &self,
        model: &str,
        context: &ResolutionContext,
    ) -> Result<Box<dyn LLMAdapter>> {
        local_model_instance(self, model, context)
    }
}
