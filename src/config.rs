use crate::core::env_file;
use crate::providers::{ProviderRegistry, ProviderSetting, ResolutionContext};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Provider named by the config file or `--provider`.
    pub provider: Option<String>,

    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    pub system_prompt: Option<String>,

    #[serde(default)]
    pub api_keys: HashMap<String, String>,

    #[serde(default)]
    pub provider_settings: HashMap<String, ProviderSetting>,

    /// Dotenv-style file merged beneath the process environment.
    pub env_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: None,
            model: None,
            temperature: None,
            max_tokens: None,
            system_prompt: None,
            api_keys: HashMap::new(),
            provider_settings: HashMap::new(),
            env_file: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Try to load from .local-llm.yml in current directory
        for name in [".local-llm.yml", ".local-llm.yaml"] {
            let config_path = PathBuf::from(name);
            if config_path.exists() {
                return Self::load_from_path(&config_path);
            }
        }

        if let Some(home_dir) = dirs::home_dir() {
            let home_config = home_dir.join(".local-llm.yml");
            if home_config.exists() {
                return Self::load_from_path(&home_config);
            }
        }

        Ok(Config::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        debug!("Loading config from {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        Ok(config)
    }

    pub fn merge_with_cli(
        &mut self,
        cli_provider: Option<String>,
        cli_model: Option<String>,
        cli_prompt: Option<String>,
    ) {
        if let Some(provider) = cli_provider {
            self.provider = Some(provider);
        }
        if let Some(model) = cli_model {
            self.model = Some(model);
        }
        if let Some(prompt) = cli_prompt {
            self.system_prompt = Some(prompt);
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.as_deref().unwrap_or(DEFAULT_PROVIDER)
    }

    /// A listed model implies its provider when no provider was named.
    pub fn infer_provider(&mut self, registry: &ProviderRegistry) {
        if self.provider.is_some() {
            return;
        }
        if let Some((provider, _)) = self.model.as_deref().and_then(|m| registry.find_model(m)) {
            debug!("Using provider {} for the configured model", provider.name());
            self.provider = Some(provider.name().to_string());
        }
    }

    /// Builds the context handed to providers: env file values overlaid by
    /// the process environment.
    pub fn resolution_context(&self) -> Result<ResolutionContext> {
        let process_env: HashMap<String, String> = std::env::vars().collect();
        self.resolution_context_with(process_env)
    }

    fn resolution_context_with(
        &self,
        process_env: HashMap<String, String>,
    ) -> Result<ResolutionContext> {
        let mut server_env = match &self.env_file {
            Some(path) => env_file::load_env_file(path)?,
            None => HashMap::new(),
        };
        server_env.extend(process_env);

        Ok(ResolutionContext {
            api_keys: self.api_keys.clone(),
            provider_settings: self.provider_settings.clone(),
            server_env,
        })
    }
}

const DEFAULT_PROVIDER: &str = "DeepseekLocal";
