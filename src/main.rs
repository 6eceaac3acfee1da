mod adapters;
mod config;
mod core;
mod providers;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::providers::{Provider, ProviderRegistry};

#[derive(Parser)]
#[command(name = "local-llm")]
#[command(about = "Talk to locally hosted CodeLlama and DeepSeek servers through one provider interface", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Provider name (e.g. DeepseekLocal)")]
    provider: Option<String>,

    #[arg(long, global = true)]
    model: Option<String>,

    #[arg(long, global = true, help = "System prompt")]
    prompt: Option<String>,

    #[arg(long, global = true)]
    temperature: Option<f32>,

    #[arg(long, global = true)]
    max_tokens: Option<usize>,

    #[arg(long, global = true, help = "Config file (defaults to .local-llm.yml)")]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Env file merged beneath the process environment")]
    env_file: Option<PathBuf>,

    #[arg(long, global = true, default_value = "text")]
    output_format: OutputFormat,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "List providers and their models")]
    Providers,
    #[command(about = "Show which base URL a provider resolves to")]
    Resolve,
    #[command(about = "Send a prompt to a local model")]
    Chat {
        #[arg(help = "Prompt text (reads from stdin if not provided)")]
        message: Option<String>,
    },
    #[command(about = "Probe the local server's health endpoint")]
    Health,
    #[command(about = "Write base URL variables for every provider")]
    Env {
        #[arg(long, default_value = core::env_file::DEFAULT_LOCAL_BASE_URL)]
        base_url: String,

        #[arg(short, long, help = "Output file path (prints to stdout if not provided)")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => config::Config::load_from_path(path)?,
        None => config::Config::load().unwrap_or_else(|e| {
            warn!("Ignoring unreadable config: {:#}", e);
            config::Config::default()
        }),
    };
    config.merge_with_cli(cli.provider.clone(), cli.model.clone(), cli.prompt.clone());

    if let Some(temp) = cli.temperature {
        config.temperature = Some(temp);
    }
    if let Some(tokens) = cli.max_tokens {
        config.max_tokens = Some(tokens);
    }
    if let Some(path) = cli.env_file.clone() {
        config.env_file = Some(path);
    }

    let registry = ProviderRegistry::global();

    config.infer_provider(registry);

    match cli.command {
        Commands::Providers => providers_command(registry, cli.output_format)?,
        Commands::Resolve => resolve_command(&config, registry, cli.output_format)?,
        Commands::Chat { message } => {
            chat_command(&config, registry, message, cli.output_format).await?
        }
        Commands::Health => health_command(&config, registry, cli.output_format).await?,
        Commands::Env { base_url, output } => env_command(registry, &base_url, output).await?,
    }

    Ok(())
}

#[derive(Serialize)]
struct ProviderListing<'a> {
    name: &'a str,
    base_url_key: &'a str,
    api_key_link: Option<&'a str>,
    models: &'a [providers::ModelInfo],
}

fn providers_command(registry: &ProviderRegistry, format: OutputFormat) -> Result<()> {
    let listings: Vec<ProviderListing> = registry
        .providers()
        .map(|provider| ProviderListing {
            name: provider.name(),
            base_url_key: provider.config().base_url_key,
            api_key_link: provider.api_key_link(),
            models: provider.static_models(),
        })
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&listings)?),
        OutputFormat::Text => {
            for listing in &listings {
                println!("{} (base URL from {})", listing.name, listing.base_url_key);
                for model in listing.models {
                    println!(
                        "  {:<32} {:<30} {} tokens",
                        model.name, model.label, model.max_token_allowed
                    );
                }
            }
        }
    }

    Ok(())
}

fn resolve_command(
    config: &config::Config,
    registry: &ProviderRegistry,
    format: OutputFormat,
) -> Result<()> {
    let provider = registry.get(config.provider_name())?;
    let context = config.resolution_context()?;
    let resolved = provider.resolve(&context);

    let Some(base_url) = resolved.base_url.as_deref() else {
        return Err(providers::ProviderError::MissingBaseUrl {
            provider: provider.name().to_string(),
        }
        .into());
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&resolved)?),
        OutputFormat::Text => {
            let source = resolved
                .source
                .map(|s| s.to_string())
                .unwrap_or_default();
            println!("{} -> {} (from {})", provider.name(), base_url, source);
        }
    }

    Ok(())
}

async fn chat_command(
    config: &config::Config,
    registry: &ProviderRegistry,
    message: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let provider = registry.get(config.provider_name())?;
    let model = select_model(config, provider.as_ref())?;
    let context = config.resolution_context()?;
    let handle = provider.get_model_instance(&model, &context)?;

    let user_prompt = match message {
        Some(message) => message,
        None if std::io::stdin().is_terminal() => {
            anyhow::bail!("No prompt given. Pass it as an argument or pipe it on stdin.");
        }
        None => {
            use std::io::Read;
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    info!("Sending prompt to {} at {}", handle.model_name(), handle.base_url());

    let request = adapters::LLMRequest {
        system_prompt: config.system_prompt.clone().unwrap_or_default(),
        user_prompt,
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    };
    let response = handle.complete(request).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
        OutputFormat::Text => {
            println!("{}", response.content.trim());
            if let Some(usage) = &response.usage {
                info!(
                    "Tokens: {} prompt + {} completion = {}",
                    usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
                );
            }
        }
    }

    Ok(())
}

async fn health_command(
    config: &config::Config,
    registry: &ProviderRegistry,
    format: OutputFormat,
) -> Result<()> {
    let provider = registry.get(config.provider_name())?;
    let model = select_model(config, provider.as_ref())?;
    let context = config.resolution_context()?;
    let handle = provider.get_model_instance(&model, &context)?;

    let status = handle.health().await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
        OutputFormat::Text => println!(
            "{} at {}: {} ({})",
            provider.name(),
            handle.base_url(),
            status.status,
            status.model.as_deref().unwrap_or("unknown model")
        ),
    }

    if !status.is_ok() {
        anyhow::bail!("{} reported status {}", provider.name(), status.status);
    }

    Ok(())
}

async fn env_command(
    registry: &ProviderRegistry,
    base_url: &str,
    output_path: Option<PathBuf>,
) -> Result<()> {
    let Some(path) = output_path else {
        print!("{}", core::env_file::render_local_env(registry, base_url));
        return Ok(());
    };

    let output = if path.exists() {
        let existing = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        core::env_file::merge_local_env(&existing, registry, base_url)
    } else {
        core::env_file::render_local_env(registry, base_url)
    };

    tokio::fs::write(&path, output)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    // The file may hold API keys.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).await?;
    }

    info!("Wrote {}", path.display());
    Ok(())
}

/// Explicit model if configured, otherwise the provider's first listed one.
fn select_model(config: &config::Config, provider: &dyn Provider) -> Result<String> {
    if let Some(model) = &config.model {
        return Ok(model.clone());
    }
    provider
        .static_models()
        .first()
        .map(|info| info.name.to_string())
        .ok_or_else(|| anyhow::anyhow!("{} lists no models; pass --model", provider.name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_model_defaults_to_first_static_model() {
        let config = config::Config::default();
        let provider = providers::CodeLlamaLocalProvider;
        assert_eq!(
            select_model(&config, &provider).unwrap(),
            "codellama-7b-instruct"
        );
    }

    #[test]
    fn select_model_prefers_configured_model() {
        let config = config::Config {
            model: Some("deepseek-coder-33b-instruct".to_string()),
            ..config::Config::default()
        };
        let provider = providers::DeepseekLocalProvider;
        assert_eq!(
            select_model(&config, &provider).unwrap(),
            "deepseek-coder-33b-instruct"
        );
    }

    #[tokio::test]
    async fn env_command_preserves_existing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env.local");
        std::fs::write(
            &path,
            "OPENAI_API_KEY=sk-keep-me\nDEEPSEEK_LOCAL_API_BASE_URL=http://old:8000/v1\n",
        )
        .unwrap();

        env_command(
            ProviderRegistry::global(),
            "http://localhost:8000/v1",
            Some(path.clone()),
        )
        .await
        .unwrap();

        let vars = core::env_file::load_env_file(&path).unwrap();
        assert_eq!(vars["OPENAI_API_KEY"], "sk-keep-me");
        assert_eq!(vars["DEEPSEEK_LOCAL_API_BASE_URL"], "http://localhost:8000/v1");
        assert_eq!(vars["CODELLAMA_LOCAL_API_BASE_URL"], "http://localhost:8000/v1");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn env_command_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env.local");

        env_command(ProviderRegistry::global(), "http://gpu-box:8000/v1", Some(path.clone()))
            .await
            .unwrap();

        let vars = core::env_file::load_env_file(&path).unwrap();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars["CODELLAMA_LOCAL_API_BASE_URL"], "http://gpu-box:8000/v1");
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "local-llm",
            "chat",
            "hello",
            "--provider",
            "CodeLlamaLocal",
            "--output-format",
            "json",
        ]);
        assert_eq!(cli.provider.as_deref(), Some("CodeLlamaLocal"));
        assert!(matches!(cli.output_format, OutputFormat::Json));
        assert!(matches!(cli.command, Commands::Chat { message: Some(ref m) } if m == "hello"));
    }
}
