pub mod base;
pub mod codellama_local;
pub mod deepseek_local;
pub mod error;
pub mod registry;

pub use base::{ModelInfo, Provider, ProviderSetting, ResolutionContext};
pub use codellama_local::CodeLlamaLocalProvider;
pub use deepseek_local::DeepseekLocalProvider;
pub use error::ProviderError;
pub use registry::ProviderRegistry;
