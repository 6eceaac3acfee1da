use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Missing base URL for {provider} provider")]
    MissingBaseUrl { provider: String },

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
}
