use thiserror::Error;

/// Core error type for llmobs.
///
/// Provider adapters return this from `ChatProvider` / `EmbedProvider`, and the
/// instrumentation wrapper hands it back to the caller untouched. Internally,
/// modules can use `anyhow::Result<T>` for convenience, but public boundaries
/// expose `CoreResult<T>`.
#[derive(Debug, Error)]
pub enum LlmObsError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("rate limited by provider {provider}")]
    RateLimited {
        provider: String,
        retry_after: Option<u64>,
    },

    #[error("provider unavailable: {provider}")]
    ProviderUnavailable { provider: String },

    #[error("upstream error from {provider}: {code} {message}")]
    ProviderError {
        provider: String,
        code: String,
        message: String,
    },

    /// Raised by a user-supplied token count callback.
    #[error("token count callback failed: {0}")]
    TokenCount(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LlmObsError {
    /// Short, stable classification used for noticed errors and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::RateLimited { .. } => "rate_limited",
            Self::ProviderUnavailable { .. } => "provider_unavailable",
            Self::ProviderError { .. } => "provider_error",
            Self::TokenCount(_) => "token_count",
            Self::Io(_) => "io",
            Self::Other(_) => "other",
        }
    }
}

pub type CoreResult<T> = std::result::Result<T, LlmObsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_stable_per_variant() {
        let err = LlmObsError::RateLimited {
            provider: "openai".into(),
            retry_after: Some(2),
        };
        assert_eq!(err.kind(), "rate_limited");
        assert_eq!(err.to_string(), "rate limited by provider openai");

        let err = LlmObsError::TokenCount("tokenizer missing".into());
        assert_eq!(err.kind(), "token_count");
        assert!(err.to_string().contains("tokenizer missing"));
    }

    #[test]
    fn io_and_anyhow_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(LlmObsError::from(io).kind(), "io");
        assert_eq!(LlmObsError::from(anyhow::anyhow!("boom")).kind(), "other");
    }
}
