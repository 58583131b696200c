use thiserror::Error;

/// Failure taxonomy for rate queries.
///
/// The coordinator pattern-matches on these variants to decide what aborts a
/// batch and what is absorbed into a partial result.
#[derive(Debug, Error)]
pub enum RateError {
    /// The provider recognized none of the requested asset ids.
    #[error("invalid asset(s): {}. Please check the correct name for the asset you're trying to use.", ids.join(", "))]
    AssetNotFound { ids: Vec<String> },

    /// The provider signalled throttling (HTTP 429). Retry policy lives with
    /// the caller, so this is never swallowed below the facade.
    #[error("rate limit exceeded for {provider} API. Please try again later.")]
    RateLimitExceeded { provider: String },

    /// The persisted snapshot could not be read or written.
    #[error("rate store unavailable: {0}")]
    StoreUnavailable(#[source] anyhow::Error),

    /// Any other transport or provider failure.
    #[error("rate provider unavailable: {0}")]
    ProviderUnavailable(#[source] anyhow::Error),
}

impl RateError {
    pub fn not_found<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RateError::AssetNotFound {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RateError>;
