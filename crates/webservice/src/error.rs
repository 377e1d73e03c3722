#![forbid(unsafe_code)]

/// Local failures that are raised rather than folded into an [`crate::Outcome`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid server location {input:?}: {source}")]
    InvalidUrl {
        input: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Cannot embed credentials into a URL")]
    InvalidCredentials,

    #[error("Failed to set up HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
