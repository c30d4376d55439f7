use cb_compiler::{ChecksumError, ParseError};
use cb_core::psl::PslError;

/// Failure of a network fetch, as reported by a [`crate::FilterListFetcher`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct FetchError(pub String);

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        Self(err.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to fetch update for profile `{id}`: {source}")]
    UpdateFetch {
        id: String,
        #[source]
        source: FetchError,
    },

    #[error("update for profile `{id}` rejected: {source}")]
    ChecksumMismatch {
        id: String,
        #[source]
        source: ChecksumError,
    },

    #[error("profile `{0}` already exists")]
    DuplicateProfile(String),

    #[error("profile `{0}` not found")]
    ProfileNotFound(String),

    #[error("invalid profile identifier `{0}`")]
    InvalidIdentifier(String),

    #[error("invalid custom rule on line {line} `{rule}`: {source}")]
    InvalidCustomRule {
        line: usize,
        rule: String,
        #[source]
        source: ParseError,
    },

    #[error("profile `{0}` cannot be removed, only cleared")]
    ProtectedProfile(String),

    #[error("profile `{0}` has no update URL")]
    NoUpdateUrl(String),

    #[error("update for profile `{0}` is already in progress")]
    UpdateInProgress(String),

    #[error("update for profile `{0}` discarded: profile was removed, disabled or changed")]
    UpdateDiscarded(String),

    #[error("update for profile `{id}` could not be compiled: {reason}")]
    UpdateCompile { id: String, reason: String },

    #[error("failed to set up HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error(transparent)]
    PublicSuffixList(#[from] PslError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
