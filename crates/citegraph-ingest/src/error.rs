use citegraph_core::CiteGraphError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error from {url}: HTTP {status}: {message}")]
    Api {
        url: String,
        status: u16,
        message: String,
    },

    #[error("rate limited by {service}, gave up after {attempts} attempts")]
    RateLimited { service: String, attempts: u32 },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("record has no usable title: {0}")]
    InvalidRecord(String),

    #[error("cannot link {from} -> {to}: endpoint node missing")]
    MissingEndpoint { from: String, to: String },

    #[error("graph store error: {0}")]
    Store(#[from] CiteGraphError),
}

impl IngestError {
    /// Transient errors are retried with backoff; everything else fails fast.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::RateLimited { .. } => true,
            Self::Store(e) => e.is_transient(),
            _ => false,
        }
    }

    /// HTTP status of a permanent API failure, if that is what this is.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
