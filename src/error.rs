use thiserror::Error;

use crate::literal::LiteralError;

/// Failure taxonomy for one crawl task. Every variant except `DetailParse` is fatal for the task
/// that raised it; a detail failure only costs that match its detail row. Recoverable conditions
/// (short roster tuples, unscored fixtures) never surface here.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("network error for {url}: {detail}")]
    Network { url: String, detail: String },

    #[error("feed reference not found in page {url}")]
    LocatorNotFound { url: String },

    #[error("rate limited by {url} after {attempts} attempts")]
    RateLimited { url: String, attempts: u32 },

    #[error("round {round} could not be decoded: {source}")]
    StructuredParse {
        round: u32,
        #[source]
        source: LiteralError,
    },

    #[error("team roster could not be decoded: {0}")]
    RosterParse(#[source] LiteralError),

    #[error("unknown competition format {0:?}")]
    UnknownFormat(String),

    #[error("task {task_id} needs a secondary url for a two-stage competition")]
    MissingSecondaryUrl { task_id: i64 },

    #[error("analysis page of match {match_id} has no {field}")]
    DetailParse { match_id: i64, field: &'static str },

    #[error("persistence failed: {0:#}")]
    Persistence(anyhow::Error),
}

impl CrawlError {
    pub fn network(url: &str, detail: impl ToString) -> Self {
        Self::Network {
            url: url.to_string(),
            detail: detail.to_string(),
        }
    }

    /// Short stable label used in run logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network { .. } => "network",
            Self::LocatorNotFound { .. } => "locator_not_found",
            Self::RateLimited { .. } => "rate_limited",
            Self::StructuredParse { .. } => "structured_parse",
            Self::RosterParse(_) => "roster_parse",
            Self::UnknownFormat(_) => "unknown_format",
            Self::MissingSecondaryUrl { .. } => "missing_secondary_url",
            Self::DetailParse { .. } => "detail_parse",
            Self::Persistence(_) => "persistence",
        }
    }
}
