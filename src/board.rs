use snafu::Snafu;

pub mod feed;
pub mod service;
pub mod store;

/// Errors surfaced by a fetch/reconcile cycle.
///
/// Feed errors and store errors are kept distinct so callers can tell
/// "results unavailable" from "publish control unavailable". Decode-level
/// issues never appear here; malformed rows are tolerated during decoding.
#[derive(Debug, Snafu)]
pub enum BoardError {
    #[snafu(display("Error fetching feed from {url}"))]
    FeedRequest {
        source: reqwest::Error,
        url: String,
    },
    #[snafu(display("Feed endpoint {url} returned status {status}"))]
    FeedStatus {
        status: reqwest::StatusCode,
        url: String,
    },
    #[snafu(display("Feed returned an empty body"))]
    EmptyFeed {},
    #[snafu(display("Error opening publication store at {path}"))]
    StoreOpen { source: sled::Error, path: String },
    #[snafu(display("Error reading publication flags"))]
    StoreRead { source: sled::Error },
    #[snafu(display("Error writing publication flags ({count} programs)"))]
    StoreWrite { source: sled::Error, count: usize },
    #[snafu(display("Error encoding stored flag for {program_code}"))]
    StoreEncode {
        source: serde_json::Error,
        program_code: String,
    },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error + Send + Sync>, Some)))]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl BoardError {
    /// True for failures of the publication store rather than the feed.
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            BoardError::StoreOpen { .. }
                | BoardError::StoreRead { .. }
                | BoardError::StoreWrite { .. }
                | BoardError::StoreEncode { .. }
        )
    }
}

pub type BoardResult<T> = Result<T, BoardError>;
