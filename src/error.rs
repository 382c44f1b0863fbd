use std::path::PathBuf;

/// Expected page structure that was missing during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionFailure {
    #[error("datasheet link not found")]
    DatasheetLinkNotFound,
    #[error("specs tab not found")]
    SpecsTabNotFound,
    #[error("specs href invalid")]
    SpecsHrefInvalid,
    #[error("specs content not found")]
    SpecsContentNotFound,
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Transport failure (connect, timeout, body read).
    #[error("fetch failed for {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-success status.
    #[error("fetch failed for {url}: HTTP {status}")]
    Status { url: String, status: u16 },

    /// Content that could not be read as an HTML document at all.
    #[error("parse failed for {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("extraction failed for {url}: {failure}")]
    Extraction {
        url: String,
        failure: ExtractionFailure,
    },

    #[error("storage failed at {}: {source}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MonitorError {
    pub fn extraction(url: &str, failure: ExtractionFailure) -> Self {
        Self::Extraction {
            url: url.to_string(),
            failure,
        }
    }

    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Coarse category used in logs and the batch summary.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch { .. } | Self::Status { .. } => "FetchError",
            Self::Parse { .. } => "ParseError",
            Self::Extraction { .. } => "ExtractionError",
            Self::Storage { .. } => "StorageError",
        }
    }

    pub fn extraction_failure(&self) -> Option<ExtractionFailure> {
        match self {
            Self::Extraction { failure, .. } => Some(*failure),
            _ => None,
        }
    }
}

/// A verification failure tagged with the target it belongs to.
#[derive(Debug, thiserror::Error)]
#[error("{} for target '{target}' ({url}): {error}", .error.kind())]
pub struct TargetFailure {
    pub target: String,
    pub url: String,
    #[source]
    pub error: MonitorError,
}

impl TargetFailure {
    pub fn new(target: &str, url: &str, error: MonitorError) -> Self {
        Self {
            target: target.to_string(),
            url: url.to_string(),
            error,
        }
    }
}
