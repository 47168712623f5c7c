use thiserror::Error;

/// Failures raised by an [`super::IndexClient`] backend.
///
/// `DocumentMissing` is kept apart from the other variants: it marks the
/// ordering race where an attach event arrives before the project's upsert,
/// which is retryable, while the rest are backend failures that are not.
#[derive(Debug, Error)]
pub enum IndexError {
  #[error("search backend request failed: {0}")]
  Request(#[from] reqwest::Error),

  #[error("search backend returned status {status}: {body}")]
  Response { status: u16, body: String },

  #[error("project {id} has no indexed document yet")]
  DocumentMissing { id: i64 },

  #[error("failed to decode search backend response: {0}")]
  Decode(#[from] serde_json::Error),
}

impl IndexError {
  /// True for the attach-before-upsert race, the only recoverable condition
  pub fn is_ordering_race(&self) -> bool {
    matches!(self, IndexError::DocumentMissing { .. })
  }
}
