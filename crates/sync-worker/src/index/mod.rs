use async_trait::async_trait;

use crate::models::document::{ProjectDocument, UserRecord};

pub mod elasticsearch;
pub mod error;
pub mod memory;

pub use elasticsearch::ElasticsearchIndex;
pub use error::IndexError;
pub use memory::MemoryIndex;

/// The operations the sync pipeline needs from a document index backend.
///
/// The pipeline receives this as an explicit dependency, so any backend
/// offering these operations is substitutable (the tests run against
/// [`MemoryIndex`]).
#[async_trait]
pub trait IndexClient: Send + Sync {
  async fn index_exists(&self, name: &str) -> Result<bool, IndexError>;

  /// Create `name` with the projects mapping (keyword hashtags, nested users)
  async fn create_index(&self, name: &str) -> Result<(), IndexError>;

  /// Full-document create-or-replace, immediately visible to readers
  async fn upsert_document(&self, index: &str, doc: &ProjectDocument) -> Result<(), IndexError>;

  /// Idempotent set-add of a tag into the document's `hashtags`.
  /// Fails with [`IndexError::DocumentMissing`] when the project has no
  /// document yet.
  async fn add_hashtag(&self, index: &str, project_id: i64, hashtag: &str)
  -> Result<(), IndexError>;

  /// Idempotent set-add of a user record into the document's `users`,
  /// keyed by the nested user id
  async fn add_user(&self, index: &str, project_id: i64, user: &UserRecord)
  -> Result<(), IndexError>;

  async fn delete_index(&self, name: &str) -> Result<(), IndexError>;
}
