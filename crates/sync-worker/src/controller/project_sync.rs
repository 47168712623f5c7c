use foldsync_result::errors::BoxedErr;
use tracing::debug;

use crate::{
  index::IndexClient,
  models::{document::ProjectDocument, envelope::ProjectRow},
};

/// Sync a project row into the index as a full-document replace.
///
/// Only this executor may create a document. Collections start empty on a
/// fresh row because the upsert is a replace, not a merge; attach events for
/// the row arrive as their own envelopes.
pub async fn sync_project_upsert(
  row: ProjectRow,
  index: &dyn IndexClient,
  index_name: &str,
) -> Result<(), BoxedErr> {
  let doc = ProjectDocument::from_row(row);
  let id = doc.id;

  index.upsert_document(index_name, &doc).await?;
  debug!("Upserted project {} into '{}'", id, index_name);

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::index::MemoryIndex;

  fn row(id: i64) -> ProjectRow {
    serde_json::from_value(serde_json::json!({
      "id": id,
      "name": "fold",
      "slug": "fold",
      "description": "personal finance",
      "created_at": "2023-06-01T10:30:00"
    }))
    .expect("row should decode")
  }

  #[tokio::test]
  async fn upsert_creates_document_with_empty_collections() {
    let index = MemoryIndex::new();
    sync_project_upsert(row(7), &index, "projects_index").await.unwrap();

    let doc = index.document("projects_index", 7).await.unwrap();
    assert_eq!(doc.name, "fold");
    assert!(doc.hashtags.is_empty());
    assert!(doc.users.is_empty());
  }
}
