use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
  index::{error::IndexError, IndexClient},
  models::document::{ProjectDocument, UserRecord},
};

/// In-memory [`IndexClient`] used by the tests. Mirrors the backend contract
/// the pipeline relies on: document-atomic mutations, set semantics on both
/// collections, and a missing-document failure for partial updates.
#[derive(Debug, Default)]
pub struct MemoryIndex {
  indices: Mutex<HashMap<String, HashMap<i64, ProjectDocument>>>,
}

impl MemoryIndex {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn document(&self, index: &str, id: i64) -> Option<ProjectDocument> {
    self.indices.lock().await.get(index).and_then(|docs| docs.get(&id)).cloned()
  }

  pub async fn document_count(&self, index: &str) -> usize {
    self.indices.lock().await.get(index).map(|docs| docs.len()).unwrap_or(0)
  }
}

#[async_trait]
impl IndexClient for MemoryIndex {
  async fn index_exists(&self, name: &str) -> Result<bool, IndexError> {
    Ok(self.indices.lock().await.contains_key(name))
  }

  async fn create_index(&self, name: &str) -> Result<(), IndexError> {
    self.indices.lock().await.entry(name.to_string()).or_default();
    Ok(())
  }

  async fn upsert_document(&self, index: &str, doc: &ProjectDocument) -> Result<(), IndexError> {
    let mut indices = self.indices.lock().await;
    indices.entry(index.to_string()).or_default().insert(doc.id, doc.clone());
    Ok(())
  }

  async fn add_hashtag(
    &self,
    index: &str,
    project_id: i64,
    hashtag: &str,
  ) -> Result<(), IndexError> {
    let mut indices = self.indices.lock().await;
    let doc = indices
      .get_mut(index)
      .and_then(|docs| docs.get_mut(&project_id))
      .ok_or(IndexError::DocumentMissing { id: project_id })?;

    if !doc.hashtags.iter().any(|tag| tag == hashtag) {
      doc.hashtags.push(hashtag.to_string());
    }
    Ok(())
  }

  async fn add_user(
    &self,
    index: &str,
    project_id: i64,
    user: &UserRecord,
  ) -> Result<(), IndexError> {
    let mut indices = self.indices.lock().await;
    let doc = indices
      .get_mut(index)
      .and_then(|docs| docs.get_mut(&project_id))
      .ok_or(IndexError::DocumentMissing { id: project_id })?;

    if !doc.users.iter().any(|existing| existing.id == user.id) {
      doc.users.push(user.clone());
    }
    Ok(())
  }

  async fn delete_index(&self, name: &str) -> Result<(), IndexError> {
    self.indices.lock().await.remove(name);
    Ok(())
  }
}
