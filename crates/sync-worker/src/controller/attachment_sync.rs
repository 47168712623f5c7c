use std::time::Duration;

use foldsync_config::Worker;
use foldsync_result::errors::BoxedErr;
use tokio::time::sleep;
use tracing::{debug, error};

use crate::{
  index::{IndexClient, IndexError},
  models::envelope::{HashtagAttachment, UserAttachment},
  server::observability::MetricsCollector,
};

/// Append a hashtag into its project's document.
///
/// A missing document means the project's upsert has not landed yet; under
/// normal load it is milliseconds away, so that case gets a short bounded
/// retry before the envelope is dropped. Any other backend failure is final.
pub async fn sync_hashtag_attach(
  attachment: HashtagAttachment,
  index: &dyn IndexClient,
  index_name: &str,
  worker: &Worker,
  metrics: &MetricsCollector,
) -> Result<(), BoxedErr> {
  let max_retries = worker.attach_max_retries.max(1);
  let mut backoff_ms = worker.attach_backoff_ms;

  let mut tries = 0;
  loop {
    tries += 1;
    match index.add_hashtag(index_name, attachment.project_id, &attachment.hashtag_name).await {
      Ok(()) => {
        debug!("Appended hashtag '{}' to project {}", attachment.hashtag_name, attachment.project_id);
        return Ok(());
      }
      Err(err @ IndexError::DocumentMissing { .. }) => {
        if tries >= max_retries {
          error!(
            "Project {} still has no document after {} tries; dropping hashtag attach.",
            attachment.project_id, max_retries
          );
          return Err(Box::new(err));
        }
        debug!(
          "Project {} not indexed yet (try {}/{}); waiting for its upsert.",
          attachment.project_id, tries, max_retries
        );
        metrics.record_attach_retry("project_hashtags");
        sleep(Duration::from_millis(backoff_ms)).await;
        backoff_ms = backoff_ms.saturating_mul(2).min(5000);
      }
      Err(err) => {
        error!(
          "Failed to append hashtag '{}' to project {}: {}",
          attachment.hashtag_name, attachment.project_id, err
        );
        return Err(Box::new(err));
      }
    }
  }
}

/// Append a user record into its project's document, keyed by the nested
/// user id. Same retry contract as hashtag attach.
pub async fn sync_user_attach(
  attachment: UserAttachment,
  index: &dyn IndexClient,
  index_name: &str,
  worker: &Worker,
  metrics: &MetricsCollector,
) -> Result<(), BoxedErr> {
  let max_retries = worker.attach_max_retries.max(1);
  let mut backoff_ms = worker.attach_backoff_ms;

  let mut tries = 0;
  loop {
    tries += 1;
    match index.add_user(index_name, attachment.project_id, &attachment.user).await {
      Ok(()) => {
        debug!("Appended user {} to project {}", attachment.user.id, attachment.project_id);
        return Ok(());
      }
      Err(err @ IndexError::DocumentMissing { .. }) => {
        if tries >= max_retries {
          error!(
            "Project {} still has no document after {} tries; dropping user attach.",
            attachment.project_id, max_retries
          );
          return Err(Box::new(err));
        }
        debug!(
          "Project {} not indexed yet (try {}/{}); waiting for its upsert.",
          attachment.project_id, tries, max_retries
        );
        metrics.record_attach_retry("users_projects");
        sleep(Duration::from_millis(backoff_ms)).await;
        backoff_ms = backoff_ms.saturating_mul(2).min(5000);
      }
      Err(err) => {
        error!(
          "Failed to append user {} to project {}: {}",
          attachment.user.id, attachment.project_id, err
        );
        return Err(Box::new(err));
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{sync::Arc, time::Duration};

  use foldsync_config::Settings;
  use tokio::{spawn, time::sleep};

  use super::*;
  use crate::{
    index::MemoryIndex,
    models::document::ProjectDocument,
    server::observability::{MetricsCollector, MetricsCollectorArgs},
  };

  fn doc(id: i64) -> ProjectDocument {
    ProjectDocument {
      id,
      name: "fold".to_string(),
      slug: "fold".to_string(),
      description: String::new(),
      created_at: chrono::NaiveDate::from_ymd_opt(2023, 6, 1)
        .unwrap()
        .and_hms_opt(10, 30, 0)
        .unwrap(),
      hashtags: Vec::new(),
      users: Vec::new(),
    }
  }

  fn hashtag(project_id: i64, tag: &str) -> HashtagAttachment {
    HashtagAttachment { project_id, hashtag_name: tag.to_string() }
  }

  fn metrics(settings: &Settings) -> MetricsCollector {
    MetricsCollector::new(MetricsCollectorArgs { config: Arc::new(settings.clone()) })
      .expect("collector should build")
  }

  #[tokio::test(start_paused = true)]
  async fn attach_before_upsert_converges_via_retry() {
    let settings = Settings::default();
    let metrics = metrics(&settings);
    let index = Arc::new(MemoryIndex::new());

    // The upsert lands while the attach is waiting out its first backoffs
    let index_clone = index.clone();
    spawn(async move {
      sleep(Duration::from_millis(150)).await;
      index_clone.upsert_document("projects_index", &doc(9)).await.unwrap();
    });

    sync_hashtag_attach(hashtag(9, "x"), index.as_ref(), "projects_index", &settings.worker, &metrics)
      .await
      .unwrap();

    let stored = index.document("projects_index", 9).await.unwrap();
    assert_eq!(stored.hashtags, vec!["x".to_string()]);
  }

  #[tokio::test(start_paused = true)]
  async fn exhausted_retries_drop_the_event_without_crashing() {
    let settings = Settings::default();
    let metrics = metrics(&settings);
    let index = MemoryIndex::new();

    let result =
      sync_hashtag_attach(hashtag(9, "x"), &index, "projects_index", &settings.worker, &metrics)
        .await;
    assert!(result.is_err());
    assert_eq!(index.document_count("projects_index").await, 0);

    // The pipeline keeps converging once the upsert finally arrives
    index.upsert_document("projects_index", &doc(9)).await.unwrap();
    sync_hashtag_attach(hashtag(9, "x"), &index, "projects_index", &settings.worker, &metrics)
      .await
      .unwrap();
    let stored = index.document("projects_index", 9).await.unwrap();
    assert_eq!(stored.hashtags, vec!["x".to_string()]);
  }

  #[tokio::test]
  async fn user_attach_is_idempotent_across_redelivery() {
    let settings = Settings::default();
    let metrics = metrics(&settings);
    let index = MemoryIndex::new();
    index.upsert_document("projects_index", &doc(7)).await.unwrap();

    let attachment: UserAttachment = serde_json::from_value(serde_json::json!({
      "project_id": 7,
      "user": { "id": 3, "name": "tesla", "created_at": "2023-06-01T10:30:00" }
    }))
    .unwrap();

    sync_user_attach(attachment.clone(), &index, "projects_index", &settings.worker, &metrics)
      .await
      .unwrap();
    sync_user_attach(attachment, &index, "projects_index", &settings.worker, &metrics)
      .await
      .unwrap();

    let stored = index.document("projects_index", 7).await.unwrap();
    assert_eq!(stored.users.len(), 1);
  }
}
