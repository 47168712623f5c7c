use foldsync_config::Settings;
use foldsync_result::errors::{BoxedErr, ErrorType, InternalError};
use tracing::warn;

use crate::{
  controller::{
    attachment_sync::{sync_hashtag_attach, sync_user_attach},
    project_sync::sync_project_upsert,
  },
  index::IndexClient,
  models::envelope::{ChangeEnvelope, ChangeTrigger},
  server::observability::MetricsCollector,
};

/// Route one decoded envelope to the executor its trigger mandates.
///
/// Routing goes by trigger identity alone; `table_name` rides along for
/// observability and only ever produces a warning when it disagrees.
pub async fn dispatch_envelope(
  envelope: ChangeEnvelope,
  index: &dyn IndexClient,
  settings: &Settings,
  metrics: &MetricsCollector,
) -> Result<(), BoxedErr> {
  let ie = |err: BoxedErr, msg: &str| {
    let path = "sync-worker.controller.dispatcher".into();
    let err_type = ErrorType::JsonUnmarshal;
    return InternalError { err_type, temp: false, err, msg: msg.into(), path };
  };

  if !matches!(envelope.trigger_name, ChangeTrigger::Unknown(_))
    && envelope.table_name != envelope.trigger_name.table_name()
  {
    warn!(
      "Envelope table '{}' disagrees with trigger table '{}'",
      envelope.table_name,
      envelope.trigger_name.table_name()
    );
  }

  match &envelope.trigger_name {
    ChangeTrigger::ProjectUpserted => {
      let row = envelope.decode_entry().map_err(|err| {
        metrics.record_decode_error();
        Box::new(ie(Box::new(err), "failed to decode project entry")) as BoxedErr
      })?;
      sync_project_upsert(row, index, &settings.search.index_projects).await
    }
    ChangeTrigger::HashtagAttached => {
      let attachment = envelope.decode_entry().map_err(|err| {
        metrics.record_decode_error();
        Box::new(ie(Box::new(err), "failed to decode hashtag attachment entry")) as BoxedErr
      })?;
      sync_hashtag_attach(attachment, index, &settings.search.index_projects, &settings.worker, metrics)
        .await
    }
    ChangeTrigger::UserAttached => {
      let attachment = envelope.decode_entry().map_err(|err| {
        metrics.record_decode_error();
        Box::new(ie(Box::new(err), "failed to decode user attachment entry")) as BoxedErr
      })?;
      sync_user_attach(attachment, index, &settings.search.index_projects, &settings.worker, metrics)
        .await
    }
    ChangeTrigger::Unknown(name) => {
      // New emitter triggers may appear before this worker learns them;
      // dropping keeps the deploys uncoupled
      warn!("Unknown trigger '{}'; dropping envelope.", name);
      metrics.record_unknown_trigger();
      Ok(())
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use foldsync_config::Settings;

  use super::*;
  use crate::{index::MemoryIndex, server::observability::MetricsCollector};

  fn settings() -> Settings {
    Settings::default()
  }

  fn metrics(settings: &Settings) -> MetricsCollector {
    MetricsCollector::new(crate::server::observability::MetricsCollectorArgs {
      config: Arc::new(settings.clone()),
    })
    .expect("collector should build")
  }

  fn envelope(json: &str) -> ChangeEnvelope {
    serde_json::from_str(json).expect("envelope should decode")
  }

  fn project_envelope(id: i64) -> ChangeEnvelope {
    envelope(&format!(
      r#"{{
        "trigger_name": "projects_data_changes",
        "table_name": "projects",
        "entry": {{
          "id": {id},
          "name": "fold",
          "slug": "fold",
          "description": "personal finance",
          "created_at": "2023-06-01T10:30:00"
        }}
      }}"#
    ))
  }

  fn hashtag_envelope(project_id: i64, tag: &str) -> ChangeEnvelope {
    envelope(&format!(
      r#"{{
        "trigger_name": "project_hashtags_data_changes",
        "table_name": "project_hashtags",
        "entry": {{ "project_id": {project_id}, "hashtag_name": "{tag}" }}
      }}"#
    ))
  }

  fn user_envelope(project_id: i64, user_id: i64) -> ChangeEnvelope {
    envelope(&format!(
      r#"{{
        "trigger_name": "users_projects_data_changes",
        "table_name": "users_projects",
        "entry": {{
          "project_id": {project_id},
          "user": {{ "id": {user_id}, "name": "tesla", "created_at": "2023-06-01T10:30:00" }}
        }}
      }}"#
    ))
  }

  #[tokio::test]
  async fn upsert_creates_exactly_one_document() {
    let settings = settings();
    let metrics = metrics(&settings);
    let index = MemoryIndex::new();

    dispatch_envelope(project_envelope(7), &index, &settings, &metrics).await.unwrap();

    assert_eq!(index.document_count("projects_index").await, 1);
    let doc = index.document("projects_index", 7).await.unwrap();
    assert!(doc.hashtags.is_empty());
    assert!(doc.users.is_empty());
  }

  #[tokio::test]
  async fn redelivered_attach_does_not_grow_collections() {
    let settings = settings();
    let metrics = metrics(&settings);
    let index = MemoryIndex::new();

    dispatch_envelope(project_envelope(7), &index, &settings, &metrics).await.unwrap();
    dispatch_envelope(hashtag_envelope(7, "x"), &index, &settings, &metrics).await.unwrap();
    dispatch_envelope(hashtag_envelope(7, "x"), &index, &settings, &metrics).await.unwrap();
    dispatch_envelope(user_envelope(7, 3), &index, &settings, &metrics).await.unwrap();
    dispatch_envelope(user_envelope(7, 3), &index, &settings, &metrics).await.unwrap();

    let doc = index.document("projects_index", 7).await.unwrap();
    assert_eq!(doc.hashtags, vec!["x".to_string()]);
    assert_eq!(doc.users.len(), 1);
  }

  #[tokio::test]
  async fn ordered_attaches_apply_in_sequence() {
    let settings = settings();
    let metrics = metrics(&settings);
    let index = MemoryIndex::new();

    dispatch_envelope(project_envelope(7), &index, &settings, &metrics).await.unwrap();
    dispatch_envelope(hashtag_envelope(7, "a"), &index, &settings, &metrics).await.unwrap();
    dispatch_envelope(hashtag_envelope(7, "b"), &index, &settings, &metrics).await.unwrap();

    let doc = index.document("projects_index", 7).await.unwrap();
    assert_eq!(doc.hashtags, vec!["a".to_string(), "b".to_string()]);
  }

  #[tokio::test]
  async fn unknown_trigger_is_dropped_without_side_effects() {
    let settings = settings();
    let metrics = metrics(&settings);
    let index = MemoryIndex::new();

    let unknown = envelope(
      r#"{ "trigger_name": "comments_data_changes", "table_name": "comments", "entry": {} }"#,
    );
    dispatch_envelope(unknown, &index, &settings, &metrics).await.unwrap();
    assert_eq!(index.document_count("projects_index").await, 0);

    // The next well-formed envelope still processes
    dispatch_envelope(project_envelope(7), &index, &settings, &metrics).await.unwrap();
    assert_eq!(index.document_count("projects_index").await, 1);
  }

  #[tokio::test]
  async fn malformed_entry_is_dropped_and_next_envelope_processes() {
    let settings = settings();
    let metrics = metrics(&settings);
    let index = MemoryIndex::new();

    let missing_key = envelope(
      r#"{
        "trigger_name": "project_hashtags_data_changes",
        "table_name": "project_hashtags",
        "entry": { "project_id": 7 }
      }"#,
    );
    assert!(dispatch_envelope(missing_key, &index, &settings, &metrics).await.is_err());

    dispatch_envelope(project_envelope(7), &index, &settings, &metrics).await.unwrap();
    dispatch_envelope(hashtag_envelope(7, "x"), &index, &settings, &metrics).await.unwrap();
    let doc = index.document("projects_index", 7).await.unwrap();
    assert_eq!(doc.hashtags, vec!["x".to_string()]);
  }

  #[tokio::test]
  async fn entry_decode_failure_counts_as_a_decode_error() {
    let settings = settings();
    let metrics = metrics(&settings);
    let index = MemoryIndex::new();

    let missing_key = envelope(
      r#"{
        "trigger_name": "project_hashtags_data_changes",
        "table_name": "project_hashtags",
        "entry": { "project_id": 7 }
      }"#,
    );
    assert!(dispatch_envelope(missing_key, &index, &settings, &metrics).await.is_err());

    let families = metrics.registry().gather();
    let decode_errors = families
      .iter()
      .find(|family| family.get_name().contains("envelope_decode_errors"))
      .expect("decode error counter should be exported");
    let total: f64 =
      decode_errors.get_metric().iter().map(|m| m.get_counter().value()).sum();
    assert!(total >= 1.0);
  }

  #[tokio::test]
  async fn fresh_upsert_resets_collections() {
    let settings = settings();
    let metrics = metrics(&settings);
    let index = MemoryIndex::new();

    dispatch_envelope(project_envelope(7), &index, &settings, &metrics).await.unwrap();
    dispatch_envelope(hashtag_envelope(7, "x"), &index, &settings, &metrics).await.unwrap();

    // A project row update republishes the full row; the replace wipes edges
    dispatch_envelope(project_envelope(7), &index, &settings, &metrics).await.unwrap();
    let doc = index.document("projects_index", 7).await.unwrap();
    assert!(doc.hashtags.is_empty());
  }
}
