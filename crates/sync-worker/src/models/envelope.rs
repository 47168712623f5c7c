use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::Value;

use crate::models::document::UserRecord;

/// Represents one captured relational change, as published by the
/// `pg_notify` triggers on the `data_changes` channel
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeEnvelope {
  /// Which relational event produced this envelope
  pub trigger_name: ChangeTrigger,
  /// Originating relation; carried for observability, never used for routing
  pub table_name: String,
  /// Trigger-specific payload, decoded per trigger via [`ChangeEnvelope::decode_entry`]
  pub entry: Value,
}

impl ChangeEnvelope {
  /// Decode `entry` into the payload type the trigger mandates
  pub fn decode_entry<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
    serde_json::from_value(self.entry.clone())
  }
}

/// The closed set of triggers the relational store publishes.
///
/// Trigger names the emitter may add in the future deserialize into
/// `Unknown` and are dropped downstream, so a new emitter never requires
/// a coordinated worker deploy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum ChangeTrigger {
  ProjectUpserted,
  HashtagAttached,
  UserAttached,
  Unknown(String),
}

impl From<String> for ChangeTrigger {
  fn from(name: String) -> Self {
    match name.as_str() {
      "projects_data_changes" => ChangeTrigger::ProjectUpserted,
      "project_hashtags_data_changes" => ChangeTrigger::HashtagAttached,
      "users_projects_data_changes" => ChangeTrigger::UserAttached,
      _ => ChangeTrigger::Unknown(name),
    }
  }
}

impl ChangeTrigger {
  /// The relation each trigger watches; doubles as the metrics label
  pub fn table_name(&self) -> &'static str {
    match self {
      ChangeTrigger::ProjectUpserted => "projects",
      ChangeTrigger::HashtagAttached => "project_hashtags",
      ChangeTrigger::UserAttached => "users_projects",
      ChangeTrigger::Unknown(_) => "unknown",
    }
  }
}

/// Full project row as serialized by `row_to_json(NEW)`
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectRow {
  pub id: i64,
  pub name: Option<String>,
  pub slug: Option<String>,
  pub description: Option<String>,
  pub created_at: NaiveDateTime,
}

/// A hashtag-to-project edge, with the tag name resolved by the trigger
#[derive(Debug, Clone, Deserialize)]
pub struct HashtagAttachment {
  pub project_id: i64,
  pub hashtag_name: String,
}

/// A user-to-project edge, with the user row resolved by the trigger
#[derive(Debug, Clone, Deserialize)]
pub struct UserAttachment {
  pub project_id: i64,
  pub user: UserRecord,
}
