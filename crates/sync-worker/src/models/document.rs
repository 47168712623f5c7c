use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::models::envelope::ProjectRow;

/// The indexed shape of one project. Exactly one exists per project id once
/// its upsert has been processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDocument {
  pub id: i64,
  pub name: String,
  pub slug: String,
  pub description: String,
  pub created_at: NaiveDateTime,
  /// Tag names, set-keyed by the tag string
  pub hashtags: Vec<String>,
  /// Member records, set-keyed by user id
  pub users: Vec<UserRecord>,
}

/// Nested user record inside a project document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
  pub id: i64,
  pub name: String,
  pub created_at: NaiveDateTime,
}

impl ProjectDocument {
  /// Build the full-replace document for a freshly observed project row.
  /// The upsert is a replace, not a merge, so both collections start empty.
  pub fn from_row(row: ProjectRow) -> Self {
    Self {
      id: row.id,
      name: row.name.unwrap_or_default(),
      slug: row.slug.unwrap_or_default(),
      description: row.description.unwrap_or_default(),
      created_at: row.created_at,
      hashtags: Vec::new(),
      users: Vec::new(),
    }
  }
}
