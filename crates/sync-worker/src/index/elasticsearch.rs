use std::time::Duration;

use async_trait::async_trait;
use foldsync_config::Search;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};

use crate::{
  index::{error::IndexError, IndexClient},
  models::document::{ProjectDocument, UserRecord},
};

/// Guarded set-add scripts. The sources are constants; everything
/// event-derived travels in `params`, never in the script text.
const ADD_HASHTAG_SCRIPT: &str =
  "if (!ctx._source.hashtags.contains(params.tag)) { ctx._source.hashtags.add(params.tag) }";

const ADD_USER_SCRIPT: &str = "if (ctx._source.users.stream().noneMatch(u -> u.id == params.user.id)) { ctx._source.users.add(params.user) }";

/// Elasticsearch-backed [`IndexClient`] over the plain JSON REST API
pub struct ElasticsearchIndex {
  http: Client,
  host: String,
  api_key: String,
}

impl ElasticsearchIndex {
  pub fn new(search: &Search) -> Result<Self, IndexError> {
    let http = Client::builder()
      .timeout(Duration::from_secs(10)) // Don't hang forever
      .connect_timeout(Duration::from_secs(3))
      .pool_idle_timeout(Duration::from_secs(90))
      .pool_max_idle_per_host(10) // Keep connections alive for reuse
      .build()?;

    Ok(Self {
      http,
      host: search.host.trim_end_matches('/').to_string(),
      api_key: search.api_key.clone(),
    })
  }

  fn authed(&self, req: RequestBuilder) -> RequestBuilder {
    if self.api_key.is_empty() { req } else { req.bearer_auth(&self.api_key) }
  }

  async fn ensure_success(resp: Response) -> Result<Response, IndexError> {
    let status = resp.status();
    if status.is_success() {
      return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    Err(IndexError::Response { status: status.as_u16(), body })
  }

  async fn run_update_script(
    &self,
    index: &str,
    project_id: i64,
    body: Value,
  ) -> Result<(), IndexError> {
    let url = format!("{}/{}/_update/{}", self.host, index, project_id);

    let resp = self.authed(self.http.post(&url).json(&body)).send().await?;

    // _update on an absent document is the attach-before-upsert race
    if resp.status() == StatusCode::NOT_FOUND {
      return Err(IndexError::DocumentMissing { id: project_id });
    }

    Self::ensure_success(resp).await?;
    Ok(())
  }
}

/// Index mapping for project documents: keyword hashtags so tag membership
/// is exact-match, nested users so user fields query as one record
pub(crate) fn projects_mapping() -> Value {
  json!({
    "mappings": {
      "properties": {
        "id": { "type": "integer" },
        "name": { "type": "text" },
        "slug": { "type": "text" },
        "description": { "type": "text" },
        "created_at": { "type": "date" },
        "users": {
          "type": "nested",
          "properties": {
            "id": { "type": "integer" },
            "name": { "type": "text" },
            "created_at": { "type": "date" }
          }
        },
        "hashtags": { "type": "keyword" }
      }
    }
  })
}

pub(crate) fn hashtag_update_body(hashtag: &str) -> Value {
  json!({
    "script": {
      "source": ADD_HASHTAG_SCRIPT,
      "lang": "painless",
      "params": { "tag": hashtag }
    }
  })
}

pub(crate) fn user_update_body(user: &UserRecord) -> Value {
  json!({
    "script": {
      "source": ADD_USER_SCRIPT,
      "lang": "painless",
      "params": { "user": user }
    }
  })
}

#[async_trait]
impl IndexClient for ElasticsearchIndex {
  async fn index_exists(&self, name: &str) -> Result<bool, IndexError> {
    let url = format!("{}/{}", self.host, name);
    let resp = self.authed(self.http.head(&url)).send().await?;

    match resp.status() {
      StatusCode::OK => Ok(true),
      StatusCode::NOT_FOUND => Ok(false),
      status => {
        let body = resp.text().await.unwrap_or_default();
        Err(IndexError::Response { status: status.as_u16(), body })
      }
    }
  }

  async fn create_index(&self, name: &str) -> Result<(), IndexError> {
    let url = format!("{}/{}", self.host, name);
    let resp = self.authed(self.http.put(&url).json(&projects_mapping())).send().await?;
    Self::ensure_success(resp).await?;
    Ok(())
  }

  async fn upsert_document(&self, index: &str, doc: &ProjectDocument) -> Result<(), IndexError> {
    // refresh=true buys read-after-write on the upsert path only
    let url = format!("{}/{}/_doc/{}?refresh=true", self.host, index, doc.id);
    let resp = self.authed(self.http.put(&url).json(doc)).send().await?;
    Self::ensure_success(resp).await?;
    Ok(())
  }

  async fn add_hashtag(
    &self,
    index: &str,
    project_id: i64,
    hashtag: &str,
  ) -> Result<(), IndexError> {
    self.run_update_script(index, project_id, hashtag_update_body(hashtag)).await
  }

  async fn add_user(
    &self,
    index: &str,
    project_id: i64,
    user: &UserRecord,
  ) -> Result<(), IndexError> {
    self.run_update_script(index, project_id, user_update_body(user)).await
  }

  async fn delete_index(&self, name: &str) -> Result<(), IndexError> {
    let url = format!("{}/{}", self.host, name);
    let resp = self.authed(self.http.delete(&url)).send().await?;
    Self::ensure_success(resp).await?;
    Ok(())
  }
}
