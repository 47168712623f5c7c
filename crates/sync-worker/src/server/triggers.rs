use foldsync_result::errors::{BoxedErr, ErrorType, InternalError};
use sqlx::PgPool;
use tracing::info;

/// One emitter trigger: its function name, the relation it watches, and the
/// plpgsql body that publishes the change envelope from inside the mutating
/// transaction.
struct TriggerDef {
  name: &'static str,
  table: &'static str,
  function_sql: String,
}

fn trigger_defs(channel: &str) -> Vec<TriggerDef> {
  vec![
    TriggerDef {
      name: "projects_data_changes",
      table: "projects",
      function_sql: format!(
        r#"
        CREATE OR REPLACE FUNCTION projects_data_changes()
        RETURNS TRIGGER AS $$
        BEGIN
          PERFORM pg_notify('{channel}', json_build_object(
            'trigger_name', 'projects_data_changes',
            'table_name', TG_TABLE_NAME,
            'entry', row_to_json(NEW)
          )::text);
          RETURN NEW;
        END;
        $$ LANGUAGE plpgsql;
        "#
      ),
    },
    TriggerDef {
      name: "project_hashtags_data_changes",
      table: "project_hashtags",
      function_sql: format!(
        r#"
        CREATE OR REPLACE FUNCTION project_hashtags_data_changes()
        RETURNS TRIGGER AS $$
        DECLARE
          hashtag_name TEXT;
        BEGIN
          SELECT h.name INTO hashtag_name FROM hashtags h WHERE h.id = NEW.hashtag_id;
          PERFORM pg_notify('{channel}', json_build_object(
            'trigger_name', 'project_hashtags_data_changes',
            'table_name', TG_TABLE_NAME,
            'entry', json_build_object(
              'project_id', NEW.project_id,
              'hashtag_name', hashtag_name
            )
          )::text);
          RETURN NEW;
        END;
        $$ LANGUAGE plpgsql;
        "#
      ),
    },
    TriggerDef {
      name: "users_projects_data_changes",
      table: "users_projects",
      function_sql: format!(
        r#"
        CREATE OR REPLACE FUNCTION users_projects_data_changes()
        RETURNS TRIGGER AS $$
        DECLARE
          user_info JSONB;
        BEGIN
          SELECT row_to_json(u) INTO user_info FROM users u WHERE u.id = NEW.user_id;
          PERFORM pg_notify('{channel}', json_build_object(
            'trigger_name', 'users_projects_data_changes',
            'table_name', TG_TABLE_NAME,
            'entry', json_build_object(
              'project_id', NEW.project_id,
              'user', user_info
            )
          )::text);
          RETURN NEW;
        END;
        $$ LANGUAGE plpgsql;
        "#
      ),
    },
  ]
}

/// Provision the change-emitter side of the pipeline: one `pg_notify` trigger
/// per watched relation, publishing exactly one envelope per row mutation
/// from inside the mutating transaction. Idempotent across restarts.
pub async fn install_change_triggers(pool: &PgPool, channel: &str) -> Result<(), BoxedErr> {
  let ie = |err: BoxedErr, msg: &str| {
    let path = "sync-worker.server.triggers".into();
    let err_type = ErrorType::DBInsertError;
    return InternalError { err_type, temp: false, err, msg: msg.into(), path };
  };

  for def in trigger_defs(channel) {
    // Replacing the function unconditionally keeps an already-installed
    // emitter publishing on the configured channel; only the trigger
    // attachment itself needs the existence guard
    sqlx::query(&def.function_sql)
      .execute(pool)
      .await
      .map_err(|err| Box::new(ie(Box::new(err), "failed to create trigger function")))?;

    let exists: bool =
      sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_trigger WHERE tgname = $1)")
        .bind(def.name)
        .fetch_one(pool)
        .await
        .map_err(|err| Box::new(ie(Box::new(err), "failed to check trigger existence")))?;

    if exists {
      continue;
    }

    // Trigger and function names are compile-time constants, never user input
    let attach_sql = format!(
      "CREATE TRIGGER {name} AFTER INSERT OR UPDATE ON {table} FOR EACH ROW EXECUTE FUNCTION {name}();",
      name = def.name,
      table = def.table,
    );
    sqlx::query(&attach_sql)
      .execute(pool)
      .await
      .map_err(|err| Box::new(ie(Box::new(err), "failed to attach trigger")))?;

    info!("Installed change trigger '{}' on '{}'", def.name, def.table);
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn trigger_functions_publish_on_the_configured_channel() {
    for def in trigger_defs("data_changes") {
      assert!(def.function_sql.contains("pg_notify('data_changes'"));
      assert!(def.function_sql.contains(&format!("'trigger_name', '{}'", def.name)));
    }
  }

  #[test]
  fn trigger_functions_are_replaceable_after_a_channel_change() {
    // The install path re-runs these unconditionally, so they must be
    // OR REPLACE and carry the newly configured channel
    for def in trigger_defs("data_changes_v2") {
      assert!(def.function_sql.contains("CREATE OR REPLACE FUNCTION"));
      assert!(def.function_sql.contains("pg_notify('data_changes_v2'"));
    }
  }
}
