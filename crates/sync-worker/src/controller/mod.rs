use std::sync::Arc;

use foldsync_config::Settings;
use foldsync_result::errors::BoxedErr;
use sqlx::PgPool;
use tokio::sync::Notify;

use crate::{index::IndexClient, server::observability::MetricsCollector};

pub mod attachment_sync;
pub mod dispatcher;
pub mod listener;
pub mod project_sync;
pub mod shutdown;

pub struct SyncWorkerControllerArgs {
  pub(super) pool: PgPool,
  pub(super) config: Arc<Settings>,
  pub(super) metrics: Arc<MetricsCollector>,
  pub(super) index: Arc<dyn IndexClient>,
}

pub(crate) struct SyncWorkerController {
  pub(super) pool: PgPool,
  pub(super) config: Arc<Settings>,
  pub(super) metrics: Arc<MetricsCollector>,
  pub(super) index: Arc<dyn IndexClient>,
  pub(super) shutdown_notify: Arc<Notify>,
}

impl SyncWorkerController {
  pub fn new(args: SyncWorkerControllerArgs) -> SyncWorkerController {
    SyncWorkerController {
      pool: args.pool,
      config: args.config,
      metrics: args.metrics,
      index: args.index,
      shutdown_notify: Arc::new(Notify::new()),
    }
  }

  // run the worker service
  pub async fn run(self) -> Result<(), BoxedErr> {
    self.shutdown_listener();
    self.listen_loop().await
  }
}
