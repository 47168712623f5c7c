use std::sync::Arc;

use foldsync_config::{config, Settings};
use foldsync_result::errors::{BoxedErr, ErrorType, SimpleError};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::spawn;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

use crate::{
  controller::{SyncWorkerController, SyncWorkerControllerArgs},
  index::{ElasticsearchIndex, IndexClient},
  server::{
    observability::{MetricsCollector, MetricsCollectorArgs},
    triggers::install_change_triggers,
  },
};

pub mod observability;
pub mod triggers;

pub struct SyncWorkerServer {
  pub(super) pool: PgPool,
  pub(super) config: Arc<Settings>,
  pub(super) metrics: Arc<MetricsCollector>,
  pub(super) index: Arc<dyn IndexClient>,
}

impl SyncWorkerServer {
  pub async fn new() -> Result<SyncWorkerServer, BoxedErr> {
    let se = |err: BoxedErr, typ: ErrorType, msg: &str| {
      return SimpleError { err, err_type: typ, message: msg.to_string() };
    };

    SyncWorkerServer::setup_logging();
    let config = config().await;
    config.preflight_checks();

    // Initialize observability
    let metrics = MetricsCollector::new(MetricsCollectorArgs { config: Arc::new(config.clone()) })?;

    let pool = PgPoolOptions::new()
      .max_connections(5)
      .connect(&config.database.postgres)
      .await
      .map_err(|err| {
        se(Box::new(err), ErrorType::DBConnectionError, "failed to connect to postgres")
      })?;

    let index: Arc<dyn IndexClient> = Arc::new(ElasticsearchIndex::new(&config.search)?);

    let server = SyncWorkerServer {
      pool,
      config: Arc::new(config),
      metrics: Arc::new(metrics),
      index,
    };

    Ok(server)
  }

  /// Provision the emitter and index, then run the pipeline until shutdown
  pub async fn run(&self) -> Result<(), BoxedErr> {
    if self.config.worker.install_triggers {
      install_change_triggers(&self.pool, &self.config.worker.channel).await?;
    }
    self.ensure_index().await?;

    let metrics_clone = self.metrics.clone();
    spawn(async move {
      if let Err(e) = metrics_clone.run().await {
        error!("Metrics server failed: {:?}", e);
      }
    });

    let ctr_args = SyncWorkerControllerArgs {
      pool: self.pool.clone(),
      config: self.config.clone(),
      metrics: self.metrics.clone(),
      index: self.index.clone(),
    };

    let controller = SyncWorkerController::new(ctr_args);
    controller.run().await?; // this will block

    Ok(())
  }

  async fn ensure_index(&self) -> Result<(), BoxedErr> {
    let name = &self.config.search.index_projects;

    if self.index.index_exists(name).await? {
      info!("Index {} already exists.", name);
    } else {
      self.index.create_index(name).await?;
      info!("Index {} created.", name);
    }

    Ok(())
  }

  fn setup_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber =
      tracing_subscriber::registry().with(env_filter).with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
  }
}
