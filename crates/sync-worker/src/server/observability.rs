use std::{
  convert::Infallible,
  io::{Error, ErrorKind},
  sync::Arc,
};

use foldsync_config::Settings;
use foldsync_result::errors::{BoxedErr, ErrorType, InternalError};
use http_body_util::Full;
use hyper::{
  body::{Bytes, Incoming},
  server::conn::http1::Builder,
  service::service_fn,
  Request, Response, StatusCode,
};
use hyper_util::rt::tokio::TokioIo;
use opentelemetry::{
  metrics::{Counter, Histogram, MeterProvider as _},
  KeyValue,
};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::{Registry, TextEncoder};
use tokio::{net::TcpListener, spawn};

/// OpenTelemetry + Prometheus metrics collector for the Sync Worker service
pub struct MetricsCollector {
  config: Arc<Settings>,
  registry: Arc<Registry>,
  _provider: Arc<SdkMeterProvider>,

  envelopes_processed: Counter<u64>,
  envelopes_failed: Counter<u64>,
  decode_errors: Counter<u64>,
  unknown_triggers: Counter<u64>,
  attach_retries: Counter<u64>,
  sync_duration: Histogram<f64>,
}

impl std::fmt::Debug for MetricsCollector {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("MetricsCollector").finish()
  }
}

pub struct MetricsCollectorArgs {
  pub config: Arc<Settings>,
}

impl MetricsCollector {
  pub fn new(args: MetricsCollectorArgs) -> Result<Self, BoxedErr> {
    let ie = |msg: &str, err: BoxedErr| {
      let path = "sync-worker.server.observability".into();
      InternalError { err_type: ErrorType::InternalError, temp: false, err, msg: msg.into(), path }
    };

    // Initialize Prometheus registry
    let registry = Registry::new();

    // Create OpenTelemetry Prometheus exporter
    let exporter = opentelemetry_prometheus::exporter()
      .with_registry(registry.clone())
      .build()
      .map_err(|err| ie("failed to initialize prometheus exporter", Box::new(err)))?;

    // Create meter provider with Prometheus exporter
    let provider = SdkMeterProvider::builder().with_reader(exporter).build();
    let meter = provider.meter("sync-worker");
    let provider = Arc::new(provider);

    let envelopes_processed = meter
      .u64_counter("foldsync_envelopes_processed")
      .with_description("Change envelopes synced to the index, by table")
      .build();
    let envelopes_failed = meter
      .u64_counter("foldsync_envelopes_failed")
      .with_description("Change envelopes dropped after a sync failure, by table")
      .build();
    let decode_errors = meter
      .u64_counter("foldsync_envelope_decode_errors")
      .with_description("Notifications dropped because the envelope did not decode")
      .build();
    let unknown_triggers = meter
      .u64_counter("foldsync_unknown_triggers")
      .with_description("Envelopes dropped for carrying an unrecognized trigger")
      .build();
    let attach_retries = meter
      .u64_counter("foldsync_attach_retries")
      .with_description("Attach events retried while waiting for their project upsert")
      .build();
    let sync_duration = meter
      .f64_histogram("foldsync_sync_duration_seconds")
      .with_description("End-to-end handling time of one envelope, by table")
      .build();

    Ok(MetricsCollector {
      registry: Arc::new(registry),
      config: args.config,
      _provider: provider,
      envelopes_processed,
      envelopes_failed,
      decode_errors,
      unknown_triggers,
      attach_retries,
      sync_duration,
    })
  }

  pub fn record_envelope_processed(&self, table: &'static str) {
    self.envelopes_processed.add(1, &[KeyValue::new("table", table)]);
  }

  pub fn record_envelope_failed(&self, table: &'static str) {
    self.envelopes_failed.add(1, &[KeyValue::new("table", table)]);
  }

  pub fn record_decode_error(&self) {
    self.decode_errors.add(1, &[]);
  }

  pub fn record_unknown_trigger(&self) {
    self.unknown_triggers.add(1, &[]);
  }

  pub fn record_attach_retry(&self, table: &'static str) {
    self.attach_retries.add(1, &[KeyValue::new("table", table)]);
  }

  pub fn observe_sync_duration(&self, table: &'static str, seconds: f64) {
    self.sync_duration.record(seconds, &[KeyValue::new("table", table)]);
  }

  #[cfg(test)]
  pub(crate) fn registry(&self) -> &Registry {
    &self.registry
  }

  /// Start HTTP server to expose metrics for Prometheus
  pub async fn run(&self) -> Result<(), BoxedErr> {
    let url = self.config.hosts.sync_metrics.clone();

    let listener = TcpListener::bind(&url).await?;
    let addr = listener.local_addr()?;
    tracing::info!("Sync worker metrics server listening on {}", addr);

    loop {
      let (socket, _) = listener.accept().await?;
      let io = TokioIo::new(socket);

      let connection_registry = self.registry.clone();

      spawn(async move {
        let svc = service_fn(move |req: Request<Incoming>| {
          let request_registry = connection_registry.clone();

          async move {
            let path = req.uri().path();
            match path {
              "/metrics" => {
                let encoder = TextEncoder::new();
                let body = encoder
                  .encode_to_string(&request_registry.gather())
                  .map_err(|e| Box::new(Error::new(ErrorKind::Other, e)))
                  .unwrap_or_default();
                Ok::<_, Infallible>(
                  Response::builder()
                    .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                    .body(Full::new(Bytes::from(body)))
                    .unwrap(),
                )
              }
              "/health" => Ok(Response::new(Full::new(Bytes::from_static(b"OK")))),
              _ => Ok(
                Response::builder()
                  .status(StatusCode::NOT_FOUND)
                  .body(Full::new(Bytes::from_static(b"Not Found")))
                  .unwrap(),
              ),
            }
          }
        });

        if let Err(err) = Builder::new().serve_connection(io, svc).await {
          tracing::error!("Error serving metrics: {}", err);
        }
      });
    }
  }
}
