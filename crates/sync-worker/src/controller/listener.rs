use std::time::{Duration, Instant};

use foldsync_result::errors::{BoxedErr, ErrorType, SimpleError};
use sqlx::postgres::PgListener;
use tokio::{select, time::sleep};
use tracing::{debug, error, info, warn};

use crate::{controller::dispatcher::dispatch_envelope, models::envelope::ChangeEnvelope};

use super::SyncWorkerController;

impl SyncWorkerController {
  /// Subscribe to the change channel and feed every notification through the
  /// single decode-and-dispatch path.
  ///
  /// Envelopes are processed inline, strictly one at a time: attach events
  /// mutate a shared document by project id, and sequencing here is what
  /// keeps two envelopes for the same id from racing each other.
  pub(super) async fn listen_loop(&self) -> Result<(), BoxedErr> {
    let se = |err: BoxedErr, typ: ErrorType, msg: &str| {
      return SimpleError { err, err_type: typ, message: msg.to_string() };
    };

    let channel = self.config.worker.channel.clone();

    // No pipeline without the subscription; both failures here are fatal
    let mut listener = PgListener::connect_with(&self.pool)
      .await
      .map_err(|err| se(Box::new(err), ErrorType::Connection, "failed to open listen connection"))?;
    listener
      .listen(&channel)
      .await
      .map_err(|err| se(Box::new(err), ErrorType::Connection, "failed to subscribe to channel"))?;

    info!("Listening for change notifications on '{}'", channel);

    loop {
      select! {
        _ = self.shutdown_notify.notified() => {
          info!("Shutdown requested - breaking notification loop.");
          break;
        }
        maybe_msg = listener.try_recv() => {
          match maybe_msg {
            Err(e) => {
              error!("Notification receive error: {}", e);
              sleep(Duration::from_secs(1)).await;
            }
            Ok(None) => {
              // The transport reconnected and re-subscribed on its own.
              // Notifications published during the gap are gone; the next
              // live one resumes the stream.
              warn!("Listen connection dropped and was re-established; resuming from live notifications.");
            }
            Ok(Some(notification)) => {
              self.handle_notification(notification.payload()).await;
            }
          }
        }
      }
    }

    Ok(())
  }

  /// Decode one envelope and dispatch it. Every failure mode here consumes
  /// the envelope: decode errors and sync errors are logged and dropped so
  /// the loop keeps going.
  pub(super) async fn handle_notification(&self, payload: &str) {
    let envelope: ChangeEnvelope = match serde_json::from_str(payload) {
      Ok(envelope) => envelope,
      Err(err) => {
        error!("Dropping undecodable change envelope: {}", err);
        debug!("Raw envelope payload: {}", payload);
        self.metrics.record_decode_error();
        return;
      }
    };

    let table = envelope.trigger_name.table_name();
    let start = Instant::now();

    let result =
      dispatch_envelope(envelope, self.index.as_ref(), &self.config, &self.metrics).await;

    match result {
      Ok(()) => self.metrics.record_envelope_processed(table),
      Err(err) => {
        error!("Sync failed for '{}' envelope: {}", table, err);
        self.metrics.record_envelope_failed(table);
      }
    }

    self.metrics.observe_sync_duration(table, start.elapsed().as_secs_f64());
  }
}
