use tokio::{signal::ctrl_c, spawn, sync::Notify};
use tracing::{error, info};

use super::SyncWorkerController;

impl SyncWorkerController {
  /// Start listening for shutdown signal (Ctrl+C).
  ///
  /// Processing is inline in the notification loop, so the loop observes the
  /// signal only between envelopes; an in-flight mutation always completes
  /// or fails before exit.
  pub(super) fn shutdown_listener(&self) {
    let shutdown_notify = self.shutdown_notify.clone();

    spawn(async move {
      if let Err(err) = ctrl_c().await {
        error!("Error waiting for ctrl_c: {}", err);
        return;
      }

      info!("Shutdown signal received (Ctrl+C). Closing the change subscription...");
      request_shutdown(&shutdown_notify);
    });
  }
}

/// Signal the notification loop to stop.
///
/// `notify_one` stores a wakeup permit, so the request still lands when the
/// loop is busy awaiting an envelope's index mutation and nobody is parked
/// on `notified()` at the moment the signal fires.
pub(super) fn request_shutdown(notify: &Notify) {
  notify.notify_one();
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use tokio::{select, time::sleep};

  use super::*;

  #[tokio::test(start_paused = true)]
  async fn shutdown_request_lands_while_the_loop_is_mid_envelope() {
    let notify = Notify::new();

    // The signal fires while no task is parked on notified(), exactly as
    // when the loop is awaiting an attach retry backoff inline
    request_shutdown(&notify);
    sleep(Duration::from_millis(300)).await;

    let observed = select! {
      _ = notify.notified() => true,
      _ = sleep(Duration::from_secs(5)) => false,
    };
    assert!(observed, "shutdown request must survive until the loop waits again");
  }
}
