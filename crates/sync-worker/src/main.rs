use foldsync_result::errors::BoxedErr;
use foldsync_sync_worker::server::SyncWorkerServer;

#[tokio::main]
async fn main() -> Result<(), BoxedErr> {
  let server = SyncWorkerServer::new().await;

  match server {
    Ok(srv) => return srv.run().await,
    Err(e) => Err(e),
  }
}
