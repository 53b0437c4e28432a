/* src/server/adapter/axum/src/lib.rs */

mod error;
mod fetch;
mod handler;

use std::net::SocketAddr;
use std::sync::Arc;

use trellis_server::Server;

pub use fetch::ReqwestFetch;
/// Re-export trellis-server core for convenience
pub use trellis_server;

/// Request bodies larger than this are rejected with 413.
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Extension trait that converts a `Server` into an Axum router.
pub trait IntoAxumRouter {
  fn into_axum_router(self) -> axum::Router;
  fn into_axum_router_with_limit(self, body_limit: usize) -> axum::Router;
  fn serve(self, addr: &str) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

impl IntoAxumRouter for Server {
  fn into_axum_router(self) -> axum::Router {
    self.into_axum_router_with_limit(DEFAULT_BODY_LIMIT)
  }

  fn into_axum_router_with_limit(self, body_limit: usize) -> axum::Router {
    let state = Arc::new(handler::AppState { server: self, body_limit });
    axum::Router::new().fallback(handler::handle).with_state(state)
  }

  async fn serve(self, addr: &str) -> anyhow::Result<()> {
    let router = self.into_axum_router();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(%local_addr, "trellis server listening");
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
      .with_graceful_shutdown(shutdown_signal())
      .await?;
    tracing::info!("trellis server stopped");
    Ok(())
  }
}

async fn shutdown_signal() {
  if let Err(err) = tokio::signal::ctrl_c().await {
    tracing::error!(error = %err, "failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
}
