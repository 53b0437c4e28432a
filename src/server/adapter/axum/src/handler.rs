/* src/server/adapter/axum/src/handler.rs */

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::response::Response;
use trellis_server::{RespondOptions, Server};

use crate::error::AxumError;

pub(crate) struct AppState {
  pub server: Server,
  pub body_limit: usize,
}

/// Every path goes through the server's own routing; axum only buffers the
/// body and forwards the peer address.
pub(crate) async fn handle(State(state): State<Arc<AppState>>, request: Request) -> Result<Response, AxumError> {
  let (mut parts, body) = request.into_parts();
  // The extractor also honours `MockConnectInfo`.
  let client_address =
    ConnectInfo::<SocketAddr>::from_request_parts(&mut parts, &state).await.ok().map(|ConnectInfo(addr)| addr);
  let body = axum::body::to_bytes(body, state.body_limit)
    .await
    .map_err(|e| AxumError::from_body(e, state.body_limit))?;

  let options = RespondOptions { client_address, ..RespondOptions::default() };
  let response = state.server.respond(axum::http::Request::from_parts(parts, body), options).await;
  Ok(response.map(Body::from))
}
