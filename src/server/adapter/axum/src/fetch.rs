/* src/server/adapter/axum/src/fetch.rs */

use bytes::Bytes;
use trellis_server::trellis_kit::fetch::{Fetch, FetchResult};
use trellis_server::trellis_kit::{BoxFuture, LoadError};

/// External `fetch` for server loads, backed by a shared `reqwest` client.
/// Same-origin requests never get here; the server dispatches them in-process.
#[derive(Clone, Default)]
pub struct ReqwestFetch {
  client: reqwest::Client,
}

impl ReqwestFetch {
  pub fn new(client: reqwest::Client) -> Self {
    Self { client }
  }
}

impl Fetch for ReqwestFetch {
  fn fetch(&self, request: axum::http::Request<Bytes>) -> BoxFuture<FetchResult> {
    let client = self.client.clone();
    Box::pin(async move {
      let request = reqwest::Request::try_from(request).map_err(LoadError::unexpected)?;
      tracing::debug!(method = %request.method(), url = %request.url(), "external fetch");
      let response = client.execute(request).await.map_err(LoadError::unexpected)?;

      let mut builder = axum::http::Response::builder().status(response.status()).version(response.version());
      if let Some(headers) = builder.headers_mut() {
        headers.extend(response.headers().clone());
      }
      let body = response.bytes().await.map_err(LoadError::unexpected)?;
      builder.body(body).map_err(LoadError::unexpected)
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn connection_failures_become_load_errors() {
    let fetch = ReqwestFetch::default();
    let request = axum::http::Request::get("http://127.0.0.1:9/unreachable").body(Bytes::new()).unwrap();
    let err = fetch.fetch(request).await.unwrap_err();
    assert!(!err.to_string().is_empty());
  }
}
