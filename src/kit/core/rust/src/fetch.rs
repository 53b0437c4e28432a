/* src/kit/core/rust/src/fetch.rs */

use std::sync::Arc;

use bytes::Bytes;
use http::{Request, Response};

use crate::BoxFuture;
use crate::control::LoadError;

pub type FetchResult = Result<Response<Bytes>, LoadError>;

/// A `fetch` implementation. The server binds one per request (credentials,
/// in-process dispatch); the client supplies its own.
pub trait Fetch: Send + Sync {
  fn fetch(&self, request: Request<Bytes>) -> BoxFuture<FetchResult>;
}

impl<F> Fetch for F
where
  F: Fn(Request<Bytes>) -> BoxFuture<FetchResult> + Send + Sync,
{
  fn fetch(&self, request: Request<Bytes>) -> BoxFuture<FetchResult> {
    self(request)
  }
}

/// Used where no fetch was configured; every call fails.
pub struct NoFetch;

impl Fetch for NoFetch {
  fn fetch(&self, request: Request<Bytes>) -> BoxFuture<FetchResult> {
    let uri = request.uri().to_string();
    Box::pin(async move { Err(LoadError::message(format!("fetch is unavailable here: {uri}"))) })
  }
}

pub fn no_fetch() -> Arc<dyn Fetch> {
  Arc::new(NoFetch)
}

/// `GET` request with an empty body.
pub fn get(uri: &str) -> Result<Request<Bytes>, LoadError> {
  Request::get(uri).body(Bytes::new()).map_err(LoadError::unexpected)
}

/// Parse a response body as JSON, failing with the body text on non-2xx.
pub fn response_json(response: &Response<Bytes>) -> Result<serde_json::Value, LoadError> {
  if !response.status().is_success() {
    return Err(LoadError::message(format!(
      "fetch failed with {}: {}",
      response.status(),
      String::from_utf8_lossy(response.body())
    )));
  }
  Ok(serde_json::from_slice(response.body())?)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn closures_implement_fetch() {
    let fetch: Arc<dyn Fetch> = Arc::new(|req: Request<Bytes>| -> BoxFuture<FetchResult> {
      let path = req.uri().path().to_string();
      Box::pin(async move { Ok(Response::new(Bytes::from(format!("{{\"path\":\"{path}\"}}")))) })
    });
    let res = fetch.fetch(get("/api/x").unwrap()).await.unwrap();
    assert_eq!(response_json(&res).unwrap(), serde_json::json!({ "path": "/api/x" }));
  }

  #[tokio::test]
  async fn no_fetch_fails() {
    let err = no_fetch().fetch(get("/x").unwrap()).await.unwrap_err();
    assert!(err.to_string().contains("/x"));
  }

  #[test]
  fn non_success_is_an_error() {
    let mut res = Response::new(Bytes::from_static(b"nope"));
    *res.status_mut() = http::StatusCode::BAD_GATEWAY;
    assert!(response_json(&res).is_err());
  }
}
