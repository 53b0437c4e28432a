/* src/kit/core/rust/src/response.rs */

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Response, StatusCode};
use serde::Serialize;

/// Status and headers for the convenience builders.
#[derive(Debug, Clone, Default)]
pub struct ResponseInit {
  pub status: StatusCode,
  pub headers: HeaderMap,
}

impl ResponseInit {
  pub fn status(status: StatusCode) -> Self {
    Self { status, headers: HeaderMap::new() }
  }
}

/// `application/json` response. Caller-supplied `content-type` and
/// `content-length` are left alone.
pub fn json<T: Serialize + ?Sized>(data: &T) -> Result<Response<Bytes>, serde_json::Error> {
  json_with(data, ResponseInit::default())
}

pub fn json_with<T: Serialize + ?Sized>(
  data: &T,
  init: ResponseInit,
) -> Result<Response<Bytes>, serde_json::Error> {
  let body = serde_json::to_vec(data)?;
  Ok(build(Bytes::from(body), "application/json", init))
}

/// `text/plain;charset=UTF-8` response.
pub fn text(body: impl Into<String>) -> Response<Bytes> {
  text_with(body, ResponseInit::default())
}

pub fn text_with(body: impl Into<String>, init: ResponseInit) -> Response<Bytes> {
  build(Bytes::from(body.into()), "text/plain;charset=UTF-8", init)
}

fn build(body: Bytes, content_type: &'static str, init: ResponseInit) -> Response<Bytes> {
  let ResponseInit { status, mut headers } = init;
  if !headers.contains_key(CONTENT_LENGTH) {
    headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
  }
  if !headers.contains_key(CONTENT_TYPE) {
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
  }
  let mut response = Response::new(body);
  *response.status_mut() = status;
  *response.headers_mut() = headers;
  response
}
