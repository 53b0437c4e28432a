/* src/server/adapter/axum/src/error.rs */

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use http_body_util::LengthLimitError;

/// Failures that happen before a request reaches `Server::respond`.
#[derive(Debug)]
pub(crate) enum AxumError {
  BodyTooLarge(usize),
  Body(axum::Error),
}

impl AxumError {
  pub(crate) fn from_body(err: axum::Error, limit: usize) -> Self {
    let inner = err.into_inner();
    if inner.downcast_ref::<LengthLimitError>().is_some() {
      return Self::BodyTooLarge(limit);
    }
    Self::Body(axum::Error::new(inner))
  }

  fn status(&self) -> StatusCode {
    match self {
      Self::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
      Self::Body(_) => StatusCode::BAD_REQUEST,
    }
  }

  fn message(&self) -> String {
    match self {
      Self::BodyTooLarge(limit) => format!("Request body exceeds {limit} bytes"),
      Self::Body(err) => format!("Failed to read request body: {err}"),
    }
  }
}

impl IntoResponse for AxumError {
  fn into_response(self) -> Response {
    tracing::warn!(status = self.status().as_u16(), error = %self.message(), "rejected request");
    let body = serde_json::json!({ "message": self.message() });
    (self.status(), axum::Json(body)).into_response()
  }
}
