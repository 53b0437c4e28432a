/* src/kit/core/rust/src/control.rs */

// Structured control values. Loads return them through `LoadError` instead of
// unwinding, so a redirect raised three layouts deep reaches the resolver
// untouched by any generic error handling in between.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::KitError;

/// `App.Error`-shaped body: always a JSON object carrying `message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorBody(Value);

impl ErrorBody {
  pub fn message(msg: impl Into<String>) -> Self {
    Self(serde_json::json!({ "message": msg.into() }))
  }

  pub fn as_value(&self) -> &Value {
    &self.0
  }

  pub fn into_value(self) -> Value {
    self.0
  }

  pub fn message_str(&self) -> &str {
    self.0.get("message").and_then(Value::as_str).unwrap_or_default()
  }
}

impl From<&str> for ErrorBody {
  fn from(msg: &str) -> Self {
    Self::message(msg)
  }
}

impl From<String> for ErrorBody {
  fn from(msg: String) -> Self {
    Self::message(msg)
  }
}

impl From<Value> for ErrorBody {
  fn from(value: Value) -> Self {
    match value {
      Value::Object(_) => Self(value),
      Value::String(s) => Self::message(s),
      other => Self::message(other.to_string()),
    }
  }
}

/// An expected HTTP error. Renders the nearest error page with `status` and
/// never reaches `handle_error`.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpError {
  pub status: u16,
  pub body: ErrorBody,
}

impl HttpError {
  /// Default body is `{"message": "Error: <status>"}`. Status is not validated;
  /// use [`error`] for user-facing construction.
  pub fn new(status: u16) -> Self {
    Self { status, body: ErrorBody::message(format!("Error: {status}")) }
  }

  pub fn not_found(path: &str) -> Self {
    Self { status: 404, body: ErrorBody::message(format!("Not found: {path}")) }
  }
}

impl fmt::Display for HttpError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.status, self.body.message_str())
  }
}

/// A redirect raised from a load, action or hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
  pub status: u16,
  pub location: String,
}

impl fmt::Display for Redirect {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} -> {}", self.status, self.location)
  }
}

/// A validation failure returned (not raised) from a form action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionFailure {
  pub status: u16,
  pub data: Option<Value>,
}

/// Build an [`HttpError`]. Fails when `status` is outside 400..=599.
pub fn error(status: u16, body: impl Into<ErrorBody>) -> Result<HttpError, KitError> {
  if !(400..=599).contains(&status) {
    return Err(KitError::InvalidErrorStatus(status));
  }
  Ok(HttpError { status, body: body.into() })
}

/// Build a [`Redirect`]. Fails when `status` is outside 300..=308.
pub fn redirect(status: u16, location: impl Into<String>) -> Result<Redirect, KitError> {
  if !(300..=308).contains(&status) {
    return Err(KitError::InvalidRedirectStatus(status));
  }
  Ok(Redirect { status, location: location.into() })
}

pub fn fail(status: u16, data: Option<Value>) -> ActionFailure {
  ActionFailure { status, data }
}

/// Anything raised that is neither an [`HttpError`] nor a [`Redirect`].
#[derive(Clone)]
pub struct Unexpected {
  pub message: String,
  /// Status the error asked for, if any. Defaults to 500 when rendered.
  pub status: Option<u16>,
  pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Unexpected {
  pub fn status(&self) -> u16 {
    self.status.unwrap_or(500)
  }
}

impl fmt::Debug for Unexpected {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Unexpected")
      .field("message", &self.message)
      .field("status", &self.status)
      .finish_non_exhaustive()
  }
}

/// Outcome of a failed load, action or endpoint.
#[derive(Debug, Clone)]
pub enum LoadError {
  Http(HttpError),
  Redirect(Redirect),
  Unexpected(Unexpected),
}

impl LoadError {
  pub fn unexpected(err: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Unexpected(Unexpected { message: err.to_string(), status: None, source: Some(Arc::new(err)) })
  }

  pub fn message(msg: impl Into<String>) -> Self {
    Self::Unexpected(Unexpected { message: msg.into(), status: None, source: None })
  }

  pub fn status(&self) -> u16 {
    match self {
      Self::Http(e) => e.status,
      Self::Redirect(r) => r.status,
      Self::Unexpected(u) => u.status(),
    }
  }
}

impl fmt::Display for LoadError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Http(e) => write!(f, "{e}"),
      Self::Redirect(r) => write!(f, "redirect {r}"),
      Self::Unexpected(u) => f.write_str(&u.message),
    }
  }
}

impl std::error::Error for LoadError {}

impl From<HttpError> for LoadError {
  fn from(err: HttpError) -> Self {
    Self::Http(err)
  }
}

impl From<Redirect> for LoadError {
  fn from(r: Redirect) -> Self {
    Self::Redirect(r)
  }
}

impl From<KitError> for LoadError {
  fn from(err: KitError) -> Self {
    Self::unexpected(err)
  }
}

impl From<serde_json::Error> for LoadError {
  fn from(err: serde_json::Error) -> Self {
    Self::unexpected(err)
  }
}
