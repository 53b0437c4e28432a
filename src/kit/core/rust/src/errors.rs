/* src/kit/core/rust/src/errors.rs */

use thiserror::Error;

/// Configuration errors. These fail fast and are never retried: a caller
/// passed something the framework cannot act on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KitError {
  #[error("HTTP error status codes must be between 400 and 599, {0} is invalid")]
  InvalidErrorStatus(u16),

  #[error("Redirect status codes must be between 300 and 308, {0} is invalid")]
  InvalidRedirectStatus(u16),

  #[error("Missing parameter '{name}' in route {route}")]
  MissingParam { name: String, route: String },

  #[error(
    "Parameter '{name}' in route {route} cannot start or end with a slash, this would cause an invalid route like foo//bar"
  )]
  SlashInParam { name: String, route: String },

  #[error("Invalid route {route}: {reason}")]
  InvalidRouteId { route: String, reason: String },

  #[error("Route {route} references unknown matcher '{matcher}'")]
  UnknownMatcher { route: String, matcher: String },

  #[error("Route {route} references unknown node '{node}'")]
  UnknownNode { route: String, node: String },

  #[error("Duplicate route {0}")]
  DuplicateRoute(String),

  #[error("Duplicate node {0}")]
  DuplicateNode(String),

  #[error("\"{0}\" header is already set")]
  DuplicateHeader(String),

  #[error("Use `event.cookies().set(name, value, options)` instead of `set_headers` to set cookies")]
  SetCookieHeader,

  #[error("Invalid header {name}: {reason}")]
  InvalidHeader { name: String, reason: String },

  #[error("Invalid dependency {key}: {reason}")]
  InvalidDependency { key: String, reason: String },

  #[error("Data returned from `load` while rendering {route} is not a plain object")]
  InvalidLoadOutput { route: String },

  #[error("Invalid configuration: {0}")]
  Config(String),
}
