/* src/client/core/rust/src/error.rs */

use thiserror::Error;

/// Why a navigation did not commit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavigationError {
  #[error("Navigation was cancelled by a before_navigate callback")]
  Cancelled,

  #[error("Navigation was superseded by a newer navigation")]
  Superseded,

  #[error("Navigation aborted: {0}")]
  Aborted(String),

  #[error("Redirect loop: more than {0} redirects")]
  TooManyRedirects(usize),

  /// The document is being replaced by a full page load.
  #[error("Navigation to {0} left the app")]
  Unloaded(String),

  #[error("{0} is not handled by this app")]
  External(String),

  #[error("Invalid navigation target {url}: {reason}")]
  InvalidUrl { url: String, reason: String },

  #[error("Client is not hydrated yet")]
  NotHydrated,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_too_many_redirects() {
    assert_eq!(NavigationError::TooManyRedirects(20).to_string(), "Redirect loop: more than 20 redirects");
  }

  #[test]
  fn display_unloaded() {
    let err = NavigationError::Unloaded("https://elsewhere.dev/".into());
    assert_eq!(err.to_string(), "Navigation to https://elsewhere.dev/ left the app");
  }
}
