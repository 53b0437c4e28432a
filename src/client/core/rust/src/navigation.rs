/* src/client/core/rust/src/navigation.rs */

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_channel::oneshot;
use futures_util::future::{self, Shared};
use trellis_kit::{BoxFuture, LoadError, Params};
use url::Url;

use crate::error::NavigationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationType {
  /// Initial hydration.
  Enter,
  Form,
  /// The tab is closing or the user typed another address.
  Leave,
  Link,
  Goto,
  Popstate,
}

impl fmt::Display for NavigationType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Enter => "enter",
      Self::Form => "form",
      Self::Leave => "leave",
      Self::Link => "link",
      Self::Goto => "goto",
      Self::Popstate => "popstate",
    })
  }
}

/// One end of a navigation. `route_id` is `None` outside the app's routes.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationTarget {
  pub url: Url,
  pub route_id: Option<String>,
  pub params: Params,
}

#[derive(Debug, Clone)]
pub struct Navigation {
  /// `None` on `enter`.
  pub from: Option<NavigationTarget>,
  /// `None` on `leave`.
  pub to: Option<NavigationTarget>,
  pub kind: NavigationType,
  /// The document will be replaced rather than updated in place.
  pub will_unload: bool,
  /// History steps for `popstate`.
  pub delta: Option<i64>,
  /// Settles when this navigation finishes.
  pub complete: Completion,
}

type Outcome = Result<(), NavigationError>;

/// How a navigation ended. Resolves once the new page is shown and fails
/// on cancellation or error. A navigation that replaces the document never
/// settles.
#[derive(Clone)]
pub struct Completion(Shared<BoxFuture<Outcome>>);

impl Completion {
  pub async fn wait(&self) -> Outcome {
    self.0.clone().await
  }
}

impl fmt::Debug for Completion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("Completion")
  }
}

/// The engine's end of a [`Completion`]. Dropping it unsettled leaves the
/// completion pending forever.
pub(crate) struct Settle(oneshot::Sender<Outcome>);

impl Settle {
  pub(crate) fn settle(self, outcome: Outcome) {
    let _ = self.0.send(outcome);
  }
}

pub(crate) fn completion() -> (Settle, Completion) {
  let (tx, rx) = oneshot::channel();
  let fut: BoxFuture<Outcome> = Box::pin(async move {
    match rx.await {
      Ok(outcome) => outcome,
      Err(_) => future::pending().await,
    }
  });
  (Settle(tx), Completion(fut.shared()))
}

/// What `before_navigate` callbacks see. Cancelling does not stop the
/// remaining callbacks from running.
pub struct BeforeNavigate {
  navigation: Navigation,
  cancelled: Cell<bool>,
}

impl BeforeNavigate {
  pub(crate) fn new(navigation: Navigation) -> Self {
    Self { navigation, cancelled: Cell::new(false) }
  }

  pub fn navigation(&self) -> &Navigation {
    &self.navigation
  }

  pub fn cancel(&self) {
    self.cancelled.set(true);
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled.get()
  }
}

/// Runs after the UI for a navigation has committed.
pub type Cleanup = Box<dyn FnOnce() + Send>;

pub type BeforeNavigateFn = Arc<dyn Fn(&BeforeNavigate) + Send + Sync>;
pub type OnNavigateFn = Arc<dyn Fn(Navigation) -> BoxFuture<Result<Option<Cleanup>, LoadError>> + Send + Sync>;
pub type AfterNavigateFn = Arc<dyn Fn(&Navigation) + Send + Sync>;

/// Returned by the callback registrations; pass to [`crate::Client::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(pub(crate) u64);

/// Registered navigation callbacks, each list in registration order.
#[derive(Default)]
pub(crate) struct Callbacks {
  next_id: u64,
  pub(crate) before: Vec<(CallbackId, BeforeNavigateFn)>,
  pub(crate) on: Vec<(CallbackId, OnNavigateFn)>,
  pub(crate) after: Vec<(CallbackId, AfterNavigateFn)>,
}

impl Callbacks {
  pub(crate) fn next_id(&mut self) -> CallbackId {
    self.next_id += 1;
    CallbackId(self.next_id)
  }

  pub(crate) fn remove(&mut self, id: CallbackId) {
    self.before.retain(|(i, _)| *i != id);
    self.on.retain(|(i, _)| *i != id);
    self.after.retain(|(i, _)| *i != id);
  }
}

/// Run every `before_navigate` callback; `true` when any of them cancelled.
pub(crate) fn run_before(callbacks: &[BeforeNavigateFn], navigation: &Navigation) -> bool {
  let event = BeforeNavigate::new(navigation.clone());
  for callback in callbacks {
    callback(&event);
  }
  event.is_cancelled()
}
