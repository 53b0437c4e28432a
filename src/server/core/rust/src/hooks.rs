/* src/server/core/rust/src/hooks.rs */

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use bytes::Bytes;
use http::{Request, Response};
use serde_json::Value;
use trellis_kit::fetch::{Fetch, FetchResult};
use trellis_kit::{BoxFuture, LoadError, RequestEvent};

pub type HandleResult = Result<Response<Bytes>, LoadError>;

type ResolveFn = Arc<dyn Fn(RequestEvent) -> BoxFuture<HandleResult> + Send + Sync>;

/// Continuation handed to a `handle` hook: matches, loads and renders `event`.
#[derive(Clone)]
pub struct Resolve(ResolveFn);

impl Resolve {
  pub fn new<F>(f: F) -> Self
  where
    F: Fn(RequestEvent) -> BoxFuture<HandleResult> + Send + Sync + 'static,
  {
    Self(Arc::new(f))
  }

  pub fn call(&self, event: RequestEvent) -> BoxFuture<HandleResult> {
    (self.0)(event)
  }
}

/// Request-modifying hook. Returning without calling `resolve` short-circuits
/// matching, loading and rendering.
pub type HandleFn = Arc<dyn Fn(RequestEvent, Resolve) -> BoxFuture<HandleResult> + Send + Sync>;

/// Turns an unexpected error into an `App.Error`-shaped body. Returning
/// `None` keeps the default `{"message": "Internal Error"}`.
pub type HandleErrorFn = Arc<dyn Fn(&LoadError, &RequestEvent) -> Option<Value> + Send + Sync>;

/// Wraps every `fetch` issued from server loads.
pub type HandleFetchFn =
  Arc<dyn Fn(RequestEvent, Request<Bytes>, Arc<dyn Fetch>) -> BoxFuture<FetchResult> + Send + Sync>;

pub fn handle_fn<F, Fut>(f: F) -> HandleFn
where
  F: Fn(RequestEvent, Resolve) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = HandleResult> + Send + 'static,
{
  Arc::new(move |event: RequestEvent, resolve: Resolve| -> BoxFuture<HandleResult> {
    Box::pin(f(event, resolve))
  })
}

/// Compose several `handle` hooks. The first runs outermost; each one's
/// `resolve` invokes the next, and the last one's invokes the real resolver.
pub fn sequence(handles: Vec<HandleFn>) -> HandleFn {
  let handles: Arc<[HandleFn]> = handles.into();
  Arc::new(move |event: RequestEvent, resolve: Resolve| -> BoxFuture<HandleResult> {
    apply(handles.clone(), 0, event, resolve)
  })
}

fn apply(handles: Arc<[HandleFn]>, index: usize, event: RequestEvent, resolve: Resolve) -> BoxFuture<HandleResult> {
  let Some(handle) = handles.get(index).cloned() else {
    return resolve.call(event);
  };
  let next = Resolve::new(move |event| apply(handles.clone(), index + 1, event, resolve.clone()));
  handle(event, next)
}

pub(crate) fn default_handle() -> HandleFn {
  Arc::new(|event: RequestEvent, resolve: Resolve| -> BoxFuture<HandleResult> { resolve.call(event) })
}

pub(crate) fn internal_error() -> Value {
  serde_json::json!({ "message": "Internal Error" })
}

/// Run `hook` for an unexpected error. A panicking hook is logged and the
/// generic body is used instead.
pub(crate) fn safe_error_body(hook: Option<&HandleErrorFn>, error: &LoadError, event: &RequestEvent) -> Value {
  let Some(hook) = hook else {
    return internal_error();
  };
  match catch_unwind(AssertUnwindSafe(|| hook(error, event))) {
    Ok(Some(body)) if body.is_object() => body,
    Ok(Some(other)) => serde_json::json!({ "message": other.to_string() }),
    Ok(None) => internal_error(),
    Err(_) => {
      tracing::error!(path = event.url().path(), "handle_error hook panicked");
      internal_error()
    }
  }
}
