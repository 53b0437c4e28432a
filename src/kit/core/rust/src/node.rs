/* src/kit/core/rust/src/node.rs */

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use http::Response;
use serde_json::Value;

use crate::BoxFuture;
use crate::action::ActionOutput;
use crate::control::LoadError;
use crate::event::RequestEvent;
use crate::load::{LoadEvent, ServerLoadEvent};

/// Component rendered for an error boundary level that has no error node.
pub const DEFAULT_ERROR_COMPONENT: &str = "__default_error";

pub type LoadResult = Result<Option<Value>, LoadError>;

pub type ServerLoadFn = Arc<dyn Fn(ServerLoadEvent) -> BoxFuture<LoadResult> + Send + Sync>;
pub type UniversalLoadFn = Arc<dyn Fn(LoadEvent) -> BoxFuture<LoadResult> + Send + Sync>;
pub type ActionFn = Arc<dyn Fn(RequestEvent) -> BoxFuture<Result<ActionOutput, LoadError>> + Send + Sync>;
pub type EndpointFn =
  Arc<dyn Fn(RequestEvent) -> BoxFuture<Result<Response<Bytes>, LoadError>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prerender {
  Yes,
  No,
  Auto,
}

/// A layout, page or error component with its data functions.
#[derive(Clone)]
pub struct NodeDef {
  /// Component name handed to the renderer.
  pub component: String,
  pub server_load: Option<ServerLoadFn>,
  pub universal_load: Option<UniversalLoadFn>,
  pub actions: BTreeMap<String, ActionFn>,
  pub prerender: Option<Prerender>,
}

impl NodeDef {
  pub fn new(component: impl Into<String>) -> Self {
    Self {
      component: component.into(),
      server_load: None,
      universal_load: None,
      actions: BTreeMap::new(),
      prerender: None,
    }
  }

  pub fn server_load<F, Fut>(mut self, f: F) -> Self
  where
    F: Fn(ServerLoadEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = LoadResult> + Send + 'static,
  {
    self.server_load =
      Some(Arc::new(move |event: ServerLoadEvent| -> BoxFuture<LoadResult> { Box::pin(f(event)) }));
    self
  }

  pub fn universal_load<F, Fut>(mut self, f: F) -> Self
  where
    F: Fn(LoadEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = LoadResult> + Send + 'static,
  {
    self.universal_load =
      Some(Arc::new(move |event: LoadEvent| -> BoxFuture<LoadResult> { Box::pin(f(event)) }));
    self
  }

  /// Register a form action; `default` answers a bare `POST`.
  pub fn action<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
  where
    F: Fn(RequestEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ActionOutput, LoadError>> + Send + 'static,
  {
    let action: ActionFn = Arc::new(move |event: RequestEvent| -> BoxFuture<Result<ActionOutput, LoadError>> {
      Box::pin(f(event))
    });
    self.actions.insert(name.into(), action);
    self
  }

  pub fn prerender(mut self, prerender: Prerender) -> Self {
    self.prerender = Some(prerender);
    self
  }

  pub fn has_server_load(&self) -> bool {
    self.server_load.is_some()
  }
}

impl std::fmt::Debug for NodeDef {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("NodeDef")
      .field("component", &self.component)
      .field("server_load", &self.server_load.is_some())
      .field("universal_load", &self.universal_load.is_some())
      .field("actions", &self.actions.keys().collect::<Vec<_>>())
      .field("prerender", &self.prerender)
      .finish()
  }
}

/// `+server`-style handlers keyed by upper-case method name.
#[derive(Clone, Default)]
pub struct EndpointDef {
  pub handlers: BTreeMap<String, EndpointFn>,
  pub fallback: Option<EndpointFn>,
  pub prerender: Option<Prerender>,
}

impl EndpointDef {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn handle<F, Fut>(mut self, method: http::Method, f: F) -> Self
  where
    F: Fn(RequestEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<Bytes>, LoadError>> + Send + 'static,
  {
    self.handlers.insert(method.as_str().to_string(), endpoint_fn(f));
    self
  }

  /// Catch-all for methods without a dedicated handler.
  pub fn fallback<F, Fut>(mut self, f: F) -> Self
  where
    F: Fn(RequestEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<Bytes>, LoadError>> + Send + 'static,
  {
    self.fallback = Some(endpoint_fn(f));
    self
  }

  pub fn prerender(mut self, prerender: Prerender) -> Self {
    self.prerender = Some(prerender);
    self
  }

  /// Handler for `method`. `HEAD` falls back to `GET`, then to `fallback`.
  pub fn resolve(&self, method: &http::Method) -> Option<&EndpointFn> {
    self
      .handlers
      .get(method.as_str())
      .or_else(|| (method == http::Method::HEAD).then(|| self.handlers.get("GET")).flatten())
      .or(self.fallback.as_ref())
  }

  pub fn allowed_methods(&self) -> Vec<String> {
    let mut methods: Vec<String> = self.handlers.keys().cloned().collect();
    if self.handlers.contains_key("GET") && !self.handlers.contains_key("HEAD") {
      methods.push("HEAD".to_string());
    }
    methods.sort();
    methods
  }
}

fn endpoint_fn<F, Fut>(f: F) -> EndpointFn
where
  F: Fn(RequestEvent) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<Response<Bytes>, LoadError>> + Send + 'static,
{
  Arc::new(move |event: RequestEvent| -> BoxFuture<Result<Response<Bytes>, LoadError>> {
    Box::pin(f(event))
  })
}
