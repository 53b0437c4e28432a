/* src/server/core/rust/src/server.rs */

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{Request, Response};
use serde_json::Value;
use trellis_kit::fetch::{Fetch, FetchResult, no_fetch};
use trellis_kit::{BoxFuture, KitConfig, KitError, LoadError, Manifest, RequestEvent};

use crate::hooks::{HandleErrorFn, HandleFetchFn, HandleFn, default_handle};
use crate::render::{Renderer, ShellRenderer};

/// Per-request inputs that do not come from the HTTP request itself.
#[derive(Clone, Default)]
pub struct RespondOptions {
  pub client_address: Option<SocketAddr>,
  pub platform: Option<Arc<dyn Any + Send + Sync>>,
}

pub(crate) struct ServerInner {
  pub(crate) manifest: Manifest,
  pub(crate) config: KitConfig,
  pub(crate) renderer: Arc<dyn Renderer>,
  pub(crate) handle: HandleFn,
  pub(crate) handle_error: Option<HandleErrorFn>,
  pub(crate) handle_fetch: Option<HandleFetchFn>,
  pub(crate) external_fetch: Arc<dyn Fetch>,
}

/// Immutable app context: manifest, configuration and hooks, built once at
/// startup. Cloning shares the same context.
#[derive(Clone)]
pub struct Server {
  pub(crate) inner: Arc<ServerInner>,
}

impl Server {
  pub fn builder(manifest: Manifest) -> ServerBuilder {
    ServerBuilder {
      manifest,
      config: KitConfig::default(),
      renderer: Arc::new(ShellRenderer::default()),
      handle: None,
      handle_error: None,
      handle_fetch: None,
      external_fetch: no_fetch(),
    }
  }

  pub fn manifest(&self) -> &Manifest {
    &self.inner.manifest
  }

  pub fn config(&self) -> &KitConfig {
    &self.inner.config
  }

  /// Resolve one request. Never fails: errors become error pages, JSON error
  /// bodies or redirects.
  pub async fn respond(&self, request: Request<Bytes>, options: RespondOptions) -> Response<Bytes> {
    crate::respond::respond(self, request, options, false).await
  }

  pub(crate) fn error_body(&self, error: &LoadError, event: &RequestEvent) -> Value {
    tracing::warn!(path = event.url().path(), route = event.route_id(), %error, "unexpected error");
    crate::hooks::safe_error_body(self.inner.handle_error.as_ref(), error, event)
  }
}

pub struct ServerBuilder {
  manifest: Manifest,
  config: KitConfig,
  renderer: Arc<dyn Renderer>,
  handle: Option<HandleFn>,
  handle_error: Option<HandleErrorFn>,
  handle_fetch: Option<HandleFetchFn>,
  external_fetch: Arc<dyn Fetch>,
}

impl ServerBuilder {
  pub fn config(mut self, config: KitConfig) -> Self {
    self.config = config;
    self
  }

  pub fn renderer(mut self, renderer: impl Renderer + 'static) -> Self {
    self.renderer = Arc::new(renderer);
    self
  }

  /// Use [`crate::sequence`] to install several.
  pub fn handle(mut self, handle: HandleFn) -> Self {
    self.handle = Some(handle);
    self
  }

  pub fn handle_error<F>(mut self, f: F) -> Self
  where
    F: Fn(&LoadError, &RequestEvent) -> Option<Value> + Send + Sync + 'static,
  {
    self.handle_error = Some(Arc::new(f));
    self
  }

  pub fn handle_fetch<F, Fut>(mut self, f: F) -> Self
  where
    F: Fn(RequestEvent, Request<Bytes>, Arc<dyn Fetch>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FetchResult> + Send + 'static,
  {
    self.handle_fetch = Some(Arc::new(
      move |event: RequestEvent, request: Request<Bytes>, fetch: Arc<dyn Fetch>| -> BoxFuture<FetchResult> {
        Box::pin(f(event, request, fetch))
      },
    ));
    self
  }

  /// Transport for cross-origin `fetch` calls from server loads.
  pub fn external_fetch(mut self, fetch: Arc<dyn Fetch>) -> Self {
    self.external_fetch = fetch;
    self
  }

  pub fn build(self) -> Result<Server, KitError> {
    self.config.validate()?;
    tracing::debug!(routes = self.manifest.routes().len(), base = %self.config.paths.base, "server built");
    Ok(Server {
      inner: Arc::new(ServerInner {
        manifest: self.manifest,
        config: self.config,
        renderer: self.renderer,
        handle: self.handle.unwrap_or_else(default_handle),
        handle_error: self.handle_error,
        handle_fetch: self.handle_fetch,
        external_fetch: self.external_fetch,
      }),
    })
  }
}
