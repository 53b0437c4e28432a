/* src/server/core/rust/src/fetch.rs */

use std::sync::Arc;

use bytes::Bytes;
use http::header::{AUTHORIZATION, COOKIE};
use http::{HeaderValue, Request, Uri};
use trellis_kit::fetch::{Fetch, FetchResult};
use trellis_kit::{BoxFuture, LoadError, RequestEvent};

use crate::server::{RespondOptions, Server};

/// The `fetch` bound to one request. Relative and same-origin URLs are
/// answered in-process by the same server with the caller's credentials;
/// anything else goes to the external transport. `handle_fetch` sees both.
pub(crate) struct ServerFetch {
  server: Server,
  /// Snapshot taken before the fetch was attached, so it holds no reference
  /// back to this value.
  event: RequestEvent,
  options: RespondOptions,
}

impl ServerFetch {
  pub(crate) fn new(server: Server, event: RequestEvent, options: RespondOptions) -> Self {
    Self { server, event, options }
  }
}

impl Fetch for ServerFetch {
  fn fetch(&self, request: Request<Bytes>) -> BoxFuture<FetchResult> {
    let dispatch: Arc<dyn Fetch> = Arc::new(Dispatch {
      server: self.server.clone(),
      event: self.event.clone(),
      options: self.options.clone(),
    });
    match self.server.inner.handle_fetch {
      Some(ref hook) => hook(self.event.clone(), request, dispatch),
      None => dispatch.fetch(request),
    }
  }
}

struct Dispatch {
  server: Server,
  event: RequestEvent,
  options: RespondOptions,
}

impl Fetch for Dispatch {
  fn fetch(&self, request: Request<Bytes>) -> BoxFuture<FetchResult> {
    let (mut parts, body) = request.into_parts();
    let target = match self.event.url().join(&parts.uri.to_string()) {
      Ok(url) => url,
      Err(e) => return Box::pin(async move { Err(LoadError::unexpected(e)) }),
    };
    parts.uri = match target.as_str().parse::<Uri>() {
      Ok(uri) => uri,
      Err(e) => return Box::pin(async move { Err(LoadError::unexpected(e)) }),
    };

    if target.origin() != self.event.url().origin() {
      tracing::debug!(url = %target, "external fetch");
      return self.server.inner.external_fetch.fetch(Request::from_parts(parts, body));
    }

    if !parts.headers.contains_key(COOKIE) {
      if let Some(value) = self.event.cookies().header_value().and_then(|c| HeaderValue::from_str(&c).ok()) {
        parts.headers.insert(COOKIE, value);
      }
    }
    if !parts.headers.contains_key(AUTHORIZATION) {
      if let Some(value) = self.event.request_headers().get(AUTHORIZATION) {
        parts.headers.insert(AUTHORIZATION, value.clone());
      }
    }

    tracing::debug!(url = %target, "in-process fetch");
    let server = self.server.clone();
    let options = self.options.clone();
    let request = Request::from_parts(parts, body);
    Box::pin(async move { Ok(crate::respond::respond(&server, request, options, true).await) })
  }
}
