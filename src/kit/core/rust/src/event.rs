/* src/kit/core/rust/src/event.rs */

use std::any::Any;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::SET_COOKIE;
use http::{Extensions, HeaderMap, HeaderName, HeaderValue, Method};
use parking_lot::Mutex;
use url::Url;

use crate::cookies::Cookies;
use crate::errors::KitError;
use crate::fetch::{Fetch, FetchResult, no_fetch};
use crate::routing::Params;
use crate::BoxFuture;

/// Staging area for response headers shared by every load of one request.
/// Each header name may be written once; names compare case-insensitively.
/// An inert instance accepts and discards writes (client-side rendering).
#[derive(Clone, Default)]
pub struct ResponseHeaders {
  staged: Option<Arc<Mutex<HeaderMap>>>,
}

impl ResponseHeaders {
  pub fn new() -> Self {
    Self { staged: Some(Arc::new(Mutex::new(HeaderMap::new()))) }
  }

  pub fn inert() -> Self {
    Self { staged: None }
  }

  pub fn is_inert(&self) -> bool {
    self.staged.is_none()
  }

  pub fn set(&self, name: &str, value: &str) -> Result<(), KitError> {
    let Some(ref staged) = self.staged else {
      return Ok(());
    };
    let header = HeaderName::from_bytes(name.as_bytes())
      .map_err(|e| KitError::InvalidHeader { name: name.to_string(), reason: e.to_string() })?;
    if header == SET_COOKIE {
      return Err(KitError::SetCookieHeader);
    }
    let value = HeaderValue::from_str(value)
      .map_err(|e| KitError::InvalidHeader { name: name.to_string(), reason: e.to_string() })?;

    let mut staged = staged.lock();
    if staged.contains_key(&header) {
      return Err(KitError::DuplicateHeader(header.as_str().to_string()));
    }
    staged.insert(header, value);
    Ok(())
  }

  pub fn set_all<'a>(&self, headers: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<(), KitError> {
    for (name, value) in headers {
      self.set(name, value)?;
    }
    Ok(())
  }

  pub fn get(&self, name: &str) -> Option<String> {
    let staged = self.staged.as_ref()?.lock();
    staged.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
  }

  pub fn snapshot(&self) -> HeaderMap {
    self.staged.as_ref().map(|s| s.lock().clone()).unwrap_or_default()
  }
}

/// Per-request state handed to hooks, server loads, actions and endpoints.
/// Cloning is cheap and clones share cookies, locals and staged headers.
#[derive(Clone)]
pub struct RequestEvent {
  method: Method,
  url: Url,
  headers: Arc<HeaderMap>,
  body: Bytes,
  params: Arc<Params>,
  route_id: Option<Arc<str>>,
  cookies: Cookies,
  locals: Arc<Mutex<Extensions>>,
  platform: Option<Arc<dyn Any + Send + Sync>>,
  response_headers: ResponseHeaders,
  fetch: Arc<dyn Fetch>,
  is_data_request: bool,
  is_sub_request: bool,
  client_address: Option<SocketAddr>,
}

impl RequestEvent {
  pub fn new(method: Method, url: Url, headers: HeaderMap, body: Bytes) -> Self {
    let cookie_header = headers.get(http::header::COOKIE).and_then(|v| v.to_str().ok());
    let cookies = Cookies::new(cookie_header, &url);
    Self {
      method,
      url,
      headers: Arc::new(headers),
      body,
      params: Arc::new(Params::new()),
      route_id: None,
      cookies,
      locals: Arc::new(Mutex::new(Extensions::new())),
      platform: None,
      response_headers: ResponseHeaders::new(),
      fetch: no_fetch(),
      is_data_request: false,
      is_sub_request: false,
      client_address: None,
    }
  }

  pub fn with_fetch(mut self, fetch: Arc<dyn Fetch>) -> Self {
    self.fetch = fetch;
    self
  }

  pub fn with_platform(mut self, platform: Arc<dyn Any + Send + Sync>) -> Self {
    self.platform = Some(platform);
    self
  }

  pub fn with_client_address(mut self, addr: Option<SocketAddr>) -> Self {
    self.client_address = addr;
    self
  }

  pub fn with_data_request(mut self, on: bool) -> Self {
    self.is_data_request = on;
    self
  }

  pub fn with_sub_request(mut self, on: bool) -> Self {
    self.is_sub_request = on;
    self
  }

  /// Same request after route matching.
  pub fn matched(mut self, route_id: &str, params: Params) -> Self {
    self.route_id = Some(Arc::from(route_id));
    self.params = Arc::new(params);
    self
  }

  pub fn method(&self) -> &Method {
    &self.method
  }

  pub fn url(&self) -> &Url {
    &self.url
  }

  pub fn params(&self) -> &Params {
    &self.params
  }

  pub fn route_id(&self) -> Option<&str> {
    self.route_id.as_deref()
  }

  pub fn request_headers(&self) -> &HeaderMap {
    &self.headers
  }

  pub fn request_header(&self, name: &str) -> Option<&str> {
    self.headers.get(name).and_then(|v| v.to_str().ok())
  }

  pub fn body(&self) -> &Bytes {
    &self.body
  }

  /// `application/x-www-form-urlencoded` body fields. Repeated names keep the last value.
  pub fn form_data(&self) -> BTreeMap<String, String> {
    url::form_urlencoded::parse(&self.body).into_owned().collect()
  }

  pub fn cookies(&self) -> &Cookies {
    &self.cookies
  }

  pub fn set_local<T: Clone + Send + Sync + 'static>(&self, value: T) {
    self.locals.lock().insert(value);
  }

  pub fn local<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
    self.locals.lock().get::<T>().cloned()
  }

  pub fn platform<T: 'static>(&self) -> Option<&T> {
    self.platform.as_deref().and_then(|p| p.downcast_ref::<T>())
  }

  pub fn set_headers<'a>(&self, headers: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<(), KitError> {
    self.response_headers.set_all(headers)
  }

  pub fn response_headers(&self) -> &ResponseHeaders {
    &self.response_headers
  }

  pub fn fetch(&self, request: http::Request<Bytes>) -> BoxFuture<FetchResult> {
    self.fetch.fetch(request)
  }

  pub fn fetcher(&self) -> Arc<dyn Fetch> {
    self.fetch.clone()
  }

  pub fn is_data_request(&self) -> bool {
    self.is_data_request
  }

  pub fn is_sub_request(&self) -> bool {
    self.is_sub_request
  }

  pub fn client_address(&self) -> Option<SocketAddr> {
    self.client_address
  }
}
