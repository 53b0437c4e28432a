/* src/server/core/rust/src/respond.rs */

// received -> hooked -> matched -> loaded -> rendered, with every stage able
// to exit into an error response.

use std::sync::Arc;

use bytes::Bytes;
use http::header::{ALLOW, HOST, LOCATION, SET_COOKIE};
use http::{HeaderValue, Method, Request, Response, StatusCode};
use serde_json::Value;
use trellis_kit::manifest::Route;
use trellis_kit::response::{ResponseInit, json_with, text_with};
use trellis_kit::routing::strip_base;
use trellis_kit::wire::{INVALIDATED_PARAM, strip_data_suffix};
use trellis_kit::{BoxFuture, KitConfig, LoadError, RequestEvent, TrailingSlash};
use url::Url;

use crate::fetch::ServerFetch;
use crate::hooks::{HandleResult, Resolve};
use crate::negotiate::negotiate;
use crate::page::{PageState, render_not_found, render_page};
use crate::render::{html_response, static_error_page};
use crate::server::{RespondOptions, Server};
use crate::{action, data, endpoint};

pub(crate) async fn respond(
  server: &Server,
  request: Request<Bytes>,
  options: RespondOptions,
  sub_request: bool,
) -> Response<Bytes> {
  let config = &server.inner.config;
  let (parts, body) = request.into_parts();

  let mut url = match request_url(config, &parts) {
    Ok(url) => url,
    Err(e) => {
      tracing::debug!(uri = %parts.uri, error = %e, "unparseable request url");
      return text_with("Invalid request URL", ResponseInit::status(StatusCode::BAD_REQUEST));
    }
  };

  let base = config.paths.base.clone();
  let Some(route_path) = strip_base(url.path(), &base).map(str::to_string) else {
    return text_with(format!("Not found: {}", url.path()), ResponseInit::status(StatusCode::NOT_FOUND));
  };

  let mut mask = None;
  let (route_path, is_data) = match strip_data_suffix(&route_path) {
    Some(stripped) => {
      mask = take_query_param(&mut url, INVALIDATED_PARAM);
      let page_path = match config.trailing_slash {
        TrailingSlash::Always if stripped != "/" => format!("{stripped}/"),
        _ => stripped.clone(),
      };
      url.set_path(&format!("{base}{page_path}"));
      (stripped, true)
    }
    None => (route_path, false),
  };

  let matched = server.inner.manifest.match_path(&route_path);
  tracing::debug!(
    method = %parts.method,
    path = url.path(),
    route = matched.as_ref().map(|m| m.route.id.as_str()),
    data = is_data,
    sub_request,
    "request"
  );

  if let Some(ref m) = matched {
    if !is_data && m.route.is_page() {
      let normalized = normalize_path(url.path(), config.trailing_slash);
      if normalized != url.path() {
        let mut location = normalized;
        if let Some(query) = url.query() {
          location.push('?');
          location.push_str(query);
        }
        return redirect_response(308, &location);
      }
    }
  }

  let mut event = RequestEvent::new(parts.method, url, parts.headers, body)
    .with_data_request(is_data)
    .with_sub_request(sub_request)
    .with_client_address(options.client_address);
  if let Some(platform) = options.platform.clone() {
    event = event.with_platform(platform);
  }
  if let Some(ref m) = matched {
    event = event.matched(&m.route.id, m.params.clone());
  }
  let fetch = ServerFetch::new(server.clone(), event.clone(), options);
  let event = event.with_fetch(Arc::new(fetch));

  let route = matched.map(|m| m.route);
  let resolve_server = server.clone();
  let resolver = Resolve::new(move |event: RequestEvent| -> BoxFuture<HandleResult> {
    let server = resolve_server.clone();
    let route = route.clone();
    let mask = mask.clone();
    Box::pin(async move { resolve(&server, route.as_deref(), event, mask.as_deref()).await })
  });

  let response = match (server.inner.handle)(event.clone(), resolver).await {
    Ok(response) => response,
    Err(err) => fatal_response(server, &event, err),
  };
  finalize(&event, response)
}

async fn resolve(server: &Server, route: Option<&Route>, event: RequestEvent, mask: Option<&str>) -> HandleResult {
  if event.is_data_request() {
    return data::render_data(server, route, &event, mask).await;
  }
  let Some(route) = route else {
    return Ok(render_not_found(server, &event).await);
  };
  if route.endpoint.is_some() && (!route.is_page() || !prefers_page(&event)) {
    return endpoint::render_endpoint(server, route, &event).await;
  }
  match *event.method() {
    Method::GET | Method::HEAD => Ok(render_page(server, route, &event, PageState::default()).await),
    Method::POST => Ok(action::handle_action(server, route, &event).await),
    _ => Ok(method_not_allowed(event.method(), &route.methods)),
  }
}

/// A route that is both a page and an endpoint serves the page to requests
/// that rank `text/html` first.
fn prefers_page(event: &RequestEvent) -> bool {
  let method = event.method();
  if *method == Method::POST && event.request_header("x-trellis-action") == Some("true") {
    return true;
  }
  if !matches!(*method, Method::GET | Method::HEAD | Method::POST) {
    return false;
  }
  let accept = event.request_header("accept").unwrap_or("*/*");
  negotiate(accept, &["application/json", "text/html"]) == Some("text/html")
}

pub(crate) fn wants_json(event: &RequestEvent) -> bool {
  let accept = event.request_header("accept").unwrap_or("*/*");
  negotiate(accept, &["text/html", "application/json"]) == Some("application/json")
}

/// An error raised by the `handle` hook itself, outside any render path.
fn fatal_response(server: &Server, event: &RequestEvent, err: LoadError) -> Response<Bytes> {
  let (status, body) = match err {
    LoadError::Redirect(r) => return redirect_response(r.status, &r.location),
    LoadError::Http(e) => (e.status, e.body.into_value()),
    err @ LoadError::Unexpected(_) => (err.status(), server.error_body(&err, event)),
  };
  if event.is_data_request() || wants_json(event) {
    return error_json(status, &body);
  }
  let message = body.get("message").and_then(Value::as_str).unwrap_or_default();
  html_response(status, static_error_page(server.inner.config.errors.template.as_deref(), status, message))
}

/// Staged headers fill in what the response left unset; cookies are appended.
fn finalize(event: &RequestEvent, mut response: Response<Bytes>) -> Response<Bytes> {
  let staged = event.response_headers().snapshot();
  let headers = response.headers_mut();
  for (name, value) in &staged {
    if !headers.contains_key(name) {
      headers.insert(name.clone(), value.clone());
    }
  }
  for cookie in event.cookies().set_cookie_headers() {
    match HeaderValue::from_str(&cookie) {
      Ok(value) => {
        headers.append(SET_COOKIE, value);
      }
      Err(e) => tracing::warn!(error = %e, "dropping unencodable set-cookie header"),
    }
  }
  if *event.method() == Method::HEAD {
    *response.body_mut() = Bytes::new();
  }
  response
}

pub(crate) fn redirect_response(status: u16, location: &str) -> Response<Bytes> {
  let mut response = Response::new(Bytes::new());
  *response.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::FOUND);
  match HeaderValue::from_str(location) {
    Ok(value) => {
      response.headers_mut().insert(LOCATION, value);
    }
    Err(e) => tracing::warn!(location, error = %e, "redirect location is not a valid header value"),
  }
  response
}

pub(crate) fn error_json(status: u16, body: &Value) -> Response<Bytes> {
  let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
  json_with(body, ResponseInit::status(status))
    .unwrap_or_else(|_| text_with("Internal Error", ResponseInit::status(StatusCode::INTERNAL_SERVER_ERROR)))
}

pub(crate) fn method_not_allowed(method: &Method, allowed: &[String]) -> Response<Bytes> {
  let mut init = ResponseInit::status(StatusCode::METHOD_NOT_ALLOWED);
  if let Ok(value) = HeaderValue::from_str(&allowed.join(", ")) {
    init.headers.insert(ALLOW, value);
  }
  text_with(format!("{method} method not allowed"), init)
}

fn request_url(config: &KitConfig, parts: &http::request::Parts) -> Result<Url, url::ParseError> {
  if parts.uri.scheme().is_some() {
    return Url::parse(&parts.uri.to_string());
  }
  let origin = match config.origin {
    Some(ref origin) => origin.clone(),
    None => {
      let host = parts.headers.get(HOST).and_then(|v| v.to_str().ok()).unwrap_or("localhost");
      format!("http://{host}")
    }
  };
  let path = parts.uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
  Url::parse(&format!("{}{path}", origin.trim_end_matches('/')))
}

/// Remove `name` from the query string and return its last value.
fn take_query_param(url: &mut Url, name: &str) -> Option<String> {
  let mut value = None;
  let kept: Vec<(String, String)> = url
    .query_pairs()
    .filter_map(|(k, v)| {
      if k == name {
        value = Some(v.into_owned());
        None
      } else {
        Some((k.into_owned(), v.into_owned()))
      }
    })
    .collect();
  if kept.is_empty() {
    url.set_query(None);
  } else {
    url.query_pairs_mut().clear().extend_pairs(kept);
  }
  value
}

fn normalize_path(path: &str, trailing_slash: TrailingSlash) -> String {
  if path == "/" {
    return path.to_string();
  }
  match trailing_slash {
    TrailingSlash::Ignore => path.to_string(),
    TrailingSlash::Never => path.trim_end_matches('/').to_string(),
    TrailingSlash::Always if path.ends_with('/') => path.to_string(),
    TrailingSlash::Always => format!("{path}/"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn trailing_slash_modes() {
    assert_eq!(normalize_path("/about/", TrailingSlash::Never), "/about");
    assert_eq!(normalize_path("/about", TrailingSlash::Always), "/about/");
    assert_eq!(normalize_path("/about/", TrailingSlash::Ignore), "/about/");
    assert_eq!(normalize_path("/", TrailingSlash::Never), "/");
  }

  #[test]
  fn query_param_is_removed() {
    let mut url = Url::parse("http://x.dev/a?x-trellis-invalidated=01&q=1").unwrap();
    assert_eq!(take_query_param(&mut url, INVALIDATED_PARAM).as_deref(), Some("01"));
    assert_eq!(url.query(), Some("q=1"));

    let mut url = Url::parse("http://x.dev/a?x-trellis-invalidated=1").unwrap();
    take_query_param(&mut url, INVALIDATED_PARAM);
    assert_eq!(url.as_str(), "http://x.dev/a");
  }

  #[test]
  fn relative_uri_uses_host_header() {
    let request = Request::get("/a?b=1").header(HOST, "example.com:8080").body(()).unwrap();
    let (parts, ()) = request.into_parts();
    let url = request_url(&KitConfig::default(), &parts).unwrap();
    assert_eq!(url.as_str(), "http://example.com:8080/a?b=1");
  }

  #[test]
  fn not_allowed_lists_methods() {
    let res = method_not_allowed(&Method::PUT, &["GET".into(), "HEAD".into()]);
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(res.headers()[ALLOW], "GET, HEAD");
  }
}
