/* src/server/core/rust/src/render.rs */

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderValue, Response, StatusCode};
use serde_json::Value;
use trellis_kit::load::DataMap;
use trellis_kit::wire::HydrationPayload;
use trellis_kit::LoadError;
use url::Url;

use crate::escape::{escape_html, escape_json_for_script};

pub use trellis_kit::node::DEFAULT_ERROR_COMPONENT;

/// One rendered level: a layout, the page, or the error page.
#[derive(Debug, Clone)]
pub struct RenderedNode {
  pub component: String,
  /// This node's own output after the universal phase.
  pub data: DataMap,
}

/// Everything a renderer sees for one page response.
pub struct RenderContext<'a> {
  pub url: &'a Url,
  pub route_id: Option<&'a str>,
  pub status: u16,
  /// Layouts outermost first, then the page or error component.
  pub branch: Vec<RenderedNode>,
  /// Shallow merge of every node's data, deeper nodes winning.
  pub data: DataMap,
  pub error: Option<&'a Value>,
  pub form: Option<&'a Value>,
}

/// Turns a branch into markup. The hydration script is added afterwards by
/// the server, so implementations only produce the document.
pub trait Renderer: Send + Sync {
  fn render(&self, ctx: &RenderContext<'_>) -> Result<String, LoadError>;
}

const DEFAULT_SHELL: &str = "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n</head>\n<body>%trellis.body%</body>\n</html>\n";

/// Nests each component in a `<div data-component>` inside an HTML shell.
/// Stands in for a real component library.
#[derive(Debug, Clone)]
pub struct ShellRenderer {
  shell: String,
}

impl ShellRenderer {
  /// `shell` must contain `%trellis.body%`.
  pub fn new(shell: impl Into<String>) -> Self {
    Self { shell: shell.into() }
  }
}

impl Default for ShellRenderer {
  fn default() -> Self {
    Self::new(DEFAULT_SHELL)
  }
}

impl Renderer for ShellRenderer {
  fn render(&self, ctx: &RenderContext<'_>) -> Result<String, LoadError> {
    let mut inner = String::new();
    if let Some(error) = ctx.error {
      let message = error.get("message").and_then(Value::as_str).unwrap_or_default();
      inner = format!("<h1>{}</h1><p>{}</p>", ctx.status, escape_html(message));
    }
    for node in ctx.branch.iter().rev() {
      inner = format!(r#"<div data-component="{}">{inner}</div>"#, escape_html(&node.component));
    }
    Ok(self.shell.replace("%trellis.body%", &inner))
  }
}

/// Append the hydration payload as a JSON script right before `</body>`.
pub(crate) fn embed_payload(mut html: String, data_id: &str, payload: &HydrationPayload) -> Result<String, LoadError> {
  let json = serde_json::to_string(payload)?;
  let script = format!(
    r#"<script id="{}" type="application/json">{}</script>"#,
    escape_html(data_id),
    escape_json_for_script(&json)
  );
  if let Some(pos) = html.rfind("</body>") {
    html.insert_str(pos, &script);
  } else {
    html.push_str(&script);
  }
  Ok(html)
}

const DEFAULT_ERROR_TEMPLATE: &str = "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>%trellis.error.message%</title>\n</head>\n<body>\n<h1>%trellis.status%</h1>\n<p>%trellis.error.message%</p>\n</body>\n</html>\n";

/// Last-resort page used when no error component can render.
pub(crate) fn static_error_page(template: Option<&str>, status: u16, message: &str) -> String {
  template
    .unwrap_or(DEFAULT_ERROR_TEMPLATE)
    .replace("%trellis.status%", &status.to_string())
    .replace("%trellis.error.message%", &escape_html(message))
}

pub(crate) fn html_response(status: u16, html: String) -> Response<Bytes> {
  let body = Bytes::from(html);
  let mut response = Response::new(body);
  *response.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
  let len = response.body().len();
  let headers = response.headers_mut();
  headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
  headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
  response
}
