/* src/server/core/rust/src/page.rs */

use std::sync::Arc;

use bytes::Bytes;
use http::Response;
use serde_json::Value;
use trellis_kit::load::{
  self, LoadTarget, NodeData, ServerData, UniversalEnv, UniversalInput, merge_data,
};
use trellis_kit::manifest::Route;
use trellis_kit::wire::{DataNode, HydrationPayload};
use trellis_kit::{HttpError, LoadError, NodeDef, RequestEvent};

use crate::render::{DEFAULT_ERROR_COMPONENT, RenderContext, RenderedNode, embed_payload, html_response, static_error_page};
use crate::respond::redirect_response;
use crate::server::Server;

/// What a form action left behind for the page render.
#[derive(Default)]
pub(crate) struct PageState {
  pub status: Option<u16>,
  pub form: Option<Value>,
  /// Raised by the action; the page renders its error boundary instead.
  pub error: Option<LoadError>,
}

/// Where a branch failed and what had finished by then.
struct ErrorSite {
  layouts: Vec<Option<usize>>,
  errors: Vec<Option<usize>>,
  /// Branch position of the failing node (`layouts.len()` for the leaf).
  index: usize,
  server: Vec<Option<Option<ServerData>>>,
  universal: Vec<Option<NodeData>>,
}

pub(crate) fn branch_nodes(server: &Server, slots: &[Option<usize>]) -> Vec<Option<Arc<NodeDef>>> {
  slots.iter().map(|slot| slot.and_then(|i| server.manifest().node(i).cloned())).collect()
}

fn payload_nodes(results: &[Option<Option<ServerData>>]) -> Vec<Option<DataNode>> {
  results
    .iter()
    .map(|r| r.clone().flatten().map(|sd| DataNode::Data { data: sd.data, uses: sd.uses }))
    .collect()
}

fn rendered(nodes: &[Option<Arc<NodeDef>>], data: Vec<Option<NodeData>>) -> Vec<RenderedNode> {
  nodes
    .iter()
    .zip(data)
    .filter_map(|(node, data)| {
      let node = node.as_ref()?;
      Some(RenderedNode { component: node.component.clone(), data: data.and_then(|d| d.data).unwrap_or_default() })
    })
    .collect()
}

fn load_target(event: &RequestEvent) -> LoadTarget {
  LoadTarget {
    url: event.url().clone(),
    params: event.params().clone(),
    route_id: event.route_id().map(str::to_string),
  }
}

fn universal_env(event: &RequestEvent) -> UniversalEnv {
  UniversalEnv { headers: event.response_headers().clone(), fetch: event.fetcher() }
}

/// Run the branch of `route` and render it, or its nearest error boundary.
pub(crate) async fn render_page(server: &Server, route: &Route, event: &RequestEvent, state: PageState) -> Response<Bytes> {
  let nodes = branch_nodes(server, &route.branch());
  let leaf = route.layouts.len();
  let run = if state.error.is_some() { &nodes[..leaf] } else { &nodes[..] };

  let server_tasks = load::server_tasks(event, run);
  let settled = load::settle_all(&server_tasks).await;
  let site = |index: usize, server: Vec<Option<Option<ServerData>>>, universal: Vec<Option<NodeData>>| ErrorSite {
    layouts: route.layouts.clone(),
    errors: route.errors.clone(),
    index,
    server,
    universal,
  };

  if let Some(failure) = settled.error {
    tracing::debug!(route = %route.id, node = failure.index, error = %failure.error, "server load failed");
    return render_error(server, event, site(failure.index, settled.results, Vec::new()), failure.error).await;
  }
  if let Some(error) = state.error {
    return render_error(server, event, site(leaf, settled.results, Vec::new()), error).await;
  }

  let inputs = settled
    .results
    .iter()
    .map(|r| UniversalInput::Run(r.clone().flatten().and_then(|sd| sd.data)))
    .collect();
  let universal_tasks = load::universal_tasks(&load_target(event), &nodes, inputs, &universal_env(event));
  let universal = load::settle_all(&universal_tasks).await;
  if let Some(failure) = universal.error {
    tracing::debug!(route = %route.id, node = failure.index, error = %failure.error, "universal load failed");
    return render_error(server, event, site(failure.index, settled.results, universal.results), failure.error).await;
  }

  let status = state.status.unwrap_or(200);
  let branch = rendered(&nodes, universal.results.clone());
  match finish(server, event, status, branch, None, state.form, payload_nodes(&settled.results)) {
    Ok(response) => response,
    Err(err) => render_error(server, event, site(leaf, settled.results, universal.results), err).await,
  }
}

/// No route matched: the root layout renders the root error page.
pub(crate) async fn render_not_found(server: &Server, event: &RequestEvent) -> Response<Bytes> {
  let manifest = server.manifest();
  let site = ErrorSite {
    layouts: vec![manifest.root_layout()],
    errors: vec![manifest.root_error()],
    index: 1,
    server: Vec::new(),
    universal: Vec::new(),
  };
  render_error(server, event, site, HttpError::not_found(event.url().path()).into()).await
}

async fn render_error(server: &Server, event: &RequestEvent, site: ErrorSite, error: LoadError) -> Response<Bytes> {
  let (status, body) = match error {
    LoadError::Redirect(r) => return redirect_response(r.status, &r.location),
    LoadError::Http(e) => (e.status, e.body.into_value()),
    err @ LoadError::Unexpected(_) => (err.status(), server.error_body(&err, event)),
  };

  // The root level always has a boundary, unless the root layout itself failed.
  let levels = site.layouts.len().min(site.index);
  let Some(level) = (0..levels).rev().find(|&i| i == 0 || site.errors.get(i).copied().flatten().is_some()) else {
    return static_response(server, status, &body);
  };

  let layouts = branch_nodes(server, &site.layouts[..=level]);
  let error_component = site
    .errors
    .get(level)
    .copied()
    .flatten()
    .and_then(|i| server.manifest().node(i))
    .map(|n| n.component.clone())
    .unwrap_or_else(|| DEFAULT_ERROR_COMPONENT.to_string());

  let reused: Option<Vec<Option<Option<ServerData>>>> = site.server.get(..=level).map(<[_]>::to_vec);
  let server_results = match reused.filter(|r| r.iter().all(Option::is_some)) {
    Some(results) => results,
    None => {
      let tasks = load::server_tasks(event, &layouts);
      match load::settle_all(&tasks).await.into_result() {
        Ok(results) => results,
        Err(failure) => {
          tracing::debug!(error = %failure.error, "layout load failed while rendering error page");
          return static_response(server, status, &body);
        }
      }
    }
  };

  let inputs = server_results
    .iter()
    .enumerate()
    .map(|(i, r)| match site.universal.get(i).cloned().flatten() {
      Some(previous) => UniversalInput::Reuse(previous),
      None => UniversalInput::Run(r.clone().flatten().and_then(|sd| sd.data)),
    })
    .collect();
  let tasks = load::universal_tasks(&load_target(event), &layouts, inputs, &universal_env(event));
  let universal = match load::settle_all(&tasks).await.into_result() {
    Ok(results) => results,
    Err(failure) => {
      tracing::debug!(error = %failure.error, "layout load failed while rendering error page");
      return static_response(server, status, &body);
    }
  };

  let mut branch = rendered(&layouts, universal);
  branch.push(RenderedNode { component: error_component, data: Default::default() });
  match finish(server, event, status, branch, Some(body.clone()), None, payload_nodes(&server_results)) {
    Ok(response) => response,
    Err(err) => {
      tracing::warn!(error = %err, "error page failed to render");
      static_response(server, status, &body)
    }
  }
}

fn finish(
  server: &Server,
  event: &RequestEvent,
  status: u16,
  branch: Vec<RenderedNode>,
  error: Option<Value>,
  form: Option<Value>,
  nodes: Vec<Option<DataNode>>,
) -> Result<Response<Bytes>, LoadError> {
  let data = merge_data(branch.iter().map(|n| Some(&n.data)));
  let html = {
    let ctx = RenderContext {
      url: event.url(),
      route_id: event.route_id(),
      status,
      branch,
      data,
      error: error.as_ref(),
      form: form.as_ref(),
    };
    server.inner.renderer.render(&ctx)?
  };
  let payload = HydrationPayload {
    route_id: event.route_id().map(str::to_string),
    params: event.params().clone(),
    status,
    error,
    nodes,
    form,
  };
  let html = embed_payload(html, &server.config().embedded_data_id, &payload)?;
  Ok(html_response(status, html))
}

fn static_response(server: &Server, status: u16, body: &Value) -> Response<Bytes> {
  let message = body.get("message").and_then(Value::as_str).unwrap_or_default();
  html_response(status, static_error_page(server.config().errors.template.as_deref(), status, message))
}
