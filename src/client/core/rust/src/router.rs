/* src/client/core/rust/src/router.rs */

// Loading a route on the client: decide which loads rerun, fetch server data
// for the rerun mask, run universal loads and resolve error boundaries.

use std::sync::Arc;

use serde_json::Value;
use trellis_kit::event::ResponseHeaders;
use trellis_kit::load::{NodeData, ServerData, UniversalEnv, UniversalInput, settle_all, universal_tasks};
use trellis_kit::node::NodeDef;
use trellis_kit::wire::{DataNode, DataResponse, HydrationPayload};
use trellis_kit::{ErrorBody, HttpError, Invalidation, LoadError, LoadTarget, Params};
use url::Url;

use crate::client::{Client, Intent};
use crate::error::NavigationError;
use crate::navigation::NavigationTarget;
use crate::rerun::{Changes, LoadId, changed_params, changed_search_params, invalidated_loads, page_key};
use crate::state::{BranchNode, Current, Loaded};

fn previous<'a>(current: Option<&'a Current>, slots: &[Option<usize>], position: usize) -> Option<&'a BranchNode> {
  let node = slots.get(position).copied().flatten()?;
  current?.previous(position, node)
}

/// A `{type:"error"}` entry already went through the server's `handle_error`.
fn wire_error(error: Value, status: Option<u16>) -> LoadError {
  HttpError { status: status.unwrap_or(500), body: ErrorBody::from(error) }.into()
}

fn server_data(node: Option<DataNode>) -> Option<ServerData> {
  match node {
    Some(DataNode::Data { data, uses }) => Some(ServerData { data, uses }),
    _ => None,
  }
}

impl Client {
  fn env(&self) -> UniversalEnv {
    UniversalEnv { headers: ResponseHeaders::inert(), fetch: self.inner.fetch.clone() }
  }

  fn nodes(&self, slots: &[Option<usize>]) -> Vec<Option<Arc<NodeDef>>> {
    slots.iter().map(|slot| slot.and_then(|i| self.inner.manifest.node(i).cloned())).collect()
  }

  /// Load `intent` against the committed page, reusing every result whose
  /// inputs did not change. Nothing is committed.
  pub(crate) async fn load_route(
    &self,
    intent: &Intent,
    invalidated: &[Invalidation],
    force: bool,
  ) -> Result<Loaded, NavigationError> {
    let current = self.current();
    let current = current.as_ref();
    let route = &intent.route;
    let slots = route.branch();
    let nodes = self.nodes(&slots);

    let changes = match current {
      Some(c) => Changes {
        route: c.page.route_id.as_deref() != Some(route.id.as_str()),
        url: page_key(&c.page.url) != page_key(&intent.url),
        search_params: changed_search_params(&c.page.url, &intent.url),
        params: changed_params(&c.page.params, &intent.params),
        invalidated: invalidated_loads(&c.tracker(), invalidated),
        force,
      },
      None => Changes { force, ..Changes::default() },
    };

    // Server loads first: a node reruns when it is new, when something it
    // used changed, or when a rerun parent is one of those things.
    let mut parent_invalid = false;
    let mask: Vec<bool> = nodes
      .iter()
      .enumerate()
      .map(|(i, node)| {
        let has_server_load = node.as_ref().is_some_and(|n| n.has_server_load());
        let invalid = has_server_load
          && match previous(current, &slots, i).and_then(|p| p.server.as_ref()) {
            None => true,
            Some(server) => changes.affects(LoadId::server(i), Some(&server.uses), parent_invalid),
          };
        parent_invalid |= invalid;
        invalid
      })
      .collect();

    let mut server_nodes: Vec<Option<DataNode>> = Vec::new();
    if mask.contains(&true) {
      match self.inner.source.load(&intent.url, &mask).await {
        Ok(DataResponse::Data { nodes }) => server_nodes = nodes,
        Ok(DataResponse::Redirect { location }) => return Ok(Loaded::Redirect(location)),
        Err(err) => return Ok(self.root_error_page(&intent.url, err).await),
      }
    }

    let mut parent_changed = false;
    let mut inputs = Vec::with_capacity(nodes.len());
    let mut server_results: Vec<Option<ServerData>> = Vec::with_capacity(nodes.len());
    let mut server_error: Option<(usize, LoadError)> = None;
    for (i, node) in nodes.iter().enumerate() {
      let Some(node) = node else {
        inputs.push(UniversalInput::Run(None));
        server_results.push(None);
        continue;
      };
      let prev = previous(current, &slots, i);
      let entry = match server_nodes.get(i) {
        Some(Some(entry)) => Some(entry.clone()),
        _ if node.has_server_load() => Some(DataNode::Skip),
        _ => None,
      };

      let server_unchanged = matches!(entry, None | Some(DataNode::Skip));
      let reusable = prev.filter(|p| {
        server_unchanged && !changes.affects(LoadId::universal(i), p.universal.uses.as_ref(), parent_changed)
      });
      if let Some(prev) = reusable {
        inputs.push(UniversalInput::Reuse(prev.universal.clone()));
        server_results.push(prev.server.clone());
        continue;
      }

      parent_changed = true;
      let server = match entry {
        Some(DataNode::Error { error, status }) => {
          server_error = Some((i, wire_error(error, status)));
          break;
        }
        Some(DataNode::Data { data, uses }) => Some(ServerData { data, uses }),
        Some(DataNode::Skip) => prev.and_then(|p| p.server.clone()),
        None => None,
      };
      inputs.push(UniversalInput::Run(server.as_ref().and_then(|s| s.data.clone())));
      server_results.push(server);
    }

    let count = inputs.len();
    let target = LoadTarget { url: intent.url.clone(), params: intent.params.clone(), route_id: Some(route.id.clone()) };
    let tasks = universal_tasks(&target, &nodes[..count], inputs, &self.env());
    let settled = settle_all(&tasks).await;

    if let Some((index, error)) = settled.error.map(|e| (e.index, e.error)).or(server_error) {
      tracing::debug!(url = %intent.url, index, %error, "load failed");
      return Ok(self.error_page(intent, &server_results, &settled.results, index, error));
    }

    let branch = slots
      .iter()
      .zip(&nodes)
      .zip(server_results.into_iter().zip(settled.results))
      .map(|((slot, node), (server, universal))| {
        node.as_ref()?;
        Some(BranchNode { node: (*slot)?, server, universal: universal.unwrap_or_default() })
      })
      .collect();
    let page = Current::build(&self.inner.manifest, intent.target(), Some(route.clone()), branch, 200, None);
    Ok(Loaded::Page(Box::new(page)))
  }

  /// Show the nearest error boundary above `index`, keeping the layouts that
  /// already loaded.
  fn error_page(
    &self,
    intent: &Intent,
    server_results: &[Option<ServerData>],
    results: &[Option<NodeData>],
    index: usize,
    error: LoadError,
  ) -> Loaded {
    let target = intent.target();
    let (status, body) = match error {
      LoadError::Redirect(r) => return Loaded::Redirect(r.location),
      LoadError::Http(e) => (e.status, e.body.into_value()),
      err @ LoadError::Unexpected(_) => (err.status(), self.error_body(&err, &target)),
    };

    let route = &intent.route;
    let levels = route.layouts.len().min(index);
    let Some(level) = (0..levels).rev().find(|&i| i == 0 || route.errors.get(i).copied().flatten().is_some()) else {
      tracing::warn!(url = %intent.url, status, "root layout failed, falling back to a full page load");
      return Loaded::Unload(intent.url.clone());
    };

    let mut branch: Vec<Option<BranchNode>> = Vec::with_capacity(level + 2);
    for (i, slot) in route.layouts.iter().take(level + 1).enumerate() {
      let Some(node) = slot else {
        branch.push(None);
        continue;
      };
      let Some(universal) = results.get(i).cloned().flatten() else {
        tracing::warn!(url = %intent.url, "layout data missing for error page, falling back to a full page load");
        return Loaded::Unload(intent.url.clone());
      };
      branch.push(Some(BranchNode { node: *node, server: server_results.get(i).cloned().flatten(), universal }));
    }
    branch.push(error_slot(route.errors.get(level).copied().flatten()));

    let page = Current::build(&self.inner.manifest, target, Some(route.clone()), branch, status, Some(body));
    Loaded::Page(Box::new(page))
  }

  /// The root layout with the root error page, for failures that happen
  /// before any branch exists.
  pub(crate) async fn root_error_page(&self, url: &Url, error: LoadError) -> Loaded {
    let target = NavigationTarget { url: url.clone(), route_id: None, params: Params::new() };
    let (status, body) = match error {
      LoadError::Redirect(r) => return Loaded::Redirect(r.location),
      LoadError::Http(e) => (e.status, e.body.into_value()),
      err @ LoadError::Unexpected(_) => (err.status(), self.error_body(&err, &target)),
    };
    let manifest = &self.inner.manifest;

    let mut branch: Vec<Option<BranchNode>> = Vec::with_capacity(2);
    if let Some((slot, node)) = manifest.root_layout().and_then(|i| manifest.node(i).map(|n| (i, n.clone()))) {
      let server = if node.has_server_load() {
        match self.inner.source.load(url, &[true]).await {
          Ok(DataResponse::Data { nodes }) => server_data(nodes.into_iter().next().flatten()),
          _ => None,
        }
      } else {
        None
      };
      if node.has_server_load() && server.is_none() {
        tracing::warn!(url = %url, status, "root layout data unavailable, falling back to a full page load");
        return Loaded::Unload(url.clone());
      }

      let load_target = LoadTarget { url: url.clone(), params: Params::new(), route_id: None };
      let input = UniversalInput::Run(server.as_ref().and_then(|s| s.data.clone()));
      let tasks = universal_tasks(&load_target, &[Some(node)], vec![input], &self.env());
      match settle_all(&tasks).await.into_result() {
        Ok(mut results) => {
          let universal = results.pop().flatten().unwrap_or_default();
          branch.push(Some(BranchNode { node: slot, server, universal }));
        }
        Err(failure) => {
          tracing::warn!(url = %url, error = %failure.error, "root layout failed, falling back to a full page load");
          return Loaded::Unload(url.clone());
        }
      }
    }
    branch.push(error_slot(manifest.root_error()));

    Loaded::Page(Box::new(Current::build(manifest, target, None, branch, status, Some(body))))
  }

  /// Rebuild the server-rendered page from its payload, running universal
  /// loads with the embedded server data.
  pub(crate) async fn load_hydration(&self, url: Url, payload: HydrationPayload) -> Loaded {
    let manifest = &self.inner.manifest;
    let route = payload.route_id.as_deref().and_then(|id| manifest.route(id).cloned());

    // An error payload carries the layouts above the boundary, then the error slot.
    let (slots, error) = match (&route, payload.error.is_some()) {
      (Some(route), false) => (route.branch(), None),
      (Some(route), true) => {
        let level = payload.nodes.len().saturating_sub(1);
        let layouts: Vec<Option<usize>> = route.layouts.iter().take(level + 1).copied().collect();
        let level = layouts.len().saturating_sub(1);
        (layouts, Some(route.errors.get(level).copied().flatten()))
      }
      (None, _) => (vec![manifest.root_layout()], Some(manifest.root_error())),
    };
    let nodes = self.nodes(&slots);
    let server_results: Vec<Option<ServerData>> =
      (0..nodes.len()).map(|i| server_data(payload.nodes.get(i).cloned().flatten())).collect();
    let inputs = server_results.iter().map(|s| UniversalInput::Run(s.as_ref().and_then(|s| s.data.clone()))).collect();

    let target = LoadTarget { url: url.clone(), params: payload.params.clone(), route_id: payload.route_id.clone() };
    let settled = settle_all(&universal_tasks(&target, &nodes, inputs, &self.env())).await;
    let nav_target = NavigationTarget { url: url.clone(), route_id: payload.route_id.clone(), params: payload.params };

    if let Some(failure) = settled.error {
      return match (route, error) {
        (Some(route), None) => {
          let intent = Intent { url, route, params: nav_target.params };
          self.error_page(&intent, &server_results, &settled.results, failure.index, failure.error)
        }
        _ => {
          tracing::warn!(url = %url, error = %failure.error, "layout failed while hydrating an error page");
          let branch = vec![error_slot(error.flatten())];
          Loaded::Page(Box::new(Current::build(manifest, nav_target, None, branch, payload.status, payload.error)))
        }
      };
    }

    let mut branch: Vec<Option<BranchNode>> = slots
      .iter()
      .zip(&nodes)
      .zip(server_results.into_iter().zip(settled.results))
      .map(|((slot, node), (server, universal))| {
        node.as_ref()?;
        Some(BranchNode { node: (*slot)?, server, universal: universal.unwrap_or_default() })
      })
      .collect();
    if let Some(error) = error {
      branch.push(error_slot(error));
    }
    let mut page = Current::build(manifest, nav_target, route, branch, payload.status, payload.error);
    page.page.form = payload.form;
    Loaded::Page(Box::new(page))
  }
}

fn error_slot(node: Option<usize>) -> Option<BranchNode> {
  node.map(|node| BranchNode { node, server: None, universal: NodeData::default() })
}
