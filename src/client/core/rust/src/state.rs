/* src/client/core/rust/src/state.rs */

use std::sync::Arc;

use serde_json::Value;
use trellis_kit::load::{NodeData, ServerData, merge_data};
use trellis_kit::node::DEFAULT_ERROR_COMPONENT;
use trellis_kit::{DataMap, DependencyTracker, Manifest, Params, Route};
use url::Url;

use crate::navigation::NavigationTarget;
use crate::rerun::LoadId;

/// What the host shows: one committed page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
  pub url: Url,
  pub route_id: Option<String>,
  pub params: Params,
  pub status: u16,
  pub error: Option<Value>,
  /// Merged output of every node in the branch.
  pub data: DataMap,
  pub form: Option<Value>,
  /// Shallow-routing state attached to the history entry.
  pub state: Option<Value>,
  /// Layouts outermost first, then the page or error component.
  pub components: Vec<String>,
}

impl Page {
  pub fn target(&self) -> NavigationTarget {
    NavigationTarget { url: self.url.clone(), route_id: self.route_id.clone(), params: self.params.clone() }
  }
}

/// One level of the committed branch.
#[derive(Debug, Clone)]
pub(crate) struct BranchNode {
  /// Manifest node index.
  pub node: usize,
  pub server: Option<ServerData>,
  pub universal: NodeData,
}

/// A loaded page together with the per-node results the next navigation
/// compares against.
#[derive(Debug, Clone)]
pub(crate) struct Current {
  pub page: Page,
  pub route: Option<Arc<Route>>,
  pub branch: Vec<Option<BranchNode>>,
}

impl Current {
  pub(crate) fn build(
    manifest: &Manifest,
    target: NavigationTarget,
    route: Option<Arc<Route>>,
    branch: Vec<Option<BranchNode>>,
    status: u16,
    error: Option<Value>,
  ) -> Self {
    let mut components: Vec<String> = branch
      .iter()
      .flatten()
      .filter_map(|b| manifest.node(b.node).map(|n| n.component.clone()))
      .collect();
    // An error branch ends with its error slot; an empty slot is the default error page.
    if error.is_some() && matches!(branch.last(), Some(None)) {
      components.push(DEFAULT_ERROR_COMPONENT.to_string());
    }
    let data = merge_data(branch.iter().map(|b| b.as_ref().and_then(|b| b.universal.data.as_ref())));
    let page = Page {
      url: target.url,
      route_id: target.route_id,
      params: target.params,
      status,
      error,
      data,
      form: None,
      state: None,
      components,
    };
    Self { page, route, branch }
  }

  /// Dependency sets of every load in this branch.
  pub(crate) fn tracker(&self) -> DependencyTracker<LoadId> {
    let mut tracker = DependencyTracker::default();
    for (position, node) in self.branch.iter().enumerate() {
      let Some(node) = node else { continue };
      if let Some(server) = &node.server {
        tracker.replace(LoadId::server(position), server.uses.dependencies.clone());
      }
      if let Some(uses) = &node.universal.uses {
        tracker.replace(LoadId::universal(position), uses.dependencies.clone());
      }
    }
    tracker
  }

  /// The previous result at `position` when it came from the same node.
  pub(crate) fn previous(&self, position: usize, node: usize) -> Option<&BranchNode> {
    self.branch.get(position).and_then(Option::as_ref).filter(|b| b.node == node)
  }
}

/// What [`crate::Client::preload_data`] found at a URL.
#[derive(Debug, Clone, PartialEq)]
pub enum Preloaded {
  /// The page loaded, possibly as an error page.
  Loaded { status: u16, data: DataMap },
  /// A load redirected to this location.
  Redirect(String),
}

/// Outcome of loading a route without committing it.
#[derive(Debug, Clone)]
pub(crate) enum Loaded {
  Page(Box<Current>),
  Redirect(String),
  /// Only a full document load can show this URL.
  Unload(Url),
}
