/* src/kit/core/rust/src/manifest.rs */

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::errors::KitError;
use crate::node::{EndpointDef, NodeDef, Prerender};
use crate::routing::{ParamMatchers, Params, RoutePattern, compare_routes};

/// A compiled route. Immutable once the manifest is built.
#[derive(Debug, Clone)]
pub struct Route {
  pub id: String,
  pub pattern: RoutePattern,
  /// One entry per layout level, outermost first. `None` levels forward
  /// their parent's data unchanged.
  pub layouts: Vec<Option<usize>>,
  /// Error boundaries aligned with `layouts`.
  pub errors: Vec<Option<usize>>,
  pub leaf: Option<usize>,
  pub endpoint: Option<EndpointDefHandle>,
  /// Upper-case verbs, or `*` when an endpoint fallback accepts anything.
  pub methods: Vec<String>,
  pub prerender: Prerender,
}

/// Shared endpoint handlers, printable for route debugging.
#[derive(Clone)]
pub struct EndpointDefHandle(pub Arc<EndpointDef>);

impl std::fmt::Debug for EndpointDefHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("EndpointDef").field("methods", &self.0.allowed_methods()).finish_non_exhaustive()
  }
}

impl Route {
  pub fn is_page(&self) -> bool {
    self.leaf.is_some()
  }

  pub fn endpoint(&self) -> Option<&EndpointDef> {
    self.endpoint.as_ref().map(|e| e.0.as_ref())
  }

  /// Node slots the data request protocol addresses: layouts, then the leaf.
  pub fn branch(&self) -> Vec<Option<usize>> {
    let mut branch = self.layouts.clone();
    branch.push(self.leaf);
    branch
  }
}

#[derive(Debug, Clone)]
pub struct RouteMatch {
  pub route: Arc<Route>,
  pub params: Params,
}

/// Route table, node table and param matchers for one app.
#[derive(Debug, Clone)]
pub struct Manifest {
  routes: Vec<Arc<Route>>,
  nodes: Vec<Arc<NodeDef>>,
  matchers: ParamMatchers,
  root_layout: Option<usize>,
  root_error: Option<usize>,
}

impl Manifest {
  pub fn builder() -> ManifestBuilder {
    ManifestBuilder::default()
  }

  /// First route, in priority order, whose pattern accepts `pathname`.
  pub fn match_path(&self, pathname: &str) -> Option<RouteMatch> {
    self.routes.iter().find_map(|route| {
      route.pattern.exec(pathname, &self.matchers).map(|params| RouteMatch { route: route.clone(), params })
    })
  }

  pub fn routes(&self) -> &[Arc<Route>] {
    &self.routes
  }

  pub fn route(&self, id: &str) -> Option<&Arc<Route>> {
    self.routes.iter().find(|r| r.id == id)
  }

  pub fn node(&self, index: usize) -> Option<&Arc<NodeDef>> {
    self.nodes.get(index)
  }

  pub fn nodes(&self) -> &[Arc<NodeDef>] {
    &self.nodes
  }

  pub fn matchers(&self) -> &ParamMatchers {
    &self.matchers
  }

  /// Layout at `/`, used when rendering errors for unmatched paths.
  pub fn root_layout(&self) -> Option<usize> {
    self.root_layout
  }

  pub fn root_error(&self) -> Option<usize> {
    self.root_error
  }
}

#[derive(Default)]
pub struct ManifestBuilder {
  layouts: BTreeMap<String, NodeDef>,
  errors: BTreeMap<String, NodeDef>,
  pages: BTreeMap<String, NodeDef>,
  endpoints: BTreeMap<String, EndpointDef>,
  matchers: ParamMatchers,
  failure: Option<KitError>,
}

impl ManifestBuilder {
  /// `+layout` for the directory `dir` (a route id prefix such as `/blog`).
  pub fn layout(mut self, dir: &str, node: NodeDef) -> Self {
    if self.layouts.insert(dir.to_string(), node).is_some() {
      self.fail(KitError::DuplicateNode(format!("{dir} (layout)")));
    }
    self
  }

  /// `+error` boundary for the directory `dir`.
  pub fn error(mut self, dir: &str, node: NodeDef) -> Self {
    if self.errors.insert(dir.to_string(), node).is_some() {
      self.fail(KitError::DuplicateNode(format!("{dir} (error)")));
    }
    self
  }

  pub fn page(mut self, id: &str, node: NodeDef) -> Self {
    if self.pages.insert(id.to_string(), node).is_some() {
      self.fail(KitError::DuplicateRoute(id.to_string()));
    }
    self
  }

  pub fn endpoint(mut self, id: &str, endpoint: EndpointDef) -> Self {
    if self.endpoints.insert(id.to_string(), endpoint).is_some() {
      self.fail(KitError::DuplicateRoute(id.to_string()));
    }
    self
  }

  pub fn matcher(mut self, name: &str, f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
    self.matchers.insert(name, f);
    self
  }

  fn fail(&mut self, err: KitError) {
    self.failure.get_or_insert(err);
  }

  pub fn build(self) -> Result<Manifest, KitError> {
    if let Some(err) = self.failure {
      return Err(err);
    }

    let mut nodes = Vec::new();
    let mut index_all = |defs: BTreeMap<String, NodeDef>| -> BTreeMap<String, usize> {
      defs
        .into_iter()
        .map(|(key, node)| {
          nodes.push(Arc::new(node));
          (key, nodes.len() - 1)
        })
        .collect()
    };
    let layouts = index_all(self.layouts);
    let errors = index_all(self.errors);
    let pages = index_all(self.pages);

    for dir in layouts.keys().chain(errors.keys()) {
      if !dir.starts_with('/') {
        return Err(KitError::InvalidRouteId {
          route: dir.clone(),
          reason: "layout directories must start with '/'".to_string(),
        });
      }
    }

    let mut endpoints = self.endpoints;
    let ids: BTreeSet<String> = pages.keys().chain(endpoints.keys()).cloned().collect();
    let mut routes = Vec::with_capacity(ids.len());

    for id in ids {
      let pattern = RoutePattern::parse(&id)?;
      if let Some(matcher) = pattern.matcher_names().find(|name| !self.matchers.contains(name)) {
        return Err(KitError::UnknownMatcher { route: id.clone(), matcher: matcher.to_string() });
      }

      let mut route_layouts = Vec::new();
      let mut route_errors = Vec::new();
      for (depth, dir) in ancestors(&id).into_iter().enumerate() {
        let layout = layouts.get(&dir).copied();
        let error = errors.get(&dir).copied();
        if depth == 0 || layout.is_some() || error.is_some() {
          route_layouts.push(layout);
          route_errors.push(error);
        }
      }

      let leaf = pages.get(&id).copied();
      let endpoint = endpoints.remove(&id).map(|e| EndpointDefHandle(Arc::new(e)));

      let mut methods = BTreeSet::new();
      if let Some(ref endpoint) = endpoint {
        methods.extend(endpoint.0.allowed_methods());
        if endpoint.0.fallback.is_some() {
          methods.insert("*".to_string());
        }
      }
      if let Some(leaf) = leaf {
        methods.insert("GET".to_string());
        methods.insert("HEAD".to_string());
        if !nodes[leaf].actions.is_empty() {
          methods.insert("POST".to_string());
        }
      }

      // Page options cascade: the deepest node that sets one wins.
      let cascaded = leaf
        .into_iter()
        .chain(route_layouts.iter().rev().flatten().copied())
        .find_map(|i| nodes[i].prerender);
      let prerender = leaf
        .is_none()
        .then(|| endpoint.as_ref().and_then(|e| e.0.prerender))
        .flatten()
        .or(cascaded)
        .unwrap_or(Prerender::No);

      routes.push(Route {
        id,
        pattern,
        layouts: route_layouts,
        errors: route_errors,
        leaf,
        endpoint,
        methods: methods.into_iter().collect(),
        prerender,
      });
    }

    routes.sort_by(|a, b| compare_routes(&a.pattern, &b.pattern));
    tracing::debug!(routes = routes.len(), nodes = nodes.len(), "manifest built");

    Ok(Manifest {
      routes: routes.into_iter().map(Arc::new).collect(),
      nodes,
      matchers: self.matchers,
      root_layout: layouts.get("/").copied(),
      root_error: errors.get("/").copied(),
    })
  }
}

/// `/a/(g)/b` -> `["/", "/a", "/a/(g)", "/a/(g)/b"]`.
fn ancestors(id: &str) -> Vec<String> {
  let mut dirs = vec!["/".to_string()];
  let mut current = String::new();
  for segment in id.split('/').filter(|s| !s.is_empty()) {
    current.push('/');
    current.push_str(segment);
    dirs.push(current.clone());
  }
  dirs
}
