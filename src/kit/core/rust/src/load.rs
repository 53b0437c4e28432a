/* src/kit/core/rust/src/load.rs */

// Load orchestration. Every node of a branch becomes a shared future so
// `parent()` can await its ancestors without re-running them, and siblings
// that never call `parent()` run concurrently.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::{self, FutureExt, Shared};
use futures_util::stream::{FuturesUnordered, StreamExt};
use http::Request;
use serde_json::Value;
use url::Url;

use crate::BoxFuture;
use crate::control::LoadError;
use crate::cookies::Cookies;
use crate::deps::{DependencyKey, UsageRecorder, Uses};
use crate::errors::KitError;
use crate::event::{RequestEvent, ResponseHeaders};
use crate::fetch::{Fetch, FetchResult};
use crate::node::NodeDef;
use crate::routing::Params;

pub type DataMap = serde_json::Map<String, Value>;

/// One node's execution, awaitable any number of times.
pub type NodeTask<T> = Shared<BoxFuture<Result<T, LoadError>>>;

type ParentTask = Shared<BoxFuture<Result<DataMap, LoadError>>>;

/// URL, params and route id a branch is loaded for.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadTarget {
  pub url: Url,
  pub params: Params,
  pub route_id: Option<String>,
}

impl LoadTarget {
  fn label(&self) -> String {
    self.route_id.clone().unwrap_or_else(|| self.url.path().to_string())
  }
}

/// Accessors shared by both event kinds; every read is recorded.
#[derive(Clone)]
struct Tracked {
  target: Arc<LoadTarget>,
  uses: UsageRecorder,
  parent: ParentTask,
}

impl Tracked {
  fn params(&self) -> &Params {
    self.uses.all_params(self.target.params.keys());
    &self.target.params
  }

  fn param(&self, name: &str) -> Option<&str> {
    self.uses.param(name);
    self.target.params.get(name).map(String::as_str)
  }

  fn url(&self) -> &Url {
    self.uses.url();
    &self.target.url
  }

  fn search_param(&self, name: &str) -> Option<String> {
    self.uses.search_param(name);
    self.target.url.query_pairs().find(|(k, _)| k == name).map(|(_, v)| v.into_owned())
  }

  fn route_id(&self) -> Option<&str> {
    self.uses.route();
    self.target.route_id.as_deref()
  }

  fn parent(&self) -> ParentTask {
    self.uses.parent();
    self.parent.clone()
  }

  fn depends<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Result<(), KitError> {
    for key in keys {
      self.uses.depend(DependencyKey::parse(key, &self.target.url)?);
    }
    Ok(())
  }

  fn track_fetch(&self, request: &Request<Bytes>) {
    if let Ok(key) = DependencyKey::parse(&request.uri().to_string(), &self.target.url) {
      self.uses.depend(key);
    }
  }
}

/// Argument of a server `load`: the request event plus dependency tracking.
#[derive(Clone)]
pub struct ServerLoadEvent {
  request: RequestEvent,
  tracked: Tracked,
}

impl ServerLoadEvent {
  pub fn request(&self) -> &RequestEvent {
    &self.request
  }

  pub fn params(&self) -> &Params {
    self.tracked.params()
  }

  pub fn param(&self, name: &str) -> Option<&str> {
    self.tracked.param(name)
  }

  pub fn url(&self) -> &Url {
    self.tracked.url()
  }

  pub fn search_param(&self, name: &str) -> Option<String> {
    self.tracked.search_param(name)
  }

  pub fn route_id(&self) -> Option<&str> {
    self.tracked.route_id()
  }

  /// Merged server data of every ancestor layout. Resolved once per execution;
  /// awaiting it suspends this load until those ancestors settle.
  pub fn parent(&self) -> impl Future<Output = Result<DataMap, LoadError>> + Send + 'static {
    self.tracked.parent()
  }

  pub fn depends<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Result<(), KitError> {
    self.tracked.depends(keys)
  }

  pub fn cookies(&self) -> &Cookies {
    self.request.cookies()
  }

  pub fn set_headers<'a>(&self, headers: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<(), KitError> {
    self.request.set_headers(headers)
  }

  pub fn fetch(&self, request: Request<Bytes>) -> BoxFuture<FetchResult> {
    self.tracked.track_fetch(&request);
    self.request.fetch(request)
  }
}

/// Argument of a universal `load`, which runs on the server during SSR and in
/// the client afterwards.
#[derive(Clone)]
pub struct LoadEvent {
  tracked: Tracked,
  data: Option<DataMap>,
  headers: ResponseHeaders,
  fetch: Arc<dyn Fetch>,
}

impl LoadEvent {
  /// Output of this node's server load, if it has one.
  pub fn data(&self) -> Option<&DataMap> {
    self.data.as_ref()
  }

  pub fn params(&self) -> &Params {
    self.tracked.params()
  }

  pub fn param(&self, name: &str) -> Option<&str> {
    self.tracked.param(name)
  }

  pub fn url(&self) -> &Url {
    self.tracked.url()
  }

  pub fn search_param(&self, name: &str) -> Option<String> {
    self.tracked.search_param(name)
  }

  pub fn route_id(&self) -> Option<&str> {
    self.tracked.route_id()
  }

  pub fn parent(&self) -> impl Future<Output = Result<DataMap, LoadError>> + Send + 'static {
    self.tracked.parent()
  }

  pub fn depends<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Result<(), KitError> {
    self.tracked.depends(keys)
  }

  /// No-op when rendering in the client.
  pub fn set_headers<'a>(&self, headers: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<(), KitError> {
    self.headers.set_all(headers)
  }

  pub fn fetch(&self, request: Request<Bytes>) -> BoxFuture<FetchResult> {
    self.tracked.track_fetch(&request);
    self.fetch.fetch(request)
  }
}

/// Result of one node's server load.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerData {
  pub data: Option<DataMap>,
  pub uses: Uses,
}

/// Final data of one node after the universal phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeData {
  pub data: Option<DataMap>,
  /// Present when a universal load ran for this node.
  pub uses: Option<Uses>,
}

pub enum UniversalInput {
  /// Run the node with this server data.
  Run(Option<DataMap>),
  /// Keep a previous result without running anything.
  Reuse(NodeData),
}

/// Where universal loads send headers and fetches.
#[derive(Clone)]
pub struct UniversalEnv {
  pub headers: ResponseHeaders,
  pub fetch: Arc<dyn Fetch>,
}

#[derive(Debug, Clone)]
pub struct NodeError {
  pub index: usize,
  pub error: LoadError,
}

/// Outcome of driving a branch. `results[i]` is `Some` for every driven node
/// shallower than `error.index` (or every driven node when there is no error).
#[derive(Debug, Clone)]
pub struct Settled<T> {
  pub results: Vec<Option<T>>,
  pub error: Option<NodeError>,
}

impl<T> Settled<T> {
  pub fn into_result(self) -> Result<Vec<Option<T>>, NodeError> {
    match self.error {
      Some(err) => Err(err),
      None => Ok(self.results),
    }
  }
}

fn validate_output(output: Option<Value>, target: &LoadTarget) -> Result<Option<DataMap>, KitError> {
  match output {
    None | Some(Value::Null) => Ok(None),
    Some(Value::Object(map)) => Ok(Some(map)),
    Some(_) => Err(KitError::InvalidLoadOutput { route: target.label() }),
  }
}

/// Shallow merge, later layers win.
pub fn merge_data<'a>(layers: impl IntoIterator<Item = Option<&'a DataMap>>) -> DataMap {
  let mut merged = DataMap::new();
  for layer in layers.into_iter().flatten() {
    merged.extend(layer.iter().map(|(k, v)| (k.clone(), v.clone())));
  }
  merged
}

fn parent_task<T, F>(ancestors: &[NodeTask<T>], pick: F) -> ParentTask
where
  T: Clone + Send + Sync + 'static,
  F: Fn(&T) -> Option<&DataMap> + Send + Sync + 'static,
{
  let ancestors = ancestors.to_vec();
  let fut: BoxFuture<Result<DataMap, LoadError>> = Box::pin(async move {
    let mut merged = DataMap::new();
    for task in ancestors {
      let value = task.await?;
      if let Some(data) = pick(&value) {
        merged.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
      }
    }
    Ok(merged)
  });
  fut.shared()
}

fn ready<T: Clone + Send + Sync + 'static>(value: T) -> NodeTask<T> {
  let fut: BoxFuture<Result<T, LoadError>> = Box::pin(future::ready(Ok(value)));
  fut.shared()
}

/// Server loads for `nodes` (layouts then leaf). Nothing runs until a task is
/// polled, either by [`settle`] or by a descendant's `parent()`.
pub fn server_tasks(event: &RequestEvent, nodes: &[Option<Arc<NodeDef>>]) -> Vec<NodeTask<Option<ServerData>>> {
  let target = Arc::new(LoadTarget {
    url: event.url().clone(),
    params: event.params().clone(),
    route_id: event.route_id().map(str::to_string),
  });

  let mut tasks: Vec<NodeTask<Option<ServerData>>> = Vec::with_capacity(nodes.len());
  for node in nodes {
    let Some(load) = node.as_ref().and_then(|n| n.server_load.clone()) else {
      tasks.push(ready(None));
      continue;
    };
    let uses = UsageRecorder::default();
    let parent = parent_task(&tasks, |sd: &Option<ServerData>| sd.as_ref().and_then(|s| s.data.as_ref()));
    let load_event = ServerLoadEvent {
      request: event.clone(),
      tracked: Tracked { target: target.clone(), uses: uses.clone(), parent },
    };
    let target = target.clone();
    let fut: BoxFuture<Result<Option<ServerData>, LoadError>> = Box::pin(async move {
      let output = load(load_event).await?;
      let data = validate_output(output, &target)?;
      Ok(Some(ServerData { data, uses: uses.snapshot() }))
    });
    tasks.push(fut.shared());
  }
  tasks
}

/// Universal loads for `nodes`. A node without a universal load passes its
/// server data through unchanged.
pub fn universal_tasks(
  target: &LoadTarget,
  nodes: &[Option<Arc<NodeDef>>],
  inputs: Vec<UniversalInput>,
  env: &UniversalEnv,
) -> Vec<NodeTask<NodeData>> {
  let target = Arc::new(target.clone());
  let mut tasks: Vec<NodeTask<NodeData>> = Vec::with_capacity(nodes.len());
  for (node, input) in nodes.iter().zip(inputs) {
    let server_data = match input {
      UniversalInput::Reuse(previous) => {
        tasks.push(ready(previous));
        continue;
      }
      UniversalInput::Run(server_data) => server_data,
    };
    let Some(load) = node.as_ref().and_then(|n| n.universal_load.clone()) else {
      tasks.push(ready(NodeData { data: server_data, uses: None }));
      continue;
    };
    let uses = UsageRecorder::default();
    let parent = parent_task(&tasks, |nd: &NodeData| nd.data.as_ref());
    let load_event = LoadEvent {
      tracked: Tracked { target: target.clone(), uses: uses.clone(), parent },
      data: server_data,
      headers: env.headers.clone(),
      fetch: env.fetch.clone(),
    };
    let target = target.clone();
    let fut: BoxFuture<Result<NodeData, LoadError>> = Box::pin(async move {
      let output = load(load_event).await?;
      let data = validate_output(output, &target)?;
      Ok(NodeData { data, uses: Some(uses.snapshot()) })
    });
    tasks.push(fut.shared());
  }
  tasks
}

/// Drive the tasks marked in `drive` concurrently. Stops at the shallowest
/// failure once every shallower node has completed; deeper work still in
/// flight is dropped.
pub async fn settle<T>(tasks: &[NodeTask<T>], drive: &[bool]) -> Settled<T>
where
  T: Clone + Send + Sync + 'static,
{
  let n = tasks.len();
  let mut results: Vec<Option<T>> = vec![None; n];
  let mut done: Vec<bool> = (0..n).map(|i| !drive.get(i).copied().unwrap_or(false)).collect();
  let mut error: Option<NodeError> = None;

  let mut pending: FuturesUnordered<_> = tasks
    .iter()
    .enumerate()
    .filter(|(i, _)| !done[*i])
    .map(|(i, task)| task.clone().map(move |res| (i, res)))
    .collect();

  while let Some((i, res)) = pending.next().await {
    done[i] = true;
    match res {
      Ok(value) => results[i] = Some(value),
      Err(err) => {
        if error.as_ref().is_none_or(|e| i < e.index) {
          error = Some(NodeError { index: i, error: err });
        }
      }
    }
    if let Some(ref e) = error {
      if done[..e.index].iter().all(|d| *d) {
        break;
      }
    }
  }

  if let Some(ref e) = error {
    results.truncate(e.index);
    results.resize(n, None);
  }
  Settled { results, error }
}

/// Drive every node of a branch.
pub async fn settle_all<T>(tasks: &[NodeTask<T>]) -> Settled<T>
where
  T: Clone + Send + Sync + 'static,
{
  settle(tasks, &vec![true; tasks.len()]).await
}
