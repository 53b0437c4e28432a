/* src/client/core/rust/src/client.rs */

use std::mem;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use futures_util::FutureExt;
use futures_util::future::{Shared, join_all};
use futures_util::lock::Mutex as AsyncMutex;
use parking_lot::Mutex;
use serde_json::Value;
use trellis_kit::fetch::{Fetch, no_fetch};
use trellis_kit::routing::strip_base;
use trellis_kit::{BoxFuture, ErrorBody, Invalidation, KitConfig, KitError, LoadError, Manifest, Params, Route};
use url::{Origin, Url};

use crate::error::NavigationError;
use crate::host::{Host, ServerDataSource};
use crate::navigation::{
  AfterNavigateFn, BeforeNavigate, BeforeNavigateFn, CallbackId, Callbacks, Cleanup, Completion, Navigation,
  NavigationTarget, NavigationType, OnNavigateFn, completion, run_before,
};
use crate::rerun::{invalidated_loads, page_key};
use crate::state::{Current, Loaded, Page, Preloaded};

pub type ClientHandleErrorFn = Arc<dyn Fn(&LoadError, &NavigationTarget) -> Option<Value> + Send + Sync>;

type Batch = Shared<BoxFuture<Result<(), NavigationError>>>;
type LoadTask = Shared<BoxFuture<Result<Loaded, NavigationError>>>;

#[derive(Debug, Clone, Default)]
pub struct GotoOptions {
  /// Replace the current history entry instead of pushing one.
  pub replace_state: bool,
  /// Rerun every load of the target page.
  pub invalidate_all: bool,
  /// Shallow-routing state for the new history entry.
  pub state: Option<Value>,
}

/// A route resolved for a URL inside the app.
#[derive(Clone)]
pub(crate) struct Intent {
  pub url: Url,
  pub route: Arc<Route>,
  pub params: Params,
}

impl Intent {
  pub(crate) fn target(&self) -> NavigationTarget {
    NavigationTarget { url: self.url.clone(), route_id: Some(self.route.id.clone()), params: self.params.clone() }
  }
}

struct Preload {
  key: Url,
  version: u64,
  task: LoadTask,
}

struct NavRequest {
  url: Url,
  kind: NavigationType,
  options: GotoOptions,
  delta: Option<i64>,
  redirects: usize,
}

impl NavRequest {
  fn new(url: Url, kind: NavigationType) -> Self {
    Self { url, kind, options: GotoOptions::default(), delta: None, redirects: 0 }
  }
}

#[derive(Default)]
struct State {
  origin: Option<Origin>,
  current: Option<Current>,
  /// Bumped by every navigation and refresh; only the latest may commit.
  token: u64,
  /// Bumped on every commit and invalidation. Preloads from older versions are stale.
  version: u64,
  preload: Option<Preload>,
  invalidated: Vec<Invalidation>,
  force_invalidation: bool,
  /// The refresh that has not started yet; new invalidations join it.
  next_batch: Option<Batch>,
  navigating: Option<Navigation>,
}

pub(crate) struct ClientInner {
  pub(crate) manifest: Manifest,
  pub(crate) config: KitConfig,
  pub(crate) host: Arc<dyn Host>,
  pub(crate) source: Arc<dyn ServerDataSource>,
  pub(crate) fetch: Arc<dyn Fetch>,
  handle_error: Option<ClientHandleErrorFn>,
  state: Mutex<State>,
  /// Held from the last token check through `Host::commit`.
  committing: Mutex<()>,
  callbacks: Mutex<Callbacks>,
  /// Held while a refresh runs so batches run one after another.
  refresh: AsyncMutex<()>,
}

/// The client router. Cloning shares the same state.
#[derive(Clone)]
pub struct Client {
  pub(crate) inner: Arc<ClientInner>,
}

impl Client {
  pub fn builder(manifest: Manifest, host: Arc<dyn Host>, source: Arc<dyn ServerDataSource>) -> ClientBuilder {
    ClientBuilder { manifest, host, source, config: KitConfig::default(), fetch: no_fetch(), handle_error: None }
  }

  pub fn manifest(&self) -> &Manifest {
    &self.inner.manifest
  }

  pub fn config(&self) -> &KitConfig {
    &self.inner.config
  }

  /// The committed page, once hydrated.
  pub fn page(&self) -> Option<Page> {
    self.inner.state.lock().current.as_ref().map(|c| c.page.clone())
  }

  pub(crate) fn current(&self) -> Option<Current> {
    self.inner.state.lock().current.clone()
  }

  /// The navigation in flight, if any.
  pub fn navigating(&self) -> Option<Navigation> {
    self.inner.state.lock().navigating.clone()
  }

  // -- navigation ------------------------------------------------------------

  pub async fn goto(&self, href: &str, options: GotoOptions) -> Result<(), NavigationError> {
    let url = self.resolve(href)?;
    self.navigate(NavRequest { options, ..NavRequest::new(url, NavigationType::Goto) }).await
  }

  pub async fn follow_link(&self, href: &str) -> Result<(), NavigationError> {
    let url = self.resolve(href)?;
    self.navigate(NavRequest::new(url, NavigationType::Link)).await
  }

  /// A `GET` form submission to `href` (already carrying the form fields).
  pub async fn submit_form(&self, href: &str) -> Result<(), NavigationError> {
    let url = self.resolve(href)?;
    self.navigate(NavRequest::new(url, NavigationType::Form)).await
  }

  /// The browser moved `delta` entries through history and now shows `href`.
  pub async fn popstate(&self, href: &str, delta: i64) -> Result<(), NavigationError> {
    let url = self.resolve(href)?;
    self.navigate(NavRequest { delta: Some(delta), ..NavRequest::new(url, NavigationType::Popstate) }).await
  }

  /// The document is about to unload. `false` when it should stay.
  pub fn leave(&self) -> bool {
    let navigation = Navigation {
      from: self.current_target(),
      to: None,
      kind: NavigationType::Leave,
      will_unload: true,
      delta: None,
      complete: completion().1,
    };
    !self.cancelled(&navigation)
  }

  fn navigate(&self, request: NavRequest) -> BoxFuture<Result<(), NavigationError>> {
    let client = self.clone();
    Box::pin(async move {
      let (settle, complete) = completion();
      let outcome = client.run_navigation(request, complete).await;
      if !matches!(outcome, Err(NavigationError::Unloaded(_))) {
        settle.settle(outcome.clone());
      }
      outcome
    })
  }

  async fn run_navigation(&self, request: NavRequest, complete: Completion) -> Result<(), NavigationError> {
    let intent = self.intent(&request.url);
    let to = match &intent {
      Some(intent) => intent.target(),
      None => NavigationTarget { url: request.url.clone(), route_id: None, params: Params::new() },
    };
    let navigation = Navigation {
      from: self.current_target(),
      to: Some(to),
      kind: request.kind,
      will_unload: intent.is_none(),
      delta: request.delta,
      complete,
    };

    if self.cancelled(&navigation) {
      if let Some(delta) = request.delta {
        self.inner.host.go(-delta);
      }
      return Err(NavigationError::Cancelled);
    }

    let Some(intent) = intent else {
      return self.unload(&request.url);
    };

    let token = {
      let mut state = self.inner.state.lock();
      state.token += 1;
      state.navigating = Some(navigation.clone());
      state.token
    };
    tracing::debug!(url = %intent.url, route = %intent.route.id, kind = %request.kind, "navigating");

    let loaded = self.load_for_navigation(&intent, request.options.invalidate_all).await;
    let loaded = self.still_latest(token, loaded)?;
    let mut next = match loaded {
      Loaded::Page(next) => next,
      Loaded::Redirect(location) => {
        self.settle_navigating(token);
        return self.follow_redirect(&intent.url, &location, &request.options, request.redirects).await;
      }
      Loaded::Unload(url) => {
        self.settle_navigating(token);
        return self.unload(&url);
      }
    };

    let cleanups = match self.run_on_navigate(&navigation).await {
      Ok(cleanups) => cleanups,
      Err(err) => {
        self.settle_navigating(token);
        return Err(err);
      }
    };
    self.still_latest(token, Ok(()))?;

    next.page.state = request.options.state;
    if request.kind != NavigationType::Popstate {
      let state = next.page.state.as_ref();
      if request.options.replace_state {
        self.inner.host.replace_state(&next.page.url, state);
      } else {
        self.inner.host.push_state(&next.page.url, state);
      }
    }
    self.commit(token, *next, true)?;
    for cleanup in cleanups {
      cleanup();
    }
    self.run_after_navigate(&navigation);
    Ok(())
  }

  async fn follow_redirect(
    &self,
    from: &Url,
    location: &str,
    options: &GotoOptions,
    redirects: usize,
  ) -> Result<(), NavigationError> {
    let max = self.inner.config.client.max_redirects;
    if redirects >= max {
      tracing::warn!(from = %from, location, "too many redirects");
      return Err(NavigationError::TooManyRedirects(max));
    }
    let url = from.join(location).map_err(|e| invalid_url(location, &e))?;
    tracing::debug!(from = %from, to = %url, "load redirected");
    let options = GotoOptions { replace_state: options.replace_state, ..GotoOptions::default() };
    self
      .navigate(NavRequest { options, redirects: redirects + 1, ..NavRequest::new(url, NavigationType::Goto) })
      .await
  }

  /// Use a fresh preload of the same page when there is one.
  async fn load_for_navigation(&self, intent: &Intent, force: bool) -> Result<Loaded, NavigationError> {
    let (preloaded, invalidated, force) = {
      let state = self.inner.state.lock();
      let force = force || state.force_invalidation;
      let key = page_key(&intent.url);
      let preloaded = state
        .preload
        .as_ref()
        .filter(|p| !force && p.key == key && p.version == state.version)
        .map(|p| p.task.clone());
      (preloaded, state.invalidated.clone(), force)
    };
    match preloaded {
      Some(task) => {
        tracing::debug!(url = %intent.url, "using preloaded data");
        task.await
      }
      None => self.load_route(intent, &invalidated, force).await,
    }
  }

  fn still_latest<T>(&self, token: u64, value: Result<T, NavigationError>) -> Result<T, NavigationError> {
    let mut state = self.inner.state.lock();
    if state.token != token {
      tracing::warn!(token, latest = state.token, "navigation superseded");
      return Err(NavigationError::Superseded);
    }
    if value.is_err() {
      state.navigating = None;
    }
    value
  }

  fn settle_navigating(&self, token: u64) {
    let mut state = self.inner.state.lock();
    if state.token == token {
      state.navigating = None;
    }
  }

  fn cancelled(&self, navigation: &Navigation) -> bool {
    let callbacks: Vec<BeforeNavigateFn> = self.inner.callbacks.lock().before.iter().map(|(_, f)| f.clone()).collect();
    let cancelled = run_before(&callbacks, navigation);
    if cancelled && navigation.will_unload {
      return !self.inner.host.confirm_unload();
    }
    cancelled
  }

  async fn run_on_navigate(&self, navigation: &Navigation) -> Result<Vec<Cleanup>, NavigationError> {
    let callbacks: Vec<OnNavigateFn> = self.inner.callbacks.lock().on.iter().map(|(_, f)| f.clone()).collect();
    let results = join_all(callbacks.iter().map(|f| f(navigation.clone()))).await;
    let mut cleanups = Vec::new();
    for result in results {
      match result {
        Ok(Some(cleanup)) => cleanups.push(cleanup),
        Ok(None) => {}
        Err(err) => {
          tracing::warn!(error = %err, "on_navigate callback failed");
          return Err(NavigationError::Aborted(err.to_string()));
        }
      }
    }
    Ok(cleanups)
  }

  fn run_after_navigate(&self, navigation: &Navigation) {
    let callbacks: Vec<AfterNavigateFn> = self.inner.callbacks.lock().after.iter().map(|(_, f)| f.clone()).collect();
    for callback in callbacks {
      callback(navigation);
    }
  }

  /// Show `next` unless a newer navigation or refresh took `token`'s place.
  /// A navigation's loads already saw every pending invalidation, so
  /// `navigated` drops them.
  fn commit(&self, token: u64, next: Current, navigated: bool) -> Result<(), NavigationError> {
    let _committing = self.inner.committing.lock();
    let page = next.page.clone();
    {
      let mut state = self.inner.state.lock();
      if state.token != token {
        tracing::warn!(token, latest = state.token, url = %page.url, "navigation superseded before commit");
        return Err(NavigationError::Superseded);
      }
      state.current = Some(next);
      state.version += 1;
      state.preload = None;
      state.navigating = None;
      if navigated {
        state.invalidated.clear();
        state.force_invalidation = false;
      }
    }
    self.inner.host.commit(&page);
    Ok(())
  }

  pub(crate) fn unload(&self, url: &Url) -> Result<(), NavigationError> {
    tracing::debug!(url = %url, "full page load");
    self.inner.host.navigate_document(url);
    Err(NavigationError::Unloaded(url.to_string()))
  }

  // -- hydration -------------------------------------------------------------

  /// Adopt the server-rendered page at `href` and run the `enter` navigation.
  pub async fn hydrate(&self, href: &str, payload: trellis_kit::wire::HydrationPayload) -> Result<(), NavigationError> {
    let url = Url::parse(href).map_err(|e| invalid_url(href, &e))?;
    let token = {
      let mut state = self.inner.state.lock();
      state.origin = Some(url.origin());
      state.token += 1;
      state.token
    };
    let current = match self.load_hydration(url.clone(), payload).await {
      Loaded::Page(current) => *current,
      Loaded::Redirect(location) => {
        let options = GotoOptions { replace_state: true, ..GotoOptions::default() };
        return self.follow_redirect(&url, &location, &options, 0).await;
      }
      Loaded::Unload(url) => return self.unload(&url),
    };
    let (settle, complete) = completion();
    let navigation = Navigation {
      from: None,
      to: Some(current.page.target()),
      kind: NavigationType::Enter,
      will_unload: false,
      delta: None,
      complete,
    };
    self.commit(token, current, true)?;
    settle.settle(Ok(()));
    self.run_after_navigate(&navigation);
    Ok(())
  }

  // -- preloading ------------------------------------------------------------

  /// Load `href`'s data without committing it. The next navigation to the
  /// same page reuses the result unless something was invalidated meanwhile.
  pub async fn preload_data(&self, href: &str) -> Result<Preloaded, NavigationError> {
    let url = self.resolve(href)?;
    let Some(intent) = self.intent(&url) else {
      return Err(NavigationError::External(url.to_string()));
    };
    let task = {
      let mut state = self.inner.state.lock();
      let key = page_key(&url);
      let reusable =
        state.preload.as_ref().filter(|p| p.key == key && p.version == state.version).map(|p| p.task.clone());
      match reusable {
        Some(task) => task,
        None => {
          let weak = Arc::downgrade(&self.inner);
          let fut: BoxFuture<Result<Loaded, NavigationError>> = Box::pin(async move {
            let client = upgrade(&weak)?;
            let invalidated = client.inner.state.lock().invalidated.clone();
            client.load_route(&intent, &invalidated, false).await
          });
          let task = fut.shared();
          state.preload = Some(Preload { key, version: state.version, task: task.clone() });
          task
        }
      }
    };
    match task.await? {
      Loaded::Page(current) => Ok(Preloaded::Loaded { status: current.page.status, data: current.page.data }),
      Loaded::Redirect(location) => Ok(Preloaded::Redirect(location)),
      Loaded::Unload(url) => Err(NavigationError::External(url.to_string())),
    }
  }

  /// Load the components of `href`'s route ahead of time.
  pub async fn preload_code(&self, href: &str) -> Result<(), NavigationError> {
    let url = self.resolve(href)?;
    let Some(intent) = self.intent(&url) else {
      return Ok(());
    };
    let components: Vec<String> = intent
      .route
      .branch()
      .into_iter()
      .flatten()
      .filter_map(|i| self.inner.manifest.node(i).map(|n| n.component.clone()))
      .collect();
    self.inner.host.preload_code(&components).await;
    Ok(())
  }

  // -- invalidation ----------------------------------------------------------

  /// Rerun the loads of the current page that depend on `invalidation`.
  /// Calls made while a refresh is running join the next one.
  pub async fn invalidate(&self, invalidation: Invalidation) -> Result<(), NavigationError> {
    let batch = {
      let mut state = self.inner.state.lock();
      match invalidation {
        Invalidation::All => state.force_invalidation = true,
        other => state.invalidated.push(other),
      }
      state.version += 1;
      state.preload = None;
      self.batch(&mut state)
    };
    batch.await
  }

  /// `invalidate` for a URL or custom identifier such as `app:session`.
  pub async fn invalidate_key(&self, key: &str) -> Result<(), NavigationError> {
    let base = self.base_url().ok_or(NavigationError::NotHydrated)?;
    let invalidation = Invalidation::key(key, &base).map_err(|e| NavigationError::InvalidUrl {
      url: key.to_string(),
      reason: e.to_string(),
    })?;
    self.invalidate(invalidation).await
  }

  pub async fn invalidate_all(&self) -> Result<(), NavigationError> {
    self.invalidate(Invalidation::All).await
  }

  fn batch(&self, state: &mut State) -> Batch {
    if let Some(batch) = &state.next_batch {
      return batch.clone();
    }
    let weak = Arc::downgrade(&self.inner);
    let fut: BoxFuture<Result<(), NavigationError>> = Box::pin(async move { upgrade(&weak)?.run_batch().await });
    let batch = fut.shared();
    state.next_batch = Some(batch.clone());
    batch
  }

  async fn run_batch(&self) -> Result<(), NavigationError> {
    let _running = self.inner.refresh.lock().await;
    let (invalidated, force) = {
      let mut state = self.inner.state.lock();
      state.next_batch = None;
      (mem::take(&mut state.invalidated), mem::take(&mut state.force_invalidation))
    };
    self.refresh(&invalidated, force).await
  }

  async fn refresh(&self, invalidated: &[Invalidation], force: bool) -> Result<(), NavigationError> {
    let (url, affected) = {
      let state = self.inner.state.lock();
      let Some(current) = &state.current else {
        return Ok(());
      };
      (current.page.url.clone(), invalidated_loads(&current.tracker(), invalidated))
    };
    if !force && affected.is_empty() {
      tracing::debug!(url = %url, "no load depends on the invalidated resources");
      return Ok(());
    }
    let Some(intent) = self.intent(&url) else {
      return Ok(());
    };

    let token = {
      let mut state = self.inner.state.lock();
      state.token += 1;
      state.token
    };
    tracing::debug!(url = %url, loads = affected.len(), force, "refreshing");
    let loaded = self.load_route(&intent, invalidated, force).await?;
    if self.inner.state.lock().token != token {
      tracing::debug!(url = %url, "refresh superseded by a navigation");
      return Ok(());
    }
    match loaded {
      Loaded::Page(mut next) => {
        next.page.state = self.page().and_then(|p| p.state);
        match self.commit(token, *next, false) {
          Err(NavigationError::Superseded) => {
            tracing::debug!(url = %url, "refresh superseded by a navigation");
            Ok(())
          }
          other => other,
        }
      }
      Loaded::Redirect(location) => self.follow_redirect(&intent.url, &location, &GotoOptions::default(), 0).await,
      Loaded::Unload(url) => self.unload(&url),
    }
  }

  // -- shallow routing -------------------------------------------------------

  /// Add a history entry for `href` carrying `state`, without running any
  /// load. An empty `href` keeps the current URL.
  pub fn push_state(&self, href: &str, state: Value) -> Result<(), NavigationError> {
    self.shallow(href, state, false)
  }

  /// Like [`Client::push_state`] but replaces the current history entry.
  pub fn replace_state(&self, href: &str, state: Value) -> Result<(), NavigationError> {
    self.shallow(href, state, true)
  }

  fn shallow(&self, href: &str, state: Value, replace: bool) -> Result<(), NavigationError> {
    let current = self.page().ok_or(NavigationError::NotHydrated)?;
    let url = if href.is_empty() { current.url.clone() } else { self.resolve(href)? };
    if url.origin() != current.url.origin() {
      return Err(NavigationError::External(url.to_string()));
    }

    let _committing = self.inner.committing.lock();
    if replace {
      self.inner.host.replace_state(&url, Some(&state));
    } else {
      self.inner.host.push_state(&url, Some(&state));
    }
    let page = {
      let mut guard = self.inner.state.lock();
      let current = guard.current.as_mut().ok_or(NavigationError::NotHydrated)?;
      current.page.state = Some(state);
      current.page.clone()
    };
    tracing::debug!(url = %url, replace, "shallow history entry");
    self.inner.host.commit(&page);
    Ok(())
  }

  // -- callbacks -------------------------------------------------------------

  /// Runs before every navigation, including `leave`. Call `cancel()` to stop it.
  pub fn before_navigate(&self, f: impl Fn(&BeforeNavigate) + Send + Sync + 'static) -> CallbackId {
    let mut callbacks = self.inner.callbacks.lock();
    let id = callbacks.next_id();
    callbacks.before.push((id, Arc::new(f)));
    id
  }

  /// Runs after the new page has loaded, before it commits. The returned
  /// cleanup runs once the page is shown; an error aborts the navigation.
  pub fn on_navigate<F, Fut>(&self, f: F) -> CallbackId
  where
    F: Fn(Navigation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Cleanup>, LoadError>> + Send + 'static,
  {
    let callback: OnNavigateFn =
      Arc::new(move |nav: Navigation| -> BoxFuture<Result<Option<Cleanup>, LoadError>> { Box::pin(f(nav)) });
    let mut callbacks = self.inner.callbacks.lock();
    let id = callbacks.next_id();
    callbacks.on.push((id, callback));
    id
  }

  /// Runs after every committed navigation, including `enter`.
  pub fn after_navigate(&self, f: impl Fn(&Navigation) + Send + Sync + 'static) -> CallbackId {
    let mut callbacks = self.inner.callbacks.lock();
    let id = callbacks.next_id();
    callbacks.after.push((id, Arc::new(f)));
    id
  }

  pub fn off(&self, id: CallbackId) {
    self.inner.callbacks.lock().remove(id);
  }

  // -- helpers ---------------------------------------------------------------

  fn current_target(&self) -> Option<NavigationTarget> {
    self.inner.state.lock().current.as_ref().map(|c| c.page.target())
  }

  fn base_url(&self) -> Option<Url> {
    let state = self.inner.state.lock();
    match &state.current {
      Some(current) => Some(current.page.url.clone()),
      None => self.inner.config.origin.as_deref().and_then(|o| Url::parse(o).ok()),
    }
  }

  fn resolve(&self, href: &str) -> Result<Url, NavigationError> {
    match Url::parse(href) {
      Ok(url) => Ok(url),
      Err(url::ParseError::RelativeUrlWithoutBase) => {
        let base = self.base_url().ok_or(NavigationError::NotHydrated)?;
        base.join(href).map_err(|e| invalid_url(href, &e))
      }
      Err(e) => Err(invalid_url(href, &e)),
    }
  }

  /// The page route for `url`, or `None` when only a full load can show it.
  pub(crate) fn intent(&self, url: &Url) -> Option<Intent> {
    let origin = self.inner.state.lock().origin.clone()?;
    if url.origin() != origin {
      return None;
    }
    let path = strip_base(url.path(), &self.inner.config.paths.base)?;
    let matched = self.inner.manifest.match_path(path)?;
    if !matched.route.is_page() {
      return None;
    }
    Some(Intent { url: url.clone(), route: matched.route, params: matched.params })
  }

  /// The client `handle_error` hook's body for an unexpected load error.
  pub(crate) fn error_body(&self, error: &LoadError, target: &NavigationTarget) -> Value {
    tracing::warn!(url = %target.url, route = target.route_id.as_deref(), %error, "unexpected error");
    let fallback = || serde_json::json!({ "message": "Internal Error" });
    let Some(hook) = &self.inner.handle_error else {
      return fallback();
    };
    match catch_unwind(AssertUnwindSafe(|| hook(error, target))) {
      Ok(Some(body)) => ErrorBody::from(body).into_value(),
      Ok(None) => fallback(),
      Err(_) => {
        tracing::error!(url = %target.url, "handle_error panicked");
        fallback()
      }
    }
  }
}

fn upgrade(weak: &Weak<ClientInner>) -> Result<Client, NavigationError> {
  weak.upgrade().map(|inner| Client { inner }).ok_or_else(|| NavigationError::Aborted("client dropped".into()))
}

fn invalid_url(url: &str, err: &url::ParseError) -> NavigationError {
  NavigationError::InvalidUrl { url: url.to_string(), reason: err.to_string() }
}

pub struct ClientBuilder {
  manifest: Manifest,
  host: Arc<dyn Host>,
  source: Arc<dyn ServerDataSource>,
  config: KitConfig,
  fetch: Arc<dyn Fetch>,
  handle_error: Option<ClientHandleErrorFn>,
}

impl ClientBuilder {
  pub fn config(mut self, config: KitConfig) -> Self {
    self.config = config;
    self
  }

  /// Transport for `fetch` calls made by universal loads.
  pub fn fetch(mut self, fetch: Arc<dyn Fetch>) -> Self {
    self.fetch = fetch;
    self
  }

  pub fn handle_error<F>(mut self, f: F) -> Self
  where
    F: Fn(&LoadError, &NavigationTarget) -> Option<Value> + Send + Sync + 'static,
  {
    self.handle_error = Some(Arc::new(f));
    self
  }

  pub fn build(self) -> Result<Client, KitError> {
    self.config.validate()?;
    let origin = match self.config.origin.as_deref() {
      Some(raw) => Some(Url::parse(raw).map_err(|e| KitError::Config(format!("origin {raw}: {e}")))?.origin()),
      None => None,
    };
    tracing::debug!(routes = self.manifest.routes().len(), base = %self.config.paths.base, "client built");
    Ok(Client {
      inner: Arc::new(ClientInner {
        manifest: self.manifest,
        config: self.config,
        host: self.host,
        source: self.source,
        fetch: self.fetch,
        handle_error: self.handle_error,
        state: Mutex::new(State { origin, ..State::default() }),
        committing: Mutex::new(()),
        callbacks: Mutex::new(Callbacks::default()),
        refresh: AsyncMutex::new(()),
      }),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use trellis_kit::wire::DataResponse;

  struct NullHost;

  impl Host for NullHost {
    fn commit(&self, _: &Page) {}
    fn push_state(&self, _: &Url, _: Option<&Value>) {}
    fn replace_state(&self, _: &Url, _: Option<&Value>) {}
    fn go(&self, _: i64) {}
    fn navigate_document(&self, _: &Url) {}
    fn confirm_unload(&self) -> bool {
      true
    }
  }

  struct Offline;

  impl ServerDataSource for Offline {
    fn load(&self, _: &Url, _: &[bool]) -> BoxFuture<Result<DataResponse, LoadError>> {
      Box::pin(async { Err(LoadError::message("offline")) })
    }
  }

  fn client() -> Client {
    Client::builder(Manifest::builder().build().unwrap(), Arc::new(NullHost), Arc::new(Offline)).build().unwrap()
  }

  fn page_at(client: &Client, path: &str) -> Current {
    let url = Url::parse("http://x.dev/").unwrap().join(path).unwrap();
    let target = NavigationTarget { url, route_id: None, params: Params::new() };
    Current::build(&client.inner.manifest, target, None, Vec::new(), 200, None)
  }

  fn next_token(client: &Client) -> u64 {
    let mut state = client.inner.state.lock();
    state.token += 1;
    state.token
  }

  #[test]
  fn stale_token_cannot_commit() {
    let client = client();
    let older = next_token(&client);
    let newer = next_token(&client);
    assert_eq!(client.commit(older, page_at(&client, "/a"), true), Err(NavigationError::Superseded));
    assert!(client.page().is_none());
    client.commit(newer, page_at(&client, "/b"), true).unwrap();
    assert_eq!(client.page().unwrap().url.path(), "/b");
  }

  #[test]
  fn navigation_commit_drops_pending_invalidations() {
    let client = client();
    let base = Url::parse("http://x.dev/").unwrap();
    let token = {
      let mut state = client.inner.state.lock();
      state.invalidated.push(Invalidation::key("app:session", &base).unwrap());
      state.force_invalidation = true;
      state.token += 1;
      state.token
    };

    client.commit(token, page_at(&client, "/a"), false).unwrap();
    {
      let state = client.inner.state.lock();
      assert_eq!(state.invalidated.len(), 1);
      assert!(state.force_invalidation);
    }

    client.commit(token, page_at(&client, "/b"), true).unwrap();
    let state = client.inner.state.lock();
    assert!(state.invalidated.is_empty());
    assert!(!state.force_invalidation);
  }

  #[test]
  fn shallow_state_needs_a_page() {
    let client = client();
    assert_eq!(client.push_state("", Value::Null), Err(NavigationError::NotHydrated));
  }
}
