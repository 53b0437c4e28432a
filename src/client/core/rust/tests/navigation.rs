/* src/client/core/rust/tests/navigation.rs */

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::{join, join3};
use http::header::ACCEPT;
use http::{Method, Request, Response};
use parking_lot::{Condvar, Mutex};
use serde_json::{Value, json};
use trellis_client::{
  BeforeNavigate, Client, FetchSource, GotoOptions, Host, Navigation, NavigationError, NavigationType, Page, Preloaded,
};
use trellis_kit::fetch::{Fetch, FetchResult};
use trellis_kit::node::LoadResult;
use trellis_kit::wire::HydrationPayload;
use trellis_kit::{
  BoxFuture, EndpointDef, Invalidation, LoadError, LoadEvent, Manifest, NodeDef, ServerLoadEvent, error, json as json_response,
  redirect,
};
use trellis_server::{RespondOptions, Server};

const ORIGIN: &str = "http://app.test";

type Counts = Arc<Mutex<BTreeMap<&'static str, usize>>>;

fn bump(counts: &Counts, name: &'static str) {
  *counts.lock().entry(name).or_default() += 1;
}

async fn root_layout(counts: Counts, event: ServerLoadEvent) -> LoadResult {
  bump(&counts, "root");
  tokio::task::yield_now().await;
  event.depends(["app:session"])?;
  Ok(Some(json!({ "user": "ada" })))
}

async fn home(counts: Counts, event: LoadEvent) -> LoadResult {
  bump(&counts, "home");
  let parent = event.parent().await?;
  Ok(Some(json!({ "title": format!("hello {}", parent["user"].as_str().unwrap_or("?")) })))
}

async fn blog_post(counts: Counts, event: ServerLoadEvent) -> LoadResult {
  bump(&counts, "post");
  let slug = event.param("slug").unwrap_or_default().to_string();
  match slug.as_str() {
    "missing" => Err(error(404, "No such post")?.into()),
    "moved" => Err(redirect(307, "/blog/new")?.into()),
    "loop" => Err(redirect(307, "/blog/loop")?.into()),
    "boom" => Err(LoadError::message("db down")),
    "slow" => {
      for _ in 0..3 {
        tokio::task::yield_now().await;
      }
      Ok(Some(json!({ "slug": slug })))
    }
    _ => Ok(Some(json!({ "slug": slug }))),
  }
}

async fn search(counts: Counts, event: LoadEvent) -> LoadResult {
  bump(&counts, "search");
  Ok(Some(json!({ "q": event.search_param("q") })))
}

async fn feed(counts: Counts, event: LoadEvent) -> LoadResult {
  bump(&counts, "feed");
  event.depends(["/api/feed"])?;
  Ok(Some(json!({ "items": [] })))
}

async fn client_fail(_: LoadEvent) -> LoadResult {
  Err(LoadError::message("client boom"))
}

fn manifest(counts: &Counts) -> Manifest {
  let (c1, c2, c3, c4, c5, c6) =
    (counts.clone(), counts.clone(), counts.clone(), counts.clone(), counts.clone(), counts.clone());
  Manifest::builder()
    .layout("/", NodeDef::new("root_layout").server_load(move |event| root_layout(c1.clone(), event)))
    .error("/", NodeDef::new("root_error"))
    .page("/", NodeDef::new("home").universal_load(move |event| home(c2.clone(), event)))
    .layout(
      "/blog",
      NodeDef::new("blog_layout").server_load(move |_: ServerLoadEvent| {
        bump(&c3, "blog");
        async { Ok(Some(json!({ "section": "blog" }))) }
      }),
    )
    .error("/blog", NodeDef::new("blog_error"))
    .page("/blog/[slug]", NodeDef::new("post").server_load(move |event| blog_post(c4.clone(), event)))
    .page("/search", NodeDef::new("search").universal_load(move |event| search(c5.clone(), event)))
    .page("/feed", NodeDef::new("feed").universal_load(move |event| feed(c6.clone(), event)))
    .page("/client-fail", NodeDef::new("client_fail").universal_load(client_fail))
    .endpoint(
      "/api/items",
      EndpointDef::new().handle(Method::GET, |_| async { Ok(json_response(&json!(["a"]))?) }),
    )
    .build()
    .unwrap()
}

#[derive(Default)]
struct TestHost {
  log: Mutex<Vec<String>>,
  confirm: AtomicBool,
  /// Pushing this path blocks until some page commits.
  hold: Mutex<Option<String>>,
  committed: Condvar,
}

impl TestHost {
  fn push(&self, entry: String) {
    self.log.lock().push(entry);
  }

  fn log(&self) -> Vec<String> {
    self.log.lock().clone()
  }

  fn clear(&self) {
    self.log.lock().clear();
  }
}

impl Host for TestHost {
  fn commit(&self, page: &Page) {
    self.push(format!("commit {}", page.url.path()));
    self.committed.notify_all();
  }

  fn push_state(&self, url: &url::Url, _: Option<&Value>) {
    self.push(format!("push {}", url.path()));
    if self.hold.lock().as_deref() == Some(url.path()) {
      let mut log = self.log.lock();
      let from = log.len();
      self.committed.wait_while_for(
        &mut log,
        |log| !log[from..].iter().any(|entry| entry.starts_with("commit")),
        Duration::from_secs(5),
      );
    }
  }

  fn replace_state(&self, url: &url::Url, _: Option<&Value>) {
    self.push(format!("replace {}", url.path()));
  }

  fn go(&self, delta: i64) {
    self.push(format!("go {delta}"));
  }

  fn navigate_document(&self, url: &url::Url) {
    self.push(format!("document {url}"));
  }

  fn confirm_unload(&self) -> bool {
    self.push("confirm".to_string());
    self.confirm.load(Ordering::SeqCst)
  }

  fn preload_code(&self, components: &[String]) -> BoxFuture<()> {
    self.push(format!("code {}", components.join(",")));
    Box::pin(async {})
  }
}

struct App {
  server: Server,
  client: Client,
  host: Arc<TestHost>,
  counts: Counts,
}

impl App {
  fn count(&self, name: &str) -> usize {
    self.counts.lock().get(name).copied().unwrap_or(0)
  }

  fn page(&self) -> Page {
    self.client.page().unwrap()
  }
}

fn payload(response: &Response<Bytes>) -> HydrationPayload {
  let html = String::from_utf8(response.body().to_vec()).unwrap();
  let marker = r#"type="application/json">"#;
  let start = html.find(marker).unwrap() + marker.len();
  let end = start + html[start..].find("</script>").unwrap();
  serde_json::from_str(&html[start..end]).unwrap()
}

async fn app_at(path: &str) -> App {
  let counts = Counts::default();
  let manifest = manifest(&counts);
  let server = Server::builder(manifest.clone()).build().unwrap();

  let dispatch = server.clone();
  let fetch: Arc<dyn Fetch> = Arc::new(move |request: Request<Bytes>| -> BoxFuture<FetchResult> {
    let server = dispatch.clone();
    Box::pin(async move { Ok(server.respond(request, RespondOptions::default()).await) })
  });

  let host = Arc::new(TestHost::default());
  let client = Client::builder(manifest, host.clone(), Arc::new(FetchSource::new(fetch.clone())))
    .fetch(fetch)
    .handle_error(|err, _| Some(json!({ "message": "client error", "detail": err.to_string() })))
    .build()
    .unwrap();

  let url = format!("{ORIGIN}{path}");
  let request = Request::get(url.as_str()).header(ACCEPT, "text/html").body(Bytes::new()).unwrap();
  let response = server.respond(request, RespondOptions::default()).await;
  client.hydrate(&url, payload(&response)).await.unwrap();
  host.clear();
  App { server, client, host, counts }
}

async fn app() -> App {
  app_at("/").await
}

fn components(page: &Page) -> Vec<&str> {
  page.components.iter().map(String::as_str).collect()
}

// -- hydration ----------------------------------------------------------------

#[tokio::test]
async fn hydrate_commits_the_server_rendered_page() {
  let app = app().await;
  let page = app.page();
  assert_eq!(page.route_id.as_deref(), Some("/"));
  assert_eq!(page.status, 200);
  assert_eq!(page.data["user"], "ada");
  assert_eq!(page.data["title"], "hello ada");
  assert_eq!(components(&page), ["root_layout", "home"]);
}

#[tokio::test]
async fn hydrate_runs_enter_after_navigate() {
  let counts = Counts::default();
  let manifest = manifest(&counts);
  let server = Server::builder(manifest.clone()).build().unwrap();
  let host = Arc::new(TestHost::default());
  let fetch: Arc<dyn Fetch> = trellis_kit::fetch::no_fetch();
  let client = Client::builder(manifest, host.clone(), Arc::new(FetchSource::new(fetch))).build().unwrap();

  let seen: Arc<Mutex<Vec<Navigation>>> = Arc::default();
  let sink = seen.clone();
  client.after_navigate(move |nav| sink.lock().push(nav.clone()));

  let request = Request::get(format!("{ORIGIN}/")).header(ACCEPT, "text/html").body(Bytes::new()).unwrap();
  let response = server.respond(request, RespondOptions::default()).await;
  client.hydrate(&format!("{ORIGIN}/"), payload(&response)).await.unwrap();

  let seen = seen.lock();
  assert_eq!(seen.len(), 1);
  assert_eq!(seen[0].kind, NavigationType::Enter);
  assert!(seen[0].from.is_none());
  assert_eq!(host.log(), ["commit /"]);
}

#[tokio::test]
async fn hydrate_an_error_page() {
  let app = app_at("/blog/missing").await;
  let page = app.page();
  assert_eq!(page.status, 404);
  assert_eq!(page.error.as_ref().unwrap()["message"], "No such post");
  assert_eq!(components(&page), ["root_layout", "blog_layout", "blog_error"]);

  let blog = app.count("blog");
  app.client.goto("/blog/found", GotoOptions::default()).await.unwrap();
  assert_eq!(app.page().data["slug"], "found");
  assert_eq!(app.count("blog"), blog, "layout from the error page is reused");
}

#[tokio::test]
async fn hydrate_a_not_found_page() {
  let app = app_at("/nowhere").await;
  let page = app.page();
  assert_eq!(page.status, 404);
  assert!(page.route_id.is_none());
  assert_eq!(components(&page), ["root_layout", "root_error"]);
}

// -- navigation ---------------------------------------------------------------

#[tokio::test]
async fn goto_loads_the_new_route_and_pushes_history() {
  let app = app().await;
  let root = app.count("root");
  app.client.goto("/blog/hello", GotoOptions::default()).await.unwrap();

  let page = app.page();
  assert_eq!(page.route_id.as_deref(), Some("/blog/[slug]"));
  assert_eq!(page.params["slug"], "hello");
  assert_eq!(page.data["slug"], "hello");
  assert_eq!(page.data["section"], "blog");
  assert_eq!(page.data["user"], "ada", "root layout data is kept");
  assert_eq!(app.count("root"), root, "root layout did not rerun");
  assert_eq!(app.host.log(), ["push /blog/hello", "commit /blog/hello"]);
}

#[tokio::test]
async fn replace_state_replaces_the_history_entry() {
  let app = app().await;
  let options = GotoOptions { replace_state: true, ..GotoOptions::default() };
  app.client.goto("/blog/a", options).await.unwrap();
  assert_eq!(app.host.log(), ["replace /blog/a", "commit /blog/a"]);
}

#[tokio::test]
async fn param_change_reruns_only_loads_that_read_it() {
  let app = app().await;
  app.client.goto("/blog/a", GotoOptions::default()).await.unwrap();
  let (blog, post) = (app.count("blog"), app.count("post"));

  app.client.goto("/blog/b", GotoOptions::default()).await.unwrap();
  assert_eq!(app.count("post"), post + 1);
  assert_eq!(app.count("blog"), blog);
  assert_eq!(app.page().data["slug"], "b");
}

#[tokio::test]
async fn search_param_reruns_are_per_name() {
  let app = app_at("/search?q=a").await;
  let before = app.count("search");

  app.client.goto("/search?q=b", GotoOptions::default()).await.unwrap();
  assert_eq!(app.count("search"), before + 1);
  assert_eq!(app.page().data["q"], "b");

  app.client.goto("/search?q=b&page=2", GotoOptions::default()).await.unwrap();
  assert_eq!(app.count("search"), before + 1, "page is not read by the load");
}

#[tokio::test]
async fn invalidate_all_on_goto_reruns_everything() {
  let app = app().await;
  let (root, home) = (app.count("root"), app.count("home"));
  let options = GotoOptions { invalidate_all: true, ..GotoOptions::default() };
  app.client.goto("/", options).await.unwrap();
  assert_eq!(app.count("root"), root + 1);
  assert_eq!(app.count("home"), home + 1);
}

#[tokio::test]
async fn redirects_from_loads_become_navigations() {
  let app = app().await;
  app.client.goto("/blog/moved", GotoOptions::default()).await.unwrap();
  assert_eq!(app.page().url.path(), "/blog/new");
  assert_eq!(app.host.log(), ["push /blog/new", "commit /blog/new"]);
}

#[tokio::test]
async fn redirect_loops_are_capped() {
  let app = app().await;
  let err = app.client.goto("/blog/loop", GotoOptions::default()).await.unwrap_err();
  assert_eq!(err, NavigationError::TooManyRedirects(20));
  assert_eq!(app.page().url.path(), "/");
}

#[tokio::test]
async fn http_errors_render_the_nearest_boundary() {
  let app = app().await;
  app.client.goto("/blog/missing", GotoOptions::default()).await.unwrap();
  let page = app.page();
  assert_eq!(page.status, 404);
  assert_eq!(page.error.as_ref().unwrap()["message"], "No such post");
  assert_eq!(components(&page), ["root_layout", "blog_layout", "blog_error"]);
  assert_eq!(page.data["section"], "blog");
}

#[tokio::test]
async fn server_side_unexpected_errors_keep_their_status() {
  let app = app().await;
  app.client.goto("/blog/boom", GotoOptions::default()).await.unwrap();
  assert_eq!(app.page().status, 500);
  assert_eq!(components(&app.page()), ["root_layout", "blog_layout", "blog_error"]);
}

#[tokio::test]
async fn client_side_unexpected_errors_go_through_handle_error() {
  let app = app().await;
  app.client.goto("/client-fail", GotoOptions::default()).await.unwrap();
  let page = app.page();
  assert_eq!(page.status, 500);
  assert_eq!(page.error.as_ref().unwrap()["message"], "client error");
  assert_eq!(components(&page), ["root_layout", "root_error"]);
}

#[tokio::test]
async fn routes_outside_the_app_unload_the_document() {
  let app = app().await;
  let seen: Arc<Mutex<Vec<bool>>> = Arc::default();
  let sink = seen.clone();
  app.client.before_navigate(move |nav: &BeforeNavigate| sink.lock().push(nav.navigation().will_unload));

  let err = app.client.goto("/nowhere", GotoOptions::default()).await.unwrap_err();
  assert!(matches!(err, NavigationError::Unloaded(_)));
  let err = app.client.goto("/api/items", GotoOptions::default()).await.unwrap_err();
  assert!(matches!(err, NavigationError::Unloaded(_)));
  let err = app.client.follow_link("https://elsewhere.dev/").await.unwrap_err();
  assert!(matches!(err, NavigationError::Unloaded(_)));

  assert_eq!(*seen.lock(), [true, true, true]);
  assert_eq!(
    app.host.log(),
    ["document http://app.test/nowhere", "document http://app.test/api/items", "document https://elsewhere.dev/"]
  );
  assert_eq!(app.page().url.path(), "/");
}

// -- callbacks ----------------------------------------------------------------

#[tokio::test]
async fn before_navigate_cancellation_is_cooperative() {
  let app = app().await;
  let ran: Arc<AtomicBool> = Arc::default();
  app.client.before_navigate(|nav: &BeforeNavigate| nav.cancel());
  let flag = ran.clone();
  app.client.before_navigate(move |nav: &BeforeNavigate| {
    assert!(nav.is_cancelled());
    flag.store(true, Ordering::SeqCst);
  });

  let err = app.client.goto("/blog/a", GotoOptions::default()).await.unwrap_err();
  assert_eq!(err, NavigationError::Cancelled);
  assert!(ran.load(Ordering::SeqCst));
  assert_eq!(app.page().url.path(), "/");
  assert!(app.host.log().is_empty());
}

#[tokio::test]
async fn cancelling_an_unload_asks_the_browser() {
  let app = app().await;
  app.client.before_navigate(|nav: &BeforeNavigate| nav.cancel());

  let err = app.client.goto("/nowhere", GotoOptions::default()).await.unwrap_err();
  assert_eq!(err, NavigationError::Cancelled);
  assert_eq!(app.host.log(), ["confirm"]);

  app.host.clear();
  app.host.confirm.store(true, Ordering::SeqCst);
  let err = app.client.goto("/nowhere", GotoOptions::default()).await.unwrap_err();
  assert!(matches!(err, NavigationError::Unloaded(_)));
  assert_eq!(app.host.log(), ["confirm", "document http://app.test/nowhere"]);
}

#[tokio::test]
async fn leave_consults_callbacks_then_the_browser() {
  let app = app().await;
  assert!(app.client.leave());

  let id = app.client.before_navigate(|nav: &BeforeNavigate| {
    assert_eq!(nav.navigation().kind, NavigationType::Leave);
    assert!(nav.navigation().to.is_none());
    nav.cancel();
  });
  assert!(!app.client.leave());
  app.host.confirm.store(true, Ordering::SeqCst);
  assert!(app.client.leave());
  assert_eq!(app.host.log(), ["confirm", "confirm"]);

  app.client.off(id);
  assert!(app.client.leave());
}

#[tokio::test]
async fn popstate_does_not_touch_history() {
  let app = app().await;
  app.client.popstate("/blog/a", -1).await.unwrap();
  assert_eq!(app.host.log(), ["commit /blog/a"]);
}

#[tokio::test]
async fn cancelled_popstate_restores_the_history_position() {
  let app = app().await;
  app.client.before_navigate(|nav: &BeforeNavigate| nav.cancel());
  let err = app.client.popstate("/blog/a", -1).await.unwrap_err();
  assert_eq!(err, NavigationError::Cancelled);
  assert_eq!(app.host.log(), ["go 1"]);
}

#[tokio::test]
async fn on_navigate_cleanup_runs_after_commit() {
  let app = app().await;
  let host = app.host.clone();
  app.client.on_navigate(move |nav: Navigation| {
    let host = host.clone();
    async move {
      host.push(format!("on {}", nav.kind));
      let cleanup: trellis_client::Cleanup = Box::new(move || host.push("cleanup".to_string()));
      Ok(Some(cleanup))
    }
  });
  let host = app.host.clone();
  app.client.after_navigate(move |nav: &Navigation| host.push(format!("after {}", nav.kind)));

  app.client.follow_link("/blog/a").await.unwrap();
  assert_eq!(app.host.log(), ["on link", "push /blog/a", "commit /blog/a", "cleanup", "after link"]);
}

#[tokio::test]
async fn failing_on_navigate_aborts_without_corrupting_state() {
  let app = app().await;
  let id = app.client.on_navigate(|_: Navigation| async { Err(LoadError::message("nope")) });

  let err = app.client.goto("/blog/a", GotoOptions::default()).await.unwrap_err();
  assert!(matches!(err, NavigationError::Aborted(_)));
  assert_eq!(app.page().url.path(), "/");
  assert!(app.client.navigating().is_none());

  app.client.off(id);
  app.client.goto("/blog/a", GotoOptions::default()).await.unwrap();
  assert_eq!(app.page().url.path(), "/blog/a");
}

#[tokio::test]
async fn the_last_navigation_wins() {
  let app = app().await;
  let (slow, fast) = join(
    app.client.goto("/blog/slow", GotoOptions::default()),
    app.client.goto("/blog/fast", GotoOptions::default()),
  )
  .await;
  assert_eq!(slow.unwrap_err(), NavigationError::Superseded);
  fast.unwrap();
  assert_eq!(app.page().url.path(), "/blog/fast");
  assert_eq!(app.host.log(), ["push /blog/fast", "commit /blog/fast"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_stalled_commit_cannot_overwrite_a_newer_page() {
  let app = app().await;
  *app.host.hold.lock() = Some("/blog/a".to_string());

  let client = app.client.clone();
  let first = tokio::spawn(async move { client.goto("/blog/a", GotoOptions::default()).await });
  while !app.host.log().iter().any(|entry| entry == "push /blog/a") {
    tokio::time::sleep(Duration::from_millis(1)).await;
  }
  let client = app.client.clone();
  let second = tokio::spawn(async move { client.goto("/blog/b", GotoOptions::default()).await });

  second.await.unwrap().unwrap();
  assert_eq!(first.await.unwrap(), Err(NavigationError::Superseded));
  assert_eq!(app.page().url.path(), "/blog/b");
  assert_eq!(app.host.log(), ["push /blog/a", "push /blog/b", "commit /blog/b"]);
}

#[tokio::test]
async fn completion_resolves_on_commit() {
  let app = app().await;
  let (tx, rx) = tokio::sync::oneshot::channel();
  let tx = Mutex::new(Some(tx));
  app.client.on_navigate(move |nav: Navigation| {
    let tx = tx.lock().take();
    async move {
      if let Some(tx) = tx {
        tokio::spawn(async move {
          let _ = tx.send(nav.complete.wait().await);
        });
      }
      Ok(None)
    }
  });

  app.client.goto("/blog/a", GotoOptions::default()).await.unwrap();
  assert_eq!(rx.await.unwrap(), Ok(()));
}

#[tokio::test]
async fn completion_rejects_on_cancel_and_stays_pending_on_unload() {
  let app = app().await;
  let seen: Arc<Mutex<Vec<Navigation>>> = Arc::default();
  let sink = seen.clone();
  app.client.before_navigate(move |nav: &BeforeNavigate| {
    sink.lock().push(nav.navigation().clone());
    if nav.navigation().to.as_ref().is_some_and(|to| to.url.path() == "/blog/no") {
      nav.cancel();
    }
  });

  app.client.goto("/blog/no", GotoOptions::default()).await.unwrap_err();
  app.client.goto("/nowhere", GotoOptions::default()).await.unwrap_err();
  let (cancelled, unloaded) = {
    let seen = seen.lock();
    (seen[0].complete.clone(), seen[1].complete.clone())
  };
  assert_eq!(cancelled.wait().await, Err(NavigationError::Cancelled));
  assert!(tokio::time::timeout(Duration::from_millis(20), unloaded.wait()).await.is_err());
}

#[tokio::test]
async fn failed_navigations_reject_completion() {
  let app = app().await;
  let seen: Arc<Mutex<Option<Navigation>>> = Arc::default();
  let sink = seen.clone();
  app.client.before_navigate(move |nav: &BeforeNavigate| *sink.lock() = Some(nav.navigation().clone()));
  app.client.on_navigate(|_: Navigation| async { Err(LoadError::message("nope")) });

  let err = app.client.goto("/blog/a", GotoOptions::default()).await.unwrap_err();
  let complete = seen.lock().take().unwrap().complete;
  assert_eq!(complete.wait().await, Err(err));
}

// -- shallow routing ----------------------------------------------------------

#[tokio::test]
async fn push_state_adds_history_without_loading() {
  let app = app().await;
  let (root, home) = (app.count("root"), app.count("home"));

  app.client.push_state("/photos/1", json!({ "photo": 1 })).unwrap();
  let page = app.page();
  assert_eq!(page.url.path(), "/", "the loaded page stays");
  assert_eq!(page.state, Some(json!({ "photo": 1 })));
  assert_eq!((app.count("root"), app.count("home")), (root, home));
  assert_eq!(app.host.log(), ["push /photos/1", "commit /"]);

  app.host.clear();
  app.client.replace_state("", json!({ "photo": 2 })).unwrap();
  assert_eq!(app.page().state, Some(json!({ "photo": 2 })));
  assert_eq!(app.host.log(), ["replace /", "commit /"]);
}

#[tokio::test]
async fn goto_state_rides_along_and_is_cleared_by_the_next_navigation() {
  let app = app().await;
  let options = GotoOptions { state: Some(json!({ "tab": "comments" })), ..GotoOptions::default() };
  app.client.goto("/blog/a", options).await.unwrap();
  assert_eq!(app.page().state, Some(json!({ "tab": "comments" })));

  app.client.goto("/blog/b", GotoOptions::default()).await.unwrap();
  assert_eq!(app.page().state, None);
}

#[tokio::test]
async fn shallow_state_stays_on_the_origin() {
  let app = app().await;
  let err = app.client.push_state("https://elsewhere.dev/", Value::Null).unwrap_err();
  assert!(matches!(err, NavigationError::External(_)));
  assert!(app.host.log().is_empty());
}

// -- invalidation -------------------------------------------------------------

#[tokio::test]
async fn invalidating_a_custom_key_reruns_dependents() {
  let app = app().await;
  let (root, home) = (app.count("root"), app.count("home"));

  app.client.invalidate_key("app:session").await.unwrap();
  assert_eq!(app.count("root"), root + 1);
  assert_eq!(app.count("home"), home + 1, "home reads parent()");
  assert_eq!(app.host.log(), ["commit /"]);
}

#[tokio::test]
async fn unrelated_invalidations_do_nothing() {
  let app = app().await;
  let root = app.count("root");
  app.client.invalidate_key("app:other").await.unwrap();
  assert_eq!(app.count("root"), root);
  assert!(app.host.log().is_empty());
}

#[tokio::test]
async fn predicates_match_url_dependencies() {
  let app = app_at("/feed").await;
  let (feed, root) = (app.count("feed"), app.count("root"));
  app.client.invalidate(Invalidation::predicate(|url| url.path() == "/api/feed")).await.unwrap();
  assert_eq!(app.count("feed"), feed + 1);
  assert_eq!(app.count("root"), root);
}

#[tokio::test]
async fn invalidate_all_reruns_every_load() {
  let app = app().await;
  let (root, home) = (app.count("root"), app.count("home"));
  app.client.invalidate_all().await.unwrap();
  assert_eq!(app.count("root"), root + 1);
  assert_eq!(app.count("home"), home + 1);
}

#[tokio::test]
async fn invalidations_during_a_refresh_join_the_next_one() {
  let app = app().await;
  let root = app.count("root");
  let (a, b, c) = join3(
    app.client.invalidate_key("app:session"),
    app.client.invalidate_key("app:session"),
    app.client.invalidate_key("app:session"),
  )
  .await;
  a.unwrap();
  b.unwrap();
  c.unwrap();
  assert_eq!(app.count("root"), root + 2);
}

// -- preloading ---------------------------------------------------------------

#[tokio::test]
async fn preloaded_data_is_reused_by_the_navigation() {
  let app = app().await;
  let post = app.count("post");
  let preloaded = app.client.preload_data("/blog/pre").await.unwrap();
  let Preloaded::Loaded { status, data } = preloaded else {
    panic!("expected loaded data, got {preloaded:?}");
  };
  assert_eq!(status, 200);
  assert_eq!(data["slug"], "pre");
  assert_eq!(data["section"], "blog");
  assert_eq!(app.count("post"), post + 1);
  assert!(app.host.log().is_empty(), "preloading commits nothing");

  app.client.goto("/blog/pre", GotoOptions::default()).await.unwrap();
  assert_eq!(app.count("post"), post + 1);
  assert_eq!(app.page().data["slug"], "pre");
}

#[tokio::test]
async fn invalidation_discards_preloaded_data() {
  let app = app().await;
  let post = app.count("post");
  app.client.preload_data("/blog/pre").await.unwrap();
  app.client.invalidate_key("app:other").await.unwrap();
  app.client.goto("/blog/pre", GotoOptions::default()).await.unwrap();
  assert_eq!(app.count("post"), post + 2);
}

#[tokio::test]
async fn preloading_reports_redirects_errors_and_foreign_urls() {
  let app = app().await;
  assert_eq!(app.client.preload_data("/blog/moved").await.unwrap(), Preloaded::Redirect("/blog/new".to_string()));

  let Preloaded::Loaded { status, .. } = app.client.preload_data("/blog/missing").await.unwrap() else {
    panic!("error pages preload as data");
  };
  assert_eq!(status, 404);

  let err = app.client.preload_data("https://elsewhere.dev/").await.unwrap_err();
  assert_eq!(err, NavigationError::External("https://elsewhere.dev/".to_string()));
  assert!(app.host.log().is_empty());
}

#[tokio::test]
async fn preload_code_asks_the_host_for_the_branch_components() {
  let app = app().await;
  app.client.preload_code("/blog/a").await.unwrap();
  app.client.preload_code("https://elsewhere.dev/").await.unwrap();
  assert_eq!(app.host.log(), ["code root_layout,blog_layout,post"]);
}

#[tokio::test]
async fn data_requests_reach_the_server_with_a_rerun_mask() {
  let app = app().await;
  let request = Request::get(format!("{ORIGIN}/blog/a/__data.json?x-trellis-invalidated=001"))
    .body(Bytes::new())
    .unwrap();
  let response = app.server.respond(request, RespondOptions::default()).await;
  let body: Value = serde_json::from_slice(response.body()).unwrap();
  assert_eq!(body["nodes"][0]["type"], "skip");
  assert_eq!(body["nodes"][2]["data"]["slug"], "a");
}
