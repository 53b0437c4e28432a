/* demo/server-rust/src/routes.rs */

use std::sync::Arc;
use std::time::Instant;

use http::{HeaderValue, Method};
use parking_lot::Mutex;
use serde_json::{Value, json};
use trellis_server::trellis_kit::node::LoadResult;
use trellis_server::trellis_kit::{
  ActionOutput, CookieOptions, EndpointDef, KitError, LoadError, LoadEvent, Manifest, NodeDef, RequestEvent,
  ServerLoadEvent, error, fail, json as json_response, redirect,
};
use trellis_server::{
  RenderContext, Renderer, Resolve, ServerBuilder, ShellRenderer, escape_html, handle_fn, sequence,
};

const POSTS: &[(&str, &str, &str)] = &[
  ("hello-trellis", "Hello, Trellis", "Loads run on the server first, then in the browser on navigation."),
  ("nested-layouts", "Nested layouts", "Every page sees the data of the layouts above it."),
];

const THEMES: &[&str] = &["light", "dark"];

#[derive(Debug, Clone)]
struct Todo {
  id: u64,
  text: String,
  done: bool,
}

impl Todo {
  fn to_json(&self) -> Value {
    json!({ "id": self.id, "text": self.text, "done": self.done })
  }
}

#[derive(Default)]
struct TodoList {
  next_id: u64,
  items: Vec<Todo>,
}

/// In-memory todo list shared by the page, its actions and the API endpoint.
#[derive(Clone, Default)]
pub struct Store(Arc<Mutex<TodoList>>);

impl Store {
  fn list(&self) -> Value {
    Value::Array(self.0.lock().items.iter().map(Todo::to_json).collect())
  }

  fn add(&self, text: &str) -> u64 {
    let mut list = self.0.lock();
    list.next_id += 1;
    let id = list.next_id;
    list.items.push(Todo { id, text: text.to_string(), done: false });
    id
  }

  fn toggle(&self, id: u64) -> Option<bool> {
    let mut list = self.0.lock();
    let todo = list.items.iter_mut().find(|t| t.id == id)?;
    todo.done = !todo.done;
    Some(todo.done)
  }

  fn clear_done(&self) -> usize {
    let mut list = self.0.lock();
    let before = list.items.len();
    list.items.retain(|t| !t.done);
    before - list.items.len()
  }
}

// -- loads ----------------------------------------------------------------------

async fn root_layout(event: ServerLoadEvent) -> LoadResult {
  let theme = event.cookies().get("theme").filter(|t| THEMES.contains(&t.as_str()));
  Ok(Some(json!({ "theme": theme.as_deref().unwrap_or("light") })))
}

async fn home(event: LoadEvent) -> LoadResult {
  let parent = event.parent().await?;
  let theme = parent["theme"].as_str().unwrap_or("light");
  Ok(Some(json!({ "title": "Trellis demo", "subtitle": format!("{theme} mode") })))
}

async fn post_list(_: ServerLoadEvent) -> LoadResult {
  let posts: Vec<Value> = POSTS.iter().map(|(slug, title, _)| json!({ "slug": slug, "title": title })).collect();
  Ok(Some(json!({ "posts": posts })))
}

async fn post(event: ServerLoadEvent) -> LoadResult {
  let slug = event.param("slug").unwrap_or_default();
  let Some((slug, title, body)) = POSTS.iter().find(|(s, _, _)| *s == slug) else {
    return Err(error(404, format!("No post called {slug}"))?.into());
  };
  Ok(Some(json!({ "slug": slug, "title": title, "body": body })))
}

async fn old_post(event: ServerLoadEvent) -> LoadResult {
  let slug = event.param("slug").unwrap_or_default();
  Err(redirect(308, format!("/posts/{slug}"))?.into())
}

async fn todos(store: Store, event: ServerLoadEvent) -> LoadResult {
  event.depends(["app:todos"])?;
  Ok(Some(json!({ "todos": store.list() })))
}

// -- actions --------------------------------------------------------------------

async fn add_todo(store: Store, event: RequestEvent) -> Result<ActionOutput, LoadError> {
  let form = event.form_data();
  let text = form.get("text").map(|t| t.trim()).unwrap_or_default();
  if text.is_empty() {
    return Ok(fail(400, Some(json!({ "missing": "text" }))).into());
  }
  let id = store.add(text);
  tracing::debug!(id, "todo added");
  Ok(json!({ "added": id }).into())
}

async fn toggle_todo(store: Store, event: RequestEvent) -> Result<ActionOutput, LoadError> {
  let form = event.form_data();
  let Some(id) = form.get("id").and_then(|id| id.parse::<u64>().ok()) else {
    return Ok(fail(400, Some(json!({ "invalid": "id" }))).into());
  };
  match store.toggle(id) {
    Some(done) => Ok(json!({ "id": id, "done": done }).into()),
    None => Err(error(404, format!("No todo with id {id}"))?.into()),
  }
}

async fn clear_todos(store: Store, _: RequestEvent) -> Result<ActionOutput, LoadError> {
  let removed = store.clear_done();
  Ok(json!({ "removed": removed }).into())
}

async fn set_theme(event: RequestEvent) -> Result<ActionOutput, LoadError> {
  let form = event.form_data();
  let theme = form.get("theme").map(String::as_str).unwrap_or_default();
  if !THEMES.contains(&theme) {
    return Ok(fail(400, Some(json!({ "theme": theme }))).into());
  }
  event.cookies().set("theme", theme, CookieOptions::default().path("/").max_age(60 * 60 * 24 * 365));
  Err(redirect(303, "/")?.into())
}

// -- wiring ---------------------------------------------------------------------

pub fn manifest(store: &Store) -> Result<Manifest, KitError> {
  let (load_store, add_store, toggle_store, clear_store, api_store) =
    (store.clone(), store.clone(), store.clone(), store.clone(), store.clone());

  Manifest::builder()
    .layout("/", NodeDef::new("+layout").server_load(root_layout))
    .error("/", NodeDef::new("+error"))
    .page("/", NodeDef::new("+page").universal_load(home))
    .page("/posts", NodeDef::new("posts/+page").server_load(post_list))
    .page("/posts/[slug=slug]", NodeDef::new("posts/[slug]/+page").server_load(post))
    .page("/old/[slug]", NodeDef::new("old/[slug]/+page").server_load(old_post))
    .page(
      "/todos",
      NodeDef::new("todos/+page")
        .server_load(move |event| todos(load_store.clone(), event))
        .action("default", move |event| add_todo(add_store.clone(), event))
        .action("toggle", move |event| toggle_todo(toggle_store.clone(), event))
        .action("clear", move |event| clear_todos(clear_store.clone(), event)),
    )
    .page("/settings", NodeDef::new("settings/+page").action("default", set_theme))
    .endpoint(
      "/api/todos",
      EndpointDef::new().handle(Method::GET, move |_| {
        let store = api_store.clone();
        async move { Ok(json_response(&store.list())?) }
      }),
    )
    .matcher("slug", |v| {
      !v.is_empty() && v.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    })
    .build()
}

/// The component shell with the page's `title` and `subtitle` printed on top.
struct DemoRenderer(ShellRenderer);

impl Renderer for DemoRenderer {
  fn render(&self, ctx: &RenderContext<'_>) -> Result<String, LoadError> {
    let html = self.0.render(ctx)?;
    let field = |key: &str| ctx.data.get(key).and_then(Value::as_str).map(escape_html);
    let mut heading = String::new();
    if let Some(title) = field("title") {
      heading.push_str(&format!("<h1>{title}</h1>"));
    }
    if let Some(subtitle) = field("subtitle") {
      heading.push_str(&format!("<p>{subtitle}</p>"));
    }
    Ok(html.replacen("<body>", &format!("<body><header>{heading}</header>"), 1))
  }
}

/// The demo renderer, request logging, a response header, and a
/// `handle_error` that never leaks internals to the browser.
pub fn install(builder: ServerBuilder) -> ServerBuilder {
  let timing = handle_fn(|event: RequestEvent, resolve: Resolve| async move {
    let started = Instant::now();
    let method = event.method().clone();
    let path = event.url().path().to_string();
    let response = resolve.call(event).await?;
    tracing::info!(%method, path, status = response.status().as_u16(), elapsed = ?started.elapsed(), "request");
    Ok(response)
  });
  let powered_by = handle_fn(|event: RequestEvent, resolve: Resolve| async move {
    let mut response = resolve.call(event).await?;
    response.headers_mut().insert("x-powered-by", HeaderValue::from_static("trellis"));
    Ok(response)
  });

  builder.renderer(DemoRenderer(ShellRenderer::default())).handle(sequence(vec![timing, powered_by])).handle_error(|err, event| {
    tracing::error!(path = event.url().path(), error = %err, "load failed");
    Some(json!({ "message": "Something went wrong" }))
  })
}

#[cfg(test)]
mod tests {
  use bytes::Bytes;
  use http::header::{ACCEPT, CONTENT_TYPE, LOCATION, SET_COOKIE};
  use http::{Request, Response, StatusCode};
  use trellis_server::{RespondOptions, Server};

  use super::*;

  const HTML: &str = "text/html";

  fn server() -> Server {
    install(Server::builder(manifest(&Store::default()).unwrap())).build().unwrap()
  }

  async fn send(server: &Server, method: Method, path: &str, accept: &str, body: &str) -> Response<Bytes> {
    let request = Request::builder()
      .method(method)
      .uri(path)
      .header(ACCEPT, accept)
      .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
      .body(Bytes::from(body.to_string()))
      .unwrap();
    server.respond(request, RespondOptions::default()).await
  }

  fn body(response: &Response<Bytes>) -> String {
    String::from_utf8(response.body().to_vec()).unwrap()
  }

  fn body_json(response: &Response<Bytes>) -> Value {
    serde_json::from_slice(response.body()).unwrap()
  }

  #[tokio::test]
  async fn home_renders_with_layout_data() {
    let srv = server();
    let res = send(&srv, Method::GET, "/", HTML, "").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-powered-by"], "trellis");
    let html = body(&res);
    assert!(html.contains("<header><h1>Trellis demo</h1><p>light mode</p></header>"));
  }

  #[tokio::test]
  async fn posts_resolve_by_slug() {
    let srv = server();
    let res = send(&srv, Method::GET, "/posts/hello-trellis", HTML, "").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(body(&res).contains("Hello, Trellis"));

    let res = send(&srv, Method::GET, "/posts/nope", HTML, "").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(body(&res).contains("No post called nope"));

    let res = send(&srv, Method::GET, "/posts/Not_A_Slug", HTML, "").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn old_links_redirect_permanently() {
    let res = send(&server(), Method::GET, "/old/hello-trellis", HTML, "").await;
    assert_eq!(res.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(res.headers()[LOCATION], "/posts/hello-trellis");
  }

  #[tokio::test]
  async fn todo_actions_update_the_store() {
    let srv = server();
    let res = send(&srv, Method::POST, "/todos", "application/json", "text=").await;
    assert_eq!(body_json(&res), json!({ "type": "failure", "status": 400, "data": { "missing": "text" } }));

    let res = send(&srv, Method::POST, "/todos", "application/json", "text=buy+milk").await;
    assert_eq!(body_json(&res), json!({ "type": "success", "status": 200, "data": { "added": 1 } }));

    let res = send(&srv, Method::POST, "/todos?/toggle", "application/json", "id=1").await;
    assert_eq!(body_json(&res)["data"], json!({ "id": 1, "done": true }));

    let res = send(&srv, Method::POST, "/todos?/toggle", "application/json", "id=9").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = send(&srv, Method::GET, "/api/todos", "application/json", "").await;
    assert_eq!(body_json(&res), json!([{ "id": 1, "text": "buy milk", "done": true }]));

    let res = send(&srv, Method::POST, "/todos?/clear", "application/json", "").await;
    assert_eq!(body_json(&res)["data"]["removed"], 1);
  }

  #[tokio::test]
  async fn theme_is_stored_in_a_cookie() {
    let srv = server();
    let res = send(&srv, Method::POST, "/settings", HTML, "theme=dark").await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    let cookie = res.headers()[SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("theme=dark"));

    let request = Request::get("/").header(ACCEPT, HTML).header("cookie", "theme=dark").body(Bytes::new()).unwrap();
    let res = srv.respond(request, RespondOptions::default()).await;
    assert!(body(&res).contains("<p>dark mode</p>"));
  }

  #[tokio::test]
  async fn unknown_themes_are_rejected() {
    let srv = server();
    let res = send(&srv, Method::POST, "/settings", "application/json", "theme=neon").await;
    assert_eq!(body_json(&res)["type"], "failure");
  }
}
