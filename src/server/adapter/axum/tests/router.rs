/* src/server/adapter/axum/tests/router.rs */

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::header::{ACCEPT, CONTENT_TYPE, LOCATION};
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use trellis_server::Server;
use trellis_server::trellis_kit::{EndpointDef, Manifest, NodeDef, RequestEvent, ServerLoadEvent, json as json_response, redirect, text};
use trellis_server_axum::IntoAxumRouter;

fn server() -> Server {
  let manifest = Manifest::builder()
    .layout(
      "/",
      NodeDef::new("root_layout").server_load(|_: ServerLoadEvent| async { Ok(Some(json!({ "site": "demo" }))) }),
    )
    .page(
      "/hello/[name]",
      NodeDef::new("hello").server_load(|event: ServerLoadEvent| async move {
        Ok(Some(json!({ "name": event.param("name") })))
      }),
    )
    .page("/old", NodeDef::new("old").server_load(|_: ServerLoadEvent| async { Err(redirect(301, "/hello/new")?.into()) }))
    .endpoint(
      "/api/echo",
      EndpointDef::new().handle(Method::POST, |event: RequestEvent| async move {
        Ok(text(String::from_utf8_lossy(event.body()).into_owned()))
      }),
    )
    .endpoint(
      "/api/peer",
      EndpointDef::new().handle(Method::GET, |event: RequestEvent| async move {
        let peer = event.client_address().map(|addr| addr.to_string());
        Ok(json_response(&json!({ "peer": peer }))?)
      }),
    )
    .build()
    .unwrap();
  Server::builder(manifest).build().unwrap()
}

fn request(method: Method, uri: &str, accept: &str, body: &'static str) -> Request<Body> {
  Request::builder()
    .method(method)
    .uri(uri)
    .header(ACCEPT, accept)
    .header(CONTENT_TYPE, "text/plain")
    .body(Body::from(body))
    .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
  let bytes = response.into_body().collect().await.unwrap().to_bytes();
  String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn pages_render_through_the_fallback() {
  let router = server().into_axum_router();
  let response = router.oneshot(request(Method::GET, "/hello/ada", "text/html", "")).await.unwrap();
  assert_eq!(response.status(), StatusCode::OK);
  let html = body_string(response).await;
  assert!(html.contains(r#""name":"ada""#));
  assert!(html.contains(r#""site":"demo""#));
}

#[tokio::test]
async fn data_requests_return_json() {
  let router = server().into_axum_router();
  let response =
    router.oneshot(request(Method::GET, "/hello/ada/__data.json", "*/*", "")).await.unwrap();
  assert_eq!(response.status(), StatusCode::OK);
  let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
  assert_eq!(body["type"], "data");
  assert_eq!(body["nodes"][1]["data"]["name"], "ada");
}

#[tokio::test]
async fn load_redirects_become_3xx() {
  let router = server().into_axum_router();
  let response = router.oneshot(request(Method::GET, "/old", "text/html", "")).await.unwrap();
  assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
  assert_eq!(response.headers()[LOCATION], "/hello/new");
}

#[tokio::test]
async fn endpoints_receive_the_request_body() {
  let router = server().into_axum_router();
  let response = router.oneshot(request(Method::POST, "/api/echo", "*/*", "ping")).await.unwrap();
  assert_eq!(response.status(), StatusCode::OK);
  assert_eq!(body_string(response).await, "ping");
}

#[tokio::test]
async fn unknown_paths_are_404() {
  let router = server().into_axum_router();
  let response = router.oneshot(request(Method::GET, "/nope", "text/html", "")).await.unwrap();
  assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
  let router = server().into_axum_router_with_limit(4);
  let response =
    router.oneshot(request(Method::POST, "/api/echo", "*/*", "more than four bytes")).await.unwrap();
  assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
  let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
  assert_eq!(body["message"], "Request body exceeds 4 bytes");
}

#[tokio::test]
async fn peer_address_is_forwarded() {
  let addr: SocketAddr = "10.1.2.3:4567".parse().unwrap();
  let router = server().into_axum_router().layer(MockConnectInfo(addr));
  let response = router.oneshot(request(Method::GET, "/api/peer", "*/*", "")).await.unwrap();
  let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
  assert_eq!(body["peer"], "10.1.2.3:4567");
}

#[tokio::test]
async fn missing_peer_address_is_null() {
  let router = server().into_axum_router();
  let response = router.oneshot(request(Method::GET, "/api/peer", "*/*", "")).await.unwrap();
  let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
  assert_eq!(body["peer"], Value::Null);
}
