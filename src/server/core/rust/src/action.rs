/* src/server/core/rust/src/action.rs */

use bytes::Bytes;
use http::{Response, StatusCode};
use trellis_kit::response::{ResponseInit, json_with, text_with};
use trellis_kit::manifest::Route;
use trellis_kit::{ActionOutput, ActionResult, HttpError, LoadError, RequestEvent};

use crate::page::{PageState, render_page};
use crate::respond::{error_json, redirect_response, wants_json};
use crate::server::Server;

/// `?/login` names the `login` action; a bare POST runs `default`.
fn action_name(event: &RequestEvent) -> Result<String, HttpError> {
  for (key, _) in event.url().query_pairs() {
    if let Some(name) = key.strip_prefix('/') {
      if name == "default" {
        return Err(HttpError { status: 400, body: "Cannot use reserved action name \"default\"".into() });
      }
      return Ok(name.to_string());
    }
  }
  Ok("default".to_string())
}

pub(crate) async fn handle_action(server: &Server, route: &Route, event: &RequestEvent) -> Response<Bytes> {
  let json = wants_json(event);
  let leaf = route.leaf.and_then(|i| server.manifest().node(i)).cloned();
  let actions = leaf.as_ref().map(|n| &n.actions).filter(|a| !a.is_empty());

  let Some(actions) = actions else {
    let mut init = ResponseInit::status(StatusCode::METHOD_NOT_ALLOWED);
    init.headers.insert(http::header::ALLOW, http::HeaderValue::from_static("GET, HEAD"));
    return text_with("POST method not allowed. No form actions exist for this page", init);
  };

  let outcome: Result<ActionOutput, LoadError> = match action_name(event) {
    Err(e) => Err(e.into()),
    Ok(name) => match actions.get(&name) {
      Some(action) => {
        tracing::debug!(route = %route.id, action = %name, "form action");
        action(event.clone()).await
      }
      None => Err(HttpError { status: 404, body: format!("No action with name '{name}' found").into() }.into()),
    },
  };

  if json {
    let result = ActionResult::from_outcome(outcome, |err| server.error_body(err, event));
    let status = match result {
      ActionResult::Error { status, .. } => status.unwrap_or(500),
      _ => 200,
    };
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    return json_with(&result, ResponseInit::status(status))
      .unwrap_or_else(|e| error_json(500, &serde_json::json!({ "message": e.to_string() })));
  }

  let state = match outcome {
    Err(LoadError::Redirect(r)) => return redirect_response(r.status, &r.location),
    Err(err) => PageState { status: None, form: None, error: Some(err) },
    Ok(ActionOutput::Success(data)) => PageState { status: Some(200), form: data, error: None },
    Ok(ActionOutput::Failure(f)) => PageState { status: Some(f.status), form: f.data, error: None },
  };
  render_page(server, route, event, state).await
}
