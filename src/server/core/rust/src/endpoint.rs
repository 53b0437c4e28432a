/* src/server/core/rust/src/endpoint.rs */

use trellis_kit::manifest::Route;
use trellis_kit::{LoadError, RequestEvent};

use crate::hooks::HandleResult;
use crate::respond::{error_json, method_not_allowed, redirect_response};
use crate::server::Server;

pub(crate) async fn render_endpoint(server: &Server, route: &Route, event: &RequestEvent) -> HandleResult {
  let Some(endpoint) = route.endpoint() else {
    return Ok(method_not_allowed(event.method(), &route.methods));
  };
  let Some(handler) = endpoint.resolve(event.method()) else {
    return Ok(method_not_allowed(event.method(), &endpoint.allowed_methods()));
  };

  tracing::debug!(route = %route.id, method = %event.method(), "endpoint");
  match handler(event.clone()).await {
    Ok(response) => Ok(response),
    Err(LoadError::Redirect(r)) => Ok(redirect_response(r.status, &r.location)),
    Err(LoadError::Http(e)) => Ok(error_json(e.status, e.body.as_value())),
    Err(err) => {
      let body = server.error_body(&err, event);
      Ok(error_json(err.status(), &body))
    }
  }
}
