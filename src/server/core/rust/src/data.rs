/* src/server/core/rust/src/data.rs */

use http::header::CACHE_CONTROL;
use http::{HeaderValue, StatusCode};
use trellis_kit::load;
use trellis_kit::manifest::Route;
use trellis_kit::response::{ResponseInit, json_with};
use trellis_kit::wire::{DataNode, DataResponse, decode_mask};
use trellis_kit::{HttpError, LoadError, RequestEvent};

use crate::hooks::HandleResult;
use crate::page::branch_nodes;
use crate::respond::error_json;
use crate::server::Server;

/// Answer `<path>/__data.json`: the server-load output of every node the mask
/// asks for. Nodes masked out are `skip`, nodes without a server load `null`.
pub(crate) async fn render_data(
  server: &Server,
  route: Option<&Route>,
  event: &RequestEvent,
  mask: Option<&str>,
) -> HandleResult {
  let Some(route) = route.filter(|r| r.is_page()) else {
    let err = HttpError::not_found(event.url().path());
    return Ok(error_json(err.status, err.body.as_value()));
  };

  let nodes = branch_nodes(server, &route.branch());
  let rerun = decode_mask(mask, nodes.len());
  let drive: Vec<bool> = nodes
    .iter()
    .zip(&rerun)
    .map(|(node, rerun)| *rerun && node.as_ref().is_some_and(|n| n.has_server_load()))
    .collect();

  let tasks = load::server_tasks(event, &nodes);
  let settled = load::settle(&tasks, &drive).await;

  let mut entries: Vec<Option<DataNode>> = Vec::with_capacity(nodes.len());
  for (i, result) in settled.results.into_iter().enumerate() {
    if let Some(ref failure) = settled.error {
      if i == failure.index {
        break;
      }
    }
    let entry = if !rerun[i] {
      Some(DataNode::Skip)
    } else if drive[i] {
      result.flatten().map(|sd| DataNode::Data { data: sd.data, uses: sd.uses })
    } else {
      None
    };
    entries.push(entry);
  }

  let body = match settled.error {
    None => DataResponse::Data { nodes: entries },
    Some(failure) => match failure.error {
      LoadError::Redirect(r) => DataResponse::Redirect { location: r.location },
      LoadError::Http(e) => {
        entries.push(Some(DataNode::Error { error: e.body.into_value(), status: Some(e.status) }));
        DataResponse::Data { nodes: entries }
      }
      err @ LoadError::Unexpected(_) => {
        let error = server.error_body(&err, event);
        entries.push(Some(DataNode::Error { error, status: Some(err.status()) }));
        DataResponse::Data { nodes: entries }
      }
    },
  };

  let mut init = ResponseInit::status(StatusCode::OK);
  init.headers.insert(CACHE_CONTROL, HeaderValue::from_static("private, no-store"));
  Ok(json_with(&body, init)?)
}
