/* src/client/core/rust/src/host.rs */

use std::sync::Arc;

use futures_util::future;
use serde_json::Value;
use trellis_kit::fetch::{Fetch, get};
use trellis_kit::wire::{DataResponse, INVALIDATED_PARAM, add_data_suffix, encode_mask};
use trellis_kit::{BoxFuture, ErrorBody, HttpError, LoadError};
use url::Url;

use crate::state::Page;

/// The document the client drives: history, the rendered UI and the browser's
/// own navigation. No method is called with the client's state lock held.
pub trait Host: Send + Sync {
  /// Show `page`. Called once per committed navigation, refresh or shallow
  /// state change, never for two pages at once.
  fn commit(&self, page: &Page);

  /// Add a history entry. `state` is the shallow-routing state, if any.
  fn push_state(&self, url: &Url, state: Option<&Value>);

  fn replace_state(&self, url: &Url, state: Option<&Value>);

  /// Move through history by `delta` entries, used to undo a cancelled
  /// back/forward.
  fn go(&self, delta: i64);

  /// Hand `url` to the browser for a full document load.
  fn navigate_document(&self, url: &Url);

  /// The browser's native "leave this page?" prompt. `true` means leave.
  fn confirm_unload(&self) -> bool;

  /// Load the code for `components` ahead of time.
  fn preload_code(&self, components: &[String]) -> BoxFuture<()> {
    let _ = components;
    Box::pin(future::ready(()))
  }
}

/// Where server load results come from.
pub trait ServerDataSource: Send + Sync {
  /// Fetch the server data for `url`, rerunning only the nodes set in `mask`.
  fn load(&self, url: &Url, mask: &[bool]) -> BoxFuture<Result<DataResponse, LoadError>>;
}

/// `GET <path>/__data.json?x-trellis-invalidated=<mask>` through a [`Fetch`].
#[derive(Clone)]
pub struct FetchSource {
  fetch: Arc<dyn Fetch>,
}

impl FetchSource {
  pub fn new(fetch: Arc<dyn Fetch>) -> Self {
    Self { fetch }
  }
}

pub(crate) fn data_url(url: &Url, mask: &[bool]) -> Url {
  let mut data = url.clone();
  data.set_path(&add_data_suffix(url.path()));
  data.set_fragment(None);
  let pairs: Vec<(String, String)> =
    url.query_pairs().into_owned().filter(|(k, _)| k != INVALIDATED_PARAM).collect();
  data.query_pairs_mut().clear().extend_pairs(pairs).append_pair(INVALIDATED_PARAM, &encode_mask(mask));
  data
}

fn error_body(body: &[u8]) -> ErrorBody {
  match serde_json::from_slice::<Value>(body) {
    Ok(value @ Value::Object(_)) => ErrorBody::from(value),
    _ => ErrorBody::message(String::from_utf8_lossy(body)),
  }
}

impl ServerDataSource for FetchSource {
  fn load(&self, url: &Url, mask: &[bool]) -> BoxFuture<Result<DataResponse, LoadError>> {
    let target = data_url(url, mask);
    let request = match get(target.as_str()) {
      Ok(request) => request,
      Err(e) => return Box::pin(future::ready(Err(e))),
    };
    let fetch = self.fetch.clone();
    Box::pin(async move {
      tracing::debug!(url = %target, "data request");
      let response = fetch.fetch(request).await?;
      if !response.status().is_success() {
        let status = response.status().as_u16();
        return Err(HttpError { status, body: error_body(response.body()) }.into());
      }
      Ok(serde_json::from_slice(response.body())?)
    })
  }
}
