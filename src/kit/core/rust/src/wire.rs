/* src/kit/core/rust/src/wire.rs */

// Data request protocol shared by the server and the client router.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::deps::Uses;
use crate::load::DataMap;
use crate::routing::Params;

pub const DATA_SUFFIX: &str = "/__data.json";
/// Query parameter carrying the per-node rerun mask, e.g. `101`.
pub const INVALIDATED_PARAM: &str = "x-trellis-invalidated";

/// `/blog/post` -> `/blog/post/__data.json`, `/` -> `/__data.json`.
pub fn add_data_suffix(pathname: &str) -> String {
  format!("{}{DATA_SUFFIX}", pathname.trim_end_matches('/'))
}

/// Inverse of [`add_data_suffix`]; `None` for ordinary page paths.
pub fn strip_data_suffix(pathname: &str) -> Option<String> {
  let stripped = pathname.strip_suffix(DATA_SUFFIX)?;
  Some(if stripped.is_empty() { "/".to_string() } else { stripped.to_string() })
}

pub fn encode_mask(mask: &[bool]) -> String {
  mask.iter().map(|rerun| if *rerun { '1' } else { '0' }).collect()
}

/// Decode a rerun mask for `len` nodes. Without a mask every node reruns;
/// positions the mask does not cover are skipped.
pub fn decode_mask(raw: Option<&str>, len: usize) -> Vec<bool> {
  match raw {
    None => vec![true; len],
    Some(raw) => {
      let bits: Vec<bool> = raw.chars().map(|c| c == '1').collect();
      (0..len).map(|i| bits.get(i).copied().unwrap_or(false)).collect()
    }
  }
}

/// One node's entry in a data response. Nodes without a server load are `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DataNode {
  Data {
    data: Option<DataMap>,
    #[serde(default)]
    uses: Uses,
  },
  Skip,
  Error {
    error: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
  },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DataResponse {
  Data { nodes: Vec<Option<DataNode>> },
  Redirect { location: String },
}

/// Embedded in server-rendered HTML so the client can hydrate without
/// re-running server loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HydrationPayload {
  pub route_id: Option<String>,
  #[serde(default)]
  pub params: Params,
  pub status: u16,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<Value>,
  /// Server results for layouts then leaf, as in a data response.
  pub nodes: Vec<Option<DataNode>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub form: Option<Value>,
}
