/* src/kit/core/rust/src/routing/resolve.rs */

use super::Params;
use super::pattern::{PARAM_RE, route_segments};
use crate::errors::KitError;

/// Fill a route id with parameters to build a pathname.
///
/// Optional and rest parameters that are absent (or empty) drop out of the
/// path; a missing required parameter, or any value starting or ending with
/// `/`, is an error.
///
/// ```
/// use trellis_kit::routing::{Params, resolve_path};
///
/// let mut params = Params::new();
/// params.insert("slug".into(), "hello-world".into());
/// params.insert("rest".into(), "something/else".into());
/// assert_eq!(
///   resolve_path("/blog/[slug]/[...rest]", &params).unwrap(),
///   "/blog/hello-world/something/else"
/// );
/// ```
pub fn resolve_path(id: &str, params: &Params) -> Result<String, KitError> {
  let mut resolved = Vec::new();
  for segment in route_segments(id) {
    let mut out = String::with_capacity(segment.len());
    let mut last = 0;
    for caps in PARAM_RE.captures_iter(segment) {
      let Some(whole) = caps.get(0) else { continue };
      out.push_str(&segment[last..whole.start()]);
      last = whole.end();

      let name = &caps[3];
      let optional = caps.get(1).is_some();
      let rest = caps.get(2).is_some();
      match params.get(name).map(String::as_str).filter(|v| !v.is_empty()) {
        None if optional || rest => {}
        None => {
          return Err(KitError::MissingParam { name: name.to_string(), route: id.to_string() });
        }
        Some(value) if value.starts_with('/') || value.ends_with('/') => {
          return Err(KitError::SlashInParam { name: name.to_string(), route: id.to_string() });
        }
        Some(value) => out.push_str(value),
      }
    }
    out.push_str(&segment[last..]);
    if !out.is_empty() {
      resolved.push(out);
    }
  }
  Ok(format!("/{}", resolved.join("/")))
}
