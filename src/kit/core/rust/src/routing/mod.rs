/* src/kit/core/rust/src/routing/mod.rs */

mod pattern;
mod resolve;
mod sort;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

pub use pattern::{ParamSpec, RoutePattern, RouteSegment, SegmentPart, route_segments};
pub use resolve::resolve_path;
pub use sort::compare_routes;

/// Extracted route parameters. Ordered so serialized output is stable.
pub type Params = BTreeMap<String, String>;

/// The path below the app's mount point, or `None` outside of it.
pub fn strip_base<'a>(path: &'a str, base: &str) -> Option<&'a str> {
  if base.is_empty() {
    return Some(path);
  }
  match path.strip_prefix(base)? {
    "" => Some("/"),
    rest if rest.starts_with('/') => Some(rest),
    _ => None,
  }
}

pub type ParamMatcher = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Named predicates that constrain `[param=name]` segments.
#[derive(Clone, Default)]
pub struct ParamMatchers {
  matchers: HashMap<String, ParamMatcher>,
}

impl ParamMatchers {
  pub fn insert(
    &mut self,
    name: impl Into<String>,
    matcher: impl Fn(&str) -> bool + Send + Sync + 'static,
  ) {
    self.matchers.insert(name.into(), Arc::new(matcher));
  }

  pub fn contains(&self, name: &str) -> bool {
    self.matchers.contains_key(name)
  }

  /// `None` always passes; an unregistered name never does.
  pub fn test(&self, name: Option<&str>, value: &str) -> bool {
    match name {
      None => true,
      Some(name) => self.matchers.get(name).is_some_and(|m| m(value)),
    }
  }
}

impl fmt::Debug for ParamMatchers {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut names: Vec<_> = self.matchers.keys().collect();
    names.sort();
    f.debug_struct("ParamMatchers").field("names", &names).finish()
  }
}
