/* src/client/core/rust/src/rerun.rs */

use std::collections::{BTreeMap, BTreeSet};

use trellis_kit::{DependencyTracker, Invalidation, Params, Uses};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Phase {
  Server,
  Universal,
}

/// One load of the committed branch: the node at `position` and which of its
/// two loads ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct LoadId {
  pub position: usize,
  pub phase: Phase,
}

impl LoadId {
  pub(crate) fn server(position: usize) -> Self {
    Self { position, phase: Phase::Server }
  }

  pub(crate) fn universal(position: usize) -> Self {
    Self { position, phase: Phase::Universal }
  }
}

/// The URL without its fragment. Two URLs with the same key show the same page.
pub(crate) fn page_key(url: &Url) -> Url {
  let mut key = url.clone();
  key.set_fragment(None);
  key
}

fn search_map(url: &Url) -> BTreeMap<String, Vec<String>> {
  let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
  for (k, v) in url.query_pairs() {
    map.entry(k.into_owned()).or_default().push(v.into_owned());
  }
  map
}

/// Names of search params that were added, removed or given another value.
pub(crate) fn changed_search_params(from: &Url, to: &Url) -> BTreeSet<String> {
  let (a, b) = (search_map(from), search_map(to));
  a.keys().chain(b.keys()).filter(|k| a.get(*k) != b.get(*k)).cloned().collect()
}

pub(crate) fn changed_params(from: &Params, to: &Params) -> BTreeSet<String> {
  from.keys().chain(to.keys()).filter(|k| from.get(*k) != to.get(*k)).cloned().collect()
}

/// What differs between the committed page and the one being loaded.
#[derive(Debug, Default)]
pub(crate) struct Changes {
  pub route: bool,
  pub url: bool,
  pub search_params: BTreeSet<String>,
  pub params: BTreeSet<String>,
  /// Loads with a dependency matched by a pending invalidation.
  pub invalidated: BTreeSet<LoadId>,
  /// `invalidate_all`: everything reruns.
  pub force: bool,
}

impl Changes {
  pub(crate) fn affects(&self, load: LoadId, uses: Option<&Uses>, parent_changed: bool) -> bool {
    if self.force {
      return true;
    }
    let Some(uses) = uses else {
      return false;
    };
    (uses.parent && parent_changed)
      || (uses.route && self.route)
      || (uses.url && self.url)
      || uses.search_params.iter().any(|name| self.search_params.contains(name))
      || uses.params.iter().any(|name| self.params.contains(name))
      || self.invalidated.contains(&load)
  }
}

/// Every load touched by at least one of `invalidations`.
pub(crate) fn invalidated_loads(tracker: &DependencyTracker<LoadId>, invalidations: &[Invalidation]) -> BTreeSet<LoadId> {
  invalidations.iter().flat_map(|inv| tracker.query(inv)).collect()
}
