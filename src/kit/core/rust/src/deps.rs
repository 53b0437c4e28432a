/* src/kit/core/rust/src/deps.rs */

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::KitError;

static CUSTOM_KEY_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[a-z]+:").expect("custom key pattern is valid"));
static SCHEME_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:").expect("scheme pattern is valid"));

fn is_http_scheme(raw: &str) -> bool {
  let lower = raw.get(..8).unwrap_or(raw).to_ascii_lowercase();
  lower.starts_with("http:") || lower.starts_with("https:")
}

/// A normalized absolute URL, or a custom identifier like `increase:count`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyKey(String);

impl DependencyKey {
  /// Resolve `raw` against `base`. Relative and `http(s)` URLs are normalized;
  /// anything else must be a custom identifier matching `^[a-z]+:`.
  pub fn parse(raw: &str, base: &Url) -> Result<Self, KitError> {
    let invalid = |reason: &str| KitError::InvalidDependency { key: raw.to_string(), reason: reason.to_string() };

    if !is_http_scheme(raw) && SCHEME_RE.is_match(raw) {
      if !CUSTOM_KEY_RE.is_match(raw) {
        return Err(invalid("custom identifiers must match ^[a-z]+:"));
      }
      return Ok(Self(raw.to_string()));
    }

    let url = base.join(raw).map_err(|e| invalid(&e.to_string()))?;
    Ok(Self(url.into()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn is_custom(&self) -> bool {
    !is_http_scheme(&self.0)
  }

  pub fn to_url(&self) -> Option<Url> {
    if self.is_custom() { None } else { Url::parse(&self.0).ok() }
  }
}

impl fmt::Display for DependencyKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

pub type InvalidationPredicate = Arc<dyn Fn(&Url) -> bool + Send + Sync>;

/// What an `invalidate` call asks to rerun.
#[derive(Clone)]
pub enum Invalidation {
  Key(DependencyKey),
  /// Evaluated against URL dependencies; custom identifiers only match by key.
  Predicate(InvalidationPredicate),
  All,
}

impl Invalidation {
  pub fn key(raw: &str, base: &Url) -> Result<Self, KitError> {
    DependencyKey::parse(raw, base).map(Self::Key)
  }

  pub fn predicate(f: impl Fn(&Url) -> bool + Send + Sync + 'static) -> Self {
    Self::Predicate(Arc::new(f))
  }

  pub fn matches(&self, dep: &DependencyKey) -> bool {
    match self {
      Self::All => true,
      Self::Key(key) => key == dep,
      Self::Predicate(f) => dep.to_url().is_some_and(|url| f(&url)),
    }
  }
}

impl fmt::Debug for Invalidation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Key(k) => f.debug_tuple("Key").field(k).finish(),
      Self::Predicate(_) => f.write_str("Predicate(..)"),
      Self::All => f.write_str("All"),
    }
  }
}

/// Everything one load execution read, used to decide whether it must rerun.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uses {
  #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
  pub dependencies: BTreeSet<DependencyKey>,
  #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
  pub params: BTreeSet<String>,
  #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
  pub search_params: BTreeSet<String>,
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub parent: bool,
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub route: bool,
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub url: bool,
}

impl Uses {
  pub fn depends_on(&self, invalidation: &Invalidation) -> bool {
    self.dependencies.iter().any(|dep| invalidation.matches(dep))
  }
}

/// Shared, append-only recorder for one load execution.
#[derive(Clone, Default)]
pub struct UsageRecorder {
  inner: Arc<Mutex<Uses>>,
}

impl UsageRecorder {
  pub fn depend(&self, key: DependencyKey) {
    self.inner.lock().dependencies.insert(key);
  }

  pub fn param(&self, name: &str) {
    self.inner.lock().params.insert(name.to_string());
  }

  pub fn all_params<'a>(&self, names: impl IntoIterator<Item = &'a String>) {
    self.inner.lock().params.extend(names.into_iter().cloned());
  }

  pub fn search_param(&self, name: &str) {
    self.inner.lock().search_params.insert(name.to_string());
  }

  pub fn parent(&self) {
    self.inner.lock().parent = true;
  }

  pub fn route(&self) {
    self.inner.lock().route = true;
  }

  pub fn url(&self) {
    self.inner.lock().url = true;
  }

  pub fn snapshot(&self) -> Uses {
    self.inner.lock().clone()
  }
}

/// Dependency sets per load, keyed by the load's identity. A fresh execution
/// of a load starts from an empty set via [`DependencyTracker::begin`].
#[derive(Debug, Clone)]
pub struct DependencyTracker<K> {
  sets: BTreeMap<K, BTreeSet<DependencyKey>>,
}

impl<K> Default for DependencyTracker<K> {
  fn default() -> Self {
    Self { sets: BTreeMap::new() }
  }
}

impl<K: Ord + Clone> DependencyTracker<K> {
  pub fn begin(&mut self, load: K) {
    self.sets.insert(load, BTreeSet::new());
  }

  pub fn record(&mut self, load: K, key: DependencyKey) {
    self.sets.entry(load).or_default().insert(key);
  }

  pub fn replace(&mut self, load: K, keys: BTreeSet<DependencyKey>) {
    self.sets.insert(load, keys);
  }

  pub fn forget(&mut self, load: &K) {
    self.sets.remove(load);
  }

  pub fn dependencies(&self, load: &K) -> Option<&BTreeSet<DependencyKey>> {
    self.sets.get(load)
  }

  /// Loads with at least one dependency matching `invalidation`.
  pub fn query(&self, invalidation: &Invalidation) -> BTreeSet<K> {
    if let Invalidation::All = invalidation {
      return self.query_all();
    }
    self
      .sets
      .iter()
      .filter(|(_, deps)| deps.iter().any(|dep| invalidation.matches(dep)))
      .map(|(load, _)| load.clone())
      .collect()
  }

  pub fn query_all(&self) -> BTreeSet<K> {
    self.sets.keys().cloned().collect()
  }
}
