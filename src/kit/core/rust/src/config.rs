/* src/kit/core/rust/src/config.rs */

use std::path::Path;

use serde::Deserialize;

use crate::errors::KitError;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrailingSlash {
  #[default]
  Never,
  Always,
  Ignore,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PathsConfig {
  /// Mount point of the app, e.g. `/docs`. Empty for the root.
  #[serde(default)]
  pub base: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ErrorsConfig {
  /// Static fallback page. Supports `%trellis.status%` and `%trellis.error.message%`.
  #[serde(default)]
  pub template: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
  #[serde(default = "default_max_redirects")]
  pub max_redirects: usize,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self { max_redirects: default_max_redirects() }
  }
}

fn default_max_redirects() -> usize {
  20
}

fn default_embedded_data_id() -> String {
  "__trellis_data".to_string()
}

/// Process-wide settings, loaded once at startup and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KitConfig {
  /// Origin used when a request carries no usable `Host`.
  #[serde(default)]
  pub origin: Option<String>,
  #[serde(default)]
  pub trailing_slash: TrailingSlash,
  #[serde(default = "default_embedded_data_id")]
  pub embedded_data_id: String,
  #[serde(default)]
  pub paths: PathsConfig,
  #[serde(default)]
  pub errors: ErrorsConfig,
  #[serde(default)]
  pub client: ClientConfig,
}

impl Default for KitConfig {
  fn default() -> Self {
    Self {
      origin: None,
      trailing_slash: TrailingSlash::default(),
      embedded_data_id: default_embedded_data_id(),
      paths: PathsConfig::default(),
      errors: ErrorsConfig::default(),
      client: ClientConfig::default(),
    }
  }
}

impl KitConfig {
  pub fn from_toml_str(content: &str) -> Result<Self, KitError> {
    let config: Self = toml::from_str(content).map_err(|e| KitError::Config(e.to_string()))?;
    config.validate()?;
    Ok(config)
  }

  pub fn load(path: &Path) -> Result<Self, KitError> {
    let content = std::fs::read_to_string(path)
      .map_err(|e| KitError::Config(format!("failed to read {}: {e}", path.display())))?;
    Self::from_toml_str(&content)
  }

  pub fn validate(&self) -> Result<(), KitError> {
    let base = &self.paths.base;
    if !base.is_empty() && (!base.starts_with('/') || base.ends_with('/')) {
      return Err(KitError::Config(format!(
        "paths.base must start with '/' and must not end with '/', got \"{base}\""
      )));
    }
    if let Some(ref origin) = self.origin {
      url::Url::parse(origin).map_err(|e| KitError::Config(format!("invalid origin \"{origin}\": {e}")))?;
    }
    if self.embedded_data_id.is_empty() {
      return Err(KitError::Config("embedded_data_id must not be empty".to_string()));
    }
    Ok(())
  }
}
