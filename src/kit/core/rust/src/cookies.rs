/* src/kit/core/rust/src/cookies.rs */

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use parking_lot::Mutex;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
  Strict,
  Lax,
  None,
}

impl SameSite {
  fn as_str(self) -> &'static str {
    match self {
      Self::Strict => "Strict",
      Self::Lax => "Lax",
      Self::None => "None",
    }
  }
}

/// Options for `Set-Cookie`. Unset fields take the request-derived defaults:
/// path = directory of the current pathname, `HttpOnly`, `Secure` (except on
/// `http://localhost`), `SameSite=Lax`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieOptions {
  pub path: Option<String>,
  pub domain: Option<String>,
  pub max_age: Option<i64>,
  pub expires: Option<String>,
  pub http_only: Option<bool>,
  pub secure: Option<bool>,
  pub same_site: Option<SameSite>,
}

impl CookieOptions {
  pub fn path(mut self, path: impl Into<String>) -> Self {
    self.path = Some(path.into());
    self
  }

  pub fn max_age(mut self, seconds: i64) -> Self {
    self.max_age = Some(seconds);
    self
  }

  pub fn http_only(mut self, on: bool) -> Self {
    self.http_only = Some(on);
    self
  }

  pub fn secure(mut self, on: bool) -> Self {
    self.secure = Some(on);
    self
  }

  pub fn same_site(mut self, same_site: SameSite) -> Self {
    self.same_site = Some(same_site);
    self
  }
}

#[derive(Debug, Clone)]
struct StagedCookie {
  value: String,
  options: CookieOptions,
}

impl StagedCookie {
  fn is_deletion(&self) -> bool {
    self.options.max_age == Some(0)
  }
}

#[derive(Debug)]
struct Jar {
  initial: BTreeMap<String, String>,
  staged: BTreeMap<String, StagedCookie>,
  default_path: String,
  secure_default: bool,
}

/// Request-scoped cookie jar. Clones share state, so writes from one load are
/// visible to `get` calls in every other load of the same request.
#[derive(Debug, Clone)]
pub struct Cookies {
  jar: Arc<Mutex<Jar>>,
}

impl Cookies {
  pub fn new(cookie_header: Option<&str>, url: &Url) -> Self {
    let path = url.path();
    let default_path = match path.rfind('/') {
      Some(0) | None => "/".to_string(),
      Some(idx) => path[..idx].to_string(),
    };
    let secure_default = !(url.scheme() == "http" && url.host_str() == Some("localhost"));
    Self {
      jar: Arc::new(Mutex::new(Jar {
        initial: cookie_header.map(parse_cookie_header).unwrap_or_default(),
        staged: BTreeMap::new(),
        default_path,
        secure_default,
      })),
    }
  }

  /// Staged writes win over request cookies; deleted cookies read as absent.
  pub fn get(&self, name: &str) -> Option<String> {
    let jar = self.jar.lock();
    if let Some(staged) = jar.staged.get(name) {
      return (!staged.is_deletion()).then(|| staged.value.clone());
    }
    jar.initial.get(name).cloned()
  }

  pub fn get_all(&self) -> Vec<(String, String)> {
    let jar = self.jar.lock();
    let mut all = jar.initial.clone();
    for (name, staged) in &jar.staged {
      if staged.is_deletion() {
        all.remove(name);
      } else {
        all.insert(name.clone(), staged.value.clone());
      }
    }
    all.into_iter().collect()
  }

  pub fn set(&self, name: &str, value: &str, options: CookieOptions) {
    self
      .jar
      .lock()
      .staged
      .insert(name.to_string(), StagedCookie { value: value.to_string(), options });
  }

  pub fn delete(&self, name: &str, options: CookieOptions) {
    self.set(name, "", options.max_age(0));
  }

  /// Render a `Set-Cookie` value without staging it.
  pub fn serialize(&self, name: &str, value: &str, options: &CookieOptions) -> String {
    let jar = self.jar.lock();
    serialize_cookie(name, value, options, &jar.default_path, jar.secure_default)
  }

  /// `Set-Cookie` header values for every staged write, in name order.
  pub fn set_cookie_headers(&self) -> Vec<String> {
    let jar = self.jar.lock();
    jar
      .staged
      .iter()
      .map(|(name, c)| serialize_cookie(name, &c.value, &c.options, &jar.default_path, jar.secure_default))
      .collect()
  }

  /// `name=value` pairs for forwarding to a same-origin sub-request.
  pub fn header_value(&self) -> Option<String> {
    let all = self.get_all();
    if all.is_empty() {
      return None;
    }
    Some(
      all
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("; "),
    )
  }
}

fn serialize_cookie(
  name: &str,
  value: &str,
  options: &CookieOptions,
  default_path: &str,
  secure_default: bool,
) -> String {
  let mut out = format!("{name}={}", urlencoding::encode(value));
  let _ = write!(out, "; Path={}", options.path.as_deref().unwrap_or(default_path));
  if let Some(ref domain) = options.domain {
    let _ = write!(out, "; Domain={domain}");
  }
  if let Some(max_age) = options.max_age {
    let _ = write!(out, "; Max-Age={max_age}");
  }
  if let Some(ref expires) = options.expires {
    let _ = write!(out, "; Expires={expires}");
  }
  if options.http_only.unwrap_or(true) {
    out.push_str("; HttpOnly");
  }
  if options.secure.unwrap_or(secure_default) {
    out.push_str("; Secure");
  }
  let _ = write!(out, "; SameSite={}", options.same_site.unwrap_or(SameSite::Lax).as_str());
  out
}

/// Parse a `Cookie` request header. The first occurrence of a name wins.
fn parse_cookie_header(header: &str) -> BTreeMap<String, String> {
  let mut cookies = BTreeMap::new();
  for pair in header.split(';') {
    let Some((k, v)) = pair.trim().split_once('=') else {
      continue;
    };
    let k = k.trim();
    if k.is_empty() || cookies.contains_key(k) {
      continue;
    }
    let v = v.trim().trim_matches('"');
    let decoded = urlencoding::decode(v).map(|s| s.into_owned()).unwrap_or_else(|_| v.to_string());
    cookies.insert(k.to_string(), decoded);
  }
  cookies
}
