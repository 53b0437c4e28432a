/* src/kit/core/rust/src/routing/pattern.rs */

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use super::{ParamMatchers, Params};
use crate::errors::KitError;

/// `[name]`, `[[name]]`, `[...name]`, `[[...name]]`, each with an optional `=matcher`.
pub(crate) static PARAM_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"\[(\[)?(\.\.\.)?(\w+?)(?:=(\w+))?\]\]?").expect("param pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
  pub name: String,
  pub matcher: Option<String>,
  pub optional: bool,
  pub rest: bool,
}

#[derive(Debug, Clone)]
pub enum SegmentPart {
  Literal(String),
  Param(ParamSpec),
}

/// One `/`-delimited piece of a route id, compiled for matching.
#[derive(Debug, Clone)]
pub enum RouteSegment {
  Static(String),
  /// The whole segment is a single parameter.
  Param(ParamSpec),
  /// Literal text mixed with parameters, e.g. `[a]-[b]` or `[slug].json`.
  Mixed { parts: Vec<SegmentPart>, pattern: Regex },
}

impl RouteSegment {
  pub fn params(&self) -> Vec<&ParamSpec> {
    match self {
      Self::Static(_) => Vec::new(),
      Self::Param(p) => vec![p],
      Self::Mixed { parts, .. } => parts
        .iter()
        .filter_map(|part| match part {
          SegmentPart::Param(p) => Some(p),
          SegmentPart::Literal(_) => None,
        })
        .collect(),
    }
  }
}

/// Split a route id into the segments that appear in URLs: empty pieces and
/// `(group)` segments are dropped.
pub fn route_segments(id: &str) -> impl Iterator<Item = &str> {
  id.split('/').filter(|seg| !seg.is_empty() && !is_group(seg))
}

fn is_group(segment: &str) -> bool {
  segment.starts_with('(') && segment.ends_with(')')
}

/// A route id compiled into positional segment matchers.
#[derive(Debug, Clone)]
pub struct RoutePattern {
  id: String,
  segments: Vec<RouteSegment>,
}

impl RoutePattern {
  pub fn parse(id: &str) -> Result<Self, KitError> {
    if !id.starts_with('/') {
      return Err(invalid(id, "route ids must start with '/'"));
    }
    let mut segments = Vec::new();
    let mut names: Vec<String> = Vec::new();
    for raw in route_segments(id) {
      let segment = parse_segment(id, raw)?;
      for p in segment.params() {
        if names.contains(&p.name) {
          return Err(invalid(id, &format!("duplicate parameter '{}'", p.name)));
        }
        names.push(p.name.clone());
      }
      segments.push(segment);
    }
    Ok(Self { id: id.to_string(), segments })
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn segments(&self) -> &[RouteSegment] {
    &self.segments
  }

  pub fn params(&self) -> impl Iterator<Item = &ParamSpec> {
    self.segments.iter().flat_map(RouteSegment::params)
  }

  /// Matchers named by this pattern, in segment order.
  pub fn matcher_names(&self) -> impl Iterator<Item = &str> {
    self.params().filter_map(|p| p.matcher.as_deref())
  }

  /// Match a URL pathname. Rejections by a param matcher fall through to the
  /// next way of assigning segments; `None` means this route does not match.
  pub fn exec(&self, pathname: &str, matchers: &ParamMatchers) -> Option<Params> {
    let path = split_path(pathname);
    let mut captured = Vec::new();
    if self.match_from(0, &path, 0, &mut captured, matchers) {
      Some(captured.into_iter().collect())
    } else {
      None
    }
  }

  fn match_from(
    &self,
    seg: usize,
    path: &[Cow<'_, str>],
    pos: usize,
    captured: &mut Vec<(String, String)>,
    matchers: &ParamMatchers,
  ) -> bool {
    let Some(segment) = self.segments.get(seg) else {
      return pos == path.len();
    };

    match segment {
      RouteSegment::Static(text) => {
        path.get(pos).is_some_and(|p| p == text)
          && self.match_from(seg + 1, path, pos + 1, captured, matchers)
      }
      RouteSegment::Param(p) if p.rest => {
        let remaining = path.len() - pos;
        let min = usize::from(!p.optional);
        for take in (min..=remaining).rev() {
          let value = path[pos..pos + take].join("/");
          if take > 0 && !matchers.test(p.matcher.as_deref(), &value) {
            continue;
          }
          let mark = captured.len();
          captured.push((p.name.clone(), value));
          if self.match_from(seg + 1, path, pos + take, captured, matchers) {
            return true;
          }
          captured.truncate(mark);
        }
        false
      }
      RouteSegment::Param(p) => {
        if let Some(value) = path.get(pos).filter(|v| !v.is_empty()) {
          if matchers.test(p.matcher.as_deref(), value) {
            let mark = captured.len();
            captured.push((p.name.clone(), value.to_string()));
            if self.match_from(seg + 1, path, pos + 1, captured, matchers) {
              return true;
            }
            captured.truncate(mark);
          }
        }
        p.optional && self.match_from(seg + 1, path, pos, captured, matchers)
      }
      RouteSegment::Mixed { parts, pattern } => {
        let Some(caps) = path.get(pos).and_then(|value| pattern.captures(value)) else {
          return false;
        };
        let mark = captured.len();
        let params = parts.iter().filter_map(|part| match part {
          SegmentPart::Param(p) => Some(p),
          SegmentPart::Literal(_) => None,
        });
        for (i, p) in params.enumerate() {
          match caps.get(i + 1).map(|m| m.as_str()).filter(|v| !v.is_empty()) {
            Some(value) => {
              if !matchers.test(p.matcher.as_deref(), value) {
                captured.truncate(mark);
                return false;
              }
              captured.push((p.name.clone(), value.to_string()));
            }
            None if p.optional => {}
            None => {
              captured.truncate(mark);
              return false;
            }
          }
        }
        if self.match_from(seg + 1, path, pos + 1, captured, matchers) {
          return true;
        }
        captured.truncate(mark);
        false
      }
    }
  }
}

/// `/a/b/` -> `["a", "b"]`, percent-decoded per segment so an encoded `/`
/// stays inside its segment.
fn split_path(pathname: &str) -> Vec<Cow<'_, str>> {
  let trimmed = pathname.strip_prefix('/').unwrap_or(pathname);
  let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
  if trimmed.is_empty() {
    return Vec::new();
  }
  trimmed
    .split('/')
    .map(|seg| urlencoding::decode(seg).unwrap_or(Cow::Borrowed(seg)))
    .collect()
}

fn invalid(id: &str, reason: &str) -> KitError {
  KitError::InvalidRouteId { route: id.to_string(), reason: reason.to_string() }
}

fn parse_segment(id: &str, raw: &str) -> Result<RouteSegment, KitError> {
  let mut parts = Vec::new();
  let mut last = 0;
  for caps in PARAM_RE.captures_iter(raw) {
    let Some(whole) = caps.get(0) else { continue };
    if whole.start() > last {
      parts.push(SegmentPart::Literal(raw[last..whole.start()].to_string()));
    }
    let optional = caps.get(1).is_some();
    if optional != whole.as_str().ends_with("]]") {
      return Err(invalid(id, &format!("unbalanced brackets in '{raw}'")));
    }
    parts.push(SegmentPart::Param(ParamSpec {
      name: caps[3].to_string(),
      matcher: caps.get(4).map(|m| m.as_str().to_string()),
      optional,
      rest: caps.get(2).is_some(),
    }));
    last = whole.end();
  }
  if last < raw.len() {
    parts.push(SegmentPart::Literal(raw[last..].to_string()));
  }

  for part in &parts {
    if let SegmentPart::Literal(text) = part {
      if text.contains(['[', ']']) {
        return Err(invalid(id, &format!("invalid segment '{raw}'")));
      }
    }
  }

  match parts.as_slice() {
    [SegmentPart::Literal(text)] => Ok(RouteSegment::Static(text.clone())),
    [SegmentPart::Param(p)] => Ok(RouteSegment::Param(p.clone())),
    _ => {
      let mut source = String::from("^");
      for part in &parts {
        match part {
          SegmentPart::Literal(text) => source.push_str(&regex::escape(text)),
          SegmentPart::Param(p) if p.rest => {
            return Err(invalid(id, "rest parameters must occupy a whole segment"));
          }
          SegmentPart::Param(p) if p.optional => source.push_str("([^/]*?)?"),
          SegmentPart::Param(_) => source.push_str("([^/]+?)"),
        }
      }
      source.push('$');
      let pattern = Regex::new(&source).map_err(|e| invalid(id, &e.to_string()))?;
      Ok(RouteSegment::Mixed { parts, pattern })
    }
  }
}
