/* src/server/core/rust/src/negotiate.rs */

/// Pick the entry of `offered` the `Accept` header ranks highest. Ties go to
/// the earlier entry in `offered`. Returns `None` when nothing is acceptable.
pub fn negotiate<'a>(accept: &str, offered: &[&'a str]) -> Option<&'a str> {
  let mut ranges: Vec<(&str, f64)> = Vec::new();
  for part in accept.split(',') {
    let mut segments = part.split(';');
    let range = segments.next().unwrap_or("").trim();
    if range.is_empty() {
      continue;
    }
    let mut q = 1.0_f64;
    for s in segments {
      if let Some(val) = s.trim().strip_prefix("q=") {
        if let Ok(v) = val.parse::<f64>() {
          q = v;
        }
      }
    }
    ranges.push((range, q));
  }

  let mut best: Option<(&'a str, f64, u8)> = None;
  for candidate in offered {
    let Some((q, specificity)) = ranges
      .iter()
      .filter_map(|(range, q)| matches(range, candidate).map(|spec| (*q, spec)))
      .max_by(|a, b| a.1.cmp(&b.1))
    else {
      continue;
    };
    if q <= 0.0 {
      continue;
    }
    let better = match best {
      None => true,
      Some((_, bq, bs)) => q > bq || (q == bq && specificity > bs),
    };
    if better {
      best = Some((candidate, q, specificity));
    }
  }
  best.map(|(c, _, _)| c)
}

/// Specificity of `range` matching `mime`: 2 exact, 1 `type/*`, 0 `*/*`.
fn matches(range: &str, mime: &str) -> Option<u8> {
  if range == "*/*" {
    return Some(0);
  }
  let (rt, rs) = range.split_once('/')?;
  let (mt, ms) = mime.split_once('/')?;
  if !rt.eq_ignore_ascii_case(mt) {
    return None;
  }
  if rs == "*" {
    Some(1)
  } else if rs.eq_ignore_ascii_case(ms) {
    Some(2)
  } else {
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn browser_accept_prefers_html() {
    let accept = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
    assert_eq!(negotiate(accept, &["application/json", "text/html"]), Some("text/html"));
  }

  #[test]
  fn json_client_gets_json() {
    assert_eq!(negotiate("application/json", &["application/json", "text/html"]), Some("application/json"));
  }

  #[test]
  fn wildcard_ties_go_to_first_offer() {
    assert_eq!(negotiate("*/*", &["application/json", "text/html"]), Some("application/json"));
  }

  #[test]
  fn q_zero_excludes() {
    assert_eq!(negotiate("text/html;q=0", &["text/html"]), None);
  }

  #[test]
  fn empty_header_matches_nothing() {
    assert_eq!(negotiate("", &["text/html"]), None);
  }
}
