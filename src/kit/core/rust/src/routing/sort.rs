/* src/kit/core/rust/src/routing/sort.rs */

use std::cmp::Ordering;

use super::pattern::{RoutePattern, RouteSegment, SegmentPart};

/// Specificity of one segment; lower sorts first.
fn rank(segment: &RouteSegment) -> (u8, usize) {
  match segment {
    RouteSegment::Static(_) => (0, 0),
    RouteSegment::Mixed { parts, .. } => {
      let literal: usize = parts
        .iter()
        .map(|part| match part {
          SegmentPart::Literal(text) => text.len(),
          SegmentPart::Param(_) => 0,
        })
        .sum();
      // More literal text is more specific.
      (1, usize::MAX - literal)
    }
    RouteSegment::Param(p) => {
      let base = match (p.rest, p.optional) {
        (false, false) => 2,
        (false, true) => 4,
        (true, false) => 6,
        (true, true) => 8,
      };
      (base + u8::from(p.matcher.is_none()), 0)
    }
  }
}

/// Priority order used when the manifest is built: static before dynamic,
/// matcher-constrained before unconstrained, required before optional, and
/// rest last. Ties fall back to the route id so the order is total.
pub fn compare_routes(a: &RoutePattern, b: &RoutePattern) -> Ordering {
  let (sa, sb) = (a.segments(), b.segments());
  for i in 0..sa.len().max(sb.len()) {
    match (sa.get(i), sb.get(i)) {
      (Some(x), Some(y)) => {
        let by_rank = rank(x).cmp(&rank(y));
        if by_rank != Ordering::Equal {
          return by_rank;
        }
        if let (RouteSegment::Static(tx), RouteSegment::Static(ty)) = (x, y) {
          let by_text = tx.cmp(ty);
          if by_text != Ordering::Equal {
            return by_text;
          }
        }
      }
      (None, Some(_)) => return Ordering::Less,
      (Some(_), None) => return Ordering::Greater,
      (None, None) => break,
    }
  }
  a.id().cmp(b.id())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sorted(ids: &[&str]) -> Vec<String> {
    let mut patterns: Vec<_> = ids.iter().map(|id| RoutePattern::parse(id).unwrap()).collect();
    patterns.sort_by(compare_routes);
    patterns.iter().map(|p| p.id().to_string()).collect()
  }

  #[test]
  fn static_before_dynamic_before_rest() {
    assert_eq!(
      sorted(&["/[...rest]", "/[slug]", "/about"]),
      vec!["/about", "/[slug]", "/[...rest]"]
    );
  }

  #[test]
  fn matcher_before_plain_param() {
    assert_eq!(sorted(&["/[id]", "/[id=integer]"]), vec!["/[id=integer]", "/[id]"]);
  }

  #[test]
  fn required_before_optional() {
    assert_eq!(sorted(&["/[[lang]]", "/[page]"]), vec!["/[page]", "/[[lang]]"]);
  }

  #[test]
  fn mixed_between_static_and_param() {
    assert_eq!(
      sorted(&["/[slug]", "/[slug].json", "/feed"]),
      vec!["/feed", "/[slug].json", "/[slug]"]
    );
  }

  #[test]
  fn shorter_route_first_on_shared_prefix() {
    assert_eq!(sorted(&["/a/[[b]]", "/a"]), vec!["/a", "/a/[[b]]"]);
  }

  #[test]
  fn order_is_independent_of_input_order() {
    let ids = ["/blog/[slug]", "/blog", "/[...rest]", "/blog/new", "/(app)/settings"];
    let mut reversed = ids;
    reversed.reverse();
    assert_eq!(sorted(&ids), sorted(&reversed));
  }
}
