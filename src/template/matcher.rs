//! Matching concrete URLs against pattern templates.

use super::{MatchBinding, QueryParam, Segment, UrlTemplate};

impl UrlTemplate {
    /// Match a concrete URL against this pattern.
    ///
    /// Returns `None` when the candidate is not URL-shaped (fails literal
    /// parsing) or does not fit the pattern.
    pub fn match_url(&self, candidate: &str) -> Option<MatchBinding> {
        let candidate = UrlTemplate::parse_literal(candidate).ok()?;
        self.matches(&candidate)
    }

    /// Match an already-parsed literal URL against this pattern.
    ///
    /// Components absent from the pattern match anything. The host compares
    /// case-insensitively; everything else is case-sensitive.
    pub fn matches(&self, candidate: &UrlTemplate) -> Option<MatchBinding> {
        let mut binding = MatchBinding::new();

        if let Some(ref scheme) = self.scheme {
            if !match_scalar(scheme, literal_of(&candidate.scheme), false, &mut binding) {
                return None;
            }
        }
        if let Some(ref host) = self.host {
            if !match_scalar(host, literal_of(&candidate.host), true, &mut binding) {
                return None;
            }
        }
        if let Some(ref port) = self.port {
            if !match_scalar(port, literal_of(&candidate.port), false, &mut binding) {
                return None;
            }
        }

        if self.absolute != candidate.absolute {
            return None;
        }
        let values: Vec<&str> = candidate
            .path
            .iter()
            .map(|s| s.as_literal().unwrap_or_default())
            .collect();
        if !match_path(&self.path, &values, &mut binding) {
            return None;
        }

        if !match_query(&self.query, &candidate.query, &mut binding) {
            return None;
        }

        if let Some(ref fragment) = self.fragment {
            if !match_scalar(fragment, literal_of(&candidate.fragment), false, &mut binding) {
                return None;
            }
        }

        Some(binding)
    }
}

fn literal_of(segment: &Option<Segment>) -> Option<&str> {
    segment.as_ref().and_then(Segment::as_literal)
}

fn match_scalar(
    pattern: &Segment,
    value: Option<&str>,
    ignore_case: bool,
    binding: &mut MatchBinding,
) -> bool {
    match pattern {
        Segment::Literal(expected) => match value {
            Some(v) if ignore_case => v.eq_ignore_ascii_case(expected),
            Some(v) => v == expected.as_str(),
            None => false,
        },
        Segment::Wildcard => value.is_some_and(|v| !v.is_empty()),
        Segment::Glob => true,
        Segment::Capture { name, glob: false } => match value {
            Some(v) if !v.is_empty() => {
                binding.insert(name.clone(), vec![v.to_string()]);
                true
            }
            _ => false,
        },
        Segment::Capture { name, glob: true } => {
            binding.insert(name.clone(), value.map(str::to_string).into_iter().collect());
            true
        }
        Segment::Function { .. } => false,
    }
}

/// Segment-by-segment path match; `**` is greedy and backtracks.
fn match_path(pattern: &[Segment], values: &[&str], binding: &mut MatchBinding) -> bool {
    let Some((head, rest)) = pattern.split_first() else {
        return values.is_empty();
    };

    match head {
        Segment::Glob | Segment::Capture { glob: true, .. } => {
            for take in (0..=values.len()).rev() {
                let mut trial = binding.clone();
                if match_path(rest, &values[take..], &mut trial) {
                    if let Segment::Capture { name, .. } = head {
                        let consumed = values[..take].iter().map(|s| s.to_string()).collect();
                        trial.insert(name.clone(), consumed);
                    }
                    *binding = trial;
                    return true;
                }
            }
            false
        }
        _ => match values.split_first() {
            Some((value, remaining)) => {
                match_scalar(head, Some(*value), false, binding)
                    && match_path(rest, remaining, binding)
            }
            None => false,
        },
    }
}

/// Unordered query match. Every pattern parameter must find its name among
/// the candidate's parameters; unclaimed candidate parameters are recorded
/// as extras rather than rejected.
fn match_query(pattern: &[QueryParam], candidate: &[QueryParam], binding: &mut MatchBinding) -> bool {
    let mut claimed = vec![false; candidate.len()];

    for param in pattern {
        let found: Vec<(usize, Option<&str>)> = candidate
            .iter()
            .enumerate()
            .filter(|(_, c)| c.name == param.name)
            .map(|(i, c)| (i, c.value.as_ref().and_then(Segment::as_literal)))
            .collect();
        if found.is_empty() {
            return false;
        }

        // Only parameters whose value fit are claimed; the rest stay extras
        let hits: Vec<usize> = match param.value {
            None | Some(Segment::Glob) => found.iter().map(|(i, _)| *i).collect(),
            Some(Segment::Literal(ref expected)) => found
                .iter()
                .filter(|(_, v)| v.is_some_and(|v| v == expected.as_str()))
                .map(|(i, _)| *i)
                .collect(),
            Some(Segment::Wildcard) => found
                .iter()
                .filter(|(_, v)| v.is_some_and(|v| !v.is_empty()))
                .map(|(i, _)| *i)
                .collect(),
            Some(Segment::Capture { ref name, .. }) => {
                let values = found.iter().map(|(_, v)| v.map(str::to_string)).collect();
                binding.insert_query(name.clone(), values);
                found.iter().map(|(i, _)| *i).collect()
            }
            Some(Segment::Function { .. }) => vec![],
        };
        if hits.is_empty() {
            return false;
        }
        for i in hits {
            claimed[i] = true;
        }
    }

    let extra = candidate
        .iter()
        .zip(claimed)
        .filter(|(_, claimed)| !claimed)
        .map(|(c, _)| {
            (
                c.name.clone(),
                c.value.as_ref().and_then(Segment::as_literal).map(str::to_string),
            )
        })
        .collect();
    binding.set_extra_query(extra);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(text: &str) -> UrlTemplate {
        UrlTemplate::parse(text).unwrap()
    }

    #[test]
    fn test_literal_path_match() {
        let t = pattern("/test-input-path");
        assert!(t.match_url("/test-input-path").is_some());
        assert!(t.match_url("/test-input-path-1").is_none());
        assert!(t.match_url("/Test-Input-Path").is_none());
        // Absent scheme and authority in the pattern match anything
        assert!(t.match_url("http://mock-host:1/test-input-path").is_some());
    }

    #[test]
    fn test_host_is_case_insensitive() {
        let t = pattern("http://mock-host:1/x");
        assert!(t.match_url("http://MOCK-HOST:1/x").is_some());
        assert!(t.match_url("HTTP://mock-host:1/x").is_none());
    }

    #[test]
    fn test_captures_bind_values() {
        let t = pattern("{scheme}://{host}:{port}/{service}/v1/{id}");
        let b = t.match_url("https://gw.example.com:8443/orders/v1/42").unwrap();
        assert_eq!(b.first("scheme"), Some("https"));
        assert_eq!(b.first("host"), Some("gw.example.com"));
        assert_eq!(b.first("port"), Some("8443"));
        assert_eq!(b.first("service"), Some("orders"));
        assert_eq!(b.first("id"), Some("42"));
    }

    #[test]
    fn test_single_wildcard_needs_non_empty_segment() {
        let t = pattern("/a/*/c");
        assert!(t.match_url("/a/b/c").is_some());
        assert!(t.match_url("/a//c").is_none());
        assert!(t.match_url("/a/b/b/c").is_none());
    }

    #[test]
    fn test_glob_matches_zero_or_more() {
        let t = pattern("/api/{rest=**}");
        let b = t.match_url("/api").unwrap();
        assert_eq!(b.get("rest"), Some(&[] as &[String]));
        let b = t.match_url("/api/").unwrap();
        assert_eq!(b.get("rest"), Some(&[String::new()][..]));
        let b = t.match_url("/api/a/b/c").unwrap();
        assert_eq!(
            b.get("rest").unwrap(),
            &["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn test_glob_backtracks_for_suffix() {
        let t = pattern("/{prefix=**}/edit");
        let b = t.match_url("/a/b/edit").unwrap();
        assert_eq!(b.get("prefix").unwrap(), &["a".to_string(), "b".to_string()]);
        assert!(t.match_url("/a/b/view").is_none());
    }

    #[test]
    fn test_query_is_unordered_and_keeps_extras() {
        let t = pattern("/search?q={term}&lang=en");
        let b = t.match_url("/search?page=2&lang=en&q=rust").unwrap();
        assert_eq!(b.first("term"), Some("rust"));
        assert_eq!(
            b.extra_query(),
            &[("page".to_string(), Some("2".to_string()))]
        );
        assert!(t.match_url("/search?q=rust").is_none());
        assert!(t.match_url("/search?q=rust&lang=de").is_none());
    }

    #[test]
    fn test_literal_query_claims_only_matching_values() {
        let t = pattern("/p?lang=en&{**}");
        let b = t.match_url("/p?lang=en&lang=de&x=1").unwrap();
        assert_eq!(
            b.extra_query(),
            &[
                ("lang".to_string(), Some("de".to_string())),
                ("x".to_string(), Some("1".to_string())),
            ]
        );

        let t = pattern("/p?id=*");
        let b = t.match_url("/p?id=&id=7").unwrap();
        assert_eq!(b.extra_query(), &[("id".to_string(), Some(String::new()))]);
    }

    #[test]
    fn test_valueless_query_capture() {
        let t = pattern("/a?flag={v}");
        let b = t.match_url("/a?flag&flag=").unwrap();
        assert_eq!(b.get("v").unwrap(), &[String::new(), String::new()]);
        assert!(b.is_valueless("v", 0));
        assert!(!b.is_valueless("v", 1));
    }

    #[test]
    fn test_repeated_query_values_bind_in_order() {
        let t = pattern("/tags?tag={tag}");
        let b = t.match_url("/tags?tag=a&x=1&tag=b").unwrap();
        assert_eq!(b.get("tag").unwrap(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_not_url_shaped_candidate() {
        let t = pattern("{scheme}://{host}:{port}/{path=**}");
        assert!(t.match_url("John Doe").is_none());
        assert!(t.match_url("100%").is_none());
        assert!(t.match_url("").is_none());
    }

    #[test]
    fn test_port_must_be_present_for_capture() {
        let t = pattern("{scheme}://{host}:{port}/x");
        assert!(t.match_url("http://host/x").is_none());
        let t = pattern("{scheme}://{host}/x");
        assert!(t.match_url("http://host:80/x").is_some());
    }
}
