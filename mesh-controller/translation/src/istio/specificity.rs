use meshhub_controller_k8s_api::istio::{HttpMatchRequest, HttpRoute, StringMatch};
use std::cmp::Ordering;

/// How narrowly a match request constrains traffic. Compared field by field,
/// so the path constraint dominates, then the method, then headers and
/// query parameters, then the source workload.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
struct Specificity {
    path: PathRank,
    method: bool,
    headers_or_query: bool,
    source: bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
enum PathRank {
    #[default]
    None,
    Regex,
    Prefix,
    Exact,
}

/// Sorts routes from most to least specific. Istio selects the first
/// matching route, so a broad route must never precede a narrow one. The
/// sort is stable: equally specific routes keep their relative order.
pub(super) fn sort(routes: &mut [HttpRoute]) {
    routes.sort_by(|a, b| compare(b, a));
}

fn compare(a: &HttpRoute, b: &HttpRoute) -> Ordering {
    route_specificity(a).cmp(&route_specificity(b))
}

fn route_specificity(route: &HttpRoute) -> Specificity {
    route
        .match_
        .iter()
        .map(match_specificity)
        .max()
        .unwrap_or_default()
}

fn match_specificity(m: &HttpMatchRequest) -> Specificity {
    let path = match &m.uri {
        Some(StringMatch::Exact(_)) => PathRank::Exact,
        Some(StringMatch::Prefix(_)) => PathRank::Prefix,
        Some(StringMatch::Regex(_)) => PathRank::Regex,
        None => PathRank::None,
    };
    Specificity {
        path,
        method: m.method.is_some(),
        headers_or_query: !m.headers.is_empty()
            || !m.without_headers.is_empty()
            || !m.query_params.is_empty(),
        source: !m.source_labels.is_empty() || m.source_namespace.is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;
    use pretty_assertions::assert_eq;

    fn route(m: HttpMatchRequest, timeout: &str) -> HttpRoute {
        HttpRoute {
            match_: vec![m],
            // Identifies the route after sorting.
            timeout: Some(timeout.to_string()),
            ..Default::default()
        }
    }

    fn order(routes: &[HttpRoute]) -> Vec<&str> {
        routes
            .iter()
            .map(|r| r.timeout.as_deref().unwrap_or_default())
            .collect()
    }

    #[test]
    fn exact_method_then_exact_then_prefix() {
        let mut routes = vec![
            route(
                HttpMatchRequest {
                    uri: Some(StringMatch::Exact("/a".to_string())),
                    method: Some(StringMatch::Exact("GET".to_string())),
                    ..Default::default()
                },
                "exact+method",
            ),
            route(
                HttpMatchRequest {
                    uri: Some(StringMatch::Prefix("/".to_string())),
                    ..Default::default()
                },
                "prefix",
            ),
            route(
                HttpMatchRequest {
                    uri: Some(StringMatch::Exact("/a".to_string())),
                    ..Default::default()
                },
                "exact",
            ),
        ];
        sort(&mut routes);
        assert_eq!(order(&routes), vec!["exact+method", "exact", "prefix"]);
    }

    #[test]
    fn every_dimension() {
        let mut routes = vec![
            HttpRoute {
                timeout: Some("catch-all".to_string()),
                ..Default::default()
            },
            route(
                HttpMatchRequest {
                    headers: btreemap! {
                        "x-canary".to_string() => StringMatch::Exact("true".to_string()),
                    },
                    ..Default::default()
                },
                "header",
            ),
            route(
                HttpMatchRequest {
                    uri: Some(StringMatch::Regex("/v[0-9]+".to_string())),
                    ..Default::default()
                },
                "regex",
            ),
            route(
                HttpMatchRequest {
                    method: Some(StringMatch::Exact("POST".to_string())),
                    ..Default::default()
                },
                "method",
            ),
            route(
                HttpMatchRequest {
                    uri: Some(StringMatch::Prefix("/api".to_string())),
                    query_params: btreemap! {
                        "debug".to_string() => StringMatch::Exact("1".to_string()),
                    },
                    ..Default::default()
                },
                "prefix+query",
            ),
        ];
        sort(&mut routes);
        assert_eq!(
            order(&routes),
            vec!["prefix+query", "regex", "method", "header", "catch-all"]
        );
    }

    #[test]
    fn ties_keep_input_order() {
        let prefix = |p: &str| HttpMatchRequest {
            uri: Some(StringMatch::Prefix(p.to_string())),
            ..Default::default()
        };
        let mut routes = vec![
            route(prefix("/b"), "first"),
            route(prefix("/a"), "second"),
            route(prefix("/c"), "third"),
        ];
        sort(&mut routes);
        assert_eq!(order(&routes), vec!["first", "second", "third"]);
    }

    #[test]
    fn source_restriction_breaks_ties() {
        let mut routes = vec![
            HttpRoute {
                timeout: Some("catch-all".to_string()),
                ..Default::default()
            },
            route(
                HttpMatchRequest {
                    source_namespace: Some("frontend".to_string()),
                    ..Default::default()
                },
                "frontend",
            ),
            route(
                HttpMatchRequest {
                    uri: Some(StringMatch::Prefix("/".to_string())),
                    ..Default::default()
                },
                "prefix",
            ),
            route(
                HttpMatchRequest {
                    uri: Some(StringMatch::Prefix("/".to_string())),
                    source_labels: btreemap! { "app".to_string() => "web".to_string() },
                    ..Default::default()
                },
                "prefix+source",
            ),
        ];
        sort(&mut routes);
        assert_eq!(
            order(&routes),
            vec!["prefix+source", "prefix", "frontend", "catch-all"]
        );
    }
}
