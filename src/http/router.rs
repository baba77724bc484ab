//! Hand-rolled specificity-based router (C7).
//!
//! Workflows are data, loaded (and reloadable) at runtime, so dispatch
//! can't be handed to `axum::Router` without rebuilding the whole tree on
//! every config change. Matching: literal segments outrank parameterized
//! ones; an otherwise-matching path with no method match is a 405, not a
//! 404.

use crate::workflow::compiler::{CompiledTrigger, CompiledWorkflow};
use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    Param(String),
}

#[derive(Debug, Clone)]
struct RouteEntry {
    workflow_index: usize,
    method: String,
    segments: Vec<Segment>,
}

pub struct Router {
    routes: Vec<RouteEntry>,
}

pub enum MatchOutcome {
    Matched { workflow_index: usize, path_params: IndexMap<String, String> },
    MethodNotAllowed,
    NotFound,
}

impl Router {
    pub fn build(plans: &[CompiledWorkflow]) -> Router {
        let mut routes = Vec::new();
        for (workflow_index, plan) in plans.iter().enumerate() {
            for trigger in &plan.triggers {
                if let CompiledTrigger::Http(http) = trigger {
                    routes.push(RouteEntry {
                        workflow_index,
                        method: http.method.to_uppercase(),
                        segments: parse_segments(&http.path),
                    });
                }
            }
        }
        Router { routes }
    }

    pub fn find(&self, method: &str, path: &str) -> MatchOutcome {
        let path_segs: Vec<&str> = path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();

        let mut candidates: Vec<&RouteEntry> = self.routes.iter().filter(|r| segments_match(&r.segments, &path_segs)).collect();
        if candidates.is_empty() {
            return MatchOutcome::NotFound;
        }
        candidates.sort_by_key(|r| std::cmp::Reverse(literal_count(&r.segments)));
        let top_specificity = literal_count(&candidates[0].segments);
        let top: Vec<&&RouteEntry> = candidates.iter().filter(|r| literal_count(&r.segments) == top_specificity).collect();

        match top.iter().find(|r| r.method.eq_ignore_ascii_case(method)) {
            Some(route) => MatchOutcome::Matched {
                workflow_index: route.workflow_index,
                path_params: extract_params(&route.segments, &path_segs),
            },
            None => MatchOutcome::MethodNotAllowed,
        }
    }
}

fn parse_segments(path: &str) -> Vec<Segment> {
    path.trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            if let Some(name) = s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Segment::Param(name.to_string())
            } else {
                Segment::Literal(s.to_string())
            }
        })
        .collect()
}

fn segments_match(route: &[Segment], path: &[&str]) -> bool {
    if route.len() != path.len() {
        return false;
    }
    route.iter().zip(path.iter()).all(|(seg, p)| match seg {
        Segment::Literal(l) => l == p,
        Segment::Param(_) => true,
    })
}

fn literal_count(segments: &[Segment]) -> usize {
    segments.iter().filter(|s| matches!(s, Segment::Literal(_))).count()
}

fn extract_params(route: &[Segment], path: &[&str]) -> IndexMap<String, String> {
    let mut out = IndexMap::new();
    for (seg, p) in route.iter().zip(path.iter()) {
        if let Segment::Param(name) = seg {
            out.insert(name.clone(), (*p).to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(method: &str, path: &str, idx: usize) -> RouteEntry {
        RouteEntry { workflow_index: idx, method: method.to_string(), segments: parse_segments(path) }
    }

    #[test]
    fn test_literal_beats_param_on_specificity() {
        let router = Router {
            routes: vec![entry("GET", "/items/{id}", 0), entry("GET", "/items/recent", 1)],
        };
        match router.find("GET", "/items/recent") {
            MatchOutcome::Matched { workflow_index, .. } => assert_eq!(workflow_index, 1),
            _ => panic!("expected match"),
        }
    }

    #[test]
    fn test_method_mismatch_is_405_not_404() {
        let router = Router { routes: vec![entry("GET", "/items/{id}", 0)] };
        assert!(matches!(router.find("POST", "/items/5"), MatchOutcome::MethodNotAllowed));
    }

    #[test]
    fn test_unmatched_path_is_404() {
        let router = Router { routes: vec![entry("GET", "/items/{id}", 0)] };
        assert!(matches!(router.find("GET", "/other"), MatchOutcome::NotFound));
    }

    #[test]
    fn test_path_param_extraction() {
        let router = Router { routes: vec![entry("GET", "/items/{id}/sub/{name}", 0)] };
        match router.find("GET", "/items/42/sub/thing") {
            MatchOutcome::Matched { path_params, .. } => {
                assert_eq!(path_params.get("id").map(String::as_str), Some("42"));
                assert_eq!(path_params.get("name").map(String::as_str), Some("thing"));
            }
            _ => panic!("expected match"),
        }
    }
}
