//! Lowering of the legacy top-level `queries:` section into the
//! single-Query/single-Response workflow shape: each legacy query becomes
//! its own one-to-one workflow with a single Query step and a single
//! Response step.
//!
//! Runs once at config load, before compilation, so `workflow::compiler`
//! never needs to know legacy config existed.

use crate::workflow::{
    HttpTrigger, Parameter, ParamType, RawStep, RawTrigger, RawWorkflow,
};
use serde::Deserialize;

/// One entry of the legacy `queries:` section: an HTTP GET endpoint bound
/// directly to a single SQL query, with no blocks/HTTPCall/Set support.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyQuery {
    pub name: String,
    pub path: String,
    pub database: String,
    pub sql: String,
    #[serde(default)]
    pub params: Vec<LegacyParam>,
    #[serde(default = "default_response_template")]
    pub response: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LegacyParam {
    pub name: String,
    #[serde(default = "default_param_type")]
    #[serde(rename = "type")]
    pub kind: ParamType,
    #[serde(default)]
    pub required: bool,
}

fn default_param_type() -> ParamType {
    ParamType::String
}

fn default_response_template() -> String {
    "{{ json(steps.query.data) }}".to_string()
}

/// Append one synthetic workflow per legacy query entry, then clear the
/// legacy section so it is never re-lowered on reload.
pub fn lower_query_config(cfg: &mut super::RawConfig) {
    for q in std::mem::take(&mut cfg.queries) {
        cfg.workflows.push(lower_one(q));
    }
}

fn lower_one(q: LegacyQuery) -> RawWorkflow {
    RawWorkflow {
        name: q.name,
        triggers: vec![RawTrigger::Http(HttpTrigger {
            method: "GET".to_string(),
            path: q.path,
            parameters: q
                .params
                .into_iter()
                .map(|p| Parameter {
                    name: p.name,
                    kind: p.kind,
                    required: p.required,
                    default: None,
                })
                .collect(),
            cache: None,
            rate_limit_refs: vec![],
        })],
        steps: vec![
            RawStep::Query {
                name: "query".to_string(),
                database: q.database,
                sql: q.sql,
                cache: None,
                timeout_sec: None,
                when: default_when(),
                continue_on_error: false,
            },
            RawStep::Response {
                name: "response".to_string(),
                body: q.response,
                status: 200,
                content_type: "application/json".to_string(),
                headers: Default::default(),
                when: default_when(),
                continue_on_error: false,
            },
        ],
    }
}

fn default_when() -> String {
    "true".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawConfig;

    #[test]
    fn test_lower_legacy_query_to_workflow() {
        let yaml = r#"
queries:
  - name: ping
    path: /api/ping
    database: main
    sql: "SELECT 1 AS n"
workflows: []
"#;
        let cfg: RawConfig = serde_yaml::from_str(yaml).unwrap();
        let mut cfg = cfg;
        lower_query_config(&mut cfg);
        assert!(cfg.queries.is_empty());
        assert_eq!(cfg.workflows.len(), 1);
        assert_eq!(cfg.workflows[0].name, "ping");
        assert_eq!(cfg.workflows[0].steps.len(), 2);
    }
}
