//! Workflow Compiler (C5): validate + freeze a `RawWorkflow` into an
//! executable `CompiledWorkflow`, failing atomically on any unresolved
//! template, unknown DB, or write-SQL on a read-only DB — the same
//! "validate eagerly, fail the whole load" shape also used by config
//! loading: a bad workflow should never start a partially-working server.

use super::{CronTrigger, HttpTrigger, Parameter, RawStep, RawTrigger, RawWorkflow, RESERVED_PARAM_NAMES};
use crate::db::is_write_sql;
use crate::errors::{Result, SqlGateError};
use crate::ratelimit::PoolConfig;
use indexmap::IndexMap;
use minijinja::Environment;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

pub struct CompileContext<'a> {
    pub db_names: &'a HashSet<String>,
    pub db_readonly: &'a IndexMap<String, bool>,
    pub rate_limit_pools: &'a IndexMap<String, PoolConfig>,
    pub env: &'a Environment<'static>,
}

#[derive(Debug, Clone)]
pub struct CompiledWorkflow {
    pub name: String,
    pub triggers: Vec<CompiledTrigger>,
    pub steps: Vec<CompiledStep>,
}

#[derive(Debug, Clone)]
pub enum CompiledTrigger {
    Http(CompiledHttpTrigger),
    Cron(CompiledCronTrigger),
}

#[derive(Debug, Clone)]
pub struct CompiledHttpTrigger {
    pub method: String,
    pub path: String,
    pub path_param_names: Vec<String>,
    pub parameters: Vec<Parameter>,
    pub cache: Option<CompiledTriggerCache>,
    pub rate_limit_refs: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CompiledTriggerCache {
    pub key_template: Arc<str>,
    pub ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct CompiledCronTrigger {
    pub schedule: String,
    pub static_params: IndexMap<String, Arc<str>>,
    pub time_zone: String,
}

#[derive(Debug, Clone)]
pub enum CompiledStep {
    Query {
        name: String,
        database: String,
        sql: Arc<str>,
        cache: Option<CompiledStepCache>,
        timeout_sec: Option<u64>,
        when: Arc<str>,
        continue_on_error: bool,
    },
    HttpCall {
        name: String,
        method: String,
        url: Arc<str>,
        headers: IndexMap<String, Arc<str>>,
        body: Option<Arc<str>>,
        retry: super::RetryPolicy,
        timeout_sec: Option<u64>,
        when: Arc<str>,
        continue_on_error: bool,
    },
    Block {
        name: String,
        source: Arc<str>,
        alias: String,
        steps: Vec<CompiledStep>,
        when: Arc<str>,
        continue_on_error: bool,
    },
    Response {
        name: String,
        body: Arc<str>,
        status: u16,
        content_type: String,
        headers: IndexMap<String, Arc<str>>,
        when: Arc<str>,
        continue_on_error: bool,
    },
    Set {
        name: String,
        template: Arc<str>,
        when: Arc<str>,
        continue_on_error: bool,
    },
}

impl CompiledStep {
    pub fn name(&self) -> &str {
        match self {
            CompiledStep::Query { name, .. }
            | CompiledStep::HttpCall { name, .. }
            | CompiledStep::Block { name, .. }
            | CompiledStep::Response { name, .. }
            | CompiledStep::Set { name, .. } => name,
        }
    }
}

/// Compile every workflow, then cross-check global uniqueness invariants
/// (unique workflow name, unique (method, path) pair) that a single-
/// workflow compile pass cannot see.
pub fn compile_all(raw: Vec<RawWorkflow>, ctx: &CompileContext) -> Result<Vec<CompiledWorkflow>> {
    let mut compiled = Vec::with_capacity(raw.len());
    let mut seen_names = HashSet::new();
    let mut seen_routes = HashSet::new();

    for workflow in raw {
        if !seen_names.insert(workflow.name.clone()) {
            return Err(SqlGateError::ConfigError(format!("duplicate workflow name: {}", workflow.name)));
        }
        let plan = compile_workflow(workflow, ctx)?;
        for trigger in &plan.triggers {
            if let CompiledTrigger::Http(h) = trigger {
                let route = (h.method.to_uppercase(), h.path.clone());
                if !seen_routes.insert(route) {
                    return Err(SqlGateError::ConfigError(format!(
                        "duplicate route: {} {}",
                        h.method, h.path
                    )));
                }
            }
        }
        compiled.push(plan);
    }
    Ok(compiled)
}

fn compile_workflow(raw: RawWorkflow, ctx: &CompileContext) -> Result<CompiledWorkflow> {
    let triggers = raw
        .triggers
        .into_iter()
        .map(|t| compile_trigger(t, ctx))
        .collect::<Result<Vec<_>>>()?;

    let mut seen_steps: HashSet<String> = HashSet::new();
    let steps = raw
        .steps
        .into_iter()
        .map(|s| compile_step(s, ctx, &mut seen_steps))
        .collect::<Result<Vec<_>>>()?;

    Ok(CompiledWorkflow { name: raw.name, triggers, steps })
}

fn compile_trigger(raw: RawTrigger, ctx: &CompileContext) -> Result<CompiledTrigger> {
    match raw {
        RawTrigger::Http(http) => Ok(CompiledTrigger::Http(compile_http_trigger(http, ctx)?)),
        RawTrigger::Cron(cron) => Ok(CompiledTrigger::Cron(compile_cron_trigger(cron, ctx)?)),
    }
}

fn compile_http_trigger(http: HttpTrigger, ctx: &CompileContext) -> Result<CompiledHttpTrigger> {
    for param in &http.parameters {
        if RESERVED_PARAM_NAMES.contains(&param.name.as_str()) {
            return Err(SqlGateError::ConfigError(format!(
                "parameter name {:?} is reserved and may not be declared",
                param.name
            )));
        }
    }

    let path_param_names = extract_path_captures(&http.path);
    let param_names: HashSet<&str> = http.parameters.iter().map(|p| p.name.as_str()).collect();
    for captured in &path_param_names {
        let declared = http.parameters.iter().find(|p| &p.name == captured);
        match declared {
            Some(p) if p.required => {}
            Some(_) => {
                return Err(SqlGateError::ConfigError(format!(
                    "path capture {{{captured}}} must be declared `required: true`"
                )))
            }
            None => {
                return Err(SqlGateError::ConfigError(format!(
                    "path capture {{{captured}}} has no matching declared parameter"
                )))
            }
        }
    }
    let _ = param_names;

    for pool in &http.rate_limit_refs {
        if !ctx.rate_limit_pools.contains_key(pool) {
            return Err(SqlGateError::ConfigError(format!("unknown rate_limit pool: {pool}")));
        }
    }

    let cache = http
        .cache
        .map(|c| -> Result<CompiledTriggerCache> {
            check_template(ctx.env, &c.key)?;
            Ok(CompiledTriggerCache {
                key_template: Arc::from(c.key.as_str()),
                ttl: Duration::from_secs(c.ttl_sec.unwrap_or(60)),
            })
        })
        .transpose()?;

    Ok(CompiledHttpTrigger {
        method: http.method.to_uppercase(),
        path: http.path,
        path_param_names,
        parameters: http.parameters,
        cache,
        rate_limit_refs: http.rate_limit_refs,
    })
}

fn compile_cron_trigger(cron: CronTrigger, ctx: &CompileContext) -> Result<CompiledCronTrigger> {
    if cron.schedule.split_whitespace().count() != 5 {
        return Err(SqlGateError::CronParseError(format!(
            "{}: expected a standard 5-field cron expression",
            cron.schedule
        )));
    }

    let mut static_params = IndexMap::new();
    for (k, v) in cron.static_params {
        check_template(ctx.env, &v)?;
        static_params.insert(k, Arc::from(v.as_str()));
    }

    Ok(CompiledCronTrigger { schedule: cron.schedule, static_params, time_zone: cron.time_zone })
}

fn extract_path_captures(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = path;
    while let Some(start) = rest.find('{') {
        if let Some(end) = rest[start..].find('}') {
            out.push(rest[start + 1..start + end].to_string());
            rest = &rest[start + end + 1..];
        } else {
            break;
        }
    }
    out
}

fn compile_step(raw: RawStep, ctx: &CompileContext, seen_steps: &mut HashSet<String>) -> Result<CompiledStep> {
    check_forward_references(&raw, seen_steps)?;

    let compiled = match raw {
        RawStep::Query { name, database, sql, cache, timeout_sec, when, continue_on_error } => {
            if !ctx.db_names.contains(&database) {
                return Err(SqlGateError::UnknownDb(database));
            }
            if *ctx.db_readonly.get(&database).unwrap_or(&true) && is_write_sql(&sql) {
                return Err(SqlGateError::ConfigError(format!(
                    "step {name:?}: write SQL against read-only database {database:?}"
                )));
            }
            check_template(ctx.env, &when)?;
            let cache = cache
                .map(|c| -> Result<CompiledStepCache> {
                    check_template(ctx.env, &c.key)?;
                    Ok(CompiledStepCache { key_template: Arc::from(c.key.as_str()), ttl: Duration::from_secs(c.ttl_sec) })
                })
                .transpose()?;
            CompiledStep::Query {
                name,
                database,
                sql: Arc::from(sql.as_str()),
                cache,
                timeout_sec,
                when: Arc::from(when.as_str()),
                continue_on_error,
            }
        }
        RawStep::HttpCall { name, method, url, headers, body, retry, timeout_sec, when, continue_on_error } => {
            check_template(ctx.env, &url)?;
            check_template(ctx.env, &when)?;
            let mut compiled_headers = IndexMap::new();
            for (k, v) in headers {
                check_template(ctx.env, &v)?;
                compiled_headers.insert(k, Arc::from(v.as_str()));
            }
            let body = body
                .map(|b| -> Result<Arc<str>> {
                    check_template(ctx.env, &b)?;
                    Ok(Arc::from(b.as_str()))
                })
                .transpose()?;
            CompiledStep::HttpCall {
                name,
                method,
                url: Arc::from(url.as_str()),
                headers: compiled_headers,
                body,
                retry,
                timeout_sec,
                when: Arc::from(when.as_str()),
                continue_on_error,
            }
        }
        RawStep::Block { name, source, alias, steps, when, continue_on_error } => {
            check_template(ctx.env, &source)?;
            check_template(ctx.env, &when)?;
            let mut block_seen = seen_steps.clone();
            let compiled_steps = steps
                .into_iter()
                .map(|s| compile_step(s, ctx, &mut block_seen))
                .collect::<Result<Vec<_>>>()?;
            CompiledStep::Block {
                name,
                source: Arc::from(source.as_str()),
                alias,
                steps: compiled_steps,
                when: Arc::from(when.as_str()),
                continue_on_error,
            }
        }
        RawStep::Response { name, body, status, content_type, headers, when, continue_on_error } => {
            check_template(ctx.env, &body)?;
            check_template(ctx.env, &when)?;
            let mut compiled_headers = IndexMap::new();
            for (k, v) in headers {
                check_template(ctx.env, &v)?;
                compiled_headers.insert(k, Arc::from(v.as_str()));
            }
            CompiledStep::Response {
                name,
                body: Arc::from(body.as_str()),
                status,
                content_type,
                headers: compiled_headers,
                when: Arc::from(when.as_str()),
                continue_on_error,
            }
        }
        RawStep::Set { name, template, when, continue_on_error } => {
            check_template(ctx.env, &template)?;
            check_template(ctx.env, &when)?;
            CompiledStep::Set {
                name,
                template: Arc::from(template.as_str()),
                when: Arc::from(when.as_str()),
                continue_on_error,
            }
        }
    };

    seen_steps.insert(compiled.name().to_string());
    Ok(compiled)
}

#[derive(Debug, Clone)]
pub struct CompiledStepCache {
    pub key_template: Arc<str>,
    pub ttl: Duration,
}

fn check_template(env: &Environment<'static>, src: &str) -> Result<()> {
    env.template_from_str(src)
        .map(|_| ())
        .map_err(|e| SqlGateError::TemplateError(format!("{src:?}: {e}")))
}

/// Forward-reference detection: scan for
/// `steps.<name>` reads and reject any name not already in the prior-step
/// set, since steps are a linear list with optional block nesting, not an
/// arbitrary DAG.
fn check_forward_references(raw: &RawStep, seen_steps: &HashSet<String>) -> Result<()> {
    for template_src in step_template_sources(raw) {
        for referenced in extract_steps_refs(template_src) {
            if !seen_steps.contains(&referenced) {
                return Err(SqlGateError::ConfigError(format!(
                    "step {:?} references steps.{referenced} before it runs",
                    raw.name()
                )));
            }
        }
    }
    Ok(())
}

fn step_template_sources(raw: &RawStep) -> Vec<&str> {
    match raw {
        RawStep::Query { sql, when, .. } => vec![sql.as_str(), when.as_str()],
        RawStep::HttpCall { url, body, when, headers, .. } => {
            let mut v = vec![url.as_str(), when.as_str()];
            if let Some(b) = body {
                v.push(b.as_str());
            }
            v.extend(headers.values().map(|s| s.as_str()));
            v
        }
        RawStep::Block { source, when, .. } => vec![source.as_str(), when.as_str()],
        RawStep::Response { body, when, headers, .. } => {
            let mut v = vec![body.as_str(), when.as_str()];
            v.extend(headers.values().map(|s| s.as_str()));
            v
        }
        RawStep::Set { template, when, .. } => vec![template.as_str(), when.as_str()],
    }
}

fn extract_steps_refs(src: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = src;
    while let Some(pos) = rest.find("steps.") {
        let after = &rest[pos + 6..];
        let end = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        if end > 0 {
            out.push(after[..end].to_string());
        }
        rest = &after[end.max(1)..];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_path_captures() {
        assert_eq!(extract_path_captures("/api/items/{id}/{sub}"), vec!["id".to_string(), "sub".to_string()]);
        assert!(extract_path_captures("/api/ping").is_empty());
    }

    #[test]
    fn test_extract_steps_refs() {
        let refs = extract_steps_refs("{{ steps.q.data }} and {{ steps.other.count }}");
        assert_eq!(refs, vec!["q".to_string(), "other".to_string()]);
    }
}
