//! Raw (pre-compile) workflow configuration types, deserialized directly
//! from YAML, using plain data-holding config structs rather than a
//! dependency-injection/bean framework.
//!
//! [`compiler`] turns these into a frozen [`compiler::CompiledWorkflow`];
//! [`executor`] drives a compiled plan from a [`crate::http::TriggerEvent`]
//! to an [`executor::ExecutionResult`].

pub mod compiler;
pub mod executor;

use indexmap::IndexMap;
use serde::Deserialize;

pub const RESERVED_PARAM_NAMES: &[&str] = &["_timeout", "_nocache"];

#[derive(Debug, Clone, Deserialize)]
pub struct RawWorkflow {
    pub name: String,
    #[serde(default)]
    pub triggers: Vec<RawTrigger>,
    #[serde(default)]
    pub steps: Vec<RawStep>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RawTrigger {
    Http(HttpTrigger),
    Cron(CronTrigger),
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpTrigger {
    #[serde(default = "default_method")]
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub cache: Option<TriggerCacheConfig>,
    #[serde(default, rename = "rate_limit_refs")]
    pub rate_limit_refs: Vec<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CronTrigger {
    pub schedule: String,
    #[serde(default)]
    pub static_params: IndexMap<String, String>,
    /// Explicit IANA zone for `now/today/yesterday/tomorrow` resolution,
    /// so token resolution never depends on the process locale. Defaults
    /// to `"UTC"`.
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerCacheConfig {
    pub key: String,
    #[serde(default)]
    pub ttl_sec: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<serde_yaml::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ParamType {
    #[serde(rename = "string")]
    String,
    #[serde(rename = "int")]
    Int,
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "bool")]
    Bool,
    #[serde(rename = "datetime")]
    Datetime,
    #[serde(rename = "date")]
    Date,
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "string[]")]
    StringArray,
    #[serde(rename = "int[]")]
    IntArray,
    #[serde(rename = "float[]")]
    FloatArray,
    #[serde(rename = "bool[]")]
    BoolArray,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StepCacheConfig {
    pub key: String,
    #[serde(default = "default_step_cache_ttl")]
    pub ttl_sec: u64,
}

fn default_step_cache_ttl() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: default_max_attempts(),
            backoff_ms: 0,
        }
    }
}

fn default_max_attempts() -> u32 {
    1
}

fn default_when() -> String {
    "true".to_string()
}

fn default_status() -> u16 {
    200
}

fn default_content_type() -> String {
    "application/json".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawStep {
    Query {
        name: String,
        database: String,
        sql: String,
        #[serde(default)]
        cache: Option<StepCacheConfig>,
        #[serde(default)]
        timeout_sec: Option<u64>,
        #[serde(default = "default_when")]
        when: String,
        #[serde(default)]
        continue_on_error: bool,
    },
    #[serde(rename = "http_call")]
    HttpCall {
        name: String,
        method: String,
        url: String,
        #[serde(default)]
        headers: IndexMap<String, String>,
        #[serde(default)]
        body: Option<String>,
        #[serde(default)]
        retry: RetryPolicy,
        #[serde(default)]
        timeout_sec: Option<u64>,
        #[serde(default = "default_when")]
        when: String,
        #[serde(default)]
        continue_on_error: bool,
    },
    Block {
        name: String,
        source: String,
        alias: String,
        #[serde(default)]
        steps: Vec<RawStep>,
        #[serde(default = "default_when")]
        when: String,
        #[serde(default)]
        continue_on_error: bool,
    },
    Response {
        name: String,
        body: String,
        #[serde(default = "default_status")]
        status: u16,
        #[serde(default = "default_content_type")]
        content_type: String,
        #[serde(default)]
        headers: IndexMap<String, String>,
        #[serde(default = "default_when")]
        when: String,
        #[serde(default)]
        continue_on_error: bool,
    },
    Set {
        name: String,
        template: String,
        #[serde(default = "default_when")]
        when: String,
        #[serde(default)]
        continue_on_error: bool,
    },
}

impl RawStep {
    pub fn name(&self) -> &str {
        match self {
            RawStep::Query { name, .. }
            | RawStep::HttpCall { name, .. }
            | RawStep::Block { name, .. }
            | RawStep::Response { name, .. }
            | RawStep::Set { name, .. } => name,
        }
    }

    pub fn when(&self) -> &str {
        match self {
            RawStep::Query { when, .. }
            | RawStep::HttpCall { when, .. }
            | RawStep::Block { when, .. }
            | RawStep::Response { when, .. }
            | RawStep::Set { when, .. } => when,
        }
    }

    pub fn continue_on_error(&self) -> bool {
        match self {
            RawStep::Query { continue_on_error, .. }
            | RawStep::HttpCall { continue_on_error, .. }
            | RawStep::Block { continue_on_error, .. }
            | RawStep::Response { continue_on_error, .. }
            | RawStep::Set { continue_on_error, .. } => *continue_on_error,
        }
    }
}
