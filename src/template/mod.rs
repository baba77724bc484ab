//! Template engine (C1): compile and evaluate `{{ ... }}` templates over an
//! [`ExecutionContext`](crate::value::Value), plus a separate SQL
//! `@name`-placeholder scanner.
//!
//! Built on `minijinja`. One `minijinja::Environment` is built per
//! compiled workflow plan and shared (read-only, no interior mutability
//! needed at eval time) across concurrent invocations.

pub mod functions;
pub mod sql;

use crate::errors::{Result, SqlGateError};
use crate::value::Value;
use minijinja::Environment;

/// Build a function-library-equipped environment. One instance is shared
/// (behind an `Arc`) by every compiled workflow.
pub fn build_environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(minijinja::UndefinedBehavior::Lenient);
    functions::register_all(&mut env);
    env
}

/// Render a template source string against a context. `require(...)`
/// failures surface as [`SqlGateError::MissingKey`].
pub fn render(env: &Environment<'static>, src: &str, ctx: &Value) -> Result<String> {
    let mj_ctx = to_minijinja_value(ctx);
    env.render_str(src, mj_ctx).map_err(|e| classify_error(e))
}

/// Evaluate a template and return its raw value, used by `Set` steps so a
/// rendered `json(...)` call stays structured instead of becoming a plain
/// string. Falls back to a string `Value` when the rendered text isn't
/// valid JSON.
pub fn eval_value(env: &Environment<'static>, src: &str, ctx: &Value) -> Result<Value> {
    let rendered = render(env, src, ctx)?;
    match serde_json::from_str::<serde_json::Value>(&rendered) {
        Ok(json) => Ok(Value::from_json(&json)),
        Err(_) => Ok(Value::String(rendered)),
    }
}

fn classify_error(e: minijinja::Error) -> SqlGateError {
    if e.to_string().contains("MissingKey:") {
        let msg = e.to_string();
        let key = msg.splitn(2, "MissingKey:").nth(1).unwrap_or("").trim().to_string();
        SqlGateError::MissingKey(key)
    } else {
        SqlGateError::TemplateError(e.to_string())
    }
}

/// Convert our tagged `Value` tree into a `minijinja::Value`, round-tripping
/// through `serde_json` rather than leaking `Value`'s own shape into
/// minijinja (which expects `Serialize` types).
pub fn to_minijinja_value(v: &Value) -> minijinja::Value {
    minijinja::Value::from_serialize(v.to_json())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_basic_lookup() {
        let env = build_environment();
        let mut ctx = Value::object();
        let mut trigger = Value::object();
        let mut params = Value::object();
        params.insert("x", Value::from("hello"));
        trigger.insert("params", params);
        ctx.insert("trigger", trigger);

        let out = render(&env, "{{ trigger.params.x }}", &ctx).unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn test_missing_key_is_lenient_by_default() {
        let env = build_environment();
        let ctx = Value::object();
        let out = render(&env, "[{{ trigger.params.missing }}]", &ctx).unwrap();
        assert_eq!(out, "[]");
    }
}
