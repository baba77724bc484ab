//! Template function library, grouped by capability. Each submodule
//! exposes a `register(env)` call, composed here exactly once per
//! environment build: one `add_function` call per capability.

pub mod cmp;
pub mod collections;
pub mod cond;
pub mod convert;
pub mod defaults;
pub mod encode;
pub mod format;
pub mod ids;
pub mod json;
pub mod math;
pub mod strings;
pub mod time;
pub mod validate;

use minijinja::Environment;

pub fn register_all(env: &mut Environment<'static>) {
    json::register(env);
    strings::register(env);
    defaults::register(env);
    math::register(env);
    convert::register(env);
    format::register(env);
    ids::register(env);
    validate::register(env);
    encode::register(env);
    time::register(env);
    collections::register(env);
    cond::register(env);
    cmp::register(env);
}
