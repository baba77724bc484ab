use minijinja::value::Value as JValue;
use minijinja::{Environment, Error, ErrorKind};

pub fn register(env: &mut Environment<'static>) {
    env.add_function("default", default);
    env.add_function("coalesce", coalesce);
    env.add_function("getOr", get_or);
    env.add_function("require", require);
}

fn is_empty_ish(v: &JValue) -> bool {
    v.is_undefined() || v.is_none()
}

fn default(v: JValue, fallback: JValue) -> JValue {
    if is_empty_ish(&v) {
        fallback
    } else {
        v
    }
}

fn coalesce(values: Vec<JValue>) -> JValue {
    values
        .into_iter()
        .find(|v| !is_empty_ish(v))
        .unwrap_or(JValue::from(()))
}

fn get_or(map: JValue, key: String, fallback: JValue) -> JValue {
    match map.get_item(&JValue::from(key)) {
        Ok(v) if !is_empty_ish(&v) => v,
        _ => fallback,
    }
}

/// `require(key, value)` passes `value` through unchanged, or fails the
/// evaluation with a `MissingKey(key)`-classified error when it's the
/// typed-null sentinel produced by a missing lookup. Usage:
/// `{{ require("trigger.params.id", trigger.params.id) }}`.
fn require(key: String, value: JValue) -> Result<JValue, Error> {
    if is_empty_ish(&value) {
        Err(Error::new(ErrorKind::InvalidOperation, format!("MissingKey: {key}")))
    } else {
        Ok(value)
    }
}
