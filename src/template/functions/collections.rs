//! Array/map helpers. Implemented over `serde_json::Value` (round-tripped
//! from `minijinja::Value` via `Serialize`) rather than minijinja's own
//! iteration API, since the shapes we need (object key/value access,
//! membership) are simplest to reason about as plain JSON.

use minijinja::value::Value as JValue;
use minijinja::Environment;
use serde_json::Value as JsonValue;

pub fn register(env: &mut Environment<'static>) {
    env.add_function("first", |v: JValue| -> JValue { to_mj(as_array(&v).into_iter().next().unwrap_or(JsonValue::Null)) });
    env.add_function("last", |v: JValue| -> JValue {
        to_mj(as_array(&v).into_iter().last().unwrap_or(JsonValue::Null))
    });
    env.add_function("pluck", |items: JValue, key: String| -> JValue {
        let plucked: Vec<JsonValue> = as_array(&items)
            .into_iter()
            .filter_map(|item| item.get(&key).cloned())
            .collect();
        to_mj(JsonValue::Array(plucked))
    });
    env.add_function("pick", |obj: JValue, keys: Vec<String>| -> JValue {
        let map = as_object(&obj);
        let mut out = serde_json::Map::new();
        for k in keys {
            if let Some(v) = map.get(&k) {
                out.insert(k, v.clone());
            }
        }
        to_mj(JsonValue::Object(out))
    });
    env.add_function("omit", |obj: JValue, keys: Vec<String>| -> JValue {
        let map = as_object(&obj);
        let mut out = serde_json::Map::new();
        for (k, v) in map {
            if !keys.contains(&k) {
                out.insert(k, v);
            }
        }
        to_mj(JsonValue::Object(out))
    });
    env.add_function("merge", |a: JValue, b: JValue| -> JValue {
        let mut out = as_object(&a);
        out.extend(as_object(&b));
        to_mj(JsonValue::Object(out.into_iter().collect()))
    });
    env.add_function("dig", dig);
    env.add_function("keys", |v: JValue| -> Vec<String> { as_object(&v).keys().cloned().collect() });
    env.add_function("values", |v: JValue| -> Vec<JValue> {
        as_object(&v).values().cloned().map(to_mj).collect()
    });
    env.add_function("isEmpty", |v: JValue| -> bool {
        match serde_json::to_value(&v).unwrap_or(JsonValue::Null) {
            JsonValue::Null => true,
            JsonValue::String(s) => s.is_empty(),
            JsonValue::Array(a) => a.is_empty(),
            JsonValue::Object(o) => o.is_empty(),
            _ => false,
        }
    });
    env.add_function("has", |v: JValue, key: String| -> bool { as_object(&v).contains_key(&key) });
}

fn as_array(v: &JValue) -> Vec<JsonValue> {
    match serde_json::to_value(v).unwrap_or(JsonValue::Null) {
        JsonValue::Array(a) => a,
        other => vec![other],
    }
}

fn as_object(v: &JValue) -> serde_json::Map<String, JsonValue> {
    match serde_json::to_value(v).unwrap_or(JsonValue::Null) {
        JsonValue::Object(o) => o,
        _ => serde_json::Map::new(),
    }
}

fn to_mj(v: JsonValue) -> JValue {
    JValue::from_serialize(v)
}

fn dig(obj: JValue, path: String) -> JValue {
    let mut cur = serde_json::to_value(&obj).unwrap_or(JsonValue::Null);
    for seg in path.split('.') {
        cur = match cur {
            JsonValue::Object(mut o) => o.remove(seg).unwrap_or(JsonValue::Null),
            JsonValue::Array(a) => seg
                .parse::<usize>()
                .ok()
                .and_then(|i| a.get(i).cloned())
                .unwrap_or(JsonValue::Null),
            _ => JsonValue::Null,
        };
    }
    to_mj(cur)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dig_nested_path() {
        let obj = to_mj(serde_json::json!({"a": {"b": {"c": 7}}}));
        let got = dig(obj, "a.b.c".to_string());
        assert_eq!(serde_json::to_value(&got).unwrap(), serde_json::json!(7));
    }

    #[test]
    fn test_is_empty_cases() {
        assert!(as_object(&to_mj(serde_json::json!({}))).is_empty());
    }
}
