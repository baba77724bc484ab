use minijinja::value::Value as JValue;
use minijinja::{Environment, Error, ErrorKind};

pub fn register(env: &mut Environment<'static>) {
    env.add_function("int64", int64);
    env.add_function("float", float);
    env.add_function("string", |v: JValue| v.to_string());
    env.add_function("bool", to_bool);
}

fn int64(v: JValue) -> Result<i64, Error> {
    if let Ok(serde_json::Value::Number(n)) = serde_json::to_value(&v) {
        if let Some(i) = n.as_i64() {
            return Ok(i);
        }
        if let Some(f) = n.as_f64() {
            return Ok(f as i64);
        }
    }
    v.to_string()
        .trim()
        .parse::<i64>()
        .map_err(|_| Error::new(ErrorKind::InvalidOperation, format!("cannot convert {v} to int64")))
}

fn float(v: JValue) -> Result<f64, Error> {
    if let Ok(f) = v.to_string().trim().parse::<f64>() {
        return Ok(f);
    }
    Err(Error::new(ErrorKind::InvalidOperation, format!("cannot convert {v:?} to float")))
}

fn to_bool(v: JValue) -> bool {
    match v.to_string().to_lowercase().as_str() {
        "true" | "1" | "yes" => true,
        "false" | "0" | "no" | "" => false,
        _ => !v.is_undefined() && !v.is_none(),
    }
}
