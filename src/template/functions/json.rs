use minijinja::value::Value as JValue;
use minijinja::{Environment, Error, ErrorKind};

pub fn register(env: &mut Environment<'static>) {
    env.add_function("json", json);
    env.add_function("jsonIndent", json_indent);
}

fn json(v: JValue) -> Result<String, Error> {
    serde_json::to_string(&v).map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
}

fn json_indent(v: JValue) -> Result<String, Error> {
    serde_json::to_string_pretty(&v).map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
}
