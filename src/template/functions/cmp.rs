use minijinja::value::Value as JValue;
use minijinja::Environment;

pub fn register(env: &mut Environment<'static>) {
    env.add_function("eq", |a: JValue, b: JValue| a == b);
    env.add_function("ne", |a: JValue, b: JValue| a != b);
    env.add_function("lt", |a: f64, b: f64| a < b);
    env.add_function("le", |a: f64, b: f64| a <= b);
    env.add_function("gt", |a: f64, b: f64| a > b);
    env.add_function("ge", |a: f64, b: f64| a >= b);
    env.add_function("and", |a: bool, b: bool| a && b);
    env.add_function("or", |a: bool, b: bool| a || b);
    env.add_function("not", |a: bool| !a);
}
