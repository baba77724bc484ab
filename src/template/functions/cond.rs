use minijinja::value::Value as JValue;
use minijinja::Environment;

pub fn register(env: &mut Environment<'static>) {
    env.add_function("ternary", |cond: bool, yes: JValue, no: JValue| if cond { yes } else { no });
    env.add_function("when", |cond: bool, yes: JValue| if cond { yes } else { JValue::from(()) });
}
