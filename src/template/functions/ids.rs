use minijinja::Environment;
use uuid::Uuid;

pub fn register(env: &mut Environment<'static>) {
    env.add_function("uuid", || Uuid::new_v4().to_string());
    env.add_function("uuidShort", || {
        Uuid::new_v4().as_simple().to_string()[..12].to_string()
    });
    env.add_function("shortID", || nanoid::nanoid!(8));
    env.add_function("nanoid", |size: Option<usize>| nanoid::nanoid!(size.unwrap_or(21)));
}
