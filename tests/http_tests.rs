#[path = "http/routing.rs"]
mod routing;
