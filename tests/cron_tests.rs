#[path = "cron/fire.rs"]
mod fire;
