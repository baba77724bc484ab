#[path = "workflow/basic_query.rs"]
mod basic_query;

#[path = "workflow/cache_hit.rs"]
mod cache_hit;

#[path = "workflow/rate_limit.rs"]
mod rate_limit;
