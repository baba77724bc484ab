//! Cron Trigger (C8): register one `tokio_cron_scheduler` job per compiled
//! cron trigger, firing a synthetic [`TriggerEvent`] into the shared
//! [`Executor`] on each tick.
//!
//! Job registration uses `Job::new_async(&schedule, move |uuid, mut l|
//! Box::pin(async move {...}))`, one job per compiled cron trigger.
//! `now/today/yesterday/tomorrow` token resolution is timezone-aware,
//! driven by each trigger's configured `time_zone` rather than the
//! process-local clock.

use crate::errors::Result;
use crate::value::Value;
use crate::workflow::compiler::{CompiledCronTrigger, CompiledTrigger, CompiledWorkflow};
use crate::workflow::executor::{Executor, TriggerEvent};
use chrono::Utc;
use indexmap::IndexMap;
use minijinja::Environment;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};

/// Per-workflow concurrency cap for overlapping fires (default 1).
const DEFAULT_CONCURRENCY_CAP: u32 = 1;

/// Build a scheduler and register every cron trigger across every compiled
/// workflow. Does not call `.start()`; the caller controls lifecycle
/// alongside the HTTP server's own startup/shutdown.
pub async fn build_scheduler(executor: Arc<Executor>, plans: Arc<Vec<CompiledWorkflow>>) -> Result<JobScheduler> {
    let mut scheduler = JobScheduler::new().await?;
    for (index, plan) in plans.iter().enumerate() {
        for trigger in &plan.triggers {
            if let CompiledTrigger::Cron(cron) = trigger {
                register_one(&mut scheduler, executor.clone(), plans.clone(), index, cron.clone()).await?;
            }
        }
    }
    Ok(scheduler)
}

async fn register_one(
    scheduler: &mut JobScheduler,
    executor: Arc<Executor>,
    plans: Arc<Vec<CompiledWorkflow>>,
    workflow_index: usize,
    cron: CompiledCronTrigger,
) -> Result<()> {
    let in_flight = Arc::new(AtomicU32::new(0));
    let workflow_name = plans[workflow_index].name.clone();
    let env = executor.env.clone();
    let job_schedule = prefix_seconds(&cron.schedule);
    info!(workflow = %workflow_name, schedule = %cron.schedule, "registering cron trigger");

    let job = Job::new_async(job_schedule.as_str(), move |_uuid, _scheduler_handle| {
        let executor = executor.clone();
        let plans = plans.clone();
        let cron = cron.clone();
        let in_flight = in_flight.clone();
        let workflow_name = workflow_name.clone();
        let env = env.clone();
        Box::pin(async move {
            if in_flight.load(Ordering::SeqCst) >= DEFAULT_CONCURRENCY_CAP {
                warn!(workflow = %workflow_name, "skipping cron fire: concurrency cap reached");
                return;
            }
            in_flight.fetch_add(1, Ordering::SeqCst);
            let event = build_event(&env, &cron);
            let plan = &plans[workflow_index];
            let result = executor.execute(plan, event).await;
            info!(
                workflow = %workflow_name,
                status = result.status,
                duration_ms = result.duration_ms,
                "cron fire completed"
            );
            in_flight.fetch_sub(1, Ordering::SeqCst);
        })
    })?;
    scheduler.add(job).await?;
    Ok(())
}

/// `tokio_cron_scheduler` (via the `cron` crate) expects a leading seconds
/// field; configured schedules are standard 5-field cron, so a literal `0`
/// seconds field is prefixed before handing off.
fn prefix_seconds(schedule: &str) -> String {
    format!("0 {schedule}")
}

fn build_event(env: &Environment<'static>, cron: &CompiledCronTrigger) -> TriggerEvent {
    let tz = chrono_tz::Tz::from_str(&cron.time_zone).unwrap_or(chrono_tz::UTC);
    let now = Utc::now().with_timezone(&tz);

    let mut static_params = IndexMap::new();
    for (k, v) in &cron.static_params {
        let rendered = crate::template::render(env, v, &Value::object()).unwrap_or_else(|_| v.to_string());
        static_params.insert(k.clone(), resolve_token(&rendered, now));
    }

    TriggerEvent {
        is_cron: true,
        method: String::new(),
        path: String::new(),
        path_params: IndexMap::new(),
        query_params: IndexMap::new(),
        form_params: IndexMap::new(),
        json_body: None,
        headers: IndexMap::new(),
        client_ip: "cron".to_string(),
        request_id: format!("cron-{}", uuid::Uuid::new_v4().simple()),
        static_params,
        nocache: true,
        timeout_override_sec: None,
    }
}

fn resolve_token(raw: &str, now: chrono::DateTime<chrono_tz::Tz>) -> String {
    match raw {
        "now" => now.to_rfc3339(),
        "today" => now.format("%Y-%m-%d").to_string(),
        "yesterday" => (now - chrono::Duration::days(1)).format("%Y-%m-%d").to_string(),
        "tomorrow" => (now + chrono::Duration::days(1)).format("%Y-%m-%d").to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_seconds() {
        assert_eq!(prefix_seconds("*/5 * * * *"), "0 */5 * * * *");
    }

    #[test]
    fn test_resolve_token_literal_passthrough() {
        let now = Utc::now().with_timezone(&chrono_tz::UTC);
        assert_eq!(resolve_token("literal", now), "literal");
    }

    #[test]
    fn test_resolve_token_today_format() {
        let now = Utc::now().with_timezone(&chrono_tz::UTC);
        let resolved = resolve_token("today", now);
        assert_eq!(resolved.len(), 10);
    }
}
