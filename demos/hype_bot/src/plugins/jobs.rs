//! Admin view of the scheduler.

use hype::framework::JobInfo;
use hype::prelude::*;

pub struct Jobs;

impl Plugin for Jobs {
    fn name(&self) -> &str {
        "jobs"
    }

    fn register(&self, r: &mut Registrar) -> RegistryResult<()> {
        r.command(
            Command::new("jobs", list)
                .describe("Lists scheduled jobs")
                .permission(Role::Admin)
                .max_public_lines(5),
        )?
        .command(
            Command::new("job", toggle)
                .describe("Turns a job on or off")
                .usage("<name> on|off")
                .permission(Role::Admin),
        )?;
        Ok(())
    }
}

fn describe(job: &JobInfo) -> String {
    let next = job
        .next_fire
        .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{} ({}) {:?}, runs {}, failures {}, next {}",
        job.name, job.trigger, job.status, job.runs, job.failures, next
    )
}

async fn list(ctx: RequestContext) -> HandlerResult<String> {
    let mut jobs = ctx.scheduler().jobs();
    if jobs.is_empty() {
        return Ok("No jobs.".to_string());
    }
    jobs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(jobs.iter().map(describe).collect::<Vec<_>>().join("\n"))
}

async fn toggle(ctx: RequestContext) -> HandlerResult<String> {
    let (Some(name), Some(state)) = (ctx.arg(0), ctx.arg(1)) else {
        return Err(ctx.usage_error("<name> on|off"));
    };
    let scheduler = ctx.scheduler();
    let result = match state {
        "on" => scheduler.enable(name),
        "off" => scheduler.disable(name),
        _ => return Err(ctx.usage_error("<name> on|off")),
    };
    let was = result.map_err(|e| HandlerError::user(e.to_string()))?;
    Ok(format!(
        "{name} is now {state} (was {}).",
        if was { "on" } else { "off" }
    ))
}
