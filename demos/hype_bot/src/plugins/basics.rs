//! Help, ping, echo and reminders.

use std::time::Duration;

use hype::prelude::*;

/// General-purpose commands.
pub struct Basics;

impl Plugin for Basics {
    fn name(&self) -> &str {
        "basics"
    }

    fn register(&self, r: &mut Registrar) -> RegistryResult<()> {
        r.command(
            Command::new("help", help)
                .alias("h")
                .describe("Lists the commands")
                .max_public_lines(4),
        )?
        .command(Command::new("ping", ping).describe("Checks the bot is alive"))?
        .command(
            Command::new("echo", echo)
                .describe("Repeats the text")
                .usage("<text>"),
        )?
        .command(
            Command::new("remind", remind)
                .describe("Reminds you privately after a delay")
                .usage("<seconds> <text>")
                .cooldown(Duration::from_secs(10), CooldownScope::User),
        )?;
        Ok(())
    }
}

const HELP: &str = "\
help             - this list
ping             - pong
echo <text>      - repeat text
remind <s> <txt> - private reminder
coins [user]     - coin balance
give <user> <n>  - give coins
reset <user>     - wipe a balance (owner)
jobs             - scheduled jobs (admin)";

async fn help(_ctx: RequestContext) -> HandlerResult {
    Ok(Reply::text(HELP))
}

async fn ping(_ctx: RequestContext) -> HandlerResult {
    Ok(Reply::text("pong").react("🏓"))
}

async fn echo(ctx: RequestContext) -> HandlerResult<String> {
    if ctx.arg_text().is_empty() {
        return Err(ctx.usage_error("<text>"));
    }
    Ok(ctx.arg_text().to_string())
}

async fn remind(ctx: RequestContext) -> HandlerResult {
    let (Some(seconds), Some(_)) = (ctx.arg(0).and_then(|s| s.parse::<u64>().ok()), ctx.arg(1))
    else {
        return Err(ctx.usage_error("<seconds> <text>"));
    };
    let text = ctx
        .arg_text()
        .split_once(char::is_whitespace)
        .map(|(_, rest)| rest.trim().to_string())
        .unwrap_or_default();
    let to = ctx.invoker();

    ctx.scheduler()
        .schedule_once("reminder", Duration::from_secs(seconds), move |_job: JobContext| {
            let reply = Reply::to(to.clone(), format!("Reminder: {text}"));
            async move { Ok::<_, HandlerError>(reply) }
        })
        .map_err(|e| match e {
            hype::framework::SchedulerError::InvalidTrigger { .. } => {
                HandlerError::user("That delay is too long.")
            }
            e => HandlerError::new(e.to_string()),
        })?;

    Ok(Reply::text(format!("I'll remind you in {seconds}s.")))
}
