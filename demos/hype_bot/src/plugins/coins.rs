//! A small per-user coin economy kept in the store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use hype::core::StoreResult;
use hype::prelude::*;

const SUBKEY: &str = "coins";

/// Coins granted to every holder at midnight.
const DAILY_ALLOWANCE: i64 = 10;

/// Balances, transfers and a daily allowance.
pub struct Coins;

impl Plugin for Coins {
    fn name(&self) -> &str {
        "coins"
    }

    fn register(&self, r: &mut Registrar) -> RegistryResult<()> {
        r.command(
            Command::new("coins", balance)
                .alias("balance")
                .describe("Shows a coin balance")
                .usage("[user]"),
        )?
        .command(
            Command::new("give", give)
                .describe("Gives coins to another user")
                .usage("<user> <amount>")
                .cooldown(Duration::from_secs(5), CooldownScope::User),
        )?
        .command(
            Command::new("reset", reset)
                .describe("Wipes a balance")
                .usage("<user>")
                .permission(Role::Owner)
                .cooldown(Duration::from_secs(120), CooldownScope::Global),
        )?;

        if let Some(midnight) = Trigger::daily(0, 0) {
            r.job(ScheduledJob::new("coins-allowance", midnight, allowance))?;
        }
        Ok(())
    }
}

fn holder(ctx: &RequestContext, user: &str) -> String {
    format!("{}:{user}", ctx.room().channel)
}

async fn balance(ctx: RequestContext) -> HandlerResult<String> {
    let user = ctx.arg(0).unwrap_or(&ctx.user().id).to_string();
    let raw = ctx.store().get_value(&holder(&ctx, &user), SUBKEY).await?;
    Ok(format!("{user}: {} coins", coins(raw.as_deref())))
}

async fn give(ctx: RequestContext) -> HandlerResult<String> {
    let (Some(to), Some(amount)) = (ctx.arg(0), ctx.arg(1).and_then(|a| a.parse::<i64>().ok()))
    else {
        return Err(ctx.usage_error("<user> <amount>"));
    };
    if amount <= 0 {
        return Err(HandlerError::user("Amount must be positive."));
    }
    if to == ctx.user().id {
        return Err(HandlerError::user("You can't pay yourself."));
    }

    let from_key = holder(&ctx, &ctx.user().id);
    let to_key = holder(&ctx, to);
    let paid = AtomicBool::new(false);
    let transfer = |values: &mut [Option<String>]| -> StoreResult<()> {
        let [sender, recipient] = values else {
            return Ok(());
        };
        let have = coins(sender.as_deref());
        if have < amount {
            paid.store(false, Ordering::Release);
            return Ok(());
        }
        *sender = Some((have - amount).to_string());
        *recipient = Some(coins(recipient.as_deref()).saturating_add(amount).to_string());
        paid.store(true, Ordering::Release);
        Ok(())
    };
    let stored = ctx
        .store()
        .transact(&[(from_key.as_str(), SUBKEY), (to_key.as_str(), SUBKEY)], &transfer)
        .await?;
    if !paid.load(Ordering::Acquire) {
        return Err(HandlerError::user("You don't have enough coins."));
    }

    let total = coins(stored.get(1).and_then(Option::as_deref));
    Ok(format!("Gave {amount} coins to {to}; they now have {total}."))
}

fn coins(raw: Option<&str>) -> i64 {
    raw.and_then(|v| v.parse::<i64>().ok()).unwrap_or(0)
}

async fn reset(ctx: RequestContext) -> HandlerResult<String> {
    let Some(user) = ctx.arg(0) else {
        return Err(ctx.usage_error("<user>"));
    };
    ctx.store().remove_value(&holder(&ctx, user), SUBKEY).await?;
    Ok(format!("Reset {user}'s coins."))
}

async fn allowance(job: JobContext) -> HandlerResult {
    let holders = job.store().subkey_entries(SUBKEY).await?;
    for (key, _) in &holders {
        job.store().increment(key, SUBKEY, DAILY_ALLOWANCE).await?;
    }
    info!(holders = holders.len(), "Paid daily allowance");
    Ok(Reply::none())
}
