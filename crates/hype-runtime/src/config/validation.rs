//! Configuration validation utilities.

use std::collections::HashMap;

use super::error::{ConfigError, ConfigResult};
use super::schema::{
    DestinationConfig, HypeConfig, LogOutput, PermissionsConfig, RateLimitConfig, RetryConfig,
};

/// Validates the entire configuration.
pub fn validate_config(config: &HypeConfig) -> ConfigResult<()> {
    validate_bot(config)?;
    validate_permissions(&config.permissions)?;

    if config.scheduler.offset().is_none() {
        return Err(ConfigError::validation(format!(
            "UTC offset of {} minutes is out of range",
            config.scheduler.utc_offset_minutes
        )));
    }

    if config.proxy.timeout_ms == 0 {
        return Err(ConfigError::validation("Proxy timeout must be greater than 0"));
    }
    validate_retry_config(&config.proxy.retry)?;
    for (name, destination) in &config.proxy.destinations {
        validate_destination(name, destination)?;
    }

    if config.logging.output == LogOutput::File && config.logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    Ok(())
}

fn validate_bot(config: &HypeConfig) -> ConfigResult<()> {
    let bot = &config.bot;
    if bot.prefix.trim().is_empty() {
        return Err(ConfigError::validation("Command prefix cannot be empty"));
    }
    if bot.dev_prefix.trim().is_empty() {
        return Err(ConfigError::validation("Dev command prefix cannot be empty"));
    }
    if bot.prefix.chars().any(char::is_whitespace) {
        return Err(ConfigError::validation("Command prefix cannot contain spaces"));
    }
    if config.dispatch.handler_timeout_secs == 0 {
        return Err(ConfigError::validation(
            "Handler timeout must be greater than 0",
        ));
    }
    Ok(())
}

/// Rejects users listed under more than one role.
fn validate_permissions(permissions: &PermissionsConfig) -> ConfigResult<()> {
    let mut seen: HashMap<&str, &'static str> = HashMap::new();
    let groups: [(&'static str, &Vec<String>); 3] = [
        ("owner", &permissions.owners),
        ("admin", &permissions.admins),
        ("trusted", &permissions.trusted),
    ];

    for (role, users) in groups {
        for user in users {
            if user.trim().is_empty() {
                return Err(ConfigError::validation(format!(
                    "Empty user id in permissions.{role}s"
                )));
            }
            if let Some(first) = seen.insert(user.as_str(), role)
                && first != role
            {
                return Err(ConfigError::ConflictingRole {
                    user: user.clone(),
                    first,
                    second: role,
                });
            }
        }
    }
    Ok(())
}

fn validate_retry_config(retry: &RetryConfig) -> ConfigResult<()> {
    if retry.initial_delay_ms == 0 {
        return Err(ConfigError::validation(
            "Initial retry delay must be greater than 0",
        ));
    }

    if retry.max_delay_ms < retry.initial_delay_ms {
        return Err(ConfigError::validation(
            "Max retry delay must be greater than or equal to initial delay",
        ));
    }

    if retry.backoff_multiplier < 1.0 {
        return Err(ConfigError::validation(
            "Backoff multiplier must be at least 1.0",
        ));
    }

    Ok(())
}

fn validate_destination(name: &str, destination: &DestinationConfig) -> ConfigResult<()> {
    validate_url(&destination.base_url)?;

    if destination.timeout_ms == Some(0) {
        return Err(ConfigError::validation(format!(
            "Timeout of destination '{name}' must be greater than 0"
        )));
    }

    match destination.rate_limit {
        RateLimitConfig::TokenBucket {
            capacity,
            refill_every_ms,
        } if capacity == 0 || refill_every_ms == 0 => {
            return Err(ConfigError::validation(format!(
                "Token bucket of destination '{name}' needs a capacity and refill interval"
            )));
        }
        RateLimitConfig::FixedWindow {
            max_requests,
            window_secs,
        } if max_requests == 0 || window_secs == 0 => {
            return Err(ConfigError::validation(format!(
                "Fixed window of destination '{name}' needs a request count and window"
            )));
        }
        _ => {}
    }

    if let Some(retry) = &destination.retry {
        validate_retry_config(retry)?;
    }
    Ok(())
}

fn validate_url(url: &str) -> ConfigResult<()> {
    if url.is_empty() {
        return Err(ConfigError::missing_field("base_url"));
    }

    let valid_schemes = ["http://", "https://"];
    if !valid_schemes.iter().any(|s| url.starts_with(s)) {
        return Err(ConfigError::invalid_url(
            url,
            format!("URL must start with one of: {valid_schemes:?}"),
        ));
    }

    Ok(())
}
