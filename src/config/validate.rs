// src/config/validate.rs

use std::net::SocketAddr;
use std::time::Duration;

use crate::config::model::{ActionConfig, ConfigFile, RawConfigFile};
use crate::errors::{ActionLoopError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ActionLoopError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let listen = raw.proxy.listen.as_deref().map(parse_listen).transpose()?;

        let action = raw.action;
        if let Some(command) = &action.command {
            if command.trim().is_empty() {
                return Err(ActionLoopError::ConfigError(
                    "[action].command must not be empty".to_string(),
                ));
            }
        }
        for name in action.env.keys() {
            validate_env_name(name)?;
        }
        let handshake_timeout = action
            .handshake_timeout
            .as_deref()
            .map(|s| {
                parse_duration(s).map_err(|e| {
                    ActionLoopError::ConfigError(format!("[action].handshake_timeout: {e}"))
                })
            })
            .transpose()?;

        Ok(ConfigFile::new_unchecked(
            listen,
            ActionConfig {
                command: action.command,
                args: action.args,
                cwd: action.cwd,
                env: action.env,
                capture_output: action.capture_output,
                handshake_timeout,
            },
        ))
    }
}

pub fn parse_listen(s: &str) -> Result<SocketAddr> {
    s.trim().parse().map_err(|e| {
        ActionLoopError::ConfigError(format!("invalid listen address '{s}': {e}"))
    })
}

fn validate_env_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['=', '\0']) {
        return Err(ActionLoopError::ConfigError(format!(
            "invalid environment variable name '{name}' in [action].env"
        )));
    }
    Ok(())
}

/// Parse durations like `"500ms"`, `"3s"`, `"2m"`, `"1h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs = |factor: u64| {
        value
            .checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration '{}' is too large", s))
    };

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => secs(60),
        "h" => secs(60 * 60),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_need_a_known_unit() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration(" 3s "), Ok(Duration::from_secs(3)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("5d").is_err());
    }

    #[test]
    fn oversized_durations_are_rejected() {
        assert_eq!(
            parse_duration(&format!("{}s", u64::MAX)),
            Ok(Duration::from_secs(u64::MAX))
        );
        assert!(parse_duration(&format!("{}m", u64::MAX)).is_err());
        assert!(parse_duration(&format!("{}h", u64::MAX / 60)).is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn listen_address_must_include_a_port() {
        assert!(parse_listen("127.0.0.1:8080").is_ok());
        assert!(parse_listen("localhost").is_err());
    }
}
