use std::{env::VarError, fmt::Display, str::FromStr};

use anyhow::{Result, bail, anyhow};

/// Get an env var as a String; decoding failures are reported as
/// errors.
pub fn getenv(name: &str) -> Result<Option<String>> {
    match std::env::var(name) {
        Ok(s) => Ok(Some(s)),
        Err(e) => match e {
            VarError::NotPresent => Ok(None),
            VarError::NotUnicode(_) => bail!("{name:?} env var is not unicode"),
        }
    }
}

/// Get an env var as a String, or `fallbackvalue` if it isn't set.
pub fn getenv_or(name: &str, fallbackvalue: &str) -> Result<String> {
    Ok(getenv(name)?.unwrap_or_else(|| fallbackvalue.to_string()))
}

/// Parse a boolean env var ("1", "true", "on", "yes" and their
/// negations, case insensitive).
pub fn getenv_bool(name: &str, fallbackvalue: bool) -> Result<bool> {
    match getenv(name)? {
        None => Ok(fallbackvalue),
        Some(s) => parse_bool(&s).ok_or_else(
            || anyhow!("{name:?} env var: expecting a boolean, got {s:?}"))
    }
}

pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" | "" => Some(false),
        _ => None
    }
}

/// Parse an env var via `FromStr`, or `fallbackvalue` if it isn't set.
pub fn getenv_parse<T>(name: &str, fallbackvalue: T) -> Result<T>
where T: FromStr,
      T::Err: Display
{
    match getenv(name)? {
        None => Ok(fallbackvalue),
        Some(s) => s.trim().parse().map_err(
            |e| anyhow!("{name:?} env var: can't parse {s:?}: {e}"))
    }
}
