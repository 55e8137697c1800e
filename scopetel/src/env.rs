//! Environment variable lookups shared by the configuration builders.
use crate::tel_warn;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Reads and parses `name`.
///
/// Unset or empty variables yield `None`. Unparsable values also yield `None`
/// after a warning, so a bad value never prevents startup.
pub(crate) fn parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok().filter(|value| !value.trim().is_empty())?;
    match T::from_str(raw.trim()) {
        Ok(value) => Some(value),
        Err(_) => {
            tel_warn!(
                name: "Config.InvalidEnvValue",
                variable = name,
                value = raw.as_str()
            );
            None
        }
    }
}

/// Reads a duration given in milliseconds.
pub(crate) fn parse_millis(name: &str) -> Option<Duration> {
    parse::<u64>(name).map(Duration::from_millis)
}
