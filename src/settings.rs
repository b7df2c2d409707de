//! Process-level runtime settings read from the environment.

use std::str::FromStr;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};

use fdw_core::charset::client_charset_for;
use fdw_core::{FdwError, FdwResult};

pub const LOG_ENV: &str = "FBFDW_LOG";
pub const CONNECT_TIMEOUT_ENV: &str = "FBFDW_CONNECT_TIMEOUT_SECS";
pub const LOCAL_ENCODING_ENV: &str = "FBFDW_LOCAL_ENCODING";
pub const TIME_ZONE_ENV: &str = "FBFDW_TIME_ZONE";

pub const DEFAULT_LOG_FILTER: &str = "firebird_fdw_lib=info,fdw_sql=info";
pub const DEFAULT_LOCAL_ENCODING: &str = "UTF8";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FdwSettings {
    pub log_filter: String,
    /// Handed to the remote channel; the engine itself never times out.
    pub connect_timeout: Option<Duration>,
    /// Host database encoding; decides the client character set.
    pub local_encoding: String,
    /// Zone that zoned values are tagged with on read.
    pub time_zone: FixedOffset,
}

impl Default for FdwSettings {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            connect_timeout: None,
            local_encoding: DEFAULT_LOCAL_ENCODING.to_string(),
            time_zone: Utc.fix(),
        }
    }
}

impl FdwSettings {
    pub fn from_env() -> FdwResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds settings from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> FdwResult<Self> {
        let mut settings = Self::default();
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(filter) = get(LOG_ENV) {
            settings.log_filter = filter;
        }
        if let Some(secs) = get(CONNECT_TIMEOUT_ENV) {
            let secs: u64 = secs.parse().map_err(|_| {
                FdwError::config(format!("{CONNECT_TIMEOUT_ENV} must be a whole number of seconds, got \"{secs}\""))
            })?;
            settings.connect_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(encoding) = get(LOCAL_ENCODING_ENV) {
            settings.local_encoding = encoding.to_ascii_uppercase();
        }
        if let Some(zone) = get(TIME_ZONE_ENV) {
            settings.time_zone = parse_zone(&zone)?;
        }
        Ok(settings)
    }

    pub fn client_charset(&self) -> String {
        client_charset_for(&self.local_encoding)
    }
}

fn parse_zone(zone: &str) -> FdwResult<FixedOffset> {
    if zone.eq_ignore_ascii_case("utc") || zone == "Z" {
        return Ok(Utc.fix());
    }
    FixedOffset::from_str(zone).map_err(|_| {
        FdwError::config_with_hint(
            format!("invalid {TIME_ZONE_ENV} value \"{zone}\""),
            "use a fixed offset such as +02:00",
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> FdwResult<FdwSettings> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        FdwSettings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s, FdwSettings::default());
        assert_eq!(s.client_charset(), "UTF8");
    }

    #[test]
    fn test_overrides() {
        let s = settings(&[
            (CONNECT_TIMEOUT_ENV, "15"),
            (LOCAL_ENCODING_ENV, "latin1"),
            (TIME_ZONE_ENV, "+02:00"),
        ])
        .unwrap();
        assert_eq!(s.connect_timeout, Some(Duration::from_secs(15)));
        assert_eq!(s.client_charset(), "ISO8859_1");
        assert_eq!(s.time_zone, FixedOffset::east_opt(7200).unwrap());
    }

    #[test]
    fn test_invalid_values() {
        assert!(settings(&[(CONNECT_TIMEOUT_ENV, "soon")]).is_err());
        assert!(matches!(
            settings(&[(TIME_ZONE_ENV, "Mars/Olympus")]),
            Err(FdwError::Config { hint: Some(_), .. })
        ));
    }
}
