use std::path::PathBuf;
use std::str::FromStr;

use crate::engine::EngineError;
use crate::model::WorkingHoursPolicy;

/// Server settings, read from `SLOTGATE_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub policy: WorkingHoursPolicy,
    /// Minutes the clinic's local time is ahead of UTC.
    pub utc_offset_minutes: i32,
}

fn parse_var<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    get(key).and_then(|s| s.trim().parse().ok())
}

impl Config {
    pub fn from_env() -> Result<Self, EngineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values fall back to defaults;
    /// the working-hours policy is validated.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, EngineError> {
        let defaults = WorkingHoursPolicy::default();

        let policy = WorkingHoursPolicy::new(
            parse_var(&get, "SLOTGATE_DAY_START").unwrap_or(defaults.day_start_minute),
            parse_var(&get, "SLOTGATE_DAY_END").unwrap_or(defaults.day_end_minute),
            parse_var(&get, "SLOTGATE_SLOT_MINUTES").unwrap_or(defaults.slot_duration_minutes),
        )?;

        Ok(Self {
            bind: get("SLOTGATE_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_var(&get, "SLOTGATE_PORT").unwrap_or(5480),
            data_dir: get("SLOTGATE_DATA_DIR")
                .unwrap_or_else(|| "./data".into())
                .into(),
            max_connections: parse_var(&get, "SLOTGATE_MAX_CONNECTIONS").unwrap_or(256),
            compact_threshold: parse_var(&get, "SLOTGATE_COMPACT_THRESHOLD").unwrap_or(1000),
            metrics_port: parse_var(&get, "SLOTGATE_METRICS_PORT"),
            policy,
            utc_offset_minutes: parse_var(&get, "SLOTGATE_UTC_OFFSET_MINUTES").unwrap_or(0),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let cfg = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.addr(), "0.0.0.0:5480");
        assert_eq!(cfg.data_dir, PathBuf::from("./data"));
        assert_eq!(cfg.max_connections, 256);
        assert_eq!(cfg.metrics_port, None);
        assert_eq!(cfg.policy, WorkingHoursPolicy::default());
        assert_eq!(cfg.utc_offset_minutes, 0);
    }

    #[test]
    fn overrides() {
        let cfg = Config::from_lookup(lookup(&[
            ("SLOTGATE_PORT", "7000"),
            ("SLOTGATE_METRICS_PORT", "9100"),
            ("SLOTGATE_DAY_START", "480"),
            ("SLOTGATE_DAY_END", "720"),
            ("SLOTGATE_SLOT_MINUTES", "20"),
            ("SLOTGATE_UTC_OFFSET_MINUTES", "-300"),
        ]))
        .unwrap();
        assert_eq!(cfg.port, 7000);
        assert_eq!(cfg.metrics_port, Some(9100));
        assert_eq!(cfg.policy, WorkingHoursPolicy::new(480, 720, 20).unwrap());
        assert_eq!(cfg.utc_offset_minutes, -300);
    }

    #[test]
    fn unparseable_values_fall_back() {
        let cfg = Config::from_lookup(lookup(&[("SLOTGATE_PORT", "http")])).unwrap();
        assert_eq!(cfg.port, 5480);
    }

    #[test]
    fn invalid_policy_is_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("SLOTGATE_DAY_START", "1020"),
            ("SLOTGATE_DAY_END", "540"),
        ]))
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidPolicy(_)));

        let err = Config::from_lookup(lookup(&[("SLOTGATE_SLOT_MINUTES", "0")])).unwrap_err();
        assert!(matches!(err, EngineError::InvalidPolicy(_)));
    }
}
