use std::time::Duration;

use crate::{Error, Result};

/// The three timeframe labels scored together, fastest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeframes {
    pub fast: String,
    pub medium: String,
    pub slow: String,
}

impl Default for Timeframes {
    fn default() -> Self {
        Self {
            fast: "1m".into(),
            medium: "5m".into(),
            slow: "15m".into(),
        }
    }
}

/// Telegram alerting, enabled only when a token is configured.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub token: String,
    pub allowed_user_ids: Vec<i64>,
}

/// Read-only dashboard, enabled only when a token is configured.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub token: String,
    pub port: u16,
}

/// Runtime configuration loaded from environment variables at startup.
///
/// Decision parameters and the pair list live in the strategy TOML file
/// named by `strategy_config_path`.
#[derive(Debug, Clone)]
pub struct Config {
    pub strategy_config_path: String,
    pub paper_feed_path: String,
    pub timeframes: Timeframes,
    pub max_positions: usize,
    pub cycle_interval: Duration,
    pub error_backoff: Duration,
    pub max_cycles: Option<u64>,
    pub telegram: Option<TelegramConfig>,
    pub dashboard: Option<DashboardConfig>,
}

impl Config {
    /// Load configuration from the process environment, reading `.env` first
    /// if one is present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let timeframes = match get("TIMEFRAMES") {
            Some(raw) => parse_timeframes(&raw)?,
            None => Timeframes::default(),
        };

        let max_positions: usize = parse_or("MAX_POSITIONS", get("MAX_POSITIONS"), 3)?;
        if max_positions == 0 {
            return Err(Error::Config("MAX_POSITIONS must be at least 1".into()));
        }

        let cycle_secs: u64 = parse_or("CYCLE_INTERVAL_SECS", get("CYCLE_INTERVAL_SECS"), 15)?;
        if cycle_secs == 0 {
            return Err(Error::Config("CYCLE_INTERVAL_SECS must be at least 1".into()));
        }
        let backoff_secs: u64 = parse_or("ERROR_BACKOFF_SECS", get("ERROR_BACKOFF_SECS"), 10)?;

        let max_cycles = match get("MAX_CYCLES") {
            Some(raw) => Some(parse_value::<u64>("MAX_CYCLES", &raw)?),
            None => None,
        };

        let telegram = match get("TELEGRAM_TOKEN") {
            Some(token) => {
                let allowed_user_ids = get("TELEGRAM_ALLOWED_USER_IDS")
                    .unwrap_or_default()
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| parse_value::<i64>("TELEGRAM_ALLOWED_USER_IDS", s))
                    .collect::<Result<Vec<_>>>()?;
                Some(TelegramConfig {
                    token,
                    allowed_user_ids,
                })
            }
            None => None,
        };

        let dashboard = match get("DASHBOARD_TOKEN") {
            Some(token) => Some(DashboardConfig {
                token,
                port: parse_or("DASHBOARD_PORT", get("DASHBOARD_PORT"), 8080)?,
            }),
            None => None,
        };

        Ok(Config {
            strategy_config_path: get("STRATEGY_CONFIG_PATH")
                .unwrap_or_else(|| "config/strategy.toml".to_string()),
            paper_feed_path: get("PAPER_FEED_PATH")
                .unwrap_or_else(|| "config/feed.json".to_string()),
            timeframes,
            max_positions,
            cycle_interval: Duration::from_secs(cycle_secs),
            error_backoff: Duration::from_secs(backoff_secs),
            max_cycles,
            telegram,
            dashboard,
        })
    }
}

fn parse_timeframes(raw: &str) -> Result<Timeframes> {
    let labels: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    match labels.as_slice() {
        [fast, medium, slow] => Ok(Timeframes {
            fast: fast.to_string(),
            medium: medium.to_string(),
            slow: slow.to_string(),
        }),
        _ => Err(Error::Config(format!(
            "TIMEFRAMES must list exactly three timeframes (fast,medium,slow), got '{raw}'"
        ))),
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| Error::Config(format!("{key} has an invalid value: '{raw}'")))
}

fn parse_or<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = config_from(&[]).unwrap();
        assert_eq!(cfg.max_positions, 3);
        assert_eq!(cfg.cycle_interval, Duration::from_secs(15));
        assert_eq!(cfg.error_backoff, Duration::from_secs(10));
        assert_eq!(cfg.timeframes, Timeframes::default());
        assert_eq!(cfg.strategy_config_path, "config/strategy.toml");
        assert!(cfg.telegram.is_none());
        assert!(cfg.dashboard.is_none());
        assert!(cfg.max_cycles.is_none());
    }

    #[test]
    fn timeframes_must_be_a_triple() {
        let cfg = config_from(&[("TIMEFRAMES", "5m, 15m, 30m")]).unwrap();
        assert_eq!(cfg.timeframes.fast, "5m");
        assert_eq!(cfg.timeframes.slow, "30m");

        assert!(matches!(
            config_from(&[("TIMEFRAMES", "5m,15m")]),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn zero_position_cap_is_rejected() {
        assert!(matches!(
            config_from(&[("MAX_POSITIONS", "0")]),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn non_numeric_values_are_rejected() {
        assert!(config_from(&[("CYCLE_INTERVAL_SECS", "soon")]).is_err());
        assert!(config_from(&[
            ("TELEGRAM_TOKEN", "t"),
            ("TELEGRAM_ALLOWED_USER_IDS", "12,abc")
        ])
        .is_err());
    }

    #[test]
    fn optional_integrations_enable_on_token() {
        let cfg = config_from(&[
            ("TELEGRAM_TOKEN", "abc"),
            ("TELEGRAM_ALLOWED_USER_IDS", "1, 2"),
            ("DASHBOARD_TOKEN", "secret"),
            ("DASHBOARD_PORT", "9000"),
        ])
        .unwrap();
        assert_eq!(cfg.telegram.unwrap().allowed_user_ids, vec![1, 2]);
        let dashboard = cfg.dashboard.unwrap();
        assert_eq!(dashboard.port, 9000);
        assert_eq!(dashboard.token, "secret");
    }
}
