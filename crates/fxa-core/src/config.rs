use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::NaiveTime;

use crate::{currency::Currency, delivery::DeliveryMode, errors::Error, Result};

/// Typed configuration, built once at startup and shared as `Arc<Config>`.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub telegram_webhook_url: Option<String>,

    // AI fallback
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub openai_max_tokens: u32,
    pub openai_temperature: f32,

    // Replies
    pub base_currency: Currency,
    pub assistant_name: String,
    pub contact_url: Option<String>,

    // Delivery
    pub delivery_mode: DeliveryMode,
    pub http_host: String,
    pub http_port: u16,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub http_timeout: Duration,
    pub max_inbound_len: usize,

    // Sessions
    pub session_history_limit: usize,

    // Rate limiting
    pub rate_limit_enabled: bool,
    pub rate_limit_requests: u32,
    pub rate_limit_window: Duration,

    // Group broadcast
    /// Time of day (WAT) the daily rates go out to enrolled groups.
    pub daily_rates_time: NaiveTime,
}

impl Config {
    /// Load from the process environment (plus `.env` in the working directory).
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(env_str)
    }

    /// Build from an arbitrary key lookup. `load()` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN").ok_or_else(|| {
            Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
        })?;
        let telegram_webhook_url = get("TELEGRAM_WEBHOOK_URL");

        let openai_api_key = get("OPENAI_API_KEY");
        let openai_model = get("OPENAI_MODEL").unwrap_or_else(|| "gpt-3.5-turbo".to_string());
        let openai_base_url = get("OPENAI_BASE_URL")
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
            .trim_end_matches('/')
            .to_string();
        let openai_max_tokens = parse_or(&get, "OPENAI_MAX_TOKENS", 300u32)?;
        let openai_temperature = parse_or(&get, "OPENAI_TEMPERATURE", 0.7f32)?;

        let base_currency = match get("BASE_CURRENCY") {
            Some(raw) => raw
                .parse::<Currency>()
                .map_err(|e| Error::Config(format!("BASE_CURRENCY: {e}")))?,
            None => Currency::Xaf,
        };
        let assistant_name = get("ASSISTANT_NAME").unwrap_or_else(|| "Eva".to_string());
        let contact_url = get("CONTACT_URL");

        let delivery_mode = match get("DELIVERY_MODE") {
            Some(raw) => raw.parse::<DeliveryMode>()?,
            None => DeliveryMode::detect(|k| get(k)),
        };
        let http_host = get("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let http_port = parse_or(&get, "PORT", 5001u16)?;
        let poll_interval = Duration::from_millis(parse_or(&get, "POLL_INTERVAL_MS", 1000u64)?);
        let poll_timeout = Duration::from_secs(parse_or(&get, "POLL_TIMEOUT_SECS", 25u64)?);
        let http_timeout = Duration::from_secs(parse_or(&get, "HTTP_TIMEOUT_SECS", 10u64)?);
        let max_inbound_len = parse_or(&get, "MAX_INBOUND_LEN", 4096usize)?;

        let session_history_limit = parse_or(&get, "SESSION_HISTORY_LIMIT", 20usize)?;

        let rate_limit_enabled = get("RATE_LIMIT_ENABLED")
            .map(|s| parse_bool(&s))
            .unwrap_or(true);
        let rate_limit_requests = parse_or(&get, "RATE_LIMIT_REQUESTS", 30u32)?;
        let rate_limit_window = Duration::from_secs(parse_or(&get, "RATE_LIMIT_WINDOW", 60u64)?);
        if rate_limit_enabled && (rate_limit_requests == 0 || rate_limit_window.is_zero()) {
            return Err(Error::Config(
                "RATE_LIMIT_REQUESTS and RATE_LIMIT_WINDOW must be at least 1 (set RATE_LIMIT_ENABLED=false to disable)"
                    .to_string(),
            ));
        }

        let daily_rates_time = match get("DAILY_RATES_TIME") {
            Some(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M")
                .map_err(|_| Error::Config(format!("DAILY_RATES_TIME must be HH:MM, got: {raw}")))?,
            None => NaiveTime::from_hms_opt(10, 0, 0)
                .ok_or_else(|| Error::Config("invalid default DAILY_RATES_TIME".to_string()))?,
        };

        Ok(Self {
            telegram_bot_token,
            telegram_webhook_url,
            openai_api_key,
            openai_model,
            openai_base_url,
            openai_max_tokens,
            openai_temperature,
            base_currency,
            assistant_name,
            contact_url,
            delivery_mode,
            http_host,
            http_port,
            poll_interval,
            poll_timeout,
            http_timeout,
            max_inbound_len,
            session_history_limit,
            rate_limit_enabled,
            rate_limit_requests,
            rate_limit_window,
            daily_rates_time,
        })
    }

    /// `host:port` for the HTTP listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

fn parse_or<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| Error::Config(format!("{key} has an invalid value: {raw}"))),
        None => Ok(default),
    }
}

pub(crate) fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

pub(crate) fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Read `KEY=value` lines into the process environment.
///
/// Existing variables are never overridden; `#` comments, blank lines and
/// optional surrounding quotes are handled.
pub fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn token_is_required() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = Config::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "  ")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn defaults_without_cloud_markers() {
        let cfg = Config::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "t")])).unwrap();
        assert_eq!(cfg.delivery_mode, DeliveryMode::Polling);
        assert_eq!(cfg.base_currency, Currency::Xaf);
        assert_eq!(cfg.http_port, 5001);
        assert_eq!(cfg.openai_model, "gpt-3.5-turbo");
        assert_eq!(cfg.rate_limit_requests, 30);
        assert!(cfg.rate_limit_enabled);
        assert!(cfg.openai_api_key.is_none());
    }

    #[test]
    fn cloud_port_selects_webhook_mode() {
        let cfg =
            Config::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "t"), ("PORT", "8080")])).unwrap();
        assert_eq!(cfg.delivery_mode, DeliveryMode::Webhook);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn explicit_mode_wins_over_detection() {
        let cfg = Config::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("RENDER", "true"),
            ("DELIVERY_MODE", "polling"),
        ]))
        .unwrap();
        assert_eq!(cfg.delivery_mode, DeliveryMode::Polling);
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let err = Config::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "t"), ("PORT", "abc")]))
            .unwrap_err();
        assert!(err.to_string().contains("PORT"));

        let err = Config::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("BASE_CURRENCY", "GBP"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn zero_rate_limit_is_rejected_unless_disabled() {
        for (key, val) in [("RATE_LIMIT_REQUESTS", "0"), ("RATE_LIMIT_WINDOW", "0")] {
            let err = Config::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "t"), (key, val)])).unwrap_err();
            assert!(matches!(err, Error::Config(ref m) if m.contains("RATE_LIMIT")), "{key}");
        }

        let cfg = Config::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("RATE_LIMIT_ENABLED", "false"),
            ("RATE_LIMIT_REQUESTS", "0"),
        ]))
        .unwrap();
        assert!(!cfg.rate_limit_enabled);
    }

    #[test]
    fn daily_rates_time_defaults_to_ten_and_parses_hh_mm() {
        let cfg = Config::from_lookup(lookup(&[("TELEGRAM_BOT_TOKEN", "t")])).unwrap();
        assert_eq!(cfg.daily_rates_time, NaiveTime::from_hms_opt(10, 0, 0).unwrap());

        let cfg = Config::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("DAILY_RATES_TIME", "08:30"),
        ]))
        .unwrap();
        assert_eq!(cfg.daily_rates_time, NaiveTime::from_hms_opt(8, 30, 0).unwrap());

        let err = Config::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("DAILY_RATES_TIME", "25:00"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("DAILY_RATES_TIME"));
    }

    #[test]
    fn dotenv_parsing_handles_comments_quotes_and_export() {
        let parsed = parse_dotenv(
            "# comment\n\nTELEGRAM_BOT_TOKEN=\"abc\"\nexport PORT=9000\nBROKEN\n =x\nNAME='Eva Fx'\n",
        );
        assert_eq!(
            parsed,
            vec![
                ("TELEGRAM_BOT_TOKEN".to_string(), "abc".to_string()),
                ("PORT".to_string(), "9000".to_string()),
                ("NAME".to_string(), "Eva Fx".to_string()),
            ]
        );
    }
}
