use crate::scheduler::ScheduleConfig;
use crate::types::{PulseError, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// LLM collaborator settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl LlmConfig {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }
}

/// SMTP delivery settings. In mock mode no credentials are needed and no
/// network I/O happens.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub server: String,
    pub port: u16,
    pub use_tls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_email: String,
    /// Default recipient list; a manual caller's recipient is appended to
    /// this, never substituted for it.
    pub recipients: Vec<String>,
    pub mock: bool,
}

/// Process-wide configuration, read from the environment once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub reviews_url: String,
    pub data_dir: PathBuf,
    pub llm: LlmConfig,
    pub mail: MailConfig,
    pub schedule: ScheduleConfig,
    /// Wall-clock ceiling for a manual invocation.
    pub manual_ceiling: Duration,
    /// Wall-clock ceiling for a scheduled invocation.
    pub scheduled_ceiling: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let reviews_url = require_env("REVIEWS_URL")?;
        Url::parse(&reviews_url)
            .map_err(|e| PulseError::Config(format!("invalid REVIEWS_URL: {e}")))?;

        let llm = LlmConfig::new(
            require_env("GEMINI_API_KEY")?,
            optional_env("GEMINI_MODEL").unwrap_or_else(|| "gemini-2.5-flash".to_string()),
        );

        let mock = bool_env("USE_MOCK_SEND", false)?;
        let recipients: Vec<String> = optional_env("TO_EMAILS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        let username = optional_env("SMTP_USERNAME");
        let password = optional_env("SMTP_PASSWORD");
        if !mock && !recipients.is_empty() && (username.is_none() || password.is_none()) {
            return Err(PulseError::Config(
                "SMTP_USERNAME and SMTP_PASSWORD are required unless USE_MOCK_SEND=true".into(),
            ));
        }
        let mail = MailConfig {
            server: optional_env("SMTP_SERVER").unwrap_or_else(|| "smtp.gmail.com".to_string()),
            port: parse_env("SMTP_PORT", 587)?,
            use_tls: bool_env("SMTP_USE_TLS", true)?,
            username,
            password,
            from_email: optional_env("FROM_EMAIL")
                .unwrap_or_else(|| "review-pulse@localhost".to_string()),
            recipients,
            mock,
        };

        let schedule = ScheduleConfig::new(
            bool_env("SCHEDULER_ENABLED", false)?,
            &optional_env("SCHEDULER_DAY").unwrap_or_else(|| "mon".to_string()),
            parse_env("SCHEDULER_HOUR", 8)?,
            parse_env("SCHEDULER_MINUTE", 0)?,
            &optional_env("SCHEDULER_TIMEZONE").unwrap_or_else(|| "UTC".to_string()),
            parse_env("SCHEDULER_WINDOW_DAYS", 7)?,
        )?;

        Ok(Self {
            reviews_url,
            data_dir: optional_env("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            llm,
            mail,
            schedule,
            manual_ceiling: Duration::from_secs(parse_env("MANUAL_TIMEOUT_SECS", 900u64)?),
            scheduled_ceiling: Duration::from_secs(parse_env("SCHEDULED_TIMEOUT_SECS", 1800u64)?),
        })
    }
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn require_env(name: &str) -> Result<String> {
    optional_env(name).ok_or_else(|| PulseError::Config(format!("{name} is not set")))
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match optional_env(name) {
        Some(v) => v
            .parse()
            .map_err(|_| PulseError::Config(format!("unparseable {name}: {v}"))),
        None => Ok(default),
    }
}

fn bool_env(name: &str, default: bool) -> Result<bool> {
    match optional_env(name) {
        Some(v) => match v.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(PulseError::Config(format!("unparseable {name}: {v}"))),
        },
        None => Ok(default),
    }
}
