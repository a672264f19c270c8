use crate::error::{BotError, BotResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// 秒数转 Duration；负数和 NaN 视为 0，溢出时取最大值
fn seconds(secs: f64) -> Duration {
    if !(secs > 0.0) {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub endpoints: EndpointConfig,
    pub client: ClientConfig,
    pub retry: RetryConfig,
    pub proxy: ProxyConfig,
    pub run: RunConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub auth_base_url: String,
    pub api_base_url: String,
    pub chat_base_url: String,
    pub ip_check_url: String,
}

/// 模拟浏览器前端所需的固定请求头取值
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub origin: String,
    pub accept_language: String,
    pub privy_app_id: String,
    pub privy_client: String,
    pub chat_api_key: Option<String>, // 对话服务的 X-Api-Key
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub warmup_secs: f64,
    pub backoff_secs: f64,
    pub request_timeout_secs: u64,
    pub probe_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub enabled: bool,
    pub rotate_on_failure: bool,
    pub file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub accounts_file: String,
    pub questions_file: String,
    pub account_delay_secs: f64,
    pub cycle_hours: f64,
    pub chat_rounds: u32,
    pub tasks: TaskToggles,
    pub rng_seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskToggles {
    pub check_in: bool,
    pub game: bool,
    pub chat: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoints: EndpointConfig::default(),
            client: ClientConfig::default(),
            retry: RetryConfig::default(),
            proxy: ProxyConfig::default(),
            run: RunConfig::default(),
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            auth_base_url: "https://auth.privy.io".to_string(),
            api_base_url: "https://api.app.wardenprotocol.org/api".to_string(),
            chat_base_url:
                "https://warden-app-agents-prod-new-d1025b697dc25df9a5654bc047bbe875.us.langgraph.app"
                    .to_string(),
            ip_check_url: "https://api.ipify.org?format=json".to_string(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            origin: "https://app.wardenprotocol.org".to_string(),
            accept_language: "id-ID,id;q=0.9,en-US;q=0.8,en;q=0.7".to_string(),
            privy_app_id: "cm7f00k5c02tibel0m4o9tdy1".to_string(),
            privy_client: "react-auth:2.13.8".to_string(),
            chat_api_key: None,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            warmup_secs: 3.0,
            backoff_secs: 5.0,
            request_timeout_secs: 60,
            probe_timeout_secs: 30,
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rotate_on_failure: false,
            file: "proxy.txt".to_string(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            accounts_file: "accounts.txt".to_string(),
            questions_file: "question_lists.json".to_string(),
            account_delay_secs: 5.0,
            cycle_hours: 24.0,
            chat_rounds: 3,
            tasks: TaskToggles::default(),
            rng_seed: None,
        }
    }
}

impl Default for TaskToggles {
    fn default() -> Self {
        Self {
            check_in: true,
            game: true,
            chat: true,
        }
    }
}

impl RetryConfig {
    pub fn warmup(&self) -> Duration {
        seconds(self.warmup_secs)
    }

    pub fn backoff(&self) -> Duration {
        seconds(self.backoff_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl RunConfig {
    pub fn account_delay(&self) -> Duration {
        seconds(self.account_delay_secs)
    }

    pub fn cycle_interval(&self) -> Duration {
        seconds(self.cycle_hours * 3600.0)
    }
}

impl Config {
    /// 加载配置：默认值 -> warden.toml（可选） -> WARDEN_ 前缀的环境变量
    pub fn load() -> BotResult<Self> {
        let path = env::var("WARDEN_CONFIG").unwrap_or_else(|_| "warden".to_string());

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(
                config::Environment::with_prefix("WARDEN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BotResult<()> {
        if self.retry.max_attempts == 0 {
            return Err(BotError::ConfigError(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        if !(self.run.cycle_hours > 0.0) || !self.run.cycle_hours.is_finite() {
            return Err(BotError::ConfigError(
                "run.cycle_hours must be a positive finite number".to_string(),
            ));
        }

        for (key, value) in [
            ("retry.warmup_secs", self.retry.warmup_secs),
            ("retry.backoff_secs", self.retry.backoff_secs),
            ("run.account_delay_secs", self.run.account_delay_secs),
        ] {
            if !value.is_finite() {
                return Err(BotError::ConfigError(format!("{} must be a finite number", key)));
            }
        }

        if self.run.chat_rounds == 0 {
            return Err(BotError::ConfigError(
                "run.chat_rounds must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_timings() {
        let config = Config::default();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.warmup(), Duration::from_secs(3));
        assert_eq!(config.retry.backoff(), Duration::from_secs(5));
        assert_eq!(config.run.cycle_interval(), Duration::from_secs(24 * 60 * 60));
        assert!(config.run.tasks.check_in && config.run.tasks.game && config.run.tasks.chat);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(
                "[proxy]\nenabled = true\n\n[run]\ncycle_hours = 12.0\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let config: Config = settings.try_deserialize().unwrap();

        assert!(config.proxy.enabled);
        assert!(!config.proxy.rotate_on_failure);
        assert_eq!(config.proxy.file, "proxy.txt");
        assert_eq!(config.run.cycle_hours, 12.0);
        assert_eq!(config.run.chat_rounds, 3);
    }

    #[test]
    fn test_validation_rejects_zero_attempts() {
        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(matches!(config.validate(), Err(BotError::ConfigError(_))));

        let mut config = Config::default();
        config.run.cycle_hours = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_non_finite_timings() {
        let mut config = Config::default();
        config.run.cycle_hours = f64::INFINITY;
        assert!(matches!(config.validate(), Err(BotError::ConfigError(_))));

        let mut config = Config::default();
        config.retry.backoff_secs = f64::NAN;
        assert!(matches!(config.validate(), Err(BotError::ConfigError(ref m)) if m.contains("backoff_secs")));

        let mut config = Config::default();
        config.retry.warmup_secs = f64::INFINITY;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.run.account_delay_secs = f64::NEG_INFINITY;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_durations_saturate_instead_of_panicking() {
        let mut config = Config::default();
        config.retry.backoff_secs = -3.0;
        config.retry.warmup_secs = f64::NAN;
        config.run.cycle_hours = 1e300;

        assert_eq!(config.retry.backoff(), Duration::ZERO);
        assert_eq!(config.retry.warmup(), Duration::ZERO);
        assert_eq!(config.run.cycle_interval(), Duration::MAX);
    }
}
