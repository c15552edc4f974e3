use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::battle::timer::DEFAULT_QUESTION_SECONDS;
use crate::battle::BattleOptions;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub llm_timeout_seconds: u64,
    pub llm_max_attempts: u32,
    pub question_time_limit_seconds: u32,
    pub timer_tick_ms: u64,
    /// Idle time after which a server-hosted battle is discarded.
    pub battle_ttl_seconds: u64,
    pub bind_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-4o".to_string(),
            llm_timeout_seconds: 60,
            llm_max_attempts: 3,
            question_time_limit_seconds: DEFAULT_QUESTION_SECONDS,
            timer_tick_ms: 1000,
            battle_ttl_seconds: 3600,
            bind_addr: "0.0.0.0:5000".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first, then the local one
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/{APP_ENV}.toml, overridden by APP__SECTION__KEY variables
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let defaults = Config::default();

        let openai_api_key = settings
            .get_string("openai.api_key")
            .or_else(|_| env::var("OPENAI_API_KEY"))
            .ok()
            .filter(|key| !key.trim().is_empty());
        if openai_api_key.is_none() {
            eprintln!("WARNING: OPENAI_API_KEY is not set; question generation and AI answers will fail");
        }

        let openai_base_url = settings
            .get_string("openai.base_url")
            .or_else(|_| env::var("OPENAI_BASE_URL"))
            .unwrap_or(defaults.openai_base_url);

        let openai_model = settings
            .get_string("openai.model")
            .or_else(|_| env::var("OPENAI_MODEL"))
            .unwrap_or(defaults.openai_model);

        let llm_timeout_seconds = read_number(
            &settings,
            "openai.timeout_seconds",
            "LLM_TIMEOUT_SECONDS",
            defaults.llm_timeout_seconds,
        )?;

        let llm_max_attempts = read_number(
            &settings,
            "openai.max_attempts",
            "LLM_MAX_ATTEMPTS",
            defaults.llm_max_attempts,
        )?;

        let question_time_limit_seconds = read_number(
            &settings,
            "battle.question_time_limit_seconds",
            "QUESTION_TIME_LIMIT_SECONDS",
            defaults.question_time_limit_seconds,
        )?;

        let timer_tick_ms = read_number(
            &settings,
            "battle.timer_tick_ms",
            "TIMER_TICK_MS",
            defaults.timer_tick_ms,
        )?;

        let battle_ttl_seconds = read_number(
            &settings,
            "battle.ttl_seconds",
            "BATTLE_TTL_SECONDS",
            defaults.battle_ttl_seconds,
        )?;

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or(defaults.bind_addr);

        Ok(Config {
            openai_api_key,
            openai_base_url,
            openai_model,
            llm_timeout_seconds,
            llm_max_attempts: llm_max_attempts.max(1),
            question_time_limit_seconds: question_time_limit_seconds.max(1),
            timer_tick_ms: timer_tick_ms.max(1),
            battle_ttl_seconds: battle_ttl_seconds.max(1),
            bind_addr,
        })
    }

    pub fn battle_options(&self) -> BattleOptions {
        BattleOptions {
            question_seconds: self.question_time_limit_seconds,
            tick: Duration::from_millis(self.timer_tick_ms),
        }
    }

    pub fn battle_ttl(&self) -> Duration {
        Duration::from_secs(self.battle_ttl_seconds)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_seconds)
    }
}

fn read_number<T>(
    settings: &config::Config,
    key: &str,
    env_var: &str,
    default: T,
) -> Result<T, config::ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = match settings.get_string(key).or_else(|_| env::var(env_var)) {
        Ok(raw) => raw,
        Err(_) => return Ok(default),
    };
    raw.trim()
        .parse()
        .map_err(|e| config::ConfigError::Message(format!("{} must be a number: {}", env_var, e)))
}
