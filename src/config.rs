use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

const CONFIG_FILE_NAME: &str = "droidpulse.json";
const DEFAULT_AI_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";
const DEFAULT_AI_MODEL: &str = "llama-3.3-70b-versatile";

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Config {
    pub adb_path: String,
    pub command_timeout_secs: u64,
    pub scan_timeout_secs: u64,
    pub max_concurrent_scans: usize,
    pub tracked_mounts: Vec<String>,
    pub max_log_lines: usize,
    pub log_format: String,
    pub ai: AiConfig,
    pub probes: ProbeConfig,
    pub rules: RulePolicy,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct AiConfig {
    // Never written back to disk.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub rate_limit_cooldown_secs: u64,
    pub prompt_log_lines: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ProbeConfig {
    pub latency_target: String,
    pub ping_count: u32,
    pub dns_targets: Vec<String>,
    pub probe_timeout_secs: u64,
}

/// Thresholds and score deductions for the rule engine.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RulePolicy {
    pub battery_temp_max_c: f32,
    pub battery_thermal_deduction: u8,
    pub battery_level_min: u8,
    pub battery_level_deduction: u8,
    pub battery_health_deduction: u8,
    pub storage_free_min_percent: f64,
    pub storage_low_deduction: u8,
    pub memory_available_min_ratio: f64,
    pub memory_pressure_deduction: u8,
    pub cpu_load_max: f64,
    pub cpu_load_deduction: u8,
    pub signal_min_dbm: i32,
    pub weak_signal_deduction: u8,
    pub latency_max_ms: f64,
    pub latency_deduction: u8,
    pub dns_failure_deduction: u8,
    pub error_log_max: usize,
    pub fatal_log_max: usize,
    pub error_log_deduction: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            adb_path: "adb".to_string(),
            command_timeout_secs: 30,
            scan_timeout_secs: 180,
            max_concurrent_scans: 4,
            tracked_mounts: vec!["/data".to_string(), "/storage/emulated".to_string()],
            max_log_lines: 30,
            log_format: "text".to_string(),
            ai: AiConfig::default(),
            probes: ProbeConfig::default(),
            rules: RulePolicy::default(),
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_AI_ENDPOINT.to_string(),
            model: DEFAULT_AI_MODEL.to_string(),
            timeout_secs: 30,
            max_retries: 1,
            retry_delay_ms: 500,
            rate_limit_cooldown_secs: 60,
            prompt_log_lines: 10,
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            latency_target: "8.8.8.8".to_string(),
            ping_count: 3,
            dns_targets: vec!["google.com".to_string(), "github.com".to_string()],
            probe_timeout_secs: 10,
        }
    }
}

impl Default for RulePolicy {
    fn default() -> Self {
        Self {
            battery_temp_max_c: 42.0,
            battery_thermal_deduction: 15,
            battery_level_min: 20,
            battery_level_deduction: 5,
            battery_health_deduction: 20,
            storage_free_min_percent: 10.0,
            storage_low_deduction: 20,
            memory_available_min_ratio: 0.10,
            memory_pressure_deduction: 10,
            cpu_load_max: 8.0,
            cpu_load_deduction: 5,
            signal_min_dbm: -70,
            weak_signal_deduction: 5,
            latency_max_ms: 150.0,
            latency_deduction: 5,
            dns_failure_deduction: 10,
            error_log_max: 200,
            fatal_log_max: 3,
            error_log_deduction: 10,
        }
    }
}

impl AiConfig {
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
            && !self.endpoint.trim().is_empty()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Reads `explicit` if given, else the default config file when one
    /// exists, else the environment. The API key is always taken from the
    /// environment or `.env`.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_path(path)?,
            None if Self::get_config_file_path().exists() => Self::load_from_file()?,
            None => Self::from_env()?,
        };
        config.ai.api_key = overlay_api_key(load_api_key(), config.ai.api_key.take());
        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let adb_path = env::var("ADB_PATH").unwrap_or(defaults.adb_path);
        let command_timeout_secs =
            get_env_var_u64("COMMAND_TIMEOUT_SECS", defaults.command_timeout_secs);
        let scan_timeout_secs = get_env_var_u64("SCAN_TIMEOUT_SECS", defaults.scan_timeout_secs);
        let max_concurrent_scans =
            get_env_var_u64("MAX_CONCURRENT_SCANS", defaults.max_concurrent_scans as u64) as usize;
        if max_concurrent_scans == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAX_CONCURRENT_SCANS",
                value: "0".to_string(),
            }
            .into());
        }
        let log_format = env::var("LOG_FORMAT").unwrap_or(defaults.log_format);

        let ai = AiConfig {
            api_key: load_api_key(),
            endpoint: env::var("AI_ENDPOINT").unwrap_or(defaults.ai.endpoint),
            model: env::var("AI_MODEL").unwrap_or(defaults.ai.model),
            timeout_secs: get_env_var_u64("AI_TIMEOUT_SECS", defaults.ai.timeout_secs),
            ..defaults.ai
        };

        let probes = ProbeConfig {
            latency_target: env::var("LATENCY_TARGET").unwrap_or(defaults.probes.latency_target),
            ..defaults.probes
        };

        Ok(Config {
            adb_path,
            command_timeout_secs,
            scan_timeout_secs,
            max_concurrent_scans,
            log_format,
            tracked_mounts: defaults.tracked_mounts,
            max_log_lines: defaults.max_log_lines,
            ai,
            probes,
            rules: defaults.rules,
        })
    }

    fn config_dir() -> PathBuf {
        PathBuf::from(env::var("CONFIG_DIR").unwrap_or_else(|_| ".".to_string()))
    }

    fn get_config_file_path() -> PathBuf {
        Self::config_dir().join(CONFIG_FILE_NAME)
    }

    pub fn load_from_file() -> Result<Self> {
        Self::load_from_path(Self::get_config_file_path())
    }

    pub fn load_from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let display = path.display().to_string();
        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        let config: Config = serde_json::from_str(&contents).map_err(|source| {
            ConfigError::Parse {
                path: display,
                source,
            }
        })?;
        if config.max_concurrent_scans == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_concurrent_scans",
                value: "0".to_string(),
            }
            .into());
        }
        Ok(config)
    }

    pub fn save_to_file(&self) -> Result<()> {
        self.save_to_path(Self::get_config_file_path())
    }

    pub fn save_to_path(&self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        let mut file = fs::File::create(&path)
            .with_context(|| format!("create config file {}", path.display()))?;
        file.write_all(contents.as_bytes())?;
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }
}

fn load_api_key() -> Option<String> {
    env::var("GROQ_API_KEY")
        .or_else(|_| env::var("AI_API_KEY"))
        .ok()
        .filter(|k| !k.trim().is_empty())
        .or_else(|| read_dotenv_key(&Config::config_dir().join(".env")))
}

/// A key found in the environment or `.env` wins over one in the config file.
fn overlay_api_key(from_env: Option<String>, from_file: Option<String>) -> Option<String> {
    from_env.or(from_file)
}

fn read_dotenv_key(path: &Path) -> Option<String> {
    let contents = fs::read_to_string(path).ok()?;
    contents.lines().find_map(|line| {
        line.trim()
            .strip_prefix("GROQ_API_KEY=")
            .map(|v| v.trim().trim_matches('"').to_string())
            .filter(|v| !v.is_empty())
    })
}

fn get_env_var_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_takes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, r#"{"max_concurrent_scans": 2, "rules": {"battery_temp_max_c": 40.0}}"#)
            .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.max_concurrent_scans, 2);
        assert_eq!(config.rules.battery_temp_max_c, 40.0);
        assert_eq!(config.rules.storage_free_min_percent, 10.0);
        assert_eq!(config.adb_path, "adb");
    }

    #[test]
    fn saved_file_omits_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let mut config = Config::default();
        config.ai.api_key = Some("secret".to_string());
        config.save_to_path(&path).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(!written.contains("secret"));
        let reloaded = Config::load_from_path(&path).unwrap();
        assert!(reloaded.ai.api_key.is_none());
        assert_eq!(reloaded.rules, config.rules);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "{ not json").unwrap();
        assert!(Config::load_from_path(&path).is_err());
    }

    #[test]
    fn dotenv_key_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, "OTHER=1\nGROQ_API_KEY=\"abc123\"\n").unwrap();
        assert_eq!(read_dotenv_key(&path).as_deref(), Some("abc123"));
    }

    #[test]
    fn environment_key_wins_over_file_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, r#"{"ai": {"api_key": "from-file"}}"#).unwrap();
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.ai.api_key.as_deref(), Some("from-file"));

        assert_eq!(
            overlay_api_key(Some("from-env".to_string()), config.ai.api_key.clone()).as_deref(),
            Some("from-env")
        );
        assert_eq!(
            overlay_api_key(None, config.ai.api_key).as_deref(),
            Some("from-file")
        );
    }

    #[test]
    fn blank_key_is_not_configured() {
        let mut ai = AiConfig::default();
        assert!(!ai.is_configured());
        ai.api_key = Some("  ".to_string());
        assert!(!ai.is_configured());
        ai.api_key = Some("k".to_string());
        assert!(ai.is_configured());
    }
}
