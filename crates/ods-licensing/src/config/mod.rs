use std::env;
use std::fmt;
use std::path::PathBuf;

use crate::workflows::licensing::{
    CounterSeeds, EngineSettings, QuotaPolicy, RegistrationWindow, UnknownFactorPolicy,
};

/// Distinguishes runtime behavior for different stages of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub telemetry: TelemetryConfig,
    pub licensing: LicensingConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let telemetry = TelemetryConfig {
            log_level,
            include_target: environment != AppEnvironment::Production,
        };

        Ok(Self {
            environment,
            telemetry,
            licensing: LicensingConfig::from_env()?,
        })
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub include_target: bool,
}

/// Operator policy for the licensing engine.
#[derive(Debug, Clone)]
pub struct LicensingConfig {
    pub window: RegistrationWindow,
    pub quota_policy: QuotaPolicy,
    pub unknown_factor_policy: UnknownFactorPolicy,
    pub max_conflict_retries: u32,
    pub seeds: CounterSeeds,
    /// Replaces the built-in refrigerant table when set.
    pub catalog_path: Option<PathBuf>,
}

impl Default for LicensingConfig {
    fn default() -> Self {
        let settings = EngineSettings::default();
        Self {
            window: settings.window,
            quota_policy: settings.quota_policy,
            unknown_factor_policy: settings.unknown_factor_policy,
            max_conflict_retries: settings.max_conflict_retries,
            seeds: CounterSeeds::default(),
            catalog_path: None,
        }
    }
}

impl LicensingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let month = match read("ODS_REGISTRATION_MONTH") {
            Some(raw) => match raw.parse::<u32>() {
                Ok(month) if (1..=12).contains(&month) => month,
                _ => return Err(ConfigError::invalid("ODS_REGISTRATION_MONTH", raw)),
            },
            None => defaults.window.month,
        };
        let override_open = match read("ODS_REGISTRATION_OVERRIDE") {
            Some(raw) => parse_flag("ODS_REGISTRATION_OVERRIDE", raw)?,
            None => defaults.window.override_open,
        };

        let quota_policy = match read("ODS_QUOTA_POLICY") {
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "floor" | "floor_at_zero" => QuotaPolicy::FloorAtZero,
                "reject" | "reject_over_quota" => QuotaPolicy::RejectOverQuota,
                _ => return Err(ConfigError::invalid("ODS_QUOTA_POLICY", raw)),
            },
            None => defaults.quota_policy,
        };
        let unknown_factor_policy = match read("ODS_UNKNOWN_FACTOR_POLICY") {
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "ignore" => UnknownFactorPolicy::Ignore,
                "reject" => UnknownFactorPolicy::Reject,
                _ => return Err(ConfigError::invalid("ODS_UNKNOWN_FACTOR_POLICY", raw)),
            },
            None => defaults.unknown_factor_policy,
        };

        let max_conflict_retries = match read("ODS_MAX_CONFLICT_RETRIES") {
            Some(raw) => match raw.parse::<u32>() {
                Ok(value) if value > 0 => value,
                _ => return Err(ConfigError::invalid("ODS_MAX_CONFLICT_RETRIES", raw)),
            },
            None => defaults.max_conflict_retries,
        };

        let seeds = CounterSeeds {
            registration_cert: parse_seed("ODS_SEED_REGISTRATION_CERT")?,
            import_license: parse_seed("ODS_SEED_IMPORT_LICENSE")?,
            importer_number: parse_seed("ODS_SEED_IMPORTER_NUMBER")?,
            technician_cert: parse_seed("ODS_SEED_TECHNICIAN_CERT")?,
        };

        Ok(Self {
            window: RegistrationWindow {
                month,
                override_open,
            },
            quota_policy,
            unknown_factor_policy,
            max_conflict_retries,
            seeds,
            catalog_path: read("ODS_CATALOG_CSV").map(PathBuf::from),
        })
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            window: self.window,
            quota_policy: self.quota_policy,
            unknown_factor_policy: self.unknown_factor_policy,
            max_conflict_retries: self.max_conflict_retries,
        }
    }
}

fn read(key: &'static str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_flag(key: &'static str, raw: String) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(key, raw)),
    }
}

fn parse_seed(key: &'static str) -> Result<u64, ConfigError> {
    match read(key) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::invalid(key, raw)),
        None => Ok(0),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Invalid { key: &'static str, value: String },
}

impl ConfigError {
    fn invalid(key: &'static str, value: String) -> Self {
        Self::Invalid { key, value }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid { key, value } => {
                write!(f, "{key} has an unsupported value '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
