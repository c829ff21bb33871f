use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use figment::{
    providers::{Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoggingConfig {
    pub ttpulse: String,
}

impl LoggingConfig {
    const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    const TTPULSE_LEVEL: &str = "info";

    fn default() -> Self {
        LoggingConfig {
            ttpulse: Self::TTPULSE_LEVEL.to_string(),
        }
    }

    fn ensure_valid(&mut self) {
        let str_original = self.ttpulse.clone();
        self.ttpulse = self.ttpulse.trim().to_ascii_lowercase();
        if !Self::LOG_LEVELS.contains(&self.ttpulse.as_str()) {
            eprintln!(
                "Config error: ttpulse log level of '{}' is invalid - using default of '{}'",
                str_original,
                Self::TTPULSE_LEVEL
            );
            self.ttpulse = Self::TTPULSE_LEVEL.to_owned();
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FetchConfig {
    timeout_secs: u64,
    user_agent: String,
}

impl FetchConfig {
    const TIMEOUT_SECS: u64 = 15;
    const USER_AGENT: &str =
        "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/117.0";

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    fn default() -> Self {
        FetchConfig {
            timeout_secs: Self::TIMEOUT_SECS,
            user_agent: Self::USER_AGENT.to_owned(),
        }
    }

    fn ensure_valid(&mut self) {
        if self.timeout_secs == 0 || self.timeout_secs > 120 {
            eprintln!(
                "Config error: fetch timeout of {}s is invalid - using default of {}s",
                self.timeout_secs,
                Self::TIMEOUT_SECS
            );
            self.timeout_secs = Self::TIMEOUT_SECS;
        }
        if self.user_agent.trim().is_empty() {
            self.user_agent = Self::USER_AGENT.to_owned();
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WatchConfig {
    interval_secs: u64,
    horizon_days: u32,
    notify_ids: Vec<i64>,
}

impl WatchConfig {
    const INTERVAL_SECS: u64 = 30;
    const HORIZON_DAYS: u32 = 2;

    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    pub fn horizon_days(&self) -> u32 {
        self.horizon_days
    }

    pub fn notify_ids(&self) -> &[i64] {
        &self.notify_ids
    }

    fn default() -> Self {
        WatchConfig {
            interval_secs: Self::INTERVAL_SECS,
            horizon_days: Self::HORIZON_DAYS,
            notify_ids: Vec::new(),
        }
    }

    fn ensure_valid(&mut self) {
        if self.interval_secs < 5 {
            eprintln!(
                "Config error: watch interval of {}s is invalid - using default of {}s",
                self.interval_secs,
                Self::INTERVAL_SECS
            );
            self.interval_secs = Self::INTERVAL_SECS;
        }
        if self.horizon_days == 0 || self.horizon_days > 7 {
            eprintln!(
                "Config error: watch horizon of {} days is invalid - using default of {}",
                self.horizon_days,
                Self::HORIZON_DAYS
            );
            self.horizon_days = Self::HORIZON_DAYS;
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub logging: LoggingConfig,
    pub fetch: FetchConfig,
    pub watch: WatchConfig,

    /// Tracked groups: group code -> timetable URL.
    pub groups: BTreeMap<String, String>,
}

impl Config {
    fn default() -> Self {
        Config {
            logging: LoggingConfig::default(),
            fetch: FetchConfig::default(),
            watch: WatchConfig::default(),
            groups: BTreeMap::new(),
        }
    }

    /// Loads the configuration from a TOML file. If the file is missing or
    /// fails to parse, defaults are used. Writes the default config to disk
    /// if no file exists yet.
    pub fn load_config(config_path: &Path) -> Self {
        let default_config = Config::default();

        if !config_path.exists() {
            if let Some(parent) = config_path.parent() {
                if let Err(e) = fs::create_dir_all(parent) {
                    eprintln!(
                        "Failed to create configuration directory {}: {}",
                        parent.display(),
                        e
                    );
                }
            }
            if let Ok(toml_string) = toml::to_string_pretty(&default_config) {
                if let Err(e) = fs::write(config_path, toml_string) {
                    eprintln!(
                        "Failed to write default config to {}: {}",
                        config_path.display(),
                        e
                    );
                }
            } else {
                eprintln!("Failed to serialize default config.");
            }
        }

        let figment = Figment::from(Serialized::defaults(default_config.clone()))
            .merge(Toml::file(config_path));

        let mut config = figment.extract().unwrap_or_else(|err| {
            eprintln!(
                "Could not load config file {}: {}. Using default configuration.",
                config_path.display(),
                err
            );
            default_config
        });

        config.ensure_valid();

        config
    }

    fn ensure_valid(&mut self) {
        self.logging.ensure_valid();
        self.fetch.ensure_valid();
        self.watch.ensure_valid();
    }
}
