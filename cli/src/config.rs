use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use drainwatch_protocol::Subsystem;
use serde::{Deserialize, Serialize};
use tracing::Level;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("interval_ms must be greater than zero")]
    ZeroInterval,

    #[error("screen_samples must be greater than zero")]
    ZeroSamples,

    #[error("Unknown subsystem `{0}` in `enabled`")]
    UnknownSubsystem(String),

    #[error("No device profile configured; pass --profile or set `profile` in {0:?}")]
    MissingProfile(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "off" | "none" => LogLevel::Off,
            "error" => LogLevel::Error,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Warn,
        }
    }

    pub fn as_tracing_level(&self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn default_enabled() -> Vec<String> {
    Subsystem::ALL
        .iter()
        .map(|s| format!("{:?}", s).to_lowercase())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub interval_ms: u64,
    /// Device calibration profile (TOML).
    pub profile: Option<PathBuf>,
    pub log_level: LogLevel,
    pub radio_interface: String,
    pub wifi_interface: String,
    /// Reported cellular network type, e.g. "hsdpa" or "lte".
    pub network_type: String,
    pub operator: String,
    pub framebuffer: Option<PathBuf>,
    pub screen_samples: usize,
    pub max_owner_skips: u32,
    /// Owner charged for screen use. Defaults to the invoking user.
    pub foreground_uid: Option<i32>,
    #[serde(default = "default_enabled")]
    pub enabled: Vec<String>,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            profile: None,
            log_level: LogLevel::Warn,
            radio_interface: "rmnet0".to_string(),
            wifi_interface: "wlan0".to_string(),
            network_type: "umts".to_string(),
            operator: String::new(),
            framebuffer: None,
            screen_samples: 500,
            max_owner_skips: 10,
            foreground_uid: None,
            enabled: default_enabled(),
        }
    }
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("drainwatch")
}

pub fn runtime_dir() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("drainwatch")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

pub fn ensure_dirs() -> io::Result<()> {
    fs::create_dir_all(config_dir())
}

impl UserConfig {
    /// Loads the user config, falling back to defaults when none exists.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let _ = ensure_dirs();
        let content = toml::to_string_pretty(self)?;
        fs::write(config_path(), content)?;
        Ok(())
    }

    pub fn merge_with_args(&mut self, interval_ms: Option<u64>, profile: Option<PathBuf>) {
        if let Some(ms) = interval_ms {
            self.interval_ms = ms;
        }
        if profile.is_some() {
            self.profile = profile;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.screen_samples == 0 {
            return Err(ConfigError::ZeroSamples);
        }
        self.enabled_subsystems()?;
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn profile_path(&self) -> Result<&Path, ConfigError> {
        self.profile
            .as_deref()
            .ok_or_else(|| ConfigError::MissingProfile(config_path()))
    }

    pub fn enabled_subsystems(&self) -> Result<Vec<Subsystem>, ConfigError> {
        let mut subsystems = Vec::new();
        for name in &self.enabled {
            let subsystem = Subsystem::from_str(name)
                .ok_or_else(|| ConfigError::UnknownSubsystem(name.clone()))?;
            if !subsystems.contains(&subsystem) {
                subsystems.push(subsystem);
            }
        }
        subsystems.sort();
        Ok(subsystems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = UserConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.enabled_subsystems().unwrap(), Subsystem::ALL.to_vec());
        assert_eq!(config.interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = UserConfig {
            interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroInterval)));
    }

    #[test]
    fn test_unknown_subsystem_rejected() {
        let config = UserConfig {
            enabled: vec!["cpu".to_string(), "bluetooth".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownSubsystem(name)) if name == "bluetooth"
        ));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "interval_ms = 500\nenabled = [\"radio\", \"3g\", \"screen\"]\nlog_level = \"debug\"\n",
        )
        .unwrap();

        let config = UserConfig::load_from(&path).unwrap();
        assert_eq!(config.interval_ms, 500);
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.radio_interface, "rmnet0");
        assert_eq!(
            config.enabled_subsystems().unwrap(),
            vec![Subsystem::Screen, Subsystem::Radio]
        );
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "interval_ms = \"fast\"\n").unwrap();

        assert!(matches!(
            UserConfig::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = UserConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, UserConfig::default());
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = UserConfig::default();
        config.merge_with_args(Some(250), Some(PathBuf::from("/tmp/device.toml")));
        assert_eq!(config.interval_ms, 250);
        assert_eq!(config.profile_path().unwrap(), Path::new("/tmp/device.toml"));
    }

    #[test]
    fn test_log_level_from_str() {
        assert_eq!(LogLevel::from_str("TRACE"), LogLevel::Trace);
        assert_eq!(LogLevel::from_str("none"), LogLevel::Off);
        assert_eq!(LogLevel::from_str("bogus"), LogLevel::Warn);
        assert_eq!(LogLevel::Off.as_tracing_level(), None);
    }
}
