//! CLI configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/chunkwise/config.toml`
//! - Windows: `%APPDATA%/chunkwise/config.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use chunkwise_protocol::{DEFAULT_BATCH_DELAY, DEFAULT_CHUNK_SIZE, DEFAULT_FAILURE_RATE, SpeedTier};
use serde::{Deserialize, Serialize};

use crate::cli::Overrides;

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding session records (platform data dir by default).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_dir: Option<PathBuf>,

    /// Chunk size in bytes for new sessions.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Simulated speed tier.
    #[serde(default)]
    pub speed_tier: SpeedTier,

    /// Probability that a simulated chunk transfer fails.
    #[serde(default = "default_failure_rate")]
    pub failure_rate: f64,

    /// Pacing delay between batches in milliseconds.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_failure_rate() -> f64 {
    DEFAULT_FAILURE_RATE
}

fn default_batch_delay_ms() -> u64 {
    DEFAULT_BATCH_DELAY.as_millis() as u64
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_dir: None,
            chunk_size: default_chunk_size(),
            speed_tier: SpeedTier::default(),
            failure_rate: default_failure_rate(),
            batch_delay_ms: default_batch_delay_ms(),
        }
    }
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path()?)
    }

    fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Applies command-line flags on top of the file values.
    pub fn with_overrides(mut self, overrides: &Overrides) -> Self {
        if let Some(dir) = &overrides.store_dir {
            self.store_dir = Some(dir.clone());
        }
        if let Some(size) = overrides.chunk_size {
            self.chunk_size = size;
        }
        if let Some(tier) = overrides.speed {
            self.speed_tier = tier;
        }
        if let Some(rate) = overrides.failure_rate {
            self.failure_rate = rate;
        }
        self
    }

    pub fn batch_delay(&self) -> Duration {
        // A zero delay would let the loop saturate the transport.
        Duration::from_millis(self.batch_delay_ms.max(1))
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("chunkwise")
            .join("config.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("chunkwise").join("config.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/chunkwise/config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.store_dir.is_none());
        assert_eq!(config.chunk_size, 1024 * 1024);
        assert_eq!(config.speed_tier, SpeedTier::VerySlow);
        assert_eq!(config.failure_rate, 0.1);
        assert_eq!(config.batch_delay(), Duration::from_millis(100));
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = Config {
            store_dir: Some(PathBuf::from("/var/lib/chunkwise")),
            chunk_size: 4096,
            speed_tier: SpeedTier::Fast,
            failure_rate: 0.0,
            batch_delay_ms: 10,
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn config_partial_toml() {
        // Only specify the speed tier, rest should use defaults.
        let config: Config = toml::from_str(r#"speed_tier = "slow""#).unwrap();
        assert_eq!(config.speed_tier, SpeedTier::Slow);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(config.store_dir.is_none());
    }

    #[test]
    fn config_path_not_empty() {
        let path = config_path().unwrap();
        assert!(path.to_string_lossy().contains("chunkwise"));
    }

    #[test]
    fn load_creates_default_then_reads_back() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.toml");

        let created = Config::load_from(&path).unwrap();
        assert_eq!(created, Config::default());
        assert!(path.exists());

        let edited = Config {
            chunk_size: 512,
            ..Config::default()
        };
        edited.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap().chunk_size, 512);
    }

    #[test]
    fn overrides_win_over_file_values() {
        let overrides = Overrides {
            speed: Some(SpeedTier::Normal),
            chunk_size: Some(8),
            store_dir: Some(PathBuf::from("/tmp/s")),
            failure_rate: None,
        };
        let config = Config::default().with_overrides(&overrides);
        assert_eq!(config.speed_tier, SpeedTier::Normal);
        assert_eq!(config.chunk_size, 8);
        assert_eq!(config.store_dir, Some(PathBuf::from("/tmp/s")));
        assert_eq!(config.failure_rate, DEFAULT_FAILURE_RATE);
    }

    #[test]
    fn zero_batch_delay_is_raised() {
        let config = Config {
            batch_delay_ms: 0,
            ..Config::default()
        };
        assert_eq!(config.batch_delay(), Duration::from_millis(1));
    }
}
