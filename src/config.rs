//! Bot configuration — loading, defaults, overrides, and validation.
//!
//! The configuration is read once at startup and then moved into the
//! session; nothing reads it from a global afterwards.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::constants::{
    APP_NAME, CONFIG_FILE_NAME, CONFIG_PATH_ENV, DEFAULT_CHANNEL, DEFAULT_CORPUS,
    DEFAULT_EXCLUDE_PATTERNS, DEFAULT_GENERATOR, DEFAULT_GENERATOR_TIMEOUT_SECS,
    DEFAULT_INITIAL_BACKOFF_SECS, DEFAULT_MAX_BACKOFF_SECS, DEFAULT_MAX_CONCURRENT,
    DEFAULT_MAX_TIME_SECS, DEFAULT_MIN_TIME_SECS, DEFAULT_MIN_TOKENS, DEFAULT_NICKNAME,
    DEFAULT_PING_INTERVAL_SECS, DEFAULT_PING_TIMEOUT_SECS, DEFAULT_PORT, DEFAULT_REALNAME,
    DEFAULT_REGAIN_INTERVAL_SECS, DEFAULT_REGISTRATION_TIMEOUT_SECS, DEFAULT_SERVER,
    DEFAULT_SPEAKER_PATTERN, DEFAULT_USERNAME,
};
use crate::util::{env_first, is_channel};

/// Top-level configuration, one section per concern.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub irc: IrcConfig,
    pub schedule: ScheduleConfig,
    pub generator: GeneratorConfig,
    pub identity: IdentityConfig,
    pub reconnect: ReconnectConfig,
    pub corpus: CorpusConfig,
}

/// Server, channel, and the identity the bot presents.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct IrcConfig {
    pub server: String,
    pub port: u16,
    pub channel: String,
    /// Desired nickname. The observed one may differ after a nick collision.
    pub nickname: String,
    pub username: String,
    pub realname: String,
}

/// Bounds for the randomized autonomous-emission delay.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub min_time_secs: u64,
    pub max_time_secs: u64,
}

/// How to run the external text generator.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub executable: PathBuf,
    pub corpus: PathBuf,
    /// Per-run deadline in seconds; `0` disables it.
    pub timeout_secs: u64,
    pub max_concurrent: usize,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub regain_interval_secs: u64,
}

/// When a connection counts as dead, and how long to wait before the
/// next one.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_backoff_secs: u64,
    pub max_backoff_secs: u64,
    pub registration_timeout_secs: u64,
    /// Idle time before we PING the server.
    pub ping_interval_secs: u64,
    /// How long the server has to say anything after our PING.
    pub ping_timeout_secs: u64,
}

/// Rules for turning a raw chat log into a generator corpus.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    pub speaker_pattern: String,
    pub exclude_patterns: Vec<String>,
    pub min_tokens: usize,
}

// ── Defaults ─────────────────────────────────────────────────────────

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            port: DEFAULT_PORT,
            channel: DEFAULT_CHANNEL.to_string(),
            nickname: DEFAULT_NICKNAME.to_string(),
            username: DEFAULT_USERNAME.to_string(),
            realname: DEFAULT_REALNAME.to_string(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            min_time_secs: DEFAULT_MIN_TIME_SECS,
            max_time_secs: DEFAULT_MAX_TIME_SECS,
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from(DEFAULT_GENERATOR),
            corpus: PathBuf::from(DEFAULT_CORPUS),
            timeout_secs: DEFAULT_GENERATOR_TIMEOUT_SECS,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            regain_interval_secs: DEFAULT_REGAIN_INTERVAL_SECS,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff_secs: DEFAULT_INITIAL_BACKOFF_SECS,
            max_backoff_secs: DEFAULT_MAX_BACKOFF_SECS,
            registration_timeout_secs: DEFAULT_REGISTRATION_TIMEOUT_SECS,
            ping_interval_secs: DEFAULT_PING_INTERVAL_SECS,
            ping_timeout_secs: DEFAULT_PING_TIMEOUT_SECS,
        }
    }
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            speaker_pattern: DEFAULT_SPEAKER_PATTERN.to_string(),
            exclude_patterns: DEFAULT_EXCLUDE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            min_tokens: DEFAULT_MIN_TOKENS,
        }
    }
}

// ── Derived values ───────────────────────────────────────────────────

impl GeneratorConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl IdentityConfig {
    pub fn regain_interval(&self) -> Duration {
        Duration::from_secs(self.regain_interval_secs)
    }
}

impl ReconnectConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_secs(self.initial_backoff_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    pub fn registration_timeout(&self) -> Duration {
        Duration::from_secs(self.registration_timeout_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }
}

// ── Loading ──────────────────────────────────────────────────────────

/// Where the configuration was loaded from.
#[derive(Clone, Debug)]
pub enum ConfigSource {
    Defaults,
    File(PathBuf),
}

impl ConfigSource {
    pub fn label(&self) -> String {
        match self {
            ConfigSource::Defaults => "built-in defaults".to_string(),
            ConfigSource::File(path) => path.display().to_string(),
        }
    }
}

impl Config {
    /// Locate and parse the configuration.
    ///
    /// Lookup order: `explicit`, `$AUTOCODEX_CONFIG`, `./autocodex.toml`, the
    /// platform config directory, and finally the built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, ConfigSource)> {
        if let Some(path) = explicit {
            return Ok((Self::load_from_path(path)?, ConfigSource::File(path.into())));
        }

        if let Some(path) = env_first(&[CONFIG_PATH_ENV]) {
            let path = PathBuf::from(path);
            return Ok((Self::load_from_path(&path)?, ConfigSource::File(path)));
        }

        let cwd_path = PathBuf::from(CONFIG_FILE_NAME);
        if cwd_path.exists() {
            return Ok((Self::load_from_path(&cwd_path)?, ConfigSource::File(cwd_path)));
        }

        if let Some(config_path) = config_dir_file(CONFIG_FILE_NAME) {
            if config_path.exists() {
                return Ok((
                    Self::load_from_path(&config_path)?,
                    ConfigSource::File(config_path),
                ));
            }
        }

        Ok((Config::default(), ConfigSource::Defaults))
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("read config from {}", path.display()))?;
        let config = toml::from_str(&contents)
            .with_context(|| format!("parse config from {}", path.display()))?;
        Ok(config)
    }

    /// Apply command-line overrides on top of the loaded file.
    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(server) = &overrides.server {
            self.irc.server = server.clone();
        }
        if let Some(port) = overrides.port {
            self.irc.port = port;
        }
        if let Some(channel) = &overrides.channel {
            self.irc.channel = channel.clone();
        }
        if let Some(nickname) = &overrides.nickname {
            self.irc.nickname = nickname.clone();
        }
    }

    /// Check the invariants the rest of the crate relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let schedule = &self.schedule;
        if schedule.min_time_secs > schedule.max_time_secs {
            return Err(ConfigError::InvalidInterval {
                min: schedule.min_time_secs,
                max: schedule.max_time_secs,
            });
        }
        if self.irc.nickname.trim().is_empty() || self.irc.nickname.contains([' ', ':']) {
            return Err(ConfigError::InvalidNickname(self.irc.nickname.clone()));
        }
        if !is_channel(&self.irc.channel) {
            return Err(ConfigError::NotAChannel(self.irc.channel.clone()));
        }
        if self.generator.max_concurrent == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.identity.regain_interval_secs == 0 {
            return Err(ConfigError::ZeroRegainInterval);
        }
        let reconnect = &self.reconnect;
        if reconnect.initial_backoff_secs == 0
            || reconnect.initial_backoff_secs > reconnect.max_backoff_secs
        {
            return Err(ConfigError::InvalidBackoff {
                initial: reconnect.initial_backoff_secs,
                max: reconnect.max_backoff_secs,
            });
        }
        let liveness = [
            ("reconnect.registration_timeout_secs", reconnect.registration_timeout_secs),
            ("reconnect.ping_interval_secs", reconnect.ping_interval_secs),
            ("reconnect.ping_timeout_secs", reconnect.ping_timeout_secs),
        ];
        if let Some((field, _)) = liveness.into_iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigError::ZeroTimeout(field));
        }
        let patterns = std::iter::once(&self.corpus.speaker_pattern)
            .chain(self.corpus.exclude_patterns.iter());
        for pattern in patterns {
            Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

/// Values given on the command line that win over the config file.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub server: Option<String>,
    pub port: Option<u16>,
    pub channel: Option<String>,
    pub nickname: Option<String>,
}

/// A configuration that parsed but cannot be run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("schedule.min_time_secs ({min}) is greater than schedule.max_time_secs ({max})")]
    InvalidInterval { min: u64, max: u64 },
    #[error("invalid nickname: {0:?}")]
    InvalidNickname(String),
    #[error("{0:?} is not a channel name")]
    NotAChannel(String),
    #[error("generator.max_concurrent must be at least 1")]
    ZeroConcurrency,
    #[error("identity.regain_interval_secs must be at least 1")]
    ZeroRegainInterval,
    #[error("invalid reconnect backoff: initial {initial}s, max {max}s")]
    InvalidBackoff { initial: u64, max: u64 },
    #[error("{0} must be at least 1")]
    ZeroTimeout(&'static str),
    #[error("invalid corpus pattern {pattern:?}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

fn config_dir_file(filename: &str) -> Option<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", APP_NAME, APP_NAME)?;
    Some(proj_dirs.config_dir().join(filename))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.irc.nickname, "autocodex");
        assert_eq!(config.irc.channel, "#c++");
        assert_eq!(config.schedule.min_time_secs, 8 * 3600);
        assert_eq!(config.schedule.max_time_secs, 24 * 3600);
        assert_eq!(config.identity.regain_interval(), Duration::from_secs(60));
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[irc]\nnickname = \"wisdombot\"\n\n[schedule]\nmin_time_secs = 10\nmax_time_secs = 20\n"
        )
        .unwrap();

        let config = Config::load_from_path(file.path()).unwrap();
        assert_eq!(config.irc.nickname, "wisdombot");
        assert_eq!(config.irc.server, DEFAULT_SERVER);
        assert_eq!(config.schedule.min_time_secs, 10);
        assert_eq!(config.schedule.max_time_secs, 20);
        assert_eq!(config.generator.corpus, PathBuf::from("filtered.txt"));
    }

    #[test]
    fn explicit_path_wins() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[irc]\nchannel = \"#rust\"").unwrap();

        let (config, source) = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.irc.channel, "#rust");
        assert!(matches!(source, ConfigSource::File(_)));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[irc\nchannel = ").unwrap();
        assert!(Config::load_from_path(file.path()).is_err());
    }

    #[test]
    fn inverted_interval_is_rejected() {
        let mut config = Config::default();
        config.schedule.min_time_secs = 100;
        config.schedule.max_time_secs = 99;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidInterval { min: 100, max: 99 })
        ));
    }

    #[test]
    fn equal_interval_bounds_are_fine() {
        let mut config = Config::default();
        config.schedule.min_time_secs = 0;
        config.schedule.max_time_secs = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn bad_values_are_rejected() {
        let mut config = Config::default();
        config.irc.channel = "c++".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::NotAChannel(_))));

        let mut config = Config::default();
        config.irc.nickname = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidNickname(_))
        ));

        let mut config = Config::default();
        config.generator.max_concurrent = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroConcurrency)));

        let mut config = Config::default();
        config.reconnect.ping_timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroTimeout("reconnect.ping_timeout_secs"))
        ));

        let mut config = Config::default();
        config.corpus.exclude_patterns.push("(".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut config = Config::default();
        config.apply(&Overrides {
            server: Some("localhost".to_string()),
            port: Some(6697),
            channel: None,
            nickname: Some("bot1".to_string()),
        });
        assert_eq!(config.irc.server, "localhost");
        assert_eq!(config.irc.port, 6697);
        assert_eq!(config.irc.channel, "#c++");
        assert_eq!(config.irc.nickname, "bot1");
    }

    #[test]
    fn zero_timeout_disables_deadline() {
        let mut generator = GeneratorConfig::default();
        assert_eq!(generator.timeout(), Some(Duration::from_secs(120)));
        generator.timeout_secs = 0;
        assert_eq!(generator.timeout(), None);
    }
}
