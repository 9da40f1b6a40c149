//! Configuration for the session store.
//!
//! A [`StoreConfig`] can be built in code with the `with_*` methods or
//! loaded from TOML:
//!
//! ```toml
//! validity_secs = 600
//! id_length = 32
//! collision_policy = "reject"
//!
//! [redis]
//! host = "localhost"
//! port = 6379
//! db = 0
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default validity for sessions (30 minutes).
pub const DEFAULT_VALIDITY: Duration = Duration::from_secs(30 * 60);

/// Default length of generated session IDs.
pub const DEFAULT_ID_LENGTH: usize = 50;

/// Longest accepted validity in seconds. Redis rejects `EXPIRE` values whose
/// millisecond form does not fit an `i64`.
pub const MAX_VALIDITY_SECS: u64 = (i64::MAX / 1000) as u64;

/// Environment variable supplying the Redis password when the config omits it.
pub const PASSWORD_ENV: &str = "KVSESSION_REDIS_PASSWORD";

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is outside its allowed range.
    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: String, reason: String },
}

/// What `create` does when a record already exists under the requested ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Fail with [`Error::AlreadyExists`](crate::Error::AlreadyExists).
    #[default]
    Reject,
    /// Delete the existing record and write a fresh one.
    Overwrite,
}

/// Connection settings for a Redis backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            db: 0,
        }
    }
}

impl RedisConfig {
    /// Connection URL in the `redis://[:password@]host:port/db` form.
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

/// Configuration for a [`Store`](crate::Store).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Validity applied to sessions created without an explicit one.
    #[serde(rename = "validity_secs", with = "duration_secs")]
    pub validity: Duration,

    /// Length of IDs produced by the store's ID generator.
    pub id_length: usize,

    /// Behavior of `create` when the ID is already taken.
    pub collision_policy: CollisionPolicy,

    /// Redis connection settings, if a Redis backend is used.
    pub redis: Option<RedisConfig>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            validity: DEFAULT_VALIDITY,
            id_length: DEFAULT_ID_LENGTH,
            collision_policy: CollisionPolicy::default(),
            redis: None,
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from TOML.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the default session validity.
    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    /// Set the length of generated session IDs.
    pub fn with_id_length(mut self, length: usize) -> Self {
        self.id_length = length;
        self
    }

    /// Set the collision policy for `create`.
    pub fn with_collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.collision_policy = policy;
        self
    }

    /// Set the Redis connection settings.
    pub fn with_redis(mut self, redis: RedisConfig) -> Self {
        self.redis = Some(redis);
        self
    }

    /// Check that all values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let secs = self.validity.as_secs();
        if secs == 0 || secs > MAX_VALIDITY_SECS {
            return Err(ConfigError::Invalid {
                field: "validity_secs".to_string(),
                reason: format!("must be between 1 and {} seconds", MAX_VALIDITY_SECS),
            });
        }
        if self.id_length == 0 {
            return Err(ConfigError::Invalid {
                field: "id_length".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Fill in settings supplied through the environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_password_override(std::env::var(PASSWORD_ENV).ok());
    }

    fn apply_password_override(&mut self, password: Option<String>) {
        let Some(password) = password.filter(|p| !p.is_empty()) else {
            return;
        };
        if let Some(redis) = self.redis.as_mut()
            && redis.password.is_none()
        {
            redis.password = Some(password);
        }
    }
}

/// Load a configuration file, applying environment overrides.
pub fn load_config_file(path: &Path) -> Result<StoreConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    let mut config = StoreConfig::from_toml(&contents)?;
    config.apply_env_overrides();
    Ok(config)
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
