use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

pub use config::ConfigError;

use crate::jobs::DEFAULT_CAPACITY;

/// Load any deserializable struct from environment variables.
///
/// A `.env` file in the working directory is loaded first when present.
/// Variable names are matched case-insensitively against field names, so
/// `QUEUE_CAPACITY` fills `queue_capacity`.
pub trait EnvConfig: Sized {
    fn from_env() -> Result<Self, ConfigError>;
    fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError>;
}

impl<D> EnvConfig for D
where
    D: DeserializeOwned,
{
    fn from_env() -> Result<Self, ConfigError> {
        load(config::Environment::default())
    }

    fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        load(config::Environment::with_prefix(prefix))
    }
}

fn load<D: DeserializeOwned>(source: config::Environment) -> Result<D, ConfigError> {
    dotenvy::dotenv().ok();

    config::Config::builder()
        .add_source(source)
        .build()?
        .try_deserialize()
}

/// Dispatcher settings, read from `DISPATCH_*` variables.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `DISPATCH_QUEUE_CAPACITY` | 100 | Jobs queued before `submit` waits |
/// | `DISPATCH_DRAIN_TIMEOUT_SECS` | unset | Upper bound on waiting for in-flight work at shutdown |
#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default)]
    pub drain_timeout_secs: Option<u64>,
}

fn default_queue_capacity() -> usize {
    DEFAULT_CAPACITY
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_CAPACITY,
            drain_timeout_secs: None,
        }
    }
}

impl DispatcherConfig {
    pub const ENV_PREFIX: &'static str = "DISPATCH";

    /// Read `DISPATCH_*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_env_with_prefix(Self::ENV_PREFIX)
    }

    pub fn drain_timeout(&self) -> Option<Duration> {
        self.drain_timeout_secs.map(Duration::from_secs)
    }
}
