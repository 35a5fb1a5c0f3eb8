use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, de};
use tracing::level_filters::LevelFilter;

/// Controls the log format
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect (pretty for tty, simplified for other)
    Auto,
    /// With colors
    Pretty,
    /// Simplified log output
    Simplified,
    /// Dump out JSON lines
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// The log level.
    #[serde(deserialize_with = "deserialize_level_filter")]
    pub level: LevelFilter,
    /// Controls the log format.
    pub format: LogFormat,
    /// When set to true, backtraces are forced on.
    pub enable_backtraces: bool,
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
            enable_backtraces: true,
        }
    }
}

/// Control the metrics.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Metrics {
    /// host/port of statsd instance
    pub statsd: Option<String>,
    /// The prefix that should be added to all metrics.
    pub prefix: String,
    /// A map containing custom tags and their values.
    ///
    /// These tags will be appended to every metric.
    pub custom_tags: BTreeMap<String, String>,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: env::var("STATSD_SERVER").ok(),
            prefix: "auth_cache".into(),
            custom_tags: BTreeMap::new(),
        }
    }
}

/// Tuning of a single in-memory [`Cacher`](crate::caching::Cacher).
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// How long a successfully resolved value is served from memory.
    ///
    /// Defaults to `5m`.
    #[serde(with = "humantime_serde")]
    pub success_ttl: Duration,

    /// How long an upstream failure is served from memory before the key is retried.
    ///
    /// This is usually much shorter than `success_ttl`, so that a failing key recovers quickly
    /// once the upstream does.
    ///
    /// Defaults to `15s`.
    #[serde(with = "humantime_serde")]
    pub error_ttl: Duration,

    /// The deadline for a single upstream fetch.
    ///
    /// Waiters of a fetch that exceeds it are released with a timeout error, which is not
    /// memoized.
    ///
    /// Defaults to `30s`.
    #[serde(with = "humantime_serde")]
    pub fetch_deadline: Duration,

    /// Maximum number of memoized entries.
    ///
    /// Least recently used entries are evicted once the limit is exceeded. Eviction is a
    /// best-effort process and the limit can be briefly overshot. Running fetches are tracked
    /// separately and never count against it.
    ///
    /// Defaults to unbounded.
    pub capacity: Option<u64>,

    /// How often expired entries are proactively removed.
    ///
    /// Expiry is always checked on access, the sweep only bounds memory usage. `0s` disables the
    /// background sweep.
    ///
    /// Defaults to `1m`.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,

    /// Maximum number of concurrently running upstream fetches.
    ///
    /// Fetches over the limit queue up. Time spent in the queue counts against
    /// `fetch_deadline`.
    ///
    /// Defaults to unlimited.
    pub max_concurrent_fetches: Option<usize>,

    /// Number of independently locked partitions of the in-flight table.
    ///
    /// Defaults to `16`.
    pub shards: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            success_ttl: Duration::from_secs(5 * 60),
            error_ttl: Duration::from_secs(15),
            fetch_deadline: Duration::from_secs(30),
            capacity: None,
            sweep_interval: Duration::from_secs(60),
            max_concurrent_fetches: None,
            shards: 16,
        }
    }
}

/// Configures the upstream `create-or-get` user resolution.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CypressUserManagerConfig {
    /// Whether creating a user that already exists returns the existing object instead of
    /// failing.
    ///
    /// Defaults to `true`.
    pub ignore_existing: bool,
}

impl Default for CypressUserManagerConfig {
    fn default() -> Self {
        Self {
            ignore_existing: true,
        }
    }
}

/// Configures the cache in front of the user resolution.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CachingCypressUserManagerConfig {
    pub cache: CacheConfig,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration for logging.
    pub logging: Logging,

    /// Configuration for reporting metrics to a statsd instance.
    pub metrics: Metrics,

    /// Configuration of the upstream user resolution.
    pub cypress_user_manager: CypressUserManagerConfig,

    /// Configuration of the cache in front of the user resolution.
    pub caching_cypress_user_manager: CachingCypressUserManagerConfig,
}

impl Config {
    pub fn get(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_reader(
                fs::File::open(path).context("failed to open configuration file")?,
            ),
            None => Ok(Config::default()),
        }
    }

    fn from_reader(mut reader: impl std::io::Read) -> Result<Self> {
        let mut config = String::new();
        reader
            .read_to_string(&mut config)
            .context("failed reading config file")?;
        // check for empty files explicitly
        if config.trim().is_empty() {
            anyhow::bail!("config file empty");
        }
        serde_yaml::from_str(&config).context("failed to parse config YAML")
    }
}

#[derive(Debug)]
struct LevelFilterVisitor;

impl de::Visitor<'_> for LevelFilterVisitor {
    type Value = LevelFilter;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> std::fmt::Result {
        write!(
            formatter,
            r#"one of the strings "off", "error", "warn", "info", "debug", or "trace""#
        )
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match v {
            "off" => Ok(LevelFilter::OFF),
            "error" => Ok(LevelFilter::ERROR),
            "warn" => Ok(LevelFilter::WARN),
            "info" => Ok(LevelFilter::INFO),
            "debug" => Ok(LevelFilter::DEBUG),
            "trace" => Ok(LevelFilter::TRACE),
            _ => Err(de::Error::unknown_variant(
                v,
                &["off", "error", "warn", "info", "debug", "trace"],
            )),
        }
    }
}

fn deserialize_level_filter<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<LevelFilter, D::Error> {
    deserializer.deserialize_str(LevelFilterVisitor)
}
