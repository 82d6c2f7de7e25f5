//! Layer configuration.
//!
//! A [`FetchConfig`] is read once (defaults, then a YAML file, then
//! `RESILIENT_FETCH_*` environment variables) and handed to
//! [`ResilientFetchBuilder`](crate::client::ResilientFetchBuilder). Nothing
//! else in the crate reads the environment.
//!
//! ```rust
//! use resilient_fetch::config::FetchConfig;
//!
//! let config = FetchConfig::from_yaml_str(
//!     r#"
//! cache:
//!   max_entries: 50
//!   ttl_overrides_ms:
//!     search: 1000
//! retry:
//!   max_retries: 5
//! "#,
//! )
//! .unwrap();
//! assert_eq!(config.cache.max_entries, 50);
//! assert_eq!(config.retry.max_retries, 5);
//! assert_eq!(config.circuit_breaker.failure_threshold, 5);
//! ```

use crate::cache::{CacheConfig, ResourceType};
use crate::dedup::DedupConfig;
use crate::resilience::{CircuitBreakerConfig, RetryConfig};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_PREFIX: &str = "RESILIENT_FETCH_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Emit structured diagnostic events to stderr.
    pub verbose: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub cache: CacheConfig,
    pub dedup: DedupConfig,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub diagnostics: DiagnosticsConfig,
}

impl FetchConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid configuration: {}", e),
                ErrorContext::new().with_source("config"),
            )
        })
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_context(
                format!("cannot read {}: {}", path.display(), e),
                ErrorContext::new().with_source("config"),
            )
        })?;
        Self::from_yaml_str(&text)
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_vars(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Overlay `RESILIENT_FETCH_*` variables resolved through `lookup`.
    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |suffix: &str| {
            let name = format!("{}{}", ENV_PREFIX, suffix);
            lookup(&name).map(|value| (name, value))
        };

        if let Some((n, v)) = var("CACHE_ENABLED") {
            self.cache.enabled = parse_bool(&n, &v)?;
        }
        if let Some((n, v)) = var("CACHE_TTL_MS") {
            self.cache.default_ttl = Some(Duration::from_millis(parse(&n, &v)?));
        }
        if let Some((n, v)) = var("CACHE_MAX_ENTRIES") {
            self.cache.max_entries = parse(&n, &v)?;
        }
        if let Some((n, v)) = var("CACHE_SWEEP_PROBABILITY") {
            self.cache.sweep_probability = parse(&n, &v)?;
        }
        if let Some((n, v)) = var("CACHE_PERSISTENT") {
            self.cache.persistent.enabled = parse_bool(&n, &v)?;
        }
        if let Some((_, v)) = var("CACHE_DIR") {
            self.cache.persistent.directory = Some(v.into());
        }
        for resource in ResourceType::ALL {
            let suffix = format!("CACHE_TTL_{}_MS", resource.as_str().to_ascii_uppercase());
            if let Some((n, v)) = var(suffix.as_str()) {
                self.cache
                    .ttl_overrides
                    .insert(resource, Duration::from_millis(parse(&n, &v)?));
            }
        }

        if let Some((n, v)) = var("DEDUP_ENABLED") {
            self.dedup.enabled = parse_bool(&n, &v)?;
        }

        if let Some((n, v)) = var("MAX_RETRIES") {
            self.retry.max_retries = parse(&n, &v)?;
        }
        if let Some((n, v)) = var("BASE_DELAY_MS") {
            self.retry.base_delay = Duration::from_millis(parse(&n, &v)?);
        }
        if let Some((n, v)) = var("MAX_DELAY_MS") {
            self.retry.max_delay = Duration::from_millis(parse(&n, &v)?);
        }
        if let Some((n, v)) = var("EXPONENTIAL_BASE") {
            self.retry.exponential_base = parse(&n, &v)?;
        }
        if let Some((n, v)) = var("JITTER_FACTOR") {
            self.retry.jitter_factor = parse(&n, &v)?;
        }

        if let Some((n, v)) = var("CB_FAILURE_THRESHOLD") {
            self.circuit_breaker.failure_threshold = parse(&n, &v)?;
        }
        if let Some((n, v)) = var("CB_SUCCESS_THRESHOLD") {
            self.circuit_breaker.success_threshold = parse(&n, &v)?;
        }
        if let Some((n, v)) = var("CB_TIMEOUT_MS") {
            self.circuit_breaker.timeout = Duration::from_millis(parse(&n, &v)?);
        }

        if let Some((n, v)) = var("VERBOSE") {
            self.diagnostics.verbose = parse_bool(&n, &v)?;
        }
        Ok(())
    }

    /// Reject values the components cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.cache.max_entries == 0 {
            return Err(invalid("cache.max_entries", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.cache.sweep_probability) {
            return Err(invalid("cache.sweep_probability", "must be within [0, 1]"));
        }
        if self.cache.default_ttl.is_some_and(|t| t.is_zero()) {
            return Err(invalid("cache.default_ttl_ms", "must be greater than 0"));
        }
        if let Some((resource, _)) = self.cache.ttl_overrides.iter().find(|(_, t)| t.is_zero()) {
            return Err(invalid(
                &format!("cache.ttl_overrides_ms.{}", resource),
                "must be greater than 0",
            ));
        }
        if self.retry.exponential_base < 1.0 {
            return Err(invalid("retry.exponential_base", "must be >= 1.0"));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(invalid("retry.jitter_factor", "must be within [0, 1]"));
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err(invalid("retry.base_delay_ms", "must not exceed retry.max_delay_ms"));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(invalid("circuit_breaker.failure_threshold", "must be at least 1"));
        }
        if self.circuit_breaker.success_threshold == 0 {
            return Err(invalid("circuit_breaker.success_threshold", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &str, details: &str) -> Error {
    Error::configuration_with_context(
        format!("invalid value for {}", field),
        ErrorContext::new()
            .with_field_path(field)
            .with_details(details)
            .with_source("config"),
    )
}

fn parse<T: FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| {
        Error::configuration_with_context(
            format!("cannot parse '{}'", value),
            ErrorContext::new()
                .with_field_path(name)
                .with_details(e.to_string())
                .with_source("config"),
        )
    })
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::configuration_with_context(
            format!("cannot parse '{}' as a boolean", value),
            ErrorContext::new()
                .with_field_path(name)
                .with_source("config"),
        )),
    }
}

/// `Duration` as integer milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// `Option<Duration>` as optional integer milliseconds.
pub mod duration_ms_opt {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        d: &Option<Duration>,
        s: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        d.map(|d| d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> std::result::Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|ms| ms.map(Duration::from_millis))
    }
}

/// `HashMap<ResourceType, Duration>` as a map of integer milliseconds.
pub mod duration_ms_map {
    use crate::cache::ResourceType;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::{BTreeMap, HashMap};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        map: &HashMap<ResourceType, Duration>,
        s: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        map.iter()
            .map(|(k, v)| (*k, v.as_millis() as u64))
            .collect::<BTreeMap<_, _>>()
            .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> std::result::Result<HashMap<ResourceType, Duration>, D::Error> {
        let raw = HashMap::<ResourceType, u64>::deserialize(d)?;
        Ok(raw
            .into_iter()
            .map(|(k, v)| (k, Duration::from_millis(v)))
            .collect())
    }
}
