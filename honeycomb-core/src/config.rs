//! Configuration types

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ConfigError, HoneycombResult};

pub const DEFAULT_MAX_AGE_MS: u64 = 300_000;
pub const DEFAULT_BACKGROUND_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_MAX_DEPTH: u32 = 3;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_SYNC_MAX_RETRIES: u32 = 3;
pub const DEFAULT_SYNC_RETRY_DELAY_MS: u64 = 1_000;
pub const DEFAULT_RECENT_REGION_WINDOW_MS: u64 = 60_000;

/// Cache behaviour, held inside the cache state itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Regions older than this are stale.
    pub max_age_ms: u64,
    /// Apply edits locally before the server confirms them.
    pub optimistic_enabled: bool,
    /// Depth requested when a caller does not name one.
    pub max_depth: u32,
    /// Upper bound on any single service call.
    pub request_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age_ms: DEFAULT_MAX_AGE_MS,
            optimistic_enabled: true,
            max_depth: DEFAULT_MAX_DEPTH,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl CacheConfig {
    pub fn with_max_age_ms(mut self, max_age_ms: u64) -> Self {
        self.max_age_ms = max_age_ms;
        self
    }

    pub fn with_optimistic(mut self, enabled: bool) -> Self {
        self.optimistic_enabled = enabled;
        self
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_request_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = timeout_ms;
        self
    }

    /// Return a copy with every `Some` field of `patch` applied.
    pub fn merged(&self, patch: &CacheConfigPatch) -> Self {
        Self {
            max_age_ms: patch.max_age_ms.unwrap_or(self.max_age_ms),
            optimistic_enabled: patch.optimistic_enabled.unwrap_or(self.optimistic_enabled),
            max_depth: patch.max_depth.unwrap_or(self.max_depth),
            request_timeout_ms: patch.request_timeout_ms.unwrap_or(self.request_timeout_ms),
        }
    }

    pub fn validate(&self) -> HoneycombResult<()> {
        if self.max_depth == 0 {
            return Err(invalid("cache.max_depth", self.max_depth, "must be > 0"));
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid(
                "cache.request_timeout_ms",
                self.request_timeout_ms,
                "must be > 0",
            ));
        }
        Ok(())
    }
}

/// Partial update of [`CacheConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheConfigPatch {
    pub max_age_ms: Option<u64>,
    pub optimistic_enabled: Option<bool>,
    pub max_depth: Option<u32>,
    pub request_timeout_ms: Option<u64>,
}

/// Background sync behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    pub enabled: bool,
    /// Delay between periodic ticks; the only background interval.
    pub interval_ms: u64,
    /// Retries after a failed attempt before waiting for the next tick.
    pub max_retries: u32,
    /// Base of the exponential retry backoff.
    pub retry_delay_ms: u64,
    /// Optional reachability probe, checked with a HEAD request.
    pub online_check_url: Option<String>,
    pub sync_on_visibility_change: bool,
    pub sync_on_reconnect: bool,
    /// Regions loaded within this window are refreshed by each sync.
    pub recent_region_window_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: DEFAULT_BACKGROUND_INTERVAL_MS,
            max_retries: DEFAULT_SYNC_MAX_RETRIES,
            retry_delay_ms: DEFAULT_SYNC_RETRY_DELAY_MS,
            online_check_url: None,
            sync_on_visibility_change: true,
            sync_on_reconnect: true,
            recent_region_window_ms: DEFAULT_RECENT_REGION_WINDOW_MS,
        }
    }
}

impl SyncConfig {
    /// Backoff before retry number `attempt` (1-based).
    pub fn retry_delay_for(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(20);
        self.retry_delay_ms.saturating_mul(1u64 << exponent)
    }

    pub fn merged(&self, patch: &SyncConfigPatch) -> Self {
        Self {
            enabled: patch.enabled.unwrap_or(self.enabled),
            interval_ms: patch.interval_ms.unwrap_or(self.interval_ms),
            max_retries: patch.max_retries.unwrap_or(self.max_retries),
            retry_delay_ms: patch.retry_delay_ms.unwrap_or(self.retry_delay_ms),
            online_check_url: match &patch.online_check_url {
                Some(url) => url.clone(),
                None => self.online_check_url.clone(),
            },
            sync_on_visibility_change: patch
                .sync_on_visibility_change
                .unwrap_or(self.sync_on_visibility_change),
            sync_on_reconnect: patch.sync_on_reconnect.unwrap_or(self.sync_on_reconnect),
            recent_region_window_ms: patch
                .recent_region_window_ms
                .unwrap_or(self.recent_region_window_ms),
        }
    }

    pub fn validate(&self) -> HoneycombResult<()> {
        if self.interval_ms == 0 {
            return Err(invalid("sync.interval_ms", self.interval_ms, "must be > 0"));
        }
        if self.retry_delay_ms == 0 {
            return Err(invalid(
                "sync.retry_delay_ms",
                self.retry_delay_ms,
                "must be > 0",
            ));
        }
        if let Some(url) = &self.online_check_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(invalid(
                    "sync.online_check_url",
                    url,
                    "must be an http(s) URL",
                ));
            }
        }
        Ok(())
    }
}

/// Partial update of [`SyncConfig`].
///
/// `online_check_url` is doubly optional: `Some(None)` clears the probe.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncConfigPatch {
    pub enabled: Option<bool>,
    pub interval_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub online_check_url: Option<Option<String>>,
    pub sync_on_visibility_change: Option<bool>,
    pub sync_on_reconnect: Option<bool>,
    pub recent_region_window_ms: Option<u64>,
}

/// Top-level configuration file layout.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HoneycombConfig {
    pub cache: CacheConfig,
    pub sync: SyncConfig,
}

impl HoneycombConfig {
    /// Load and validate a TOML file.
    pub fn from_path(path: &Path) -> HoneycombResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config = Self::from_toml_str(&contents)?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> HoneycombResult<Self> {
        let config: HoneycombConfig = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `HONEYCOMB_MAX_AGE_MS` (default: 300000)
    /// - `HONEYCOMB_BACKGROUND_INTERVAL_MS` (default: 30000)
    /// - `HONEYCOMB_OPTIMISTIC` (default: true)
    /// - `HONEYCOMB_MAX_DEPTH` (default: 3)
    /// - `HONEYCOMB_REQUEST_TIMEOUT_MS` (default: 10000)
    /// - `HONEYCOMB_SYNC_ENABLED` (default: true)
    /// - `HONEYCOMB_SYNC_MAX_RETRIES` (default: 3)
    /// - `HONEYCOMB_SYNC_RETRY_DELAY_MS` (default: 1000)
    /// - `HONEYCOMB_SYNC_ONLINE_CHECK_URL` (default: unset)
    /// - `HONEYCOMB_SYNC_ON_VISIBILITY_CHANGE` (default: true)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`HoneycombConfig::from_env`] with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let cache_defaults = CacheConfig::default();
        let sync_defaults = SyncConfig::default();

        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());
        let flag = |key: &str| {
            lookup(key).map(|s| matches!(s.trim(), "1" | "true" | "TRUE" | "yes"))
        };

        Self {
            cache: CacheConfig {
                max_age_ms: parsed("HONEYCOMB_MAX_AGE_MS").unwrap_or(cache_defaults.max_age_ms),
                optimistic_enabled: flag("HONEYCOMB_OPTIMISTIC")
                    .unwrap_or(cache_defaults.optimistic_enabled),
                max_depth: lookup("HONEYCOMB_MAX_DEPTH")
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(cache_defaults.max_depth),
                request_timeout_ms: parsed("HONEYCOMB_REQUEST_TIMEOUT_MS")
                    .unwrap_or(cache_defaults.request_timeout_ms),
            },
            sync: SyncConfig {
                enabled: flag("HONEYCOMB_SYNC_ENABLED").unwrap_or(sync_defaults.enabled),
                interval_ms: parsed("HONEYCOMB_BACKGROUND_INTERVAL_MS")
                    .unwrap_or(sync_defaults.interval_ms),
                max_retries: lookup("HONEYCOMB_SYNC_MAX_RETRIES")
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(sync_defaults.max_retries),
                retry_delay_ms: parsed("HONEYCOMB_SYNC_RETRY_DELAY_MS")
                    .unwrap_or(sync_defaults.retry_delay_ms),
                online_check_url: lookup("HONEYCOMB_SYNC_ONLINE_CHECK_URL")
                    .filter(|s| !s.trim().is_empty()),
                sync_on_visibility_change: flag("HONEYCOMB_SYNC_ON_VISIBILITY_CHANGE")
                    .unwrap_or(sync_defaults.sync_on_visibility_change),
                ..sync_defaults
            },
        }
    }

    pub fn validate(&self) -> HoneycombResult<()> {
        self.cache.validate()?;
        self.sync.validate()?;
        Ok(())
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> crate::error::HoneycombError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HoneycombError;
    use std::collections::HashMap;

    #[test]
    fn test_cache_config_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.max_age_ms, 300_000);
        assert!(config.optimistic_enabled);
        assert_eq!(config.max_depth, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cache_config_merge_keeps_unset_fields() {
        let config = CacheConfig::default();
        let merged = config.merged(&CacheConfigPatch {
            optimistic_enabled: Some(false),
            max_depth: Some(5),
            ..Default::default()
        });
        assert!(!merged.optimistic_enabled);
        assert_eq!(merged.max_depth, 5);
        assert_eq!(merged.max_age_ms, config.max_age_ms);
    }

    #[test]
    fn test_cache_config_rejects_zero_depth() {
        let config = CacheConfig::default().with_max_depth(0);
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            HoneycombError::Config(ConfigError::InvalidValue { ref field, .. }) if field == "cache.max_depth"
        ));
    }

    #[test]
    fn test_retry_delay_is_exponential() {
        let config = SyncConfig {
            retry_delay_ms: 100,
            ..Default::default()
        };
        assert_eq!(config.retry_delay_for(1), 100);
        assert_eq!(config.retry_delay_for(2), 200);
        assert_eq!(config.retry_delay_for(3), 400);
        assert_eq!(config.retry_delay_for(0), 100);
    }

    #[test]
    fn test_sync_config_patch_clears_url() {
        let config = SyncConfig {
            online_check_url: Some("https://example.com/ping".to_string()),
            ..Default::default()
        };
        let cleared = config.merged(&SyncConfigPatch {
            online_check_url: Some(None),
            ..Default::default()
        });
        assert_eq!(cleared.online_check_url, None);

        let untouched = config.merged(&SyncConfigPatch::default());
        assert_eq!(untouched, config);
    }

    #[test]
    fn test_sync_config_rejects_non_http_url() {
        let config = SyncConfig {
            online_check_url: Some("ftp://example.com".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_str_partial() {
        let config = HoneycombConfig::from_toml_str(
            r#"
            [cache]
            max_age_ms = 1000
            optimistic_enabled = false

            [sync]
            max_retries = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.cache.max_age_ms, 1000);
        assert!(!config.cache.optimistic_enabled);
        assert_eq!(config.cache.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(config.sync.max_retries, 5);
    }

    #[test]
    fn test_from_toml_str_rejects_unknown_fields() {
        let err = HoneycombConfig::from_toml_str("[cache]\nmax_age = 3\n").unwrap_err();
        assert!(matches!(err, HoneycombError::Config(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_background_interval_lives_under_sync() {
        let err =
            HoneycombConfig::from_toml_str("[cache]\nbackground_interval_ms = 1000\n").unwrap_err();
        assert!(matches!(err, HoneycombError::Config(ConfigError::Parse { .. })));

        let config = HoneycombConfig::default();
        assert_eq!(config.sync.interval_ms, DEFAULT_BACKGROUND_INTERVAL_MS);
    }

    #[test]
    fn test_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("honeycomb.toml");
        std::fs::write(&path, "[sync]\ninterval_ms = 500\n").unwrap();
        let config = HoneycombConfig::from_path(&path).unwrap();
        assert_eq!(config.sync.interval_ms, 500);

        let missing = HoneycombConfig::from_path(&dir.path().join("missing.toml"));
        assert!(matches!(
            missing,
            Err(HoneycombError::Config(ConfigError::Io { .. }))
        ));
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = HoneycombConfig::from_lookup(|_| None);
        assert_eq!(config, HoneycombConfig::default());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("HONEYCOMB_MAX_AGE_MS", "1500"),
            ("HONEYCOMB_OPTIMISTIC", "false"),
            ("HONEYCOMB_BACKGROUND_INTERVAL_MS", "2000"),
            ("HONEYCOMB_SYNC_ONLINE_CHECK_URL", "https://example.com/health"),
            ("HONEYCOMB_MAX_DEPTH", "not-a-number"),
        ]
        .into_iter()
        .collect();
        let config = HoneycombConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.cache.max_age_ms, 1500);
        assert!(!config.cache.optimistic_enabled);
        assert_eq!(config.cache.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(config.sync.interval_ms, 2000);
        assert_eq!(
            config.sync.online_check_url.as_deref(),
            Some("https://example.com/health")
        );
    }
}
