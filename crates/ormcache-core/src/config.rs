//! Portal and query cache configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;

/// Configuration for a portal's query cache.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryCacheConfig {
    /// Capacity of the relationship LRU list.
    pub relationship_cache_size: usize,

    /// Capacity of the top-level LRU list.
    pub min_queries_to_keep: usize,

    /// Lifetime of top-level entries. None means entries only leave by
    /// eviction or staleness.
    pub time_to_live: Option<Duration>,

    /// Lifetime of relationship entries.
    pub relationship_time_to_live: Option<Duration>,

    /// Keep every query forever instead of bounding the index.
    pub full_cache: bool,
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        Self {
            relationship_cache_size: 10_000,
            min_queries_to_keep: 32,
            time_to_live: None,
            relationship_time_to_live: None,
            full_cache: false,
        }
    }
}

impl QueryCacheConfig {
    /// An unbounded cache without TTLs.
    pub fn full() -> Self {
        Self {
            full_cache: true,
            ..Default::default()
        }
    }

    /// A bounded cache with the given list capacities.
    pub fn bounded(min_queries_to_keep: usize, relationship_cache_size: usize) -> Self {
        Self {
            min_queries_to_keep,
            relationship_cache_size,
            ..Default::default()
        }
    }

    /// Set the top-level TTL.
    pub fn with_time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live = Some(ttl);
        self
    }

    /// Set the relationship TTL.
    pub fn with_relationship_time_to_live(mut self, ttl: Duration) -> Self {
        self.relationship_time_to_live = Some(ttl);
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.full_cache {
            if self.time_to_live.is_some() {
                return Err(Error::config(
                    "time_to_live",
                    "a full cache never expires entries by time",
                ));
            }
            if self.relationship_time_to_live.is_some() {
                return Err(Error::config(
                    "relationship_time_to_live",
                    "a full cache never expires entries by time",
                ));
            }
            return Ok(());
        }
        if self.min_queries_to_keep == 0 {
            return Err(Error::config("min_queries_to_keep", "must be at least 1"));
        }
        if self.relationship_cache_size == 0 {
            return Err(Error::config("relationship_cache_size", "must be at least 1"));
        }
        if self.time_to_live.is_some_and(|d| d.is_zero()) {
            return Err(Error::config("time_to_live", "must be positive"));
        }
        if self.relationship_time_to_live.is_some_and(|d| d.is_zero()) {
            return Err(Error::config("relationship_time_to_live", "must be positive"));
        }
        Ok(())
    }
}

/// Configuration for one entity type's portal.
#[derive(Debug, Clone, PartialEq)]
pub struct PortalConfig {
    /// Entity type name, used for the per-class update counter and the store.
    pub entity: String,

    pub query_cache: QueryCacheConfig,

    /// Temporary portal: results carry no staleness snapshot and are never
    /// cached.
    pub unmanaged: bool,
}

impl PortalConfig {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            query_cache: QueryCacheConfig::default(),
            unmanaged: false,
        }
    }

    pub fn with_query_cache(mut self, query_cache: QueryCacheConfig) -> Self {
        self.query_cache = query_cache;
        self
    }

    /// Mark the portal as temporary.
    pub fn unmanaged(mut self) -> Self {
        self.unmanaged = true;
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.entity.trim().is_empty() {
            return Err(Error::config("entity", "must not be empty"));
        }
        if self.unmanaged && self.query_cache.full_cache {
            return Err(Error::config(
                "full_cache",
                "an unmanaged portal never caches results",
            ));
        }
        self.query_cache.validate()
    }

    /// Parse and validate a JSON document. Durations are in milliseconds.
    ///
    /// ```json
    /// {
    ///   "entity": "Order",
    ///   "query_cache": { "min_queries_to_keep": 64, "time_to_live_ms": 30000 }
    /// }
    /// ```
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let raw: RawPortalConfig = serde_json::from_str(json)?;
        let config = PortalConfig::from(raw);
        config.validate()?;
        Ok(config)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPortalConfig {
    entity: String,
    #[serde(default)]
    query_cache: RawQueryCacheConfig,
    #[serde(default)]
    unmanaged: bool,
}

#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawQueryCacheConfig {
    relationship_cache_size: usize,
    min_queries_to_keep: usize,
    time_to_live_ms: Option<u64>,
    relationship_time_to_live_ms: Option<u64>,
    full_cache: bool,
}

impl Default for RawQueryCacheConfig {
    fn default() -> Self {
        let defaults = QueryCacheConfig::default();
        Self {
            relationship_cache_size: defaults.relationship_cache_size,
            min_queries_to_keep: defaults.min_queries_to_keep,
            time_to_live_ms: None,
            relationship_time_to_live_ms: None,
            full_cache: defaults.full_cache,
        }
    }
}

impl From<RawPortalConfig> for PortalConfig {
    fn from(raw: RawPortalConfig) -> Self {
        let cache = raw.query_cache;
        Self {
            entity: raw.entity,
            query_cache: QueryCacheConfig {
                relationship_cache_size: cache.relationship_cache_size,
                min_queries_to_keep: cache.min_queries_to_keep,
                time_to_live: cache.time_to_live_ms.map(Duration::from_millis),
                relationship_time_to_live: cache
                    .relationship_time_to_live_ms
                    .map(Duration::from_millis),
                full_cache: cache.full_cache,
            },
            unmanaged: raw.unmanaged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PortalConfig::new("Order");
        assert!(config.validate().is_ok());
        assert_eq!(config.query_cache.min_queries_to_keep, 32);
        assert_eq!(config.query_cache.relationship_cache_size, 10_000);
        assert!(!config.query_cache.full_cache);
    }

    #[test]
    fn test_validation_errors() {
        let err = PortalConfig::new("").validate().unwrap_err();
        assert!(matches!(err, Error::Config { field: "entity", .. }));

        let bounded = QueryCacheConfig::bounded(0, 10);
        assert!(matches!(
            bounded.validate(),
            Err(Error::Config { field: "min_queries_to_keep", .. })
        ));

        let full = QueryCacheConfig::full().with_time_to_live(Duration::from_secs(1));
        assert!(matches!(
            full.validate(),
            Err(Error::Config { field: "time_to_live", .. })
        ));

        let unmanaged_full = PortalConfig::new("Order")
            .with_query_cache(QueryCacheConfig::full())
            .unmanaged();
        assert!(unmanaged_full.validate().is_err());

        let zero_ttl = QueryCacheConfig::default().with_time_to_live(Duration::ZERO);
        assert!(zero_ttl.validate().is_err());
    }

    #[test]
    fn test_from_json() {
        let config = PortalConfig::from_json(
            r#"{
                "entity": "Order",
                "query_cache": { "min_queries_to_keep": 64, "time_to_live_ms": 30000 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.entity, "Order");
        assert_eq!(config.query_cache.min_queries_to_keep, 64);
        assert_eq!(config.query_cache.relationship_cache_size, 10_000);
        assert_eq!(config.query_cache.time_to_live, Some(Duration::from_secs(30)));
        assert!(!config.unmanaged);
    }

    #[test]
    fn test_from_json_rejects_bad_input() {
        assert!(matches!(
            PortalConfig::from_json(r#"{ "entity": "Order", "bogus": 1 }"#),
            Err(Error::ConfigParse(_))
        ));
        let full_with_ttl = r#"{
            "entity": "Order",
            "query_cache": { "full_cache": true, "time_to_live_ms": 5 }
        }"#;
        assert!(matches!(
            PortalConfig::from_json(full_with_ttl),
            Err(Error::Config { .. })
        ));
    }
}
