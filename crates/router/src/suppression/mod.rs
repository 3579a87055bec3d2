//! Dynamic suppression: per-(text, destination) lookups against a shared
//! store of ignore patterns.
//!
//! Operators add patterns to a set keyed by `<sender prefix><receiver>`.
//! Before every delivery the sender asks each dynamic filter whether the
//! rendered text matches any pattern for that key, and skips the receiver
//! if one does.
//!
//! # Layers
//!
//! - [`SuppressionStore`]: set-valued key lookup (Redis in production)
//! - [`PatternFilter`]: a [`DynamicFilter`] that matches the stored
//!   patterns in a configurable [`MatchMode`]
//! - [`DynDynamicFilter`]: dyn-compatible form used by handlers

mod redis_store;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use regex::Regex;
use serde::Deserialize;

use critical_core::ComponentSpec;

use crate::BoxFuture;
use crate::error::RouterError;

pub use self::redis_store::RedisStore;

/// Set store holding ignore patterns per destination key.
pub trait SuppressionStore: Send + Sync + 'static {
    /// Opens the connection. Calling it twice is harmless.
    fn connect(&mut self) -> impl Future<Output = Result<(), RouterError>> + Send;

    /// Releases the connection. Safe without a prior `connect`.
    fn disconnect(&mut self) -> impl Future<Output = Result<(), RouterError>> + Send;

    /// All patterns stored under `key`; empty if the key does not exist.
    fn members(&self, key: &str) -> impl Future<Output = Result<Vec<String>, RouterError>> + Send;

    /// Adds `pattern` to `key`; `true` if it was not present yet.
    fn add(&self, key: &str, pattern: &str)
    -> impl Future<Output = Result<bool, RouterError>> + Send;

    /// Removes `pattern` from `key`; `true` if it was present.
    fn remove(
        &self,
        key: &str,
        pattern: &str,
    ) -> impl Future<Output = Result<bool, RouterError>> + Send;
}

/// Per-destination suppression check.
pub trait DynamicFilter: Send + Sync {
    fn name(&self) -> &str;

    fn start(&mut self) -> impl Future<Output = Result<(), RouterError>> + Send;

    fn stop(&mut self) -> impl Future<Output = Result<(), RouterError>> + Send;

    /// `true` if the destination identified by `key` must not receive `text`.
    fn suppress(
        &self,
        text: &str,
        key: &str,
    ) -> impl Future<Output = Result<bool, RouterError>> + Send;
}

/// Dyn-compatible companion of [`DynamicFilter`].
///
/// Implemented for every `DynamicFilter`, so handlers can keep
/// heterogeneous lists of `Box<dyn DynDynamicFilter>`.
pub trait DynDynamicFilter: Send + Sync {
    fn name(&self) -> &str;

    fn start(&mut self) -> BoxFuture<'_, Result<(), RouterError>>;

    fn stop(&mut self) -> BoxFuture<'_, Result<(), RouterError>>;

    fn suppress<'a>(&'a self, text: &'a str, key: &'a str)
    -> BoxFuture<'a, Result<bool, RouterError>>;
}

impl<T: DynamicFilter> DynDynamicFilter for T {
    fn name(&self) -> &str {
        DynamicFilter::name(self)
    }

    fn start(&mut self) -> BoxFuture<'_, Result<(), RouterError>> {
        Box::pin(DynamicFilter::start(self))
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), RouterError>> {
        Box::pin(DynamicFilter::stop(self))
    }

    fn suppress<'a>(
        &'a self,
        text: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, Result<bool, RouterError>> {
        Box::pin(DynamicFilter::suppress(self, text, key))
    }
}

/// How stored patterns are compared against the rendered text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Plain substring containment.
    Substring,
    /// Regular expression search. Patterns that fail to compile fall back
    /// to substring containment of the literal pattern.
    Regex,
}

/// Compiled regexes kept across lookups before the cache is reset.
const MAX_COMPILED_PATTERNS: usize = 1024;

/// Matches stored patterns against rendered text in one [`MatchMode`].
///
/// Regex patterns are compiled once and reused across lookups; patterns
/// that fail to compile are remembered as substring patterns.
#[derive(Debug)]
pub struct PatternMatcher {
    mode: MatchMode,
    compiled: Mutex<HashMap<String, Option<Regex>>>,
}

impl PatternMatcher {
    pub fn new(mode: MatchMode) -> Self {
        Self {
            mode,
            compiled: Mutex::new(HashMap::new()),
        }
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Whether any of `patterns` matches `text`.
    pub fn matches_any(&self, patterns: &[String], text: &str) -> bool {
        patterns.iter().any(|pattern| match self.mode {
            MatchMode::Substring => text.contains(pattern.as_str()),
            MatchMode::Regex => match self.regex(pattern) {
                Some(re) => re.is_match(text),
                None => text.contains(pattern.as_str()),
            },
        })
    }

    /// Compiled form of `pattern`, `None` if it is not a valid regex.
    fn regex(&self, pattern: &str) -> Option<Regex> {
        let mut compiled = self
            .compiled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(entry) = compiled.get(pattern) {
            return entry.clone();
        }

        let entry = match Regex::new(pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::debug!(pattern = %pattern, error = %e, "invalid suppression regex, using substring match");
                None
            }
        };
        if compiled.len() >= MAX_COMPILED_PATTERNS {
            compiled.clear();
        }
        compiled.insert(pattern.to_owned(), entry.clone());
        entry
    }

    #[cfg(test)]
    fn compiled_count(&self) -> usize {
        self.compiled.lock().map(|c| c.len()).unwrap_or(0)
    }
}

/// Dynamic filter backed by a [`SuppressionStore`].
#[derive(Debug)]
pub struct PatternFilter<S> {
    name: String,
    store: S,
    matcher: PatternMatcher,
}

impl<S: SuppressionStore> PatternFilter<S> {
    pub fn new(name: impl Into<String>, store: S, mode: MatchMode) -> Self {
        Self {
            name: name.into(),
            store,
            matcher: PatternMatcher::new(mode),
        }
    }

    pub fn mode(&self) -> MatchMode {
        self.matcher.mode()
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: SuppressionStore> DynamicFilter for PatternFilter<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&mut self) -> Result<(), RouterError> {
        self.store.connect().await?;
        tracing::info!(filter = %self.name, "dynamic filter started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), RouterError> {
        self.store.disconnect().await?;
        tracing::info!(filter = %self.name, "dynamic filter stopped");
        Ok(())
    }

    async fn suppress(&self, text: &str, key: &str) -> Result<bool, RouterError> {
        let patterns = self.store.members(key).await?;
        Ok(self.matcher.matches_any(&patterns, text))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RedisFilterParams {
    host: String,
    #[serde(default = "default_redis_port")]
    port: u16,
    #[serde(default)]
    db: i64,
}

fn default_redis_port() -> u16 {
    6379
}

/// Registry kind for substring matching against Redis sets.
pub const REDIS_EXCLUDE_PATTERN: &str = "redis_exclude_pattern";

/// Registry kind for regex matching against Redis sets.
pub const REDIS_EXCLUDE_REGEXP: &str = "redis_exclude_regexp";

impl PatternFilter<RedisStore> {
    /// Builds a Redis-backed filter from a `redis_exclude_*` spec.
    pub fn from_spec(spec: &ComponentSpec) -> Result<Self, RouterError> {
        let mode = match spec.kind.as_str() {
            REDIS_EXCLUDE_PATTERN => MatchMode::Substring,
            REDIS_EXCLUDE_REGEXP => MatchMode::Regex,
            other => {
                return Err(RouterError::invalid(
                    "kind",
                    format!("'{other}' is not a redis dynamic filter"),
                ));
            }
        };
        let params: RedisFilterParams = spec.params()?;
        let store = RedisStore::new(&params.host, params.port, params.db);
        let name = format!("{}@{}:{}/{}", spec.kind, params.host, params.port, params.db);
        Ok(Self::new(name, store, mode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryStore;

    fn patterns(p: &[&str]) -> Vec<String> {
        p.iter().map(|s| (*s).to_owned()).collect()
    }

    fn matches_any(patterns: &[String], text: &str, mode: MatchMode) -> bool {
        PatternMatcher::new(mode).matches_any(patterns, text)
    }

    #[test]
    fn substring_mode() {
        let p = patterns(&["disk", "cron"]);
        assert!(matches_any(&p, "disk full", MatchMode::Substring));
        assert!(!matches_any(&p, "link down", MatchMode::Substring));
        assert!(!matches_any(&[], "anything", MatchMode::Substring));
    }

    #[test]
    fn regex_mode_searches() {
        let p = patterns(&[r"^eth\d+: link down$"]);
        assert!(matches_any(&p, "eth0: link down", MatchMode::Regex));
        assert!(!matches_any(&p, "eth0: link down twice", MatchMode::Regex));
    }

    #[test]
    fn substring_mode_treats_metacharacters_literally() {
        let p = patterns(&["a.c"]);
        assert!(!matches_any(&p, "abc", MatchMode::Substring));
        assert!(matches_any(&p, "a.c", MatchMode::Regex));
    }

    #[test]
    fn invalid_regex_falls_back_to_substring() {
        let p = patterns(&["(unclosed"]);
        assert!(matches_any(&p, "log: (unclosed paren", MatchMode::Regex));
        assert!(!matches_any(&p, "log: unclosed", MatchMode::Regex));
    }

    #[test]
    fn regex_patterns_compile_once() {
        let matcher = PatternMatcher::new(MatchMode::Regex);
        let p = patterns(&[r"^eth\d+", "(unclosed"]);

        for _ in 0..3 {
            assert!(matcher.matches_any(&p, "eth7: link down"));
            assert!(matcher.matches_any(&p, "(unclosed paren"));
            assert!(!matcher.matches_any(&p, "disk full"));
        }
        // one entry per distinct pattern, the invalid one included
        assert_eq!(matcher.compiled_count(), 2);
    }

    #[test]
    fn substring_mode_compiles_nothing() {
        let matcher = PatternMatcher::new(MatchMode::Substring);
        assert!(matcher.matches_any(&patterns(&["(unclosed"]), "(unclosed"));
        assert_eq!(matcher.compiled_count(), 0);
    }

    #[test]
    fn compiled_cache_is_bounded() {
        let matcher = PatternMatcher::new(MatchMode::Regex);
        let many: Vec<String> = (0..MAX_COMPILED_PATTERNS + 10)
            .map(|i| format!("pattern-{i}$"))
            .collect();
        assert!(!matcher.matches_any(&many, "no match here"));
        assert!(matcher.compiled_count() <= MAX_COMPILED_PATTERNS);
    }

    #[tokio::test]
    async fn pattern_filter_looks_up_key() {
        let store = MemoryStore::default();
        store.insert("tg_42", "maintenance");
        let filter = PatternFilter::new("test", store, MatchMode::Substring);

        assert!(DynamicFilter::suppress(&filter, "maintenance window", "tg_42").await.unwrap());
        assert!(!DynamicFilter::suppress(&filter, "maintenance window", "tg_43").await.unwrap());
        assert!(!DynamicFilter::suppress(&filter, "disk full", "tg_42").await.unwrap());
    }

    #[tokio::test]
    async fn pattern_filter_propagates_store_failure() {
        let store = MemoryStore::default().failing();
        let filter = PatternFilter::new("test", store, MatchMode::Substring);
        assert!(DynamicFilter::suppress(&filter, "x", "tg_1").await.is_err());
    }

    #[tokio::test]
    async fn lifecycle_reaches_store() {
        let mut filter = PatternFilter::new("test", MemoryStore::default(), MatchMode::Regex);
        DynamicFilter::start(&mut filter).await.unwrap();
        assert!(filter.store().is_connected());
        DynamicFilter::stop(&mut filter).await.unwrap();
        assert!(!filter.store().is_connected());
    }

    #[test]
    fn from_spec_selects_mode_and_defaults() {
        let spec = ComponentSpec::new(REDIS_EXCLUDE_REGEXP).with_param("host", "127.0.0.1");
        let filter = PatternFilter::from_spec(&spec).unwrap();
        assert_eq!(filter.mode(), MatchMode::Regex);
        assert_eq!(
            DynamicFilter::name(&filter),
            "redis_exclude_regexp@127.0.0.1:6379/0"
        );
        assert_eq!(filter.store().url(), "redis://127.0.0.1:6379/0");

        let spec = ComponentSpec::new(REDIS_EXCLUDE_PATTERN)
            .with_param("host", "redis.local")
            .with_param("port", 6380)
            .with_param("db", 2);
        let filter = PatternFilter::from_spec(&spec).unwrap();
        assert_eq!(filter.mode(), MatchMode::Substring);
        assert_eq!(filter.store().url(), "redis://redis.local:6380/2");
    }

    #[test]
    fn from_spec_rejects_unknown_param() {
        let spec = ComponentSpec::new(REDIS_EXCLUDE_PATTERN)
            .with_param("host", "redis.local")
            .with_param("password", "x");
        assert!(PatternFilter::from_spec(&spec).is_err());
    }

    #[test]
    fn from_spec_requires_host() {
        let spec = ComponentSpec::new(REDIS_EXCLUDE_PATTERN).with_param("port", 6380);
        let err = PatternFilter::from_spec(&spec).unwrap_err();
        assert!(err.to_string().contains("host"), "{err}");
    }
}
