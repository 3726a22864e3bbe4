//! Prepared query cache.
use lru::LruCache;
use std::num::NonZeroUsize;

use crate::{
    Result,
    common::verbose,
    config::Config,
    statement::{Query, StatementName},
    transport::Capabilities,
};

/// Splitting depends on the string mode and the rewrite toggle selects the variant,
/// both are part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    sql: String,
    standard_conforming_strings: bool,
    rewrite: bool,
}

/// Least recently used cache of prepared [`Query`].
///
/// Evicted queries are closed, their server side statement names are kept
/// until [`take_evicted`][StatementCache::take_evicted] is called, which
/// should then be passed to [`close`][crate::execute::close].
#[derive(Debug)]
pub struct StatementCache {
    queries: LruCache<CacheKey, Query>,
    evicted: Vec<StatementName>,
}

impl StatementCache {
    pub fn new(capacity: NonZeroUsize) -> StatementCache {
        Self { queries: LruCache::new(capacity), evicted: vec![] }
    }

    /// Create cache with the configured capacity.
    pub fn from_config(config: &Config) -> StatementCache {
        Self::new(config.statement_cache_size())
    }

    /// Returns cached query for `sql`, or prepare and cache it.
    ///
    /// On preparation error, nothing is cached or evicted.
    pub fn get_or_prepare(
        &mut self,
        sql: &str,
        caps: &Capabilities,
        config: &Config,
    ) -> Result<&mut Query> {
        let sql = sql.trim();
        let key = CacheKey {
            sql: sql.to_owned(),
            standard_conforming_strings: caps.standard_conforming_strings,
            rewrite: config.rewrite_batched_inserts(),
        };

        if !self.queries.contains(&key) {
            let query = Query::prepare(&sql, caps, config)?;
            if self.queries.len() == self.queries.cap().get() {
                self.evict_lru();
            }
            return Ok(self.queries.get_or_insert_mut(key, || query));
        }

        verbose!(sql, "statement cache hit");
        self.queries.try_get_or_insert_mut(key, || Query::prepare(&sql, caps, config))
    }

    fn evict_lru(&mut self) {
        let Some((_key, mut query)) = self.queries.pop_lru() else {
            return;
        };
        let names = query.close();

        #[cfg(feature = "log")]
        if !names.is_empty() {
            log::debug!("statement cache evicted `{}`", _key.sql);
        }

        self.evicted.extend(names);
    }

    /// Take statement names that should be closed in the server.
    pub fn take_evicted(&mut self) -> Vec<StatementName> {
        std::mem::take(&mut self.evicted)
    }

    /// Returns the number of cached queries.
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn capacity(&self) -> NonZeroUsize {
        self.queries.cap()
    }

    /// Drop every cached query, their names are added to the evicted names.
    pub fn clear(&mut self) {
        while !self.queries.is_empty() {
            self.evict_lru();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{execute, statement::Descriptor, transport::mock::MockTransport};

    fn cache(capacity: usize) -> StatementCache {
        StatementCache::new(NonZeroUsize::new(capacity).unwrap())
    }

    fn parse(io: &mut MockTransport, query: &mut Query) {
        io.push(b'1', b"")
            .push(b't', &[0, 0])
            .push(b'n', b"")
            .push(b'2', b"")
            .push(b'C', b"SELECT 0\0")
            .push(b'Z', b"I");
        let mut params = query.create_parameters();
        execute::execute(query, &mut params, &mut *io).unwrap();
    }

    #[test]
    fn hit_and_miss() {
        let caps = Capabilities::default();
        let config = Config::default();
        let mut cache = cache(4);

        let name = match cache.get_or_prepare("SELECT 1", &caps, &config).unwrap() {
            Query::Simple(stmt) => stmt.statement_name().clone(),
            _ => panic!("expected simple query"),
        };
        let again = match cache.get_or_prepare("  SELECT 1\n", &caps, &config).unwrap() {
            Query::Simple(stmt) => stmt.statement_name().clone(),
            _ => panic!("expected simple query"),
        };
        assert_eq!(name, again);
        assert_eq!(cache.len(), 1);

        let rewrite = config.clone().with_rewrite_batched_inserts(true);
        cache.get_or_prepare("INSERT INTO t VALUES (?)", &caps, &config).unwrap();
        let batched = cache.get_or_prepare("INSERT INTO t VALUES (?)", &caps, &rewrite).unwrap();
        assert!(matches!(batched, Query::Batched(_)));
        assert_eq!(cache.len(), 3);

        assert!(cache.get_or_prepare("SELECT 'oops", &caps, &config).is_err());
        assert_eq!(cache.len(), 3);
        assert!(cache.take_evicted().is_empty());
    }

    #[test]
    fn eviction_closes_names() {
        let caps = Capabilities::default();
        let config = Config::default();
        let mut io = MockTransport::new();
        let mut cache = cache(2);

        let first = cache.get_or_prepare("SELECT 1", &caps, &config).unwrap();
        parse(&mut io, first);
        let name = match first {
            Query::Simple(stmt) => stmt.statement_name().clone(),
            _ => panic!("expected simple query"),
        };

        // never parsed, nothing to close
        cache.get_or_prepare("SELECT 2", &caps, &config).unwrap();
        cache.get_or_prepare("SELECT 3", &caps, &config).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.take_evicted(), [name.clone()]);

        cache.get_or_prepare("SELECT 4", &caps, &config).unwrap();
        assert!(cache.take_evicted().is_empty());

        io.clear_sent();
        io.push(b'3', b"").push(b'Z', b"I");
        execute::close(&[name], &mut io).unwrap();
        assert_eq!(io.sent_types(), b"CS");

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.take_evicted().is_empty());
    }
}
