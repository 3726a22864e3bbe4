//! Statement preparation configuration.
use std::{borrow::Cow, env::var, fmt, num::NonZeroUsize};

/// Statement preparation config.
#[derive(Clone, Debug)]
pub struct Config {
    pub(crate) rewrite_batched_inserts: bool,
    pub(crate) statement_cache_size: NonZeroUsize,
    pub(crate) max_batch_rows: usize,
}

impl Config {
    /// Default number of cached statements.
    pub const DEFAULT_STATEMENT_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(256) {
        Some(size) => size,
        None => unreachable!(),
    };

    /// Default number of rows merged into one batched insert.
    pub const DEFAULT_MAX_BATCH_ROWS: usize = 128;

    /// Retrieve configuration from environment variable.
    ///
    /// It reads:
    /// - `PGSTMT_REWRITE_BATCHED_INSERTS`
    /// - `PGSTMT_STATEMENT_CACHE`
    /// - `PGSTMT_MAX_BATCH_ROWS`
    ///
    /// Missing or invalid value fallback to the default.
    pub fn from_env() -> Config {
        let mut config = Config::default();

        if let Some(ok) = var("PGSTMT_REWRITE_BATCHED_INSERTS").ok().and_then(|e| parse_bool(&e)) {
            config.rewrite_batched_inserts = ok;
        }
        if let Some(ok) = var("PGSTMT_STATEMENT_CACHE").ok().and_then(|e| e.parse().ok()) {
            config.statement_cache_size = ok;
        }
        if let Some(ok) = var("PGSTMT_MAX_BATCH_ROWS").ok().and_then(|e| parse_rows(&e)) {
            config.max_batch_rows = ok;
        }

        config
    }

    /// Parse config from `key=value&key=value` options.
    ///
    /// A leading `?` is ignored, so a connection url query can be passed as is.
    /// Unknown keys are ignored.
    ///
    /// Recognized keys:
    /// - `rewrite_batched_inserts` or `reWriteBatchedInserts`
    /// - `statement_cache_size` or `preparedStatementCacheQueries`
    /// - `max_batch_rows`
    pub fn parse(options: &str) -> Result<Config, ParseError> {
        let mut config = Config::default();
        let options = options.strip_prefix('?').unwrap_or(options);

        for pair in options.split('&').filter(|e| !e.is_empty()) {
            let Some((key, value)) = pair.split_once('=') else {
                return Err(ParseError { reason: format!("missing value for `{pair}`").into() });
            };

            match key {
                "rewrite_batched_inserts" | "reWriteBatchedInserts" => {
                    let Some(value) = parse_bool(value) else {
                        return Err(ParseError { reason: "invalid rewrite_batched_inserts".into() });
                    };
                    config.rewrite_batched_inserts = value;
                },
                "statement_cache_size" | "preparedStatementCacheQueries" => {
                    let Ok(value) = value.parse() else {
                        return Err(ParseError { reason: "invalid statement_cache_size".into() });
                    };
                    config.statement_cache_size = value;
                },
                "max_batch_rows" => {
                    let Some(value) = parse_rows(value) else {
                        return Err(ParseError { reason: "invalid max_batch_rows".into() });
                    };
                    config.max_batch_rows = value;
                },
                _ => {
                    #[cfg(feature = "log")]
                    log::debug!("ignoring unknown option `{key}`");
                },
            }
        }

        Ok(config)
    }

    /// Merge single row inserts into multi row inserts.
    pub fn with_rewrite_batched_inserts(mut self, enable: bool) -> Self {
        self.rewrite_batched_inserts = enable;
        self
    }

    /// Maximum number of prepared queries kept in a [`StatementCache`][crate::StatementCache].
    pub fn with_statement_cache_size(mut self, size: NonZeroUsize) -> Self {
        self.statement_cache_size = size;
        self
    }

    /// Maximum number of rows merged into one insert, at least one.
    pub fn with_max_batch_rows(mut self, rows: usize) -> Self {
        self.max_batch_rows = rows.max(1);
        self
    }

    pub fn rewrite_batched_inserts(&self) -> bool {
        self.rewrite_batched_inserts
    }

    pub fn statement_cache_size(&self) -> NonZeroUsize {
        self.statement_cache_size
    }

    pub fn max_batch_rows(&self) -> usize {
        self.max_batch_rows
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Some(true),
        "false" | "off" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn parse_rows(value: &str) -> Option<usize> {
    value.parse().ok().filter(|e| *e != 0)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rewrite_batched_inserts: false,
            statement_cache_size: Self::DEFAULT_STATEMENT_CACHE_SIZE,
            max_batch_rows: Self::DEFAULT_MAX_BATCH_ROWS,
        }
    }
}

impl std::str::FromStr for Config {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Error when parsing config options.
pub struct ParseError {
    pub(crate) reason: Cow<'static,str>,
}

impl std::error::Error for ParseError { }

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            return f.write_str(&self.reason)
        }
        write!(f, "failed to parse config: {}", self.reason)
    }
}

impl fmt::Debug for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_options() {
        let config: Config = "?reWriteBatchedInserts=true&preparedStatementCacheQueries=16&foo=bar"
            .parse()
            .unwrap();
        assert!(config.rewrite_batched_inserts());
        assert_eq!(config.statement_cache_size().get(), 16);
        assert_eq!(config.max_batch_rows(), Config::DEFAULT_MAX_BATCH_ROWS);

        let config = Config::parse("rewrite_batched_inserts=off&max_batch_rows=8").unwrap();
        assert!(!config.rewrite_batched_inserts());
        assert_eq!(config.max_batch_rows(), 8);

        assert!(Config::parse("").is_ok());
        assert!(Config::parse("statement_cache_size=0").is_err());
        assert!(Config::parse("max_batch_rows=0").is_err());
        assert!(Config::parse("rewrite_batched_inserts=maybe").is_err());
        assert!(Config::parse("rewrite_batched_inserts").is_err());
    }

    #[test]
    fn builder() {
        let config = Config::default()
            .with_rewrite_batched_inserts(true)
            .with_max_batch_rows(0);
        assert!(config.rewrite_batched_inserts());
        assert_eq!(config.max_batch_rows(), 1);
        assert_eq!(format!("{:#}", Config::parse("max_batch_rows=x").unwrap_err()), "invalid max_batch_rows");
    }
}
