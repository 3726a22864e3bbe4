//! Postgres statement preparation
//!
//! Sql written with `?` placeholders is split once into a [`Query`], parameters
//! are bound by index, and executions are pipelined through any [`PgTransport`]
//! using the extended query protocol. With batched insert rewriting enabled,
//! queued rows of a single row `INSERT` are merged into multi row inserts.
//!
//! # Examples
//!
//! ```no_run
//! use pgstmt::{Batch, Config, PgTransport, StatementCache};
//!
//! # fn app(mut io: impl PgTransport) -> pgstmt::Result<()> {
//! let config = Config::from_env().with_rewrite_batched_inserts(true);
//! let caps = io.capabilities().clone();
//! let mut cache = StatementCache::from_config(&config);
//!
//! let query = cache.get_or_prepare("UPDATE post SET views = views + 1 WHERE id = ?", &caps, &config)?;
//! let mut params = query.create_parameters();
//! params.bind_value(1, 420)?;
//! let results = pgstmt::execute(query, &mut params, &mut io)?;
//! assert_eq!(results[0].rows_affected, 1);
//!
//! let query = cache.get_or_prepare("INSERT INTO post(title) VALUES (?)", &caps, &config)?;
//! let mut params = query.create_parameters();
//! let mut batch = Batch::new(query);
//! for title in ["Foo", "Bar", "Baz"] {
//!     params.bind_value(1, title)?;
//!     batch.add(&params)?;
//! }
//! batch.execute(&mut io)?;
//!
//! pgstmt::close(&cache.take_evicted(), &mut io)?;
//! # Ok(())
//! # }
//! ```

pub mod common;
mod ext;

// Protocol
pub mod postgres;

// Encoding
mod value;
pub mod encode;
pub mod types;

// Component
pub mod sql;
pub mod param;
pub mod statement;

// Operation
pub mod transport;
pub mod execute;
pub mod batch;
pub mod cache;

pub mod config;
mod error;


pub use encode::Encode;
pub use value::Value;
pub use sql::SqlExt;
pub use param::{ParameterList, Parameters};
pub use statement::Query;

pub use transport::{Capabilities, PgTransport};
#[doc(inline)]
pub use execute::{close, execute};
pub use batch::{Batch, RowOutcome};
pub use cache::StatementCache;
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
