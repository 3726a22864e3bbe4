//! Prepared statement descriptors.
//!
//! A [`Query`] is prepared once from sql text, then executed repeatedly.
//! Server assigned metadata, parameter types and result fields, is kept in
//! the descriptor so following executions skip the `Parse` and `Describe`
//! round trip.
use crate::{
    Result,
    config::Config,
    param::{BindError, Parameters},
    postgres::Oid,
    sql::{Fragments, Sql, split_statements},
    transport::Capabilities,
};

mod name;
mod field;
mod simple;
mod batch;
mod composite;

pub use name::{PortalName, StatementName};
pub use field::Field;
pub use simple::Statement;
pub use batch::{BatchedStatement, RewriteError, rewrite_sql, rewritten_len};
pub use composite::CompositeStatement;

/// Protocol state of a single server side statement.
pub trait Descriptor {
    /// Returns sql with postgres positional parameters.
    fn sql(&self) -> &str;

    /// Returns the sql fragments.
    fn fragments(&self) -> &Fragments;

    /// Returns the statement name, empty for the unnamed statement.
    fn statement_name(&self) -> &StatementName;

    /// Returns parameter types, unspecified until described.
    fn parameter_types(&self) -> &[Oid];

    /// Returns `true` if the statement exists in the server.
    fn is_parsed(&self) -> bool;

    /// Returns `true` if the statement exists in the server and can be bound with `types`.
    ///
    /// An unspecified type is compatible with any type.
    fn is_prepared_for(&self, types: &[Oid]) -> bool;

    /// Returns `true` if parameter types and result fields are known.
    fn is_described(&self) -> bool;

    /// Record the types the statement was parsed with, `None` when it was closed.
    fn set_prepared(&mut self, types: Option<Vec<Oid>>);

    /// Set parameter types reported by the server.
    fn set_types(&mut self, types: &[Oid]);

    /// Set result fields reported by the server, marking the statement as described.
    fn set_fields(&mut self, fields: Vec<Field>);

    /// Returns result fields.
    fn fields(&self) -> &[Field];
}

/// A prepared query.
#[derive(Debug, Clone)]
pub enum Query {
    /// A single statement.
    Simple(Statement),
    /// A single row `INSERT` which can absorb more rows.
    Batched(BatchedStatement),
    /// Several `;` separated statements.
    Composite(CompositeStatement),
}

impl Query {
    /// Prepare a query from sql text.
    ///
    /// Persistent [`Sql`] is given generated statement names, otherwise
    /// the unnamed statement is used and parsed on every execution.
    pub fn prepare(sql: &impl Sql, caps: &Capabilities, config: &Config) -> Result<Query> {
        let named = sql.persistent();
        let name = || match named {
            true => StatementName::next(),
            false => StatementName::unnamed(),
        };

        let mut statements = split_statements(sql.sql(), caps.standard_conforming_strings)?;
        if statements.len() > 1 {
            let statements = statements.into_iter().map(|e| Statement::new(e, name())).collect();
            return Ok(Query::Composite(CompositeStatement::new(statements)));
        }

        let fragments = statements.pop().unwrap_or_default();
        let statement = Statement::new(fragments, name());
        if config.rewrite_batched_inserts() && statement.fragments().is_rewritable_insert() {
            let batched = BatchedStatement::new(statement, config.max_batch_rows())?;
            return Ok(Query::Batched(batched));
        }

        Ok(Query::Simple(statement))
    }

    /// Returns `true` if every statement is blank.
    pub fn is_empty(&self) -> bool {
        match self {
            Query::Simple(stmt) => stmt.is_empty(),
            Query::Batched(_) => false,
            Query::Composite(stmt) => stmt.is_empty(),
        }
    }

    /// Returns `true` if every statement have been described.
    pub fn is_described(&self) -> bool {
        match self {
            Query::Simple(stmt) => stmt.is_described(),
            Query::Batched(stmt) => stmt.is_described(),
            Query::Composite(stmt) => stmt.is_described(),
        }
    }

    /// Returns the sql as sent to the server, statements joined with `;`.
    pub fn sql(&self) -> String {
        match self {
            Query::Simple(stmt) => stmt.sql().to_owned(),
            Query::Batched(stmt) => stmt.render_sql().to_owned(),
            Query::Composite(stmt) => stmt.sql(),
        }
    }

    /// Render the sql with parameters inlined as literals, for logging.
    pub fn render(&self, params: &Parameters, caps: &Capabilities) -> Result<String, BindError> {
        match (self, params) {
            (Query::Simple(stmt), Parameters::Simple(params)) => stmt.render(params, caps),
            (Query::Batched(stmt), Parameters::Simple(params)) => {
                // merged rows render against the grown statement
                let fragments = match params.len() > stmt.arity() {
                    true => stmt.fragments(),
                    false => stmt.original(),
                };
                simple::render(fragments, params, caps)
            },
            (Query::Composite(stmt), Parameters::Composite(params)) => stmt.render(params, caps),
            _ => Err(BindError::Incompatible),
        }
    }

    /// Forget every server side statement, returns the names to be closed.
    pub fn close(&mut self) -> Vec<StatementName> {
        match self {
            Query::Simple(stmt) => stmt.close().into_iter().collect(),
            Query::Batched(stmt) => stmt.close(),
            Query::Composite(stmt) => stmt.close(),
        }
    }

    /// Create unbound parameters for one execution.
    ///
    /// A batched query takes the parameters of a single row.
    pub fn create_parameters(&self) -> Parameters {
        match self {
            Query::Simple(stmt) => stmt.create_parameters().into(),
            Query::Batched(stmt) => crate::param::ParameterList::new(stmt.arity()).into(),
            Query::Composite(stmt) => stmt.create_parameters().into(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{param::ParameterList, sql::SqlExt};

    fn rewrite() -> Config {
        Config::default().with_rewrite_batched_inserts(true)
    }

    #[test]
    fn variant_selection() {
        let caps = Capabilities::default();
        let insert = "INSERT INTO t VALUES (?, ?)";

        let q = Query::prepare(&insert, &caps, &rewrite()).unwrap();
        assert!(matches!(q, Query::Batched(_)));
        let q = Query::prepare(&insert, &caps, &Config::default()).unwrap();
        assert!(matches!(q, Query::Simple(_)));

        let q = Query::prepare(&"SELECT ?; SELECT ?", &caps, &rewrite()).unwrap();
        assert!(matches!(&q, Query::Composite(c) if c.statements().len() == 2));
        assert!(matches!(q.create_parameters(), Parameters::Composite(p) if p.len() == 2));

        let q = Query::prepare(&"INSERT INTO t VALUES (?) RETURNING id", &caps, &rewrite()).unwrap();
        assert!(matches!(q, Query::Simple(_)));

        let q = Query::prepare(&"  ;  ", &caps, &rewrite()).unwrap();
        assert!(q.is_empty());

        assert!(Query::prepare(&"SELECT 'oops", &caps, &rewrite()).is_err());
    }

    #[test]
    fn naming() {
        let caps = Capabilities::default();
        let Query::Simple(named) = Query::prepare(&"SELECT 1", &caps, &Config::default()).unwrap() else {
            panic!("expected simple query")
        };
        assert!(!named.statement_name().is_unnamed());

        let Query::Batched(once) = Query::prepare(&"INSERT INTO t VALUES (?)".once(), &caps, &rewrite()).unwrap() else {
            panic!("expected batched query")
        };
        assert!(once.statement_name().is_unnamed());
    }

    #[test]
    fn render_batched() {
        let caps = Capabilities::default();
        let q = Query::prepare(&"INSERT INTO t VALUES (?)", &caps, &rewrite()).unwrap();
        let mut params = ParameterList::new(1);
        params.bind_value(1, 5i32).unwrap();
        assert_eq!(q.render(&params.into(), &caps).unwrap(), "INSERT INTO t VALUES (5)");
        assert_eq!(q.sql(), "INSERT INTO t VALUES ($1)");
    }
}
