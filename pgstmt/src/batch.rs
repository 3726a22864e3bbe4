//! Batch execution.
use crate::{
    Result,
    common::span,
    execute::{self, RowResult},
    param::{BindError, Parameters},
    statement::{BatchedStatement, Query, RewriteError},
    transport::PgTransport,
};

/// Result of one row in a [`Batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    /// Row executed alone, with its rows affected.
    Affected(u64),
    /// Row executed as part of a rewritten multi row insert,
    /// the count of a single row is unknown.
    SuccessNoInfo,
}

/// Rows of parameters queued for one [`Query`].
///
/// When the query is a [`Query::Batched`] insert, queued rows are merged into
/// multi row inserts, otherwise every row is executed on its own.
#[derive(Debug)]
pub struct Batch<'q> {
    query: &'q mut Query,
    rows: Vec<Parameters>,
}

impl<'q> Batch<'q> {
    pub fn new(query: &'q mut Query) -> Batch<'q> {
        Self { query, rows: vec![] }
    }

    /// Queue a copy of `params`, every parameter must be bound.
    ///
    /// For a batched insert, a row with a different number of parameters is
    /// rejected with [`RewriteError::ArityMismatch`] and should be executed on its own.
    pub fn add(&mut self, params: &Parameters) -> Result<()> {
        params.check_all_set()?;
        if let Query::Batched(stmt) = &*self.query {
            let Parameters::Simple(list) = params else {
                return Err(BindError::Incompatible.into());
            };
            if list.len() != stmt.arity() {
                return Err(RewriteError::ArityMismatch { expected: stmt.arity(), found: list.len() }.into());
            }
        }
        self.rows.push(params.clone());
        Ok(())
    }

    /// Returns the number of queued rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Execute all queued rows, returns the outcome of each row.
    ///
    /// Queued rows are consumed even on error.
    pub fn execute(&mut self, mut io: impl PgTransport) -> Result<Vec<RowOutcome>> {
        span!("batch", rows = self.rows.len());

        let rows = std::mem::take(&mut self.rows);
        let mut outcomes = Vec::with_capacity(rows.len());

        match &mut *self.query {
            Query::Batched(stmt) => {
                let result = rewritten(stmt, rows, &mut outcomes, &mut io);
                stmt.reset();
                result?;
            },
            query => {
                for mut row in rows {
                    let results = execute::execute(query, &mut row, &mut io)?;
                    outcomes.push(affected(&results));
                }
            },
        }

        Ok(outcomes)
    }
}

fn rewritten(
    stmt: &mut BatchedStatement,
    rows: Vec<Parameters>,
    outcomes: &mut Vec<RowOutcome>,
    io: &mut impl PgTransport,
) -> Result<()> {
    for row in rows {
        let Parameters::Simple(list) = &row else {
            return Err(BindError::Incompatible.into());
        };
        match stmt.add_row(list) {
            Ok(()) => {},
            Err(RewriteError::Full { .. }) => {
                flush(stmt, outcomes, io)?;
                stmt.add_row(list)?;
            },
            Err(err) => return Err(err.into()),
        }
    }
    flush(stmt, outcomes, io)
}

/// Execute queued rows and return to the single row shape.
fn flush(
    stmt: &mut BatchedStatement,
    outcomes: &mut Vec<RowOutcome>,
    io: &mut impl PgTransport,
) -> Result<()> {
    let rows = stmt.row_count();
    let result = execute::execute_batched(stmt, io);
    stmt.reset();

    let Some(results) = result.transpose()? else {
        return Ok(());
    };
    match rows {
        1 => outcomes.push(affected(&results)),
        rows => outcomes.extend(std::iter::repeat_n(RowOutcome::SuccessNoInfo, rows)),
    }
    Ok(())
}

fn affected(results: &[RowResult]) -> RowOutcome {
    RowOutcome::Affected(results.iter().map(|e| e.rows_affected).sum())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        config::Config,
        postgres::{Oid, oid},
        statement::Descriptor,
        transport::{Capabilities, mock::MockTransport},
        ErrorKind,
    };

    fn param_desc(oids: &[Oid]) -> Vec<u8> {
        let mut body = (oids.len() as u16).to_be_bytes().to_vec();
        for oid in oids {
            body.extend_from_slice(&oid.to_be_bytes());
        }
        body
    }

    fn cycle(io: &mut MockTransport, oids: &[Oid], tag: &[u8]) {
        io.push(b'1', b"")
            .push(b't', &param_desc(oids))
            .push(b'n', b"")
            .push(b'2', b"")
            .push(b'C', tag)
            .push(b'Z', b"I");
    }

    fn insert(max_rows: usize) -> Query {
        let config = Config::default()
            .with_rewrite_batched_inserts(true)
            .with_max_batch_rows(max_rows);
        Query::prepare(&"INSERT INTO t VALUES (?, ?)", &Capabilities::default(), &config).unwrap()
    }

    fn row(query: &Query, i: i32) -> Parameters {
        let mut params = query.create_parameters();
        params.bind_value(1, i).unwrap();
        params.bind_value(2, "v").unwrap();
        params
    }

    fn engine(query: &Query) -> &BatchedStatement {
        match query {
            Query::Batched(stmt) => stmt,
            _ => panic!("expected batched query"),
        }
    }

    #[test]
    fn rewritten_group() {
        let mut io = MockTransport::new();
        let mut query = insert(128);
        let rows = (0..3).map(|i| row(&query, i)).collect::<Vec<_>>();

        let mut batch = Batch::new(&mut query);
        for row in &rows {
            batch.add(row).unwrap();
        }
        assert_eq!(batch.len(), 3);

        cycle(&mut io, &[oid::INT4, oid::TEXT].repeat(3), b"INSERT 0 3\0");
        let outcomes = batch.execute(&mut io).unwrap();
        assert_eq!(outcomes, [RowOutcome::SuccessNoInfo; 3]);
        assert!(batch.is_empty());
        assert!(io.sent_contains(b"INSERT INTO t VALUES ($1, $2),($3,$4),($5,$6)\0"));

        let stmt = engine(&query);
        assert_eq!(stmt.row_count(), 1);
        assert!(stmt.parameters().is_none());
        assert_eq!(stmt.parameter_types(), [oid::INT4, oid::TEXT]);
    }

    #[test]
    fn full_group_flushes() {
        let mut io = MockTransport::new();
        let mut query = insert(2);
        let rows = (0..3).map(|i| row(&query, i)).collect::<Vec<_>>();

        let mut batch = Batch::new(&mut query);
        for row in &rows {
            batch.add(row).unwrap();
        }

        cycle(&mut io, &[oid::INT4, oid::TEXT, oid::INT4, oid::TEXT], b"INSERT 0 2\0");
        cycle(&mut io, &[oid::INT4, oid::TEXT], b"INSERT 0 1\0");
        let outcomes = batch.execute(&mut io).unwrap();
        assert_eq!(
            outcomes,
            [RowOutcome::SuccessNoInfo, RowOutcome::SuccessNoInfo, RowOutcome::Affected(1)]
        );
        assert!(io.incoming.is_empty());
    }

    #[test]
    fn reset_on_error() {
        let mut io = MockTransport::new();
        let mut query = insert(128);
        let rows = (0..2).map(|i| row(&query, i)).collect::<Vec<_>>();

        let mut batch = Batch::new(&mut query);
        for row in &rows {
            batch.add(row).unwrap();
        }

        io.push(b'E', b"SERROR\0C23505\0Mduplicate key\0\0").push(b'Z', b"I");
        let err = batch.execute(&mut io).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Database(_)));

        let stmt = engine(&query);
        assert_eq!(stmt.row_count(), 1);
        assert!(stmt.parameters().is_none());
        assert!(!stmt.is_parsed());
    }

    #[test]
    fn reject_unbound_row() {
        let mut query = insert(128);
        let params = query.create_parameters();
        let mut batch = Batch::new(&mut query);
        let err = batch.add(&params).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Bind(BindError::Unbound { index: 1 })));
        assert!(batch.is_empty());
    }

    #[test]
    fn reject_divergent_arity() {
        let mut io = MockTransport::new();
        let mut query = insert(128);
        let mut rows = (0..3).map(|i| row(&query, i)).collect::<Vec<_>>();
        let mut wide = row(&query, 9);
        wide.bind_value(3, 0).unwrap();
        rows.insert(2, wide);

        let mut batch = Batch::new(&mut query);
        batch.add(&rows[0]).unwrap();
        batch.add(&rows[1]).unwrap();
        let err = batch.add(&rows[2]).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::Rewrite(RewriteError::ArityMismatch { expected: 2, found: 3 })
        ));
        batch.add(&rows[3]).unwrap();
        assert_eq!(batch.len(), 3);

        cycle(&mut io, &[oid::INT4, oid::TEXT].repeat(3), b"INSERT 0 3\0");
        let outcomes = batch.execute(&mut io).unwrap();
        assert_eq!(outcomes, [RowOutcome::SuccessNoInfo; 3]);
        assert!(io.sent_contains(b"($5,$6)\0"));
    }

    #[test]
    fn reset_on_io_error() {
        let mut io = MockTransport::new();
        let mut query = insert(128);
        let rows = (0..2).map(|i| row(&query, i)).collect::<Vec<_>>();

        let mut batch = Batch::new(&mut query);
        for row in &rows {
            batch.add(row).unwrap();
        }

        // connection lost after ParseComplete
        io.push(b'1', b"");
        let err = batch.execute(&mut io).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Io(_)));

        {
            let stmt = engine(&query);
            assert_eq!(stmt.row_count(), 1);
            assert!(stmt.parameters().is_none());
            assert_eq!(stmt.fragments(), stmt.original());
            assert_eq!(stmt.parameter_types().len(), 2);
            assert_eq!(stmt.render_sql(), "INSERT INTO t VALUES ($1, $2)");
            assert!(!stmt.is_parsed());
        }

        // the parsed two row shape is reused, only its description is missing
        let mut batch = Batch::new(&mut query);
        for row in &rows {
            batch.add(row).unwrap();
        }
        io.clear_sent();
        io.push(b't', &param_desc(&[oid::INT4, oid::TEXT].repeat(2)))
            .push(b'n', b"")
            .push(b'2', b"")
            .push(b'C', b"INSERT 0 2\0")
            .push(b'Z', b"I");
        let outcomes = batch.execute(&mut io).unwrap();
        assert_eq!(outcomes, [RowOutcome::SuccessNoInfo; 2]);
        assert_eq!(io.sent_types(), b"DBES");
    }

    #[test]
    fn per_row_fallback() {
        let mut io = MockTransport::new();
        let mut query = Query::prepare(&"UPDATE t SET a = ?", &Capabilities::default(), &Config::default()).unwrap();
        let mut rows = vec![];
        for i in 0..2 {
            let mut params = query.create_parameters();
            params.bind_value(1, i).unwrap();
            rows.push(params);
        }

        let mut batch = Batch::new(&mut query);
        for row in &rows {
            batch.add(row).unwrap();
        }

        cycle(&mut io, &[oid::INT4], b"UPDATE 5\0");
        io.push(b'2', b"").push(b'C', b"UPDATE 0\0").push(b'Z', b"I");
        let outcomes = batch.execute(&mut io).unwrap();
        assert_eq!(outcomes, [RowOutcome::Affected(5), RowOutcome::Affected(0)]);
    }
}
