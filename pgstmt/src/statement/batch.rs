//! Multi row `INSERT` rewriting.
//!
//! A single row `INSERT INTO t VALUES ($1,$2)` prepared once is grown one row
//! at a time into `INSERT INTO t VALUES ($1,$2),($3,$4),..`, each row count
//! being its own server side statement named `{base}_{rows}`.
use std::{collections::BTreeMap, fmt};

use super::{
    Descriptor, Field, Statement, StatementName,
    simple::{fill_unspecified, is_compatible},
};
use crate::{
    common::verbose,
    param::{MAX_PARAMETERS, ParameterList},
    postgres::{Oid, oid},
    sql::{Fragments, placeholders_len},
};

/// Server side state of one row count.
#[derive(Debug, Clone, Default)]
struct Shape {
    /// Types the shape was parsed with, `Some` if parsed.
    prepared: Option<Vec<Oid>>,
    described: bool,
}

/// A prepared single row `INSERT` which absorbs queued rows.
#[derive(Debug, Clone)]
pub struct BatchedStatement {
    /// Current shape.
    statement: Statement,
    original: Fragments,
    base_sql: String,
    base_name: StatementName,
    /// Placeholders per row.
    arity: usize,
    /// Per row types, folded from describes.
    template: Vec<Oid>,
    template_resolved: bool,
    rows: usize,
    max_rows: usize,
    shapes: BTreeMap<usize, Shape>,
    /// Merged parameters of queued rows.
    pending: Option<ParameterList>,
}

impl BatchedStatement {
    /// Wrap a single row `INSERT`, at most `max_rows` rows are merged into one execution.
    pub fn new(statement: Statement, max_rows: usize) -> Result<BatchedStatement, RewriteError> {
        let original = statement.fragments().clone();
        if !original.is_rewritable_insert() {
            return Err(RewriteError::NotRewritable);
        }
        Ok(Self {
            base_sql: statement.sql().to_owned(),
            base_name: statement.statement_name().clone(),
            arity: original.placeholder_count(),
            template: statement.parameter_types().to_vec(),
            template_resolved: false,
            rows: 1,
            max_rows: max_rows.max(1),
            shapes: BTreeMap::new(),
            pending: None,
            original,
            statement,
        })
    }

    /// Grow the statement by one row.
    ///
    /// Returns [`RewriteError::Full`] without changing anything when another row
    /// would exceed the parameter limit or the configured row limit.
    pub fn queue_row(&mut self) -> Result<(), RewriteError> {
        let rows = self.rows + 1;
        if rows * self.arity > MAX_PARAMETERS || rows > self.max_rows {
            return Err(RewriteError::Full { rows: self.rows });
        }
        self.apply_shape(rows);
        Ok(())
    }

    /// Queue a row of parameters.
    ///
    /// The first row is taken as is, subsequent rows are appended and grow the statement.
    pub fn add_row(&mut self, row: &ParameterList) -> Result<(), RewriteError> {
        if row.len() != self.arity {
            return Err(RewriteError::ArityMismatch { expected: self.arity, found: row.len() });
        }
        if self.pending.is_none() {
            self.pending = Some(row.clone());
            return Ok(());
        }
        self.queue_row()?;
        if let Some(pending) = &mut self.pending {
            pending.append(row);
        }
        Ok(())
    }

    /// Returns the number of rows in the current shape.
    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Returns the number of placeholders per row.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Returns the current sql.
    pub fn render_sql(&self) -> &str {
        self.statement.sql()
    }

    /// Returns the merged parameters of queued rows.
    pub fn parameters(&self) -> Option<&ParameterList> {
        self.pending.as_ref()
    }

    pub(crate) fn take_pending(&mut self) -> Option<ParameterList> {
        self.pending.take()
    }

    /// Returns the single row statement.
    pub fn original(&self) -> &Fragments {
        &self.original
    }

    /// Record that the shape of `at_rows` rows was parsed with `types`.
    pub fn mark_parsed(&mut self, at_rows: usize, types: Vec<Oid>) {
        if !self.base_name.is_unnamed() {
            self.shapes.entry(at_rows).or_default().prepared = Some(types);
        }
    }

    /// Record that the shape of `at_rows` rows was described.
    pub fn mark_described(&mut self, at_rows: usize) {
        if !self.base_name.is_unnamed() {
            self.shapes.entry(at_rows).or_default().described = true;
        }
    }

    /// Returns to the single row shape and drops queued rows.
    ///
    /// Resolved types are kept, the statement name is released back to the base name.
    pub fn reset(&mut self) {
        self.pending = None;
        if self.rows != 1 {
            self.apply_shape(1);
        }
    }

    /// Forget every parsed shape, returns the names to be closed.
    pub fn close(&mut self) -> Vec<StatementName> {
        let shapes = std::mem::take(&mut self.shapes);
        shapes
            .into_iter()
            .filter(|(_, shape)| shape.prepared.is_some())
            .map(|(rows, _)| self.base_name.batched(rows))
            .collect()
    }

    fn shape(&self) -> Option<&Shape> {
        self.shapes.get(&self.rows)
    }

    fn apply_shape(&mut self, rows: usize) {
        verbose!(rows, name = %self.base_name, "batch shape");

        let (fragments, sql) = match rows {
            1 => (self.original.clone(), self.base_sql.clone()),
            _ => (
                rewrite_fragments(&self.original, rows),
                rewrite_sql(&self.base_sql, self.arity, rows),
            ),
        };
        debug_assert_eq!(fragments.native_sql(), sql);

        let types = self.template.repeat(rows);
        let name = self.base_name.batched(rows);
        self.statement.replace_shape(fragments, sql, name, types);
        self.rows = rows;
    }

    /// Fold server reported types into the per row template.
    ///
    /// Only unresolved template slots are filled, any row may resolve a slot.
    fn fold_template(&mut self, types: &[Oid]) {
        if self.template_resolved || self.arity == 0 {
            return;
        }
        for row in types.chunks(self.arity) {
            for (slot, found) in self.template.iter_mut().zip(row) {
                if *slot == oid::UNSPECIFIED {
                    *slot = *found;
                }
            }
        }
        self.template_resolved = self.template.iter().all(|e| *e != oid::UNSPECIFIED);
    }
}

impl Descriptor for BatchedStatement {
    fn sql(&self) -> &str {
        self.statement.sql()
    }

    fn fragments(&self) -> &Fragments {
        self.statement.fragments()
    }

    fn statement_name(&self) -> &StatementName {
        self.statement.statement_name()
    }

    fn parameter_types(&self) -> &[Oid] {
        self.statement.parameter_types()
    }

    fn is_parsed(&self) -> bool {
        self.shape().is_some_and(|e| e.prepared.is_some())
    }

    fn is_prepared_for(&self, types: &[Oid]) -> bool {
        match self.shape().and_then(|e| e.prepared.as_deref()) {
            Some(prepared) => is_compatible(prepared, types),
            None => false,
        }
    }

    fn is_described(&self) -> bool {
        self.shape().is_some_and(|e| e.described)
    }

    fn set_prepared(&mut self, types: Option<Vec<Oid>>) {
        match types {
            Some(types) => self.mark_parsed(self.rows, types),
            None => {
                self.shapes.remove(&self.rows);
            },
        }
    }

    fn set_types(&mut self, types: &[Oid]) {
        let rows = self.rows;
        if let Some(prepared) = self.shapes.get_mut(&rows).and_then(|e| e.prepared.as_mut()) {
            fill_unspecified(prepared, types);
        }
        self.fold_template(types);
        self.statement.set_types(types);
    }

    fn set_fields(&mut self, fields: Vec<Field>) {
        self.statement.set_fields(fields);
        self.mark_described(self.rows);
    }

    fn fields(&self) -> &[Field] {
        self.statement.fields()
    }
}

/// Fragments of `original` repeated for `rows` rows.
fn rewrite_fragments(original: &Fragments, rows: usize) -> Fragments {
    let parts = original.as_slice();
    let arity = parts.len() - 1;
    let last = &parts[arity];

    let mut rewritten = Vec::with_capacity(arity * rows + 1);
    rewritten.extend_from_slice(&parts[..arity]);
    rewritten.push(format!("{last},("));
    for row in 2..=rows {
        rewritten.extend(std::iter::repeat_n(String::from(","), arity - 1));
        match row == rows {
            true => rewritten.push(String::from(")")),
            false => rewritten.push(String::from("),(")),
        }
    }
    Fragments::from_parts(rewritten)
}

/// Append `rows - 1` value groups of `arity` placeholders to a single row `sql`.
///
/// `INSERT INTO t VALUES ($1,$2)` with 3 rows becomes
/// `INSERT INTO t VALUES ($1,$2),($3,$4),($5,$6)`.
pub fn rewrite_sql(sql: &str, arity: usize, rows: usize) -> String {
    let len = rewritten_len(sql.len(), arity, rows);
    let mut rewritten = String::with_capacity(len);
    rewritten.push_str(sql);

    let mut b = itoa::Buffer::new();
    for row in 1..rows {
        rewritten.push_str(",(");
        for i in 0..arity {
            if i != 0 {
                rewritten.push(',');
            }
            rewritten.push('$');
            rewritten.push_str(b.format(row * arity + i + 1));
        }
        rewritten.push(')');
    }

    debug_assert_eq!(rewritten.len(), len);
    rewritten
}

/// Exact length of [`rewrite_sql`] output for single row sql of length `len`.
pub fn rewritten_len(len: usize, arity: usize, rows: usize) -> usize {
    if rows <= 1 {
        return len;
    }
    let extra = rows - 1;
    // `,(` and `)` of each group, then the separating commas
    len + extra * 3
        + extra * arity.saturating_sub(1)
        + placeholders_len(arity + 1, arity * rows)
}

/// An error when rewriting batched insert.
pub enum RewriteError {
    /// Row parameter count differ from the statement.
    ArityMismatch { expected: usize, found: usize },
    /// Another row would exceed the limit.
    Full { rows: usize },
    /// Statement is not a single row `INSERT .. VALUES`.
    NotRewritable,
}

impl std::error::Error for RewriteError { }

impl fmt::Display for RewriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ArityMismatch { expected, found } => {
                write!(f, "row have {found} parameters, statement expect {expected}")
            },
            Self::Full { rows } => write!(f, "batch of {rows} rows cannot grow further"),
            Self::NotRewritable => f.write_str("statement is not a rewritable insert"),
        }
    }
}

impl fmt::Debug for RewriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sql::split;

    fn engine(sql: &str, max_rows: usize) -> BatchedStatement {
        let stmt = Statement::new(split(sql, true).unwrap(), StatementName::next());
        BatchedStatement::new(stmt, max_rows).unwrap()
    }

    fn row(a: i32, b: &str) -> ParameterList {
        let mut list = ParameterList::new(2);
        list.bind_value(1, a).unwrap();
        list.bind_value(2, b).unwrap();
        list
    }

    #[test]
    fn text_round_trip() {
        let mut batch = engine("INSERT INTO t(a, b) VALUES (?, ?)", 128);
        assert_eq!(batch.render_sql(), "INSERT INTO t(a, b) VALUES ($1, $2)");

        for i in 0..3 {
            batch.add_row(&row(i, "x")).unwrap();
        }
        assert_eq!(batch.row_count(), 3);
        assert_eq!(
            batch.render_sql(),
            "INSERT INTO t(a, b) VALUES ($1, $2),($3,$4),($5,$6)"
        );
        assert_eq!(batch.fragments().placeholder_count(), 6);
        assert_eq!(batch.fragments().native_sql(), batch.render_sql());
        assert_eq!(batch.parameters().unwrap().len(), 6);
        assert!(batch.statement_name().as_str().ends_with("_3"));
    }

    #[test]
    fn trailing_whitespace() {
        let mut batch = engine("insert into t values(?) ", 128);
        batch.queue_row().unwrap();
        assert_eq!(batch.render_sql(), "insert into t values($1) ,($2)");
        assert_eq!(batch.fragments().native_sql(), batch.render_sql());
    }

    #[test]
    fn type_growth() {
        let mut batch = engine("INSERT INTO t VALUES (?, ?)", 128);
        batch.set_types(&[oid::INT4, oid::TEXT]);
        batch.queue_row().unwrap();
        batch.queue_row().unwrap();
        assert_eq!(
            batch.parameter_types(),
            [oid::INT4, oid::TEXT, oid::INT4, oid::TEXT, oid::INT4, oid::TEXT]
        );
    }

    #[test]
    fn template_fold_never_regress() {
        let mut batch = engine("INSERT INTO t VALUES (?, ?)", 128);
        batch.queue_row().unwrap();
        // the first row resolves slot 1, the second row resolves slot 2
        batch.set_types(&[oid::INT4, oid::UNSPECIFIED, oid::INT8, oid::TEXT]);
        batch.reset();
        assert_eq!(batch.parameter_types(), [oid::INT4, oid::TEXT]);

        batch.set_types(&[oid::UNSPECIFIED, oid::UNSPECIFIED]);
        batch.queue_row().unwrap();
        assert_eq!(batch.parameter_types(), [oid::INT4, oid::TEXT, oid::INT4, oid::TEXT]);
    }

    #[test]
    fn idempotent_reset() {
        let mut batch = engine("INSERT INTO t VALUES (?, ?)", 128);
        let base = batch.statement_name().clone();
        for i in 0..5 {
            batch.add_row(&row(i, "y")).unwrap();
        }
        batch.reset();
        assert_eq!(batch.row_count(), 1);
        assert_eq!(batch.fragments().as_slice().len(), 3);
        assert_eq!(batch.parameter_types().len(), 2);
        assert_eq!(batch.statement_name(), &base);
        assert_eq!(batch.render_sql(), "INSERT INTO t VALUES ($1, $2)");
        assert!(batch.parameters().is_none());

        let sql = batch.render_sql().to_owned();
        batch.reset();
        assert_eq!(batch.render_sql(), sql);
        assert_eq!(batch.fragments(), batch.original());
    }

    #[test]
    fn arity_mismatch() {
        let mut batch = engine("INSERT INTO t VALUES (?, ?)", 128);
        batch.add_row(&row(1, "a")).unwrap();
        let err = batch.add_row(&ParameterList::new(3));
        assert!(matches!(err, Err(RewriteError::ArityMismatch { expected: 2, found: 3 })));
        assert_eq!(batch.row_count(), 1);
        assert_eq!(batch.parameters().unwrap().len(), 2);
    }

    #[test]
    fn full() {
        let mut batch = engine("INSERT INTO t VALUES (?, ?)", 3);
        for i in 0..3 {
            batch.add_row(&row(i, "z")).unwrap();
        }
        let sql = batch.render_sql().to_owned();
        assert!(matches!(batch.add_row(&row(4, "z")), Err(RewriteError::Full { rows: 3 })));
        assert_eq!(batch.render_sql(), sql);
        assert_eq!(batch.parameters().unwrap().len(), 6);

        // bounded by the parameter limit too
        let mut batch = engine("INSERT INTO t VALUES (?, ?)", usize::MAX);
        batch.rows = MAX_PARAMETERS / 2;
        assert!(matches!(batch.queue_row(), Err(RewriteError::Full { .. })));
    }

    #[test]
    fn shape_status() {
        let mut batch = engine("INSERT INTO t VALUES (?)", 128);
        batch.queue_row().unwrap();
        assert!(!batch.is_parsed());
        batch.set_prepared(Some(vec![oid::INT4, oid::INT4]));
        batch.set_fields(vec![]);
        assert!(batch.is_prepared_for(&[oid::INT4, oid::UNSPECIFIED]));
        assert!(batch.is_described());

        batch.reset();
        assert!(!batch.is_parsed());
        batch.queue_row().unwrap();
        assert!(batch.is_parsed());
        assert!(batch.is_described());

        batch.mark_parsed(1, vec![oid::INT4]);
        let mut closed: Vec<String> = batch.close().iter().map(|e| e.to_string()).collect();
        closed.sort();
        let base = batch.base_name.to_string();
        assert_eq!(closed, [base.clone(), format!("{base}_2")]);
        assert!(!batch.is_parsed());
    }

    #[test]
    fn unnamed_shapes() {
        let stmt = Statement::new(split("INSERT INTO t VALUES (?)", true).unwrap(), StatementName::unnamed());
        let mut batch = BatchedStatement::new(stmt, 128).unwrap();
        batch.queue_row().unwrap();
        assert!(batch.statement_name().is_unnamed());
        batch.mark_parsed(2, vec![]);
        batch.mark_described(2);
        assert!(!batch.is_parsed());
        assert!(batch.close().is_empty());
    }

    #[test]
    fn not_rewritable() {
        let stmt = Statement::new(split("SELECT ?", true).unwrap(), StatementName::next());
        assert!(matches!(BatchedStatement::new(stmt, 128), Err(RewriteError::NotRewritable)));
    }

    #[test]
    fn rewritten_len_exact() {
        for arity in 1..=12 {
            let base = format!(
                "INSERT INTO t VALUES ({})",
                (1..=arity).map(|i| format!("${i}")).collect::<Vec<_>>().join(",")
            );
            for rows in 1..=120 {
                let sql = rewrite_sql(&base, arity, rows);
                assert_eq!(sql.len(), rewritten_len(base.len(), arity, rows), "p={arity} k={rows}");
            }
        }
        assert_eq!(rewrite_sql("V ($1)", 1, 10), "V ($1),($2),($3),($4),($5),($6),($7),($8),($9),($10)");
    }
}
