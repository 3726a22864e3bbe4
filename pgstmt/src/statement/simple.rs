use super::{Descriptor, Field, StatementName};
use crate::{
    param::{BindError, ParameterList},
    postgres::{Oid, oid},
    sql::Fragments,
    transport::Capabilities,
};

/// A single statement with its server side state.
#[derive(Debug, Clone)]
pub struct Statement {
    fragments: Fragments,
    sql: String,
    name: StatementName,
    types: Vec<Oid>,
    fields: Vec<Field>,
    /// Types the statement was parsed with, `Some` if parsed.
    prepared: Option<Vec<Oid>>,
    described: bool,
}

impl Statement {
    /// Create statement from fragments, an unnamed `name` is parsed on every execution.
    pub fn new(fragments: Fragments, name: StatementName) -> Statement {
        let sql = fragments.native_sql();
        let types = vec![oid::UNSPECIFIED; fragments.placeholder_count()];
        Self {
            fragments,
            sql,
            name,
            types,
            fields: vec![],
            prepared: None,
            described: false,
        }
    }

    /// Returns the number of placeholders.
    pub fn placeholder_count(&self) -> usize {
        self.fragments.placeholder_count()
    }

    /// Returns `true` if the statement is blank.
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Create unbound parameter list sized for this statement.
    pub fn create_parameters(&self) -> ParameterList {
        ParameterList::new(self.placeholder_count())
    }

    /// Render the sql with parameters inlined as literals.
    ///
    /// The result is meant for logging, it is never sent to the server.
    pub fn render(&self, params: &ParameterList, caps: &Capabilities) -> Result<String, BindError> {
        render(&self.fragments, params, caps)
    }

    /// Forget the server side statement, returns the name to be closed if any.
    pub fn close(&mut self) -> Option<StatementName> {
        self.described = false;
        self.fields.clear();
        match self.prepared.take() {
            Some(_) if !self.name.is_unnamed() => Some(self.name.clone()),
            _ => None,
        }
    }

    /// Swap in another text shape, parse state is reset.
    pub(crate) fn replace_shape(
        &mut self,
        fragments: Fragments,
        sql: String,
        name: StatementName,
        types: Vec<Oid>,
    ) {
        self.fragments = fragments;
        self.sql = sql;
        self.name = name;
        self.types = types;
        self.prepared = None;
        self.described = false;
    }
}

impl Descriptor for Statement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn fragments(&self) -> &Fragments {
        &self.fragments
    }

    fn statement_name(&self) -> &StatementName {
        &self.name
    }

    fn parameter_types(&self) -> &[Oid] {
        &self.types
    }

    fn is_parsed(&self) -> bool {
        self.prepared.is_some()
    }

    fn is_prepared_for(&self, types: &[Oid]) -> bool {
        match &self.prepared {
            Some(prepared) => is_compatible(prepared, types),
            None => false,
        }
    }

    fn is_described(&self) -> bool {
        self.described
    }

    fn set_prepared(&mut self, types: Option<Vec<Oid>>) {
        if self.name.is_unnamed() {
            return;
        }
        if types.is_none() {
            self.described = false;
        }
        self.prepared = types;
    }

    fn set_types(&mut self, types: &[Oid]) {
        if let Some(prepared) = &mut self.prepared {
            fill_unspecified(prepared, types);
        }
        self.types.clear();
        self.types.extend_from_slice(types);
    }

    fn set_fields(&mut self, fields: Vec<Field>) {
        self.fields = fields;
        self.described = true;
    }

    fn fields(&self) -> &[Field] {
        &self.fields
    }
}

pub(crate) fn render(
    fragments: &Fragments,
    params: &ParameterList,
    caps: &Capabilities,
) -> Result<String, BindError> {
    let parts = fragments.as_slice();
    let mut sql = String::with_capacity(parts.iter().map(String::len).sum());
    sql.push_str(&parts[0]);
    for (i, part) in parts[1..].iter().enumerate() {
        match params.to_literal(i + 1, caps) {
            Ok(literal) => sql.push_str(&literal),
            Err(BindError::IndexOutOfRange { .. }) => sql.push('?'),
            Err(err) => return Err(err),
        }
        sql.push_str(part);
    }
    Ok(sql)
}

/// Fill types a statement was parsed with by the types the server inferred.
pub(crate) fn fill_unspecified(prepared: &mut [Oid], types: &[Oid]) {
    for (prepared, found) in prepared.iter_mut().zip(types) {
        if *prepared == oid::UNSPECIFIED {
            *prepared = *found;
        }
    }
}

/// Returns `true` if a statement parsed with `prepared` types accepts `types`.
pub(crate) fn is_compatible(prepared: &[Oid], types: &[Oid]) -> bool {
    prepared.len() == types.len()
        && prepared
            .iter()
            .zip(types)
            .all(|(p, t)| *t == oid::UNSPECIFIED || p == t)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sql::split;

    fn stmt(sql: &str) -> Statement {
        Statement::new(split(sql, true).unwrap(), StatementName::next())
    }

    #[test]
    fn prepared_compatibility() {
        let mut s = stmt("SELECT ?, ?");
        assert_eq!(s.sql(), "SELECT $1, $2");
        assert_eq!(s.parameter_types(), [0, 0]);
        assert!(!s.is_prepared_for(&[0, 0]));

        s.set_prepared(Some(vec![oid::INT4, oid::TEXT]));
        assert!(s.is_parsed());
        assert!(s.is_prepared_for(&[oid::INT4, oid::UNSPECIFIED]));
        assert!(!s.is_prepared_for(&[oid::INT8, oid::TEXT]));
        assert!(!s.is_prepared_for(&[oid::INT4]));

        s.set_fields(vec![]);
        assert!(s.is_described());

        let mut s2 = stmt("SELECT ?");
        s2.set_prepared(Some(vec![oid::UNSPECIFIED]));
        s2.set_types(&[oid::INT8]);
        assert!(s2.is_prepared_for(&[oid::INT8]));
        assert!(!s2.is_prepared_for(&[oid::INT4]));
        assert_eq!(s.close(), Some(s.statement_name().clone()));
        assert!(!s.is_parsed());
        assert!(!s.is_described());
        assert_eq!(s.close(), None);
    }

    #[test]
    fn unnamed_is_never_prepared() {
        let mut s = Statement::new(split("SELECT ?", true).unwrap(), StatementName::unnamed());
        s.set_prepared(Some(vec![oid::INT4]));
        assert!(!s.is_parsed());
        assert!(!s.is_prepared_for(&[oid::INT4]));
        assert_eq!(s.close(), None);
    }

    #[test]
    fn render_literals() {
        let s = stmt("SELECT * FROM t WHERE a = ? AND b = ? AND c = ?");
        let mut params = s.create_parameters();
        params.bind_value(1, "o'k").unwrap();
        params.bind_value(2, 7i32).unwrap();
        let sql = s.render(&params, &Capabilities::default()).unwrap();
        assert_eq!(sql, "SELECT * FROM t WHERE a = 'o''k' AND b = 7 AND c = ?");
    }
}
