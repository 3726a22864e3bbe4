use super::{Descriptor, Statement, StatementName};
use crate::{
    param::{BindError, CompositeParameterList},
    transport::Capabilities,
};

/// Several `;` separated statements executed in one round trip.
///
/// Batched insert rewriting is never applied.
#[derive(Debug, Clone)]
pub struct CompositeStatement {
    statements: Vec<Statement>,
}

impl CompositeStatement {
    pub fn new(statements: Vec<Statement>) -> CompositeStatement {
        Self { statements }
    }

    /// Returns the statements.
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub(crate) fn statements_mut(&mut self) -> &mut [Statement] {
        &mut self.statements
    }

    /// Returns `true` if every statement is blank.
    pub fn is_empty(&self) -> bool {
        self.statements.iter().all(Statement::is_empty)
    }

    /// Returns `true` if every statement have been described.
    pub fn is_described(&self) -> bool {
        self.statements.iter().all(Descriptor::is_described)
    }

    /// Forget every server side statement, returns the names to be closed.
    pub fn close(&mut self) -> Vec<StatementName> {
        self.statements.iter_mut().filter_map(Statement::close).collect()
    }

    /// Returns the sql of all statements joined with `;`.
    pub fn sql(&self) -> String {
        let mut sql = String::new();
        for (i, stmt) in self.statements.iter().enumerate() {
            if i != 0 {
                sql.push(';');
            }
            sql.push_str(stmt.sql());
        }
        sql
    }

    /// Render all statements with parameters inlined as literals, joined with `;`.
    pub fn render(&self, params: &CompositeParameterList, caps: &Capabilities) -> Result<String, BindError> {
        if params.lists().len() != self.statements.len() {
            return Err(BindError::Incompatible);
        }
        let mut sql = String::new();
        for (i, (stmt, params)) in self.statements.iter().zip(params.lists()).enumerate() {
            if i != 0 {
                sql.push(';');
            }
            sql.push_str(&stmt.render(params, caps)?);
        }
        Ok(sql)
    }

    /// Create unbound parameter list for all statements.
    pub fn create_parameters(&self) -> CompositeParameterList {
        CompositeParameterList::new(self.statements.iter().map(Statement::create_parameters).collect())
    }
}
