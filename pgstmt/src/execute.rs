//! Extended query execution.
//!
//! Every execution is a single pipeline, all messages are written at once and
//! terminated by one `Sync`:
//!
//! ```text
//! [Close] [Parse] [Describe] Bind Execute  (for each statement)
//! Sync
//! ```
//!
//! Responses are folded back into the statement [`Descriptor`], so the next
//! execution skips what the server already knows.
use bytes::BytesMut;

use crate::{
    Result,
    common::{span, verbose},
    ext::{BindParams, UsizeExt},
    param::{BindError, MAX_PARAMETERS, ParameterList, Parameters, WireValue},
    postgres::{
        BackendMessage, Oid, PgFormat,
        backend::ParameterDescription,
        frontend::{self, Bind, Close, Describe, Execute, Parse, Sync},
        oid,
    },
    statement::{BatchedStatement, Descriptor, Field, PortalName, Query, StatementName},
    transport::{PgTransport, PgTransportExt},
};

/// Query result with its rows affected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowResult {
    pub rows_affected: u64,
}

/// A statement ready to be written.
struct Unit<'a> {
    stmt: &'a mut dyn Descriptor,
    params: &'a mut ParameterList,
}

/// Messages written for a [`Unit`].
struct Plan {
    close: bool,
    parse: bool,
    describe: bool,
    types: Vec<Oid>,
    formats: Vec<PgFormat>,
    values: Vec<WireValue>,
}

/// Execute a prepared query.
///
/// Returns the result of each statement. Parameters are validated before
/// anything is sent.
pub fn execute(
    query: &mut Query,
    params: &mut Parameters,
    mut io: impl PgTransport,
) -> Result<Vec<RowResult>> {
    let units = match (query, params) {
        (Query::Simple(stmt), Parameters::Simple(params)) => vec![Unit { stmt, params }],
        (Query::Batched(stmt), Parameters::Simple(params)) => {
            return execute_row(stmt, params, &mut io);
        },
        (Query::Composite(stmt), Parameters::Composite(params)) => {
            if stmt.statements().len() != params.lists().len() {
                return Err(BindError::Incompatible.into());
            }
            stmt.statements_mut()
                .iter_mut()
                .zip(params.lists_mut())
                .map(|(stmt, params)| Unit { stmt: stmt as &mut dyn Descriptor, params })
                .collect()
        },
        _ => return Err(BindError::Incompatible.into()),
    };
    run(units, &mut io)
}

/// Execute a single row in the single row shape of a batched statement.
///
/// Queued rows are dropped.
fn execute_row(
    stmt: &mut BatchedStatement,
    params: &mut ParameterList,
    io: &mut impl PgTransport,
) -> Result<Vec<RowResult>> {
    if params.len() != stmt.arity() {
        return Err(BindError::IndexOutOfRange { index: params.len(), len: stmt.arity() }.into());
    }
    stmt.reset();
    run(vec![Unit { stmt, params }], io)
}

/// Execute the rows queued in a batched statement.
///
/// Returns `None` if nothing is queued. The statement is not reset.
pub(crate) fn execute_batched(
    stmt: &mut BatchedStatement,
    io: &mut impl PgTransport,
) -> Option<Result<Vec<RowResult>>> {
    let mut params = stmt.take_pending()?;
    Some(run(vec![Unit { stmt, params: &mut params }], io))
}

/// Close server side statements.
pub fn close(names: &[StatementName], mut io: impl PgTransport) -> Result<()> {
    let names = names.iter().filter(|e| !e.is_unnamed()).collect::<Vec<_>>();
    if names.is_empty() {
        return Ok(());
    }

    let mut buf = BytesMut::new();
    for name in &names {
        verbose!(name = %name, "close");
        frontend::write(Close { variant: b'S', name: name.as_str() }, &mut buf);
    }
    frontend::write(Sync, &mut buf);
    io.send(&buf)?;

    let result = read_close(names.len(), &mut io);
    drain_on_error(result, &mut io)
}

fn read_close(count: usize, io: &mut impl PgTransport) -> Result<()> {
    for _ in 0..count {
        match recv(io)? {
            BackendMessage::CloseComplete(_) => {},
            msg => return Err(msg.unexpected("close").into()),
        }
    }
    ready(io)
}

fn run(mut units: Vec<Unit<'_>>, io: &mut impl PgTransport) -> Result<Vec<RowResult>> {
    span!("execute", statements = units.len());

    let plans = units.iter().map(plan).collect::<Result<Vec<_>, BindError>>()?;

    let mut buf = BytesMut::new();
    let portal = PortalName::unnamed();
    for (unit, plan) in units.iter().zip(&plans) {
        write_unit(unit, plan, &portal, &mut buf);
    }
    frontend::write(Sync, &mut buf);
    io.send(&buf)?;

    let result = read_responses(&mut units, plans, io);
    drain_on_error(result, io)
}

/// Validate parameters and decide which messages to write.
fn plan(unit: &Unit<'_>) -> Result<Plan, BindError> {
    let stmt = &*unit.stmt;
    let params = &*unit.params;
    let count = stmt.fragments().placeholder_count();

    if count > MAX_PARAMETERS {
        return Err(BindError::TooManyParameters { count });
    }
    if params.len() != count {
        return Err(BindError::IndexOutOfRange { index: params.len(), len: count });
    }
    params.check_all_set()?;

    let types = params
        .type_oids()
        .into_iter()
        .zip(stmt.parameter_types())
        .map(|(param, described)| match param {
            oid::UNSPECIFIED => *described,
            param => param,
        })
        .collect::<Vec<_>>();

    let prepared = stmt.is_prepared_for(&types);
    let close = !prepared && stmt.is_parsed();
    Ok(Plan {
        close,
        parse: !prepared,
        // closing forgets the description
        describe: close || !stmt.is_described(),
        formats: params.formats().collect(),
        values: params.wire_values()?,
        types,
    })
}

fn write_unit(unit: &Unit<'_>, plan: &Plan, portal: &PortalName, buf: &mut BytesMut) {
    let name = unit.stmt.statement_name().as_str();

    if plan.close {
        verbose!(name, "close incompatible statement");
        frontend::write(Close { variant: b'S', name }, buf);
    }

    if plan.parse {
        verbose!(name, sql = unit.stmt.sql(), "parse");
        frontend::write(Parse {
            prepare_name: name,
            sql: unit.stmt.sql(),
            oids_len: plan.types.len().to_u16(),
            oids: plan.types.iter().copied(),
        }, buf);
    }

    if plan.describe {
        frontend::write(Describe { kind: b'S', name }, buf);
    }

    let params_size_hint = plan
        .values
        .iter()
        .map(|e| 4 + e.size().max(0) as u32)
        .sum();

    frontend::write(Bind {
        portal_name: portal.as_str(),
        stmt_name: name,
        param_formats_len: plan.formats.len().to_u16(),
        param_formats: plan.formats.iter().copied(),
        params_len: plan.values.len().to_u16(),
        params_size_hint,
        params: plan.values.iter().map(WireValue::clone),
        result_formats_len: 0,
        result_formats: [PgFormat::Text; 0],
    }, buf);

    frontend::write(Execute { portal_name: portal.as_str(), max_row: 0 }, buf);
}

fn read_responses(
    units: &mut [Unit<'_>],
    plans: Vec<Plan>,
    io: &mut impl PgTransport,
) -> Result<Vec<RowResult>> {
    let mut results = Vec::with_capacity(units.len());

    for (unit, plan) in units.iter_mut().zip(plans) {
        if plan.close {
            match recv(io)? {
                BackendMessage::CloseComplete(_) => unit.stmt.set_prepared(None),
                msg => return Err(msg.unexpected("close").into()),
            }
        }

        if plan.parse {
            match recv(io)? {
                BackendMessage::ParseComplete(_) => unit.stmt.set_prepared(Some(plan.types)),
                msg => return Err(msg.unexpected("parse").into()),
            }
        }

        if plan.describe {
            match recv(io)? {
                BackendMessage::ParameterDescription(desc) => resolve_types(unit, &desc)?,
                msg => return Err(msg.unexpected("describe").into()),
            }
            match recv(io)? {
                BackendMessage::RowDescription(desc) => unit.stmt.set_fields(Field::decode_all(&desc)?),
                BackendMessage::NoData(_) => unit.stmt.set_fields(vec![]),
                msg => return Err(msg.unexpected("describe").into()),
            }
        }

        match recv(io)? {
            BackendMessage::BindComplete(_) => {},
            msg => return Err(msg.unexpected("bind").into()),
        }

        let mut rows = 0u64;
        let rows_affected = loop {
            match recv(io)? {
                BackendMessage::DataRow(_) => rows += 1,
                BackendMessage::CommandComplete(cmd) => break cmd.rows_affected(),
                BackendMessage::EmptyQueryResponse(_) => break 0,
                BackendMessage::PortalSuspended(_) => break rows,
                msg => return Err(msg.unexpected("execute").into()),
            }
        };
        verbose!(rows, rows_affected, "complete");
        results.push(RowResult { rows_affected });
    }

    ready(io)?;
    Ok(results)
}

/// Apply server reported parameter types.
///
/// Only unspecified parameter types are resolved, bound types are kept.
fn resolve_types(unit: &mut Unit<'_>, desc: &ParameterDescription) -> Result<()> {
    let oids = desc.oids()?;
    unit.stmt.set_types(&oids);
    for (i, resolved) in oids.into_iter().enumerate() {
        if matches!(unit.params.oid(i + 1), Ok(oid::UNSPECIFIED)) {
            unit.params.set_resolved_type(i + 1, resolved)?;
        }
    }
    Ok(())
}

fn recv(io: &mut impl PgTransport) -> Result<BackendMessage> {
    match io.recv_message()? {
        BackendMessage::ErrorResponse(err) => Err(err.into()),
        msg => Ok(msg),
    }
}

fn ready(io: &mut impl PgTransport) -> Result<()> {
    match recv(io)? {
        BackendMessage::ReadyForQuery(_) => Ok(()),
        msg => Err(msg.unexpected("sync").into()),
    }
}

/// After an `ErrorResponse` the server discards messages until `Sync`,
/// read everything until `ReadyForQuery` so the connection can be reused.
fn drain_on_error<T>(result: Result<T>, io: &mut impl PgTransport) -> Result<T> {
    let err = match result {
        Err(err) if err.is_database() => err,
        result => return result,
    };

    #[cfg(feature = "log")]
    log::error!("{err:#}");

    loop {
        match io.recv_message()? {
            BackendMessage::ReadyForQuery(_) => return Err(err),
            _ => continue,
        }
    }
}
