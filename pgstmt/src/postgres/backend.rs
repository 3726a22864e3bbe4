//! Postgres Backend Messages
//!
//! Only the messages which can appear during an extended query cycle are decoded.
use bytes::Bytes;
use std::fmt;

use super::{Oid, ProtocolError};
use crate::{common::ByteStr, ext::BytesExt};

/// A type that can be decoded into postgres backend message
pub trait BackendProtocol: Sized {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self,ProtocolError>;
}

/// Postgres backend messages
#[derive(Debug)]
pub enum BackendMessage {
    BindComplete(BindComplete),
    CloseComplete(CloseComplete),
    CommandComplete(CommandComplete),
    DataRow(DataRow),
    ErrorResponse(ErrorResponse),
    EmptyQueryResponse(EmptyQueryResponse),
    NoData(NoData),
    NoticeResponse(NoticeResponse),
    ParameterDescription(ParameterDescription),
    ParameterStatus(ParameterStatus),
    ParseComplete(ParseComplete),
    PortalSuspended(PortalSuspended),
    ReadyForQuery(ReadyForQuery),
    RowDescription(RowDescription),
}

macro_rules! match_backend {
    ($($name:ident,)*) => {
        impl BackendMessage {
            pub fn msgtype(&self) -> u8 {
                match self {
                    $(Self::$name(_) => $name::MSGTYPE,)*
                }
            }

            /// Get message name from message type.
            ///
            /// Returns `"Unknown"` for unknown message type.
            pub fn message_name(msgtype: u8) -> &'static str {
                match msgtype {
                    $($name::MSGTYPE => stringify!($name),)*
                    _ => "Unknown",
                }
            }
        }
        impl BackendProtocol for BackendMessage {
            fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
                let message = match msgtype {
                    $($name::MSGTYPE => Self::$name(<$name as BackendProtocol>::decode(msgtype, body)?),)*
                    _ => return Err(ProtocolError::unknown(msgtype)),
                };
                Ok(message)
            }
        }
    };
}

match_backend! {
    BindComplete,
    CloseComplete,
    CommandComplete,
    DataRow,
    ErrorResponse,
    EmptyQueryResponse,
    NoData,
    NoticeResponse,
    ParameterDescription,
    ParameterStatus,
    ParseComplete,
    PortalSuspended,
    ReadyForQuery,
    RowDescription,
}

impl BackendMessage {
    /// Create [`ProtocolError`] for message that is not expected in `phase`.
    pub fn unexpected(&self, phase: &'static str) -> ProtocolError {
        ProtocolError::unexpected_phase(self.msgtype(), phase)
    }
}

macro_rules! assert_msgtype {
    ($typ:ident) => {
        if Self::MSGTYPE != $typ {
            return Err(ProtocolError::unexpected(Self::MSGTYPE,$typ))
        }
    };
}

/// Identifies the message as a run-time parameter status report
#[derive(Debug)]
pub struct ParameterStatus {
    /// The name of the run-time parameter being reported
    pub name: ByteStr,
    /// The current value of the parameter
    pub value: ByteStr,
}

impl ParameterStatus {
    pub const MSGTYPE: u8 = b'S';
}

impl BackendProtocol for ParameterStatus {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            name: body.get_nul_bytestr()?,
            value: body.get_nul_bytestr()?,
        })
    }
}

/// Find a field in `ErrorResponse` or `NoticeResponse` body.
///
/// Unrecognized, malformed or non utf8 fields are ignored.
fn find_field(body: &[u8], code: u8) -> Option<&str> {
    let mut body = body;
    while let Some((&ty, rest)) = body.split_first() {
        if ty == b'\0' {
            break;
        }
        let end = rest.iter().position(|e| matches!(e, b'\0'))?;
        if ty == code {
            return std::str::from_utf8(&rest[..end]).ok();
        }
        body = &rest[end + 1..];
    }
    None
}

macro_rules! fields_msg {
    ($(#[$doc:meta])* struct $name:ident, $ty:literal;) => {
        $(#[$doc])*
        pub struct $name {
            pub body: Bytes,
        }

        impl $name {
            pub const MSGTYPE: u8 = $ty;

            /// Returns a field value by its type code.
            pub fn field(&self, code: u8) -> Option<&str> {
                find_field(&self.body, code)
            }

            /// Severity, either localized (`S`) or non localized (`V`).
            pub fn severity(&self) -> &str {
                self.field(b'V').or_else(|| self.field(b'S')).unwrap_or("ERROR")
            }

            /// The SQLSTATE code for the error.
            pub fn code(&self) -> &str {
                self.field(b'C').unwrap_or_default()
            }

            /// The primary human-readable error message.
            pub fn message(&self) -> &str {
                self.field(b'M').unwrap_or_default()
            }
        }

        impl BackendProtocol for $name {
            fn decode(msgtype: u8, body: Bytes) -> Result<Self,ProtocolError> {
                assert_msgtype!(msgtype);
                Ok(Self { body })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}: {}", self.severity(), self.message())?;
                if let Some(detail) = self.field(b'D') {
                    write!(f, ", {detail}")?;
                }
                if !self.code().is_empty() {
                    write!(f, " ({})", self.code())?;
                }
                Ok(())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "\"{self}\"")
            }
        }
    };
}

fields_msg! {
    /// A warning message. The frontend should display the message.
    struct NoticeResponse, b'N';
}

fields_msg! {
    /// Identifies the message as an error
    ///
    /// The message body consists of one or more identified fields, followed by a zero byte as a terminator.
    /// Fields can appear in any order.
    ///
    /// For each field there is the following:
    ///
    /// `Byte1` A code identifying the field type; if zero, this is the message terminator and no string follows.
    /// Since more field types might be added in future,
    /// frontends should silently ignore fields of unrecognized type.
    ///
    /// `String` The field value.
    struct ErrorResponse, b'E';
}

impl std::error::Error for ErrorResponse { }

/// Identifies the message as a row description
#[derive(Debug)]
pub struct RowDescription {
    /// Specifies the number of fields in a row (can be zero).
    pub field_len: u16,
    /// Undecoded response body.
    ///
    /// Decoded by [`Field::decode_all`][crate::statement::Field::decode_all].
    pub body: Bytes,
}

impl RowDescription {
    pub const MSGTYPE: u8 = b'T';
}

impl BackendProtocol for RowDescription {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            field_len: body.read_u16()?,
            body,
        })
    }
}

#[derive(Debug)]
/// Identifies the message as a data row.
pub struct DataRow {
    /// The number of column values that follow (possibly zero).
    pub column_len: u16,
    pub body: Bytes,
}

impl DataRow {
    pub const MSGTYPE: u8 = b'D';
}

impl BackendProtocol for DataRow {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            column_len: body.read_u16()?,
            body,
        })
    }
}

/// Identifies the message as a command-completed response
///
/// For an INSERT command, the tag is INSERT oid rows, where rows is the number of rows inserted.
/// oid used to be the object ID of the inserted row if rows was 1 and the target table had OIDs,
/// but OIDs system columns are not supported anymore; therefore oid is always 0.
///
/// For a DELETE command, the tag is DELETE rows where rows is the number of rows deleted.
///
/// For an UPDATE command, the tag is UPDATE rows where rows is the number of rows updated.
///
/// For a MERGE command, the tag is MERGE rows where rows is the number of rows inserted, updated, or deleted.
///
/// For a SELECT or CREATE TABLE AS command, the tag is SELECT rows where rows is the number of rows retrieved.
#[derive(Debug)]
pub struct CommandComplete {
    /// The command tag. This is usually a single word that identifies which SQL command was completed.
    pub tag: ByteStr,
}

impl CommandComplete {
    pub const MSGTYPE: u8 = b'C';

    /// Returns the number of rows affected reported in the command tag.
    ///
    /// Returns zero for commands which does not report any.
    pub fn rows_affected(&self) -> u64 {
        let mut whs = self.tag.split_whitespace();
        let Some(tag) = whs.next() else {
            return 0;
        };
        let Some(rows) = whs.next() else {
            return 0;
        };
        match tag {
            "INSERT" => whs.next().unwrap_or_default(),
            "SELECT" => rows,
            "UPDATE" => rows,
            "DELETE" => rows,
            "MERGE" => rows,
            "FETCH" => rows,
            "MOVE" => rows,
            "COPY" => rows,
            _ => return 0,
        }
        .parse()
        .unwrap_or_default()
    }
}

impl BackendProtocol for CommandComplete {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            tag: body.get_nul_bytestr()?,
        })
    }
}

/// Identifies the message as a parameter description.
#[derive(Debug)]
pub struct ParameterDescription {
    /// The number of parameters used by the statement (can be zero).
    pub param_len: u16,
    /// Then, for each parameter, there is the following:
    ///
    /// Specifies the object ID of the parameter data type.
    pub oids: Bytes,
}

impl ParameterDescription  {
    pub const MSGTYPE: u8 = b't';

    /// Decode the parameter type oids.
    pub fn oids(&self) -> Result<Vec<Oid>, ProtocolError> {
        let mut body = self.oids.clone();
        (0..self.param_len).map(|_| body.read_u32()).collect()
    }
}

impl BackendProtocol for ParameterDescription {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            param_len: body.read_u16()?,
            oids: body,
        })
    }
}

macro_rules! unit_msg {
    ($(
        $(#[$doc:meta])* struct $name:ident, $ty:literal;
    )*) => {$(
            $(#[$doc])*
            #[derive(Debug)]
            pub struct $name;

            impl $name {
                pub const MSGTYPE: u8 = $ty;
            }

            impl BackendProtocol for $name {
                fn decode(msgtype: u8, _: Bytes) -> Result<Self,ProtocolError> {
                    if $name::MSGTYPE != msgtype {
                        return Err(ProtocolError::unexpected(Self::MSGTYPE,msgtype))
                    }
                    Ok(Self)
                }
            }
    )*};
}

unit_msg! {
    /// Identifies the message as a Bind-complete indicator.
    struct BindComplete, b'2';

    /// Identifies the message as a Close-complete indicator.
    struct CloseComplete, b'3';

    /// Identifies the message as a response to an empty query string.
    ///
    /// This substitutes for CommandComplete.
    struct EmptyQueryResponse, b'I';

    /// Identifies the message as a no-data indicator.
    struct NoData, b'n';

    /// Identifies the message as a Parse-complete indicator.
    struct ParseComplete, b'1';

    /// Identifies the message as a portal-suspended indicator.
    ///
    /// Note this only appears if an Execute message's row-count limit was reached.
    struct PortalSuspended, b's';

    /// Identifies the message type. ReadyForQuery is sent whenever the backend is ready for a new query cycle.
    struct ReadyForQuery, b'Z';
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn command_tag() {
        let cmd = CommandComplete::decode(b'C', Bytes::from_static(b"INSERT 0 4\0")).unwrap();
        assert_eq!(cmd.rows_affected(), 4);
        let cmd = CommandComplete::decode(b'C', Bytes::from_static(b"CREATE TABLE\0")).unwrap();
        assert_eq!(cmd.rows_affected(), 0);
    }

    #[test]
    fn error_fields() {
        let body = Bytes::from_static(b"SERROR\0VERROR\0C23505\0Mduplicate key\0\0");
        let err = ErrorResponse::decode(b'E', body).unwrap();
        assert_eq!(err.code(), "23505");
        assert_eq!(err.message(), "duplicate key");
        assert_eq!(err.to_string(), "ERROR: duplicate key (23505)");
    }

    #[test]
    fn parameter_oids() {
        let body = Bytes::from_static(b"\x00\x02\x00\x00\x00\x17\x00\x00\x04\x3a");
        let desc = ParameterDescription::decode(b't', body).unwrap();
        assert_eq!(desc.oids().unwrap(), [23, 1082]);

        let desc = ParameterDescription::decode(b't', Bytes::from_static(b"\x00\x02\x00")).unwrap();
        assert!(desc.oids().is_err());
    }

    #[test]
    fn wrong_msgtype() {
        assert!(ParseComplete::decode(b'2', Bytes::new()).is_err());
        assert!(BackendMessage::decode(b'!', Bytes::new()).is_err());
    }
}
