use crate::{
    common::ByteStr,
    ext::BytesExt,
    postgres::{Oid, PgFormat, ProtocolError, backend::RowDescription},
};

/// Result column metadata of a described statement.
#[derive(Debug, Clone)]
pub struct Field {
    /// The field name.
    pub name: ByteStr,
    /// If the field can be identified as a column of a specific table, the object ID of the table; otherwise zero.
    pub table_oid: Oid,
    /// If the field can be identified as a column of a specific table, the attribute number of the column; otherwise zero.
    pub column: i16,
    /// The object ID of the field's data type.
    pub type_oid: Oid,
    /// The data type size (see pg_type.typlen). Note that negative values denote variable-width types.
    pub type_size: i16,
    /// The type modifier (see pg_attribute.atttypmod). The meaning of the modifier is type-specific.
    pub type_modifier: i32,
    /// The format code being used for the field.
    ///
    /// In a `RowDescription` returned from the statement variant of `Describe`,
    /// the format code is not yet known and will always be zero.
    pub format: PgFormat,
}

impl Field {
    /// Decode every field in a `RowDescription`.
    pub fn decode_all(desc: &RowDescription) -> Result<Vec<Field>, ProtocolError> {
        let mut body = desc.body.clone();
        let mut fields = Vec::with_capacity(desc.field_len as usize);
        for _ in 0..desc.field_len {
            fields.push(Field {
                name: body.get_nul_bytestr()?,
                table_oid: body.read_u32()?,
                column: body.read_i16()?,
                type_oid: body.read_u32()?,
                type_size: body.read_i16()?,
                type_modifier: body.read_i32()?,
                format: PgFormat::from_code(body.read_i16()?)
                    .ok_or(ProtocolError::malformed("unknown format code"))?,
            });
        }
        Ok(fields)
    }
}
