//! Bound statement parameters.
//!
//! Parameters are addressed 1-based, matching the `$n` numbering on the wire.
use bytes::{Buf, BufMut, Bytes};
use std::{cell::OnceCell, fmt};

use crate::{
    encode::Encode,
    ext::BindParams,
    postgres::{Oid, PgFormat, oid},
    transport::Capabilities,
    value::Value,
};

mod composite;

pub use composite::CompositeParameterList;

/// Maximum number of parameters a `Bind` message can carry.
pub const MAX_PARAMETERS: usize = u16::MAX as usize;

/// Parameter direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Never bound nor registered as output.
    #[default]
    Unset,
    In,
    Out,
    InOut,
}

impl Direction {
    fn with_in(self) -> Direction {
        match self {
            Direction::Unset | Direction::In => Direction::In,
            Direction::Out | Direction::InOut => Direction::InOut,
        }
    }

    fn with_out(self) -> Direction {
        match self {
            Direction::Unset | Direction::Out => Direction::Out,
            Direction::In | Direction::InOut => Direction::InOut,
        }
    }

    pub fn is_in(&self) -> bool {
        matches!(self, Direction::In | Direction::InOut)
    }

    pub fn is_out(&self) -> bool {
        matches!(self, Direction::Out | Direction::InOut)
    }
}

#[derive(Clone, PartialEq)]
enum Slot {
    Unbound,
    Null,
    Bound(Value),
}

#[derive(Clone)]
struct Param {
    slot: Slot,
    oid: Oid,
    direction: Direction,
    format: PgFormat,
    /// Wire encoding of text values.
    encoded: OnceCell<Bytes>,
}

impl Param {
    const fn unbound() -> Param {
        Param {
            slot: Slot::Unbound,
            oid: oid::UNSPECIFIED,
            direction: Direction::Unset,
            format: PgFormat::Text,
            encoded: OnceCell::new(),
        }
    }

    fn bytes(&self) -> Option<&Bytes> {
        match &self.slot {
            Slot::Bound(Value::Binary(bytes)) => Some(bytes),
            Slot::Bound(Value::Text(text)) => {
                Some(self.encoded.get_or_init(|| text.clone().into_bytes()))
            },
            Slot::Unbound | Slot::Null => None,
        }
    }
}

/// Parameter value ready to be written in a `Bind` message.
#[derive(Clone)]
pub struct WireValue {
    size: i32,
    value: Bytes,
}

impl WireValue {
    fn null() -> WireValue {
        WireValue { size: -1, value: Bytes::new() }
    }
}

impl Buf for WireValue {
    fn remaining(&self) -> usize {
        self.value.remaining()
    }

    fn chunk(&self) -> &[u8] {
        self.value.chunk()
    }

    fn advance(&mut self, cnt: usize) {
        self.value.advance(cnt);
    }
}

impl BindParams for WireValue {
    fn size(&self) -> i32 {
        self.size
    }
}

/// Ordered parameters of a single statement.
#[derive(Clone, Default)]
pub struct ParameterList {
    params: Vec<Param>,
}

impl ParameterList {
    /// Create list of `count` unbound parameters.
    pub fn new(count: usize) -> ParameterList {
        Self { params: vec![Param::unbound(); count] }
    }

    /// Returns the number of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns `true` if there is no parameters.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    fn get(&self, index: usize) -> Result<&Param, BindError> {
        match index.checked_sub(1).and_then(|i| self.params.get(i)) {
            Some(param) => Ok(param),
            None => Err(BindError::IndexOutOfRange { index, len: self.len() }),
        }
    }

    /// Get mutable parameter, growing the list when `index` is past the end.
    fn get_mut(&mut self, index: usize) -> Result<&mut Param, BindError> {
        if index == 0 {
            return Err(BindError::IndexOutOfRange { index, len: self.len() });
        }
        if index > MAX_PARAMETERS {
            return Err(BindError::TooManyParameters { count: index });
        }
        if index > self.len() {
            self.resize(index);
        }
        Ok(&mut self.params[index - 1])
    }

    /// Bind a value with its type oid.
    ///
    /// The transfer format follows the [`Value`] variant.
    pub fn bind(&mut self, index: usize, value: Value, oid: Oid) -> Result<(), BindError> {
        let param = self.get_mut(index)?;
        param.format = value.format();
        param.slot = Slot::Bound(value);
        param.oid = oid;
        param.direction = param.direction.with_in();
        param.encoded = OnceCell::new();
        Ok(())
    }

    /// Bind an [`Encode`] value.
    pub fn bind_value(&mut self, index: usize, value: impl Encode) -> Result<(), BindError> {
        match value.encode().into_parts() {
            (Some(value), oid) => self.bind(index, value, oid),
            (None, oid) => self.bind_null(index, oid),
        }
    }

    /// Bind `NULL` with declared type.
    ///
    /// An unspecified `oid` keeps a type already resolved for this parameter.
    pub fn bind_null(&mut self, index: usize, oid: Oid) -> Result<(), BindError> {
        self.bind_null_as(index, oid, PgFormat::Text)
    }

    /// Bind `NULL` with declared type, sending it in binary format when the server
    /// supports binary transfer of `oid`.
    pub fn bind_null_for(&mut self, index: usize, oid: Oid, caps: &Capabilities) -> Result<(), BindError> {
        let format = match caps.supports_binary_transfer_for(oid) {
            true => PgFormat::Binary,
            false => PgFormat::Text,
        };
        self.bind_null_as(index, oid, format)
    }

    fn bind_null_as(&mut self, index: usize, oid: Oid, format: PgFormat) -> Result<(), BindError> {
        let param = self.get_mut(index)?;
        if oid != oid::UNSPECIFIED {
            param.oid = oid;
        }
        param.slot = Slot::Null;
        param.format = format;
        param.direction = param.direction.with_in();
        param.encoded = OnceCell::new();
        Ok(())
    }

    /// Register parameter as output.
    ///
    /// An output only parameter is sent as `NULL` of type `void`.
    pub fn mark_output(&mut self, index: usize) -> Result<(), BindError> {
        let param = self.get_mut(index)?;
        param.direction = param.direction.with_out();
        if param.direction == Direction::Out {
            param.slot = Slot::Null;
            param.oid = oid::VOID;
            param.format = PgFormat::Text;
        }
        Ok(())
    }

    /// Returns the parameter type oid.
    pub fn oid(&self, index: usize) -> Result<Oid, BindError> {
        Ok(self.get(index)?.oid)
    }

    /// Returns the parameter direction.
    pub fn direction(&self, index: usize) -> Result<Direction, BindError> {
        Ok(self.get(index)?.direction)
    }

    /// Returns the parameter transfer format.
    pub fn format(&self, index: usize) -> Result<PgFormat, BindError> {
        Ok(self.get(index)?.format)
    }

    /// Returns `true` if the parameter is bound, including to `NULL`.
    pub fn is_bound(&self, index: usize) -> Result<bool, BindError> {
        Ok(self.get(index)?.slot != Slot::Unbound)
    }

    /// Returns the bound value, `None` for `NULL`.
    pub fn value(&self, index: usize) -> Result<Option<&Value>, BindError> {
        match &self.get(index)?.slot {
            Slot::Unbound => Err(BindError::Unbound { index }),
            Slot::Null => Ok(None),
            Slot::Bound(value) => Ok(Some(value)),
        }
    }

    /// Returns every parameter type oid.
    pub fn type_oids(&self) -> Vec<Oid> {
        self.params.iter().map(|e| e.oid).collect()
    }

    /// Returns every parameter transfer format.
    pub fn formats(&self) -> impl ExactSizeIterator<Item = PgFormat> + '_ {
        self.params.iter().map(|e| e.format)
    }

    /// Returns `true` if any parameter type is still unspecified.
    pub fn has_unresolved_types(&self) -> bool {
        self.params.iter().any(|e| e.oid == oid::UNSPECIFIED)
    }

    /// Returns `true` if every parameter type is resolved.
    pub fn is_fully_resolved(&self) -> bool {
        !self.has_unresolved_types()
    }

    /// Set a type reported by the server.
    ///
    /// Returns [`BindError::TypeConflict`] if the parameter already has a different type.
    pub fn set_resolved_type(&mut self, index: usize, oid: Oid) -> Result<(), BindError> {
        let param = self.get_mut(index)?;
        if param.oid == oid::UNSPECIFIED {
            param.oid = oid;
        } else if param.oid != oid {
            return Err(BindError::TypeConflict { index, resolved: param.oid, found: oid });
        }
        Ok(())
    }

    /// Size of the parameter value on the wire, `-1` for `NULL`.
    pub fn wire_length(&self, index: usize) -> Result<i32, BindError> {
        let param = self.get(index)?;
        match param.slot {
            Slot::Unbound => Err(BindError::Unbound { index }),
            Slot::Null => Ok(-1),
            Slot::Bound(_) => {
                let len = param.bytes().map_or(0, Bytes::len);
                i32::try_from(len).map_err(|_| BindError::ValueTooLarge { index, len })
            },
        }
    }

    /// Write the parameter value to `buf`.
    ///
    /// Nothing is written for `NULL`, its length alone marks it.
    pub fn serialize(&self, index: usize, mut buf: impl BufMut) -> Result<(), BindError> {
        self.wire_length(index)?;
        if let Some(bytes) = self.get(index)?.bytes() {
            buf.put_slice(bytes);
        }
        Ok(())
    }

    /// Returns the parameter value for a `Bind` message.
    pub fn wire_value(&self, index: usize) -> Result<WireValue, BindError> {
        let size = self.wire_length(index)?;
        match self.get(index)?.bytes() {
            Some(bytes) => Ok(WireValue { size, value: bytes.clone() }),
            None => Ok(WireValue::null()),
        }
    }

    /// Returns every parameter value for a `Bind` message.
    pub fn wire_values(&self) -> Result<Vec<WireValue>, BindError> {
        (1..=self.len()).map(|i| self.wire_value(i)).collect()
    }

    /// Returns [`BindError::Unbound`] for the first unbound parameter.
    pub fn check_all_set(&self) -> Result<(), BindError> {
        match self.params.iter().position(|e| e.slot == Slot::Unbound) {
            Some(i) => Err(BindError::Unbound { index: i + 1 }),
            None => Ok(()),
        }
    }

    /// Returns the number of input parameters.
    pub fn in_count(&self) -> usize {
        self.params.iter().filter(|e| e.direction.is_in()).count()
    }

    /// Returns the number of output parameters.
    ///
    /// A function call always returns at least one value, so this is never zero.
    pub fn out_count(&self) -> usize {
        self.params.iter().filter(|e| e.direction.is_out()).count().max(1)
    }

    /// Append parameters of `other`.
    ///
    /// Values are copied, `other` can be dropped afterwards.
    pub fn merge(&mut self, other: &ParameterList) -> Result<(), BindError> {
        let count = self.len() + other.len();
        if count > MAX_PARAMETERS {
            return Err(BindError::TooManyParameters { count });
        }
        self.append(other);
        Ok(())
    }

    /// Append without limit check, caller guarantee the count.
    pub(crate) fn append(&mut self, other: &ParameterList) {
        self.params.extend_from_slice(&other.params);
    }

    /// Replace all parameters with a copy of `other`.
    pub fn replace(&mut self, other: &ParameterList) {
        self.params.clone_from(&other.params);
    }

    /// Unbind all parameters, the length is kept.
    pub fn clear(&mut self) {
        self.params.fill(Param::unbound());
    }

    /// Grow with unbound parameters or shrink to `count`.
    pub fn resize(&mut self, count: usize) {
        self.params.resize(count, Param::unbound());
    }

    /// Render parameter as sql literal, for logging.
    ///
    /// Unbound parameter renders as `?`, and binary values other than
    /// numbers and booleans render as `?` too.
    pub fn to_literal(&self, index: usize, caps: &Capabilities) -> Result<String, BindError> {
        let param = self.get(index)?;
        let value = match &param.slot {
            Slot::Unbound => return Ok("?".into()),
            Slot::Null => return Ok("NULL".into()),
            Slot::Bound(Value::Binary(bytes)) => return Ok(binary_literal(param.oid, bytes)),
            Slot::Bound(Value::Text(text)) => text,
        };

        let scs = caps.standard_conforming_strings;
        let mut literal = String::with_capacity(3 + value.len() * 11 / 10);
        if value.contains('\\') && !scs && caps.supports_extended_escapes {
            literal.push('E');
        }
        literal.push('\'');
        let start = literal.len();
        if escape_literal(&mut literal, value, scs).is_err() {
            // not meant to be sent anyway, keep the raw value
            literal.truncate(start);
            literal.push_str(value);
        }
        literal.push('\'');
        Ok(literal)
    }
}

/// Escape string literal content, fails on nul which cannot be represented.
fn escape_literal(buf: &mut String, value: &str, standard_conforming_strings: bool) -> Result<(), ()> {
    for ch in value.chars() {
        match ch {
            '\0' => return Err(()),
            '\'' => buf.push_str("''"),
            '\\' if !standard_conforming_strings => buf.push_str("\\\\"),
            ch => buf.push(ch),
        }
    }
    Ok(())
}

fn binary_literal(oid: Oid, bytes: &[u8]) -> String {
    macro_rules! number {
        ($ty:ty) => {
            match <[u8; size_of::<$ty>()]>::try_from(bytes) {
                Ok(be) => <$ty>::from_be_bytes(be).to_string(),
                Err(_) => "?".into(),
            }
        };
    }
    match oid {
        oid::INT2 => number!(i16),
        oid::INT4 => number!(i32),
        oid::INT8 => number!(i64),
        oid::FLOAT4 => number!(f32),
        oid::FLOAT8 => number!(f64),
        oid::BOOL => match bytes {
            [0] => "false".into(),
            [_] => "true".into(),
            _ => "?".into(),
        },
        _ => "?".into(),
    }
}

impl fmt::Debug for ParameterList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for param in &self.params {
            match &param.slot {
                Slot::Unbound => list.entry(&format_args!("?")),
                Slot::Null => list.entry(&format_args!("NULL::{}", param.oid)),
                Slot::Bound(value) => list.entry(&format_args!("{value:?}::{}", param.oid)),
            };
        }
        list.finish()
    }
}

/// Parameters of a [`Query`][crate::statement::Query].
#[derive(Debug, Clone)]
pub enum Parameters {
    Simple(ParameterList),
    Composite(CompositeParameterList),
}

macro_rules! delegate {
    ($(#[$doc:meta])* fn $name:ident(&self $(, $arg:ident: $ty:ty)*) -> $ret:ty;) => {
        $(#[$doc])*
        pub fn $name(&self $(, $arg: $ty)*) -> $ret {
            match self {
                Parameters::Simple(list) => list.$name($($arg),*),
                Parameters::Composite(list) => list.$name($($arg),*),
            }
        }
    };
    ($(#[$doc:meta])* fn $name:ident(&mut self $(, $arg:ident: $ty:ty)*) -> $ret:ty;) => {
        $(#[$doc])*
        pub fn $name(&mut self $(, $arg: $ty)*) -> $ret {
            match self {
                Parameters::Simple(list) => list.$name($($arg),*),
                Parameters::Composite(list) => list.$name($($arg),*),
            }
        }
    };
}

impl Parameters {
    delegate! {
        /// See [`ParameterList::bind`].
        fn bind(&mut self, index: usize, value: Value, oid: Oid) -> Result<(), BindError>;
    }
    delegate! {
        /// See [`ParameterList::bind_null`].
        fn bind_null(&mut self, index: usize, oid: Oid) -> Result<(), BindError>;
    }
    delegate! {
        /// See [`ParameterList::mark_output`].
        fn mark_output(&mut self, index: usize) -> Result<(), BindError>;
    }
    delegate! {
        /// See [`ParameterList::wire_length`].
        fn wire_length(&self, index: usize) -> Result<i32, BindError>;
    }
    delegate! {
        /// See [`ParameterList::set_resolved_type`].
        fn set_resolved_type(&mut self, index: usize, oid: Oid) -> Result<(), BindError>;
    }
    delegate! {
        /// See [`ParameterList::to_literal`].
        fn to_literal(&self, index: usize, caps: &Capabilities) -> Result<String, BindError>;
    }
    delegate! {
        /// See [`ParameterList::check_all_set`].
        fn check_all_set(&self) -> Result<(), BindError>;
    }
    delegate! {
        /// See [`ParameterList::has_unresolved_types`].
        fn has_unresolved_types(&self) -> bool;
    }
    delegate! {
        /// See [`ParameterList::type_oids`].
        fn type_oids(&self) -> Vec<Oid>;
    }
    delegate! {
        /// See [`ParameterList::in_count`].
        fn in_count(&self) -> usize;
    }
    delegate! {
        /// See [`ParameterList::out_count`].
        fn out_count(&self) -> usize;
    }
    delegate! {
        /// See [`ParameterList::clear`].
        fn clear(&mut self) -> ();
    }
    delegate! {
        /// See [`ParameterList::len`].
        fn len(&self) -> usize;
    }

    /// Bind an [`Encode`] value.
    pub fn bind_value(&mut self, index: usize, value: impl Encode) -> Result<(), BindError> {
        match self {
            Parameters::Simple(list) => list.bind_value(index, value),
            Parameters::Composite(list) => list.bind_value(index, value),
        }
    }

    /// Returns `true` if there is no parameters.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append parameters of `other`.
    ///
    /// Only simple lists can be merged.
    pub fn merge(&mut self, other: &Parameters) -> Result<(), BindError> {
        match (self, other) {
            (Parameters::Simple(me), Parameters::Simple(other)) => me.merge(other),
            _ => Err(BindError::Incompatible),
        }
    }

    /// Replace all parameters with a copy of `other`.
    pub fn replace(&mut self, other: &Parameters) -> Result<(), BindError> {
        match (self, other) {
            (Parameters::Simple(me), Parameters::Simple(other)) => {
                me.replace(other);
                Ok(())
            },
            (Parameters::Composite(me), Parameters::Composite(other)) => me.replace(other),
            _ => Err(BindError::Incompatible),
        }
    }
}

impl From<ParameterList> for Parameters {
    fn from(value: ParameterList) -> Self {
        Parameters::Simple(value)
    }
}

impl From<CompositeParameterList> for Parameters {
    fn from(value: CompositeParameterList) -> Self {
        Parameters::Composite(value)
    }
}

/// An error when binding or sending parameters.
pub enum BindError {
    /// Parameter index is zero or past the end.
    IndexOutOfRange { index: usize, len: usize },
    /// Parameter have not been bound.
    Unbound { index: usize },
    /// Server reported type different from the one already bound.
    TypeConflict { index: usize, resolved: Oid, found: Oid },
    /// Parameter lists of different shape cannot be merged.
    Incompatible,
    /// Value is larger than a protocol length can express.
    ValueTooLarge { index: usize, len: usize },
    /// More parameters than a `Bind` message can carry.
    TooManyParameters { count: usize },
}

impl std::error::Error for BindError { }

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndexOutOfRange { index, len } => {
                write!(f, "parameter index {index} out of range, statement have {len} parameters")
            },
            Self::Unbound { index } => write!(f, "no value specified for parameter {index}"),
            Self::TypeConflict { index, resolved, found } => write!(
                f,
                "parameter {index} type resolved as oid {resolved}, server reported oid {found}"
            ),
            Self::Incompatible => f.write_str("incompatible parameter list"),
            Self::ValueTooLarge { index, len } => {
                write!(f, "parameter {index} value of {len} bytes is too large")
            },
            Self::TooManyParameters { count } => {
                write!(f, "{count} parameters exceed the protocol limit of {MAX_PARAMETERS}")
            },
        }
    }
}

impl fmt::Debug for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::ByteStr;

    fn ints(values: &[i32]) -> ParameterList {
        let mut list = ParameterList::new(values.len());
        for (i, v) in values.iter().enumerate() {
            list.bind_value(i + 1, *v).unwrap();
        }
        list
    }

    fn int_at(list: &ParameterList, index: usize) -> i32 {
        match list.value(index).unwrap() {
            Some(Value::Binary(b)) => i32::from_be_bytes(b[..].try_into().unwrap()),
            other => panic!("not an int4: {other:?}"),
        }
    }

    #[test]
    fn merge_law() {
        let mut a = ints(&[1, 2, 3, 4]);
        let b = ints(&[5, 6, 7, 8]);
        a.merge(&b).unwrap();
        drop(b);

        assert_eq!(a.len(), 8);
        let values: Vec<i32> = (1..=8).map(|i| int_at(&a, i)).collect();
        assert_eq!(values, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(a.type_oids().iter().all(|e| *e == oid::INT4));
    }

    #[test]
    fn null_keeps_resolved_type() {
        let mut list = ParameterList::new(1);
        list.bind_null(1, oid::INT4).unwrap();
        list.bind_null(1, oid::UNSPECIFIED).unwrap();
        assert_eq!(list.oid(1).unwrap(), oid::INT4);

        list.set_resolved_type(1, oid::INT4).unwrap();
        assert!(matches!(
            list.set_resolved_type(1, oid::TEXT),
            Err(BindError::TypeConflict { index: 1, .. })
        ));

        let mut list = ParameterList::new(1);
        list.bind_null(1, oid::UNSPECIFIED).unwrap();
        list.set_resolved_type(1, oid::DATE).unwrap();
        list.bind_null(1, oid::UNSPECIFIED).unwrap();
        assert_eq!(list.oid(1).unwrap(), oid::DATE);
        assert!(list.is_fully_resolved());
    }

    #[test]
    fn wire_encoding() {
        let mut list = ParameterList::new(3);
        list.bind_value(1, "héllo").unwrap();
        list.bind_null(2, oid::INT4).unwrap();

        assert_eq!(list.wire_length(1).unwrap(), 6);
        assert_eq!(list.wire_length(2).unwrap(), -1);
        assert!(matches!(list.wire_length(3), Err(BindError::Unbound { index: 3 })));

        let mut buf = vec![];
        list.serialize(1, &mut buf).unwrap();
        list.serialize(2, &mut buf).unwrap();
        assert_eq!(buf, "héllo".as_bytes());
        assert!(list.serialize(3, &mut buf).is_err());

        assert!(matches!(list.check_all_set(), Err(BindError::Unbound { index: 3 })));
        assert!(list.wire_values().is_err());
    }

    #[test]
    fn text_shares_bound_bytes() {
        let text = Bytes::from_static(b"shared");
        let mut list = ParameterList::new(1);
        list.bind(1, Value::Text(ByteStr::from_utf8(text.clone()).unwrap()), oid::TEXT).unwrap();

        let wire = list.wire_value(1).unwrap();
        assert_eq!(wire.size(), 6);
        assert_eq!(wire.chunk().as_ptr(), text.as_ptr());
    }

    #[test]
    fn index_bounds() {
        let mut list = ParameterList::new(2);
        assert!(matches!(list.bind_value(0, 1), Err(BindError::IndexOutOfRange { .. })));
        assert!(list.oid(3).is_err());

        // binding past the end grows the list
        list.bind_value(4, 1).unwrap();
        assert_eq!(list.len(), 4);
        assert!(!list.is_bound(3).unwrap());

        assert!(matches!(
            list.bind_value(MAX_PARAMETERS + 1, 1),
            Err(BindError::TooManyParameters { .. })
        ));
    }

    #[test]
    fn clear_and_resize() {
        let mut list = ints(&[1, 2, 3]);
        list.clear();
        assert_eq!(list.len(), 3);
        assert!(list.has_unresolved_types());
        assert!(!list.is_bound(1).unwrap());

        list.resize(5);
        assert_eq!(list.len(), 5);
        list.resize(1);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn replace_copies() {
        let mut a = ints(&[1]);
        let b = ints(&[7, 8]);
        a.replace(&b);
        drop(b);
        assert_eq!(a.len(), 2);
        assert_eq!(int_at(&a, 2), 8);
    }

    #[test]
    fn directions() {
        let mut list = ParameterList::new(3);
        list.bind_value(1, 1).unwrap();
        list.mark_output(2).unwrap();
        list.bind_value(3, 1).unwrap();
        list.mark_output(3).unwrap();

        assert_eq!(list.direction(2).unwrap(), Direction::Out);
        assert_eq!(list.oid(2).unwrap(), oid::VOID);
        assert_eq!(list.wire_length(2).unwrap(), -1);
        assert_eq!(list.direction(3).unwrap(), Direction::InOut);
        assert_eq!(list.in_count(), 2);
        assert_eq!(list.out_count(), 2);
        assert_eq!(ParameterList::new(2).out_count(), 1);
    }

    #[test]
    fn literal() {
        let scs = Capabilities::default();
        let legacy = Capabilities::default().with_standard_conforming_strings(false);

        let mut list = ParameterList::new(5);
        list.bind_value(1, "it's").unwrap();
        list.bind_value(2, r"a\b").unwrap();
        list.bind_null(3, oid::TEXT).unwrap();
        list.bind_value(4, -42i64).unwrap();
        list.bind_value(5, "nul\0").unwrap();

        assert_eq!(list.to_literal(1, &scs).unwrap(), "'it''s'");
        assert_eq!(list.to_literal(2, &scs).unwrap(), r"'a\b'");
        assert_eq!(list.to_literal(2, &legacy).unwrap(), r"E'a\\b'");
        assert_eq!(list.to_literal(3, &scs).unwrap(), "NULL");
        assert_eq!(list.to_literal(4, &scs).unwrap(), "-42");
        assert_eq!(list.to_literal(5, &scs).unwrap(), "'nul\0'");

        list.clear();
        assert_eq!(list.to_literal(1, &scs).unwrap(), "?");
    }

    #[test]
    fn binary_null() {
        let caps = Capabilities::default();
        let mut list = ParameterList::new(2);
        list.bind_null_for(1, oid::INT4, &caps).unwrap();
        list.bind_null_for(2, oid::NUMERIC, &caps).unwrap();
        assert_eq!(list.format(1).unwrap(), PgFormat::Binary);
        assert_eq!(list.format(2).unwrap(), PgFormat::Text);
    }

    #[test]
    fn incompatible_merge() {
        let mut simple = Parameters::Simple(ints(&[1]));
        let composite = Parameters::Composite(CompositeParameterList::new(vec![ints(&[1])]));
        assert!(matches!(simple.merge(&composite), Err(BindError::Incompatible)));
        assert!(matches!(simple.replace(&composite), Err(BindError::Incompatible)));
        assert_eq!(simple.len(), 1);
    }
}
