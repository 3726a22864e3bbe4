//! The [`Encode`] trait.
use bytes::Bytes;

use crate::{
    postgres::{Oid, PgType},
    value::Value,
};

/// Value that can be encoded to be bound to sql parameter.
pub trait Encode {
    fn encode(self) -> Encoded;
}

/// Postgres encoded value.
#[derive(Debug, Clone)]
pub struct Encoded {
    value: Option<Value>,
    oid: Oid,
}

impl Encoded {
    /// Create encoded value.
    pub fn new(value: Value, oid: Oid) -> Self {
        Self { value: Some(value), oid }
    }

    /// Create `NULL` value of type `oid`.
    pub fn null(oid: Oid) -> Self {
        Self { value: None, oid }
    }

    /// Create text encoded value.
    pub fn text(value: impl Into<String>, oid: Oid) -> Self {
        let text: String = value.into();
        Self::new(Value::Text(text.into()), oid)
    }

    /// Create binary encoded value.
    pub fn binary(value: impl Into<Bytes>, oid: Oid) -> Self {
        Self::new(Value::Binary(value.into()), oid)
    }

    /// Returns the value, `None` for `NULL`.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn oid(&self) -> Oid {
        self.oid
    }

    pub(crate) fn into_parts(self) -> (Option<Value>, Oid) {
        (self.value, self.oid)
    }
}

impl Encode for Encoded {
    fn encode(self) -> Encoded {
        self
    }
}

macro_rules! encode {
    (binary $ty:ty) => {
        impl Encode for $ty {
            fn encode(self) -> Encoded {
                Encoded::binary(Bytes::copy_from_slice(&self.to_be_bytes()), <$ty>::OID)
            }
        }
    };
    (text <$lf:tt> $ty:ty) => {
        impl<$lf> Encode for &$lf $ty {
            fn encode(self) -> Encoded {
                Encoded::text(self.to_owned(), <$ty>::OID)
            }
        }
    };
}

encode!(binary i16);
encode!(binary i32);
encode!(binary i64);
encode!(binary f32);
encode!(binary f64);
encode!(text <'a> str);
encode!(text <'a> String);

impl Encode for bool {
    fn encode(self) -> Encoded {
        Encoded::binary(Bytes::from_static(if self { b"\x01" } else { b"\x00" }), bool::OID)
    }
}

impl Encode for String {
    fn encode(self) -> Encoded {
        Encoded::text(self, String::OID)
    }
}

impl Encode for &[u8] {
    fn encode(self) -> Encoded {
        Encoded::binary(Bytes::copy_from_slice(self), <[u8]>::OID)
    }
}

impl Encode for Vec<u8> {
    fn encode(self) -> Encoded {
        Encoded::binary(self, Vec::<u8>::OID)
    }
}

impl Encode for Bytes {
    fn encode(self) -> Encoded {
        Encoded::binary(self, Bytes::OID)
    }
}

impl<T: Encode + PgType> Encode for Option<T> {
    fn encode(self) -> Encoded {
        match self {
            Some(value) => value.encode(),
            None => Encoded::null(T::OID),
        }
    }
}
