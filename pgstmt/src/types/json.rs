use serde::{Deserialize, Serialize};

use crate::{
    Encode,
    encode::Encoded,
    postgres::{Oid, PgType, oid},
};

/// Encode postgres json value.
///
/// The value is sent as text, letting the server parse it as `jsonb`.
///
/// # Panics
///
/// Note that when performing [`Encode`], if [`Serialize`] implementation decide
/// to fail, it will will panics.
#[derive(Debug)]
pub struct Json<T>(pub T);

impl<T> PgType for Json<T> {
    /// jsonb, Binary JSON
    const OID: Oid = oid::JSONB;
}

impl<T: Serialize> Encode for Json<T> {
    fn encode(self) -> Encoded {
        let json = serde_json::to_string(&self.0).expect("json serialization failed");
        Encoded::text(json, Self::OID)
    }
}

impl<T: Serialize> Serialize for Json<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Json<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(Self(T::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::value::Value;

    #[test]
    fn encode_json() {
        let e = Json(serde_json::json!({ "id": 1 })).encode();
        assert_eq!(e.oid(), oid::JSONB);
        assert_eq!(e.value(), Some(&Value::Text("{\"id\":1}".into())));
    }
}
