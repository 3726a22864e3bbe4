use time::{
    PrimitiveDateTime, UtcDateTime,
    format_description::{BorrowedFormatItem as I, Component as C, modifier},
};

use crate::{
    Encode,
    encode::Encoded,
    postgres::{Oid, PgType, oid},
};

impl PgType for PrimitiveDateTime {
    /// date and time
    const OID: Oid = oid::TIMESTAMP;
}

impl PgType for UtcDateTime {
    /// date and time with timezone
    const OID: Oid = oid::TIMESTAMPTZ;
}

impl Encode for PrimitiveDateTime {
    fn encode(self) -> Encoded {
        Encoded::text(
            self.format(&DESCRIPTION)
                .expect("format is statically known"),
            Self::OID,
        )
    }
}

impl Encode for UtcDateTime {
    fn encode(self) -> Encoded {
        let mut value = self.format(&DESCRIPTION)
            .expect("format is statically known");
        value.push_str("+00");
        Encoded::text(value, Self::OID)
    }
}

const DESCRIPTION: &[I<'_>] = &[
    I::Component(C::Year(modifier::Year::default())),
    I::Literal(b"-"),
    I::Component(C::Month(modifier::Month::default())),
    I::Literal(b"-"),
    I::Component(C::Day(modifier::Day::default())),
    I::Literal(b" "),
    I::Component(C::Hour(modifier::Hour::default())),
    I::Literal(b":"),
    I::Component(C::Minute(modifier::Minute::default())),
    I::Literal(b":"),
    I::Component(C::Second(modifier::Second::default())),
    I::Literal(b"."),
    I::Component(C::Subsecond(modifier::Subsecond::default())),
];

#[cfg(test)]
mod test {
    use super::*;
    use crate::value::Value;
    use time::{Date, Month, Time};

    #[test]
    fn encode_timestamp() {
        let date = Date::from_calendar_date(2024, Month::March, 9).unwrap();
        let time = Time::from_hms(13, 5, 0).unwrap();
        let e = PrimitiveDateTime::new(date, time).encode();
        assert_eq!(e.oid(), oid::TIMESTAMP);
        assert_eq!(e.value(), Some(&Value::Text("2024-03-09 13:05:00.0".into())));

        let e = UtcDateTime::new(date, time).encode();
        assert_eq!(e.value(), Some(&Value::Text("2024-03-09 13:05:00.0+00".into())));
    }
}
