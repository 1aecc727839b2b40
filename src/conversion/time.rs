//! Time crate parameters (Date, Time, PrimitiveDateTime, OffsetDateTime).

use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use crate::value::Value;

use super::{write_date, write_time};

fn push_date(out: &mut String, date: Date) {
    write_date(out, date.year(), u32::from(u8::from(date.month())), u32::from(date.day()));
}

fn push_time(out: &mut String, t: Time) {
    write_time(
        out,
        u32::from(t.hour()),
        u32::from(t.minute()),
        u32::from(t.second()),
        t.microsecond(),
    );
}

impl From<Date> for Value {
    fn from(value: Date) -> Self {
        let mut out = String::with_capacity(10);
        push_date(&mut out, value);
        Value::Text(out)
    }
}

impl From<Time> for Value {
    fn from(value: Time) -> Self {
        let mut out = String::with_capacity(15);
        push_time(&mut out, value);
        Value::Text(out)
    }
}

impl From<PrimitiveDateTime> for Value {
    fn from(value: PrimitiveDateTime) -> Self {
        let mut out = String::with_capacity(26);
        push_date(&mut out, value.date());
        out.push(' ');
        push_time(&mut out, value.time());
        Value::Text(out)
    }
}

/// Converted to UTC; the server has no offset-aware type.
impl From<OffsetDateTime> for Value {
    fn from(value: OffsetDateTime) -> Self {
        let utc = value.to_offset(UtcOffset::UTC);
        Value::from(PrimitiveDateTime::new(utc.date(), utc.time()))
    }
}

#[cfg(test)]
mod tests {
    use time::macros::{date, datetime, time};

    use super::*;

    #[test]
    fn test_date() {
        assert_eq!(Value::from(date!(2024 - 01 - 15)), Value::Text("2024-01-15".into()));
    }

    #[test]
    fn test_time_micros() {
        assert_eq!(
            Value::from(time!(08:05:03.25)),
            Value::Text("08:05:03.250000".into())
        );
    }

    #[test]
    fn test_offset_datetime_to_utc() {
        let dt = datetime!(2024-06-01 02:00:00 +02:00);
        assert_eq!(
            Value::from(dt),
            Value::Text("2024-06-01 00:00:00".into())
        );
    }
}
