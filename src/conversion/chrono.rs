//! Chrono parameters (NaiveDate, NaiveTime, NaiveDateTime, DateTime<Utc>).

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};

use crate::value::Value;

use super::{write_date, write_time};

/// Leap seconds carry their extra second in the nanoseconds.
fn micros<T: Timelike>(t: &T) -> u32 {
    t.nanosecond() / 1_000
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        let mut out = String::with_capacity(10);
        write_date(&mut out, value.year(), value.month(), value.day());
        Value::Text(out)
    }
}

impl From<NaiveTime> for Value {
    fn from(value: NaiveTime) -> Self {
        let mut out = String::with_capacity(15);
        write_time(
            &mut out,
            value.hour(),
            value.minute(),
            value.second(),
            micros(&value),
        );
        Value::Text(out)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        let mut out = String::with_capacity(26);
        write_date(&mut out, value.year(), value.month(), value.day());
        out.push(' ');
        write_time(
            &mut out,
            value.hour(),
            value.minute(),
            value.second(),
            micros(&value),
        );
        Value::Text(out)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::from(value.naive_utc())
    }
}
