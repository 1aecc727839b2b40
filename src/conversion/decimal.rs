//! `rust_decimal::Decimal` parameters.

use rust_decimal::Decimal;

use crate::value::Value;

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::Text(value.to_string())
    }
}
