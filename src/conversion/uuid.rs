//! `uuid::Uuid` parameters, rendered in hyphenated form.

use crate::value::Value;

impl From<uuid::Uuid> for Value {
    fn from(value: uuid::Uuid) -> Self {
        Value::Text(value.hyphenated().to_string())
    }
}

impl From<&uuid::Uuid> for Value {
    fn from(value: &uuid::Uuid) -> Self {
        Value::from(*value)
    }
}
