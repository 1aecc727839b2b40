//! Parameter values for placeholder substitution.

use std::collections::HashMap;

/// A value bound to a query placeholder.
///
/// Values are rendered into SQL text by [`CompiledQuery`](crate::CompiledQuery):
/// - `Null` renders as `NULL`
/// - `List` renders as a comma-separated list (for `IN (...)`)
/// - everything else is escaped and single-quoted
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
}

/// Arguments for a parameterized query.
///
/// `?` placeholders index positional arguments in order of appearance.
/// `:name` placeholders look up named arguments; `:0`, `:1`, ... index
/// positional arguments directly.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    Positional(Vec<Value>),
    Named(HashMap<String, Value>),
}

impl Params {
    /// Look up a positional index.
    ///
    /// For named arguments the index is looked up as its decimal key.
    pub fn get_index(&self, idx: usize) -> Option<&Value> {
        match self {
            Params::Positional(values) => values.get(idx),
            Params::Named(map) => map.get(idx.to_string().as_str()),
        }
    }

    /// Look up a named key.
    ///
    /// For positional arguments the key must be a decimal index.
    pub fn get_named(&self, name: &str) -> Option<&Value> {
        match self {
            Params::Positional(values) => name.parse::<usize>().ok().and_then(|i| values.get(i)),
            Params::Named(map) => map.get(name),
        }
    }
}

// === Value conversions ===

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

macro_rules! impl_from_int {
    ($variant:ident, $target:ty, $($src:ty),+) => {
        $(
            impl From<$src> for Value {
                fn from(value: $src) -> Self {
                    Value::$variant(<$target>::from(value))
                }
            }
        )+
    };
}

impl_from_int!(Int, i64, i8, i16, i32, i64);
impl_from_int!(UInt, u64, u8, u16, u32, u64);
impl_from_int!(Float, f64, f32, f64);

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::UInt(value as u64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Value::Text(value.clone())
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Bytes(value.to_vec())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::List(values.into_iter().map(Into::into).collect())
    }
}

// === Params conversions ===

impl<T: Into<Value>> From<Vec<T>> for Params {
    fn from(values: Vec<T>) -> Self {
        Params::Positional(values.into_iter().map(Into::into).collect())
    }
}

impl<K: Into<String>, V: Into<Value>> From<HashMap<K, V>> for Params {
    fn from(map: HashMap<K, V>) -> Self {
        Params::Named(map.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<V: Into<Value>, const N: usize> From<[(&str, V); N]> for Params {
    fn from(pairs: [(&str, V); N]) -> Self {
        Params::Named(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.into()))
                .collect(),
        )
    }
}

// Tuple implementations via macro
macro_rules! impl_params_for_tuple {
    ($($idx:tt: $T:ident),+) => {
        impl<$($T: Into<Value>),+> From<($($T,)+)> for Params {
            fn from(values: ($($T,)+)) -> Self {
                Params::Positional(vec![$(values.$idx.into()),+])
            }
        }
    };
}

impl_params_for_tuple!(0: T0);
impl_params_for_tuple!(0: T0, 1: T1);
impl_params_for_tuple!(0: T0, 1: T1, 2: T2);
impl_params_for_tuple!(0: T0, 1: T1, 2: T2, 3: T3);
impl_params_for_tuple!(0: T0, 1: T1, 2: T2, 3: T3, 4: T4);
impl_params_for_tuple!(0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5);
impl_params_for_tuple!(0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6);
impl_params_for_tuple!(0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7);
impl_params_for_tuple!(0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8);
impl_params_for_tuple!(0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8, 9: T9);
impl_params_for_tuple!(0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8, 9: T9, 10: T10);
impl_params_for_tuple!(0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8, 9: T9, 10: T10, 11: T11);
