//! Parameter Values
//!
//! Key-relevant arguments of a cached operation and the rules that turn them
//! into stable key fragments.

use std::any::type_name;
use std::collections::{BTreeSet, VecDeque};
use std::fmt;

// == Param Value ==
/// One argument of a cached operation, in the shape the key deriver reads.
///
/// Sequences are stored element-wise, so every ordered container holding
/// the same items in the same order produces the same value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Absent value; contributes an empty fragment
    Null,
    /// Number, bool, char or string, already in its natural string form
    Scalar(String),
    /// Ordered sequence of values
    Seq(Vec<ParamValue>),
    /// User type, keyed by its `Display` form unless a provider overrides it
    Object {
        type_name: &'static str,
        repr: String,
    },
}

impl ParamValue {
    /// Wraps a user type, recording its type name for custom key providers.
    pub fn object<T: fmt::Display + ?Sized>(value: &T) -> Self {
        ParamValue::Object {
            type_name: type_name::<T>(),
            repr: value.to_string(),
        }
    }

    /// Builds a sequence value from any iterator of convertible items.
    pub fn seq<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<ParamValue>,
    {
        ParamValue::Seq(items.into_iter().map(Into::into).collect())
    }

    /// Returns the canonical key fragment for this value.
    pub fn canonical_key(&self) -> String {
        match self {
            ParamValue::Null => String::new(),
            ParamValue::Scalar(s) => s.clone(),
            ParamValue::Seq(items) => {
                let parts: Vec<String> = items.iter().map(ParamValue::canonical_key).collect();
                format!("[{}]", parts.join(","))
            }
            ParamValue::Object { repr, .. } => repr.clone(),
        }
    }
}

macro_rules! scalar_from {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for ParamValue {
                fn from(value: $t) -> Self {
                    ParamValue::Scalar(value.to_string())
                }
            }
        )*
    };
}

scalar_from!(
    i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool, char, String,
    &str, &String,
);

impl From<()> for ParamValue {
    fn from(_: ()) -> Self {
        ParamValue::Null
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ParamValue::Null, Into::into)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(items: Vec<T>) -> Self {
        ParamValue::seq(items)
    }
}

impl<T: Into<ParamValue>> From<VecDeque<T>> for ParamValue {
    fn from(items: VecDeque<T>) -> Self {
        ParamValue::seq(items)
    }
}

impl<T: Into<ParamValue>> From<BTreeSet<T>> for ParamValue {
    fn from(items: BTreeSet<T>) -> Self {
        ParamValue::seq(items)
    }
}

impl<T: Into<ParamValue>, const N: usize> From<[T; N]> for ParamValue {
    fn from(items: [T; N]) -> Self {
        ParamValue::seq(items)
    }
}

impl<T: Clone + Into<ParamValue>> From<&[T]> for ParamValue {
    fn from(items: &[T]) -> Self {
        ParamValue::seq(items.iter().cloned())
    }
}

impl From<serde_json::Value> for ParamValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => ParamValue::Null,
            Value::Bool(b) => b.into(),
            Value::Number(n) => ParamValue::Scalar(n.to_string()),
            Value::String(s) => s.into(),
            Value::Array(items) => ParamValue::seq(items),
            object @ Value::Object(_) => ParamValue::Object {
                type_name: "serde_json::Map",
                repr: object.to_string(),
            },
        }
    }
}

// == Parameter Key Provider ==
/// Decides the key fragment produced for a parameter value.
pub trait ParameterKeyProvider: Send + Sync {
    fn parameter_key(&self, parameter: &ParamValue) -> String;
}

/// Applies the canonical rules: null is empty, scalars use their natural
/// form, sequences render as `[a,b,c]`, objects use their `Display` form.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultParameterKeyProvider;

impl ParameterKeyProvider for DefaultParameterKeyProvider {
    fn parameter_key(&self, parameter: &ParamValue) -> String {
        parameter.canonical_key()
    }
}

impl<F> ParameterKeyProvider for F
where
    F: Fn(&ParamValue) -> String + Send + Sync,
{
    fn parameter_key(&self, parameter: &ParamValue) -> String {
        self(parameter)
    }
}
