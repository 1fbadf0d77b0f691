//! # Wire
//!
//! Bridges concrete Rust types and the dynamic `Value` model. Every argument
//! and return type of a remote method implements `Wire`, which is how both
//! ends agree on a signature without sharing in-memory layouts.

use std::collections::BTreeMap;
use std::collections::HashMap;

use crate::error::Result;
use crate::error::WireError;
use crate::value::Value;
use crate::value::ValueType;

/// A type that can cross the wire.
pub trait Wire: Sized {
    /// The schema values of this type are decoded against.
    fn value_type() -> ValueType;

    /// Converts to the dynamic model.
    fn to_value(&self) -> Value;

    /// Converts back from the dynamic model.
    fn from_value(value: Value) -> Result<Self>;
}

fn mismatch<T>(expected: ValueType, found: &Value) -> Result<T> {
    Err(WireError::TypeMismatch {
        expected: expected.to_string(),
        found: found.kind().to_string(),
    })
}

macro_rules! impl_wire_scalar {
    ($($ty:ty => $var:ident),* $(,)?) => {
        $(
            impl Wire for $ty {
                fn value_type() -> ValueType {
                    ValueType::$var
                }
                fn to_value(&self) -> Value {
                    Value::$var(*self)
                }
                fn from_value(value: Value) -> Result<Self> {
                    match value.flatten_option() {
                        Value::$var(v) => Ok(v),
                        other => mismatch(ValueType::$var, &other),
                    }
                }
            }
        )*
    };
}

impl_wire_scalar! {
    bool => Bool,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
    char => Char,
}

impl Wire for () {
    fn value_type() -> ValueType {
        ValueType::Unit
    }
    fn to_value(&self) -> Value {
        Value::Unit
    }
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Unit | Value::Option(None) => Ok(()),
            other => mismatch(ValueType::Unit, &other),
        }
    }
}

impl Wire for String {
    fn value_type() -> ValueType {
        ValueType::String
    }
    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }
    fn from_value(value: Value) -> Result<Self> {
        match value.flatten_option() {
            Value::String(s) => Ok(s),
            other => mismatch(ValueType::String, &other),
        }
    }
}

/// The dynamic model is its own schema: `Value` accepts anything.
impl Wire for Value {
    fn value_type() -> ValueType {
        ValueType::Any
    }
    fn to_value(&self) -> Value {
        self.clone()
    }
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

/// An opaque byte payload, encoded as a blob rather than a list of `u8`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Blob(pub Vec<u8>);

impl Wire for Blob {
    fn value_type() -> ValueType {
        ValueType::Bytes
    }
    fn to_value(&self) -> Value {
        Value::Bytes(self.0.clone())
    }
    fn from_value(value: Value) -> Result<Self> {
        match value.flatten_option() {
            Value::Bytes(b) => Ok(Blob(b)),
            Value::String(s) => Ok(Blob(s.into_bytes())),
            other => mismatch(ValueType::Bytes, &other),
        }
    }
}

impl<T: Wire> Wire for Option<T> {
    fn value_type() -> ValueType {
        ValueType::Option(Box::new(T::value_type()))
    }
    fn to_value(&self) -> Value {
        Value::Option(self.as_ref().map(|v| Box::new(v.to_value())))
    }
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Option(None) => Ok(None),
            Value::Option(Some(inner)) => T::from_value(*inner).map(Some),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: Wire> Wire for Vec<T> {
    fn value_type() -> ValueType {
        ValueType::List(Box::new(T::value_type()))
    }
    fn to_value(&self) -> Value {
        Value::List(self.iter().map(Wire::to_value).collect())
    }
    fn from_value(value: Value) -> Result<Self> {
        match value.flatten_option() {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => mismatch(Self::value_type(), &other),
        }
    }
}

impl<T: Wire> Wire for Box<T> {
    fn value_type() -> ValueType {
        T::value_type()
    }
    fn to_value(&self) -> Value {
        (**self).to_value()
    }
    fn from_value(value: Value) -> Result<Self> {
        T::from_value(value).map(Box::new)
    }
}

fn keyed_entries(value: Value, expected: ValueType) -> Result<Vec<(String, Value)>> {
    match value.flatten_option() {
        Value::Map(entries) => Ok(entries.into_iter().collect()),
        Value::Record(fields) => Ok(fields),
        other => mismatch(expected, &other),
    }
}

impl<T: Wire> Wire for BTreeMap<String, T> {
    fn value_type() -> ValueType {
        ValueType::Map(Box::new(T::value_type()))
    }
    fn to_value(&self) -> Value {
        Value::Map(self.iter().map(|(k, v)| (k.clone(), v.to_value())).collect())
    }
    fn from_value(value: Value) -> Result<Self> {
        keyed_entries(value, Self::value_type())?
            .into_iter()
            .map(|(k, v)| Ok((k, T::from_value(v)?)))
            .collect()
    }
}

impl<T: Wire> Wire for HashMap<String, T> {
    fn value_type() -> ValueType {
        ValueType::Map(Box::new(T::value_type()))
    }
    fn to_value(&self) -> Value {
        Value::Map(self.iter().map(|(k, v)| (k.clone(), v.to_value())).collect())
    }
    fn from_value(value: Value) -> Result<Self> {
        keyed_entries(value, Self::value_type())?
            .into_iter()
            .map(|(k, v)| Ok((k, T::from_value(v)?)))
            .collect()
    }
}

/// Field access for derived record types.
///
/// Accepts both typed records and untyped maps, so values decoded with
/// `ValueType::Any` still convert.
pub struct Fields {
    type_name: &'static str,
    entries: Vec<(String, Value)>,
}

impl Fields {
    pub fn new(value: Value, type_name: &'static str, expected: ValueType) -> Result<Self> {
        Ok(Self { type_name, entries: keyed_entries(value, expected)? })
    }

    /// Removes and converts a field. A missing field reads as an absent
    /// value, which only optional types accept.
    pub fn take<T: Wire>(&mut self, field: &str) -> Result<T> {
        match self.entries.iter().position(|(name, _)| name == field) {
            Some(idx) => T::from_value(self.entries.swap_remove(idx).1),
            None => T::from_value(Value::Option(None)).map_err(|_| WireError::MissingField {
                type_name: self.type_name.to_string(),
                field: field.to_string(),
            }),
        }
    }
}

/// Splits a variant value into its case name and payload for derived enums.
pub fn variant_parts(value: Value, expected: ValueType) -> Result<(String, Value)> {
    match value.flatten_option() {
        Value::Variant(name, payload) => Ok((name, *payload)),
        Value::String(name) => Ok((name, Value::Unit)),
        other => mismatch(expected, &other),
    }
}

/// Converts a typed value list into positional values.
#[macro_export]
macro_rules! values {
    ($($arg:expr),* $(,)?) => {
        vec![$($crate::Wire::to_value(&$arg)),*]
    };
}
