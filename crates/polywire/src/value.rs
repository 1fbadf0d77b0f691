//! # Values
//!
//! `Value` is the dynamic shape of anything that crosses the wire, and
//! `ValueType` is the schema it is checked against on the way back in.
//!
//! ## Invariants
//! - Records keep field declaration order; maps are keyed and sorted.
//! - A decoded value always matches the `ValueType` it was decoded against,
//!   except under `ValueType::Any`, which accepts whatever the bytes describe.

use std::collections::BTreeMap;
use std::fmt;

/// A dynamically shaped value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unit,
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Char(char),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    /// Named fields in declaration order.
    Record(Vec<(String, Value)>),
    /// String-keyed dictionary.
    Map(BTreeMap<String, Value>),
    Option(Option<Box<Value>>),
    /// A named case with its payload (`Unit` for bare cases).
    Variant(String, Box<Value>),
}

/// The declared shape of a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Accept any self-described value.
    Any,
    Unit,
    Bool,
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Char,
    String,
    Bytes,
    List(Box<ValueType>),
    /// Type name plus ordered `(field, type)` pairs.
    Record(String, Vec<(String, ValueType)>),
    Map(Box<ValueType>),
    Option(Box<ValueType>),
    /// Type name plus ordered `(case, payload type)` pairs.
    Variant(String, Vec<(String, ValueType)>),
}

impl Value {
    /// Short description of the value's shape, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::U8(_) => "u8",
            Value::U16(_) => "u16",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::I8(_) => "i8",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Char(_) => "char",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Record(_) => "record",
            Value::Map(_) => "map",
            Value::Option(_) => "option",
            Value::Variant(..) => "variant",
        }
    }

    /// `true` for `Option(None)`, the wire form of an absent argument.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Option(None))
    }

    /// Unwraps `Option(Some(v))` to `v`; anything else is returned as is.
    pub fn flatten_option(self) -> Value {
        match self {
            Value::Option(Some(inner)) => inner.flatten_option(),
            other => other,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Renders scalars the way they appear in a URL or header.
    ///
    /// Containers have no plain-text form and return `None`.
    pub fn to_plain_string(&self) -> Option<String> {
        match self {
            Value::Unit | Value::List(_) | Value::Record(_) | Value::Map(_) => None,
            Value::Option(None) => None,
            Value::Option(Some(inner)) => inner.to_plain_string(),
            Value::Variant(name, payload) if **payload == Value::Unit => Some(name.clone()),
            Value::Variant(..) => None,
            Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::U8(v) => write!(f, "{v}"),
            Value::U16(v) => write!(f, "{v}"),
            Value::U32(v) => write!(f, "{v}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::I8(v) => write!(f, "{v}"),
            Value::I16(v) => write!(f, "{v}"),
            Value::I32(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::F32(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::Char(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v}"),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Record(fields) => {
                write!(f, "{{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k:?}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Option(None) => write!(f, "none"),
            Value::Option(Some(v)) => write!(f, "some({v})"),
            Value::Variant(name, payload) if **payload == Value::Unit => write!(f, "{name}"),
            Value::Variant(name, payload) => write!(f, "{name}({payload})"),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Any => write!(f, "any"),
            ValueType::Unit => write!(f, "unit"),
            ValueType::Bool => write!(f, "bool"),
            ValueType::U8 => write!(f, "u8"),
            ValueType::U16 => write!(f, "u16"),
            ValueType::U32 => write!(f, "u32"),
            ValueType::U64 => write!(f, "u64"),
            ValueType::I8 => write!(f, "i8"),
            ValueType::I16 => write!(f, "i16"),
            ValueType::I32 => write!(f, "i32"),
            ValueType::I64 => write!(f, "i64"),
            ValueType::F32 => write!(f, "f32"),
            ValueType::F64 => write!(f, "f64"),
            ValueType::Char => write!(f, "char"),
            ValueType::String => write!(f, "string"),
            ValueType::Bytes => write!(f, "bytes"),
            ValueType::List(inner) => write!(f, "list<{inner}>"),
            ValueType::Record(name, _) => write!(f, "{name}"),
            ValueType::Map(inner) => write!(f, "map<string, {inner}>"),
            ValueType::Option(inner) => write!(f, "option<{inner}>"),
            ValueType::Variant(name, _) => write!(f, "{name}"),
        }
    }
}

impl ValueType {
    /// Whether values of this type are keyed collections (records or maps).
    pub fn is_keyed(&self) -> bool {
        match self {
            ValueType::Record(..) | ValueType::Map(_) | ValueType::Any => true,
            ValueType::Option(inner) => inner.is_keyed(),
            _ => false,
        }
    }
}
