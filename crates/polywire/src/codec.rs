//! # Codec
//!
//! Translation between `Value` and the polypack byte layout.
//!
//! ## Invariants
//! - **Recursion Safety**: every recursive walk is bounded by `MAX_RECURSION_DEPTH`.
//! - **Type Strictness**: typed decoding checks each wire tag against the declared `ValueType`.
//! - **Forward Compatibility**: unknown record fields are skipped, absent optional fields read as none.

use std::collections::BTreeMap;

use polypack::Decoder;
use polypack::Encoder;
use polypack::Tag;

use crate::error::Result;
use crate::error::WireError;
use crate::value::Value;
use crate::value::ValueType;

/// The maximum nesting depth for values before giving up.
pub const MAX_RECURSION_DEPTH: usize = 64;

/// Encodes a value into the encoder stream.
pub fn encode_value(enc: &mut Encoder, value: &Value) -> Result<()> {
    encode_value_impl(enc, value, 0)
}

/// Encodes positional values as a single list item.
pub fn encode_values(values: &[Value]) -> Result<Vec<u8>> {
    let mut enc = Encoder::new();
    enc.list_begin()?;
    for value in values {
        encode_value_impl(&mut enc, value, 1)?;
    }
    enc.list_end()?;
    Ok(enc.into_bytes()?)
}

fn encode_value_impl(enc: &mut Encoder, value: &Value, depth: usize) -> Result<()> {
    if depth > MAX_RECURSION_DEPTH {
        return Err(WireError::RecursionLimitExceeded);
    }

    match value {
        Value::Unit => enc.unit()?,
        Value::Bool(v) => enc.bool(*v)?,
        Value::U8(v) => enc.u8(*v)?,
        Value::U16(v) => enc.u16(*v)?,
        Value::U32(v) => enc.u32(*v)?,
        Value::U64(v) => enc.u64(*v)?,
        Value::I8(v) => enc.i8(*v)?,
        Value::I16(v) => enc.i16(*v)?,
        Value::I32(v) => enc.i32(*v)?,
        Value::I64(v) => enc.i64(*v)?,
        Value::F32(v) => enc.f32(*v)?,
        Value::F64(v) => enc.f64(*v)?,
        Value::Char(v) => enc.char(*v)?,
        Value::String(v) => enc.str(v)?,
        Value::Bytes(v) => enc.bytes(v)?,
        Value::List(items) => {
            enc.list_begin()?;
            for item in items {
                encode_value_impl(enc, item, depth + 1)?;
            }
            enc.list_end()?;
        }
        Value::Record(fields) => {
            enc.map_begin()?;
            for (name, field) in fields {
                enc.variant_begin(name)?;
                encode_value_impl(enc, field, depth + 1)?;
                enc.variant_end()?;
            }
            enc.map_end()?;
        }
        Value::Map(entries) => {
            enc.map_begin()?;
            for (key, entry) in entries {
                enc.variant_begin(key)?;
                encode_value_impl(enc, entry, depth + 1)?;
                enc.variant_end()?;
            }
            enc.map_end()?;
        }
        Value::Option(None) => enc.none()?,
        Value::Option(Some(inner)) => {
            enc.some_begin()?;
            encode_value_impl(enc, inner, depth + 1)?;
            enc.some_end()?;
        }
        Value::Variant(name, payload) => {
            enc.variant_begin(name)?;
            encode_value_impl(enc, payload, depth + 1)?;
            enc.variant_end()?;
        }
    }
    Ok(())
}

/// Decodes a single value against its declared type.
pub fn decode_value(dec: &mut Decoder, ty: &ValueType) -> Result<Value> {
    decode_value_impl(dec, ty, 0)
}

/// Decodes a single self-described value without a schema.
pub fn decode_any(dec: &mut Decoder) -> Result<Value> {
    decode_any_impl(dec, 0)
}

/// Decodes a positional list, one declared type per element.
///
/// Used for argument lists, where both sides agreed on the signature.
pub fn decode_values(dec: &mut Decoder, types: &[ValueType]) -> Result<Vec<Value>> {
    let items = dec.list()?.collect::<polypack::Result<Vec<_>>>()?;
    if items.len() != types.len() {
        return Err(WireError::ArityMismatch { expected: types.len(), found: items.len() });
    }

    items
        .into_iter()
        .zip(types)
        .map(|(mut item, ty)| decode_value_impl(&mut item, ty, 1))
        .collect()
}

/// Decodes a positional list without a schema.
pub fn decode_values_any(dec: &mut Decoder) -> Result<Vec<Value>> {
    dec.list()?
        .map(|item| decode_any_impl(&mut item?, 1))
        .collect()
}

/// Maps a tag mismatch onto the declared type so errors read in schema terms.
fn typed<T>(ty: &ValueType, res: polypack::Result<T>) -> Result<T> {
    res.map_err(|e| match e {
        polypack::Error::UnexpectedTag { actual, .. } => WireError::TypeMismatch {
            expected: ty.to_string(),
            found: format!("{actual:?}"),
        },
        other => WireError::Codec(other),
    })
}

fn decode_value_impl(dec: &mut Decoder, ty: &ValueType, depth: usize) -> Result<Value> {
    if depth > MAX_RECURSION_DEPTH {
        return Err(WireError::RecursionLimitExceeded);
    }

    let value = match ty {
        ValueType::Any => decode_any_impl(dec, depth)?,
        ValueType::Unit => {
            typed(ty, dec.unit())?;
            Value::Unit
        }
        ValueType::Bool => Value::Bool(typed(ty, dec.bool())?),
        ValueType::U8 => Value::U8(typed(ty, dec.u8())?),
        ValueType::U16 => Value::U16(typed(ty, dec.u16())?),
        ValueType::U32 => Value::U32(typed(ty, dec.u32())?),
        ValueType::U64 => Value::U64(typed(ty, dec.u64())?),
        ValueType::I8 => Value::I8(typed(ty, dec.i8())?),
        ValueType::I16 => Value::I16(typed(ty, dec.i16())?),
        ValueType::I32 => Value::I32(typed(ty, dec.i32())?),
        ValueType::I64 => Value::I64(typed(ty, dec.i64())?),
        ValueType::F32 => Value::F32(typed(ty, dec.f32())?),
        ValueType::F64 => Value::F64(typed(ty, dec.f64())?),
        ValueType::Char => Value::Char(typed(ty, dec.char())?),
        ValueType::String => Value::String(typed(ty, dec.str())?.to_string()),
        ValueType::Bytes => Value::Bytes(typed(ty, dec.bytes())?.to_vec()),

        ValueType::List(inner) => {
            let mut items = Vec::new();
            for item in typed(ty, dec.list())? {
                items.push(decode_value_impl(&mut item?, inner, depth + 1)?);
            }
            Value::List(items)
        }

        ValueType::Record(type_name, fields) => {
            let mut slots: Vec<Option<Value>> = vec![None; fields.len()];
            for entry in typed(ty, dec.map())? {
                let (key, mut field_dec) = entry?;
                match fields.iter().position(|(name, _)| name == key) {
                    Some(idx) => {
                        slots[idx] = Some(decode_value_impl(&mut field_dec, &fields[idx].1, depth + 1)?);
                    }
                    None => field_dec.skip()?,
                }
            }

            let mut record = Vec::with_capacity(fields.len());
            for ((name, field_ty), slot) in fields.iter().zip(slots) {
                let value = match (slot, field_ty) {
                    (Some(v), _) => v,
                    (None, ValueType::Option(_)) => Value::Option(None),
                    (None, _) => {
                        return Err(WireError::MissingField {
                            type_name: type_name.clone(),
                            field: name.clone(),
                        });
                    }
                };
                record.push((name.clone(), value));
            }
            Value::Record(record)
        }

        ValueType::Map(inner) => {
            let mut entries = BTreeMap::new();
            for entry in typed(ty, dec.map())? {
                let (key, mut entry_dec) = entry?;
                entries.insert(key.to_string(), decode_value_impl(&mut entry_dec, inner, depth + 1)?);
            }
            Value::Map(entries)
        }

        ValueType::Option(inner) => match typed(ty, dec.option())? {
            Some(mut some) => Value::Option(Some(Box::new(decode_value_impl(&mut some, inner, depth + 1)?))),
            None => Value::Option(None),
        },

        ValueType::Variant(type_name, cases) => {
            let (name, mut payload) = typed(ty, dec.variant())?;
            let Some((_, case_ty)) = cases.iter().find(|(case, _)| case == name) else {
                return Err(WireError::UnknownVariant {
                    type_name: type_name.clone(),
                    variant: name.to_string(),
                });
            };
            let payload = decode_value_impl(&mut payload, case_ty, depth + 1)?;
            Value::Variant(name.to_string(), Box::new(payload))
        }
    };
    Ok(value)
}

fn decode_any_impl(dec: &mut Decoder, depth: usize) -> Result<Value> {
    if depth > MAX_RECURSION_DEPTH {
        return Err(WireError::RecursionLimitExceeded);
    }

    let value = match dec.peek_tag()? {
        Tag::BoolTrue | Tag::BoolFalse => Value::Bool(dec.bool()?),
        Tag::U8 => Value::U8(dec.u8()?),
        Tag::U16 => Value::U16(dec.u16()?),
        Tag::U32 => Value::U32(dec.u32()?),
        Tag::U64 => Value::U64(dec.u64()?),
        Tag::S8 => Value::I8(dec.i8()?),
        Tag::S16 => Value::I16(dec.i16()?),
        Tag::S32 => Value::I32(dec.i32()?),
        Tag::S64 => Value::I64(dec.i64()?),
        Tag::F32 => Value::F32(dec.f32()?),
        Tag::F64 => Value::F64(dec.f64()?),
        Tag::Char => Value::Char(dec.char()?),
        Tag::Unit => {
            dec.unit()?;
            Value::Unit
        }
        Tag::String => Value::String(dec.str()?.to_string()),
        Tag::Bytes => Value::Bytes(dec.bytes()?.to_vec()),
        Tag::List => {
            let mut items = Vec::new();
            for item in dec.list()? {
                items.push(decode_any_impl(&mut item?, depth + 1)?);
            }
            Value::List(items)
        }
        Tag::Map => {
            let mut entries = BTreeMap::new();
            for entry in dec.map()? {
                let (key, mut entry_dec) = entry?;
                entries.insert(key.to_string(), decode_any_impl(&mut entry_dec, depth + 1)?);
            }
            Value::Map(entries)
        }
        Tag::OptionNone | Tag::OptionSome => match dec.option()? {
            Some(mut some) => Value::Option(Some(Box::new(decode_any_impl(&mut some, depth + 1)?))),
            None => Value::Option(None),
        },
        Tag::Variant => {
            let (name, mut payload) = dec.variant()?;
            Value::Variant(name.to_string(), Box::new(decode_any_impl(&mut payload, depth + 1)?))
        }
        Tag::ResultOk | Tag::ResultErr => {
            return Err(WireError::ProtocolViolation("result tag inside a value".into()));
        }
    };
    Ok(value)
}
