//! Packs and unpacks rows against a [`FormatDescriptor`].
//!
//! Every encoding is order-preserving: comparing two packed keys byte-wise
//! gives the same answer as comparing their values field by field.

use crate::catalog::types::Value;
use crate::error::EncodeError;
use crate::format::{FieldType, FormatDescriptor};

pub fn pack(desc: &FormatDescriptor, values: &[Value]) -> Result<Vec<u8>, EncodeError> {
    if values.len() != desc.field_count() {
        return Err(EncodeError::FieldCountMismatch {
            expected: desc.field_count(),
            actual: values.len(),
        });
    }
    let mut out = Vec::with_capacity(estimate_len(desc));
    pack_into(desc, values, &mut out)?;
    Ok(out)
}

/// Packs the leading `values.len()` fields of `desc`. The bytes equal the
/// prefix of a full `pack` sharing those values.
pub fn pack_prefix(desc: &FormatDescriptor, values: &[Value]) -> Result<Vec<u8>, EncodeError> {
    if values.len() > desc.field_count() {
        return Err(EncodeError::FieldCountMismatch {
            expected: desc.field_count(),
            actual: values.len(),
        });
    }
    let mut out = Vec::new();
    pack_into(desc, values, &mut out)?;
    Ok(out)
}

/// Validates `values` against `desc` the same way `pack` would.
pub fn check(desc: &FormatDescriptor, values: &[Value]) -> Result<(), EncodeError> {
    pack(desc, values).map(|_| ())
}

pub fn unpack(desc: &FormatDescriptor, bytes: &[u8]) -> Result<Vec<Value>, EncodeError> {
    let mut reader = Reader { bytes, pos: 0 };
    let last = desc.field_count().saturating_sub(1);
    let mut out = Vec::with_capacity(desc.field_count());
    for (field, ty) in desc.fields().iter().enumerate() {
        out.push(decode_field(field, *ty, field == last, &mut reader)?);
    }
    let remaining = reader.remaining();
    if remaining != 0 {
        return Err(EncodeError::TrailingBytes { remaining });
    }
    Ok(out)
}

fn estimate_len(desc: &FormatDescriptor) -> usize {
    desc.fields()
        .iter()
        .map(|ty| ty.fixed_width().unwrap_or(16))
        .sum()
}

fn pack_into(
    desc: &FormatDescriptor,
    values: &[Value],
    out: &mut Vec<u8>,
) -> Result<(), EncodeError> {
    let last = desc.field_count().saturating_sub(1);
    for (field, (ty, value)) in desc.fields().iter().zip(values).enumerate() {
        encode_field(field, *ty, field == last, value, out)?;
    }
    Ok(())
}

fn encode_field(
    field: usize,
    ty: FieldType,
    last: bool,
    value: &Value,
    out: &mut Vec<u8>,
) -> Result<(), EncodeError> {
    match ty {
        FieldType::FixedString(n) => {
            let s = expect_str(field, ty, value)?;
            let bytes = s.as_bytes();
            let max = n as usize;
            if bytes.len() > max {
                return Err(EncodeError::ValueTooLong {
                    field,
                    max,
                    actual: bytes.len(),
                });
            }
            if bytes.last() == Some(&0) {
                return Err(EncodeError::InvalidValue {
                    field,
                    reason: "fixed-length string must not end with NUL".into(),
                });
            }
            out.extend_from_slice(bytes);
            out.resize(out.len() + (max - bytes.len()), 0);
        }
        FieldType::String => {
            let s = expect_str(field, ty, value)?;
            if s.as_bytes().contains(&0) {
                return Err(EncodeError::InvalidValue {
                    field,
                    reason: "string contains interior NUL".into(),
                });
            }
            out.extend_from_slice(s.as_bytes());
            out.push(0);
        }
        FieldType::Bytes => {
            let bytes = value.as_bytes().ok_or(EncodeError::TypeMismatch {
                field,
                expected: ty.description(),
                actual: value.kind_name(),
            })?;
            if !last {
                let len = u32::try_from(bytes.len()).map_err(|_| EncodeError::ValueTooLong {
                    field,
                    max: u32::MAX as usize,
                    actual: bytes.len(),
                })?;
                out.extend_from_slice(&len.to_be_bytes());
            }
            out.extend_from_slice(bytes);
        }
        FieldType::Int8 => {
            let v = signed(field, ty, value, i8::MIN.into(), i8::MAX.into())?;
            out.push((v as i8 as u8) ^ 0x80);
        }
        FieldType::Int16 => {
            let v = signed(field, ty, value, i16::MIN.into(), i16::MAX.into())?;
            out.extend_from_slice(&((v as i16 as u16) ^ 0x8000).to_be_bytes());
        }
        FieldType::Int32 => {
            let v = signed(field, ty, value, i32::MIN.into(), i32::MAX.into())?;
            out.extend_from_slice(&((v as i32 as u32) ^ 0x8000_0000).to_be_bytes());
        }
        FieldType::Int64 => {
            let v = signed(field, ty, value, i64::MIN, i64::MAX)?;
            out.extend_from_slice(&((v as u64) ^ 0x8000_0000_0000_0000).to_be_bytes());
        }
        FieldType::UInt8 => {
            let v = unsigned(field, ty, value, u8::MAX.into())?;
            out.push(v as u8);
        }
        FieldType::UInt16 => {
            let v = unsigned(field, ty, value, u16::MAX.into())?;
            out.extend_from_slice(&(v as u16).to_be_bytes());
        }
        FieldType::UInt32 => {
            let v = unsigned(field, ty, value, u32::MAX.into())?;
            out.extend_from_slice(&(v as u32).to_be_bytes());
        }
        FieldType::UInt64 => {
            let v = unsigned(field, ty, value, u64::MAX)?;
            out.extend_from_slice(&v.to_be_bytes());
        }
        FieldType::RecordNumber => {
            let v = unsigned(field, ty, value, u64::MAX)?;
            if v == 0 {
                return Err(EncodeError::InvalidValue {
                    field,
                    reason: "record number 0 is reserved".into(),
                });
            }
            out.extend_from_slice(&v.to_be_bytes());
        }
    }
    Ok(())
}

fn expect_str(field: usize, ty: FieldType, value: &Value) -> Result<&str, EncodeError> {
    value.as_str().ok_or(EncodeError::TypeMismatch {
        field,
        expected: ty.description(),
        actual: value.kind_name(),
    })
}

fn signed(
    field: usize,
    ty: FieldType,
    value: &Value,
    min: i64,
    max: i64,
) -> Result<i64, EncodeError> {
    let v = match value {
        Value::Int(v) => *v,
        Value::UInt(v) => i64::try_from(*v).map_err(|_| EncodeError::OutOfRange {
            field,
            format: ty.tag(),
        })?,
        other => {
            return Err(EncodeError::TypeMismatch {
                field,
                expected: ty.description(),
                actual: other.kind_name(),
            });
        }
    };
    if v < min || v > max {
        return Err(EncodeError::OutOfRange {
            field,
            format: ty.tag(),
        });
    }
    Ok(v)
}

fn unsigned(field: usize, ty: FieldType, value: &Value, max: u64) -> Result<u64, EncodeError> {
    let v = match value {
        Value::UInt(v) => *v,
        Value::Int(v) => u64::try_from(*v).map_err(|_| EncodeError::OutOfRange {
            field,
            format: ty.tag(),
        })?,
        other => {
            return Err(EncodeError::TypeMismatch {
                field,
                expected: ty.description(),
                actual: other.kind_name(),
            });
        }
    };
    if v > max {
        return Err(EncodeError::OutOfRange {
            field,
            format: ty.tag(),
        });
    }
    Ok(v)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, field: usize, n: usize) -> Result<&'a [u8], EncodeError> {
        if self.remaining() < n {
            return Err(EncodeError::TruncatedInput {
                field,
                needed: n,
                remaining: self.remaining(),
            });
        }
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn take_array<const N: usize>(&mut self, field: usize) -> Result<[u8; N], EncodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(field, N)?);
        Ok(out)
    }

    fn take_rest(&mut self) -> &'a [u8] {
        let out = &self.bytes[self.pos..];
        self.pos = self.bytes.len();
        out
    }
}

fn decode_field(
    field: usize,
    ty: FieldType,
    last: bool,
    reader: &mut Reader<'_>,
) -> Result<Value, EncodeError> {
    let value = match ty {
        FieldType::FixedString(n) => {
            let raw = reader.take(field, n as usize)?;
            let end = raw.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
            Value::Str(utf8(field, &raw[..end])?.into())
        }
        FieldType::String => {
            let rest = &reader.bytes[reader.pos..];
            let Some(nul) = rest.iter().position(|b| *b == 0) else {
                return Err(EncodeError::TruncatedInput {
                    field,
                    needed: rest.len() + 1,
                    remaining: rest.len(),
                });
            };
            let raw = reader.take(field, nul + 1)?;
            Value::Str(utf8(field, &raw[..nul])?.into())
        }
        FieldType::Bytes => {
            if last {
                Value::Bytes(reader.take_rest().to_vec())
            } else {
                let len = u32::from_be_bytes(reader.take_array::<4>(field)?) as usize;
                Value::Bytes(reader.take(field, len)?.to_vec())
            }
        }
        FieldType::Int8 => Value::Int(i64::from((reader.take_array::<1>(field)?[0] ^ 0x80) as i8)),
        FieldType::Int16 => {
            let raw = u16::from_be_bytes(reader.take_array::<2>(field)?) ^ 0x8000;
            Value::Int(i64::from(raw as i16))
        }
        FieldType::Int32 => {
            let raw = u32::from_be_bytes(reader.take_array::<4>(field)?) ^ 0x8000_0000;
            Value::Int(i64::from(raw as i32))
        }
        FieldType::Int64 => {
            let raw = u64::from_be_bytes(reader.take_array::<8>(field)?) ^ 0x8000_0000_0000_0000;
            Value::Int(raw as i64)
        }
        FieldType::UInt8 => Value::UInt(u64::from(reader.take_array::<1>(field)?[0])),
        FieldType::UInt16 => Value::UInt(u64::from(u16::from_be_bytes(
            reader.take_array::<2>(field)?,
        ))),
        FieldType::UInt32 => Value::UInt(u64::from(u32::from_be_bytes(
            reader.take_array::<4>(field)?,
        ))),
        FieldType::UInt64 | FieldType::RecordNumber => {
            Value::UInt(u64::from_be_bytes(reader.take_array::<8>(field)?))
        }
    };
    Ok(value)
}

fn utf8(field: usize, raw: &[u8]) -> Result<&str, EncodeError> {
    std::str::from_utf8(raw).map_err(|e| EncodeError::InvalidValue {
        field,
        reason: format!("string is not utf-8: {e}"),
    })
}
