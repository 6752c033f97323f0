//! Format strings: the declarative type descriptors for the key and value
//! side of a table, e.g. `r`, `5sHQ`, `SiQ`.
//!
//! A format string is a sequence of single-character type tags. A decimal
//! length may precede `s` (fixed-length string) and nothing else.

use crate::error::SchemaError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest fixed-length string a format may declare.
pub const MAX_FIXED_STRING_LEN: u32 = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// Fixed-length string of exactly N bytes, zero padded.
    FixedString(u32),
    /// NUL-terminated string.
    String,
    /// Raw bytes, length-prefixed unless last.
    Bytes,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    /// Record number: u64, zero reserved.
    RecordNumber,
}

impl FieldType {
    pub fn tag(self) -> char {
        match self {
            FieldType::FixedString(_) => 's',
            FieldType::String => 'S',
            FieldType::Bytes => 'u',
            FieldType::Int8 => 'b',
            FieldType::UInt8 => 'B',
            FieldType::Int16 => 'h',
            FieldType::UInt16 => 'H',
            FieldType::Int32 => 'i',
            FieldType::UInt32 => 'I',
            FieldType::Int64 => 'q',
            FieldType::UInt64 => 'Q',
            FieldType::RecordNumber => 'r',
        }
    }

    fn from_tag(tag: char, length: Option<u32>) -> Option<Self> {
        let ty = match tag {
            's' => return Some(FieldType::FixedString(length.unwrap_or(1))),
            'S' => FieldType::String,
            'u' => FieldType::Bytes,
            'b' => FieldType::Int8,
            'B' => FieldType::UInt8,
            'h' => FieldType::Int16,
            'H' => FieldType::UInt16,
            'i' | 'l' => FieldType::Int32,
            'I' | 'L' => FieldType::UInt32,
            'q' => FieldType::Int64,
            'Q' => FieldType::UInt64,
            'r' => FieldType::RecordNumber,
            _ => return None,
        };
        Some(ty)
    }

    /// Encoded width in bytes, `None` for variable-length types.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            FieldType::FixedString(n) => Some(n as usize),
            FieldType::String | FieldType::Bytes => None,
            FieldType::Int8 | FieldType::UInt8 => Some(1),
            FieldType::Int16 | FieldType::UInt16 => Some(2),
            FieldType::Int32 | FieldType::UInt32 => Some(4),
            FieldType::Int64 | FieldType::UInt64 | FieldType::RecordNumber => Some(8),
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            FieldType::Int8 | FieldType::Int16 | FieldType::Int32 | FieldType::Int64
        )
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            FieldType::UInt8
                | FieldType::UInt16
                | FieldType::UInt32
                | FieldType::UInt64
                | FieldType::RecordNumber
        )
    }

    pub fn description(self) -> &'static str {
        match self {
            FieldType::FixedString(_) | FieldType::String => "string",
            FieldType::Bytes => "bytes",
            t if t.is_signed() => "signed integer",
            _ => "unsigned integer",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::FixedString(n) => write!(f, "{n}s"),
            other => write!(f, "{}", other.tag()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormatDescriptor {
    fields: Vec<FieldType>,
}

impl FormatDescriptor {
    pub fn parse(spec: &str) -> Result<Self, SchemaError> {
        let invalid = |reason: String| SchemaError::InvalidFormat {
            format: spec.to_string(),
            reason,
        };
        if spec.is_empty() {
            return Err(invalid("format string is empty".into()));
        }

        let mut fields = Vec::new();
        let mut length: Option<u32> = None;
        for (pos, c) in spec.char_indices() {
            if let Some(digit) = c.to_digit(10) {
                let next = length
                    .unwrap_or(0)
                    .checked_mul(10)
                    .and_then(|n| n.checked_add(digit))
                    .ok_or_else(|| invalid(format!("length at offset {pos} overflows")))?;
                length = Some(next);
                continue;
            }
            if let Some(n) = length {
                if c != 's' {
                    return Err(invalid(format!(
                        "length modifier not allowed before '{c}' at offset {pos}"
                    )));
                }
                if n == 0 {
                    return Err(invalid(format!("length at offset {pos} must be positive")));
                }
                if n > MAX_FIXED_STRING_LEN {
                    return Err(invalid(format!(
                        "length {n} at offset {pos} exceeds {MAX_FIXED_STRING_LEN}"
                    )));
                }
            }
            let ty = FieldType::from_tag(c, length.take())
                .ok_or_else(|| invalid(format!("unknown type '{c}' at offset {pos}")))?;
            fields.push(ty);
        }
        if length.is_some() {
            return Err(invalid("length modifier without a type".into()));
        }
        Ok(Self { fields })
    }

    pub fn from_fields(fields: Vec<FieldType>) -> Self {
        Self { fields }
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field_type_at(&self, index: usize) -> Option<FieldType> {
        self.fields.get(index).copied()
    }

    pub fn fields(&self) -> &[FieldType] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Sub-descriptor holding the fields at `positions`, in that order.
    pub fn select(&self, positions: &[usize]) -> Self {
        Self {
            fields: positions.iter().map(|&p| self.fields[p]).collect(),
        }
    }

    pub fn concat(&self, other: &FormatDescriptor) -> Self {
        let mut fields = self.fields.clone();
        fields.extend_from_slice(&other.fields);
        Self { fields }
    }

    /// Length-prefixed byte fields sort by length first, so they may only end
    /// a key. `S` is exempt: it is NUL-terminated and carries no interior NUL,
    /// so its bytes compare the same as the strings wherever it sits.
    pub fn validate_key_format(&self) -> Result<(), SchemaError> {
        let last = self.fields.len().saturating_sub(1);
        for (i, ty) in self.fields.iter().enumerate() {
            if *ty == FieldType::Bytes && i != last {
                return Err(SchemaError::InvalidFormat {
                    format: self.to_string(),
                    reason: format!("variable-length 'u' field {i} must be last in a key format"),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for field in &self.fields {
            write!(f, "{field}")?;
        }
        Ok(())
    }
}
