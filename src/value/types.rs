//! Wire-level type descriptors and value payloads.
//!
//! `Type` and `Value` mirror the query service value model: a recursive type tree
//! plus a payload whose shape has to match it.

use std::fmt;

use crate::error::{Error, Result};

use super::decimal;

// ============================================================================
// Primitive Type Ids
// ============================================================================

/// Primitive type identifiers, carrying their wire ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTypeId {
    Bool,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float,
    Double,
    Date,
    Datetime,
    Timestamp,
    Interval,
    String,
    Utf8,
    Yson,
    Json,
    Uuid,
    JsonDocument,
}

impl PrimitiveTypeId {
    pub const ALL: [PrimitiveTypeId; 21] = [
        PrimitiveTypeId::Bool,
        PrimitiveTypeId::Int8,
        PrimitiveTypeId::Uint8,
        PrimitiveTypeId::Int16,
        PrimitiveTypeId::Uint16,
        PrimitiveTypeId::Int32,
        PrimitiveTypeId::Uint32,
        PrimitiveTypeId::Int64,
        PrimitiveTypeId::Uint64,
        PrimitiveTypeId::Float,
        PrimitiveTypeId::Double,
        PrimitiveTypeId::Date,
        PrimitiveTypeId::Datetime,
        PrimitiveTypeId::Timestamp,
        PrimitiveTypeId::Interval,
        PrimitiveTypeId::String,
        PrimitiveTypeId::Utf8,
        PrimitiveTypeId::Yson,
        PrimitiveTypeId::Json,
        PrimitiveTypeId::Uuid,
        PrimitiveTypeId::JsonDocument,
    ];

    /// Wire id of this primitive type.
    pub fn wire_id(self) -> u16 {
        match self {
            PrimitiveTypeId::Bool => 0x0006,
            PrimitiveTypeId::Int8 => 0x0007,
            PrimitiveTypeId::Uint8 => 0x0005,
            PrimitiveTypeId::Int16 => 0x0008,
            PrimitiveTypeId::Uint16 => 0x0009,
            PrimitiveTypeId::Int32 => 0x0001,
            PrimitiveTypeId::Uint32 => 0x0002,
            PrimitiveTypeId::Int64 => 0x0003,
            PrimitiveTypeId::Uint64 => 0x0004,
            PrimitiveTypeId::Float => 0x0021,
            PrimitiveTypeId::Double => 0x0020,
            PrimitiveTypeId::Date => 0x0030,
            PrimitiveTypeId::Datetime => 0x0031,
            PrimitiveTypeId::Timestamp => 0x0032,
            PrimitiveTypeId::Interval => 0x0033,
            PrimitiveTypeId::String => 0x1001,
            PrimitiveTypeId::Utf8 => 0x1200,
            PrimitiveTypeId::Yson => 0x1201,
            PrimitiveTypeId::Json => 0x1202,
            PrimitiveTypeId::Uuid => 0x1203,
            PrimitiveTypeId::JsonDocument => 0x1204,
        }
    }

    pub fn from_wire_id(id: u16) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.wire_id() == id)
            .ok_or_else(|| Error::Protocol(format!("Unknown primitive type id: {:#06x}", id)))
    }

    /// Payload field this primitive type is stored in.
    pub(crate) fn payload_kind(self) -> PayloadKind {
        match self {
            PrimitiveTypeId::Bool => PayloadKind::Bool,
            PrimitiveTypeId::Int8 | PrimitiveTypeId::Int16 | PrimitiveTypeId::Int32 => {
                PayloadKind::Int32
            }
            PrimitiveTypeId::Uint8
            | PrimitiveTypeId::Uint16
            | PrimitiveTypeId::Uint32
            | PrimitiveTypeId::Date
            | PrimitiveTypeId::Datetime => PayloadKind::Uint32,
            PrimitiveTypeId::Int64 | PrimitiveTypeId::Interval => PayloadKind::Int64,
            PrimitiveTypeId::Uint64 | PrimitiveTypeId::Timestamp => PayloadKind::Uint64,
            PrimitiveTypeId::Float => PayloadKind::Float,
            PrimitiveTypeId::Double => PayloadKind::Double,
            PrimitiveTypeId::String | PrimitiveTypeId::Yson => PayloadKind::Bytes,
            PrimitiveTypeId::Utf8 | PrimitiveTypeId::Json | PrimitiveTypeId::JsonDocument => {
                PayloadKind::Text
            }
            PrimitiveTypeId::Uuid => PayloadKind::Int128,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PayloadKind {
    Bool,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float,
    Double,
    Bytes,
    Text,
    Int128,
}

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructMember {
    pub name: String,
    pub ty: Type,
}

/// Recursive type descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Primitive(PrimitiveTypeId),
    Decimal { precision: u32, scale: u32 },
    Optional(Box<Type>),
    List(Box<Type>),
    Tuple(Vec<Type>),
    Struct(Vec<StructMember>),
}

impl Type {
    pub fn optional(item: Type) -> Self {
        Type::Optional(Box::new(item))
    }

    pub fn list(item: Type) -> Self {
        Type::List(Box::new(item))
    }

    #[inline]
    pub fn is_optional(&self) -> bool {
        matches!(self, Type::Optional(_))
    }

    /// Check that the type itself is well formed: decimal bounds hold at every
    /// level of the tree.
    pub fn check(&self) -> Result<()> {
        match self {
            Type::Primitive(_) => Ok(()),
            Type::Decimal { precision, scale } => decimal::check_type(*precision, *scale),
            Type::Optional(item) | Type::List(item) => item.check(),
            Type::Tuple(elements) => elements.iter().try_for_each(Type::check),
            Type::Struct(members) => members.iter().try_for_each(|m| m.ty.check()),
        }
    }

    /// Check that `value` has the payload shape this type requires.
    pub fn validate(&self, value: &Value) -> Result<()> {
        match self {
            Type::Primitive(id) => {
                if value.matches_payload(id.payload_kind()) {
                    Ok(())
                } else {
                    Err(Error::Type(format!("Payload does not match type {}", self)))
                }
            }
            Type::Decimal { precision, scale } => {
                decimal::check_type(*precision, *scale)?;
                if value.matches_payload(PayloadKind::Int128) {
                    Ok(())
                } else {
                    Err(Error::Type(format!("Payload does not match type {}", self)))
                }
            }
            Type::Optional(item) => match &value.kind {
                Some(ValueKind::NullFlag) => item.check(),
                Some(ValueKind::Nested(inner)) if item.is_optional() => item.validate(inner),
                _ if item.is_optional() => Err(Error::Type(format!(
                    "Nested optional {} requires a nested payload",
                    self
                ))),
                _ => item.validate(value),
            },
            Type::List(item) => {
                if value.kind.is_some() {
                    return Err(Error::Type(format!("Payload does not match type {}", self)));
                }
                item.check()?;
                value.items.iter().try_for_each(|v| item.validate(v))
            }
            Type::Tuple(elements) => {
                if value.kind.is_some() || value.items.len() != elements.len() {
                    return Err(Error::Type(format!("Payload does not match type {}", self)));
                }
                elements
                    .iter()
                    .zip(&value.items)
                    .try_for_each(|(t, v)| t.validate(v))
            }
            Type::Struct(members) => {
                if value.kind.is_some() || value.items.len() != members.len() {
                    return Err(Error::Type(format!("Payload does not match type {}", self)));
                }
                members
                    .iter()
                    .zip(&value.items)
                    .try_for_each(|(m, v)| m.ty.validate(v))
            }
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Primitive(id) => write!(f, "{:?}", id),
            Type::Decimal { precision, scale } => write!(f, "Decimal({},{})", precision, scale),
            Type::Optional(item) => write!(f, "Optional<{}>", item),
            Type::List(item) => write!(f, "List<{}>", item),
            Type::Tuple(elements) => {
                write!(f, "Tuple<")?;
                for (i, t) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, ">")
            }
            Type::Struct(members) => {
                write!(f, "Struct<")?;
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "'{}':{}", m.name, m.ty)?;
                }
                write!(f, ">")
            }
        }
    }
}

// ============================================================================
// Values
// ============================================================================

/// Scalar slot of a payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    Bool(bool),
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Uint64(u64),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    Text(String),
    NullFlag,
    Nested(Box<Value>),
    /// Low word of a 128-bit value; the high word lives in `Value::high_128`.
    Low128(u64),
}

/// Value payload: an optional scalar slot, child items and the high 128-bit word.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Value {
    pub kind: Option<ValueKind>,
    pub items: Vec<Value>,
    pub high_128: u64,
}

impl Value {
    pub fn scalar(kind: ValueKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn int128(low: u64, high: u64) -> Self {
        Self {
            kind: Some(ValueKind::Low128(low)),
            items: Vec::new(),
            high_128: high,
        }
    }

    pub fn null() -> Self {
        Self::scalar(ValueKind::NullFlag)
    }

    pub fn nested(inner: Value) -> Self {
        Self::scalar(ValueKind::Nested(Box::new(inner)))
    }

    pub fn with_items(items: Vec<Value>) -> Self {
        Self {
            kind: None,
            items,
            high_128: 0,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self.kind, Some(ValueKind::NullFlag))
    }

    fn matches_payload(&self, kind: PayloadKind) -> bool {
        if !self.items.is_empty() {
            return false;
        }
        matches!(
            (kind, &self.kind),
            (PayloadKind::Bool, Some(ValueKind::Bool(_)))
                | (PayloadKind::Int32, Some(ValueKind::Int32(_)))
                | (PayloadKind::Uint32, Some(ValueKind::Uint32(_)))
                | (PayloadKind::Int64, Some(ValueKind::Int64(_)))
                | (PayloadKind::Uint64, Some(ValueKind::Uint64(_)))
                | (PayloadKind::Float, Some(ValueKind::Float(_)))
                | (PayloadKind::Double, Some(ValueKind::Double(_)))
                | (PayloadKind::Bytes, Some(ValueKind::Bytes(_)))
                | (PayloadKind::Text, Some(ValueKind::Text(_)))
                | (PayloadKind::Int128, Some(ValueKind::Low128(_)))
        )
    }
}
