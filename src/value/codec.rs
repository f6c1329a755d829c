//! Binary encoding of typed values.
//!
//! Layout (all integers big-endian):
//! - Byte: format version
//! - Type: tag byte followed by the tag's fields, recursively
//! - Value: scalar tag byte and scalar, Int32 item count, items
//!
//! Strings and byte arrays are an Int32 length followed by the raw bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

use super::types::{PrimitiveTypeId, StructMember, Type, Value, ValueKind};
use super::YdbValue;

pub const FORMAT_VERSION: u8 = 1;

/// Nesting limit when decoding, so hostile input cannot exhaust the stack.
const MAX_DEPTH: usize = 64;

// Type tags
const TYPE_PRIMITIVE: u8 = 0x01;
const TYPE_DECIMAL: u8 = 0x02;
const TYPE_OPTIONAL: u8 = 0x03;
const TYPE_LIST: u8 = 0x04;
const TYPE_TUPLE: u8 = 0x05;
const TYPE_STRUCT: u8 = 0x06;

// Value tags
const VALUE_NONE: u8 = 0x00;
const VALUE_BOOL: u8 = 0x01;
const VALUE_INT32: u8 = 0x02;
const VALUE_UINT32: u8 = 0x03;
const VALUE_INT64: u8 = 0x04;
const VALUE_UINT64: u8 = 0x05;
const VALUE_FLOAT: u8 = 0x06;
const VALUE_DOUBLE: u8 = 0x07;
const VALUE_BYTES: u8 = 0x08;
const VALUE_TEXT: u8 = 0x09;
const VALUE_NULL: u8 = 0x0A;
const VALUE_NESTED: u8 = 0x0B;
const VALUE_INT128: u8 = 0x0C;

impl YdbValue {
    /// Encode this value with its type.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u8(FORMAT_VERSION);
        encode_type(self.ty(), &mut buf);
        encode_value(self.value(), &mut buf);
        buf.freeze()
    }

    /// Decode a value produced by [`YdbValue::to_bytes`], validating the payload
    /// against the decoded type.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut buf = data;
        ensure(&buf, 1)?;
        let version = buf.get_u8();
        if version != FORMAT_VERSION {
            return Err(Error::Protocol(format!(
                "Unsupported value format version: {}",
                version
            )));
        }

        let ty = decode_type(&mut buf, 0)?;
        let value = decode_value(&mut buf, 0)?;
        if buf.has_remaining() {
            return Err(Error::Protocol(format!(
                "{} trailing bytes after value",
                buf.remaining()
            )));
        }

        YdbValue::from_parts(ty, value).map_err(|e| Error::Protocol(e.to_string()))
    }
}

// ============================================================================
// Encoding
// ============================================================================

fn put_len(buf: &mut BytesMut, len: usize) {
    buf.put_u32(len as u32);
}

fn put_bytes(buf: &mut BytesMut, data: &[u8]) {
    put_len(buf, data.len());
    buf.put_slice(data);
}

pub fn encode_type(ty: &Type, buf: &mut BytesMut) {
    match ty {
        Type::Primitive(id) => {
            buf.put_u8(TYPE_PRIMITIVE);
            buf.put_u16(id.wire_id());
        }
        Type::Decimal { precision, scale } => {
            buf.put_u8(TYPE_DECIMAL);
            buf.put_u8(*precision as u8);
            buf.put_u8(*scale as u8);
        }
        Type::Optional(item) => {
            buf.put_u8(TYPE_OPTIONAL);
            encode_type(item, buf);
        }
        Type::List(item) => {
            buf.put_u8(TYPE_LIST);
            encode_type(item, buf);
        }
        Type::Tuple(elements) => {
            buf.put_u8(TYPE_TUPLE);
            put_len(buf, elements.len());
            for element in elements {
                encode_type(element, buf);
            }
        }
        Type::Struct(members) => {
            buf.put_u8(TYPE_STRUCT);
            put_len(buf, members.len());
            for member in members {
                put_bytes(buf, member.name.as_bytes());
                encode_type(&member.ty, buf);
            }
        }
    }
}

pub fn encode_value(value: &Value, buf: &mut BytesMut) {
    match &value.kind {
        None => buf.put_u8(VALUE_NONE),
        Some(ValueKind::Bool(v)) => {
            buf.put_u8(VALUE_BOOL);
            buf.put_u8(u8::from(*v));
        }
        Some(ValueKind::Int32(v)) => {
            buf.put_u8(VALUE_INT32);
            buf.put_i32(*v);
        }
        Some(ValueKind::Uint32(v)) => {
            buf.put_u8(VALUE_UINT32);
            buf.put_u32(*v);
        }
        Some(ValueKind::Int64(v)) => {
            buf.put_u8(VALUE_INT64);
            buf.put_i64(*v);
        }
        Some(ValueKind::Uint64(v)) => {
            buf.put_u8(VALUE_UINT64);
            buf.put_u64(*v);
        }
        Some(ValueKind::Float(v)) => {
            buf.put_u8(VALUE_FLOAT);
            buf.put_f32(*v);
        }
        Some(ValueKind::Double(v)) => {
            buf.put_u8(VALUE_DOUBLE);
            buf.put_f64(*v);
        }
        Some(ValueKind::Bytes(v)) => {
            buf.put_u8(VALUE_BYTES);
            put_bytes(buf, v);
        }
        Some(ValueKind::Text(v)) => {
            buf.put_u8(VALUE_TEXT);
            put_bytes(buf, v.as_bytes());
        }
        Some(ValueKind::NullFlag) => buf.put_u8(VALUE_NULL),
        Some(ValueKind::Nested(inner)) => {
            buf.put_u8(VALUE_NESTED);
            encode_value(inner, buf);
        }
        Some(ValueKind::Low128(low)) => {
            buf.put_u8(VALUE_INT128);
            buf.put_u64(*low);
            buf.put_u64(value.high_128);
        }
    }

    put_len(buf, value.items.len());
    for item in &value.items {
        encode_value(item, buf);
    }
}

// ============================================================================
// Decoding
// ============================================================================

fn ensure(buf: &&[u8], needed: usize) -> Result<()> {
    if buf.remaining() < needed {
        return Err(Error::Protocol(format!(
            "Unexpected end of value data: need {} bytes, have {}",
            needed,
            buf.remaining()
        )));
    }
    Ok(())
}

fn check_depth(depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(Error::Protocol(format!(
            "Value nesting exceeds {} levels",
            MAX_DEPTH
        )));
    }
    Ok(())
}

fn get_len(buf: &mut &[u8]) -> Result<usize> {
    ensure(buf, 4)?;
    Ok(buf.get_u32() as usize)
}

fn get_bytes(buf: &mut &[u8]) -> Result<Vec<u8>> {
    let len = get_len(buf)?;
    ensure(buf, len)?;
    let data = buf[..len].to_vec();
    buf.advance(len);
    Ok(data)
}

fn get_string(buf: &mut &[u8]) -> Result<String> {
    String::from_utf8(get_bytes(buf)?)
        .map_err(|e| Error::Protocol(format!("Invalid UTF-8 in value data: {}", e)))
}

pub fn decode_type(buf: &mut &[u8], depth: usize) -> Result<Type> {
    check_depth(depth)?;
    ensure(buf, 1)?;
    match buf.get_u8() {
        TYPE_PRIMITIVE => {
            ensure(buf, 2)?;
            Ok(Type::Primitive(PrimitiveTypeId::from_wire_id(buf.get_u16())?))
        }
        TYPE_DECIMAL => {
            ensure(buf, 2)?;
            let precision = buf.get_u8() as u32;
            let scale = buf.get_u8() as u32;
            Ok(Type::Decimal { precision, scale })
        }
        TYPE_OPTIONAL => Ok(Type::optional(decode_type(buf, depth + 1)?)),
        TYPE_LIST => Ok(Type::list(decode_type(buf, depth + 1)?)),
        TYPE_TUPLE => {
            let count = get_len(buf)?;
            let mut elements = Vec::with_capacity(count.min(buf.remaining()));
            for _ in 0..count {
                elements.push(decode_type(buf, depth + 1)?);
            }
            Ok(Type::Tuple(elements))
        }
        TYPE_STRUCT => {
            let count = get_len(buf)?;
            let mut members = Vec::with_capacity(count.min(buf.remaining()));
            for _ in 0..count {
                let name = get_string(buf)?;
                let ty = decode_type(buf, depth + 1)?;
                members.push(StructMember { name, ty });
            }
            Ok(Type::Struct(members))
        }
        tag => Err(Error::Protocol(format!("Unknown type tag: {:#04x}", tag))),
    }
}

pub fn decode_value(buf: &mut &[u8], depth: usize) -> Result<Value> {
    check_depth(depth)?;
    ensure(buf, 1)?;

    let mut high_128 = 0;
    let kind = match buf.get_u8() {
        VALUE_NONE => None,
        VALUE_BOOL => {
            ensure(buf, 1)?;
            Some(ValueKind::Bool(buf.get_u8() != 0))
        }
        VALUE_INT32 => {
            ensure(buf, 4)?;
            Some(ValueKind::Int32(buf.get_i32()))
        }
        VALUE_UINT32 => {
            ensure(buf, 4)?;
            Some(ValueKind::Uint32(buf.get_u32()))
        }
        VALUE_INT64 => {
            ensure(buf, 8)?;
            Some(ValueKind::Int64(buf.get_i64()))
        }
        VALUE_UINT64 => {
            ensure(buf, 8)?;
            Some(ValueKind::Uint64(buf.get_u64()))
        }
        VALUE_FLOAT => {
            ensure(buf, 4)?;
            Some(ValueKind::Float(buf.get_f32()))
        }
        VALUE_DOUBLE => {
            ensure(buf, 8)?;
            Some(ValueKind::Double(buf.get_f64()))
        }
        VALUE_BYTES => Some(ValueKind::Bytes(get_bytes(buf)?)),
        VALUE_TEXT => Some(ValueKind::Text(get_string(buf)?)),
        VALUE_NULL => Some(ValueKind::NullFlag),
        VALUE_NESTED => Some(ValueKind::Nested(Box::new(decode_value(buf, depth + 1)?))),
        VALUE_INT128 => {
            ensure(buf, 16)?;
            let low = buf.get_u64();
            high_128 = buf.get_u64();
            Some(ValueKind::Low128(low))
        }
        tag => return Err(Error::Protocol(format!("Unknown value tag: {:#04x}", tag))),
    };

    let count = get_len(buf)?;
    let mut items = Vec::with_capacity(count.min(buf.remaining()));
    for _ in 0..count {
        items.push(decode_value(buf, depth + 1)?);
    }

    Ok(Value {
        kind,
        items,
        high_128,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_layout() {
        let encoded = YdbValue::make_int32(42).to_bytes();

        // version, type tag, wire id (2), value tag, Int32, item count
        assert_eq!(encoded.len(), 1 + 1 + 2 + 1 + 4 + 4);
        assert_eq!(encoded[0], FORMAT_VERSION);
        assert_eq!(encoded[1], TYPE_PRIMITIVE);
        assert_eq!(u16::from_be_bytes([encoded[2], encoded[3]]), 0x0001);
        assert_eq!(encoded[4], VALUE_INT32);
        assert_eq!(i32::from_be_bytes([encoded[5], encoded[6], encoded[7], encoded[8]]), 42);
    }

    #[test]
    fn test_nested_struct_survives_encoding() {
        let value = YdbValue::make_struct([
            ("name", YdbValue::make_utf8("Ada")),
            (
                "tags",
                YdbValue::make_list(vec![YdbValue::make_utf8("a"), YdbValue::make_utf8("b")]).unwrap(),
            ),
            (
                "score",
                YdbValue::make_optional(YdbValue::make_optional_double(None)),
            ),
        ])
        .unwrap();

        let decoded = YdbValue::from_bytes(&value.to_bytes()).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_rejects_truncated_input() {
        let encoded = YdbValue::make_utf8("hello").to_bytes();
        let err = YdbValue::from_bytes(&encoded[..encoded.len() - 3]).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let mut encoded = YdbValue::make_bool(true).to_bytes().to_vec();
        encoded.push(0);
        assert!(matches!(YdbValue::from_bytes(&encoded), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_rejects_mismatched_payload() {
        let mut buf = BytesMut::new();
        buf.put_u8(FORMAT_VERSION);
        encode_type(&Type::Primitive(PrimitiveTypeId::Int32), &mut buf);
        encode_value(&Value::scalar(ValueKind::Text("nope".to_string())), &mut buf);

        assert!(matches!(YdbValue::from_bytes(&buf), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut encoded = YdbValue::make_bool(true).to_bytes().to_vec();
        encoded[0] = 99;
        assert!(YdbValue::from_bytes(&encoded).is_err());
    }
}
