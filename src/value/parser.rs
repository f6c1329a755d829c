//! `YdbValue` accessors.
//!
//! Each accessor checks the declared type before reading the payload and fails
//! with `Error::Type` on a mismatch.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};

use super::builder::unix_epoch_date;
use super::decimal::{self, Decimal};
use super::types::{PrimitiveTypeId, Type, Value, ValueKind};
use super::YdbValue;

impl YdbValue {
    fn expect_primitive(&self, id: PrimitiveTypeId) -> Result<&ValueKind> {
        match (&self.ty, &self.value.kind) {
            (Type::Primitive(actual), Some(kind)) if *actual == id => Ok(kind),
            _ => Err(self.mismatch(&format!("{:?}", id))),
        }
    }

    fn mismatch(&self, expected: &str) -> Error {
        Error::Type(format!("Expected {}, got {}", expected, self.ty))
    }

    fn read_int32(&self, id: PrimitiveTypeId) -> Result<i32> {
        match self.expect_primitive(id)? {
            ValueKind::Int32(v) => Ok(*v),
            _ => Err(self.mismatch("Int32 payload")),
        }
    }

    fn read_uint32(&self, id: PrimitiveTypeId) -> Result<u32> {
        match self.expect_primitive(id)? {
            ValueKind::Uint32(v) => Ok(*v),
            _ => Err(self.mismatch("Uint32 payload")),
        }
    }

    fn read_int64(&self, id: PrimitiveTypeId) -> Result<i64> {
        match self.expect_primitive(id)? {
            ValueKind::Int64(v) => Ok(*v),
            _ => Err(self.mismatch("Int64 payload")),
        }
    }

    fn read_uint64(&self, id: PrimitiveTypeId) -> Result<u64> {
        match self.expect_primitive(id)? {
            ValueKind::Uint64(v) => Ok(*v),
            _ => Err(self.mismatch("Uint64 payload")),
        }
    }

    fn read_bytes(&self, id: PrimitiveTypeId) -> Result<&[u8]> {
        match self.expect_primitive(id)? {
            ValueKind::Bytes(v) => Ok(v),
            _ => Err(self.mismatch("bytes payload")),
        }
    }

    fn read_text(&self, id: PrimitiveTypeId) -> Result<&str> {
        match self.expect_primitive(id)? {
            ValueKind::Text(v) => Ok(v),
            _ => Err(self.mismatch("text payload")),
        }
    }

    fn narrow<T: TryFrom<i64>>(&self, value: i64) -> Result<T> {
        T::try_from(value).map_err(|_| Error::Type(format!("Value {} out of range for {}", value, self.ty)))
    }

    pub fn get_bool(&self) -> Result<bool> {
        match self.expect_primitive(PrimitiveTypeId::Bool)? {
            ValueKind::Bool(v) => Ok(*v),
            _ => Err(self.mismatch("Bool payload")),
        }
    }

    pub fn get_int8(&self) -> Result<i8> {
        let v = self.read_int32(PrimitiveTypeId::Int8)?;
        self.narrow(v as i64)
    }

    pub fn get_uint8(&self) -> Result<u8> {
        let v = self.read_uint32(PrimitiveTypeId::Uint8)?;
        self.narrow(v as i64)
    }

    pub fn get_int16(&self) -> Result<i16> {
        let v = self.read_int32(PrimitiveTypeId::Int16)?;
        self.narrow(v as i64)
    }

    pub fn get_uint16(&self) -> Result<u16> {
        let v = self.read_uint32(PrimitiveTypeId::Uint16)?;
        self.narrow(v as i64)
    }

    pub fn get_int32(&self) -> Result<i32> {
        self.read_int32(PrimitiveTypeId::Int32)
    }

    pub fn get_uint32(&self) -> Result<u32> {
        self.read_uint32(PrimitiveTypeId::Uint32)
    }

    pub fn get_int64(&self) -> Result<i64> {
        self.read_int64(PrimitiveTypeId::Int64)
    }

    pub fn get_uint64(&self) -> Result<u64> {
        self.read_uint64(PrimitiveTypeId::Uint64)
    }

    pub fn get_float(&self) -> Result<f32> {
        match self.expect_primitive(PrimitiveTypeId::Float)? {
            ValueKind::Float(v) => Ok(*v),
            _ => Err(self.mismatch("Float payload")),
        }
    }

    pub fn get_double(&self) -> Result<f64> {
        match self.expect_primitive(PrimitiveTypeId::Double)? {
            ValueKind::Double(v) => Ok(*v),
            _ => Err(self.mismatch("Double payload")),
        }
    }

    pub fn get_string(&self) -> Result<&[u8]> {
        self.read_bytes(PrimitiveTypeId::String)
    }

    pub fn get_utf8(&self) -> Result<&str> {
        self.read_text(PrimitiveTypeId::Utf8)
    }

    pub fn get_yson(&self) -> Result<&[u8]> {
        self.read_bytes(PrimitiveTypeId::Yson)
    }

    pub fn get_json(&self) -> Result<&str> {
        self.read_text(PrimitiveTypeId::Json)
    }

    /// Parse a `Json` or `JsonDocument` value.
    pub fn get_json_value(&self) -> Result<serde_json::Value> {
        let text = match &self.ty {
            Type::Primitive(PrimitiveTypeId::JsonDocument) => self.get_json_document()?,
            _ => self.get_json()?,
        };
        serde_json::from_str(text).map_err(|e| Error::Type(format!("Invalid JSON payload: {}", e)))
    }

    pub fn get_json_document(&self) -> Result<&str> {
        self.read_text(PrimitiveTypeId::JsonDocument)
    }

    pub fn get_uuid(&self) -> Result<Uuid> {
        match self.expect_primitive(PrimitiveTypeId::Uuid)? {
            ValueKind::Low128(low) => {
                let mut bytes = [0u8; 16];
                bytes[..8].copy_from_slice(&low.to_le_bytes());
                bytes[8..].copy_from_slice(&self.value.high_128.to_le_bytes());
                Ok(Uuid::from_bytes_le(bytes))
            }
            _ => Err(self.mismatch("128-bit payload")),
        }
    }

    pub fn get_date(&self) -> Result<NaiveDate> {
        let days = self.read_uint32(PrimitiveTypeId::Date)?;
        unix_epoch_date()
            .checked_add_signed(chrono::Duration::days(days as i64))
            .ok_or_else(|| Error::Type(format!("Date {} days is out of range", days)))
    }

    pub fn get_datetime(&self) -> Result<DateTime<Utc>> {
        let seconds = self.read_uint32(PrimitiveTypeId::Datetime)?;
        DateTime::from_timestamp(seconds as i64, 0)
            .ok_or_else(|| Error::Type(format!("Datetime {} is out of range", seconds)))
    }

    pub fn get_timestamp(&self) -> Result<DateTime<Utc>> {
        let micros = self.read_uint64(PrimitiveTypeId::Timestamp)?;
        let micros = i64::try_from(micros)
            .map_err(|_| Error::Type(format!("Timestamp {} is out of range", micros)))?;
        DateTime::from_timestamp_micros(micros)
            .ok_or_else(|| Error::Type(format!("Timestamp {} is out of range", micros)))
    }

    pub fn get_interval(&self) -> Result<chrono::Duration> {
        Ok(chrono::Duration::microseconds(
            self.read_int64(PrimitiveTypeId::Interval)?,
        ))
    }

    pub fn get_decimal(&self) -> Result<Decimal> {
        match (&self.ty, &self.value.kind) {
            (Type::Decimal { scale, .. }, Some(ValueKind::Low128(low))) => {
                decimal::decode(*low, self.value.high_128, *scale)
            }
            _ => Err(self.mismatch("Decimal")),
        }
    }

    /// Unwrap one `Optional` level; `None` for a null at this level.
    pub fn get_optional(&self) -> Result<Option<YdbValue>> {
        let item = match &self.ty {
            Type::Optional(item) => item.as_ref(),
            _ => return Err(self.mismatch("Optional")),
        };

        if self.value.is_null() {
            return Ok(None);
        }

        let payload = if item.is_optional() {
            match &self.value.kind {
                Some(ValueKind::Nested(inner)) => inner.as_ref().clone(),
                _ => return Err(self.mismatch("nested optional payload")),
            }
        } else {
            self.value.clone()
        };

        Ok(Some(YdbValue::new_unchecked(item.clone(), payload)))
    }

    pub fn get_list(&self) -> Result<Vec<YdbValue>> {
        match &self.ty {
            Type::List(item) => Ok(self
                .value
                .items
                .iter()
                .map(|v| YdbValue::new_unchecked(item.as_ref().clone(), v.clone()))
                .collect()),
            _ => Err(self.mismatch("List")),
        }
    }

    pub fn get_tuple(&self) -> Result<Vec<YdbValue>> {
        match &self.ty {
            Type::Tuple(elements) => Ok(zip_children(elements.iter(), &self.value)),
            _ => Err(self.mismatch("Tuple")),
        }
    }

    /// Struct members in declaration order.
    pub fn get_struct(&self) -> Result<Vec<(String, YdbValue)>> {
        match &self.ty {
            Type::Struct(members) => Ok(members
                .iter()
                .map(|m| m.name.clone())
                .zip(zip_children(members.iter().map(|m| &m.ty), &self.value))
                .collect()),
            _ => Err(self.mismatch("Struct")),
        }
    }
}

fn zip_children<'a>(types: impl Iterator<Item = &'a Type>, value: &Value) -> Vec<YdbValue> {
    types
        .zip(&value.items)
        .map(|(t, v)| YdbValue::new_unchecked(t.clone(), v.clone()))
        .collect()
}
