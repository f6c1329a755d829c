//! `YdbValue` constructors.
//!
//! Scalars map 1:1 onto payload fields by primitive kind. Composite constructors
//! validate their inputs and fail with `Error::Argument` instead of coercing.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};

use super::decimal::{self, Decimal, DEFAULT_PRECISION, DEFAULT_SCALE};
use super::types::{PrimitiveTypeId, StructMember, Type, Value, ValueKind};
use super::YdbValue;

pub(crate) fn unix_epoch_date() -> NaiveDate {
    DateTime::<Utc>::UNIX_EPOCH.date_naive()
}

fn primitive(id: PrimitiveTypeId, kind: ValueKind) -> YdbValue {
    YdbValue::new_unchecked(Type::Primitive(id), Value::scalar(kind))
}

/// Split the .NET-compatible byte layout of a UUID into (low, high) words.
pub(crate) fn uuid_to_words(uuid: &Uuid) -> (u64, u64) {
    let bytes = uuid.to_bytes_le();
    let mut low = [0u8; 8];
    let mut high = [0u8; 8];
    low.copy_from_slice(&bytes[..8]);
    high.copy_from_slice(&bytes[8..]);
    (u64::from_le_bytes(low), u64::from_le_bytes(high))
}

macro_rules! optional_constructors {
    ($($name:ident => $make:ident($ty:ty), $id:expr;)*) => {
        $(
            pub fn $name(value: Option<$ty>) -> YdbValue {
                match value {
                    Some(v) => Self::make_optional(Self::$make(v)),
                    None => Self::null_of(Type::Primitive($id)),
                }
            }
        )*
    };
}

impl YdbValue {
    // ========================================================================
    // Scalars
    // ========================================================================

    pub fn make_bool(value: bool) -> Self {
        primitive(PrimitiveTypeId::Bool, ValueKind::Bool(value))
    }

    pub fn make_int8(value: i8) -> Self {
        primitive(PrimitiveTypeId::Int8, ValueKind::Int32(value as i32))
    }

    pub fn make_uint8(value: u8) -> Self {
        primitive(PrimitiveTypeId::Uint8, ValueKind::Uint32(value as u32))
    }

    pub fn make_int16(value: i16) -> Self {
        primitive(PrimitiveTypeId::Int16, ValueKind::Int32(value as i32))
    }

    pub fn make_uint16(value: u16) -> Self {
        primitive(PrimitiveTypeId::Uint16, ValueKind::Uint32(value as u32))
    }

    pub fn make_int32(value: i32) -> Self {
        primitive(PrimitiveTypeId::Int32, ValueKind::Int32(value))
    }

    pub fn make_uint32(value: u32) -> Self {
        primitive(PrimitiveTypeId::Uint32, ValueKind::Uint32(value))
    }

    pub fn make_int64(value: i64) -> Self {
        primitive(PrimitiveTypeId::Int64, ValueKind::Int64(value))
    }

    pub fn make_uint64(value: u64) -> Self {
        primitive(PrimitiveTypeId::Uint64, ValueKind::Uint64(value))
    }

    pub fn make_float(value: f32) -> Self {
        primitive(PrimitiveTypeId::Float, ValueKind::Float(value))
    }

    pub fn make_double(value: f64) -> Self {
        primitive(PrimitiveTypeId::Double, ValueKind::Double(value))
    }

    /// Raw bytes (`String` on the wire).
    pub fn make_string(value: impl Into<Vec<u8>>) -> Self {
        primitive(PrimitiveTypeId::String, ValueKind::Bytes(value.into()))
    }

    pub fn make_utf8(value: impl Into<String>) -> Self {
        primitive(PrimitiveTypeId::Utf8, ValueKind::Text(value.into()))
    }

    pub fn make_yson(value: impl Into<Vec<u8>>) -> Self {
        primitive(PrimitiveTypeId::Yson, ValueKind::Bytes(value.into()))
    }

    pub fn make_json(value: impl Into<String>) -> Self {
        primitive(PrimitiveTypeId::Json, ValueKind::Text(value.into()))
    }

    /// Serialize a JSON document into a `Json` value.
    pub fn make_json_value(value: &serde_json::Value) -> Self {
        Self::make_json(value.to_string())
    }

    pub fn make_json_document(value: impl Into<String>) -> Self {
        primitive(PrimitiveTypeId::JsonDocument, ValueKind::Text(value.into()))
    }

    pub fn make_uuid(value: Uuid) -> Self {
        let (low, high) = uuid_to_words(&value);
        Self::new_unchecked(Type::Primitive(PrimitiveTypeId::Uuid), Value::int128(low, high))
    }

    // ========================================================================
    // Date / Time
    // ========================================================================

    /// Whole days since the Unix epoch.
    pub fn make_date(value: NaiveDate) -> Result<Self> {
        let days = value.signed_duration_since(unix_epoch_date()).num_days();
        let days = u32::try_from(days)
            .map_err(|_| Error::Argument(format!("Date {} is outside the Date range", value)))?;
        Ok(primitive(PrimitiveTypeId::Date, ValueKind::Uint32(days)))
    }

    /// Whole seconds since the Unix epoch; sub-second precision is truncated.
    pub fn make_datetime(value: DateTime<Utc>) -> Result<Self> {
        let seconds = u32::try_from(value.timestamp())
            .map_err(|_| Error::Argument(format!("Datetime {} is outside the Datetime range", value)))?;
        Ok(primitive(PrimitiveTypeId::Datetime, ValueKind::Uint32(seconds)))
    }

    /// Microseconds since the Unix epoch; sub-microsecond precision is truncated.
    pub fn make_timestamp(value: DateTime<Utc>) -> Result<Self> {
        let micros = u64::try_from(value.timestamp_micros())
            .map_err(|_| Error::Argument(format!("Timestamp {} is outside the Timestamp range", value)))?;
        Ok(primitive(PrimitiveTypeId::Timestamp, ValueKind::Uint64(micros)))
    }

    /// Signed microseconds; sub-microsecond precision is truncated toward zero.
    pub fn make_interval(value: chrono::Duration) -> Result<Self> {
        let micros = value
            .num_microseconds()
            .ok_or_else(|| Error::Argument(format!("Interval {} overflows microseconds", value)))?;
        Ok(primitive(PrimitiveTypeId::Interval, ValueKind::Int64(micros)))
    }

    // ========================================================================
    // Decimal
    // ========================================================================

    /// Decimal with the default (22, 9) precision and scale.
    pub fn make_decimal(value: Decimal) -> Result<Self> {
        Self::make_decimal_with_precision(value, Some(DEFAULT_PRECISION), Some(DEFAULT_SCALE))
    }

    /// Decimal with explicit precision and scale; `None` uses the value's own.
    pub fn make_decimal_with_precision(
        value: Decimal,
        precision: Option<u32>,
        scale: Option<u32>,
    ) -> Result<Self> {
        let (ty, payload) = decimal::encode(value, precision, scale)?;
        Ok(Self::new_unchecked(ty, payload))
    }

    // ========================================================================
    // Optional
    // ========================================================================

    /// Wrap a value into `Optional`.
    ///
    /// Wrapping an optional adds one nested-value indirection to the payload so that
    /// a null at each level stays distinguishable.
    pub fn make_optional(value: YdbValue) -> Self {
        let (ty, payload) = value.into_parts();
        let payload = if ty.is_optional() {
            Value::nested(payload)
        } else {
            payload
        };
        Self::new_unchecked(Type::optional(ty), payload)
    }

    /// Empty `Optional<item>`.
    ///
    /// Any well-formed item type is accepted, including containers and nested
    /// optionals; a decimal item must have valid precision and scale.
    pub fn make_optional_null(item: Type) -> Result<Self> {
        item.check()?;
        Ok(Self::null_of(item))
    }

    fn null_of(item: Type) -> Self {
        Self::new_unchecked(Type::optional(item), Value::null())
    }

    optional_constructors! {
        make_optional_bool => make_bool(bool), PrimitiveTypeId::Bool;
        make_optional_int8 => make_int8(i8), PrimitiveTypeId::Int8;
        make_optional_uint8 => make_uint8(u8), PrimitiveTypeId::Uint8;
        make_optional_int16 => make_int16(i16), PrimitiveTypeId::Int16;
        make_optional_uint16 => make_uint16(u16), PrimitiveTypeId::Uint16;
        make_optional_int32 => make_int32(i32), PrimitiveTypeId::Int32;
        make_optional_uint32 => make_uint32(u32), PrimitiveTypeId::Uint32;
        make_optional_int64 => make_int64(i64), PrimitiveTypeId::Int64;
        make_optional_uint64 => make_uint64(u64), PrimitiveTypeId::Uint64;
        make_optional_float => make_float(f32), PrimitiveTypeId::Float;
        make_optional_double => make_double(f64), PrimitiveTypeId::Double;
        make_optional_string => make_string(Vec<u8>), PrimitiveTypeId::String;
        make_optional_utf8 => make_utf8(String), PrimitiveTypeId::Utf8;
        make_optional_yson => make_yson(Vec<u8>), PrimitiveTypeId::Yson;
        make_optional_json => make_json(String), PrimitiveTypeId::Json;
        make_optional_json_document => make_json_document(String), PrimitiveTypeId::JsonDocument;
        make_optional_uuid => make_uuid(Uuid), PrimitiveTypeId::Uuid;
    }

    pub fn make_optional_date(value: Option<NaiveDate>) -> Result<Self> {
        match value {
            Some(v) => Ok(Self::make_optional(Self::make_date(v)?)),
            None => Ok(Self::null_of(Type::Primitive(PrimitiveTypeId::Date))),
        }
    }

    pub fn make_optional_datetime(value: Option<DateTime<Utc>>) -> Result<Self> {
        match value {
            Some(v) => Ok(Self::make_optional(Self::make_datetime(v)?)),
            None => Ok(Self::null_of(Type::Primitive(PrimitiveTypeId::Datetime))),
        }
    }

    pub fn make_optional_timestamp(value: Option<DateTime<Utc>>) -> Result<Self> {
        match value {
            Some(v) => Ok(Self::make_optional(Self::make_timestamp(v)?)),
            None => Ok(Self::null_of(Type::Primitive(PrimitiveTypeId::Timestamp))),
        }
    }

    pub fn make_optional_interval(value: Option<chrono::Duration>) -> Result<Self> {
        match value {
            Some(v) => Ok(Self::make_optional(Self::make_interval(v)?)),
            None => Ok(Self::null_of(Type::Primitive(PrimitiveTypeId::Interval))),
        }
    }

    /// Optional decimal; a missing value is typed as `Decimal(22, 9)`.
    pub fn make_optional_decimal(value: Option<Decimal>) -> Result<Self> {
        match value {
            Some(v) => Ok(Self::make_optional(Self::make_decimal(v)?)),
            None => Ok(Self::null_of(Type::Decimal {
                precision: DEFAULT_PRECISION,
                scale: DEFAULT_SCALE,
            })),
        }
    }

    // ========================================================================
    // Containers
    // ========================================================================

    /// Empty list; the item type cannot be inferred from zero elements.
    ///
    /// Any well-formed item type is accepted, not only primitives.
    pub fn make_empty_list(item: Type) -> Result<Self> {
        item.check()?;
        Ok(Self::new_unchecked(Type::list(item), Value::with_items(Vec::new())))
    }

    /// Homogeneous list; the item type is taken from the items.
    pub fn make_list(values: Vec<YdbValue>) -> Result<Self> {
        let item_type = match values.first() {
            Some(first) => first.ty().clone(),
            None => {
                return Err(Error::Argument(
                    "Cannot infer item type of an empty list, use make_empty_list".to_string(),
                ))
            }
        };

        let mut items = Vec::with_capacity(values.len());
        for (index, value) in values.into_iter().enumerate() {
            let (ty, payload) = value.into_parts();
            if ty != item_type {
                return Err(Error::Argument(format!(
                    "List item {} has type {}, expected {}",
                    index, ty, item_type
                )));
            }
            items.push(payload);
        }

        Ok(Self::new_unchecked(Type::list(item_type), Value::with_items(items)))
    }

    pub fn make_tuple(values: Vec<YdbValue>) -> Self {
        let (types, items): (Vec<Type>, Vec<Value>) =
            values.into_iter().map(YdbValue::into_parts).unzip();
        Self::new_unchecked(Type::Tuple(types), Value::with_items(items))
    }

    /// Struct with members in iteration order.
    pub fn make_struct<I, K>(members: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, YdbValue)>,
        K: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut types = Vec::new();
        let mut items = Vec::new();

        for (name, value) in members {
            let name = name.into();
            if !seen.insert(name.clone()) {
                return Err(Error::Argument(format!("Duplicate struct member: {}", name)));
            }
            let (ty, payload) = value.into_parts();
            types.push(StructMember { name, ty });
            items.push(payload);
        }

        Ok(Self::new_unchecked(Type::Struct(types), Value::with_items(items)))
    }
}
