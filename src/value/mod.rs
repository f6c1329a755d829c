//! Typed value system.
//!
//! - `types`: wire type descriptors and payloads
//! - `decimal`: native decimal and its 128-bit encoding
//! - `builder`: `YdbValue::make_*` constructors
//! - `parser`: `YdbValue::get_*` accessors
//! - `codec`: compact binary encoding of (type, payload) pairs
//! - `result_set`: decoded query result sets

pub mod builder;
pub mod codec;
pub mod decimal;
pub mod parser;
pub mod result_set;
pub mod types;


use std::collections::BTreeMap;

use crate::error::Result;

pub use decimal::Decimal;
pub use result_set::{Column, ResultSet, Row};
pub use types::{PrimitiveTypeId, StructMember, Type, Value, ValueKind};

/// Named query parameters (`$name` -> value).
pub type Params = BTreeMap<String, YdbValue>;

/// Immutable (type, payload) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct YdbValue {
    ty: Type,
    value: Value,
}

impl YdbValue {
    /// Build a value from raw parts, checking that the payload matches the type.
    pub fn from_parts(ty: Type, value: Value) -> Result<Self> {
        ty.validate(&value)?;
        Ok(Self { ty, value })
    }

    /// Internal constructor for parts already known to match.
    pub(crate) fn new_unchecked(ty: Type, value: Value) -> Self {
        Self { ty, value }
    }

    #[inline]
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    #[inline]
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_parts(self) -> (Type, Value) {
        (self.ty, self.value)
    }
}
