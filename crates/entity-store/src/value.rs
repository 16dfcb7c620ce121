//! Identifiers and scalar attribute values
//!
//! Every stored entity is keyed by an [`EntityId`]. Scalar fields travel as
//! [`AttributeValue`], a closed set of variants so that a kind mismatch is a
//! checked `None` rather than a failed dynamic cast.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// Globally unique, stable identity of an entity instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Generate a new random EntityId
    pub fn new() -> Self {
        EntityId(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        EntityId(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for EntityId {
    fn from(uuid: Uuid) -> Self {
        EntityId(uuid)
    }
}

impl FromStr for EntityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(EntityId)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// AttributeValue
// ---------------------------------------------------------------------------

/// Discriminant of an [`AttributeValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    String,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Id,
    Bytes,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::String => "string",
            ValueKind::Integer => "integer",
            ValueKind::Float => "float",
            ValueKind::Boolean => "boolean",
            ValueKind::Timestamp => "timestamp",
            ValueKind::Id => "id",
            ValueKind::Bytes => "bytes",
        };
        f.write_str(name)
    }
}

/// A scalar attribute value.
///
/// Serialized with an explicit `kind` tag so that a store round-trips the
/// variant (an `Id` never comes back as a `String`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Id(EntityId),
    /// Opaque payloads, including serde-encoded "codable" fields.
    Bytes(Vec<u8>),
}

impl AttributeValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            AttributeValue::String(_) => ValueKind::String,
            AttributeValue::Integer(_) => ValueKind::Integer,
            AttributeValue::Float(_) => ValueKind::Float,
            AttributeValue::Boolean(_) => ValueKind::Boolean,
            AttributeValue::Timestamp(_) => ValueKind::Timestamp,
            AttributeValue::Id(_) => ValueKind::Id,
            AttributeValue::Bytes(_) => ValueKind::Bytes,
        }
    }

    /// False only for a NaN or infinite `Float`.
    pub fn is_finite(&self) -> bool {
        match self {
            AttributeValue::Float(f) => f.is_finite(),
            _ => true,
        }
    }
}

// ---------------------------------------------------------------------------
// AttributeType
// ---------------------------------------------------------------------------

/// Conversion between a Rust field type and an [`AttributeValue`].
///
/// `from_value` never coerces across kinds: reading an `Integer` as a
/// `String` yields `None`.
pub trait AttributeType: Sized {
    /// The kind this type is stored as.
    const KIND: ValueKind;

    fn into_value(self) -> AttributeValue;

    fn from_value(value: &AttributeValue) -> Option<Self>;
}

impl AttributeType for String {
    const KIND: ValueKind = ValueKind::String;

    fn into_value(self) -> AttributeValue {
        AttributeValue::String(self)
    }

    fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl AttributeType for i64 {
    const KIND: ValueKind = ValueKind::Integer;

    fn into_value(self) -> AttributeValue {
        AttributeValue::Integer(self)
    }

    fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl AttributeType for i32 {
    const KIND: ValueKind = ValueKind::Integer;

    fn into_value(self) -> AttributeValue {
        AttributeValue::Integer(i64::from(self))
    }

    fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Integer(i) => i32::try_from(*i).ok(),
            _ => None,
        }
    }
}

impl AttributeType for u32 {
    const KIND: ValueKind = ValueKind::Integer;

    fn into_value(self) -> AttributeValue {
        AttributeValue::Integer(i64::from(self))
    }

    fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Integer(i) => u32::try_from(*i).ok(),
            _ => None,
        }
    }
}

impl AttributeType for f64 {
    const KIND: ValueKind = ValueKind::Float;

    fn into_value(self) -> AttributeValue {
        AttributeValue::Float(self)
    }

    fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl AttributeType for bool {
    const KIND: ValueKind = ValueKind::Boolean;

    fn into_value(self) -> AttributeValue {
        AttributeValue::Boolean(self)
    }

    fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl AttributeType for DateTime<Utc> {
    const KIND: ValueKind = ValueKind::Timestamp;

    fn into_value(self) -> AttributeValue {
        AttributeValue::Timestamp(self)
    }

    fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

impl AttributeType for EntityId {
    const KIND: ValueKind = ValueKind::Id;

    fn into_value(self) -> AttributeValue {
        AttributeValue::Id(self)
    }

    fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Id(id) => Some(*id),
            _ => None,
        }
    }
}

impl AttributeType for Uuid {
    const KIND: ValueKind = ValueKind::Id;

    fn into_value(self) -> AttributeValue {
        AttributeValue::Id(EntityId::from_uuid(self))
    }

    fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Id(id) => Some(*id.as_uuid()),
            _ => None,
        }
    }
}

impl AttributeType for Vec<u8> {
    const KIND: ValueKind = ValueKind::Bytes;

    fn into_value(self) -> AttributeValue {
        AttributeValue::Bytes(self)
    }

    fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Bytes(b) => Some(b.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_parses_its_display_form() {
        let id = EntityId::new();
        let parsed: EntityId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn entity_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<EntityId>().is_err());
    }

    #[test]
    fn from_value_does_not_coerce_between_kinds() {
        let value = AttributeValue::Integer(7);
        assert_eq!(i64::from_value(&value), Some(7));
        assert_eq!(String::from_value(&value), None);
        assert_eq!(f64::from_value(&value), None);
    }

    #[test]
    fn narrow_integers_reject_out_of_range() {
        let value = AttributeValue::Integer(i64::from(i32::MAX) + 1);
        assert_eq!(i32::from_value(&value), None);
        assert_eq!(u32::from_value(&AttributeValue::Integer(-1)), None);
    }

    #[test]
    fn uuid_and_entity_id_share_the_id_kind() {
        let id = EntityId::new();
        let value = (*id.as_uuid()).into_value();
        assert_eq!(value.kind(), ValueKind::Id);
        assert_eq!(EntityId::from_value(&value), Some(id));
    }

    #[test]
    fn attribute_value_serializes_with_kind_tag() {
        let json = serde_json::to_value(AttributeValue::Boolean(true)).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "boolean", "value": true}));

        let back: AttributeValue = serde_json::from_value(json).unwrap();
        assert_eq!(back, AttributeValue::Boolean(true));
    }
}
