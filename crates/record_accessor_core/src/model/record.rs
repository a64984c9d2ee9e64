//! Ordered column/value records.
//!
//! # Responsibility
//! - Carry criteria, write data, and fetched rows between callers and SQL.
//! - Bridge plain JSON objects and serde types into flat scalar records.
//!
//! # Invariants
//! - Column names are unique; re-inserting a column replaces its value in place.
//! - Column order is insertion order and drives generated SQL fragment order.
//! - Values are scalars only; nested arrays/objects are rejected on conversion.

use crate::format::format_for_storage;
use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number, Value as JsonValue};
use std::borrow::Cow;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Scalar value bound to, or read back from, a single column.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Returns the integer payload, if this value is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the text payload, if this value is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Converts a JSON scalar; returns `None` for arrays and objects.
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Null => Some(Self::Null),
            JsonValue::Bool(flag) => Some(Self::Integer(i64::from(*flag))),
            JsonValue::Number(number) => Some(number_to_value(number)),
            JsonValue::String(text) => Some(Self::Text(text.clone())),
            JsonValue::Array(_) | JsonValue::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Integer(value) => JsonValue::from(*value),
            Self::Real(value) => Number::from_f64(*value).map_or(JsonValue::Null, JsonValue::Number),
            Self::Text(value) => JsonValue::String(value.clone()),
            Self::Blob(bytes) => JsonValue::Array(bytes.iter().map(|b| JsonValue::from(*b)).collect()),
        }
    }
}

fn number_to_value(number: &Number) -> SqlValue {
    if let Some(value) = number.as_i64() {
        return SqlValue::Integer(value);
    }
    if number.is_u64() {
        // Above i64::MAX: keep the exact digits and let the store coerce.
        return SqlValue::Text(number.to_string());
    }
    number.as_f64().map_or(SqlValue::Null, SqlValue::Real)
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for SqlValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::Text(format_for_storage(&value))
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Reason an input could not be used as a flat record.
#[derive(Debug)]
pub enum RecordShapeError {
    NotAMapping,
    Empty,
    NestedValue { column: String },
    Serialize(serde_json::Error),
}

impl Display for RecordShapeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAMapping => write!(f, "expected a key/value mapping"),
            Self::Empty => write!(f, "mapping must name at least one column"),
            Self::NestedValue { column } => {
                write!(f, "column `{column}` holds a nested value; only scalars are supported")
            }
            Self::Serialize(err) => write!(f, "failed to serialize value: {err}"),
        }
    }
}

impl Error for RecordShapeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Serialize(err) => Some(err),
            _ => None,
        }
    }
}

/// Ordered mapping from column name to scalar value.
///
/// Used both as operation input (criteria, write data) and as the row type
/// returned from reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    columns: Vec<(String, SqlValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.insert(column, value);
        self
    }

    /// Sets `column`, returning the previous value when the column existed.
    ///
    /// Existing columns keep their original position.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Option<SqlValue> {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.columns.push((column, value));
                None
            }
        }
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &SqlValue> {
        self.columns.iter().map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Builds a record from a JSON object of scalars.
    ///
    /// # Errors
    /// - `NotAMapping` when `value` is not an object.
    /// - `NestedValue` when any member is an array or object.
    pub fn from_json(value: &JsonValue) -> Result<Self, RecordShapeError> {
        match value {
            JsonValue::Object(map) => Self::from_json_map(map),
            _ => Err(RecordShapeError::NotAMapping),
        }
    }

    pub fn from_json_map(map: &Map<String, JsonValue>) -> Result<Self, RecordShapeError> {
        let mut record = Self::new();
        for (column, value) in map {
            let scalar = SqlValue::from_json(value).ok_or_else(|| RecordShapeError::NestedValue {
                column: column.clone(),
            })?;
            record.insert(column.clone(), scalar);
        }
        Ok(record)
    }

    /// Builds a record from any serde type that serializes to a flat object.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, RecordShapeError> {
        let json = serde_json::to_value(value).map_err(RecordShapeError::Serialize)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.columns
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect(),
        )
    }

    /// Deserializes this record into a caller-defined row type.
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.to_json())
    }
}

impl<K: Into<String>, V: Into<SqlValue>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (column, value) in iter {
            record.insert(column, value);
        }
        record
    }
}

/// Inputs accepted wherever an operation expects a plain mapping.
pub trait AsRecord {
    /// Validates the input shape and yields a non-empty record.
    fn as_record(&self) -> Result<Cow<'_, Record>, RecordShapeError>;
}

fn non_empty(record: Cow<'_, Record>) -> Result<Cow<'_, Record>, RecordShapeError> {
    if record.is_empty() {
        return Err(RecordShapeError::Empty);
    }
    Ok(record)
}

impl AsRecord for Record {
    fn as_record(&self) -> Result<Cow<'_, Record>, RecordShapeError> {
        non_empty(Cow::Borrowed(self))
    }
}

impl AsRecord for JsonValue {
    fn as_record(&self) -> Result<Cow<'_, Record>, RecordShapeError> {
        non_empty(Cow::Owned(Record::from_json(self)?))
    }
}

impl AsRecord for Map<String, JsonValue> {
    fn as_record(&self) -> Result<Cow<'_, Record>, RecordShapeError> {
        non_empty(Cow::Owned(Record::from_json_map(self)?))
    }
}
