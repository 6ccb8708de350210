//! Typed event properties
//!
//! The daemon accepts an `a{sv}` map of extra properties with each `Play`
//! request (for example `media.vibra = false` or `haptic.duration = 250`).
//! Only booleans, integers and strings are meaningful to it, so values are
//! restricted to those types and keys are checked when they are inserted.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{BusError, Result};

/// A single property value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i32),
    UInt(u32),
    Str(String),
}

impl PropertyValue {
    /// Infer a value from command-line text
    ///
    /// `true`/`false` become booleans, anything that parses as `i32` becomes an
    /// integer, larger non-negative numbers become `UInt`, the rest stays a string.
    pub fn infer(text: &str) -> Self {
        match text {
            "true" => return PropertyValue::Bool(true),
            "false" => return PropertyValue::Bool(false),
            _ => {}
        }

        if let Ok(value) = text.parse::<i32>() {
            return PropertyValue::Int(value);
        }

        if let Ok(value) = text.parse::<u32>() {
            return PropertyValue::UInt(value);
        }

        PropertyValue::Str(text.to_string())
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        PropertyValue::UInt(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Str(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Str(value)
    }
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyValue::Bool(v) => write!(f, "{}", v),
            PropertyValue::Int(v) => write!(f, "{}", v),
            PropertyValue::UInt(v) => write!(f, "{}", v),
            PropertyValue::Str(v) => write!(f, "{:?}", v),
        }
    }
}

/// Ordered set of properties sent along with a `Play` request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Properties(BTreeMap<String, PropertyValue>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a property, replacing any previous value under the same key
    ///
    /// Keys must be non-empty and free of whitespace and control characters.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Result<()> {
        let key = key.into();
        validate_key(&key)?;
        self.0.insert(key, value.into());
        Ok(())
    }

    /// Builder form of [`insert`](Self::insert)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Result<Self> {
        self.insert(key, value)?;
        Ok(self)
    }

    /// Parse a `key=value` assignment and insert it
    pub fn parse_assignment(&mut self, assignment: &str) -> Result<()> {
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| BusError::InvalidPropertyKey(assignment.to_string()))?;
        self.insert(key, PropertyValue::infer(value))
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(BusError::InvalidPropertyKey(key.to_string()));
    }
    Ok(())
}
