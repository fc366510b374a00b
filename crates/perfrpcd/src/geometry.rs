//! Shared window geometry with partial-update semantics.
//!
//! The store holds a single [`Rectangle`] for the lifetime of the daemon.
//! Writers supply a [`GeometryUpdate`] naming only the fields they want to
//! change; omitted fields keep their previous value. Every `set` runs under one
//! lock, so two concurrent updates never interleave field by field.

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::loose::{self, LooseObject};

/// Window rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rectangle {
    /// Horizontal origin.
    pub x: i32,
    /// Vertical origin.
    pub y: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Rectangle {
    /// Renders the rectangle as an untyped JSON object.
    #[must_use]
    pub fn to_object(&self) -> LooseObject {
        let mut object = Map::new();
        object.insert("x".to_owned(), Value::from(self.x));
        object.insert("y".to_owned(), Value::from(self.y));
        object.insert("width".to_owned(), Value::from(self.width));
        object.insert("height".to_owned(), Value::from(self.height));
        object
    }
}

/// Partial rectangle; `None` marks a field the caller did not set.
///
/// Deserialising goes through [`GeometryUpdate::from_loose`], so a mistyped
/// field is skipped with a diagnostic instead of rejecting the whole update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeometryUpdate {
    /// New horizontal origin.
    pub x: Option<i32>,
    /// New vertical origin.
    pub y: Option<i32>,
    /// New width.
    pub width: Option<u32>,
    /// New height.
    pub height: Option<u32>,
}

impl GeometryUpdate {
    /// Collects the numeric fields present in a loose object.
    ///
    /// Fields that are absent or not numeric stay unset; the extractor records
    /// a diagnostic for the mistyped ones.
    #[must_use]
    pub fn from_loose(object: &LooseObject) -> Self {
        let mut update = Self::default();
        loose::extract_optional(object, "x", &mut update.x);
        loose::extract_optional(object, "y", &mut update.y);
        loose::extract_optional(object, "width", &mut update.width);
        loose::extract_optional(object, "height", &mut update.height);
        update
    }

    /// Returns true when no field was supplied.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.x.is_none() && self.y.is_none() && self.width.is_none() && self.height.is_none()
    }

    fn apply_to(&self, rectangle: &mut Rectangle) {
        if let Some(x) = self.x {
            rectangle.x = x;
        }
        if let Some(y) = self.y {
            rectangle.y = y;
        }
        if let Some(width) = self.width {
            rectangle.width = width;
        }
        if let Some(height) = self.height {
            rectangle.height = height;
        }
    }
}

impl<'de> Deserialize<'de> for GeometryUpdate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        LooseObject::deserialize(deserializer).map(|object| Self::from_loose(&object))
    }
}

/// Mutable rectangle shared by every connection.
#[derive(Debug, Default)]
pub struct GeometryStore {
    current: Mutex<Rectangle>,
}

impl GeometryStore {
    /// Creates a store holding the zero rectangle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a partial update.
    pub fn set(&self, update: &GeometryUpdate) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        update.apply_to(&mut current);
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn get(&self) -> Rectangle {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies a partial update and returns the snapshot it replaced.
    pub fn swap(&self, update: &GeometryUpdate) -> Rectangle {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = *current;
        update.apply_to(&mut current);
        previous
    }
}
