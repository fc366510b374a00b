//! Tolerant field extraction from loosely structured JSON objects.
//!
//! Callers of the opaque geometry operations may send any field set. Each
//! field is extracted on its own: a missing or mistyped field leaves the
//! destination untouched and records a diagnostic, it never fails the call.

use serde_json::{Map, Number, Value};
use tracing::{debug, info};

/// Tracing target for extraction diagnostics.
pub(crate) const LOOSE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::loose");

/// Untyped field-name to value mapping supplied by a caller.
pub type LooseObject = Map<String, Value>;

/// Tagged view over a single field of a [`LooseObject`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    /// JSON number.
    Number(&'a Number),
    /// JSON string.
    String(&'a str),
    /// JSON boolean.
    Boolean(bool),
    /// Field missing or explicitly `null`.
    Empty,
    /// Arrays and nested objects.
    Other,
}

impl<'a> FieldValue<'a> {
    /// Looks up `field` in `object`.
    #[must_use]
    pub fn lookup(object: &'a LooseObject, field: &str) -> Self {
        match object.get(field) {
            None | Some(Value::Null) => Self::Empty,
            Some(Value::Number(number)) => Self::Number(number),
            Some(Value::String(text)) => Self::String(text),
            Some(Value::Bool(flag)) => Self::Boolean(*flag),
            Some(Value::Array(_) | Value::Object(_)) => Self::Other,
        }
    }

    /// Short name of the value kind, used in diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Boolean(_) => "boolean",
            Self::Empty => "empty",
            Self::Other => "other",
        }
    }
}

/// Outcome of extracting one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction {
    /// The field was present with the expected type and was assigned.
    Present,
    /// The field was missing or `null`.
    Absent,
    /// The field was present with another type, or out of range.
    WrongType,
}

impl Extraction {
    /// Returns true when the destination was assigned.
    #[must_use]
    pub const fn is_present(self) -> bool {
        matches!(self, Self::Present)
    }

    /// Returns true when the field was missing.
    #[must_use]
    pub const fn is_absent(self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Returns true when the field had an unusable value.
    #[must_use]
    pub const fn is_wrong_type(self) -> bool {
        matches!(self, Self::WrongType)
    }
}

/// Reads `field` as an integer.
///
/// Fractional numbers are truncated toward zero.
#[must_use]
pub fn number(object: &LooseObject, field: &str) -> (Option<i64>, Extraction) {
    match FieldValue::lookup(object, field) {
        FieldValue::Number(number) => match integral(number) {
            Some(value) => (Some(value), Extraction::Present),
            None => (None, wrong_type(field, "number", "out of range")),
        },
        FieldValue::Empty => (None, absent(field)),
        other => (None, wrong_type(field, "number", other.kind())),
    }
}

/// Assigns `field` to `destination` when it is a number representable as `T`.
pub fn extract_number<T>(object: &LooseObject, field: &str, destination: &mut T) -> Extraction
where
    T: TryFrom<i64>,
{
    match number(object, field) {
        (Some(value), _) => match T::try_from(value) {
            Ok(converted) => {
                *destination = converted;
                Extraction::Present
            }
            Err(_) => wrong_type(field, "number", "out of range"),
        },
        (None, outcome) => outcome,
    }
}

/// Like [`extract_number`], marking the destination as set on success.
pub fn extract_optional<T>(object: &LooseObject, field: &str, destination: &mut Option<T>) -> Extraction
where
    T: TryFrom<i64>,
{
    match number(object, field) {
        (Some(value), _) => match T::try_from(value) {
            Ok(converted) => {
                *destination = Some(converted);
                Extraction::Present
            }
            Err(_) => wrong_type(field, "number", "out of range"),
        },
        (None, outcome) => outcome,
    }
}

/// Assigns `field` to `destination` when it is a string.
pub fn extract_string(object: &LooseObject, field: &str, destination: &mut String) -> Extraction {
    match FieldValue::lookup(object, field) {
        FieldValue::String(text) => {
            text.clone_into(destination);
            Extraction::Present
        }
        FieldValue::Empty => absent(field),
        other => wrong_type(field, "string", other.kind()),
    }
}

/// Assigns `field` to `destination` when it is a boolean.
pub fn extract_bool(object: &LooseObject, field: &str, destination: &mut bool) -> Extraction {
    match FieldValue::lookup(object, field) {
        FieldValue::Boolean(flag) => {
            *destination = flag;
            Extraction::Present
        }
        FieldValue::Empty => absent(field),
        other => wrong_type(field, "boolean", other.kind()),
    }
}

fn integral(number: &Number) -> Option<i64> {
    if let Some(value) = number.as_i64() {
        return Some(value);
    }
    if number.is_u64() {
        return None;
    }
    let truncated = number.as_f64()?.trunc();
    format!("{truncated:.0}").parse().ok()
}

fn absent(field: &str) -> Extraction {
    debug!(target: LOOSE_TARGET, field, "field is not available");
    Extraction::Absent
}

fn wrong_type(field: &str, expected: &'static str, found: &'static str) -> Extraction {
    info!(
        target: LOOSE_TARGET,
        field,
        expected,
        found,
        "field is not defined as the expected type"
    );
    Extraction::WrongType
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn object(value: Value) -> LooseObject {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn string_in_number_field_is_wrong_type() {
        let mut destination = 42_i64;
        let outcome = extract_number(&object(json!({"x": "abc"})), "x", &mut destination);
        assert!(!outcome.is_absent());
        assert!(outcome.is_wrong_type());
        assert_eq!(destination, 42);
    }

    #[test]
    fn missing_field_is_absent() {
        let mut destination = 42_i64;
        let outcome = extract_number(&object(json!({})), "x", &mut destination);
        assert!(outcome.is_absent());
        assert_eq!(destination, 42);
    }

    #[rstest]
    #[case::integer(json!({"x": 12}), Some(12), Extraction::Present)]
    #[case::negative(json!({"x": -7}), Some(-7), Extraction::Present)]
    #[case::fraction(json!({"x": 3.9}), Some(3), Extraction::Present)]
    #[case::null(json!({"x": null}), None, Extraction::Absent)]
    #[case::boolean(json!({"x": true}), None, Extraction::WrongType)]
    #[case::array(json!({"x": [1]}), None, Extraction::WrongType)]
    #[case::huge(json!({"x": 1.0e30}), None, Extraction::WrongType)]
    #[case::negative_fraction(json!({"x": -2.7}), Some(-2), Extraction::Present)]
    #[case::unsigned_overflow(json!({"x": u64::MAX}), None, Extraction::WrongType)]
    #[case::float_overflow(json!({"x": 9.3e18}), None, Extraction::WrongType)]
    #[case::float_underflow(json!({"x": -9.3e18}), None, Extraction::WrongType)]
    fn number_reports_tri_state(
        #[case] input: Value,
        #[case] value: Option<i64>,
        #[case] outcome: Extraction,
    ) {
        assert_eq!(number(&object(input), "x"), (value, outcome));
    }

    #[test]
    fn out_of_range_for_target_leaves_destination() {
        let mut destination = 3_u32;
        let outcome = extract_number(&object(json!({"width": -5})), "width", &mut destination);
        assert!(outcome.is_wrong_type());
        assert_eq!(destination, 3);
    }

    #[test]
    fn one_bad_field_does_not_stop_the_rest() {
        let input = object(json!({"x": "left", "y": 8, "label": "ok", "utc": false}));
        let mut x = 1_i32;
        let mut y = 1_i32;
        let mut label = String::new();
        let mut utc = true;
        assert!(extract_number(&input, "x", &mut x).is_wrong_type());
        assert!(extract_number(&input, "y", &mut y).is_present());
        assert!(extract_string(&input, "label", &mut label).is_present());
        assert!(extract_bool(&input, "utc", &mut utc).is_present());
        assert_eq!((x, y, label.as_str(), utc), (1, 8, "ok", false));
    }
}
