//! Opaque clinic records.
//!
//! The sync routines never look inside a record beyond its `id`. A record is
//! therefore just a JSON object; these helpers handle the id conventions.

use serde_json::{Map, Number, Value};

use crate::store::Document;

/// A single entity: a JSON object carrying an `id` plus opaque fields.
pub type Record = Map<String, Value>;

/// Name of the identifier field.
pub const ID_FIELD: &str = "id";

/// The storage key for a record, if it has a usable id.
///
/// String ids are used as-is and numeric ids are rendered in decimal, so a
/// record exported with `"id": 1` (or `1.0`, or `1e3` for `"1000"`) lands
/// under the key `"1"`. Missing, null and non-scalar ids yield `None`.
#[must_use]
pub fn record_id(record: &Record) -> Option<String> {
    id_string(record.get(ID_FIELD)?)
}

/// Render a scalar JSON id as its storage key.
#[must_use]
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(number_key(n)),
        _ => None,
    }
}

/// Largest integer an `f64` holds exactly.
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

/// Decimal key for a number; whole floats lose their fractional `.0`.
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn number_key(n: &Number) -> String {
    if n.is_f64() {
        if let Some(f) = n.as_f64() {
            if f.fract() == 0.0 && f.abs() <= MAX_EXACT_FLOAT {
                return (f as i64).to_string();
            }
        }
    }
    n.to_string()
}

/// The payload to write for a record: every field except `id`.
#[must_use]
pub fn payload(record: &Record) -> Map<String, Value> {
    record
        .iter()
        .filter(|(key, _)| key.as_str() != ID_FIELD)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Turn a stored document back into a record, restoring its `id` field.
#[must_use]
pub fn from_document(document: Document) -> Record {
    let mut record = document.fields;
    record.insert(ID_FIELD.to_string(), Value::String(document.id));
    record
}

/// Copy of `record` with its id converted to a string (if it has one).
#[must_use]
pub fn with_string_id(record: &Record) -> Record {
    let mut clone = record.clone();
    if let Some(id) = record_id(record) {
        clone.insert(ID_FIELD.to_string(), Value::String(id));
    }
    clone
}
