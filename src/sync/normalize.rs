//! Consultation cleanup applied before a restore.
//!
//! Older backups carry consultations with numeric ids and dates in whatever
//! shape the client of the day produced. Normalization stringifies the ids,
//! turns every recognizable date into a `{seconds, nanoseconds}` timestamp
//! object and fills in missing patient names from the patient list.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{json, Value};

use crate::model::record::id_string;
use crate::model::Record;

/// Patient fields consulted, in order, for a display name.
const NAME_FIELDS: [&str; 6] = [
    "name",
    "patientName",
    "fullName",
    "displayName",
    "chineseName",
    "englishName",
];

/// Whether a value counts as absent: null, `false`, `0`, or an empty string.
fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null | Value::Bool(false)) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Number(n)) => n.as_f64() == Some(0.0),
        Some(_) => false,
    }
}

/// Interpret a stored date in any of the shapes backups contain.
///
/// Accepts timestamp objects with `seconds` (and optional `nanoseconds`),
/// RFC 3339 strings, plain `YYYY-MM-DD` dates, naive date-times, and epoch
/// milliseconds. Returns `None` for anything else.
#[must_use]
pub fn parse_backup_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Object(map) => {
            let seconds = map.get("seconds")?.as_f64()?;
            let nanos = map
                .get("nanoseconds")
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0);
            #[allow(clippy::cast_possible_truncation)]
            let seconds = seconds.trunc() as i64;
            Utc.timestamp_opt(seconds, nanos).single()
        }
        Value::String(s) => parse_date_str(s.trim()),
        Value::Number(n) => {
            #[allow(clippy::cast_possible_truncation)]
            let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            Utc.timestamp_millis_opt(millis).single()
        }
        _ => None,
    }
}

fn parse_date_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// A timestamp object for `at`.
#[must_use]
pub fn timestamp_value(at: DateTime<Utc>) -> Value {
    json!({
        "seconds": at.timestamp(),
        "nanoseconds": at.timestamp_subsec_nanos(),
    })
}

/// Normalize one consultation in place.
///
/// `date` is taken from the first non-blank of `date`, `createdAt` and
/// `updatedAt`; if that value cannot be parsed the epoch is used.
/// `createdAt` and `updatedAt` are converted only when they parse.
pub fn normalize_consultation(record: &mut Record) {
    for key in ["id", "patientId"] {
        if let Some(id) = record.get(key).and_then(id_string) {
            record.insert(key.to_string(), Value::String(id));
        }
    }

    let source = ["date", "createdAt", "updatedAt"]
        .into_iter()
        .find_map(|key| record.get(key).filter(|v| !is_blank(Some(*v))));
    let date = source
        .and_then(parse_backup_date)
        .unwrap_or(DateTime::UNIX_EPOCH);
    record.insert("date".to_string(), timestamp_value(date));

    for key in ["createdAt", "updatedAt"] {
        if is_blank(record.get(key)) {
            continue;
        }
        if let Some(at) = record.get(key).and_then(parse_backup_date) {
            record.insert(key.to_string(), timestamp_value(at));
        }
    }
}

/// Map of patient id to display name.
fn patient_names(patients: &[Record]) -> HashMap<String, String> {
    patients
        .iter()
        .filter_map(|patient| {
            let id = patient.get("id").and_then(id_string)?;
            let name = NAME_FIELDS
                .iter()
                .filter_map(|field| patient.get(*field).and_then(Value::as_str))
                .find(|name| !name.is_empty())?;
            Some((id.trim().to_string(), name.to_string()))
        })
        .collect()
}

/// Fill a missing or blank `patientName` from the patient list.
pub fn enrich_patient_names(consultations: &mut [Record], patients: &[Record]) {
    let names = patient_names(patients);
    if names.is_empty() {
        return;
    }

    for consultation in consultations {
        let Some(patient_id) = consultation.get("patientId").and_then(id_string) else {
            continue;
        };
        let has_name = consultation
            .get("patientName")
            .is_some_and(|v| match v {
                Value::String(s) => !s.trim().is_empty(),
                other => !is_blank(Some(other)),
            });
        if has_name {
            continue;
        }
        if let Some(name) = names.get(patient_id.trim()) {
            consultation.insert("patientName".to_string(), Value::String(name.clone()));
        }
    }
}

/// Normalize every consultation, then enrich names from `patients`.
pub fn prepare_consultations(consultations: &mut [Record], patients: &[Record]) {
    for consultation in consultations.iter_mut() {
        normalize_consultation(consultation);
    }
    enrich_patient_names(consultations, patients);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_parse_backup_date_shapes() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

        assert_eq!(
            parse_backup_date(&json!({"seconds": 1_704_164_645, "nanoseconds": 0})),
            Some(expected)
        );
        assert_eq!(parse_backup_date(&json!("2024-01-02T03:04:05Z")), Some(expected));
        assert_eq!(parse_backup_date(&json!("2024-01-02T03:04:05")), Some(expected));
        assert_eq!(parse_backup_date(&json!(1_704_164_645_000_i64)), Some(expected));
        assert_eq!(
            parse_backup_date(&json!("2024-01-02")),
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_backup_date(&json!("not a date")), None);
        assert_eq!(parse_backup_date(&json!([1, 2])), None);
    }

    #[test]
    fn test_normalize_stringifies_ids_and_dates() {
        let mut c = record(json!({
            "id": 12,
            "patientId": 7,
            "createdAt": "2024-01-02T03:04:05Z"
        }));
        normalize_consultation(&mut c);

        assert_eq!(c["id"], "12");
        assert_eq!(c["patientId"], "7");
        assert_eq!(c["date"], json!({"seconds": 1_704_164_645, "nanoseconds": 0}));
        assert_eq!(c["createdAt"], c["date"]);
    }

    #[test]
    fn test_normalize_falls_back_to_epoch() {
        let mut c = record(json!({"id": "1", "date": "garbage", "updatedAt": "also garbage"}));
        normalize_consultation(&mut c);

        assert_eq!(c["date"], json!({"seconds": 0, "nanoseconds": 0}));
        assert_eq!(c["updatedAt"], "also garbage");
    }

    #[test]
    fn test_enrich_fills_blank_names_only() {
        let patients = vec![
            record(json!({"id": 1, "name": "", "chineseName": "陳大文"})),
            record(json!({"id": "2", "name": "Lee"})),
        ];
        let mut consultations = vec![
            record(json!({"patientId": "1"})),
            record(json!({"patientId": 2, "patientName": "  "})),
            record(json!({"patientId": "2", "patientName": "Kept"})),
            record(json!({"patientId": "3"})),
        ];

        enrich_patient_names(&mut consultations, &patients);

        assert_eq!(consultations[0]["patientName"], "陳大文");
        assert_eq!(consultations[1]["patientName"], "Lee");
        assert_eq!(consultations[2]["patientName"], "Kept");
        assert!(consultations[3].get("patientName").is_none());
    }
}
