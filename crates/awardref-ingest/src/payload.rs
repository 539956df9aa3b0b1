// SPDX-License-Identifier: Apache-2.0

use awardref_core::ProcessError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One parsed source row: field name to raw text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    fields: BTreeMap<String, String>,
}

impl RawRecord {
    #[must_use]
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Field value, `None` when absent or blank.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn require(&self, field: &str) -> Result<&str, ProcessError> {
        self.get(field)
            .ok_or_else(|| ProcessError(format!("required field `{field}` is missing or blank")))
    }

    pub fn parse_f64(&self, field: &str) -> Result<Option<f64>, ProcessError> {
        match self.get(field) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| ProcessError(format!("field `{field}` is not a number: `{raw}`"))),
        }
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into());
    }

    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Serialized JSON object of every field, used as the opaque record payload.
    pub fn to_payload_json(&self) -> Result<String, ProcessError> {
        serde_json::to_string(&self.fields).map_err(|e| ProcessError(e.to_string()))
    }
}

/// An ordered, finite sequence of raw records plus the version the source
/// advertised, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    pub version: Option<String>,
    pub records: Vec<RawRecord>,
}

/// Parses a JSON array of flat objects, or an envelope
/// `{"version": "...", "records": [...]}`. Scalar values are kept as text;
/// nested values are kept as their JSON encoding.
pub fn parse_json_records(bytes: &[u8]) -> Result<Payload, ProcessError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| ProcessError(format!("invalid json: {e}")))?;
    let (version, items) = match value {
        Value::Array(items) => (None, items),
        Value::Object(mut envelope) => {
            let version = match envelope.remove("version") {
                Some(Value::String(v)) => Some(v),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            };
            match envelope.remove("records") {
                Some(Value::Array(items)) => (version, items),
                _ => {
                    return Err(ProcessError(
                        "json envelope must carry a `records` array".to_string(),
                    ))
                }
            }
        }
        _ => {
            return Err(ProcessError(
                "json payload must be an array of objects".to_string(),
            ))
        }
    };
    let mut records = Vec::with_capacity(items.len());
    for (idx, item) in items.into_iter().enumerate() {
        let Value::Object(map) = item else {
            return Err(ProcessError(format!("json item {idx} is not an object")));
        };
        records.push(record_from_json_object(map));
    }
    Ok(Payload { version, records })
}

fn record_from_json_object(map: Map<String, Value>) -> RawRecord {
    RawRecord::from_pairs(map.into_iter().filter_map(|(k, v)| {
        let text = match v {
            Value::Null => return None,
            Value::String(s) => s,
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            other => other.to_string(),
        };
        Some((k, text))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_fields_read_as_missing() {
        let r = RawRecord::from_pairs([("ref", "K-0001"), ("name", "  ")]);
        assert_eq!(r.get("ref"), Some("K-0001"));
        assert_eq!(r.get("name"), None);
        assert!(r.require("name").is_err());
    }

    #[test]
    fn numeric_fields_parse_or_fail_loudly() {
        let r = RawRecord::from_pairs([("lat", " 44.35 "), ("lon", "east")]);
        assert_eq!(r.parse_f64("lat").expect("lat"), Some(44.35));
        assert_eq!(r.parse_f64("missing").expect("missing"), None);
        let err = r.parse_f64("lon").expect_err("not a number");
        assert!(err.0.contains("lon"));
    }

    #[test]
    fn json_records_flatten_scalars() {
        let payload = parse_json_records(
            br#"[{"reference":"K-0001","latitude":44.35,"active":true,"notes":null}]"#,
        )
        .expect("parse");
        let r = &payload.records[0];
        assert_eq!(r.get("reference"), Some("K-0001"));
        assert_eq!(r.get("latitude"), Some("44.35"));
        assert_eq!(r.get("active"), Some("true"));
        assert_eq!(r.get("notes"), None);
    }

    #[test]
    fn json_payload_must_be_array_of_objects() {
        assert!(parse_json_records(b"{}").is_err());
        assert!(parse_json_records(b"[1]").is_err());
        assert!(parse_json_records(b"[").is_err());
    }

    #[test]
    fn json_envelope_carries_version() {
        let payload =
            parse_json_records(br#"{"version":20240501,"records":[{"ref":"K-0001"}]}"#)
                .expect("parse");
        assert_eq!(payload.version.as_deref(), Some("20240501"));
        assert_eq!(payload.records.len(), 1);
    }
}
