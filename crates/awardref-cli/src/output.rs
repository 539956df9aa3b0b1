// SPDX-License-Identifier: Apache-2.0

use std::io::Write as _;

use awardref_core::EngineError;
use awardref_model::LookupRecord;
use serde_json::{json, Value};

pub(crate) const EXIT_FAILURE: u8 = 1;
pub(crate) const EXIT_USAGE: u8 = 2;

#[derive(Debug)]
pub(crate) struct CliError {
    pub(crate) exit_code: u8,
    pub(crate) code: &'static str,
    pub(crate) message: String,
}

impl CliError {
    pub(crate) fn usage(message: String) -> Self {
        Self {
            exit_code: EXIT_USAGE,
            code: "usage_error",
            message,
        }
    }

    pub(crate) fn internal(message: String) -> Self {
        Self {
            exit_code: EXIT_FAILURE,
            code: "internal_error",
            message,
        }
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        Self {
            exit_code: EXIT_FAILURE,
            code: err.code().as_str(),
            message: err.to_string(),
        }
    }
}

pub(crate) fn emit_error(error: &CliError, machine_json: bool) {
    if machine_json {
        let payload = json!({ "code": error.code, "message": error.message });
        eprintln!("{payload}");
    } else {
        eprintln!("error[{}]: {}", error.code, error.message);
    }
}

/// Writes one JSON value as a line on stdout.
pub(crate) fn emit_line(value: &Value) -> Result<(), CliError> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{value}").map_err(|e| CliError::internal(format!("stdout: {e}")))
}

/// A record with its payload inlined as JSON rather than escaped text.
pub(crate) fn record_json(record: &LookupRecord) -> Value {
    let payload = serde_json::from_str::<Value>(&record.payload)
        .unwrap_or_else(|_| Value::String(record.payload.clone()));
    json!({
        "category": record.category,
        "sub_category": record.sub_category,
        "key": record.key,
        "name": record.name,
        "lat": record.lat,
        "lon": record.lon,
        "active": record.active,
        "payload": payload,
    })
}
