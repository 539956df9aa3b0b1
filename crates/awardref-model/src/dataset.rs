// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ValidationError {}

pub const DATASET_KEY_MAX_LEN: usize = 64;

pub fn parse_dataset_key(input: &str) -> Result<DatasetKey, ValidationError> {
    DatasetKey::parse(input)
}

/// Globally unique dataset identifier, also used as the lookup category and
/// as the snapshot file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct DatasetKey(String);

impl DatasetKey {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(ValidationError("dataset key must not be empty".to_string()));
        }
        if s.len() > DATASET_KEY_MAX_LEN {
            return Err(ValidationError(format!(
                "dataset key exceeds max length {DATASET_KEY_MAX_LEN}"
            )));
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        {
            return Err(ValidationError(
                "dataset key must match [a-z0-9_-]+".to_string(),
            ));
        }
        if s.starts_with(['_', '-']) || s.ends_with(['_', '-']) {
            return Err(ValidationError(
                "dataset key must not start or end with a separator".to_string(),
            ));
        }
        Ok(Self(s.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DatasetKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for DatasetKey {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DatasetKey> for String {
    fn from(value: DatasetKey) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_program_style_keys() {
        for raw in ["pota", "sota", "wca", "sp-gminas", "wwff_2024"] {
            assert_eq!(DatasetKey::parse(raw).expect("valid").as_str(), raw);
        }
    }

    #[test]
    fn rejects_malformed_keys() {
        for raw in ["", "  ", "POTA", "../etc", "-pota", "pota_", "a b"] {
            assert!(DatasetKey::parse(raw).is_err(), "accepted {raw:?}");
        }
        assert!(DatasetKey::parse(&"x".repeat(DATASET_KEY_MAX_LEN + 1)).is_err());
    }

    #[test]
    fn serde_rejects_invalid_keys() {
        let ok: DatasetKey = serde_json::from_str("\"sota\"").expect("decode");
        assert_eq!(ok.as_str(), "sota");
        assert!(serde_json::from_str::<DatasetKey>("\"So Ta\"").is_err());
    }
}
