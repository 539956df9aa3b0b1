// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// One row of the shared lookup table, as returned by queries.
///
/// `payload` is opaque to the store; dataset-specific fields live there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupRecord {
    pub category: String,
    pub sub_category: Option<String>,
    pub key: String,
    pub name: String,
    pub payload: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub active: bool,
}

/// A normalized record produced by a dataset normalizer before it is bound
/// to a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDraft {
    pub sub_category: Option<String>,
    pub key: String,
    pub name: String,
    pub payload: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub active: bool,
}

impl RecordDraft {
    #[must_use]
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            sub_category: None,
            key: key.into(),
            name: name.into(),
            payload: String::from("{}"),
            lat: None,
            lon: None,
            active: true,
        }
    }

    #[must_use]
    pub fn with_position(mut self, lat: f64, lon: f64) -> Self {
        self.lat = Some(lat);
        self.lon = Some(lon);
        self
    }

    #[must_use]
    pub fn with_sub_category(mut self, sub_category: impl Into<String>) -> Self {
        self.sub_category = Some(sub_category.into());
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    #[must_use]
    pub fn into_record(self, category: &str) -> LookupRecord {
        LookupRecord {
            category: category.to_string(),
            sub_category: self.sub_category,
            key: self.key,
            name: self.name,
            payload: self.payload,
            lat: self.lat,
            lon: self.lon,
            active: self.active,
        }
    }
}
