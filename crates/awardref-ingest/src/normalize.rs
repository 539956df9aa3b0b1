// SPDX-License-Identifier: Apache-2.0

use awardref_core::ProcessError;
use awardref_model::{lat_lon_to_locator, locator_to_lat_lon, LocatorPrecision, RecordDraft};

use crate::job::RecordNormalizer;
use crate::payload::RawRecord;

/// Column-driven normalizer for sources whose rows map directly onto lookup
/// records. Position comes from lat/lon columns, or from a grid locator
/// column when coordinates are absent; a missing locator is derived from the
/// coordinates and stored in the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRoles {
    pub key: String,
    pub name: String,
    pub lat: Option<String>,
    pub lon: Option<String>,
    pub locator: Option<String>,
    pub sub_category: Option<String>,
    /// Rows whose value in this column is one of `inactive_values` are stored inactive.
    pub active: Option<String>,
    pub inactive_values: Vec<String>,
}

impl Default for FieldRoles {
    fn default() -> Self {
        Self {
            key: "ref".to_string(),
            name: "name".to_string(),
            lat: Some("lat".to_string()),
            lon: Some("lon".to_string()),
            locator: Some("grid".to_string()),
            sub_category: None,
            active: None,
            inactive_values: vec!["0".to_string(), "false".to_string(), "inactive".to_string()],
        }
    }
}

impl FieldRoles {
    fn position(&self, raw: &RawRecord) -> Result<Option<(f64, f64)>, ProcessError> {
        let lat = match &self.lat {
            Some(col) => raw.parse_f64(col)?,
            None => None,
        };
        let lon = match &self.lon {
            Some(col) => raw.parse_f64(col)?,
            None => None,
        };
        if let (Some(lat), Some(lon)) = (lat, lon) {
            if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
                return Err(ProcessError(format!("position out of range: {lat},{lon}")));
            }
            return Ok(Some((lat, lon)));
        }
        let locator = self.locator.as_deref().and_then(|col| raw.get(col));
        match locator {
            Some(loc) => locator_to_lat_lon(loc)
                .map(Some)
                .map_err(|e| ProcessError(e.to_string())),
            None => Ok(None),
        }
    }
}

impl RecordNormalizer for FieldRoles {
    fn normalize(&self, raw: &RawRecord) -> Result<Option<RecordDraft>, ProcessError> {
        let Some(key) = raw.get(&self.key) else {
            return Ok(None);
        };
        let name = raw.get(&self.name).unwrap_or(key);
        let mut draft = RecordDraft::new(key, name);
        let position = self.position(raw)?;

        let mut payload = raw.clone();
        if let (Some(col), Some((lat, lon))) = (&self.locator, position) {
            if raw.get(col).is_none() {
                let loc = lat_lon_to_locator(lat, lon, LocatorPrecision::Subsquare)
                    .map_err(|e| ProcessError(e.to_string()))?;
                payload.insert(col.clone(), loc);
            }
        }
        if let Some((lat, lon)) = position {
            draft = draft.with_position(lat, lon);
        }
        if let Some(sub) = self.sub_category.as_deref().and_then(|col| raw.get(col)) {
            draft = draft.with_sub_category(sub);
        }
        if let Some(flag) = self.active.as_deref().and_then(|col| raw.get(col)) {
            let flag = flag.trim().to_ascii_lowercase();
            draft.active = !self.inactive_values.iter().any(|v| v == &flag);
        }
        Ok(Some(draft.with_payload(payload.to_payload_json()?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_locator_from_coordinates() {
        let raw = RawRecord::from_pairs([
            ("ref", "K-0001"),
            ("name", "Acadia"),
            ("lat", "41.714775"),
            ("lon", "-72.727260"),
        ]);
        let draft = FieldRoles::default()
            .normalize(&raw)
            .expect("normalize")
            .expect("row");
        assert_eq!(draft.lat, Some(41.714775));
        let payload: serde_json::Value = serde_json::from_str(&draft.payload).expect("json");
        assert_eq!(payload["grid"], "FN31pr");
    }

    #[test]
    fn derives_coordinates_from_locator() {
        let raw = RawRecord::from_pairs([("ref", "LH-0001"), ("grid", "IO80")]);
        let draft = FieldRoles::default()
            .normalize(&raw)
            .expect("normalize")
            .expect("row");
        assert_eq!(draft.name, "LH-0001");
        assert_eq!(draft.lat, Some(50.5));
        assert_eq!(draft.lon, Some(-3.0));
    }

    #[test]
    fn rows_without_key_are_skipped_and_bad_numbers_fail() {
        let roles = FieldRoles::default();
        let blank = RawRecord::from_pairs([("ref", ""), ("name", "nameless")]);
        assert_eq!(roles.normalize(&blank).expect("skip"), None);
        let bad = RawRecord::from_pairs([("ref", "X"), ("lat", "north"), ("lon", "1")]);
        assert!(roles.normalize(&bad).is_err());
    }

    #[test]
    fn active_column_marks_rows_inactive() {
        let roles = FieldRoles {
            active: Some("status".to_string()),
            sub_category: Some("region".to_string()),
            ..FieldRoles::default()
        };
        let raw = RawRecord::from_pairs([
            ("ref", "SP-0001"),
            ("status", "Inactive"),
            ("region", "LU"),
        ]);
        let draft = roles.normalize(&raw).expect("normalize").expect("row");
        assert!(!draft.active);
        assert_eq!(draft.sub_category.as_deref(), Some("LU"));
    }
}
