// SPDX-License-Identifier: Apache-2.0

use awardref_model::LookupRecord;

pub(crate) const RECORD_COLUMNS: &str =
    "category, sub_category, key, name, payload, lat, lon, active";

pub(crate) fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LookupRecord> {
    Ok(LookupRecord {
        category: row.get::<_, String>(0)?,
        sub_category: row.get::<_, Option<String>>(1)?,
        key: row.get::<_, String>(2)?,
        name: row.get::<_, String>(3)?,
        payload: row.get::<_, String>(4)?,
        lat: row.get::<_, Option<f64>>(5)?,
        lon: row.get::<_, Option<f64>>(6)?,
        active: row.get::<_, i64>(7)? != 0,
    })
}
