// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

mod filters;
mod row_decode;
mod schema;

use awardref_core::StoreError;
use awardref_model::LookupRecord;
use row_decode::{record_from_row, RECORD_COLUMNS};
use rusqlite::{params, types::Value, Connection};
use std::path::Path;
use tracing::{debug, warn};

pub use filters::{contains_pattern, escape_like, normalize_lookup};
pub use schema::SQLITE_SCHEMA_VERSION;

pub const CRATE_NAME: &str = "awardref-store";

/// The shared lookup table, partitioned by category.
///
/// Writes go through transactional primitives used by the refresh pipeline.
/// Queries only see `active` rows and never fail: a store error is logged and
/// reported as an empty result, since reference lookups are optional
/// enrichment for callers.
pub struct LookupStore {
    conn: Connection,
}

impl LookupStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError(e.to_string()))?;
        }
        let conn = Connection::open(path).map_err(|e| StoreError(e.to_string()))?;
        schema::apply_file_pragmas(&conn)?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError(e.to_string()))?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    /// Clears the sweep mark on every row of `category`. Returns rows flagged.
    pub fn begin_sweep(&mut self, category: &str) -> Result<usize, StoreError> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| StoreError(e.to_string()))?;
        let flagged = tx
            .execute(
                "UPDATE lookup_records SET sweep_mark = 0 WHERE category = ?1",
                params![category],
            )
            .map_err(|e| StoreError(e.to_string()))?;
        tx.commit().map_err(|e| StoreError(e.to_string()))?;
        debug!(category, flagged, "sweep start");
        Ok(flagged)
    }

    /// Upserts `records` in one transaction, setting their sweep mark.
    /// Nothing is written if any statement fails.
    pub fn upsert_batch(&mut self, records: &[LookupRecord]) -> Result<usize, StoreError> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| StoreError(e.to_string()))?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO lookup_records (
                       category, sub_category, key, key_normalized, name, name_normalized,
                       payload, lat, lon, active, sweep_mark
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1)
                     ON CONFLICT(category, key) DO UPDATE SET
                       sub_category = excluded.sub_category,
                       key_normalized = excluded.key_normalized,
                       name = excluded.name,
                       name_normalized = excluded.name_normalized,
                       payload = excluded.payload,
                       lat = excluded.lat,
                       lon = excluded.lon,
                       active = excluded.active,
                       sweep_mark = 1",
                )
                .map_err(|e| StoreError(e.to_string()))?;
            for r in records {
                stmt.execute(params![
                    r.category,
                    r.sub_category,
                    r.key,
                    normalize_lookup(&r.key),
                    r.name,
                    normalize_lookup(&r.name),
                    r.payload,
                    r.lat,
                    r.lon,
                    i64::from(r.active),
                ])
                .map_err(|e| StoreError(e.to_string()))?;
            }
        }
        tx.commit().map_err(|e| StoreError(e.to_string()))?;
        Ok(records.len())
    }

    /// Deletes every row of `category` whose sweep mark was not set since
    /// [`LookupStore::begin_sweep`]. Returns rows deleted.
    pub fn finish_sweep(&mut self, category: &str) -> Result<usize, StoreError> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| StoreError(e.to_string()))?;
        let deleted = tx
            .execute(
                "DELETE FROM lookup_records WHERE category = ?1 AND sweep_mark = 0",
                params![category],
            )
            .map_err(|e| StoreError(e.to_string()))?;
        tx.commit().map_err(|e| StoreError(e.to_string()))?;
        debug!(category, deleted, "sweep end");
        Ok(deleted)
    }

    pub fn delete_category(&mut self, category: &str) -> Result<usize, StoreError> {
        self.conn
            .execute(
                "DELETE FROM lookup_records WHERE category = ?1",
                params![category],
            )
            .map_err(|e| StoreError(e.to_string()))
    }

    /// Row count for `category`, including inactive rows.
    pub fn count(&self, category: &str) -> Result<u64, StoreError> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM lookup_records WHERE category = ?1",
                params![category],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as u64)
            .map_err(|e| StoreError(e.to_string()))
    }

    /// Rows of `category` still carrying a cleared sweep mark.
    pub fn unswept_count(&self, category: &str) -> Result<u64, StoreError> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM lookup_records WHERE category = ?1 AND sweep_mark = 0",
                params![category],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as u64)
            .map_err(|e| StoreError(e.to_string()))
    }

    #[must_use]
    pub fn find_one_by_key(&self, category: &str, key: &str) -> Option<LookupRecord> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM lookup_records
             WHERE category = ?1 AND key = ?2 AND active = 1 LIMIT 1"
        );
        let found = self.query_records(
            &sql,
            vec![Value::from(category.to_string()), Value::from(key.to_string())],
        );
        fail_closed("find_one_by_key", category, found).into_iter().next()
    }

    /// Case-insensitive substring match on key or name.
    #[must_use]
    pub fn find_all_by_text(
        &self,
        category: &str,
        sub_category: Option<&str>,
        substring: &str,
    ) -> Vec<LookupRecord> {
        let pattern = contains_pattern(substring);
        let mut sql = format!(
            "SELECT {RECORD_COLUMNS} FROM lookup_records
             WHERE category = ?1 AND active = 1
               AND (key_normalized LIKE ?2 ESCAPE '!' OR name_normalized LIKE ?2 ESCAPE '!')"
        );
        let mut params = vec![Value::from(category.to_string()), Value::from(pattern)];
        if let Some(sub) = sub_category {
            sql.push_str(" AND sub_category = ?3");
            params.push(Value::from(sub.to_string()));
        }
        sql.push_str(" ORDER BY key ASC");
        fail_closed("find_all_by_text", category, self.query_records(&sql, params))
    }

    /// Axis-aligned box `[lat - delta, lat + delta] x [lon - delta, lon + delta]`,
    /// inclusive. Callers rank by true distance themselves.
    #[must_use]
    pub fn find_all_by_bounding_box(
        &self,
        category: &str,
        sub_category: Option<&str>,
        lat: f64,
        lon: f64,
        delta: f64,
    ) -> Vec<LookupRecord> {
        if !lat.is_finite() || !lon.is_finite() || !delta.is_finite() || delta < 0.0 {
            warn!(category, lat, lon, delta, "rejected bounding box query");
            return Vec::new();
        }
        let (sql, params) = bounding_box_sql(category, sub_category, lat, lon, delta);
        fail_closed(
            "find_all_by_bounding_box",
            category,
            self.query_records(&sql, params),
        )
    }

    /// Query plan lines for the bounding box query, for index regression checks.
    pub fn explain_bounding_box_plan(&self) -> Result<Vec<String>, StoreError> {
        let (sql, params) = bounding_box_sql("x", None, 0.0, 0.0, 1.0);
        let mut stmt = self
            .conn
            .prepare(&format!("EXPLAIN QUERY PLAN {sql}"))
            .map_err(|e| StoreError(e.to_string()))?;
        let lines = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                row.get::<_, String>(3)
            })
            .map_err(|e| StoreError(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError(e.to_string()))?;
        Ok(lines)
    }

    fn query_records(
        &self,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<Vec<LookupRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(sql)
            .map_err(|e| StoreError(e.to_string()))?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), record_from_row)
            .map_err(|e| StoreError(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError(e.to_string()))?;
        Ok(rows)
    }
}

fn bounding_box_sql(
    category: &str,
    sub_category: Option<&str>,
    lat: f64,
    lon: f64,
    delta: f64,
) -> (String, Vec<Value>) {
    let mut sql = format!(
        "SELECT {RECORD_COLUMNS} FROM lookup_records
         WHERE category = ?1 AND active = 1
           AND lat BETWEEN ?2 AND ?3 AND lon BETWEEN ?4 AND ?5"
    );
    let mut params = vec![
        Value::from(category.to_string()),
        Value::Real(lat - delta),
        Value::Real(lat + delta),
        Value::Real(lon - delta),
        Value::Real(lon + delta),
    ];
    if let Some(sub) = sub_category {
        sql.push_str(" AND sub_category = ?6");
        params.push(Value::from(sub.to_string()));
    }
    sql.push_str(" ORDER BY key ASC");
    (sql, params)
}

fn fail_closed(
    operation: &'static str,
    category: &str,
    result: Result<Vec<LookupRecord>, StoreError>,
) -> Vec<LookupRecord> {
    match result {
        Ok(rows) => rows,
        Err(err) => {
            warn!(operation, category, error = %err, "lookup failed; returning no rows");
            Vec::new()
        }
    }
}
