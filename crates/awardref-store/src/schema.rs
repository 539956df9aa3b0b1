// SPDX-License-Identifier: Apache-2.0

use awardref_core::StoreError;
use rusqlite::Connection;

pub const SQLITE_SCHEMA_VERSION: i64 = 1;

const SCHEMA_DDL: &str = "
    CREATE TABLE IF NOT EXISTS lookup_records (
      category TEXT NOT NULL,
      sub_category TEXT,
      key TEXT NOT NULL,
      key_normalized TEXT NOT NULL,
      name TEXT NOT NULL,
      name_normalized TEXT NOT NULL,
      payload TEXT NOT NULL,
      lat REAL,
      lon REAL,
      active INTEGER NOT NULL DEFAULT 1,
      sweep_mark INTEGER NOT NULL DEFAULT 1,
      PRIMARY KEY (category, key)
    );
    CREATE INDEX IF NOT EXISTS idx_lookup_records_position
      ON lookup_records(category, lat, lon);
    CREATE INDEX IF NOT EXISTS idx_lookup_records_sub_category
      ON lookup_records(category, sub_category);
";

pub(crate) fn apply_file_pragmas(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        PRAGMA temp_store=MEMORY;
        PRAGMA cache_size=-16000;
        ",
    )
    .map_err(|e| StoreError(e.to_string()))
}

pub(crate) fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let current: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| StoreError(e.to_string()))?;
    if current > SQLITE_SCHEMA_VERSION {
        return Err(StoreError(format!(
            "lookup store schema version {current} is newer than supported {SQLITE_SCHEMA_VERSION}"
        )));
    }
    conn.execute_batch(SCHEMA_DDL)
        .map_err(|e| StoreError(e.to_string()))?;
    conn.execute_batch(&format!("PRAGMA user_version={SQLITE_SCHEMA_VERSION};"))
        .map_err(|e| StoreError(e.to_string()))
}
