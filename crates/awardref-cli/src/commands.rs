// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::SystemTime;

use awardref_ingest::{DelimitedFormat, FieldRoles};
use awardref_model::{locator_to_lat_lon, DatasetKey};
use awardref_runtime::{
    read_snapshot, snapshot_path, EngineConfig, FileSource, LifecycleManager, LoadOptions,
    LoadOutcome, MappedDataset, PayloadFormat,
};
use serde_json::json;
use tracing::info;

use crate::output::{emit_line, record_json, CliError};
use crate::{LoadArgs, NearArgs};

impl LoadArgs {
    fn payload_format(&self) -> PayloadFormat {
        if self.json_records {
            return PayloadFormat::JsonRecords;
        }
        let mut format = DelimitedFormat {
            delimiter: if self.tsv { '\t' } else { self.delimiter },
            skip_lines: self.skip_lines,
            version_line: self.version_line,
            ..DelimitedFormat::default()
        };
        for (column, field) in &self.mappings {
            format = format.map_field(column.clone(), field.clone());
        }
        PayloadFormat::Delimited(format)
    }

    fn field_roles(&self) -> FieldRoles {
        FieldRoles {
            key: self.key_field.clone(),
            name: self.name_field.clone(),
            lat: Some(self.lat_field.clone()),
            lon: Some(self.lon_field.clone()),
            locator: Some(self.locator_field.clone()),
            sub_category: self.sub_category_field.clone(),
            active: self.active_field.clone(),
            ..FieldRoles::default()
        }
    }
}

pub(crate) async fn load(manager: &Arc<LifecycleManager>, args: LoadArgs) -> Result<(), CliError> {
    let key = DatasetKey::parse(&args.key).map_err(|e| CliError::usage(e.to_string()))?;
    let dataset = MappedDataset::new(
        key.clone(),
        args.name.clone().unwrap_or_else(|| key.to_string()),
        Arc::new(FileSource::new(&args.file)),
    )
    .with_format(args.payload_format())
    .with_roles(args.field_roles())
    .with_max_age_days(args.max_age_days)
    .with_chunk_size(args.chunk_size);
    manager.registry().register(Arc::new(dataset)).await;

    let mut events = manager.subscribe();
    let outcome = manager
        .load(key.as_str(), LoadOptions { force: args.force })
        .await?;
    let kind = outcome.kind();
    let (snapshot, refreshed) = match outcome {
        LoadOutcome::Cached {
            snapshot,
            refresh: Some(refresh),
        } => {
            info!(dataset = %key, "waiting for background refresh");
            let refreshed = refresh
                .await
                .map_err(|e| CliError::internal(format!("refresh task: {e}")))??;
            (snapshot, Some(refreshed))
        }
        other => (other.snapshot().clone(), None),
    };

    if args.progress {
        while let Ok(event) = events.try_recv() {
            let value =
                serde_json::to_value(&event).map_err(|e| CliError::internal(e.to_string()))?;
            emit_line(&value)?;
        }
    }
    emit_line(&json!({
        "key": key.as_str(),
        "outcome": kind,
        "snapshot": snapshot,
        "refreshed": refreshed,
    }))
}

pub(crate) async fn find(
    manager: &LifecycleManager,
    category: &str,
    key: &str,
) -> Result<(), CliError> {
    if let Some(record) = manager.find_one_by_key(category, key).await {
        emit_line(&record_json(&record))?;
    }
    Ok(())
}

pub(crate) async fn search(
    manager: &LifecycleManager,
    category: &str,
    sub_category: Option<&str>,
    text: &str,
) -> Result<(), CliError> {
    for record in manager
        .find_all_by_text(category, sub_category, text)
        .await
    {
        emit_line(&record_json(&record))?;
    }
    Ok(())
}

pub(crate) async fn near(manager: &LifecycleManager, args: NearArgs) -> Result<(), CliError> {
    let (lat, lon) = match (&args.locator, args.lat, args.lon) {
        (Some(locator), _, _) => {
            locator_to_lat_lon(locator).map_err(|e| CliError::usage(e.to_string()))?
        }
        (None, Some(lat), Some(lon)) => (lat, lon),
        _ => {
            return Err(CliError::usage(
                "near needs --locator or both --lat and --lon".to_string(),
            ))
        }
    };
    for record in manager
        .find_all_by_bounding_box(
            &args.category,
            args.sub_category.as_deref(),
            lat,
            lon,
            args.delta,
        )
        .await
    {
        emit_line(&record_json(&record))?;
    }
    Ok(())
}

/// Lists persisted snapshots. Status is read from disk so it works without
/// loading anything.
pub(crate) fn status(config: &EngineConfig, key: Option<&str>) -> Result<(), CliError> {
    let dir = config.snapshot_dir();
    let keys = match key {
        Some(key) => vec![key.to_string()],
        None => snapshot_keys(&dir)?,
    };
    let now = SystemTime::now();
    for key in keys {
        match read_snapshot(&snapshot_path(&dir, &key)).map_err(|e| CliError::internal(e.0))? {
            Some((snapshot, modified)) => {
                let age_seconds = now.duration_since(modified).map_or(0, |d| d.as_secs());
                emit_line(&json!({
                    "key": snapshot.key,
                    "name": snapshot.name,
                    "version": snapshot.version,
                    "count": snapshot.count,
                    "refreshed_at": snapshot.refreshed_at,
                    "age_seconds": age_seconds,
                }))?;
            }
            None => emit_line(&json!({ "key": key, "snapshot": null }))?,
        }
    }
    Ok(())
}

fn snapshot_keys(dir: &std::path::Path) -> Result<Vec<String>, CliError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(CliError::internal(format!("{}: {e}", dir.display()))),
    };
    let mut keys: Vec<String> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            name.strip_suffix(".json")
                .filter(|stem| !stem.starts_with('.'))
                .map(ToString::to_string)
        })
        .collect();
    keys.sort();
    Ok(keys)
}
