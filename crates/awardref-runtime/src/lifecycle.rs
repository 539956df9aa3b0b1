// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use awardref_core::{
    unix_seconds, Clock, EngineError, FetchError, NotRegistered, ProcessError, SnapshotError,
    SystemClock,
};
use awardref_ingest::{RefreshJob, RefreshOptions, Tick};
use awardref_model::{
    DatasetSnapshot, DatasetStatus, LifecycleState, LookupRecord, RefreshSummary,
};
use awardref_store::LookupStore;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

use crate::config::EngineConfig;
use crate::definition::{DatasetDefinition, DefinitionNormalizer};
use crate::events::LifecycleEvent;
use crate::registry::{DatasetRegistry, SharedStore};
use crate::retry::BackoffPolicy;
use crate::snapshot::{read_snapshot, remove_snapshot, snapshot_path, write_snapshot};

const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Fetch even when the dataset is loaded or its snapshot is fresh.
    pub force: bool,
}

impl LoadOptions {
    #[must_use]
    pub const fn forced() -> Self {
        Self { force: true }
    }
}

/// Result of [`LifecycleManager::load`].
#[derive(Debug)]
pub enum LoadOutcome {
    /// Already loaded in this process; nothing was touched.
    AlreadyLoaded(DatasetSnapshot),
    /// No usable snapshot (or forced): the dataset was downloaded and refreshed.
    Fetched(DatasetSnapshot),
    /// Loaded from the local snapshot. When the snapshot was stale a
    /// background fetch was started; its handle is returned here.
    Cached {
        snapshot: DatasetSnapshot,
        refresh: Option<JoinHandle<Result<DatasetSnapshot, EngineError>>>,
    },
}

impl LoadOutcome {
    #[must_use]
    pub fn snapshot(&self) -> &DatasetSnapshot {
        match self {
            Self::AlreadyLoaded(snapshot)
            | Self::Fetched(snapshot)
            | Self::Cached { snapshot, .. } => snapshot,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AlreadyLoaded(_) => "already_loaded",
            Self::Fetched(_) => "fetched",
            Self::Cached { refresh: None, .. } => "cached",
            Self::Cached {
                refresh: Some(_), ..
            } => "cached_refreshing",
        }
    }
}

/// Drives the load / fetch / read lifecycle of every registered dataset.
///
/// Calls for the same key are serialized; calls for different keys run
/// concurrently and interleave their refresh chunks on the shared store.
pub struct LifecycleManager {
    registry: Arc<DatasetRegistry>,
    store: SharedStore,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    statuses: RwLock<HashMap<String, DatasetStatus>>,
    loaded: RwLock<HashMap<String, DatasetSnapshot>>,
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    events: broadcast::Sender<LifecycleEvent>,
}

impl LifecycleManager {
    #[must_use]
    pub fn new(registry: Arc<DatasetRegistry>, config: EngineConfig) -> Self {
        Self::with_clock(registry, config, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(
        registry: Arc<DatasetRegistry>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            store: registry.store(),
            registry,
            config,
            clock,
            statuses: RwLock::new(HashMap::new()),
            loaded: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Opens the store under `config.cache_root` and builds an empty registry
    /// around it.
    pub fn open(config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Arc<Self>, EngineError> {
        let store = LookupStore::open(&config.store_path())?;
        let registry = Arc::new(DatasetRegistry::new(Arc::new(Mutex::new(store))));
        Ok(Arc::new(Self::with_clock(registry, config, clock)))
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<DatasetRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    pub async fn status(&self, key: &str) -> Option<DatasetStatus> {
        self.statuses.read().await.get(key).cloned()
    }

    pub async fn statuses(&self) -> BTreeMap<String, DatasetStatus> {
        self.statuses
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// The in-memory loaded state of `key`: the summary handed to `on_load`.
    pub async fn loaded(&self, key: &str) -> Option<DatasetSnapshot> {
        self.loaded.read().await.get(key).cloned()
    }

    #[must_use]
    pub fn snapshot_path(&self, key: &str) -> PathBuf {
        snapshot_path(&self.config.snapshot_dir(), key)
    }

    /// Makes `key` available, doing as little work as possible.
    ///
    /// Already loaded and not forced: returns at once. No snapshot, or
    /// forced: fetches. Otherwise reads the snapshot, and when it is older
    /// than the definition's `max_age_days` starts a background fetch
    /// without waiting for it.
    pub async fn load(
        self: &Arc<Self>,
        key: &str,
        options: LoadOptions,
    ) -> Result<LoadOutcome, EngineError> {
        if !options.force {
            if let Some(snapshot) = self.loaded(key).await {
                debug!(dataset = %key, "load skipped; already loaded");
                return Ok(LoadOutcome::AlreadyLoaded(snapshot));
            }
        }
        let definition = self.definition(key).await?;
        let guard = self.acquire(key).await;
        if !options.force {
            if let Some(snapshot) = self.loaded(key).await {
                return Ok(LoadOutcome::AlreadyLoaded(snapshot));
            }
        }
        self.statuses
            .write()
            .await
            .entry(key.to_string())
            .or_default();

        let path = self.snapshot_path(key);
        let has_snapshot = path.exists();
        if options.force || !has_snapshot {
            info!(dataset = %key, forced = options.force, "load fetching");
            let snapshot = self.fetch_locked(definition.as_ref()).await?;
            return Ok(LoadOutcome::Fetched(snapshot));
        }

        let (snapshot, modified) = self.read_locked(definition.as_ref()).await?;
        drop(guard);

        let age = self.age_of(modified);
        let max_age =
            Duration::from_secs(definition.max_age_days().saturating_mul(SECONDS_PER_DAY));
        let refresh = if age > max_age {
            info!(
                dataset = %key,
                age_secs = age.as_secs(),
                max_age_days = definition.max_age_days(),
                "snapshot stale; refreshing in background"
            );
            let this = Arc::clone(self);
            let key = key.to_string();
            Some(tokio::spawn(async move {
                let result = this.fetch(&key).await;
                if let Err(err) = &result {
                    warn!(dataset = %key, error = %err, "background refresh failed");
                }
                result
            }))
        } else {
            None
        };
        Ok(LoadOutcome::Cached { snapshot, refresh })
    }

    /// Downloads, refreshes and persists `key`, then hands the new snapshot
    /// to `on_load`. On error the status records it and the previously
    /// loaded state is left as it was.
    pub async fn fetch(&self, key: &str) -> Result<DatasetSnapshot, EngineError> {
        let definition = self.definition(key).await?;
        let _guard = self.acquire(key).await;
        self.fetch_locked(definition.as_ref()).await
    }

    /// Loads `key` from its local snapshot without touching the source.
    pub async fn read(&self, key: &str) -> Result<DatasetSnapshot, EngineError> {
        let definition = self.definition(key).await?;
        let _guard = self.acquire(key).await;
        self.read_locked(definition.as_ref())
            .await
            .map(|(snapshot, _)| snapshot)
    }

    /// Runs `raw` through the definition's parser and the chunked refresh
    /// pipeline, publishing progress after every chunk.
    pub async fn process(&self, key: &str, raw: &[u8]) -> Result<RefreshSummary, EngineError> {
        let definition = self.definition(key).await?;
        let _guard = self.acquire(key).await;
        self.process_with(definition.as_ref(), raw).await
    }

    /// Loads every definition enabled by default or by configuration, one
    /// task per dataset. Failures are logged and recorded in status.
    pub async fn load_all(self: &Arc<Self>) -> BTreeMap<String, Result<LoadOutcome, EngineError>> {
        let mut tasks = Vec::new();
        for definition in self.registry.list_all().await {
            let key = definition.key().to_string();
            if !self
                .config
                .is_enabled(&key, definition.enabled_by_default())
            {
                debug!(dataset = %key, "load_all skipping disabled dataset");
                continue;
            }
            let this = Arc::clone(self);
            let task_key = key.clone();
            tasks.push((
                key,
                tokio::spawn(async move { this.load(&task_key, LoadOptions::default()).await }),
            ));
        }

        let mut report = BTreeMap::new();
        for (key, task) in tasks {
            let result = match task.await {
                Ok(result) => result,
                Err(join) => Err(EngineError::Process(ProcessError(format!(
                    "load task for `{key}` did not finish: {join}"
                )))),
            };
            match &result {
                Ok(outcome) => {
                    info!(dataset = %key, outcome = outcome.kind(), "dataset ready");
                }
                Err(err) => error!(dataset = %key, error = %err, "dataset load failed"),
            }
            report.insert(key, result);
        }
        report
    }

    /// Runs `on_remove`, drops every row of the category and forgets the
    /// definition once no fetch, read or refresh of `key` is running.
    pub async fn unregister(&self, key: &str) -> Result<(), EngineError> {
        let guard = self.acquire(key).await;
        let result = self.registry.unregister(key).await;
        drop(guard);
        self.release(key).await;
        result
    }

    /// Unregisters `key` and forgets everything known about it: status,
    /// loaded state and snapshot file.
    pub async fn remove(&self, key: &str) -> Result<(), EngineError> {
        let guard = self.acquire(key).await;
        let result = async {
            self.registry.unregister(key).await?;
            self.statuses.write().await.remove(key);
            self.loaded.write().await.remove(key);
            remove_snapshot(&self.snapshot_path(key))?;
            Ok::<_, EngineError>(())
        }
        .await;
        drop(guard);
        self.release(key).await;
        result?;
        info!(dataset = %key, "dataset removed");
        Ok(())
    }

    pub async fn find_one_by_key(&self, category: &str, key: &str) -> Option<LookupRecord> {
        self.store.lock().await.find_one_by_key(category, key)
    }

    pub async fn find_all_by_text(
        &self,
        category: &str,
        sub_category: Option<&str>,
        substring: &str,
    ) -> Vec<LookupRecord> {
        self.store
            .lock()
            .await
            .find_all_by_text(category, sub_category, substring)
    }

    pub async fn find_all_by_bounding_box(
        &self,
        category: &str,
        sub_category: Option<&str>,
        lat: f64,
        lon: f64,
        delta: f64,
    ) -> Vec<LookupRecord> {
        self.store
            .lock()
            .await
            .find_all_by_bounding_box(category, sub_category, lat, lon, delta)
    }

    async fn definition(&self, key: &str) -> Result<Arc<dyn DatasetDefinition>, EngineError> {
        self.registry
            .get(key)
            .await
            .ok_or_else(|| NotRegistered(key.to_string()).into())
    }

    async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut inflight = self.inflight.lock().await;
            Arc::clone(
                inflight
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    /// Drops the in-flight lock of `key` unless another caller holds or
    /// awaits it.
    async fn release(&self, key: &str) {
        let mut inflight = self.inflight.lock().await;
        if inflight
            .get(key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            inflight.remove(key);
        }
    }

    #[cfg(test)]
    pub(crate) async fn inflight_keys(&self) -> usize {
        self.inflight.lock().await.len()
    }

    fn age_of(&self, modified: SystemTime) -> Duration {
        self.clock
            .now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO)
    }

    async fn fetch_locked(
        &self,
        definition: &dyn DatasetDefinition,
    ) -> Result<DatasetSnapshot, EngineError> {
        let key = definition.key().as_str();
        self.transition(key, LifecycleState::Fetching).await;
        let result = async {
            let raw = self.fetch_with_retry(definition).await?;
            let summary = self.process_with(definition, &raw).await?;
            let snapshot = DatasetSnapshot {
                key: key.to_string(),
                name: definition.name().to_string(),
                version: summary.version,
                count: summary.count,
                refreshed_at: unix_seconds(self.clock.now()),
            };
            write_snapshot(&self.snapshot_path(key), &snapshot)?;
            definition.on_load(&snapshot);
            Ok::<_, EngineError>(snapshot)
        }
        .instrument(tracing::info_span!("fetch", dataset = %key))
        .await;
        match result {
            Ok(snapshot) => {
                self.record_loaded(key, &snapshot).await;
                Ok(snapshot)
            }
            Err(err) => Err(self.record_failure(key, err).await),
        }
    }

    async fn read_locked(
        &self,
        definition: &dyn DatasetDefinition,
    ) -> Result<(DatasetSnapshot, SystemTime), EngineError> {
        let key = definition.key().as_str();
        self.transition(key, LifecycleState::Loading).await;
        let result = async {
            let path = self.snapshot_path(key);
            let (snapshot, modified) = read_snapshot(&path)?
                .ok_or_else(|| SnapshotError(format!("{} does not exist", path.display())))?;
            if snapshot.key != key {
                return Err(SnapshotError(format!(
                    "{} belongs to `{}`",
                    path.display(),
                    snapshot.key
                ))
                .into());
            }
            definition.on_load(&snapshot);
            Ok::<_, EngineError>((snapshot, modified))
        }
        .instrument(tracing::info_span!("read", dataset = %key))
        .await;
        match result {
            Ok((snapshot, modified)) => {
                self.record_loaded(key, &snapshot).await;
                Ok((snapshot, modified))
            }
            Err(err) => Err(self.record_failure(key, err).await),
        }
    }

    async fn record_loaded(&self, key: &str, snapshot: &DatasetSnapshot) {
        self.loaded
            .write()
            .await
            .insert(key.to_string(), snapshot.clone());
        self.statuses.write().await.insert(
            key.to_string(),
            DatasetStatus {
                state: LifecycleState::Loaded,
                version: Some(snapshot.version.clone()),
                last_refreshed_at: Some(snapshot.refreshed_at),
                last_error: None,
            },
        );
        self.publish_state(key, LifecycleState::Loaded, None);
        info!(
            dataset = %key,
            version = %snapshot.version,
            count = snapshot.count,
            "dataset loaded"
        );
    }

    /// Marks `key` as failed. Loaded state and the last good version are kept.
    async fn record_failure(&self, key: &str, err: EngineError) -> EngineError {
        let message = err.to_string();
        {
            let mut statuses = self.statuses.write().await;
            let status = statuses.entry(key.to_string()).or_default();
            status.state = LifecycleState::Error;
            status.last_error = Some(message.clone());
        }
        self.publish_state(key, LifecycleState::Error, Some(message));
        error!(
            dataset = %key,
            code = err.code().as_str(),
            error = %err,
            "dataset lifecycle failed"
        );
        err
    }

    async fn transition(&self, key: &str, state: LifecycleState) {
        self.statuses
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .state = state;
        self.publish_state(key, state, None);
    }

    fn publish_state(&self, key: &str, state: LifecycleState, error: Option<String>) {
        let _ = self.events.send(LifecycleEvent::StateChanged {
            key: key.to_string(),
            state,
            error,
        });
    }

    async fn fetch_with_retry(
        &self,
        definition: &dyn DatasetDefinition,
    ) -> Result<Vec<u8>, EngineError> {
        let key = definition.key().as_str();
        let policy = &self.config.fetch_retry;
        let attempts = policy.attempts();
        let mut last = FetchError("no fetch attempted".to_string());
        for attempt in 1..=attempts {
            match definition.fetch().await {
                Ok(bytes) => {
                    debug!(dataset = %key, attempt, bytes = bytes.len(), "payload fetched");
                    return Ok(bytes);
                }
                Err(err) => {
                    warn!(dataset = %key, attempt, attempts, error = %err, "payload fetch failed");
                    last = err;
                    if attempt < attempts {
                        tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                    }
                }
            }
        }
        Err(last.into())
    }

    async fn process_with(
        &self,
        definition: &dyn DatasetDefinition,
        raw: &[u8],
    ) -> Result<RefreshSummary, EngineError> {
        let key = definition.key().as_str();
        let payload = definition.parse(raw)?;
        let mut job = RefreshJob::new(
            key,
            payload,
            RefreshOptions {
                chunk_size: definition.chunk_size(),
                fallback_version: unix_seconds(self.clock.now()).to_string(),
                allow_empty: false,
            },
        );
        let normalizer = DefinitionNormalizer(definition);
        async {
            loop {
                let tick = {
                    let mut store = self.store.lock().await;
                    job.tick(&mut store, &normalizer)?
                };
                match tick {
                    Tick::SweepStarted { .. } => {}
                    Tick::Batch(progress) => {
                        let _ = self.events.send(LifecycleEvent::progress(key, &progress));
                    }
                    Tick::Complete(outcome) => return Ok(outcome.summary),
                }
                tokio::task::yield_now().await;
            }
        }
        .instrument(tracing::info_span!("process", dataset = %key))
        .await
    }
}
