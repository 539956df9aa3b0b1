// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::sync::Arc;

use awardref_core::{EngineError, NotRegistered};
use awardref_store::LookupStore;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::definition::DatasetDefinition;

/// The lookup store shared by every dataset. Holders keep the lock for one
/// refresh chunk or one query at a time.
pub type SharedStore = Arc<Mutex<LookupStore>>;

pub struct DatasetRegistry {
    definitions: RwLock<BTreeMap<String, Arc<dyn DatasetDefinition>>>,
    store: SharedStore,
}

impl DatasetRegistry {
    #[must_use]
    pub fn new(store: SharedStore) -> Self {
        Self {
            definitions: RwLock::new(BTreeMap::new()),
            store,
        }
    }

    #[must_use]
    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.store)
    }

    /// Adds `definition`, replacing any earlier one with the same key.
    pub async fn register(&self, definition: Arc<dyn DatasetDefinition>) {
        let key = definition.key().to_string();
        let replaced = self
            .definitions
            .write()
            .await
            .insert(key.clone(), definition)
            .is_some();
        info!(dataset = %key, replaced, "dataset registered");
    }

    /// Runs the definition's `on_remove`, drops every row of its category and
    /// forgets the definition. Callers hold the dataset's in-flight lock, see
    /// [`crate::LifecycleManager::unregister`].
    pub(crate) async fn unregister(&self, key: &str) -> Result<(), EngineError> {
        let definition = self
            .get(key)
            .await
            .ok_or_else(|| NotRegistered(key.to_string()))?;
        definition.on_remove();
        let deleted = self.store.lock().await.delete_category(key)?;
        self.definitions.write().await.remove(key);
        info!(dataset = %key, deleted, "dataset unregistered");
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Option<Arc<dyn DatasetDefinition>> {
        self.definitions.read().await.get(key).cloned()
    }

    /// Every registered definition, ordered by key.
    pub async fn list_all(&self) -> Vec<Arc<dyn DatasetDefinition>> {
        self.definitions.read().await.values().cloned().collect()
    }
}
