// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use awardref_core::FetchError;
use tokio::sync::Mutex;

/// Where a dataset's raw bytes come from. Timeouts and transport concerns
/// belong to the implementation.
#[async_trait]
pub trait PayloadSource: Send + Sync + 'static {
    async fn fetch(&self) -> Result<Vec<u8>, FetchError>;

    /// Short label for logs, e.g. a path or URL.
    fn describe(&self) -> String;
}

/// Reads the payload from a local file.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PayloadSource for FileSource {
    async fn fetch(&self) -> Result<Vec<u8>, FetchError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|e| FetchError(format!("{}: {e}", self.path.display())))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory source that counts calls; can be switched to fail or to
/// respond slowly.
pub struct MemorySource {
    pub bytes: Mutex<Vec<u8>>,
    pub fetch_calls: AtomicU64,
    pub failing: AtomicBool,
    pub delay: Duration,
    active: AtomicU64,
    max_active: AtomicU64,
}

impl MemorySource {
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Mutex::new(bytes.into()),
            fetch_calls: AtomicU64::new(0),
            failing: AtomicBool::new(false),
            delay: Duration::ZERO,
            active: AtomicU64::new(0),
            max_active: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub async fn replace(&self, bytes: impl Into<Vec<u8>>) {
        *self.bytes.lock().await = bytes.into();
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    #[must_use]
    pub fn calls(&self) -> u64 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping `fetch` calls observed.
    #[must_use]
    pub fn max_concurrent(&self) -> u64 {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PayloadSource for MemorySource {
    async fn fetch(&self) -> Result<Vec<u8>, FetchError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = if self.failing.load(Ordering::SeqCst) {
            Err(FetchError("memory source set to fail".to_string()))
        } else {
            Ok(self.bytes.lock().await.clone())
        };
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
