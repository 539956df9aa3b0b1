// SPDX-License-Identifier: Apache-2.0

use std::fmt::{self, Display, Formatter};

/// Network or remote-source failure while obtaining a raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError(pub String);

/// Parse or transform failure inside a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessError(pub String);

/// Persistence failure in the lookup store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError(pub String);

/// Local snapshot file could not be read, parsed or written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotError(pub String);

/// Operation addressed a dataset key with no registered definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotRegistered(pub String);

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "fetch failed: {}", self.0)
    }
}
impl std::error::Error for FetchError {}

impl Display for ProcessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "process failed: {}", self.0)
    }
}
impl std::error::Error for ProcessError {}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "store failed: {}", self.0)
    }
}
impl std::error::Error for StoreError {}

impl Display for SnapshotError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "snapshot failed: {}", self.0)
    }
}
impl std::error::Error for SnapshotError {}

impl Display for NotRegistered {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "dataset `{}` is not registered", self.0)
    }
}
impl std::error::Error for NotRegistered {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorCode {
    Fetch,
    Process,
    Store,
    Snapshot,
    NotRegistered,
}

impl ErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Process => "process",
            Self::Store => "store",
            Self::Snapshot => "snapshot",
            Self::NotRegistered => "not_registered",
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Every failure the lifecycle boundary can record against a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EngineError {
    Fetch(FetchError),
    Process(ProcessError),
    Store(StoreError),
    Snapshot(SnapshotError),
    NotRegistered(NotRegistered),
}

impl EngineError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Fetch(_) => ErrorCode::Fetch,
            Self::Process(_) => ErrorCode::Process,
            Self::Store(_) => ErrorCode::Store,
            Self::Snapshot(_) => ErrorCode::Snapshot,
            Self::NotRegistered(_) => ErrorCode::NotRegistered,
        }
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch(err) => err.fmt(f),
            Self::Process(err) => err.fmt(f),
            Self::Store(err) => err.fmt(f),
            Self::Snapshot(err) => err.fmt(f),
            Self::NotRegistered(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Fetch(err) => Some(err),
            Self::Process(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Snapshot(err) => Some(err),
            Self::NotRegistered(err) => Some(err),
        }
    }
}

impl From<FetchError> for EngineError {
    fn from(value: FetchError) -> Self {
        Self::Fetch(value)
    }
}

impl From<ProcessError> for EngineError {
    fn from(value: ProcessError) -> Self {
        Self::Process(value)
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<SnapshotError> for EngineError {
    fn from(value: SnapshotError) -> Self {
        Self::Snapshot(value)
    }
}

impl From<NotRegistered> for EngineError {
    fn from(value: NotRegistered) -> Self {
        Self::NotRegistered(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_keeps_code_and_message() {
        let err = EngineError::from(ProcessError("bad row 17".to_string()));
        assert_eq!(err.code(), ErrorCode::Process);
        assert_eq!(err.to_string(), "process failed: bad row 17");
    }

    #[test]
    fn error_code_serializes_snake_case() {
        let encoded = serde_json::to_string(&ErrorCode::NotRegistered).expect("encode");
        assert_eq!(encoded, "\"not_registered\"");
    }
}
