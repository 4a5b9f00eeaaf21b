use thiserror::Error;

/// The foreground sampler could not read the usage-event log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SamplerError {
    #[error("usage access permission has not been granted")]
    PermissionDenied,
    #[error("usage event source unavailable: {0}")]
    Unavailable(String),
}

/// A schedule document was rejected as a whole.
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("schedule document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("schedule `{id}` has {len} selected days, expected 7")]
    DayCount { id: String, len: usize },
    #[error("schedule at position {0} has an empty id")]
    MissingId(usize),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("unable to access the data store")]
    Sqlite(#[from] rusqlite::Error),
    #[error("unable to encode document: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("write rejected: {0}")]
    Rejected(String),
}

/// The platform refused to add or remove the overlay surface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OverlayError {
    #[error("overlay surface rejected the request: {0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum GuardError {
    #[error("malformed schedule document")]
    MalformedScheduleDocument(#[from] ScheduleError),
    #[error("persistence failure")]
    Persistence(#[from] StorageError),
    #[error("unable to restart the monitor: {0}")]
    Restart(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GuardError>;
