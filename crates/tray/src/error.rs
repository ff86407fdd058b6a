//! Error types for the tray.

use crate::id::ItemId;

/// Outcome of a single failed native call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NativeError {
    /// The native menu has no entry with this identifier yet.
    #[error("no native menu entry with id {0}")]
    EntryMissing(ItemId),

    #[error("{call} failed with OS error {code}")]
    Os { call: &'static str, code: u32 },

    /// The identifier cannot be represented as a native command id.
    #[error("id {0} is outside the native command id range")]
    IdOutOfRange(ItemId),

    #[error("encoding error: {0}")]
    Encoding(String),
}

/// Errors produced by the tray context and its event loop.
#[derive(Debug, thiserror::Error)]
pub enum TrayError {
    /// Window or notification icon registration failed; the run is aborted.
    #[error("startup failed: {0}")]
    Startup(NativeError),

    /// The blocking event fetch itself failed.
    #[error("event pump failed: {0}")]
    Pump(NativeError),

    #[error("native call failed: {0}")]
    Native(#[from] NativeError),

    #[error("tray is already running")]
    AlreadyRunning,

    #[error("tray event loop is not running")]
    NotRunning,

    #[error("native layer re-entered while busy")]
    Reentrant,

    #[error("failed to spawn thread: {0}")]
    ThreadSpawn(std::io::Error),

    #[error("icon cache error: {0}")]
    IconCache(#[from] systray_icon_cache::CacheError),
}

pub type Result<T> = std::result::Result<T, TrayError>;
