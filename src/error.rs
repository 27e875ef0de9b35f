//! Error types for emberkv
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using EmberError
pub type Result<T> = std::result::Result<T, EmberError>;

/// Unified error type for emberkv operations
#[derive(Debug, Error)]
pub enum EmberError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Key / Value Errors
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    KeyNotFound,

    #[error("Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("Field not found")]
    FieldNotFound,

    #[error("Collection is empty")]
    EmptyCollection,

    #[error("Index out of range")]
    IndexOutOfRange,

    #[error("Value is not an integer or out of range")]
    NotAnInteger,

    #[error("Invalid expiration timestamp: {0}")]
    InvalidTimestamp(i64),

    #[error("Shard arena is full")]
    ArenaFull,

    // -------------------------------------------------------------------------
    // Store Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Database is closed")]
    DatabaseClosed,

    #[error("Database is in use by another process")]
    DatabaseInUse,

    #[error("Shrink is already running")]
    ShrinkAlreadyRunning,

    // -------------------------------------------------------------------------
    // Log / Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt log record: {0}")]
    CorruptLogRecord(String),

    #[error("Unsupported value type: 0x{0:02x}")]
    UnsupportedValueType(u8),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
