//! # Error Types
//!
//! Custom error types for the DShot engine using `thiserror`.

use thiserror::Error;

/// Errors reported by the timer/DMA collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeripheralError {
    /// Channel or timer already owned by another subsystem
    #[error("channel or timer is busy")]
    Busy,

    /// No DMA stream could be allocated for the request
    #[error("no DMA channel available")]
    NoDmaChannel,

    /// Any other hardware fault
    #[error("peripheral fault: {0}")]
    Fault(String),
}

/// Main error type for the DShot engine
#[derive(Debug, Error)]
pub enum DshotError {
    /// DShot protocol errors
    #[error("DShot protocol error: {0}")]
    Protocol(String),

    /// Burst buffer layout does not fit the reserved capacity
    #[error("burst layout needs {required} slots but only {capacity} are reserved")]
    BufferSizing { required: usize, capacity: usize },

    /// Board topology is inconsistent
    #[error("Topology error: {0}")]
    Topology(String),

    /// Timer/DMA collaborator errors
    #[error("Peripheral error: {0}")]
    Peripheral(#[from] PeripheralError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Telemetry record serialization errors
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for the DShot engine
pub type Result<T> = std::result::Result<T, DshotError>;
