//! Error types used by storage adapters.
//!
//! This module defines [`StorageError`], the failure taxonomy for durable
//! storage backends. Core components treat every variant as recoverable:
//! the in-memory cache stays authoritative and the failure is logged, never
//! surfaced to callers.
//!
//! The type provides helper methods (`as_label`, `as_message`) for
//! logging/metrics.

use thiserror::Error;

/// # Errors produced by durable storage backends.
///
/// These represent host-level persistence failures. They are returned by
/// [`SharedStorage`](crate::storage::SharedStorage) implementations and
/// swallowed by [`SyncedStore`](crate::store::SyncedStore), which degrades
/// to memory-only operation.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// Durable storage is disabled or unreachable in this context.
    #[error("durable storage unavailable")]
    Unavailable,

    /// The host refused the write because the storage quota is exhausted.
    #[error("storage quota exceeded")]
    QuotaExceeded,

    /// The record could not be serialized for persistence.
    #[error("serialization failed: {detail}")]
    Serialization {
        /// The underlying serializer message.
        detail: String,
    },
}

impl StorageError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use idlesync::StorageError;
    ///
    /// assert_eq!(StorageError::QuotaExceeded.as_label(), "storage_quota_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            StorageError::Unavailable => "storage_unavailable",
            StorageError::QuotaExceeded => "storage_quota_exceeded",
            StorageError::Serialization { .. } => "storage_serialization",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            StorageError::Unavailable => "storage unavailable".to_string(),
            StorageError::QuotaExceeded => "quota exceeded".to_string(),
            StorageError::Serialization { detail } => format!("serialization: {detail}"),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization {
            detail: err.to_string(),
        }
    }
}
