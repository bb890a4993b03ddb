use serde::Serialize;
use std::fmt;

/// Coarse classification shared by every error the core surfaces.
///
/// Callers (the HTTP layer in particular) branch on this rather than on
/// the concrete error enums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing label or file, undecodable image. Nothing was mutated.
    InvalidInput,
    /// No usable face, detector failure or timeout.
    DetectionFailure,
    /// Blob store read or write failed.
    StoreUnavailable,
    /// Models or the initial index are not loaded yet.
    ServiceNotReady,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::DetectionFailure => "detection failure",
            ErrorKind::StoreUnavailable => "store unavailable",
            ErrorKind::ServiceNotReady => "service not ready",
            ErrorKind::Internal => "internal error",
        })
    }
}
