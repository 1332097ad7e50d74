//! Failure reasons attached to requests
//!
//! A failed request is an ordinary outcome of a run. The reason travels as a
//! value on the request and through its listeners; it never aborts the
//! simulation. Broken configuration and internal defects use the error types
//! of `faultline_core::error` instead.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a request ended in the canceled state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Error)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestFailedReason {
    #[error("no running instance available")]
    NoInstanceAvailable,

    #[error("handling instance was killed")]
    InstanceKilled,

    #[error("request timed out")]
    Timeout,

    #[error("circuit breaker is open")]
    CircuitOpen,

    #[error("a dependency request failed")]
    DependencyFailed,
}
