//! Derived results.

/// Ranked finish list computed from timing records.
pub mod projector;
