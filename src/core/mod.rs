//! Head-race timing engine.

/// Race clock state machine and wall-clock sources.
pub mod clock;
/// Timing engine operations.
pub mod engine;
/// Operator-facing error taxonomy.
pub mod error;
/// Change-feed reconciliation.
pub mod reconcile;
/// Bow-number resolution over the race roster.
pub mod roster;
