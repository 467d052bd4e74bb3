//! Single-writer async runtime, change-feed listener, and update stream.

/// Update stream types emitted by the runtime.
pub mod events;
/// Handle and command loop implementation.
pub mod handle;
