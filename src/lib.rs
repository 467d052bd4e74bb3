//! Live timing for head races: staggered starts, individually timed boats.
//!
//! Operators stamp start and finish times, with or without a bow number.
//! [`core::engine::TimingEngine`] validates each action against the race
//! roster and the store's timing records, writes the record, and keeps an
//! ordered history of timing events. Events captured without a bow number stay
//! pending until [`core::engine::TimingEngine::assign_bow_number`] binds them,
//! keeping their original capture time.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use regatta_timing::{
//!     core::{clock::ManualClock, engine::TimingEngine},
//!     persist::memory::MemoryStore,
//!     types::{RaceKind, TimingKind},
//! };
//!
//! let store = MemoryStore::new();
//! let race = store.register_race("Head of the River", RaceKind::HeadRace, None).expect("race");
//! let team = store.register_team("Riverside RC", None).expect("team");
//! store.register_entry(race, team, Some(7)).expect("entry");
//!
//! let clock = ManualClock::new(1_000_000);
//! let mut engine = TimingEngine::load(race, store, Arc::new(clock.clone())).expect("load");
//! engine.start_clock().expect("start");
//! engine.mark_time(TimingKind::Start, 1_003_000, Some(7)).expect("start bow 7");
//!
//! // Finish stamped first, boat identified afterwards.
//! let pending = engine.mark_time(TimingKind::Finish, 1_250_500, None).expect("finish");
//! engine.assign_bow_number(pending, 7).expect("assign");
//!
//! let results = engine.results().expect("results");
//! assert_eq!(results[0].elapsed_ms, 247_500);
//! assert_eq!(results[0].race_time(), "4:07.50");
//! ```
//!
//! Runtime usage with a change feed:
//! ```no_run
//! use std::sync::Arc;
//!
//! use regatta_timing::{
//!     core::{clock::SystemClock, engine::TimingEngine},
//!     feed::ChangeFeed,
//!     persist::sqlite::SqliteStore,
//!     runtime::handle::{spawn_timing, RuntimeConfig},
//!     types::TimingKind,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let feed = ChangeFeed::default();
//! let store = SqliteStore::open("regatta.db").expect("open sqlite").with_feed(feed.clone());
//! let engine = TimingEngine::load(1, store, Arc::new(SystemClock)).expect("load race");
//! let handle = spawn_timing(engine, Some(feed.subscribe()), RuntimeConfig::default());
//! handle.start_clock().await.expect("start clock");
//! let _pending = handle.mark(TimingKind::Start, None).await.expect("mark");
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```
#![deny(missing_docs)]

/// Timing engine, race clock, roster, and reconciliation.
pub mod core;
/// Operator timing events.
pub mod event;
/// Store change notifications.
pub mod feed;
/// Race, entry, and timing record types.
pub mod model;
/// Store adapter traits with in-memory and SQLite implementations.
pub mod persist;
/// Ranked results.
pub mod results;
/// Single-writer runtime handle and update stream.
pub mod runtime;
/// Shared primitive IDs and status lifecycle enums.
pub mod types;
