use std::sync::Arc;

use regatta_timing::{
    core::{
        clock::{ClockState, ManualClock},
        engine::TimingEngine,
        error::TimingError,
    },
    event::{EventStatus, TimingEvent},
    feed::{ChangeFeed, Table},
    persist::{RaceStore, StoreError, memory::MemoryStore},
    types::{EntryStatus, RaceId, RaceKind, TimingKind},
};

const T0: i64 = 1_700_000_000_000;

struct Regatta {
    store: MemoryStore,
    clock: ManualClock,
    race: RaceId,
}

impl Regatta {
    fn new(bows: &[u32]) -> Self {
        Self::with_store(MemoryStore::new(), bows)
    }

    fn with_store(store: MemoryStore, bows: &[u32]) -> Self {
        let race = store
            .register_race("Head of the River", RaceKind::HeadRace, Some(T0))
            .expect("race");
        for bow in bows {
            let team = store.register_team(&format!("Crew {bow}"), None).expect("team");
            store.register_entry(race, team, Some(*bow)).expect("entry");
        }
        Self {
            store,
            clock: ManualClock::new(T0),
            race,
        }
    }

    fn station(&self) -> TimingEngine<MemoryStore> {
        TimingEngine::load(self.race, self.store.clone(), Arc::new(self.clock.clone())).expect("load")
    }
}

#[test]
fn second_station_follows_clock_start() {
    let regatta = Regatta::new(&[1, 2]);
    let mut start_line = regatta.station();
    let mut finish_line = regatta.station();

    regatta.clock.set(T0 + 2_000);
    start_line.start_clock().expect("start");
    assert_eq!(finish_line.clock(), ClockState::NotStarted);

    let report = finish_line.reconcile().expect("reconcile");
    assert!(report.clock_changed());
    assert_eq!(finish_line.clock(), ClockState::Running { started_at: T0 + 2_000 });
    assert_eq!(finish_line.race().actual_start, Some(T0 + 2_000));

    let err = finish_line.start_clock().expect_err("already running");
    assert!(matches!(err, TimingError::InvalidClockTransition { .. }));
}

#[test]
fn late_start_on_second_station_adopts_the_stored_start() {
    let regatta = Regatta::new(&[1]);
    let mut start_line = regatta.station();
    let mut finish_line = regatta.station();

    start_line.start_clock().expect("start");
    regatta.clock.advance(60_000);

    let err = finish_line.start_clock().expect_err("already started elsewhere");
    assert!(matches!(
        err,
        TimingError::InvalidClockTransition {
            state: ClockState::Running { started_at: T0 },
            ..
        }
    ));
    assert_eq!(finish_line.clock(), ClockState::Running { started_at: T0 });

    let race = regatta.store.get_race(regatta.race).expect("get").expect("race");
    assert_eq!(race.actual_start, Some(T0));

    start_line.reconcile().expect("reconcile");
    assert_eq!(start_line.clock(), ClockState::Running { started_at: T0 });
    assert_eq!(start_line.elapsed_ms(), 60_000);
}

#[test]
fn stored_start_time_is_never_overwritten() {
    let regatta = Regatta::new(&[1]);
    let mut store = regatta.store.clone();
    store.set_race_actual_start(regatta.race, T0).expect("first start");

    let err = store
        .set_race_actual_start(regatta.race, T0 + 60_000)
        .expect_err("second start");
    assert!(matches!(err, StoreError::Conflict(_)));
    let race = store.get_race(regatta.race).expect("get").expect("race");
    assert_eq!(race.actual_start, Some(T0));
}

#[test]
fn reconciliation_adopts_remote_marks_and_keeps_ids_stable() {
    let regatta = Regatta::new(&[1, 2]);
    let mut start_line = regatta.station();
    let mut finish_line = regatta.station();
    start_line.start_clock().expect("start");

    regatta.clock.set(T0 + 10_000);
    start_line.mark_now(TimingKind::Start, Some(1)).expect("start bow 1");

    let first = finish_line.reconcile().expect("reconcile");
    assert_eq!(first.added, 1);
    let ids: Vec<_> = finish_line.events().iter().map(TimingEvent::id).collect();

    let second = finish_line.reconcile().expect("reconcile again");
    assert_eq!(second.added, 0);
    assert_eq!(second.removed, 0);
    assert!(!second.history_changed());
    let again: Vec<_> = finish_line.events().iter().map(TimingEvent::id).collect();
    assert_eq!(ids, again);

    let event = &finish_line.events()[0];
    assert_eq!(event.captured_at(), T0 + 10_000);
    assert_eq!(event.assignment().map(|a| a.bow_number), Some(1));
}

#[test]
fn pending_events_survive_reconciliation() {
    let regatta = Regatta::new(&[1]);
    let mut start_line = regatta.station();
    let mut finish_line = regatta.station();
    start_line.start_clock().expect("start");
    finish_line.reconcile().expect("reconcile");

    regatta.clock.set(T0 + 30_000);
    let pending = finish_line.mark_now(TimingKind::Finish, None).expect("pending");
    start_line.mark_time(TimingKind::Start, T0 + 1_000, Some(1)).expect("start bow 1");

    let report = finish_line.reconcile().expect("reconcile");
    assert_eq!(report.pending, 1);
    assert_eq!(report.added, 1);
    let kept = finish_line.event(pending).expect("pending kept");
    assert!(kept.is_pending());
    assert_eq!(kept.captured_at(), T0 + 30_000);

    finish_line.assign_bow_number(pending, 1).expect("assign after reconcile");
    let result = finish_line.results().expect("results");
    assert_eq!(result[0].elapsed_ms, 29_000);
}

#[test]
fn stale_snapshot_does_not_drop_newer_local_mark() {
    let regatta = Regatta::new(&[1, 2]);
    let mut station = regatta.station();
    station.start_clock().expect("start");

    let stale = station.fetch_snapshot().expect("snapshot");
    regatta.clock.set(T0 + 4_000);
    let id = station.mark_now(TimingKind::Start, Some(2)).expect("start bow 2");

    let report = station.apply_external_change(stale);
    assert_eq!(report.retained, 1);
    assert_eq!(report.removed, 0);
    assert!(station.event(id).is_some());
    assert_eq!(
        station.roster().resolve(2).map(|b| b.entry.status),
        Some(EntryStatus::OnWater)
    );

    let fresh = station.reconcile().expect("reconcile");
    assert_eq!(fresh.retained, 0);
    assert_eq!(fresh.added, 0);
    assert!(station.event(id).is_some(), "confirmed event keeps its id");
}

#[test]
fn assigned_event_missing_from_a_current_snapshot_is_removed() {
    let regatta = Regatta::new(&[1]);
    let mut station = regatta.station();
    station.start_clock().expect("start");

    let mut before = station.fetch_snapshot().expect("snapshot");
    let id = station.mark_now(TimingKind::Start, Some(1)).expect("start bow 1");
    before.generation = station.generation();

    let report = station.apply_external_change(before);
    assert_eq!(report.removed, 1);
    assert!(station.event(id).is_none());
}

#[test]
fn remote_finish_marks_local_start_event_finished() {
    let regatta = Regatta::new(&[5]);
    let mut start_line = regatta.station();
    let mut finish_line = regatta.station();
    start_line.start_clock().expect("start");
    start_line.mark_time(TimingKind::Start, T0 + 1_000, Some(5)).expect("start");
    finish_line.reconcile().expect("reconcile");

    let start_event = finish_line.events()[0].id();
    assert_eq!(finish_line.event(start_event).map(TimingEvent::status), Some(EventStatus::Assigned));

    start_line.mark_time(TimingKind::Finish, T0 + 91_000, Some(5)).expect("finish");
    finish_line.reconcile().expect("reconcile");

    assert_eq!(finish_line.event(start_event).map(TimingEvent::status), Some(EventStatus::Finished));
    assert_eq!(
        finish_line.roster().resolve(5).map(|b| b.entry.status),
        Some(EntryStatus::Finished)
    );
    let err = finish_line
        .mark_time(TimingKind::Finish, T0 + 92_000, Some(5))
        .expect_err("finished elsewhere");
    assert!(matches!(err, TimingError::AlreadyFinished(5)));
}

#[test]
fn remote_stop_freezes_the_local_clock() {
    let regatta = Regatta::new(&[1]);
    let mut start_line = regatta.station();
    let mut finish_line = regatta.station();
    start_line.start_clock().expect("start");
    finish_line.reconcile().expect("reconcile");

    regatta.clock.set(T0 + 60_000);
    start_line.stop_clock().expect("stop");
    regatta.clock.set(T0 + 61_000);
    finish_line.reconcile().expect("reconcile");

    assert_eq!(
        finish_line.clock(),
        ClockState::Stopped {
            started_at: T0,
            stopped_at: T0 + 61_000
        }
    );
    regatta.clock.set(T0 + 500_000);
    assert_eq!(finish_line.elapsed_ms(), 61_000);
    assert!(finish_line.mark_now(TimingKind::Finish, None).is_err());
}

#[test]
fn loading_a_finished_race_stops_at_last_recorded_time() {
    let regatta = Regatta::new(&[1, 2]);
    let mut station = regatta.station();
    station.start_clock().expect("start");
    station.mark_time(TimingKind::Start, T0 + 1_000, Some(1)).expect("start 1");
    station.mark_time(TimingKind::Start, T0 + 2_000, Some(2)).expect("start 2");
    station.mark_time(TimingKind::Finish, T0 + 80_000, Some(2)).expect("finish 2");
    station.mark_time(TimingKind::Finish, T0 + 95_000, Some(1)).expect("finish 1");
    regatta.clock.set(T0 + 300_000);
    station.stop_clock().expect("stop");

    let reloaded = regatta.station();
    assert_eq!(
        reloaded.clock(),
        ClockState::Stopped {
            started_at: T0,
            stopped_at: T0 + 95_000
        }
    );
    assert_eq!(reloaded.events().len(), 4);
    assert!(reloaded.pending_events().next().is_none());
    let ranked = reloaded.results().expect("results");
    assert_eq!(ranked[0].bow_number, Some(2));
    assert_eq!(ranked[0].elapsed_ms, 78_000);
}

#[test]
fn store_writes_publish_change_notices() {
    let feed = ChangeFeed::new(16);
    let mut notices = feed.subscribe();
    let regatta = Regatta::with_store(MemoryStore::new().with_feed(feed), &[1]);
    let mut station = regatta.station();

    while notices.try_recv().is_ok() {}

    station.start_clock().expect("start");
    assert_eq!(notices.try_recv().ok().map(|n| n.table), Some(Table::Races));

    station.mark_now(TimingKind::Start, Some(1)).expect("mark");
    assert_eq!(notices.try_recv().ok().map(|n| n.table), Some(Table::Results));
    assert_eq!(notices.try_recv().ok().map(|n| n.table), Some(Table::Entries));

    station.mark_now(TimingKind::Finish, None).expect("pending");
    assert!(notices.try_recv().is_err(), "pending marks do not write");
}
