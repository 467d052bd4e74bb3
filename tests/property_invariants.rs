use std::sync::Arc;

use proptest::prelude::*;

use regatta_timing::{
    core::{clock::ManualClock, engine::TimingEngine, error::TimingError},
    event::TimingEvent,
    persist::{ResultStore, memory::MemoryStore},
    types::{BowNumber, EntryId, RaceKind, TimingKind},
};

const T0: i64 = 1_700_000_000_000;
const BOWS: [BowNumber; 5] = [1, 2, 3, 4, 99];

#[derive(Debug, Clone)]
enum Action {
    Mark { finish: bool, bow_idx: Option<u8>, dt: u16 },
    Assign { event_idx: u8, bow_idx: u8, dt: u16 },
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        (any::<bool>(), proptest::option::of(0u8..5), 0u16..5_000)
            .prop_map(|(finish, bow_idx, dt)| Action::Mark { finish, bow_idx, dt }),
        (0u8..16, 0u8..5, 0u16..5_000)
            .prop_map(|(event_idx, bow_idx, dt)| Action::Assign { event_idx, bow_idx, dt }),
    ]
}

fn setup() -> (MemoryStore, Vec<EntryId>, TimingEngine<MemoryStore>, ManualClock) {
    let store = MemoryStore::new();
    let race = store
        .register_race("Property head", RaceKind::HeadRace, None)
        .expect("race");
    let mut entries = Vec::new();
    for bow in &BOWS[..4] {
        let team = store.register_team(&format!("Crew {bow}"), None).expect("team");
        entries.push(store.register_entry(race, team, Some(*bow)).expect("entry"));
    }
    let clock = ManualClock::new(T0);
    let mut engine =
        TimingEngine::load(race, store.clone(), Arc::new(clock.clone())).expect("load");
    engine.start_clock().expect("start");
    (store, entries, engine, clock)
}

fn kind(finish: bool) -> TimingKind {
    if finish { TimingKind::Finish } else { TimingKind::Start }
}

proptest! {
    #[test]
    fn random_operator_sequences_keep_at_most_one_on_water_record(actions in prop::collection::vec(action_strategy(), 1..120)) {
        let (store, entries, mut engine, clock) = setup();

        for action in actions {
            let writes_before = store.write_count().expect("writes");
            let result = match action {
                Action::Mark { finish, bow_idx, dt } => {
                    let at = clock.advance(i64::from(dt));
                    engine
                        .mark_time(kind(finish), at, bow_idx.map(|i| BOWS[usize::from(i)]))
                        .map(|_| ())
                }
                Action::Assign { event_idx, bow_idx, dt } => {
                    clock.advance(i64::from(dt));
                    let ids: Vec<_> = engine.events().iter().map(TimingEvent::id).collect();
                    if ids.is_empty() {
                        continue;
                    }
                    let id = ids[usize::from(event_idx) % ids.len()];
                    engine.assign_bow_number(id, BOWS[usize::from(bow_idx)])
                }
            };

            if let Err(err) = &result {
                prop_assert!(err.is_operator_error(), "unexpected store error: {err}");
                prop_assert_eq!(store.write_count().expect("writes"), writes_before);
                if let TimingError::NotYetStarted(bow) = err {
                    let entry = entries[usize::try_from(*bow - 1).expect("known bow")];
                    prop_assert!(store.list_records_for_entry(entry).expect("records").is_empty());
                }
            }

            for entry in &entries {
                let records = store.list_records_for_entry(*entry).expect("records");
                let on_water = records.iter().filter(|r| r.is_on_water()).count();
                prop_assert!(on_water <= 1, "entry {entry} has {on_water} on-water records");
                prop_assert!(records.len() <= 1, "entry {entry} started twice");
                for rec in &records {
                    if let Some(elapsed) = rec.elapsed_ms() {
                        prop_assert!(elapsed >= 0);
                    }
                }
            }

            let mut captured: Vec<i64> = engine.events().iter().map(TimingEvent::captured_at).collect();
            let shown = captured.clone();
            captured.sort_by(|a, b| b.cmp(a));
            prop_assert_eq!(shown, captured);
        }
    }
}
