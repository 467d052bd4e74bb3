use regatta_timing::{
    model::{RaceResultRow, TimingRecord},
    results::projector::{ResultsBoard, format_race_time, project},
    types::{EntryStatus, RecordStatus},
};

const T0: i64 = 1_700_000_000_000;

fn row(record_id: u64, entry_id: u64, bow: u32, start: Option<i64>, end: Option<i64>) -> RaceResultRow {
    RaceResultRow {
        record: TimingRecord {
            id: record_id,
            entry_id,
            start_time: start,
            end_time: end,
            adjustment_ms: None,
            status: Some(if end.is_some() {
                RecordStatus::Finished
            } else {
                RecordStatus::OnWater
            }),
        },
        bow_number: Some(bow),
        team_name: format!("Crew {bow}"),
        entry_status: if end.is_some() {
            EntryStatus::Finished
        } else {
            EntryStatus::OnWater
        },
    }
}

#[test]
fn faster_elapsed_ranks_first_regardless_of_finish_order() {
    let rows = vec![
        row(10, 1, 1, Some(T0), Some(T0 + 65_000)),
        row(11, 2, 2, Some(T0 + 5_000), Some(T0 + 50_000)),
    ];

    let ranked = project(&rows);
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].bow_number, Some(2));
    assert_eq!(ranked[0].rank, 1);
    assert_eq!(ranked[0].elapsed_ms, 45_000);
    assert_eq!(ranked[1].bow_number, Some(1));
    assert_eq!(ranked[1].rank, 2);
    assert_eq!(ranked[1].elapsed_ms, 65_000);
    assert_eq!(ranked[1].race_time(), "1:05.00");
}

#[test]
fn ties_are_broken_by_entry_id() {
    let rows = vec![
        row(20, 9, 3, Some(T0 + 1_000), Some(T0 + 61_000)),
        row(21, 4, 7, Some(T0), Some(T0 + 60_000)),
    ];

    let ranked = project(&rows);
    let order: Vec<_> = ranked.iter().map(|r| (r.rank, r.entry_id)).collect();
    assert_eq!(order, vec![(1, 4), (2, 9)]);
}

#[test]
fn incomplete_records_are_not_ranked() {
    let rows = vec![
        row(1, 1, 1, Some(T0), None),
        row(2, 2, 2, None, Some(T0 + 10_000)),
        row(3, 3, 3, Some(T0), Some(T0 + 70_000)),
    ];

    let ranked = project(&rows);
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].record_id, 3);
    assert_eq!(ranked[0].rank, 1);
}

#[test]
fn disqualified_entries_drop_out_of_the_ranking() {
    let mut dsq = row(1, 1, 1, Some(T0), Some(T0 + 40_000));
    dsq.entry_status = EntryStatus::Dsq;
    let rows = vec![dsq, row(2, 2, 2, Some(T0), Some(T0 + 55_000))];

    let ranked = project(&rows);
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].entry_id, 2);
    assert_eq!(ranked[0].rank, 1);
}

#[test]
fn adjustment_is_passed_through_untouched() {
    let mut adjusted = row(1, 1, 1, Some(T0), Some(T0 + 30_000));
    adjusted.record.adjustment_ms = Some(5_000);

    let ranked = project(&[adjusted]);
    assert_eq!(ranked[0].elapsed_ms, 30_000);
    assert_eq!(ranked[0].adjustment_ms, Some(5_000));
}

#[test]
fn race_time_formats_minutes_and_centiseconds() {
    assert_eq!(format_race_time(0), "0.00");
    assert_eq!(format_race_time(9_876), "9.87");
    assert_eq!(format_race_time(59_990), "59.99");
    assert_eq!(format_race_time(60_000), "1:00.00");
    assert_eq!(format_race_time(1_247_500), "20:47.50");
    assert_eq!(format_race_time(-5), "0.00");
}

#[test]
fn board_reports_changes_only_when_ranking_moves() {
    let mut board = ResultsBoard::new();
    assert!(board.leader().is_none());
    assert!(!board.refresh(&[]));

    let mut rows = vec![row(1, 1, 1, Some(T0), None)];
    assert!(!board.refresh(&rows), "an on-water boat is not a result");

    rows[0] = row(1, 1, 1, Some(T0), Some(T0 + 80_000));
    assert!(board.refresh(&rows));
    assert_eq!(board.leader().map(|r| r.bow_number), Some(Some(1)));
    assert!(!board.refresh(&rows));

    rows.push(row(2, 2, 2, Some(T0 + 10_000), Some(T0 + 70_000)));
    assert!(board.refresh(&rows));
    assert_eq!(board.leader().map(|r| r.entry_id), Some(2));
    assert_eq!(board.ranked().len(), 2);
}
