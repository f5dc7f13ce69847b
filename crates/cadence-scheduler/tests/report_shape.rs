// The report is printed by the CLI and consumed by scripts; keep its JSON
// shape stable.

use cadence_scheduler::{Frequency, NewTask, Orchestrator, Params, RunReport, SqliteStore, WorkOutcome};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

fn report_for_two_days() -> RunReport {
    let now = Utc.with_ymd_and_hms(2024, 1, 2, 6, 0, 0).unwrap();
    let store = SqliteStore::open_in_memory().unwrap().with_clock(move || now);
    store
        .register_task(NewTask::new("Rollup", Frequency::Daily).project_scoped())
        .unwrap();

    Orchestrator::with_store(&store)
        .run_task_for_projects("Rollup", 1, &[5], &Params::new(), |_, ctx| {
            if ctx.delta.get() == 2024010100 {
                WorkOutcome::Success(json!({"rows": 4}))
            } else {
                WorkOutcome::Failure(json!("lock held"))
            }
        })
        .unwrap()
}

#[test]
fn entries_are_tagged_and_ordered() {
    let value = serde_json::to_value(report_for_two_days()).unwrap();

    assert_eq!(value["task"], json!("Rollup"));
    assert!(value.get("scope_mismatch").is_none());
    assert_eq!(
        value["entries"],
        json!([
            {"delta": 2024010100, "project_id": 5, "outcome": "succeeded", "payload": {"rows": 4}},
            {"delta": 2024010200, "project_id": 5, "outcome": "failed", "payload": "lock held"},
        ])
    );
}

#[test]
fn run_id_is_a_uuid() {
    let report = report_for_two_days();
    assert!(uuid::Uuid::parse_str(&report.run_id).is_ok());
}

#[test]
fn report_survives_a_json_round_trip() {
    let report = report_for_two_days();
    let text = serde_json::to_string_pretty(&report).unwrap();
    let back: RunReport = serde_json::from_str(&text).unwrap();
    assert_eq!(back, report);
}

#[test]
fn legacy_status_map_keys_by_delta_and_project() {
    let map = report_for_two_days().to_status_map();
    assert_eq!(
        Value::Object(map),
        json!({"2024010100:5": {"rows": 4}, "2024010200:5": "lock held"})
    );
}
