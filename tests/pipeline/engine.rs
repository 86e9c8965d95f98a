use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use crate::support::{
    helpers::{
        backfill_load, base_config, encounter_published, ids, init_tracing, load, medication_request_published,
        medication_statement, observation, patient_published, procedure, publish,
        publish_with, utc, Harness,
    },
    memory::PublishedBatch,
};
use anyhow::Result;
use chrono::{Duration as ChronoDuration, NaiveTime};
use refetch::{
    AvailabilityWindow, DateRange, EngineError, RequestKey, ResourceType, Trigger,
};
use serde_json::json;

fn patient_observations() -> Vec<serde_json::Value> {
    vec![
        observation("obs-1", "123", "laboratory", "2024-01-05T10:00:00Z"),
        observation("obs-2", "123", "vital-signs", "2024-01-06T10:00:00Z"),
        observation("obs-3", "123", "laboratory", "2024-01-07T10:00:00Z"),
        observation("obs-4", "123", "social-history", "2024-01-07T10:00:00Z"),
        observation("obs-5", "456", "laboratory", "2024-01-07T10:00:00Z"),
    ]
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn patient_publishes_collapse_to_one_fetch() -> Result<()> {
    init_tracing();
    let harness = Harness::new(patient_observations());
    let engine = harness.observation_engine(base_config().build()?)?;
    let events = vec![
        patient_published("run-1", "tenant-123", "123"),
        patient_published("run-1", "tenant-123", "123"),
    ];

    let resolution = engine.resolve(&events).await?;

    assert_eq!(resolution.distinct_keys(), 1);
    assert_eq!(harness.client.calls(), vec!["search:subject:123".to_string()]);

    let expected = RequestKey::new(
        "run-1",
        ResourceType::new("Patient"),
        "tenant-123",
        "123",
        None,
    );
    for index in 0..events.len() {
        let results = resolution.results_for_event(index);
        assert_eq!(results.len(), 1, "event {index} should map to one key");
        let (target, key, resources) = results[0];
        assert_eq!(target.as_str(), "Observation");
        assert_eq!(key, &expected);
        assert_eq!(ids(resources), vec!["obs-1", "obs-2", "obs-3"]);
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn processed_batch_publishes_each_observation_once() -> Result<()> {
    init_tracing();
    let harness = Harness::new(patient_observations());
    let engine = harness.observation_engine(base_config().build()?)?;
    let events = vec![
        patient_published("run-1", "tenant-123", "123"),
        patient_published("run-2", "tenant-123", "123"),
    ];

    let report = engine.process(&events).await?;

    assert!(report.is_clean(), "unexpected failures: {report}");
    assert_eq!(report.published_count, 3);
    assert_eq!(report.skipped_events, 0);
    // Keys from different runs differ but share one batch call for the same id.
    assert_eq!(harness.client.calls(), vec!["search:subject:123".to_string()]);
    assert_eq!(
        harness.sink.batches(),
        vec![PublishedBatch {
            tenant: "tenant-123".to_string(),
            trigger: Trigger::Nightly,
            ids: vec!["obs-1".into(), "obs-2".into(), "obs-3".into()],
        }]
    );

    let snapshot = engine.telemetry().snapshot();
    assert_eq!(snapshot.events, 2);
    assert_eq!(snapshot.keys, 2);
    assert_eq!(snapshot.fetch_calls, 1);
    assert_eq!(snapshot.published, 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transform_failure_is_isolated_to_one_resource() -> Result<()> {
    init_tracing();
    let harness = Harness::new(patient_observations());
    harness.transform.fail_for("obs-2");
    let engine = harness.observation_engine(base_config().build()?)?;

    let report = engine
        .process(&[patient_published("run-1", "tenant-123", "123")])
        .await?;

    assert_eq!(report.transform_failures, vec!["obs-2".to_string()]);
    assert_eq!(report.published_count, 2);
    assert!(report.publish_failures.is_empty());
    assert_eq!(harness.sink.published_ids(), vec!["obs-1", "obs-3"]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rejected_publish_reports_every_attempted_id() -> Result<()> {
    init_tracing();
    let harness = Harness::new(patient_observations());
    harness.sink.reject_all();
    let engine = harness.observation_engine(base_config().build()?)?;

    let report = engine
        .process(&[patient_published("run-1", "tenant-123", "123")])
        .await?;

    assert_eq!(report.published_count, 0);
    assert_eq!(
        report.publish_failures,
        vec!["obs-1".to_string(), "obs-2".to_string(), "obs-3".to_string()]
    );
    assert!(report.transform_failures.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_fetch_only_fails_its_own_keys() -> Result<()> {
    init_tracing();
    let harness = Harness::new(patient_observations());
    harness.client.fail_for("bad");
    let engine = harness.observation_engine(base_config().build()?)?;
    let events = vec![
        patient_published("run-1", "tenant-a", "bad"),
        patient_published("run-1", "tenant-b", "123"),
    ];

    let report = engine.process(&events).await?;

    assert_eq!(report.fetch_failures.len(), 1);
    let failure = &report.fetch_failures[0];
    assert_eq!(failure.key.tenant(), "tenant-a");
    assert_eq!(failure.key.resource_id(), "bad");
    assert!(
        failure.error.contains("downstream unavailable for bad"),
        "unexpected error: {}",
        failure.error
    );
    assert_eq!(report.published_count, 3);

    let attempts = harness
        .client
        .calls()
        .into_iter()
        .filter(|call| call == "search:subject:bad")
        .count();
    assert_eq!(attempts, 2, "failing call should be retried once");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transient_failure_is_retried() -> Result<()> {
    init_tracing();
    let harness = Harness::new(patient_observations());
    harness.client.fail_next(1);
    let engine = harness.observation_engine(base_config().build()?)?;

    let report = engine
        .process(&[patient_published("run-1", "tenant-123", "123")])
        .await?;

    assert!(report.fetch_failures.is_empty());
    assert_eq!(report.published_count, 3);
    assert_eq!(harness.client.calls().len(), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn backfill_window_is_fetched_in_sub_ranges() -> Result<()> {
    init_tracing();
    let harness = Harness::new(vec![
        observation("obs-jan", "123", "laboratory", "2024-01-10T08:00:00Z"),
        observation("obs-feb", "123", "laboratory", "2024-02-10T08:00:00Z"),
        observation("obs-apr", "123", "laboratory", "2024-04-01T08:00:00Z"),
    ]);
    let engine = harness.observation_engine(base_config().max_backfill_days(30).build()?)?;
    let window = DateRange::new(utc(1, 1, 0), utc(3, 1, 0));
    let event = publish_with(
        "run-1",
        "tenant-123",
        "Patient",
        json!({ "resourceType": "Patient", "id": "123" }),
        Trigger::Backfill,
        Some(window),
    );

    let resolution = engine.resolve(std::slice::from_ref(&event)).await?;

    assert_eq!(
        harness.client.calls(),
        vec![
            "search:subject:123:windowed".to_string(),
            "search:subject:123:windowed".to_string(),
        ]
    );
    let results = resolution.results_for_event(0);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].1.date_range(), Some(&window));
    assert_eq!(ids(results[0].2), vec!["obs-jan", "obs-feb"]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn backfill_load_by_id_is_fetched_once() -> Result<()> {
    init_tracing();
    let harness = Harness::new(vec![procedure("p1", "123")]);
    let engine = harness.full_engine(base_config().max_backfill_days(30).build()?)?;
    let window = DateRange::new(utc(1, 1, 0), utc(4, 1, 0));
    let event = backfill_load("run-1", "tenant-123", "Procedure", "p1", window);

    let resolution = engine.resolve(std::slice::from_ref(&event)).await?;

    assert_eq!(harness.client.calls(), vec!["get_by_id:p1".to_string()]);
    let results = resolution.results_for_event(0);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0.as_str(), "Procedure");
    assert_eq!(results[0].1.date_range(), Some(&window));
    assert_eq!(ids(results[0].2), vec!["p1"]);

    let report = engine.process(std::slice::from_ref(&event)).await?;
    assert_eq!(report.published_count, 1);
    assert_eq!(harness.sink.published_ids(), vec!["p1".to_string()]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn resource_on_a_sub_range_cut_is_returned_once() -> Result<()> {
    init_tracing();
    let harness = Harness::new(vec![
        observation("o-edge", "123", "laboratory", "2024-01-08T00:00:00Z"),
        observation("o-late", "123", "laboratory", "2024-01-19T12:00:00Z"),
    ]);
    let engine = harness.observation_engine(base_config().max_backfill_days(7).build()?)?;
    let window = DateRange::new(utc(1, 1, 0), utc(1, 20, 0));
    let event = publish_with(
        "run-1",
        "tenant-123",
        "Patient",
        json!({ "resourceType": "Patient", "id": "123" }),
        Trigger::Backfill,
        Some(window),
    );

    let resolution = engine.resolve(std::slice::from_ref(&event)).await?;

    assert_eq!(harness.client.calls().len(), 3);
    let results = resolution.results_for_event(0);
    assert_eq!(results.len(), 1);
    assert_eq!(ids(results[0].2), vec!["o-edge", "o-late"]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reversed_backfill_window_fails_only_that_key() -> Result<()> {
    init_tracing();
    let harness = Harness::new(patient_observations());
    let engine = harness.observation_engine(base_config().build()?)?;
    let reversed = publish_with(
        "run-1",
        "tenant-123",
        "Patient",
        json!({ "resourceType": "Patient", "id": "456" }),
        Trigger::Backfill,
        Some(DateRange::new(utc(3, 1, 0), utc(1, 1, 0))),
    );
    let events = vec![reversed, patient_published("run-1", "tenant-123", "123")];

    let report = engine.process(&events).await?;

    assert_eq!(report.fetch_failures.len(), 1);
    assert_eq!(report.fetch_failures[0].key.resource_id(), "456");
    assert!(report.fetch_failures[0].error.contains("starts after it ends"));
    assert_eq!(report.published_count, 3);
    assert_eq!(harness.client.calls(), vec!["search:subject:123".to_string()]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn batch_timeout_abandons_outstanding_fetches() -> Result<()> {
    init_tracing();
    let harness = Harness::new(patient_observations());
    harness.client.delay_responses(Duration::from_secs(5));
    let engine = harness.observation_engine(
        base_config()
            .batch_timeout(Duration::from_millis(100))
            .build()?,
    )?;

    let started = Instant::now();
    let report = engine
        .process(&[patient_published("run-1", "tenant-123", "123")])
        .await?;

    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(report.abandoned_keys.len(), 1);
    assert_eq!(report.abandoned_keys[0].resource_id(), "123");
    assert_eq!(report.published_count, 0);
    assert!(report.fetch_failures.is_empty());
    assert!(harness.sink.batches().is_empty());
    assert_eq!(engine.telemetry().in_flight_calls(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn event_without_tenant_rejects_the_batch() -> Result<()> {
    init_tracing();
    let harness = Harness::new(patient_observations());
    let engine = harness.observation_engine(base_config().build()?)?;
    let events = vec![
        patient_published("run-1", "tenant-123", "123"),
        patient_published("run-1", "  ", "123"),
    ];

    match engine.process(&events).await {
        Err(EngineError::MalformedEvent { index, reason }) => {
            assert_eq!(index, 1);
            assert!(reason.contains("tenant"));
        }
        other => panic!("expected a malformed event error, got {other:?}"),
    }
    assert!(harness.client.calls().is_empty());
    assert!(harness.sink.batches().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unrelated_events_are_skipped() -> Result<()> {
    init_tracing();
    let harness = Harness::new(patient_observations());
    let engine = harness.observation_engine(base_config().build()?)?;
    let events = vec![
        load("run-1", "tenant-123", "Observation", "obs-4"),
        publish(
            "run-1",
            "tenant-123",
            "Organization",
            json!({ "resourceType": "Organization", "id": "org-1" }),
        ),
        load("run-1", "tenant-123", "Procedure", "pr-1"),
    ];

    let report = engine.process(&events).await?;

    assert_eq!(report.skipped_events, 2);
    assert_eq!(report.published_count, 1);
    assert_eq!(harness.client.calls(), vec!["get_by_ids:obs-4".to_string()]);
    assert_eq!(
        harness.sink.batches(),
        vec![PublishedBatch {
            tenant: "tenant-123".to_string(),
            trigger: Trigger::AdHoc,
            ids: vec!["obs-4".into()],
        }]
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn strategies_fan_in_and_fan_out_across_types() -> Result<()> {
    init_tracing();
    let harness = Harness::new(vec![
        procedure("pr-1", "123"),
        procedure("pr-2", "123"),
        medication_statement("ms-1", &["mr-1", "mr-2"]),
        medication_statement("ms-2", &["mr-2"]),
    ]);
    let engine = harness.full_engine(base_config().build()?)?;
    let events = vec![
        encounter_published(
            "run-1",
            "tenant-123",
            "enc-1",
            &["Procedure/pr-1", "Procedure/pr-2", "Condition/c-1", "Procedure/pr-1"],
        ),
        medication_request_published("run-1", "tenant-123", "mr-1"),
        medication_request_published("run-1", "tenant-123", "mr-2"),
    ];

    let resolution = engine.resolve(&events).await?;

    let calls: BTreeSet<String> = harness.client.calls().into_iter().collect();
    assert_eq!(
        calls,
        BTreeSet::from([
            "get_by_ids:pr-1,pr-2".to_string(),
            "search:basedOn:mr-1,mr-2".to_string(),
        ])
    );

    let encounter = resolution.results_for_event(0);
    let mut procedures: Vec<&str> = encounter
        .iter()
        .flat_map(|(_, _, resources)| ids(resources))
        .collect();
    procedures.sort_unstable();
    assert_eq!(procedures, vec!["pr-1", "pr-2"]);

    let first_request = resolution.results_for_event(1);
    assert_eq!(first_request.len(), 1);
    assert_eq!(ids(first_request[0].2), vec!["ms-1"]);

    let second_request = resolution.results_for_event(2);
    assert_eq!(second_request.len(), 1);
    assert_eq!(ids(second_request[0].2), vec!["ms-1", "ms-2"]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shared_statement_is_published_once() -> Result<()> {
    init_tracing();
    let harness = Harness::new(vec![
        medication_statement("ms-1", &["mr-1", "mr-2"]),
        medication_statement("ms-2", &["mr-2"]),
    ]);
    let engine = harness.full_engine(base_config().build()?)?;
    let events = vec![
        medication_request_published("run-1", "tenant-123", "mr-1"),
        medication_request_published("run-1", "tenant-123", "mr-2"),
    ];

    let report = engine.process(&events).await?;

    assert_eq!(report.published_count, 2);
    assert_eq!(harness.transform.calls(), 2);
    let mut published = harness.sink.published_ids();
    published.sort();
    assert_eq!(published, vec!["ms-1", "ms-2"]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dag_registration_covers_every_strategy() -> Result<()> {
    init_tracing();
    let harness = Harness::new(Vec::new());
    let engine = harness.full_engine(base_config().build()?)?;

    let result = engine.register_dags().await;

    assert_eq!(result.successful.len(), 3);
    assert!(result.failed.is_empty());
    let pushed = harness.completeness.pushed();
    assert_eq!(pushed.len(), 3);
    assert!(pushed.iter().all(|(topic, _)| topic == "completeness.dag"));
    let procedure = pushed
        .iter()
        .map(|(_, declaration)| declaration)
        .find(|declaration| declaration.resource_type.as_str() == "Procedure")
        .expect("procedure declaration");
    assert_eq!(
        procedure.consumed_resource_types,
        BTreeSet::from([ResourceType::new("Encounter"), ResourceType::new("Patient")])
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dag_registration_respects_flag_and_swallows_errors() -> Result<()> {
    init_tracing();
    let disabled = Harness::new(Vec::new());
    let engine = disabled.full_engine(base_config().dag_registration_enabled(false).build()?)?;
    let result = engine.register_dags().await;
    assert!(result.is_empty());
    assert!(disabled.completeness.pushed().is_empty());

    let failing = Harness::new(Vec::new());
    failing.completeness.fail_all();
    let engine = failing.full_engine(base_config().build()?)?;
    let result = engine.register_dags().await;
    assert!(result.successful.is_empty());
    assert_eq!(result.failed.len(), 3);
    assert!(result
        .failed
        .iter()
        .all(|failure| failure.error.contains("unreachable")));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn tenant_runs_once_per_night_window() -> Result<()> {
    init_tracing();
    let harness = Harness::new(Vec::new());
    harness.store.set_window(
        "tenant-a",
        AvailabilityWindow::new(
            NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
        ),
    );
    let engine = harness.observation_engine(base_config().build()?)?;
    let early = utc(1, 10, 5);

    assert!(engine.should_run("tenant-a", early).await?);
    assert_eq!(harness.store.marker("tenant-a"), Some(early));
    assert!(
        !engine
            .should_run("tenant-a", early + ChronoDuration::minutes(30))
            .await?
    );
    assert!(!engine.should_run("tenant-a", utc(1, 10, 12)).await?);
    assert!(engine.should_run("tenant-without-window", utc(1, 10, 12)).await?);
    Ok(())
}
