//! Retry, recovery, and backlog re-drive scenarios.

mod common;

use std::sync::Arc;

use catalog_autoreg::domain::error::RegistrationError;
use catalog_autoreg::domain::failure::FailureRecord;
use catalog_autoreg::domain::registration::RegistrationRequest;
use common::*;
use rust_decimal_macros::dec;

fn notebook_request() -> RegistrationRequest {
    RegistrationRequest::new("NOTEBOOK DELL INSPIRON 15", "84713012", dec!(2500.00))
}

#[tokio::test]
async fn session_recovery_lets_a_later_attempt_succeed() {
    let main = FakePage::inline_form("ignored");
    main.set_save_behavior(SaveBehavior::ShowError("instabilidade".into()));
    main.fix_on_navigate(SaveBehavior::ConfirmWithCode("100444".into()));
    let h = harness(main.clone()).await;

    let response = h.pipeline.process(notebook_request()).await;

    assert!(response.success, "expected recovery then success, got: {}", response.message);
    assert_eq!(response.generated_code.as_deref(), Some("100444"));
    assert_eq!(response.attempt_number, 2);
    let stats = h.pipeline.stats().await;
    assert_eq!(stats.recoveries, 1);
    assert!(h.backlog.all().await.unwrap().is_empty());
}

#[tokio::test]
async fn parked_request_recovers_on_redrive() {
    let main = FakePage::inline_form("ignored");
    main.set_save_behavior(SaveBehavior::ShowError("fora do ar".into()));
    let h = harness(main.clone()).await;

    let request = notebook_request();
    let request_id = request.request_id.clone();
    let failed = h.pipeline.process(request).await;
    assert!(!failed.success);
    assert_eq!(h.backlog.all().await.unwrap().len(), 1);

    // the target application comes back
    main.clear_error();
    main.set_save_behavior(SaveBehavior::ConfirmWithCode("100999".into()));

    let recovered = h.pipeline.redrive_backlog().await.unwrap();
    assert_eq!(recovered, 1);
    assert!(h.backlog.all().await.unwrap().is_empty());

    let entries = h.catalog.all().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].generated_code, "100999");
    // the original correlation id is preserved across the re-drive
    let parked_again = h.backlog.all().await.unwrap();
    assert!(!parked_again.iter().any(|r| r.request.request_id == request_id));
}

#[tokio::test]
async fn redrive_drops_records_past_their_attempt_cap() {
    let main = FakePage::inline_form("100123");
    let h = harness(main.clone()).await;

    let mut request = notebook_request();
    request.attempts = 99;
    let record =
        FailureRecord::new(request, &RegistrationError::SaveFailed("old".into()), 99);
    h.backlog.enqueue(record).await.unwrap();

    let recovered = h.pipeline.redrive_backlog().await.unwrap();
    assert_eq!(recovered, 0);
    assert!(h.backlog.all().await.unwrap().is_empty(), "capped record must be dropped");
    assert!(h.catalog.all().await.is_empty(), "capped record must not be retried");
}

#[tokio::test]
async fn redrive_reparks_requests_that_fail_again() {
    let main = FakePage::inline_form("ignored");
    main.set_save_behavior(SaveBehavior::ShowError("ainda fora do ar".into()));
    let h = harness(main.clone()).await;

    let failed = h.pipeline.process(notebook_request()).await;
    assert!(!failed.success);

    let recovered = h.pipeline.redrive_backlog().await.unwrap();
    assert_eq!(recovered, 0);
    let parked = h.backlog.all().await.unwrap();
    assert_eq!(parked.len(), 1, "still exactly one record after a failed re-drive");
    assert!(parked[0].attempts > 3, "attempt count accumulates across re-drives");
}

#[tokio::test]
async fn session_acquisition_failure_parks_the_request() {
    let h = harness_with_sessions(Arc::new(RefusingSessions)).await;

    let response = h.pipeline.process(notebook_request()).await;

    assert!(!response.success);
    assert_eq!(h.backlog.all().await.unwrap().len(), 1);
}
