//! End-to-end coverage of the public operations against a fixture loaded
//! from disk, exercising the same path the CLI binary does.

use chrono::NaiveDate;
use tour_dispatch_core::config::DispatchConfig;
use tour_dispatch_core::core::DispatchCore;
use tour_dispatch_core::domain::dispatch_status::DispatchState;
use tour_dispatch_core::domain::ids::{BookingId, GuideId};
use tour_dispatch_core::error::Error;
use tour_dispatch_core::fixtures;

const FIXTURE_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/sunrise_harbor_day.json");

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 8, 3).unwrap()
}

const NADIA: &str = "93f20c13-71d2-409c-bff3-252b18a1252f";
const THEO: &str = "69084745-df99-4ef1-8cbd-9a323b4d2db2";
const DOCK_BOOKING_B: &str = "b36c18f2-1e70-4cf9-8ef4-df335ddc9ff6";
const HILL_BOOKING: &str = "5fbfba2f-4899-4302-8503-d0ab565f8308";

async fn load() -> (DispatchCore<tour_dispatch_core::store::memory::InMemoryStore>, tour_dispatch_core::domain::ids::OrganizationId) {
    let fixture = fixtures::parse_fixture_file(FIXTURE_PATH).expect("fixture parses");
    let (store, organization_id) = fixtures::load_into_store(&fixture).await.expect("fixture loads");
    (DispatchCore::new(store, DispatchConfig::default()), organization_id)
}

#[tokio::test]
async fn tour_runs_group_the_two_harbor_bookings() {
    let (core, org) = load().await;
    let runs = core.get_tour_runs(org, date()).await.unwrap();
    assert_eq!(runs.len(), 2);
    let harbor_run = runs.iter().find(|r| r.total_guests == 7).unwrap();
    assert_eq!(harbor_run.bookings.len(), 2);
    assert_eq!(harbor_run.guides_needed, 2);
}

#[tokio::test]
async fn optimize_assigns_qualified_guides_and_dispatch_freezes_the_day() {
    let (core, org) = load().await;

    let result = core.optimize(org, date()).await.unwrap();
    assert_eq!(result.assignments.len(), 3);
    assert!(result.warnings.is_empty(), "unexpected warnings: {:?}", result.warnings.iter().map(|w| &w.message).collect::<Vec<_>>());

    let status = core.get_dispatch_status(org, date()).await.unwrap();
    assert_eq!(status.status, DispatchState::Ready);

    let timelines = core.get_guide_timelines(org, date()).await.unwrap();
    assert_eq!(timelines.len(), 2);
    assert!(timelines.iter().all(|t| t.utilization <= 100));

    let dispatched = core.dispatch(org, date(), "ops-lead").await.unwrap();
    assert_eq!(dispatched.status.status, DispatchState::Dispatched);

    let guide_id = GuideId::from_uuid(uuid::Uuid::parse_str(THEO).unwrap());
    let booking_id = BookingId::from_uuid(uuid::Uuid::parse_str(HILL_BOOKING).unwrap());
    let err = core.manual_assign(org, date(), booking_id, guide_id).await.unwrap_err();
    assert!(matches!(err, Error::DispatchFrozen { .. }));
}

#[tokio::test]
async fn manual_assign_then_unassign_round_trips() {
    let (core, org) = load().await;
    let guide_id = GuideId::from_uuid(uuid::Uuid::parse_str(NADIA).unwrap());
    let booking_id = BookingId::from_uuid(uuid::Uuid::parse_str(DOCK_BOOKING_B).unwrap());

    core.manual_assign(org, date(), booking_id, guide_id).await.unwrap();
    let runs = core.get_tour_runs(org, date()).await.unwrap();
    let harbor_run = runs.iter().find(|r| r.bookings.contains(&booking_id)).unwrap();
    assert_eq!(harbor_run.guides_assigned, 1);

    core.unassign(org, date(), booking_id).await.unwrap();
    let runs = core.get_tour_runs(org, date()).await.unwrap();
    let harbor_run = runs.iter().find(|r| r.bookings.contains(&booking_id)).unwrap();
    assert_eq!(harbor_run.guides_assigned, 0);
}

#[tokio::test]
async fn optimize_over_a_clean_fixture_reaches_ready_with_no_warnings() {
    let (core, org) = load().await;
    core.optimize(org, date()).await.unwrap();
    let status = core.get_dispatch_status(org, date()).await.unwrap();
    assert!(status.warnings.is_empty());
    assert_eq!(status.status, DispatchState::Ready);
}
