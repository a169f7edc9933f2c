//! Warning resolver: applies one [`ResolutionAction`] to a
//! warning. Each action is a value, not a string command, so the match
//! below is the entire closed dispatch surface.

use chrono::Utc;

use crate::aggregator;
use crate::config::DispatchConfig;
use crate::dispatch_store;
use crate::domain::assignment::{Assignee, GuideAssignment};
use crate::domain::booking::BookingStatus;
use crate::domain::dispatch_status::DispatchStatus;
use crate::domain::ids::{GuideId, OrganizationId, WarningId};
use crate::domain::warning::ResolutionAction;
use crate::error::{Error, Result};
use crate::pickup_sync;
use crate::store::{
    AssignmentRepository, BookingRepository, CustomerHistoryRepository, DispatchStatusRepository, EventSink, GuideRepository,
    PickupRepository,
};

pub async fn resolve_warning<R>(
    store: &R,
    config: &DispatchConfig,
    organization_id: OrganizationId,
    warning_id: WarningId,
    action: ResolutionAction,
) -> Result<DispatchStatus>
where
    R: BookingRepository + GuideRepository + AssignmentRepository + PickupRepository + DispatchStatusRepository + CustomerHistoryRepository + EventSink + ?Sized,
{
    let (date, _warning) = store.find_warning(organization_id, warning_id).await?;
    dispatch_store::assert_not_dispatched(store, organization_id, date, "resolveWarning").await?;

    match &action {
        ResolutionAction::AssignGuide { booking_id, tour_run_key, guide_id } => {
            assign_guide(store, organization_id, date, *booking_id, tour_run_key.as_deref(), *guide_id).await?;
        }
        ResolutionAction::AddExternal { tour_run_key, name, contact } => {
            add_external(store, organization_id, date, tour_run_key, name.clone(), contact.clone()).await?;
        }
        ResolutionAction::CancelTour { tour_run_key } => {
            cancel_tour(store, organization_id, date, tour_run_key, warning_id).await?;
        }
        ResolutionAction::SplitBooking(split) => {
            split_booking(store, organization_id, split).await?;
        }
        ResolutionAction::Acknowledge => {}
    }

    pickup_sync::sync_date(store, config, organization_id, date).await?;
    store
        .resolve_warning(organization_id, date, warning_id, Some(action))
        .await?;
    dispatch_store::refresh(store, organization_id, date).await
}

/// If the resolution targets a booking, assign only that booking; if it
/// targets a tour run, assign every unassigned booking in that run,
/// skipping bookings with an existing confirmed assignment.
async fn assign_guide<R>(
    store: &R,
    organization_id: OrganizationId,
    date: chrono::NaiveDate,
    booking_id: Option<crate::domain::ids::BookingId>,
    tour_run_key: Option<&str>,
    guide_id: GuideId,
) -> Result<()>
where
    R: BookingRepository + AssignmentRepository + CustomerHistoryRepository + ?Sized,
{
    let now = Utc::now();
    if let Some(booking_id) = booking_id {
        let booking = BookingRepository::get(store, organization_id, booking_id).await?;
        if booking.booking_date != date {
            return Err(Error::Validation {
                message: format!("booking {booking_id} does not belong to {date}"),
            });
        }
        AssignmentRepository::delete_for_booking(store, organization_id, booking_id).await?;
        store
            .upsert_confirmed(organization_id, GuideAssignment::new_confirmed(booking_id, Assignee::InternalGuide(guide_id), now))
            .await?;
        return Ok(());
    }

    let Some(key) = tour_run_key else {
        return Err(Error::Validation {
            message: "assign_guide resolution must target a booking or a tour run".into(),
        });
    };
    let runs = aggregator::tour_runs_for_date(store, organization_id, date).await?;
    let Some(run) = runs.iter().find(|r| r.key == key) else {
        return Err(Error::NotFound {
            entity: "tour_run",
            id: key.to_string(),
            organization_id: organization_id.as_uuid(),
        });
    };
    for booking_id in &run.bookings {
        if store.confirmed_for_booking(organization_id, *booking_id).await?.is_some() {
            continue;
        }
        store
            .upsert_confirmed(organization_id, GuideAssignment::new_confirmed(*booking_id, Assignee::InternalGuide(guide_id), now))
            .await?;
    }
    Ok(())
}

/// Creates `outsourcedGuideName`-bearing assignments on every unassigned
/// booking of the run. No-op if every booking is already assigned.
/// Also backs `addOutsourcedGuideToRun`.
pub async fn add_external<R>(
    store: &R,
    organization_id: OrganizationId,
    date: chrono::NaiveDate,
    tour_run_key: &str,
    name: String,
    contact: Option<String>,
) -> Result<()>
where
    R: BookingRepository + AssignmentRepository + CustomerHistoryRepository + ?Sized,
{
    if name.trim().is_empty() {
        return Err(Error::Validation {
            message: "outsourced guide name must not be empty".into(),
        });
    }
    let runs = aggregator::tour_runs_for_date(store, organization_id, date).await?;
    let Some(run) = runs.iter().find(|r| r.key == tour_run_key) else {
        return Err(Error::NotFound {
            entity: "tour_run",
            id: tour_run_key.to_string(),
            organization_id: organization_id.as_uuid(),
        });
    };
    let now = Utc::now();
    for booking_id in &run.bookings {
        if store.confirmed_for_booking(organization_id, *booking_id).await?.is_some() {
            continue;
        }
        let assignee = Assignee::External { name: name.clone(), contact: contact.clone() };
        store
            .upsert_confirmed(organization_id, GuideAssignment::new_confirmed(*booking_id, assignee, now))
            .await?;
    }
    Ok(())
}

/// Cancels every active booking in the run, cancels their assignments, and
/// surfaces a `tour_run.cancelled` intent to the event sink; refunds and
/// customer notifications are the external collaborator's job.
async fn cancel_tour<R>(
    store: &R,
    organization_id: OrganizationId,
    date: chrono::NaiveDate,
    tour_run_key: &str,
    warning_id: WarningId,
) -> Result<()>
where
    R: BookingRepository + AssignmentRepository + CustomerHistoryRepository + EventSink + ?Sized,
{
    let runs = aggregator::tour_runs_for_date(store, organization_id, date).await?;
    let Some(run) = runs.iter().find(|r| r.key == tour_run_key) else {
        return Err(Error::NotFound {
            entity: "tour_run",
            id: tour_run_key.to_string(),
            organization_id: organization_id.as_uuid(),
        });
    };
    for booking_id in &run.bookings {
        let booking = BookingRepository::get(store, organization_id, *booking_id).await?;
        if !booking.status.participates_in_dispatch() {
            continue;
        }
        store.set_status(organization_id, *booking_id, BookingStatus::Cancelled).await?;
        AssignmentRepository::delete_for_booking(store, organization_id, *booking_id).await?;
    }
    log::info!("tour run {tour_run_key} cancelled via warning {warning_id}");
    store.emit_tour_run_cancelled(organization_id, tour_run_key.to_string(), warning_id).await?;
    Ok(())
}

/// Requires `splits[].guestCount` to sum to the booking's total
/// participants; assigns the first split's guide to the existing booking.
/// Creating separate child bookings for the remaining splits is out of
/// scope; the first-guide assignment is still committed before that
/// error surfaces.
async fn split_booking<R>(store: &R, organization_id: OrganizationId, split: &crate::domain::warning::SplitConfig) -> Result<()>
where
    R: BookingRepository + AssignmentRepository + ?Sized,
{
    let booking = BookingRepository::get(store, organization_id, split.booking_id).await?;
    let total: u32 = split.splits.iter().map(|s| s.guest_count).sum();
    if total != booking.total_participants {
        return Err(Error::Validation {
            message: format!("split guest counts sum to {total}, expected {}", booking.total_participants),
        });
    }
    let Some(first) = split.splits.first() else {
        return Err(Error::Validation {
            message: "split_booking requires at least one split".into(),
        });
    };

    let now = Utc::now();
    AssignmentRepository::delete_for_booking(store, organization_id, split.booking_id).await?;
    store
        .upsert_confirmed(
            organization_id,
            GuideAssignment::new_confirmed(split.booking_id, Assignee::InternalGuide(first.guide_id), now),
        )
        .await?;

    if split.splits.len() > 1 {
        return Err(Error::Unimplemented {
            operation: "split_booking",
            limitation: "creating separate child bookings for splits beyond the first guide",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::booking::Booking;
    use crate::domain::guide::{Guide, GuideStatus};
    use crate::domain::ids::{BookingId, CustomerId, TourId};
    use crate::domain::tour::Tour;
    use crate::domain::warning::{SplitConfig, SplitShare, Warning, WarningType};
    use crate::store::memory::InMemoryStore;
    use chrono::NaiveDate;
    use std::collections::HashSet;

    fn tour(org: OrganizationId) -> Tour {
        Tour {
            id: TourId::new(),
            organization_id: org,
            name: "Harbor Walk".into(),
            duration_minutes: 240,
            guests_per_guide: 6,
        }
    }

    fn booking(org: OrganizationId, tour_id: TourId, date: NaiveDate, guests: u32) -> Booking {
        Booking {
            id: BookingId::new(),
            organization_id: org,
            tour_id,
            customer_id: CustomerId::new(),
            booking_date: date,
            booking_time: "09:00".into(),
            total_participants: guests,
            status: BookingStatus::Confirmed,
            pickup_zone_id: None,
            pickup_location: String::new(),
            pickup_time: None,
            experience_mode: None,
            created_at: Utc::now(),
        }
    }

    fn guide(org: OrganizationId, capacity: u32) -> Guide {
        Guide {
            id: GuideId::new(),
            organization_id: org,
            first_name: "A".into(),
            last_name: "B".into(),
            status: GuideStatus::Active,
            vehicle_capacity: capacity,
            languages: HashSet::new(),
            baseline_zone_id: None,
            phone: None,
            temporary_for_date: None,
        }
    }

    async fn seed_warning(store: &InMemoryStore, org: OrganizationId, date: NaiveDate, warning_type: WarningType, tour_run_key: Option<String>) -> WarningId {
        let mut status = store.get_or_create(org, date).await.unwrap();
        let id = WarningId::new();
        status.warnings.push(Warning {
            id,
            warning_type,
            tour_run_key,
            booking_id: None,
            message: "test".into(),
            resolutions: vec![],
            resolved: false,
            resolved_at: None,
            resolution: None,
        });
        store.save(org, status).await.unwrap();
        id
    }

    #[tokio::test]
    async fn assign_guide_fills_every_unassigned_booking_in_run() {
        let store = InMemoryStore::new();
        let org = OrganizationId::new();
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let t = tour(org);
        store.seed_tour(t.clone()).await;
        let b1 = booking(org, t.id, date, 2);
        let b2 = booking(org, t.id, date, 3);
        store.seed_booking(b1.clone()).await;
        store.seed_booking(b2.clone()).await;
        let g = guide(org, 6);
        store.seed_guide(g.clone()).await;

        let key = crate::time::tour_run_key(t.id, date, "09:00");
        let warning_id = seed_warning(&store, org, date, WarningType::InsufficientGuides, Some(key.clone())).await;

        let config = DispatchConfig::default();
        let status = resolve_warning(
            &store,
            &config,
            org,
            warning_id,
            ResolutionAction::AssignGuide { booking_id: None, tour_run_key: Some(key), guide_id: g.id },
        )
        .await
        .unwrap();

        assert!(status.warnings[0].resolved);
        assert!(store.confirmed_for_booking(org, b1.id).await.unwrap().is_some());
        assert!(store.confirmed_for_booking(org, b2.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn cancel_tour_marks_bookings_cancelled_and_emits_event() {
        let store = InMemoryStore::new();
        let org = OrganizationId::new();
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let t = tour(org);
        store.seed_tour(t.clone()).await;
        let b = booking(org, t.id, date, 2);
        store.seed_booking(b.clone()).await;

        let key = crate::time::tour_run_key(t.id, date, "09:00");
        let warning_id = seed_warning(&store, org, date, WarningType::NoAvailableGuide, Some(key.clone())).await;

        let config = DispatchConfig::default();
        resolve_warning(&store, &config, org, warning_id, ResolutionAction::CancelTour { tour_run_key: key })
            .await
            .unwrap();

        let updated = BookingRepository::get(&store, org, b.id).await.unwrap();
        assert_eq!(updated.status, BookingStatus::Cancelled);
        assert_eq!(store.emitted_events().await.len(), 1);
    }

    #[tokio::test]
    async fn split_booking_beyond_first_guide_is_unimplemented() {
        let store = InMemoryStore::new();
        let org = OrganizationId::new();
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let t = tour(org);
        store.seed_tour(t.clone()).await;
        let b = booking(org, t.id, date, 6);
        store.seed_booking(b.clone()).await;
        let g1 = guide(org, 6);
        let g2 = guide(org, 6);
        store.seed_guide(g1.clone()).await;
        store.seed_guide(g2.clone()).await;

        let warning_id = seed_warning(&store, org, date, WarningType::CapacityExceeded, None).await;
        let config = DispatchConfig::default();
        let err = resolve_warning(
            &store,
            &config,
            org,
            warning_id,
            ResolutionAction::SplitBooking(SplitConfig {
                booking_id: b.id,
                splits: vec![
                    SplitShare { guide_id: g1.id, guest_count: 3 },
                    SplitShare { guide_id: g2.id, guest_count: 3 },
                ],
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Unimplemented { .. }));
        // The first split's guide assignment is still committed.
        let assigned = store.confirmed_for_booking(org, b.id).await.unwrap().unwrap();
        assert_eq!(assigned.assignee, Assignee::InternalGuide(g1.id));
    }
}
