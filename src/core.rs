//! The public operations the dispatch core exposes. Each
//! method here is the boundary a web handler or the CLI calls; none of
//! them assume a particular transport or a particular caller beyond the
//! `organization_id` tenant scope every entry point requires.

use chrono::NaiveDate;

use crate::aggregator;
use crate::batch::{self, BatchApplyResult, Change};
use crate::config::DispatchConfig;
use crate::dispatch_store;
use crate::domain::assignment::Assignee;
use crate::domain::dispatch_status::{DispatchState, DispatchStatus};
use crate::domain::guide::{AvailabilityWindow, Guide};
use crate::domain::ids::{BookingId, GuideId, OrganizationId, WarningId};
use crate::domain::tour_run::TourRun;
use crate::domain::warning::ResolutionAction;
use crate::error::{Error, Result};
use crate::optimizer::{self, OptimizationResult};
use crate::pickup_sync;
use crate::resolver;
use crate::store::{AssignmentRepository, BookingRepository, Store};
use crate::time;

/// One guide as `getAvailableGuides(date)` reports it: the resolved
/// availability window (component C3) plus how many runs the guide is
/// already carrying on this date, so a caller can see load without a
/// second round trip.
#[derive(Debug, Clone)]
pub struct AvailableGuide {
    pub guide: Guide,
    pub availability: AvailabilityWindow,
    pub assigned_run_count: u32,
}

#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub status: DispatchStatus,
}

/// Generic over any [`Store`] implementation: the in-memory one in
/// [`crate::store::memory`] for the CLI and tests, a SQL-backed one in a
/// real deployment.
pub struct DispatchCore<R> {
    store: R,
    config: DispatchConfig,
}

impl<R: Store> DispatchCore<R> {
    pub fn new(store: R, config: DispatchConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &R {
        &self.store
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub async fn get_dispatch_status(&self, organization_id: OrganizationId, date: NaiveDate) -> Result<DispatchStatus> {
        dispatch_store::refresh(&self.store, organization_id, date).await
    }

    pub async fn get_tour_runs(&self, organization_id: OrganizationId, date: NaiveDate) -> Result<Vec<TourRun>> {
        aggregator::tour_runs_for_date(&self.store, organization_id, date).await
    }

    pub async fn get_available_guides(&self, organization_id: OrganizationId, date: NaiveDate) -> Result<Vec<AvailableGuide>> {
        let guides = self.store.list_active_for_date(organization_id, date).await?;
        let guide_ids: Vec<GuideId> = guides.iter().map(|g| g.id).collect();
        let mut availability = crate::availability::resolve_batch(&self.store, organization_id, &guide_ids, date).await;
        let confirmed = self.store.confirmed_for_date(organization_id, date).await?;

        let mut out = Vec::with_capacity(guides.len());
        for guide in guides {
            let window = availability.remove(&guide.id).unwrap_or_else(AvailabilityWindow::unavailable);
            let assigned_run_count = confirmed
                .iter()
                .filter(|a| a.assignee.as_guide_id() == Some(guide.id))
                .count() as u32;
            out.push(AvailableGuide {
                guide,
                availability: window,
                assigned_run_count,
            });
        }
        out.sort_by(|a, b| a.guide.id.cmp(&b.guide.id));
        Ok(out)
    }

    pub async fn get_guide_timelines(&self, organization_id: OrganizationId, date: NaiveDate) -> Result<Vec<crate::timeline::GuideTimeline>> {
        crate::timeline::guide_timelines_for_date(&self.store, organization_id, date).await
    }

    pub async fn optimize(&self, organization_id: OrganizationId, date: NaiveDate) -> Result<OptimizationResult> {
        optimizer::optimize(&self.store, &self.config, organization_id, date).await
    }

    /// A single-booking convenience wrapper over the batch engine
    /// (`manualAssign`): runs the same simulate-then-validate-then-apply
    /// pipeline as `batchApplyChanges` for consistency, just with one
    /// change in the list.
    pub async fn manual_assign(&self, organization_id: OrganizationId, date: NaiveDate, booking_id: BookingId, guide_id: GuideId) -> Result<DispatchStatus> {
        batch::apply_batch(&self.store, &self.config, organization_id, date, vec![Change::Assign { booking_id, to_guide_id: guide_id }]).await?;
        dispatch_store::refresh(&self.store, organization_id, date).await
    }

    /// Removes the booking's confirmed assignment, whoever it is assigned
    /// to. Internal-guide removals reuse the batch engine (so the same
    /// ordering/validation discipline applies); outsourced assignments have
    /// no `GuideId` the batch engine's `Unassign` change can name, so those
    /// are deleted directly — removing a row can never violate capacity,
    /// charter exclusivity, or overlap, so no simulation is needed for it.
    pub async fn unassign(&self, organization_id: OrganizationId, date: NaiveDate, booking_id: BookingId) -> Result<DispatchStatus> {
        dispatch_store::assert_not_dispatched(&self.store, organization_id, date, "unassign").await?;
        let booking = BookingRepository::get(&self.store, organization_id, booking_id).await?;
        if booking.booking_date != date {
            return Err(Error::Validation {
                message: format!("booking {booking_id} does not belong to {date}"),
            });
        }
        let existing = self.store.confirmed_for_booking(organization_id, booking_id).await?;
        match existing.as_ref().map(|a| &a.assignee) {
            Some(Assignee::InternalGuide(guide_id)) => {
                let guide_id = *guide_id;
                batch::apply_batch(
                    &self.store,
                    &self.config,
                    organization_id,
                    date,
                    vec![Change::Unassign { booking_ids: vec![booking_id], from_guide_id: guide_id }],
                )
                .await?;
            }
            Some(Assignee::External { .. }) => {
                AssignmentRepository::delete_for_booking(&self.store, organization_id, booking_id).await?;
                pickup_sync::sync_date(&self.store, &self.config, organization_id, date).await?;
            }
            None => {}
        }
        dispatch_store::refresh(&self.store, organization_id, date).await
    }

    /// Updates one booking's `pickupTime` directly (distinct from a
    /// time-shift, which moves the whole run's `bookingTime`) and re-syncs
    /// the run's pickup ordering.
    pub async fn update_pickup_time(&self, organization_id: OrganizationId, date: NaiveDate, booking_id: BookingId, guide_id: GuideId, new_time: &str) -> Result<DispatchStatus> {
        dispatch_store::assert_not_dispatched(&self.store, organization_id, date, "updatePickupTime").await?;
        time::minutes(new_time)?;

        let booking = BookingRepository::get(&self.store, organization_id, booking_id).await?;
        if booking.booking_date != date {
            return Err(Error::Validation {
                message: format!("booking {booking_id} does not belong to {date}"),
            });
        }
        self.store
            .confirmed_for_booking(organization_id, booking_id)
            .await?
            .filter(|a| a.assignee.as_guide_id() == Some(guide_id))
            .ok_or_else(|| Error::NotFound {
                entity: "guide_assignment",
                id: booking_id.to_string(),
                organization_id: organization_id.as_uuid(),
            })?;

        self.store
            .update_time(organization_id, booking_id, booking.booking_time.clone(), Some(new_time.to_string()))
            .await?;
        pickup_sync::sync_date(&self.store, &self.config, organization_id, date).await?;
        dispatch_store::refresh(&self.store, organization_id, date).await
    }

    pub async fn batch_apply_changes(&self, organization_id: OrganizationId, date: NaiveDate, changes: Vec<Change>) -> Result<BatchApplyResult> {
        batch::apply_batch(&self.store, &self.config, organization_id, date, changes).await
    }

    pub async fn add_outsourced_guide_to_run(&self, organization_id: OrganizationId, date: NaiveDate, tour_run_key: String, name: String, contact: Option<String>) -> Result<DispatchStatus> {
        dispatch_store::assert_not_dispatched(&self.store, organization_id, date, "addOutsourcedGuideToRun").await?;
        resolver::add_external(&self.store, organization_id, date, &tour_run_key, name, contact).await?;
        pickup_sync::sync_date(&self.store, &self.config, organization_id, date).await?;
        dispatch_store::refresh(&self.store, organization_id, date).await
    }

    pub async fn create_temp_guide_for_date(&self, organization_id: OrganizationId, date: NaiveDate, name: String, phone: Option<String>, vehicle_capacity: u32) -> Result<Guide> {
        self.store.create_temp_guide(organization_id, date, name, phone, vehicle_capacity).await
    }

    pub async fn resolve_warning(&self, organization_id: OrganizationId, warning_id: WarningId, resolution: ResolutionAction) -> Result<DispatchStatus> {
        resolver::resolve_warning(&self.store, &self.config, organization_id, warning_id, resolution).await
    }

    /// Freezes the date: once this returns successfully every other
    /// mutation entry point for the date rejects with `DispatchFrozen`.
    /// Emits `dispatch.completed` to the event sink.
    pub async fn dispatch(&self, organization_id: OrganizationId, date: NaiveDate, dispatched_by: &str) -> Result<DispatchResult> {
        dispatch_store::assert_not_dispatched(&self.store, organization_id, date, "dispatch").await?;
        let mut status = dispatch_store::refresh(&self.store, organization_id, date).await?;
        status.status = DispatchState::Dispatched;
        status.dispatched_at = Some(chrono::Utc::now());
        status.dispatched_by = Some(dispatched_by.to_string());
        self.store.save(organization_id, status.clone()).await?;
        self.store.emit_dispatch_completed(organization_id, date).await?;
        Ok(DispatchResult { status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::assignment::GuideAssignment;
    use crate::domain::booking::{Booking, BookingStatus};
    use crate::domain::guide::{Guide, GuideStatus, WeeklyAvailability};
    use crate::domain::ids::{BookingId, CustomerId, TourId};
    use crate::domain::tour::Tour;
    use crate::store::memory::InMemoryStore;
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
            created_at: chrono::Utc::now(),
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

    #[tokio::test]
    async fn s1_end_to_end_optimize_then_dispatch_freezes_mutations() {
        let store = InMemoryStore::new();
        let core = DispatchCore::new(store, DispatchConfig::default());
        let org = OrganizationId::new();
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let t = tour(org);
        core.store().seed_tour(t.clone()).await;
        let b = booking(org, t.id, date, 4);
        core.store().seed_booking(b.clone()).await;
        let g = guide(org, 6);
        core.store().seed_guide(g.clone()).await;
        core.store().seed_qualification(t.id, g.id).await;
        core.store()
            .seed_weekly(WeeklyAvailability {
                guide_id: g.id,
                day_of_week: crate::time::day_of_week(date),
                start_time: "08:00".into(),
                end_time: "18:00".into(),
                is_available: true,
            })
            .await;

        let result = core.optimize(org, date).await.unwrap();
        assert_eq!(result.assignments.len(), 1);

        let status = core.get_dispatch_status(org, date).await.unwrap();
        assert_eq!(status.status, DispatchState::Ready);

        core.dispatch(org, date, "ops-lead").await.unwrap();
        let err = core.manual_assign(org, date, b.id, g.id).await.unwrap_err();
        assert!(matches!(err, Error::DispatchFrozen { .. }));
        let err = core.optimize(org, date).await.unwrap_err();
        assert!(matches!(err, Error::DispatchFrozen { .. }));
    }

    #[tokio::test]
    async fn unassign_of_outsourced_guide_deletes_without_batch_simulation() {
        let store = InMemoryStore::new();
        let core = DispatchCore::new(store, DispatchConfig::default());
        let org = OrganizationId::new();
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let t = tour(org);
        core.store().seed_tour(t.clone()).await;
        let b = booking(org, t.id, date, 4);
        core.store().seed_booking(b.clone()).await;
        core.store()
            .upsert_confirmed(
                org,
                GuideAssignment::new_confirmed(b.id, Assignee::External { name: "Jamie Outside".into(), contact: None }, chrono::Utc::now()),
            )
            .await
            .unwrap();

        core.unassign(org, date, b.id).await.unwrap();
        assert!(core.store().confirmed_for_booking(org, b.id).await.unwrap().is_none());
    }
}
