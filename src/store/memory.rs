//! The in-memory implementation of every repository trait in this module,
//! guarded by one `tokio::sync::RwLock` per table — the test double the
//! CLI binary and every integration test run against, and the one a real
//! SQL-backed implementation would replace. It is *not* an in-process
//! cache sitting in front of a real store: for the scope of this crate it
//! *is* the store.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use crate::domain::assignment::GuideAssignment;
use crate::domain::booking::{Booking, BookingStatus};
use crate::domain::dispatch_status::DispatchStatus;
use crate::domain::guide::{AvailabilityOverride, Guide, WeeklyAvailability};
use crate::domain::ids::{
    BookingId, CustomerId, GuideAssignmentId, GuideId, OrganizationId, PickupAssignmentId, TourId,
    WarningId,
};
use crate::domain::pickup::PickupAssignment;
use crate::domain::tour::Tour;
use crate::domain::travel_time::ZoneTravelTime;
use crate::domain::warning::ResolutionAction;
use crate::error::{Error, Result};

use super::{AssignmentRepository, AvailabilityRepository, BookingRepository, BookingWithTour, CustomerHistoryRepository, DispatchStatusRepository, EventSink, GuideRepository, PickupRepository, QualificationRepository, TravelTimeRepository};

/// An emitted event intent, kept around so tests can assert on it. Nothing
/// reads this inside the core itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmittedEvent {
    DispatchCompleted {
        organization_id: OrganizationId,
        date: NaiveDate,
    },
    TourRunCancelled {
        organization_id: OrganizationId,
        tour_run_key: String,
        warning_id: WarningId,
    },
}

#[derive(Default)]
pub struct InMemoryStore {
    tours: RwLock<HashMap<TourId, Tour>>,
    bookings: RwLock<HashMap<BookingId, Booking>>,
    guides: RwLock<HashMap<GuideId, Guide>>,
    weekly: RwLock<Vec<WeeklyAvailability>>,
    overrides: RwLock<Vec<AvailabilityOverride>>,
    qualifications: RwLock<HashSet<(TourId, GuideId)>>,
    travel_times: RwLock<HashMap<OrganizationId, Vec<ZoneTravelTime>>>,
    assignments: RwLock<HashMap<GuideAssignmentId, GuideAssignment>>,
    pickups: RwLock<HashMap<PickupAssignmentId, PickupAssignment>>,
    dispatch_statuses: RwLock<HashMap<(OrganizationId, NaiveDate), DispatchStatus>>,
    completed_counts: RwLock<HashMap<CustomerId, u32>>,
    events: RwLock<Vec<EmittedEvent>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Seeding helpers used by the CLI loader and integration tests. ---
    // These bypass the repository traits on purpose: fixture construction
    // is not a dispatch-core operation, it is how a test or the CLI gets a
    // store into a known starting state.

    pub async fn seed_tour(&self, tour: Tour) {
        self.tours.write().await.insert(tour.id, tour);
    }

    pub async fn seed_booking(&self, booking: Booking) {
        self.bookings.write().await.insert(booking.id, booking);
    }

    pub async fn seed_guide(&self, guide: Guide) {
        self.guides.write().await.insert(guide.id, guide);
    }

    pub async fn seed_weekly(&self, row: WeeklyAvailability) {
        self.weekly.write().await.push(row);
    }

    pub async fn seed_override(&self, row: AvailabilityOverride) {
        self.overrides.write().await.push(row);
    }

    pub async fn seed_qualification(&self, tour_id: TourId, guide_id: GuideId) {
        self.qualifications.write().await.insert((tour_id, guide_id));
    }

    pub async fn seed_travel_time(&self, organization_id: OrganizationId, row: ZoneTravelTime) {
        self.travel_times
            .write()
            .await
            .entry(organization_id)
            .or_default()
            .push(row);
    }

    pub async fn seed_completed_count(&self, customer_id: CustomerId, count: u32) {
        self.completed_counts.write().await.insert(customer_id, count);
    }

    pub async fn emitted_events(&self) -> Vec<EmittedEvent> {
        self.events.read().await.clone()
    }

    async fn confirmed_assignment_for_booking(
        &self,
        booking_id: BookingId,
    ) -> Option<GuideAssignment> {
        self.assignments
            .read()
            .await
            .values()
            .find(|a| a.booking_id == booking_id && a.is_confirmed())
            .cloned()
    }
}

#[async_trait]
impl BookingRepository for InMemoryStore {
    async fn list_dispatchable_for_date(
        &self,
        organization_id: OrganizationId,
        date: NaiveDate,
    ) -> Result<Vec<BookingWithTour>> {
        let bookings = self.bookings.read().await;
        let tours = self.tours.read().await;
        let mut out = Vec::new();
        for booking in bookings.values() {
            if booking.organization_id != organization_id || booking.booking_date != date {
                continue;
            }
            if !booking.status.participates_in_dispatch() {
                continue;
            }
            let Some(tour) = tours.get(&booking.tour_id) else {
                // Booking lacking a resolvable tour is rejected silently.
                continue;
            };
            if booking.booking_time.trim().is_empty() {
                continue;
            }
            out.push(BookingWithTour {
                booking: booking.clone(),
                tour: tour.clone(),
            });
        }
        Ok(out)
    }

    async fn get(&self, organization_id: OrganizationId, booking_id: BookingId) -> Result<Booking> {
        self.bookings
            .read()
            .await
            .get(&booking_id)
            .filter(|b| b.organization_id == organization_id)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                entity: "booking",
                id: booking_id.to_string(),
                organization_id: organization_id.as_uuid(),
            })
    }

    async fn get_tour(&self, organization_id: OrganizationId, tour_id: TourId) -> Result<Tour> {
        self.tours
            .read()
            .await
            .get(&tour_id)
            .filter(|t| t.organization_id == organization_id)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                entity: "tour",
                id: tour_id.to_string(),
                organization_id: organization_id.as_uuid(),
            })
    }

    async fn update_time(
        &self,
        organization_id: OrganizationId,
        booking_id: BookingId,
        new_booking_time: String,
        new_pickup_time: Option<String>,
    ) -> Result<()> {
        let mut bookings = self.bookings.write().await;
        let booking = bookings
            .get_mut(&booking_id)
            .filter(|b| b.organization_id == organization_id)
            .ok_or_else(|| Error::NotFound {
                entity: "booking",
                id: booking_id.to_string(),
                organization_id: organization_id.as_uuid(),
            })?;
        booking.booking_time = new_booking_time;
        if new_pickup_time.is_some() {
            booking.pickup_time = new_pickup_time;
        }
        Ok(())
    }

    async fn set_status(
        &self,
        organization_id: OrganizationId,
        booking_id: BookingId,
        status: BookingStatus,
    ) -> Result<()> {
        let mut bookings = self.bookings.write().await;
        let booking = bookings
            .get_mut(&booking_id)
            .filter(|b| b.organization_id == organization_id)
            .ok_or_else(|| Error::NotFound {
                entity: "booking",
                id: booking_id.to_string(),
                organization_id: organization_id.as_uuid(),
            })?;
        booking.status = status;
        Ok(())
    }
}

#[async_trait]
impl GuideRepository for InMemoryStore {
    async fn list_active_for_date(
        &self,
        organization_id: OrganizationId,
        date: NaiveDate,
    ) -> Result<Vec<Guide>> {
        Ok(self
            .guides
            .read()
            .await
            .values()
            .filter(|g| g.organization_id == organization_id)
            .filter(|g| g.status.is_assignable())
            .filter(|g| g.is_visible_on(date))
            .cloned()
            .collect())
    }

    async fn get(&self, organization_id: OrganizationId, guide_id: GuideId) -> Result<Guide> {
        self.guides
            .read()
            .await
            .get(&guide_id)
            .filter(|g| g.organization_id == organization_id)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                entity: "guide",
                id: guide_id.to_string(),
                organization_id: organization_id.as_uuid(),
            })
    }

    async fn create_temp_guide(
        &self,
        organization_id: OrganizationId,
        date: NaiveDate,
        name: String,
        phone: Option<String>,
        vehicle_capacity: u32,
    ) -> Result<Guide> {
        if name.trim().is_empty() {
            return Err(Error::Validation {
                message: "temp guide name must not be empty".into(),
            });
        }
        if vehicle_capacity == 0 {
            return Err(Error::Validation {
                message: "temp guide vehicle capacity must be at least 1".into(),
            });
        }
        let (first_name, last_name) = name
            .split_once(' ')
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .unwrap_or((name.clone(), String::new()));
        let guide = Guide {
            id: GuideId::new(),
            organization_id,
            first_name,
            last_name,
            status: crate::domain::guide::GuideStatus::Active,
            vehicle_capacity,
            languages: HashSet::new(),
            baseline_zone_id: None,
            phone,
            temporary_for_date: Some(date),
        };
        self.guides.write().await.insert(guide.id, guide.clone());
        log::info!("created temp guide {} for {date}", guide.id);
        Ok(guide)
    }
}

#[async_trait]
impl AvailabilityRepository for InMemoryStore {
    async fn batch_overrides(
        &self,
        organization_id: OrganizationId,
        date: NaiveDate,
        guide_ids: &[GuideId],
    ) -> Result<Vec<AvailabilityOverride>> {
        let guides = self.guides.read().await;
        let wanted: HashSet<GuideId> = guide_ids.iter().copied().collect();
        Ok(self
            .overrides
            .read()
            .await
            .iter()
            .filter(|o| o.date == date && wanted.contains(&o.guide_id))
            .filter(|o| {
                guides
                    .get(&o.guide_id)
                    .is_some_and(|g| g.organization_id == organization_id)
            })
            .cloned()
            .collect())
    }

    async fn batch_weekly(
        &self,
        organization_id: OrganizationId,
        day_of_week: u8,
        guide_ids: &[GuideId],
    ) -> Result<Vec<WeeklyAvailability>> {
        let guides = self.guides.read().await;
        let wanted: HashSet<GuideId> = guide_ids.iter().copied().collect();
        Ok(self
            .weekly
            .read()
            .await
            .iter()
            .filter(|w| w.day_of_week == day_of_week && wanted.contains(&w.guide_id))
            .filter(|w| {
                guides
                    .get(&w.guide_id)
                    .is_some_and(|g| g.organization_id == organization_id)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl QualificationRepository for InMemoryStore {
    async fn guides_qualified_for_tour(
        &self,
        organization_id: OrganizationId,
        tour_id: TourId,
    ) -> Result<HashSet<GuideId>> {
        let guides = self.guides.read().await;
        Ok(self
            .qualifications
            .read()
            .await
            .iter()
            .filter(|(t, _)| *t == tour_id)
            .map(|(_, g)| *g)
            .filter(|g| {
                guides
                    .get(g)
                    .is_some_and(|guide| guide.organization_id == organization_id)
            })
            .collect())
    }
}

#[async_trait]
impl TravelTimeRepository for InMemoryStore {
    async fn matrix(&self, organization_id: OrganizationId) -> Result<Vec<ZoneTravelTime>> {
        Ok(self
            .travel_times
            .read()
            .await
            .get(&organization_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl AssignmentRepository for InMemoryStore {
    async fn get(
        &self,
        organization_id: OrganizationId,
        assignment_id: GuideAssignmentId,
    ) -> Result<GuideAssignment> {
        let assignments = self.assignments.read().await;
        let assignment = assignments.get(&assignment_id).ok_or_else(|| Error::NotFound {
            entity: "guide_assignment",
            id: assignment_id.to_string(),
            organization_id: organization_id.as_uuid(),
        })?;
        let bookings = self.bookings.read().await;
        if !bookings
            .get(&assignment.booking_id)
            .is_some_and(|b| b.organization_id == organization_id)
        {
            return Err(Error::NotFound {
                entity: "guide_assignment",
                id: assignment_id.to_string(),
                organization_id: organization_id.as_uuid(),
            });
        }
        Ok(assignment.clone())
    }

    async fn confirmed_for_date(
        &self,
        organization_id: OrganizationId,
        date: NaiveDate,
    ) -> Result<Vec<GuideAssignment>> {
        let bookings = self.bookings.read().await;
        Ok(self
            .assignments
            .read()
            .await
            .values()
            .filter(|a| a.is_confirmed())
            .filter(|a| {
                bookings
                    .get(&a.booking_id)
                    .is_some_and(|b| b.organization_id == organization_id && b.booking_date == date)
            })
            .cloned()
            .collect())
    }

    async fn confirmed_for_booking(
        &self,
        organization_id: OrganizationId,
        booking_id: BookingId,
    ) -> Result<Option<GuideAssignment>> {
        let bookings = self.bookings.read().await;
        if !bookings
            .get(&booking_id)
            .is_some_and(|b| b.organization_id == organization_id)
        {
            return Ok(None);
        }
        Ok(self.confirmed_assignment_for_booking(booking_id).await)
    }

    async fn upsert_confirmed(
        &self,
        _organization_id: OrganizationId,
        assignment: GuideAssignment,
    ) -> Result<()> {
        let mut assignments = self.assignments.write().await;
        assignments.retain(|_, a| a.booking_id != assignment.booking_id);
        assignments.insert(assignment.id, assignment);
        Ok(())
    }

    async fn delete_for_booking(
        &self,
        _organization_id: OrganizationId,
        booking_id: BookingId,
    ) -> Result<()> {
        self.assignments
            .write()
            .await
            .retain(|_, a| a.booking_id != booking_id);
        Ok(())
    }

    async fn update_pickup_fields(
        &self,
        _organization_id: OrganizationId,
        assignment_id: GuideAssignmentId,
        pickup_order: Option<u32>,
        calculated_pickup_time: Option<String>,
        drive_time_minutes: Option<i64>,
    ) -> Result<()> {
        if let Some(a) = self.assignments.write().await.get_mut(&assignment_id) {
            a.pickup_order = pickup_order;
            a.calculated_pickup_time = calculated_pickup_time;
            a.drive_time_minutes = drive_time_minutes;
        }
        Ok(())
    }
}

#[async_trait]
impl PickupRepository for InMemoryStore {
    async fn for_schedule(
        &self,
        _organization_id: OrganizationId,
        schedule_id: &str,
    ) -> Result<Vec<PickupAssignment>> {
        Ok(self
            .pickups
            .read()
            .await
            .values()
            .filter(|p| p.schedule_id == schedule_id)
            .cloned()
            .collect())
    }

    async fn upsert(&self, _organization_id: OrganizationId, pickup: PickupAssignment) -> Result<()> {
        self.pickups.write().await.insert(pickup.id, pickup);
        Ok(())
    }

    async fn delete(
        &self,
        _organization_id: OrganizationId,
        pickup_id: PickupAssignmentId,
    ) -> Result<()> {
        self.pickups.write().await.remove(&pickup_id);
        Ok(())
    }

    async fn delete_for_booking(
        &self,
        _organization_id: OrganizationId,
        booking_id: BookingId,
    ) -> Result<()> {
        self.pickups
            .write()
            .await
            .retain(|_, p| p.booking_id != booking_id);
        Ok(())
    }
}

#[async_trait]
impl DispatchStatusRepository for InMemoryStore {
    async fn get_or_create(
        &self,
        organization_id: OrganizationId,
        date: NaiveDate,
    ) -> Result<DispatchStatus> {
        let mut statuses = self.dispatch_statuses.write().await;
        let entry = statuses
            .entry((organization_id, date))
            .or_insert_with(|| DispatchStatus::new(organization_id, date));
        Ok(entry.clone())
    }

    async fn save(&self, organization_id: OrganizationId, status: DispatchStatus) -> Result<()> {
        self.dispatch_statuses
            .write()
            .await
            .insert((organization_id, status.date), status);
        Ok(())
    }

    async fn resolve_warning(
        &self,
        organization_id: OrganizationId,
        date: NaiveDate,
        warning_id: WarningId,
        resolution: Option<ResolutionAction>,
    ) -> Result<()> {
        let mut statuses = self.dispatch_statuses.write().await;
        let Some(status) = statuses.get_mut(&(organization_id, date)) else {
            return Err(Error::NotFound {
                entity: "dispatch_status",
                id: date.to_string(),
                organization_id: organization_id.as_uuid(),
            });
        };
        let Some(warning) = status.warnings.iter_mut().find(|w| w.id == warning_id) else {
            return Err(Error::NotFound {
                entity: "warning",
                id: warning_id.to_string(),
                organization_id: organization_id.as_uuid(),
            });
        };
        warning.resolve(resolution, Utc::now());
        Ok(())
    }

    async fn find_warning(
        &self,
        organization_id: OrganizationId,
        warning_id: WarningId,
    ) -> Result<(NaiveDate, crate::domain::warning::Warning)> {
        let statuses = self.dispatch_statuses.read().await;
        statuses
            .iter()
            .filter(|((org, _), _)| *org == organization_id)
            .find_map(|((_, date), status)| {
                status
                    .warnings
                    .iter()
                    .find(|w| w.id == warning_id)
                    .map(|w| (*date, w.clone()))
            })
            .ok_or_else(|| Error::NotFound {
                entity: "warning",
                id: warning_id.to_string(),
                organization_id: organization_id.as_uuid(),
            })
    }
}

#[async_trait]
impl CustomerHistoryRepository for InMemoryStore {
    async fn completed_booking_counts(
        &self,
        _organization_id: OrganizationId,
        customer_ids: &[CustomerId],
    ) -> Result<HashMap<CustomerId, u32>> {
        let counts = self.completed_counts.read().await;
        Ok(customer_ids
            .iter()
            .map(|id| (*id, counts.get(id).copied().unwrap_or(0)))
            .collect())
    }
}

#[async_trait]
impl EventSink for InMemoryStore {
    async fn emit_dispatch_completed(
        &self,
        organization_id: OrganizationId,
        date: NaiveDate,
    ) -> Result<()> {
        self.events
            .write()
            .await
            .push(EmittedEvent::DispatchCompleted { organization_id, date });
        Ok(())
    }

    async fn emit_tour_run_cancelled(
        &self,
        organization_id: OrganizationId,
        tour_run_key: String,
        warning_id: WarningId,
    ) -> Result<()> {
        self.events.write().await.push(EmittedEvent::TourRunCancelled {
            organization_id,
            tour_run_key,
            warning_id,
        });
        Ok(())
    }
}