//! External collaborators, modeled as repository traits. The relational
//! store, the notification transport, and the outbound event sink are all
//! addressed only through these interfaces; the core never assumes a
//! particular SQL dialect or wire format on the other side of them.

pub mod memory;

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};

use crate::domain::assignment::GuideAssignment;
use crate::domain::booking::{Booking, BookingStatus};
use crate::domain::guide::{AvailabilityOverride, Guide, WeeklyAvailability};
use crate::domain::ids::{
    BookingId, CustomerId, GuideAssignmentId, GuideId, OrganizationId, PickupAssignmentId, TourId,
    WarningId,
};
use crate::domain::pickup::PickupAssignment;
use crate::domain::tour::Tour;
use crate::domain::travel_time::ZoneTravelTime;
use crate::error::Result;

/// Bookings joined to their tour.
#[derive(Debug, Clone)]
pub struct BookingWithTour {
    pub booking: Booking,
    pub tour: Tour,
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// `organizationId = self`, `bookingDate = date`,
    /// `status ∈ {pending, confirmed}`, joined to its tour.
    async fn list_dispatchable_for_date(
        &self,
        organization_id: OrganizationId,
        date: NaiveDate,
    ) -> Result<Vec<BookingWithTour>>;

    async fn get(&self, organization_id: OrganizationId, booking_id: BookingId) -> Result<Booking>;

    async fn get_tour(&self, organization_id: OrganizationId, tour_id: TourId) -> Result<Tour>;

    async fn update_time(
        &self,
        organization_id: OrganizationId,
        booking_id: BookingId,
        new_booking_time: String,
        new_pickup_time: Option<String>,
    ) -> Result<()>;

    async fn set_status(
        &self,
        organization_id: OrganizationId,
        booking_id: BookingId,
        status: BookingStatus,
    ) -> Result<()>;
}

#[async_trait]
pub trait GuideRepository: Send + Sync {
    /// Active guides visible on `date` (excludes temp guides minted for a
    /// different date).
    async fn list_active_for_date(
        &self,
        organization_id: OrganizationId,
        date: NaiveDate,
    ) -> Result<Vec<Guide>>;

    async fn get(&self, organization_id: OrganizationId, guide_id: GuideId) -> Result<Guide>;

    async fn create_temp_guide(
        &self,
        organization_id: OrganizationId,
        date: NaiveDate,
        name: String,
        phone: Option<String>,
        vehicle_capacity: u32,
    ) -> Result<Guide>;
}

#[async_trait]
pub trait AvailabilityRepository: Send + Sync {
    /// One query for the day's override rows across every requested guide.
    async fn batch_overrides(
        &self,
        organization_id: OrganizationId,
        date: NaiveDate,
        guide_ids: &[GuideId],
    ) -> Result<Vec<AvailabilityOverride>>;

    /// One query for the weekly rows matching `dayOfWeek(date)` across
    /// every requested guide.
    async fn batch_weekly(
        &self,
        organization_id: OrganizationId,
        day_of_week: u8,
        guide_ids: &[GuideId],
    ) -> Result<Vec<WeeklyAvailability>>;
}

#[async_trait]
pub trait QualificationRepository: Send + Sync {
    async fn guides_qualified_for_tour(
        &self,
        organization_id: OrganizationId,
        tour_id: TourId,
    ) -> Result<HashSet<GuideId>>;
}

#[async_trait]
pub trait TravelTimeRepository: Send + Sync {
    async fn matrix(&self, organization_id: OrganizationId) -> Result<Vec<ZoneTravelTime>>;
}

#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    async fn get(
        &self,
        organization_id: OrganizationId,
        assignment_id: GuideAssignmentId,
    ) -> Result<GuideAssignment>;

    async fn confirmed_for_date(
        &self,
        organization_id: OrganizationId,
        date: NaiveDate,
    ) -> Result<Vec<GuideAssignment>>;

    async fn confirmed_for_booking(
        &self,
        organization_id: OrganizationId,
        booking_id: BookingId,
    ) -> Result<Option<GuideAssignment>>;

    /// Delete-then-insert by booking id: the idempotent write two
    /// concurrent optimizers rely on to converge.
    async fn upsert_confirmed(
        &self,
        organization_id: OrganizationId,
        assignment: GuideAssignment,
    ) -> Result<()>;

    async fn delete_for_booking(
        &self,
        organization_id: OrganizationId,
        booking_id: BookingId,
    ) -> Result<()>;

    async fn update_pickup_fields(
        &self,
        organization_id: OrganizationId,
        assignment_id: GuideAssignmentId,
        pickup_order: Option<u32>,
        calculated_pickup_time: Option<String>,
        drive_time_minutes: Option<i64>,
    ) -> Result<()>;
}

#[async_trait]
pub trait PickupRepository: Send + Sync {
    async fn for_schedule(
        &self,
        organization_id: OrganizationId,
        schedule_id: &str,
    ) -> Result<Vec<PickupAssignment>>;

    async fn upsert(&self, organization_id: OrganizationId, pickup: PickupAssignment) -> Result<()>;

    async fn delete(
        &self,
        organization_id: OrganizationId,
        pickup_id: PickupAssignmentId,
    ) -> Result<()>;

    async fn delete_for_booking(
        &self,
        organization_id: OrganizationId,
        booking_id: BookingId,
    ) -> Result<()>;
}

#[async_trait]
pub trait DispatchStatusRepository: Send + Sync {
    async fn get_or_create(
        &self,
        organization_id: OrganizationId,
        date: NaiveDate,
    ) -> Result<crate::domain::dispatch_status::DispatchStatus>;

    async fn save(
        &self,
        organization_id: OrganizationId,
        status: crate::domain::dispatch_status::DispatchStatus,
    ) -> Result<()>;

    async fn resolve_warning(
        &self,
        organization_id: OrganizationId,
        date: NaiveDate,
        warning_id: WarningId,
        resolution: Option<crate::domain::warning::ResolutionAction>,
    ) -> Result<()>;

    /// Locates the date owning a warning id, for entry points (the warning
    /// resolver) that are only handed the warning id itself.
    async fn find_warning(
        &self,
        organization_id: OrganizationId,
        warning_id: WarningId,
    ) -> Result<(NaiveDate, crate::domain::warning::Warning)>;
}

#[async_trait]
pub trait CustomerHistoryRepository: Send + Sync {
    /// Completed-booking counts per customer, computed in one grouped
    /// query across every customer touched.
    async fn completed_booking_counts(
        &self,
        organization_id: OrganizationId,
        customer_ids: &[CustomerId],
    ) -> Result<HashMap<CustomerId, u32>>;
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit_dispatch_completed(
        &self,
        organization_id: OrganizationId,
        date: NaiveDate,
    ) -> Result<()>;

    async fn emit_tour_run_cancelled(
        &self,
        organization_id: OrganizationId,
        tour_run_key: String,
        warning_id: WarningId,
    ) -> Result<()>;
}

/// The full collaborator surface the dispatch core needs. One in-memory
/// implementation ([`memory::InMemoryStore`]) backs the CLI and the
/// integration tests; a real deployment swaps in a SQL-backed one without
/// the core changing.
pub trait Store:
    BookingRepository
    + GuideRepository
    + AvailabilityRepository
    + QualificationRepository
    + TravelTimeRepository
    + AssignmentRepository
    + PickupRepository
    + DispatchStatusRepository
    + CustomerHistoryRepository
    + EventSink
    + Send
    + Sync
{
}

impl<T> Store for T where
    T: BookingRepository
        + GuideRepository
        + AvailabilityRepository
        + QualificationRepository
        + TravelTimeRepository
        + AssignmentRepository
        + PickupRepository
        + DispatchStatusRepository
        + CustomerHistoryRepository
        + EventSink
        + Send
        + Sync
{
}
