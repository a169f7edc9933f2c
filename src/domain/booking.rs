//! Booking — a customer reservation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{BookingId, CustomerId, OrganizationId, TourId, ZoneId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

impl BookingStatus {
    /// Only `pending` and `confirmed` bookings participate in dispatch.
    pub fn participates_in_dispatch(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExperienceMode {
    Join,
    Book,
    Charter,
}

impl ExperienceMode {
    pub fn is_charter(self) -> bool {
        matches!(self, ExperienceMode::Charter)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub organization_id: OrganizationId,
    pub tour_id: TourId,
    pub customer_id: CustomerId,
    pub booking_date: NaiveDate,
    pub booking_time: String,
    pub total_participants: u32,
    pub status: BookingStatus,
    pub pickup_zone_id: Option<ZoneId>,
    pub pickup_location: String,
    pub pickup_time: Option<String>,
    pub experience_mode: Option<ExperienceMode>,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn is_charter(&self) -> bool {
        self.experience_mode.is_some_and(ExperienceMode::is_charter)
    }
}
