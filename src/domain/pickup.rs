//! Pickup assignment — the derived per-date mirror of confirmed guide
//! assignments that carries ordering and timing.

use serde::{Deserialize, Serialize};

use super::ids::{BookingId, GuideAssignmentId, PickupAssignmentId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PickupStatus {
    Pending,
    PickedUp,
    NoShow,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickupAssignment {
    pub id: PickupAssignmentId,
    pub booking_id: BookingId,
    pub guide_assignment_id: GuideAssignmentId,
    /// `scheduleId = tourRunKey`.
    pub schedule_id: String,
    pub pickup_order: u32,
    pub estimated_pickup_time: String,
    pub passenger_count: u32,
    pub status: PickupStatus,
}
