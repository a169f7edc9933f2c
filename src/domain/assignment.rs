//! Guide assignment — the polymorphic `guideId`/`outsourcedGuideName`
//! assignee.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{BookingId, GuideAssignmentId, GuideId};

/// Exactly one of `InternalGuide`/`External` is ever recorded; this is the
/// tagged variant the design notes call for instead of two nullable
/// columns plus a runtime "exactly one is set" check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Assignee {
    InternalGuide(GuideId),
    External {
        name: String,
        contact: Option<String>,
    },
}

impl Assignee {
    /// The key used to deduplicate assignees within a tour run
    /// (`guideId || "outsourced:" + name`).
    pub fn dedup_key(&self) -> String {
        match self {
            Assignee::InternalGuide(id) => id.to_string(),
            Assignee::External { name, .. } => format!("outsourced:{name}"),
        }
    }

    pub fn as_guide_id(&self) -> Option<GuideId> {
        match self {
            Assignee::InternalGuide(id) => Some(*id),
            Assignee::External { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentStatus {
    Pending,
    Confirmed,
    Declined,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuideAssignment {
    pub id: GuideAssignmentId,
    pub booking_id: BookingId,
    pub assignee: Assignee,
    pub status: AssignmentStatus,
    pub assigned_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub pickup_order: Option<u32>,
    pub calculated_pickup_time: Option<String>,
    pub drive_time_minutes: Option<i64>,
}

impl GuideAssignment {
    pub fn is_confirmed(&self) -> bool {
        matches!(self.status, AssignmentStatus::Confirmed) && self.confirmed_at.is_some()
    }

    pub fn new_confirmed(booking_id: BookingId, assignee: Assignee, now: DateTime<Utc>) -> Self {
        Self {
            id: GuideAssignmentId::new(),
            booking_id,
            assignee,
            status: AssignmentStatus::Confirmed,
            assigned_at: now,
            confirmed_at: Some(now),
            pickup_order: None,
            calculated_pickup_time: None,
            drive_time_minutes: None,
        }
    }
}
