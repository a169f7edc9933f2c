//! TourRun — the ephemeral aggregation unit of dispatch. Never stored;
//! always recomputed.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::ids::{BookingId, TourId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TourRunStatus {
    Unassigned,
    Partial,
    Assigned,
    Overstaffed,
}

impl TourRunStatus {
    pub fn from_counts(guides_assigned: u32, guides_needed: u32) -> Self {
        if guides_assigned == 0 {
            TourRunStatus::Unassigned
        } else if guides_assigned < guides_needed {
            TourRunStatus::Partial
        } else if guides_assigned == guides_needed {
            TourRunStatus::Assigned
        } else {
            TourRunStatus::Overstaffed
        }
    }

    pub fn is_fully_staffed(self) -> bool {
        matches!(self, TourRunStatus::Assigned | TourRunStatus::Overstaffed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TourRun {
    pub key: String,
    pub tour_id: TourId,
    pub date: NaiveDate,
    pub time: String,
    pub bookings: Vec<BookingId>,
    pub total_guests: u32,
    pub guides_needed: u32,
    pub guides_assigned: u32,
    pub status: TourRunStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_thresholds() {
        assert_eq!(TourRunStatus::from_counts(0, 2), TourRunStatus::Unassigned);
        assert_eq!(TourRunStatus::from_counts(1, 2), TourRunStatus::Partial);
        assert_eq!(TourRunStatus::from_counts(2, 2), TourRunStatus::Assigned);
        assert_eq!(TourRunStatus::from_counts(3, 2), TourRunStatus::Overstaffed);
    }
}
