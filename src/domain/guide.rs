//! Guide — an assignable resource, plus the weekly/override availability
//! rows and tour qualifications that gate it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::ids::{GuideId, OrganizationId, TourId, ZoneId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuideStatus {
    Active,
    Inactive,
    OnLeave,
}

impl GuideStatus {
    pub fn is_assignable(self) -> bool {
        matches!(self, GuideStatus::Active)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guide {
    pub id: GuideId,
    pub organization_id: OrganizationId,
    pub first_name: String,
    pub last_name: String,
    pub status: GuideStatus,
    pub vehicle_capacity: u32,
    pub languages: HashSet<String>,
    pub baseline_zone_id: Option<ZoneId>,
    pub phone: Option<String>,
    /// Set by `createTempGuideForDate`; a temp guide is only
    /// ever a candidate for this one date (see DESIGN.md).
    pub temporary_for_date: Option<NaiveDate>,
}

impl Guide {
    pub const DEFAULT_VEHICLE_CAPACITY: u32 = 6;

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// A temp guide created for one date is invisible to every other date.
    pub fn is_visible_on(&self, date: NaiveDate) -> bool {
        match self.temporary_for_date {
            Some(d) => d == date,
            None => true,
        }
    }
}

/// A weekly availability row keyed by day-of-week (0 = Sunday).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyAvailability {
    pub guide_id: GuideId,
    pub day_of_week: u8,
    pub start_time: String,
    pub end_time: String,
    pub is_available: bool,
}

/// A single dated override that fully replaces the weekly pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityOverride {
    pub guide_id: GuideId,
    pub date: NaiveDate,
    pub is_available: bool,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

/// Resolved `(isAvailable, startTime, endTime)` triple for one guide/date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityWindow {
    pub is_available: bool,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl AvailabilityWindow {
    pub fn unavailable() -> Self {
        Self {
            is_available: false,
            start_time: None,
            end_time: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TourGuideQualification {
    pub tour_id: TourId,
    pub guide_id: GuideId,
}
