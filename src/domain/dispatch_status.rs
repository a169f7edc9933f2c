//! Dispatch status — one row per `(organizationId, date)`. The lifecycle
//! state machine itself lives in [`crate::dispatch_store`]; this module
//! only holds the data shape.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::ids::OrganizationId;
use super::warning::Warning;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchState {
    Pending,
    Optimized,
    Ready,
    Dispatched,
}

impl DispatchState {
    /// Once `Dispatched`, the state is absorbing: no further transition is
    /// ever computed for that date.
    pub fn is_frozen(self) -> bool {
        matches!(self, DispatchState::Dispatched)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchStatus {
    pub organization_id: OrganizationId,
    pub date: NaiveDate,
    pub status: DispatchState,
    pub optimized_at: Option<DateTime<Utc>>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub dispatched_by: Option<String>,
    pub total_guests: u32,
    pub total_guides: u32,
    pub total_drive_minutes: i64,
    pub efficiency_score: u8,
    pub unresolved_warnings: u32,
    pub warnings: Vec<Warning>,
}

impl DispatchStatus {
    pub fn new(organization_id: OrganizationId, date: NaiveDate) -> Self {
        Self {
            organization_id,
            date,
            status: DispatchState::Pending,
            optimized_at: None,
            dispatched_at: None,
            dispatched_by: None,
            total_guests: 0,
            total_guides: 0,
            total_drive_minutes: 0,
            efficiency_score: 100,
            unresolved_warnings: 0,
            warnings: Vec::new(),
        }
    }
}
