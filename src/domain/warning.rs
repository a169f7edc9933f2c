//! Warning — attached to a dispatch status, and the closed set of
//! resolution actions a caller may apply to it. Resolutions are modeled as
//! values rather than string commands, so the set stays closed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{BookingId, GuideId, WarningId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningType {
    InsufficientGuides,
    CapacityExceeded,
    NoQualifiedGuide,
    NoAvailableGuide,
    Conflict,
}

impl WarningType {
    /// The set the warning reconciler is allowed to auto-resolve once the
    /// condition clears. `CapacityExceeded` and `Conflict` always require
    /// an explicit user resolution.
    pub fn is_auto_resolvable(self) -> bool {
        matches!(
            self,
            WarningType::InsufficientGuides
                | WarningType::NoAvailableGuide
                | WarningType::NoQualifiedGuide
        )
    }
}

/// One alternative offered alongside a warning: either a specific guide
/// (qualified-but-unavailable, or unqualified-but-free) or the trailing
/// "just bring in an outsider" option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningResolutionOption {
    AssignGuide { guide_id: GuideId, reason: String },
    AddExternal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitShare {
    pub guide_id: GuideId,
    pub guest_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitConfig {
    pub booking_id: BookingId,
    pub splits: Vec<SplitShare>,
}

/// The closed set of actions a resolution can carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionAction {
    AssignGuide {
        booking_id: Option<BookingId>,
        tour_run_key: Option<String>,
        guide_id: GuideId,
    },
    AddExternal {
        tour_run_key: String,
        name: String,
        contact: Option<String>,
    },
    CancelTour {
        tour_run_key: String,
    },
    SplitBooking(SplitConfig),
    Acknowledge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warning {
    pub id: WarningId,
    pub warning_type: WarningType,
    pub tour_run_key: Option<String>,
    pub booking_id: Option<BookingId>,
    pub message: String,
    pub resolutions: Vec<WarningResolutionOption>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<ResolutionAction>,
}

impl Warning {
    pub fn resolve(&mut self, action: Option<ResolutionAction>, now: DateTime<Utc>) {
        self.resolved = true;
        self.resolved_at = Some(now);
        self.resolution = action;
    }
}
