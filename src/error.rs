use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

/// The closed set of failures the dispatch core can report at its boundary.
///
/// Validation and constraint errors are always raised before any write;
/// nothing is ever partially applied.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{entity} {id} not found for organization {organization_id}")]
    NotFound {
        entity: &'static str,
        id: String,
        organization_id: Uuid,
    },

    #[error("validation failed: {message}")]
    Validation { message: String },

    #[error("booking {booking_id} already has a confirmed guide assignment")]
    Conflict { booking_id: Uuid },

    #[error("dispatch for {date} is already dispatched; {action} is rejected")]
    DispatchFrozen {
        date: NaiveDate,
        action: &'static str,
    },

    #[error("constraint violated ({kind}) for guide {guide_id}: {detail}")]
    ConstraintViolation {
        kind: ConstraintKind,
        guide_id: String,
        detail: String,
    },

    #[error("{operation} is not implemented beyond {limitation}")]
    Unimplemented {
        operation: &'static str,
        limitation: &'static str,
    },

    #[error("malformed JSON fixture: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("could not read fixture: {0}")]
    Io(#[from] std::io::Error),
}

/// The specific invariant a `ConstraintViolation` tripped over, kept as its
/// own enum rather than free text so callers can match on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Capacity,
    CharterExclusive,
    TimeOverlap,
    TimeShiftBounds,
}

impl std::fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConstraintKind::Capacity => "capacity_exceeded",
            ConstraintKind::CharterExclusive => "charter_exclusive",
            ConstraintKind::TimeOverlap => "time_overlap",
            ConstraintKind::TimeShiftBounds => "time_shift_bounds",
        };
        f.write_str(s)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
