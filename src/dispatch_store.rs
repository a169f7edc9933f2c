//! Dispatch state store and warning
//! reconciler. The two live together
//! because every read of the dispatch status passes through the same
//! reconcile-then-derive pass: there is no in-process cache — the store
//! row plus this on-demand pass is the entire state.

use chrono::{NaiveDate, Utc};
use std::collections::HashSet;

use crate::domain::dispatch_status::{DispatchState, DispatchStatus};
use crate::domain::ids::OrganizationId;
use crate::domain::tour_run::TourRunStatus;
use crate::domain::warning::WarningType;
use crate::error::{Error, Result};
use crate::aggregator;
use crate::store::{AssignmentRepository, BookingRepository, CustomerHistoryRepository, DispatchStatusRepository};

/// `assertNotDispatched(date, action)`: every mutation entry
/// point calls this first.
pub async fn assert_not_dispatched<R>(
    repo: &R,
    organization_id: OrganizationId,
    date: NaiveDate,
    action: &'static str,
) -> Result<()>
where
    R: DispatchStatusRepository + ?Sized,
{
    let status = repo.get_or_create(organization_id, date).await?;
    if status.status.is_frozen() {
        return Err(Error::DispatchFrozen { date, action });
    }
    Ok(())
}

/// Reads (creating if absent), reconciles stale warnings, recomputes the
/// derived totals, and persists the refreshed row.
/// This is what every public read of the dispatch status, and every
/// mutation's post-commit refresh, calls.
pub async fn refresh<R>(
    repo: &R,
    organization_id: OrganizationId,
    date: NaiveDate,
) -> Result<DispatchStatus>
where
    R: DispatchStatusRepository + BookingRepository + AssignmentRepository + CustomerHistoryRepository + ?Sized,
{
    let mut status = repo.get_or_create(organization_id, date).await?;
    let runs = aggregator::tour_runs_for_date(repo, organization_id, date).await?;
    let assigned_run_keys: HashSet<&str> = runs
        .iter()
        .filter(|r| r.status == TourRunStatus::Assigned || r.status == TourRunStatus::Overstaffed)
        .map(|r| r.key.as_str())
        .collect();

    let confirmed = repo.confirmed_for_date(organization_id, date).await?;
    let confirmed_booking_ids: HashSet<_> = confirmed.iter().map(|a| a.booking_id).collect();

    let now = Utc::now();
    for warning in status.warnings.iter_mut().filter(|w| !w.resolved) {
        if !warning.warning_type.is_auto_resolvable() {
            continue;
        }
        let clears = match (warning.booking_id, &warning.tour_run_key) {
            (Some(booking_id), _) => confirmed_booking_ids.contains(&booking_id),
            (None, Some(key)) => assigned_run_keys.contains(key.as_str()),
            (None, None) => false,
        };
        if clears {
            warning.resolve(None, now);
        }
    }

    let total_guests: u32 = runs.iter().map(|r| r.total_guests).sum();
    let total_guides_needed: u64 = runs.iter().map(|r| r.guides_needed as u64).sum();
    let total_guides_assigned: u64 = runs.iter().map(|r| r.guides_assigned as u64).sum();
    let total_drive_minutes: i64 = confirmed.iter().filter_map(|a| a.drive_time_minutes).sum();
    let unresolved_warnings = status.warnings.iter().filter(|w| !w.resolved).count() as u32;

    status.total_guests = total_guests;
    status.total_guides = total_guides_assigned as u32;
    status.total_drive_minutes = total_drive_minutes;
    status.unresolved_warnings = unresolved_warnings;
    status.efficiency_score = if total_guides_needed == 0 {
        100
    } else {
        (((200 * total_guides_assigned + total_guides_needed) / (2 * total_guides_needed)).min(100)) as u8
    };

    if !status.status.is_frozen() {
        status.status = if runs.is_empty() {
            DispatchState::Pending
        } else if unresolved_warnings > 0 {
            DispatchState::Optimized
        } else {
            DispatchState::Ready
        };
    }

    repo.save(organization_id, status.clone()).await?;
    Ok(status)
}
