//! Batch mutation engine: validates an
//! ordered list of changes against a simulated final state, then applies
//! all of them or none.

use chrono::{NaiveDate, Utc};
use std::collections::{HashMap, HashSet};

use crate::config::DispatchConfig;
use crate::dispatch_store;
use crate::domain::assignment::{Assignee, AssignmentStatus, GuideAssignment};
use crate::domain::booking::{Booking, ExperienceMode};
use crate::domain::ids::{BookingId, GuideId, OrganizationId};
use crate::domain::tour::Tour;
use crate::error::{ConstraintKind, Error, Result};
use crate::pickup_sync;
use crate::store::{AssignmentRepository, BookingRepository, CustomerHistoryRepository, DispatchStatusRepository, GuideRepository, PickupRepository};
use crate::time::{self, intervals_overlap};

/// One requested change; a batch applies these in order, later changes
/// seeing the simulated effect of earlier ones.
#[derive(Debug, Clone)]
pub enum Change {
    Assign {
        booking_id: BookingId,
        to_guide_id: GuideId,
    },
    Unassign {
        booking_ids: Vec<BookingId>,
        from_guide_id: GuideId,
    },
    Reassign {
        booking_ids: Vec<BookingId>,
        from_guide_id: GuideId,
        to_guide_id: GuideId,
    },
    TimeShift {
        booking_ids: Vec<BookingId>,
        guide_id: GuideId,
        new_start_time: String,
    },
}

#[derive(Debug, Clone)]
pub struct ChangeResult {
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct BatchApplyResult {
    pub applied: bool,
    pub results: Vec<ChangeResult>,
}

#[derive(Clone)]
struct SimBooking {
    tour_id: crate::domain::ids::TourId,
    total_participants: u32,
    experience_mode: Option<ExperienceMode>,
    time: String,
    assignee: Option<Assignee>,
}

pub async fn apply_batch<R>(
    store: &R,
    config: &DispatchConfig,
    organization_id: OrganizationId,
    date: NaiveDate,
    changes: Vec<Change>,
) -> Result<BatchApplyResult>
where
    R: BookingRepository + GuideRepository + AssignmentRepository + PickupRepository + DispatchStatusRepository + CustomerHistoryRepository + ?Sized,
{
    dispatch_store::assert_not_dispatched(store, organization_id, date, "batchApplyChanges").await?;

    let mut sim: HashMap<BookingId, SimBooking> = HashMap::new();
    let mut tours: HashMap<crate::domain::ids::TourId, Tour> = HashMap::new();

    // Seed from every confirmed assignment of the day (the guide's full
    // schedule, including runs untouched by this batch) plus every booking
    // a change refers to.
    for a in store.confirmed_for_date(organization_id, date).await? {
        let booking = load_booking(store, organization_id, &mut tours, a.booking_id).await?;
        seed(&mut sim, booking, Some(a.assignee));
    }
    for booking_id in changes.iter().flat_map(affected_bookings) {
        if sim.contains_key(&booking_id) {
            continue;
        }
        let booking = BookingRepository::get(store, organization_id, booking_id).await?;
        if booking.booking_date != date {
            return Err(Error::Validation {
                message: format!("booking {booking_id} does not belong to {date}"),
            });
        }
        let booking = load_booking(store, organization_id, &mut tours, booking_id).await?;
        seed(&mut sim, booking, None);
    }

    // Step 5: apply changes to the simulation in order.
    let mut results = Vec::with_capacity(changes.len());
    for change in &changes {
        apply_one(store, organization_id, &mut sim, &mut tours, date, change).await?;
        results.push(ChangeResult {
            description: describe(change),
        });
    }

    // Step 6: validate the final simulated state per guide.
    validate(store, organization_id, &sim, &tours).await?;

    // Step 7: apply for real — delete-then-insert per booking touched by
    // this batch, the idempotent pattern two concurrent optimizers rely on.
    let now = Utc::now();
    let touched: HashSet<BookingId> = changes.iter().flat_map(affected_bookings).collect();
    for booking_id in &touched {
        let Some(sim_booking) = sim.get(booking_id) else { continue };
        AssignmentRepository::delete_for_booking(store, organization_id, *booking_id).await?;
        if let Some(assignee) = sim_booking.assignee.clone() {
            let assignment = GuideAssignment {
                id: crate::domain::ids::GuideAssignmentId::new(),
                booking_id: *booking_id,
                assignee,
                status: AssignmentStatus::Confirmed,
                assigned_at: now,
                confirmed_at: Some(now),
                pickup_order: None,
                calculated_pickup_time: None,
                drive_time_minutes: None,
            };
            store.upsert_confirmed(organization_id, assignment).await?;
        }
    }
    for change in &changes {
        if let Change::TimeShift { booking_ids, new_start_time, .. } = change {
            for booking_id in booking_ids {
                store
                    .update_time(organization_id, *booking_id, new_start_time.clone(), Some(new_start_time.clone()))
                    .await?;
            }
        }
    }

    pickup_sync::sync_date(store, config, organization_id, date).await?;
    dispatch_store::refresh(store, organization_id, date).await?;

    Ok(BatchApplyResult { applied: true, results })
}

async fn load_booking<R>(
    store: &R,
    organization_id: OrganizationId,
    tours: &mut HashMap<crate::domain::ids::TourId, Tour>,
    booking_id: BookingId,
) -> Result<Booking>
where
    R: BookingRepository + ?Sized,
{
    let booking = BookingRepository::get(store, organization_id, booking_id).await?;
    if !tours.contains_key(&booking.tour_id) {
        let tour = store.get_tour(organization_id, booking.tour_id).await?;
        tours.insert(tour.id, tour);
    }
    Ok(booking)
}

fn seed(sim: &mut HashMap<BookingId, SimBooking>, booking: Booking, assignee: Option<Assignee>) {
    sim.entry(booking.id).or_insert_with(|| SimBooking {
        tour_id: booking.tour_id,
        total_participants: booking.total_participants,
        experience_mode: booking.experience_mode,
        time: booking.booking_time.clone(),
        assignee,
    });
}

fn affected_bookings(change: &Change) -> Vec<BookingId> {
    match change {
        Change::Assign { booking_id, .. } => vec![*booking_id],
        Change::Unassign { booking_ids, .. } => booking_ids.clone(),
        Change::Reassign { booking_ids, .. } => booking_ids.clone(),
        Change::TimeShift { booking_ids, .. } => booking_ids.clone(),
    }
}

fn describe(change: &Change) -> String {
    match change {
        Change::Assign { booking_id, to_guide_id } => format!("assign {booking_id} to {to_guide_id}"),
        Change::Unassign { booking_ids, from_guide_id } => format!("unassign {} booking(s) from {from_guide_id}", booking_ids.len()),
        Change::Reassign { booking_ids, from_guide_id, to_guide_id } => {
            format!("reassign {} booking(s) from {from_guide_id} to {to_guide_id}", booking_ids.len())
        }
        Change::TimeShift { booking_ids, new_start_time, .. } => format!("time-shift {} booking(s) to {new_start_time}", booking_ids.len()),
    }
}

async fn apply_one<R>(
    store: &R,
    organization_id: OrganizationId,
    sim: &mut HashMap<BookingId, SimBooking>,
    tours: &mut HashMap<crate::domain::ids::TourId, Tour>,
    date: NaiveDate,
    change: &Change,
) -> Result<()>
where
    R: BookingRepository + ?Sized,
{
    match change {
        Change::Assign { booking_id, to_guide_id } => {
            ensure_seeded(store, organization_id, sim, tours, date, *booking_id).await?;
            sim.get_mut(booking_id).unwrap().assignee = Some(Assignee::InternalGuide(*to_guide_id));
        }
        Change::Unassign { booking_ids, .. } => {
            for booking_id in booking_ids {
                if let Some(b) = sim.get_mut(booking_id) {
                    b.assignee = None;
                }
            }
        }
        Change::Reassign { booking_ids, to_guide_id, .. } => {
            for booking_id in booking_ids {
                ensure_seeded(store, organization_id, sim, tours, date, *booking_id).await?;
                sim.get_mut(booking_id).unwrap().assignee = Some(Assignee::InternalGuide(*to_guide_id));
            }
        }
        Change::TimeShift { booking_ids, new_start_time, .. } => {
            time::minutes(new_start_time)?;
            for booking_id in booking_ids {
                ensure_seeded(store, organization_id, sim, tours, date, *booking_id).await?;
                sim.get_mut(booking_id).unwrap().time = new_start_time.clone();
            }
        }
    }
    Ok(())
}

async fn ensure_seeded<R>(
    store: &R,
    organization_id: OrganizationId,
    sim: &mut HashMap<BookingId, SimBooking>,
    tours: &mut HashMap<crate::domain::ids::TourId, Tour>,
    date: NaiveDate,
    booking_id: BookingId,
) -> Result<()>
where
    R: BookingRepository + ?Sized,
{
    if sim.contains_key(&booking_id) {
        return Ok(());
    }
    let booking = store.get(organization_id, booking_id).await?;
    if booking.booking_date != date {
        return Err(Error::Validation {
            message: format!("booking {booking_id} does not belong to {date}"),
        });
    }
    let booking = load_booking(store, organization_id, tours, booking_id).await?;
    seed(sim, booking, None);
    Ok(())
}

async fn validate<R>(
    store: &R,
    organization_id: OrganizationId,
    sim: &HashMap<BookingId, SimBooking>,
    tours: &HashMap<crate::domain::ids::TourId, Tour>,
) -> Result<()>
where
    R: GuideRepository + ?Sized,
{
    let mut by_guide: HashMap<GuideId, Vec<&SimBooking>> = HashMap::new();
    for b in sim.values() {
        if let Some(Assignee::InternalGuide(guide_id)) = b.assignee {
            by_guide.entry(guide_id).or_default().push(b);
        }
    }

    for (guide_id, bookings) in by_guide {
        let guide = store.get(organization_id, guide_id).await?;

        let mut by_run: HashMap<(crate::domain::ids::TourId, String), Vec<&SimBooking>> = HashMap::new();
        for b in &bookings {
            by_run.entry((b.tour_id, b.time.clone())).or_default().push(b);
        }

        let mut intervals: Vec<(i64, i64)> = Vec::new();
        for ((tour_id, run_time), group) in &by_run {
            let total_guests: u32 = group.iter().map(|b| b.total_participants).sum();
            if total_guests > guide.vehicle_capacity {
                return Err(Error::ConstraintViolation {
                    kind: ConstraintKind::Capacity,
                    guide_id: guide_id.to_string(),
                    detail: format!("{total_guests} guests exceed capacity {} at {run_time}", guide.vehicle_capacity),
                });
            }

            let charters = group.iter().filter(|b| b.experience_mode == Some(ExperienceMode::Charter)).count();
            if charters > 0 && group.len() > 1 {
                return Err(Error::ConstraintViolation {
                    kind: ConstraintKind::CharterExclusive,
                    guide_id: guide_id.to_string(),
                    detail: format!("charter booking shares {run_time} with {} other booking(s)", group.len() - 1),
                });
            }

            let Some(tour) = tours.get(tour_id) else {
                return Err(Error::NotFound {
                    entity: "tour",
                    id: tour_id.to_string(),
                    organization_id: organization_id.as_uuid(),
                });
            };
            let start = time::minutes(run_time)?;
            let end = start + tour.duration_minutes as i64;
            if end > 24 * 60 {
                return Err(Error::ConstraintViolation {
                    kind: ConstraintKind::TimeShiftBounds,
                    guide_id: guide_id.to_string(),
                    detail: format!("run starting {run_time} ends past 24:00"),
                });
            }
            intervals.push((start, end));
        }

        intervals.sort();
        for pair in intervals.windows(2) {
            if intervals_overlap(pair[0].0, pair[0].1, pair[1].0, pair[1].1) {
                return Err(Error::ConstraintViolation {
                    kind: ConstraintKind::TimeOverlap,
                    guide_id: guide_id.to_string(),
                    detail: format!("runs [{}, {}) and [{}, {}) overlap", pair[0].0, pair[0].1, pair[1].0, pair[1].1),
                });
            }
        }
    }
    Ok(())
}
