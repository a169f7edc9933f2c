//! The greedy optimizer.
//!
//! Deterministic: ties in scoring break by `(guideId ascending)`, ties
//! between runs break by `(tourRunKey ascending)`. A second identical
//! optimization on unchanged data produces identical assignments and
//! warnings.

use chrono::{NaiveDate, Utc};
use std::collections::{HashMap, HashSet};

use crate::aggregator;
use crate::config::DispatchConfig;
use crate::dispatch_store;
use crate::domain::assignment::{Assignee, GuideAssignment};
use crate::domain::booking::Booking;
use crate::domain::dispatch_status::DispatchStatus;
use crate::domain::guide::Guide;
use crate::domain::ids::{GuideId, OrganizationId, TourId, WarningId, ZoneId};
use crate::domain::tour::Tour;
use crate::domain::tour_run::TourRun;
use crate::domain::travel_time::{lookup_minutes, ZoneTravelTime};
use crate::domain::warning::{Warning, WarningResolutionOption, WarningType};
use crate::error::Result;
use crate::pickup_sync;
use crate::store::{
    AssignmentRepository, AvailabilityRepository, BookingRepository, CustomerHistoryRepository,
    DispatchStatusRepository, GuideRepository, PickupRepository, QualificationRepository,
    TravelTimeRepository,
};
use crate::time::{self, intervals_overlap};

/// `{ assignments[], warnings[], efficiency, totalDriveMinutes }`.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub assignments: Vec<GuideAssignment>,
    pub warnings: Vec<Warning>,
    pub efficiency: u8,
    pub total_drive_minutes: i64,
}

/// One already-scheduled interval for a guide on this date, carrying the
/// run's primary pickup zone so the travel-time bonus (step 4) can look at
/// the guide's most recent drop-off.
#[derive(Debug, Clone, Copy)]
struct ScheduleEntry {
    start: i64,
    end: i64,
    zone: Option<ZoneId>,
}

pub async fn optimize<R>(
    store: &R,
    config: &DispatchConfig,
    organization_id: OrganizationId,
    date: NaiveDate,
) -> Result<OptimizationResult>
where
    R: BookingRepository
        + GuideRepository
        + AvailabilityRepository
        + QualificationRepository
        + TravelTimeRepository
        + AssignmentRepository
        + PickupRepository
        + DispatchStatusRepository
        + CustomerHistoryRepository
        + ?Sized,
{
    dispatch_store::assert_not_dispatched(store, organization_id, date, "optimize").await?;

    let runs = aggregator::tour_runs_for_date(store, organization_id, date).await?;
    let bookings_with_tour = store.list_dispatchable_for_date(organization_id, date).await?;
    let bookings_by_id: HashMap<_, _> = bookings_with_tour
        .iter()
        .map(|bt| (bt.booking.id, bt.booking.clone()))
        .collect();
    let tours_by_id: HashMap<TourId, Tour> = bookings_with_tour
        .iter()
        .map(|bt| (bt.tour.id, bt.tour.clone()))
        .collect();

    let bookings_by_run: HashMap<&str, Vec<&Booking>> = {
        let mut m: HashMap<&str, Vec<&Booking>> = HashMap::new();
        for r in &runs {
            let bs: Vec<&Booking> = r.bookings.iter().filter_map(|id| bookings_by_id.get(id)).collect();
            m.insert(r.key.as_str(), bs);
        }
        m
    };
    let primary_zone_by_run: HashMap<&str, Option<ZoneId>> = bookings_by_run
        .iter()
        .map(|(key, bs)| (*key, primary_zone(bs)))
        .collect();

    // Guides and the travel-time matrix come from unrelated tables; fetch
    // them concurrently rather than paying two sequential round trips.
    let (guides, matrix) = futures::try_join!(store.list_active_for_date(organization_id, date), store.matrix(organization_id))?;
    let guides_by_id: HashMap<GuideId, Guide> = guides.iter().map(|g| (g.id, g.clone())).collect();
    let guide_ids: Vec<GuideId> = guides.iter().map(|g| g.id).collect();
    let availability = crate::availability::resolve_batch(store, organization_id, &guide_ids, date).await;

    let mut qualifications: HashMap<TourId, HashSet<GuideId>> = HashMap::new();
    for run in &runs {
        if !qualifications.contains_key(&run.tour_id) {
            let q = store.guides_qualified_for_tour(organization_id, run.tour_id).await?;
            qualifications.insert(run.tour_id, q);
        }
    }

    let mut schedule: HashMap<GuideId, Vec<ScheduleEntry>> = HashMap::new();
    let confirmed = store.confirmed_for_date(organization_id, date).await?;
    for a in &confirmed {
        let Assignee::InternalGuide(guide_id) = a.assignee else { continue };
        let Some(booking) = bookings_by_id.get(&a.booking_id) else { continue };
        let Some(tour) = tours_by_id.get(&booking.tour_id) else { continue };
        let start = time::minutes(&booking.booking_time)?;
        let end = start + tour.duration_minutes as i64;
        let key = time::tour_run_key(booking.tour_id, booking.booking_date, &booking.booking_time);
        schedule.entry(guide_id).or_default().push(ScheduleEntry {
            start,
            end,
            zone: primary_zone_by_run.get(key.as_str()).copied().flatten(),
        });
    }

    let mut candidates: Vec<&TourRun> = runs.iter().filter(|r| !r.status.is_fully_staffed()).collect();
    candidates.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| b.total_guests.cmp(&a.total_guests)).then_with(|| a.key.cmp(&b.key)));

    let now = Utc::now();
    let mut new_assignments: Vec<GuideAssignment> = Vec::new();
    let mut new_warnings: Vec<Warning> = Vec::new();

    for run in candidates {
        let Some(tour) = tours_by_id.get(&run.tour_id) else { continue };
        let run_start = time::minutes(&run.time)?;
        let run_end = run_start + tour.duration_minutes as i64;
        let per_guide_share = crate::domain::tour::ceil_div(run.total_guests, run.guides_needed.max(1));
        let run_primary_zone = primary_zone_by_run.get(run.key.as_str()).copied().flatten();

        let qualified: HashSet<GuideId> = qualifications.get(&run.tour_id).cloned().unwrap_or_default();
        let qualified_guides: Vec<&Guide> = guides.iter().filter(|g| qualified.contains(&g.id)).collect();

        let available_guides: Vec<&Guide> = qualified_guides
            .iter()
            .copied()
            .filter(|g| {
                let Some(window) = availability.get(&g.id) else { return false };
                window.is_available
                    && window
                        .start_time
                        .as_deref()
                        .and_then(|s| time::minutes(s).ok())
                        .is_some_and(|s| s <= run_start)
                    && window
                        .end_time
                        .as_deref()
                        .and_then(|e| time::minutes(e).ok())
                        .is_some_and(|e| e >= run_end)
            })
            .collect();

        let non_conflicting: Vec<&Guide> = available_guides
            .iter()
            .copied()
            .filter(|g| {
                schedule
                    .get(&g.id)
                    .is_none_or(|entries| !entries.iter().any(|e| intervals_overlap(run_start, run_end, e.start, e.end)))
            })
            .collect();

        let capacity_ok: Vec<&Guide> = non_conflicting.iter().copied().filter(|g| g.vehicle_capacity >= per_guide_share).collect();

        if qualified_guides.is_empty() {
            new_warnings.push(make_warning(
                WarningType::NoQualifiedGuide,
                Some(run.key.clone()),
                None,
                format!("no guide at {} is qualified for this tour", run.time),
                alternatives(&guides, &qualified, config.max_alternatives_per_warning),
            ));
            continue;
        }
        if non_conflicting.is_empty() {
            new_warnings.push(make_warning(
                WarningType::NoAvailableGuide,
                Some(run.key.clone()),
                None,
                format!("no qualified guide is available for the run at {}", run.time),
                alternatives(&guides, &qualified, config.max_alternatives_per_warning),
            ));
            continue;
        }
        if capacity_ok.is_empty() {
            new_warnings.push(make_warning(
                WarningType::CapacityExceeded,
                Some(run.key.clone()),
                None,
                format!("no available guide's vehicle can carry {per_guide_share} guests"),
                alternatives(&guides, &qualified, config.max_alternatives_per_warning),
            ));
            continue;
        }

        let mut scored: Vec<(i64, GuideId)> = capacity_ok
            .iter()
            .map(|g| {
                let workload = schedule.get(&g.id).map(|v| v.len()).unwrap_or(0) as i64;
                let headroom = g.vehicle_capacity as i64 - run.total_guests as i64;
                let mut score = 50i64 - 10 * workload;
                score += if (0..=2).contains(&headroom) {
                    20
                } else if headroom < 0 {
                    -30
                } else {
                    0
                };
                score += travel_bonus(&matrix, last_zone(&schedule, g, run_start), run_primary_zone);
                (score, g.id)
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        let slots_needed = (run.guides_needed - run.guides_assigned) as usize;
        if scored.len() < slots_needed {
            new_warnings.push(make_warning(
                WarningType::InsufficientGuides,
                Some(run.key.clone()),
                None,
                format!(
                    "only {} of {} needed guide(s) are assignable at {}",
                    scored.len(),
                    slots_needed,
                    run.time
                ),
                alternatives(&guides, &qualified, config.max_alternatives_per_warning),
            ));
        }
        let chosen: Vec<GuideId> = scored.iter().take(slots_needed).map(|(_, id)| id).copied().collect();
        if chosen.is_empty() {
            continue;
        }

        let unassigned: Vec<&Booking> = bookings_by_run
            .get(run.key.as_str())
            .into_iter()
            .flatten()
            .filter(|b| !confirmed.iter().any(|a| a.booking_id == b.id))
            .copied()
            .collect();

        let (placements, conflict) = place_bookings(&unassigned, &chosen, &guides_by_id);
        if conflict {
            new_warnings.push(make_warning(
                WarningType::Conflict,
                Some(run.key.clone()),
                None,
                format!("charter exclusivity could not be honored for every booking at {}", run.time),
                alternatives(&guides, &qualified, config.max_alternatives_per_warning),
            ));
        }

        for (booking_id, guide_id) in placements {
            let assignment = GuideAssignment::new_confirmed(booking_id, Assignee::InternalGuide(guide_id), now);
            store.upsert_confirmed(organization_id, assignment.clone()).await?;
            schedule.entry(guide_id).or_default().push(ScheduleEntry {
                start: run_start,
                end: run_end,
                zone: run_primary_zone,
            });
            new_assignments.push(assignment);
        }
    }

    pickup_sync::sync_date(store, config, organization_id, date).await?;

    let mut status = store.get_or_create(organization_id, date).await?;
    status.warnings.retain(|w| w.resolved || !is_optimizer_warning(w.warning_type));
    status.warnings.extend(new_warnings);
    status.optimized_at = Some(now);
    store.save(organization_id, status).await?;

    let refreshed = dispatch_store::refresh(store, organization_id, date).await?;
    Ok(OptimizationResult {
        assignments: new_assignments,
        warnings: refreshed.warnings.iter().filter(|w| !w.resolved).cloned().collect(),
        efficiency: refreshed.efficiency_score,
        total_drive_minutes: refreshed.total_drive_minutes,
    })
}

fn is_optimizer_warning(t: WarningType) -> bool {
    matches!(
        t,
        WarningType::InsufficientGuides
            | WarningType::CapacityExceeded
            | WarningType::NoQualifiedGuide
            | WarningType::NoAvailableGuide
            | WarningType::Conflict
    )
}

fn make_warning(
    warning_type: WarningType,
    tour_run_key: Option<String>,
    booking_id: Option<crate::domain::ids::BookingId>,
    message: String,
    resolutions: Vec<WarningResolutionOption>,
) -> Warning {
    Warning {
        id: WarningId::new(),
        warning_type,
        tour_run_key,
        booking_id,
        message,
        resolutions,
        resolved: false,
        resolved_at: None,
        resolution: None,
    }
}

/// Up to three alternative guides (qualified-but-unavailable, or
/// unqualified-but-free, shown with the same shape) plus a trailing
/// `add_external` option.
fn alternatives(guides: &[Guide], qualified: &HashSet<GuideId>, max: usize) -> Vec<WarningResolutionOption> {
    let mut out: Vec<WarningResolutionOption> = guides
        .iter()
        .filter(|g| qualified.contains(&g.id))
        .take(max)
        .map(|g| WarningResolutionOption::AssignGuide {
            guide_id: g.id,
            reason: "qualified but unavailable or at capacity".into(),
        })
        .collect();
    if out.len() < max {
        let remaining = max - out.len();
        out.extend(
            guides
                .iter()
                .filter(|g| !qualified.contains(&g.id))
                .take(remaining)
                .map(|g| WarningResolutionOption::AssignGuide {
                    guide_id: g.id,
                    reason: "unqualified but free".into(),
                }),
        );
    }
    out.push(WarningResolutionOption::AddExternal);
    out
}

/// Mode of `pickup_zone_id` among a run's bookings; ties broken by the
/// smaller zone id for determinism.
fn primary_zone(bookings: &[&Booking]) -> Option<ZoneId> {
    let mut counts: HashMap<ZoneId, u32> = HashMap::new();
    for b in bookings {
        if let Some(z) = b.pickup_zone_id {
            *counts.entry(z).or_insert(0) += 1;
        }
    }
    counts.into_iter().max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0))).map(|(z, _)| z)
}

fn last_zone(schedule: &HashMap<GuideId, Vec<ScheduleEntry>>, guide: &Guide, before: i64) -> Option<ZoneId> {
    schedule
        .get(&guide.id)
        .and_then(|entries| entries.iter().filter(|e| e.end <= before).max_by_key(|e| e.end))
        .and_then(|e| e.zone)
        .or(guide.baseline_zone_id)
}

/// Not pinned to a specific formula; this crate's chosen one (documented
/// in DESIGN.md): an exact zone match is worth more than a merely nearby
/// one, and a long drive earns nothing.
fn travel_bonus(matrix: &[ZoneTravelTime], from: Option<ZoneId>, to: Option<ZoneId>) -> i64 {
    match (from, to) {
        (Some(f), Some(t)) if f == t => 15,
        (Some(f), Some(t)) => (10 - lookup_minutes(matrix, f, t)).max(0),
        _ => 0,
    }
}

/// Distributes a run's unassigned bookings across the chosen guides.
/// Charter bookings must each land on a guide with no other booking in the
/// run; when there are more charter bookings than chosen guides, the
/// surplus (and every non-charter booking, since exclusivity can no
/// longer be guaranteed for the guides that would be shared) is left
/// unassigned and `conflict` is reported instead of silently violating
/// the charter-exclusivity invariant. An ordinary non-charter booking that
/// simply doesn't fit in any chosen guide's remaining capacity is left
/// unassigned too, but that is an `insufficient_guides` condition (already
/// reported by the caller), not a charter conflict, so it does not set the
/// returned flag.
fn place_bookings(
    unassigned: &[&Booking],
    chosen: &[GuideId],
    guides_by_id: &HashMap<GuideId, Guide>,
) -> (Vec<(crate::domain::ids::BookingId, GuideId)>, bool) {
    let mut charter: Vec<&Booking> = unassigned.iter().filter(|b| b.is_charter()).copied().collect();
    let mut others: Vec<&Booking> = unassigned.iter().filter(|b| !b.is_charter()).copied().collect();
    charter.sort_by_key(|b| b.created_at);
    others.sort_by(|a, b| b.total_participants.cmp(&a.total_participants).then_with(|| a.created_at.cmp(&b.created_at)));

    if charter.len() > chosen.len() {
        let placements = charter
            .iter()
            .zip(chosen.iter())
            .map(|(b, g)| (b.id, *g))
            .collect();
        return (placements, true);
    }

    let mut placements = Vec::new();
    let mut remaining_capacity: HashMap<GuideId, i64> = chosen
        .iter()
        .map(|g| (*g, guides_by_id.get(g).map(|guide| guide.vehicle_capacity as i64).unwrap_or(0)))
        .collect();

    for (b, g) in charter.iter().zip(chosen.iter()) {
        placements.push((b.id, *g));
        remaining_capacity.insert(*g, 0);
    }

    let free_guides: Vec<GuideId> = chosen[charter.len()..].to_vec();
    if free_guides.is_empty() {
        return (placements, !others.is_empty());
    }
    let mut cursor = 0usize;
    for b in &others {
        let start = cursor;
        loop {
            let g = free_guides[cursor % free_guides.len()];
            cursor = (cursor + 1) % free_guides.len();
            let cap = remaining_capacity.entry(g).or_insert(0);
            if *cap >= b.total_participants as i64 {
                *cap -= b.total_participants as i64;
                placements.push((b.id, g));
                break;
            }
            if cursor == start {
                break;
            }
        }
    }
    (placements, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::booking::{Booking, BookingStatus, ExperienceMode};
    use crate::domain::guide::{Guide, GuideStatus, WeeklyAvailability};
    use crate::domain::ids::{BookingId, CustomerId, GuideId, OrganizationId, TourId};
    use crate::domain::tour::Tour;
    use crate::store::memory::InMemoryStore;
    use std::collections::HashSet as StdHashSet;

    fn tour(org: OrganizationId, guests_per_guide: u32) -> Tour {
        Tour {
            id: TourId::new(),
            organization_id: org,
            name: "Harbor Walk".into(),
            duration_minutes: 240,
            guests_per_guide,
        }
    }

    fn booking(org: OrganizationId, tour_id: TourId, date: NaiveDate, time: &str, guests: u32) -> Booking {
        Booking {
            id: BookingId::new(),
            organization_id: org,
            tour_id,
            customer_id: CustomerId::new(),
            booking_date: date,
            booking_time: time.into(),
            total_participants: guests,
            status: BookingStatus::Confirmed,
            pickup_zone_id: None,
            pickup_location: String::new(),
            pickup_time: None,
            experience_mode: Some(ExperienceMode::Join),
            created_at: Utc::now(),
        }
    }

    fn guide(org: OrganizationId, capacity: u32) -> Guide {
        Guide {
            id: GuideId::new(),
            organization_id: org,
            first_name: "A".into(),
            last_name: "B".into(),
            status: GuideStatus::Active,
            vehicle_capacity: capacity,
            languages: StdHashSet::new(),
            baseline_zone_id: None,
            phone: None,
            temporary_for_date: None,
        }
    }

    async fn seed_available(store: &InMemoryStore, date: NaiveDate, guide_id: GuideId) {
        store
            .seed_weekly(WeeklyAvailability {
                guide_id,
                day_of_week: crate::time::day_of_week(date),
                start_time: "08:00".into(),
                end_time: "18:00".into(),
                is_available: true,
            })
            .await;
    }

    #[tokio::test]
    async fn s1_single_run_straightforward_assign() {
        let store = InMemoryStore::new();
        let org = OrganizationId::new();
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let t = tour(org, 6);
        store.seed_tour(t.clone()).await;
        store.seed_booking(booking(org, t.id, date, "09:00", 4)).await;
        let g = guide(org, 6);
        store.seed_guide(g.clone()).await;
        store.seed_qualification(t.id, g.id).await;
        seed_available(&store, date, g.id).await;
        let config = DispatchConfig::default();

        let result = optimize(&store, &config, org, date).await.unwrap();
        assert_eq!(result.assignments.len(), 1);
        assert_eq!(result.assignments[0].pickup_order, Some(1));
        assert_eq!(result.assignments[0].drive_time_minutes, Some(0));
        assert_eq!(result.efficiency, 100);
        assert!(result.warnings.is_empty());
    }

    #[tokio::test]
    async fn s2_insufficient_guides() {
        let store = InMemoryStore::new();
        let org = OrganizationId::new();
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let t = tour(org, 6);
        store.seed_tour(t.clone()).await;
        store.seed_booking(booking(org, t.id, date, "09:00", 6)).await;
        store.seed_booking(booking(org, t.id, date, "09:00", 5)).await;
        let g = guide(org, 6);
        store.seed_guide(g.clone()).await;
        store.seed_qualification(t.id, g.id).await;
        seed_available(&store, date, g.id).await;
        let config = DispatchConfig::default();

        let result = optimize(&store, &config, org, date).await.unwrap();
        assert_eq!(result.assignments.len(), 1);
        assert_eq!(result.assignments[0].pickup_order, Some(1));
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].warning_type, WarningType::InsufficientGuides);
        assert_eq!(result.efficiency, 50);
    }

    #[tokio::test]
    async fn optimize_is_deterministic_on_rerun() {
        let store = InMemoryStore::new();
        let org = OrganizationId::new();
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let t = tour(org, 6);
        store.seed_tour(t.clone()).await;
        store.seed_booking(booking(org, t.id, date, "09:00", 4)).await;
        let g = guide(org, 6);
        store.seed_guide(g.clone()).await;
        store.seed_qualification(t.id, g.id).await;
        seed_available(&store, date, g.id).await;
        let config = DispatchConfig::default();

        let first = optimize(&store, &config, org, date).await.unwrap();
        let second = optimize(&store, &config, org, date).await.unwrap();
        assert_eq!(first.assignments.len(), second.assignments.len());
        assert_eq!(first.efficiency, second.efficiency);
        assert_eq!(first.warnings.len(), second.warnings.len());
    }
}
