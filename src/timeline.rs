//! Guide-timeline reconstruction.
//!
//! Produces one [`GuideTimeline`] per available internal guide plus one
//! synthetic timeline per distinct outsourced guide name bound to the
//! date, each a list of non-overlapping segments covering the guide's
//! working window.

use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};

use crate::aggregator;
use crate::domain::assignment::Assignee;
use crate::domain::booking::Booking;
use crate::domain::ids::{GuideId, OrganizationId};
use crate::domain::pickup::PickupAssignment;
use crate::domain::tour::Tour;
use crate::domain::tour_run::{TourRun, TourRunStatus};
use crate::error::Result;
use crate::store::{AssignmentRepository, AvailabilityRepository, BookingRepository, GuideRepository, PickupRepository};
use crate::time;

pub const PICKUP_DURATION_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Idle,
    Drive,
    Pickup,
    Tour,
}

/// Confidence a segment's plan is trustworthy, derived from the owning
/// run's staffing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    Optimal,
    Review,
    Problem,
}

fn confidence_for_run(run: &TourRun, tour: &Tour) -> Confidence {
    match run.status {
        TourRunStatus::Unassigned => Confidence::Problem,
        TourRunStatus::Assigned if tour.guests_per_guide <= 8 => Confidence::Optimal,
        _ => Confidence::Review,
    }
}

#[derive(Debug, Clone)]
pub struct Segment {
    pub kind: SegmentKind,
    pub start_minutes: i64,
    pub end_minutes: i64,
    pub guest_count: Option<u32>,
    pub confidence: Option<Confidence>,
}

impl Segment {
    fn duration(&self) -> i64 {
        self.end_minutes - self.start_minutes
    }
}

#[derive(Debug, Clone)]
pub struct GuideTimeline {
    pub assignee_key: String,
    pub guide_id: Option<GuideId>,
    pub outsourced_name: Option<String>,
    pub date: NaiveDate,
    pub segments: Vec<Segment>,
    pub utilization: u8,
    pub total_drive_minutes: i64,
    pub total_guests: u32,
}

struct RunContext<'a> {
    run: &'a TourRun,
    tour: &'a Tour,
    start: i64,
    end: i64,
}

pub async fn guide_timelines_for_date<R>(
    store: &R,
    organization_id: OrganizationId,
    date: NaiveDate,
) -> Result<Vec<GuideTimeline>>
where
    R: BookingRepository + GuideRepository + AvailabilityRepository + AssignmentRepository + PickupRepository + ?Sized,
{
    let runs = aggregator::tour_runs_for_date(store, organization_id, date).await?;
    let bookings_with_tour = store.list_dispatchable_for_date(organization_id, date).await?;
    let bookings_by_id: HashMap<_, _> = bookings_with_tour.iter().map(|bt| (bt.booking.id, bt.booking.clone())).collect();
    let tours_by_id: HashMap<_, _> = bookings_with_tour.iter().map(|bt| (bt.tour.id, bt.tour.clone())).collect();

    let confirmed = store.confirmed_for_date(organization_id, date).await?;
    let mut runs_by_assignee: HashMap<String, Vec<&TourRun>> = HashMap::new();
    let mut assignee_sample: HashMap<String, Assignee> = HashMap::new();
    for a in &confirmed {
        let Some(booking) = bookings_by_id.get(&a.booking_id) else { continue };
        let key = time::tour_run_key(booking.tour_id, booking.booking_date, &booking.booking_time);
        let Some(run) = runs.iter().find(|r| r.key == key) else { continue };
        let assignee_key = a.assignee.dedup_key();
        assignee_sample.entry(assignee_key.clone()).or_insert_with(|| a.assignee.clone());
        let entry = runs_by_assignee.entry(assignee_key).or_default();
        if !entry.iter().any(|r| r.key == run.key) {
            entry.push(run);
        }
    }

    let guides = store.list_active_for_date(organization_id, date).await?;
    let guide_ids: Vec<GuideId> = guides.iter().map(|g| g.id).collect();
    let availability = crate::availability::resolve_batch(store, organization_id, &guide_ids, date).await;

    let mut timelines = Vec::new();
    for guide in &guides {
        let empty = Vec::new();
        let runs_for_guide = runs_by_assignee.get(&guide.id.to_string()).unwrap_or(&empty);
        let window = availability.get(&guide.id).and_then(|w| {
            let start = w.start_time.as_deref().and_then(|s| time::minutes(s).ok())?;
            let end = w.end_time.as_deref().and_then(|e| time::minutes(e).ok())?;
            Some((start, end))
        });
        let (from, to) = match window {
            Some(w) => w,
            None => fallback_window(runs_for_guide, &tours_by_id),
        };
        let timeline = build_timeline(
            guide.id.to_string(),
            Some(guide.id),
            None,
            date,
            from,
            to,
            runs_for_guide,
            &tours_by_id,
            &bookings_by_id,
            store,
            organization_id,
        )
        .await?;
        timelines.push(timeline);
    }

    // Synthetic timelines for outsourced guides, one per distinct name.
    for (assignee_key, assignee) in &assignee_sample {
        let Assignee::External { name, .. } = assignee else { continue };
        let runs_for_name = runs_by_assignee.get(assignee_key).cloned().unwrap_or_default();
        let (from, to) = fallback_window(&runs_for_name, &tours_by_id);
        let timeline = build_timeline(
            assignee_key.clone(),
            None,
            Some(name.clone()),
            date,
            from,
            to,
            &runs_for_name,
            &tours_by_id,
            &bookings_by_id,
            store,
            organization_id,
        )
        .await?;
        timelines.push(timeline);
    }

    timelines.sort_by(|a, b| a.assignee_key.cmp(&b.assignee_key));
    Ok(timelines)
}

/// No modeled availability window (the outsourced case, or an internal
/// guide with a hole in its availability rows): bound the day tightly to
/// the guide's own runs so no spurious leading/trailing idle is reported.
fn fallback_window(runs: &[&TourRun], tours_by_id: &HashMap<crate::domain::ids::TourId, Tour>) -> (i64, i64) {
    let mut from = i64::MAX;
    let mut to = i64::MIN;
    for run in runs {
        let Some(tour) = tours_by_id.get(&run.tour_id) else { continue };
        let Ok(start) = time::minutes(&run.time) else { continue };
        let end = start + tour.duration_minutes as i64;
        from = from.min(start);
        to = to.max(end);
    }
    if from > to {
        (0, 0)
    } else {
        (from, to)
    }
}

#[allow(clippy::too_many_arguments)]
async fn build_timeline<R>(
    assignee_key: String,
    guide_id: Option<GuideId>,
    outsourced_name: Option<String>,
    date: NaiveDate,
    available_from: i64,
    available_to: i64,
    runs: &[&TourRun],
    tours_by_id: &HashMap<crate::domain::ids::TourId, Tour>,
    bookings_by_id: &HashMap<crate::domain::ids::BookingId, Booking>,
    store: &R,
    organization_id: OrganizationId,
) -> Result<GuideTimeline>
where
    R: PickupRepository + ?Sized,
{
    let mut sorted_runs: Vec<&TourRun> = runs.to_vec();
    sorted_runs.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.key.cmp(&b.key)));

    let mut contexts = Vec::new();
    for run in &sorted_runs {
        let Some(tour) = tours_by_id.get(&run.tour_id) else { continue };
        let start = time::minutes(&run.time)?;
        let end = start + tour.duration_minutes as i64;
        contexts.push(RunContext { run, tour, start, end });
    }

    let mut segments: Vec<Segment> = Vec::new();
    let mut cursor = available_from;
    let mut work_active = false;

    for ctx in &contexts {
        let confidence = Some(confidence_for_run(ctx.run, ctx.tour));
        let mut pickups = store.for_schedule(organization_id, &ctx.run.key).await?;
        pickups.retain(|p| {
            bookings_by_id
                .get(&p.booking_id)
                .is_some_and(|b| ctx.run.bookings.contains(&b.id))
        });
        pickups.sort_by_key(|p| p.pickup_order);

        if pickups.is_empty() {
            if ctx.start > cursor {
                segments.push(idle(cursor, ctx.start));
            }
            let guest_count = crate::domain::tour::ceil_div(ctx.run.total_guests, ctx.run.guides_assigned.max(1));
            segments.push(Segment {
                kind: SegmentKind::Tour,
                start_minutes: ctx.start,
                end_minutes: ctx.end,
                guest_count: Some(guest_count),
                confidence,
            });
            cursor = ctx.end;
            work_active = true;
            continue;
        }

        let first_start = pickup_start(&pickups[0])?;
        if first_start > cursor {
            segments.push(idle(cursor, first_start));
        }
        cursor = first_start;

        for pickup in &pickups {
            let start = pickup_start(pickup)?;
            if start > cursor {
                if work_active {
                    segments.push(drive(cursor, start));
                } else {
                    segments.push(idle(cursor, start));
                }
            }
            let end = start + PICKUP_DURATION_MINUTES;
            let guest_count = bookings_by_id.get(&pickup.booking_id).map(|b| b.total_participants).unwrap_or(pickup.passenger_count);
            segments.push(Segment {
                kind: SegmentKind::Pickup,
                start_minutes: start,
                end_minutes: end,
                guest_count: Some(guest_count),
                confidence,
            });
            cursor = end;
            work_active = true;
        }

        if ctx.start > cursor {
            segments.push(drive(cursor, ctx.start));
            cursor = ctx.start;
        }
        segments.push(Segment {
            kind: SegmentKind::Tour,
            start_minutes: ctx.start,
            end_minutes: ctx.end,
            guest_count: None,
            confidence,
        });
        cursor = ctx.end;
    }

    if available_to > cursor {
        segments.push(idle(cursor, available_to));
    }

    let work_minutes: i64 = segments
        .iter()
        .filter(|s| matches!(s.kind, SegmentKind::Tour | SegmentKind::Pickup | SegmentKind::Drive))
        .map(|s| s.duration())
        .sum();
    let available_minutes = (available_to - available_from).max(0);
    let utilization = if available_minutes == 0 {
        0
    } else {
        ((100 * work_minutes) / available_minutes).clamp(0, 100) as u8
    };
    let total_drive_minutes: i64 = segments.iter().filter(|s| s.kind == SegmentKind::Drive).map(|s| s.duration()).sum();
    let total_guests: u32 = segments
        .iter()
        .filter(|s| matches!(s.kind, SegmentKind::Pickup | SegmentKind::Tour))
        .filter_map(|s| s.guest_count)
        .sum();

    Ok(GuideTimeline {
        assignee_key,
        guide_id,
        outsourced_name,
        date,
        segments,
        utilization,
        total_drive_minutes,
        total_guests,
    })
}

fn pickup_start(pickup: &PickupAssignment) -> Result<i64> {
    time::minutes(&pickup.estimated_pickup_time)
}

fn idle(start: i64, end: i64) -> Segment {
    Segment {
        kind: SegmentKind::Idle,
        start_minutes: start,
        end_minutes: end,
        guest_count: None,
        confidence: None,
    }
}

fn drive(start: i64, end: i64) -> Segment {
    Segment {
        kind: SegmentKind::Drive,
        start_minutes: start,
        end_minutes: end,
        guest_count: None,
        confidence: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchConfig;
    use crate::domain::booking::{Booking, BookingStatus};
    use crate::domain::guide::{Guide, GuideStatus, WeeklyAvailability};
    use crate::domain::ids::{BookingId, CustomerId, GuideId, TourId};
    use crate::store::memory::InMemoryStore;
    use std::collections::HashSet as StdHashSet;

    fn tour(org: OrganizationId, duration: u32) -> Tour {
        Tour {
            id: TourId::new(),
            organization_id: org,
            name: "Harbor Walk".into(),
            duration_minutes: duration,
            guests_per_guide: 6,
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
            experience_mode: None,
            created_at: chrono::Utc::now(),
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

    #[tokio::test]
    async fn single_run_produces_idle_tour_idle() {
        let store = InMemoryStore::new();
        let org = OrganizationId::new();
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let t = tour(org, 240);
        store.seed_tour(t.clone()).await;
        let b = booking(org, t.id, date, "09:00", 4);
        store.seed_booking(b.clone()).await;
        let g = guide(org, 6);
        store.seed_guide(g.clone()).await;
        store.seed_qualification(t.id, g.id).await;
        store
            .seed_weekly(WeeklyAvailability {
                guide_id: g.id,
                day_of_week: crate::time::day_of_week(date),
                start_time: "08:00".into(),
                end_time: "18:00".into(),
                is_available: true,
            })
            .await;
        let config = DispatchConfig::default();
        crate::optimizer::optimize(&store, &config, org, date).await.unwrap();

        let timelines = guide_timelines_for_date(&store, org, date).await.unwrap();
        let timeline = timelines.iter().find(|t| t.guide_id == Some(g.id)).unwrap();
        assert!(timeline.segments.iter().any(|s| s.kind == SegmentKind::Tour));
        assert!(timeline.utilization <= 100);
    }
}
