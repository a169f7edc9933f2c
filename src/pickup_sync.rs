//! Pickup-order synchronizer. Runs after any
//! assignment mutation (optimizer, batch engine, warning resolutions) to
//! derive `pickupOrder`, `estimatedPickupTime`, and `driveTimeMinutes` from
//! the confirmed assignments of a date, then reconciles the persisted
//! pickup-assignment rows and mirrors the derived fields back onto the
//! guide-assignment rows.

use chrono::NaiveDate;
use std::collections::HashMap;

use crate::config::DispatchConfig;
use crate::domain::assignment::GuideAssignment;
use crate::domain::booking::Booking;
use crate::domain::ids::{BookingId, OrganizationId};
use crate::domain::pickup::{PickupAssignment, PickupStatus};
use crate::error::Result;
use crate::store::{AssignmentRepository, BookingRepository, PickupRepository};
use crate::time::{self, tour_run_key};

struct GroupEntry {
    booking: Booking,
    assignment: GuideAssignment,
    known_time: Option<i64>,
}

pub async fn sync_date<R>(store: &R, config: &DispatchConfig, organization_id: OrganizationId, date: NaiveDate) -> Result<()>
where
    R: BookingRepository + AssignmentRepository + PickupRepository + ?Sized,
{
    let confirmed = store.confirmed_for_date(organization_id, date).await?;

    // Step 2: collapse to one assignment per booking, keeping the most
    // recently assigned.
    let mut by_booking: HashMap<BookingId, GuideAssignment> = HashMap::new();
    for a in confirmed {
        by_booking
            .entry(a.booking_id)
            .and_modify(|existing| {
                if a.assigned_at > existing.assigned_at {
                    *existing = a.clone();
                }
            })
            .or_insert(a);
    }

    // Step 3: group by (tourRunKey, effectiveGuideKey).
    let mut groups: HashMap<(String, String), Vec<GroupEntry>> = HashMap::new();
    for (booking_id, assignment) in by_booking {
        let booking = store.get(organization_id, booking_id).await?;
        let key = tour_run_key(booking.tour_id, booking.booking_date, &booking.booking_time);
        let guide_key = assignment.assignee.dedup_key();
        let known_time = booking.pickup_time.as_deref().map(time::minutes).transpose()?;
        groups.entry((key, guide_key)).or_default().push(GroupEntry {
            booking,
            assignment,
            known_time,
        });
    }

    for ((schedule_id, _guide_key), mut entries) in groups {
        let run_time = time::minutes(entries[0].booking.booking_time.as_str())?;
        let anchor = entries.iter().filter_map(|e| e.known_time).min().unwrap_or(run_time);

        let step = config.default_pickup_minutes + config.default_drive_minutes;
        let mut unknown_indices: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.known_time.is_none())
            .map(|(i, _)| i)
            .collect();
        unknown_indices.sort_by_key(|&i| entries[i].booking.created_at);
        let n = unknown_indices.len();
        for (rank, idx) in unknown_indices.into_iter().enumerate() {
            let offset = step * (n - rank) as i64;
            entries[idx].known_time = Some((anchor - offset).max(0));
        }

        entries.sort_by(|a, b| {
            a.known_time
                .unwrap()
                .cmp(&b.known_time.unwrap())
                .then_with(|| a.booking.created_at.cmp(&b.booking.created_at))
        });

        let mut desired: HashMap<BookingId, (u32, String, i64)> = HashMap::new();
        let mut prev_time: Option<i64> = None;
        for (order, entry) in entries.iter().enumerate() {
            let this_time = entry.known_time.unwrap();
            let drive_time = match prev_time {
                Some(prev) => (this_time - prev - config.default_pickup_minutes).max(0),
                None => 0,
            };
            let pickup_order = (order + 1) as u32;
            let pickup_time_str = time::format_minutes(this_time.clamp(0, 24 * 60))?;
            desired.insert(entry.booking.id, (pickup_order, pickup_time_str, drive_time));
            prev_time = Some(this_time);
        }

        reconcile_schedule(store, organization_id, &schedule_id, &entries, &desired).await?;

        for entry in &entries {
            let (order, ref pickup_time_str, drive_time) = desired[&entry.booking.id];
            store
                .update_pickup_fields(organization_id, entry.assignment.id, Some(order), Some(pickup_time_str.clone()), Some(drive_time))
                .await?;
        }
    }

    Ok(())
}

async fn reconcile_schedule<R>(
    store: &R,
    organization_id: OrganizationId,
    schedule_id: &str,
    entries: &[GroupEntry],
    desired: &HashMap<BookingId, (u32, String, i64)>,
) -> Result<()>
where
    R: PickupRepository + ?Sized,
{
    let existing = store.for_schedule(organization_id, schedule_id).await?;
    let existing_by_booking: HashMap<BookingId, PickupAssignment> = existing.into_iter().map(|p| (p.booking_id, p)).collect();

    for entry in entries {
        let (order, ref pickup_time_str, _) = desired[&entry.booking.id];
        let row = if let Some(existing) = existing_by_booking.get(&entry.booking.id) {
            PickupAssignment {
                pickup_order: order,
                estimated_pickup_time: pickup_time_str.clone(),
                passenger_count: entry.booking.total_participants,
                guide_assignment_id: entry.assignment.id,
                ..existing.clone()
            }
        } else {
            PickupAssignment {
                id: crate::domain::ids::PickupAssignmentId::new(),
                booking_id: entry.booking.id,
                guide_assignment_id: entry.assignment.id,
                schedule_id: schedule_id.to_string(),
                pickup_order: order,
                estimated_pickup_time: pickup_time_str.clone(),
                passenger_count: entry.booking.total_participants,
                status: PickupStatus::Pending,
            }
        };
        store.upsert(organization_id, row).await?;
    }

    for (booking_id, row) in &existing_by_booking {
        if !desired.contains_key(booking_id) {
            store.delete(organization_id, row.id).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::assignment::Assignee;
    use crate::domain::booking::BookingStatus;
    use crate::domain::ids::{CustomerId, GuideId, TourId};
    use crate::store::memory::InMemoryStore;
    use chrono::{Duration, Utc};

    fn booking(org: OrganizationId, tour_id: TourId, date: NaiveDate, time: &str, created_offset_secs: i64) -> Booking {
        Booking {
            id: BookingId::new(),
            organization_id: org,
            tour_id,
            customer_id: CustomerId::new(),
            booking_date: date,
            booking_time: time.into(),
            total_participants: 2,
            status: BookingStatus::Confirmed,
            pickup_zone_id: None,
            pickup_location: String::new(),
            pickup_time: None,
            experience_mode: None,
            created_at: Utc::now() + Duration::seconds(created_offset_secs),
        }
    }

    #[tokio::test]
    async fn single_booking_gets_order_one_and_zero_drive() {
        let store = InMemoryStore::new();
        let org = OrganizationId::new();
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let tour_id = TourId::new();
        let b = booking(org, tour_id, date, "09:00", 0);
        store.seed_booking(b.clone()).await;
        let guide_id = GuideId::new();
        let assignment = GuideAssignment::new_confirmed(b.id, Assignee::InternalGuide(guide_id), Utc::now());
        store.upsert_confirmed(org, assignment.clone()).await.unwrap();

        let config = DispatchConfig::default();
        sync_date(&store, &config, org, date).await.unwrap();

        let rows = store.for_schedule(org, &tour_run_key(tour_id, date, "09:00")).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pickup_order, 1);
        assert_eq!(rows[0].estimated_pickup_time, "09:00");

        let updated = store.get(org, assignment.id).await.unwrap();
        assert_eq!(updated.drive_time_minutes, Some(0));
        assert_eq!(updated.pickup_order, Some(1));
    }

    #[tokio::test]
    async fn unknown_times_slot_backwards_preserving_creation_order() {
        let store = InMemoryStore::new();
        let org = OrganizationId::new();
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let tour_id = TourId::new();
        let guide_id = GuideId::new();

        let earlier = booking(org, tour_id, date, "09:00", 0);
        let later = booking(org, tour_id, date, "09:00", 60);
        store.seed_booking(earlier.clone()).await;
        store.seed_booking(later.clone()).await;
        store
            .upsert_confirmed(org, GuideAssignment::new_confirmed(earlier.id, Assignee::InternalGuide(guide_id), Utc::now()))
            .await
            .unwrap();
        store
            .upsert_confirmed(org, GuideAssignment::new_confirmed(later.id, Assignee::InternalGuide(guide_id), Utc::now()))
            .await
            .unwrap();

        let config = DispatchConfig::default();
        sync_date(&store, &config, org, date).await.unwrap();

        let rows = store.for_schedule(org, &tour_run_key(tour_id, date, "09:00")).await.unwrap();
        assert_eq!(rows.len(), 2);
        let earlier_row = rows.iter().find(|r| r.booking_id == earlier.id).unwrap();
        let later_row = rows.iter().find(|r| r.booking_id == later.id).unwrap();
        assert_eq!(earlier_row.pickup_order, 1);
        assert_eq!(later_row.pickup_order, 2);
        assert!(earlier_row.estimated_pickup_time < later_row.estimated_pickup_time);
    }
}
