//! Tour-run aggregator.

use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};

use crate::domain::assignment::Assignee;
use crate::domain::ids::{CustomerId, OrganizationId};
use crate::domain::tour_run::{TourRun, TourRunStatus};
use crate::store::{AssignmentRepository, BookingRepository, CustomerHistoryRepository};
use crate::time::tour_run_key;

/// Groups a date's confirmed/pending bookings into [`TourRun`]s.
pub async fn tour_runs_for_date<R>(repo: &R, organization_id: OrganizationId, date: NaiveDate) -> crate::error::Result<Vec<TourRun>>
where
    R: BookingRepository + AssignmentRepository + ?Sized,
{
    let bookings = repo.list_dispatchable_for_date(organization_id, date).await?;
    let confirmed = repo.confirmed_for_date(organization_id, date).await?;
    let mut assignee_by_booking = HashMap::new();
    for a in &confirmed {
        assignee_by_booking.insert(a.booking_id, a.assignee.clone());
    }

    let mut groups: HashMap<String, TourRun> = HashMap::new();
    let mut assignees_by_key: HashMap<String, HashSet<String>> = HashMap::new();

    for bt in &bookings {
        let key = tour_run_key(bt.booking.tour_id, bt.booking.booking_date, &bt.booking.booking_time);
        let run = groups.entry(key.clone()).or_insert_with(|| TourRun {
            key: key.clone(),
            tour_id: bt.booking.tour_id,
            date: bt.booking.booking_date,
            time: bt.booking.booking_time.clone(),
            bookings: Vec::new(),
            total_guests: 0,
            guides_needed: 0,
            guides_assigned: 0,
            status: TourRunStatus::Unassigned,
        });
        run.bookings.push(bt.booking.id);
        run.total_guests += bt.booking.total_participants;

        if let Some(assignee) = assignee_by_booking.get(&bt.booking.id) {
            assignees_by_key
                .entry(key)
                .or_default()
                .insert(dedup_key(assignee));
        }
    }

    let mut runs: Vec<TourRun> = Vec::new();
    for (key, mut run) in groups {
        // guestsPerGuide comes from the tour; every booking in a run shares
        // one tour so the first booking's tour row is authoritative.
        let first_booking_id = run.bookings[0];
        let tour = bookings
            .iter()
            .find(|bt| bt.booking.id == first_booking_id)
            .map(|bt| bt.tour.clone())
            .expect("run always has at least one booking drawn from `bookings`");
        run.guides_needed = tour.guides_needed(run.total_guests);
        run.guides_assigned = assignees_by_key.get(&key).map(|s| s.len() as u32).unwrap_or(0);
        run.status = TourRunStatus::from_counts(run.guides_assigned, run.guides_needed);
        runs.push(run);
    }

    // Sort runs by time ascending; ties broken by key
    // for determinism.
    runs.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.key.cmp(&b.key)));
    Ok(runs)
}

fn dedup_key(assignee: &Assignee) -> String {
    assignee.dedup_key()
}

/// First-time-customer flag: a customer is first-time iff they have zero
/// completed bookings under this tenant, computed in
/// one grouped query across every customer touched by the date's bookings.
pub async fn first_time_customers<R>(
    repo: &R,
    organization_id: OrganizationId,
    customer_ids: &HashSet<CustomerId>,
) -> crate::error::Result<HashMap<CustomerId, bool>>
where
    R: CustomerHistoryRepository + ?Sized,
{
    let ids: Vec<CustomerId> = customer_ids.iter().copied().collect();
    let counts = repo.completed_booking_counts(organization_id, &ids).await?;
    Ok(ids
        .into_iter()
        .map(|id| {
            let is_first_time = counts.get(&id).copied().unwrap_or(0) == 0;
            (id, is_first_time)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::booking::{Booking, BookingStatus};
    use crate::domain::ids::{BookingId, TourId};
    use crate::domain::tour::Tour;
    use crate::store::memory::InMemoryStore;
    use chrono::Utc;

    fn seed_tour(org: OrganizationId, guests_per_guide: u32) -> Tour {
        Tour {
            id: TourId::new(),
            organization_id: org,
            name: "Harbor Walk".into(),
            duration_minutes: 240,
            guests_per_guide,
        }
    }

    fn seed_booking(org: OrganizationId, tour_id: TourId, date: NaiveDate, time: &str, guests: u32) -> Booking {
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
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn groups_by_tour_run_key_and_computes_guides_needed() {
        let store = InMemoryStore::new();
        let org = OrganizationId::new();
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let tour = seed_tour(org, 6);
        store.seed_tour(tour.clone()).await;
        store.seed_booking(seed_booking(org, tour.id, date, "09:00", 4)).await;
        store.seed_booking(seed_booking(org, tour.id, date, "09:00", 5)).await;

        let runs = tour_runs_for_date(&store, org, date).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].total_guests, 9);
        assert_eq!(runs[0].guides_needed, 2);
        assert_eq!(runs[0].status, TourRunStatus::Unassigned);
    }

    #[tokio::test]
    async fn runs_sorted_by_time_ascending() {
        let store = InMemoryStore::new();
        let org = OrganizationId::new();
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let tour = seed_tour(org, 6);
        store.seed_tour(tour.clone()).await;
        store.seed_booking(seed_booking(org, tour.id, date, "14:00", 2)).await;
        store.seed_booking(seed_booking(org, tour.id, date, "09:00", 2)).await;

        let runs = tour_runs_for_date(&store, org, date).await.unwrap();
        assert_eq!(runs[0].time, "09:00");
        assert_eq!(runs[1].time, "14:00");
    }

    #[tokio::test]
    async fn booking_with_unresolvable_tour_is_dropped() {
        let store = InMemoryStore::new();
        let org = OrganizationId::new();
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        // No tour seeded: the booking references a tour id that does not exist.
        store.seed_booking(seed_booking(org, TourId::new(), date, "09:00", 2)).await;
        let runs = tour_runs_for_date(&store, org, date).await.unwrap();
        assert!(runs.is_empty());
    }

    #[tokio::test]
    async fn guide_with_zero_completed_bookings_is_first_time() {
        let store = InMemoryStore::new();
        let org = OrganizationId::new();
        let customer = CustomerId::new();
        let mut set = HashSet::new();
        set.insert(customer);
        let flags = first_time_customers(&store, org, &set).await.unwrap();
        assert_eq!(flags.get(&customer), Some(&true));
    }
}
