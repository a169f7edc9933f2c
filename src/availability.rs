//! Availability resolver.

use chrono::NaiveDate;
use std::collections::HashMap;

use crate::domain::guide::AvailabilityWindow;
use crate::domain::ids::{GuideId, OrganizationId};
use crate::store::AvailabilityRepository;
use crate::time::day_of_week;

/// Resolves `(guideId, date)` → `(isAvailable, startTime, endTime)` for a
/// single guide.
pub async fn resolve_one<R: AvailabilityRepository + ?Sized>(
    repo: &R,
    organization_id: OrganizationId,
    guide_id: GuideId,
    date: NaiveDate,
) -> AvailabilityWindow {
    resolve_batch(repo, organization_id, &[guide_id], date)
        .await
        .remove(&guide_id)
        .unwrap_or_else(AvailabilityWindow::unavailable)
}

/// Batched form: exactly two queries regardless of how many guides are
/// requested. Missing guides resolve to
/// unavailable.
pub async fn resolve_batch<R: AvailabilityRepository + ?Sized>(
    repo: &R,
    organization_id: OrganizationId,
    guide_ids: &[GuideId],
    date: NaiveDate,
) -> HashMap<GuideId, AvailabilityWindow> {
    let dow = day_of_week(date);

    // Neither query's result informs the other, so run them concurrently
    // instead of paying two sequential round trips.
    let (overrides, weekly) = futures::join!(
        repo.batch_overrides(organization_id, date, guide_ids),
        repo.batch_weekly(organization_id, dow, guide_ids),
    );
    let (overrides, weekly) = match (overrides, weekly) {
        (Ok(o), Ok(w)) => (o, w),
        (overrides, weekly) => {
            // A read failure here must never corrupt assignments: degrade
            // every requested guide to unavailable and let the optimizer
            // raise `no_available_guide` instead.
            log::error!(
                "availability resolver query failed (overrides ok={}, weekly ok={}); \
                 degrading {} guide(s) to unavailable for {date}",
                overrides.is_ok(),
                weekly.is_ok(),
                guide_ids.len()
            );
            return guide_ids
                .iter()
                .map(|g| (*g, AvailabilityWindow::unavailable()))
                .collect();
        }
    };

    let mut override_by_guide: HashMap<GuideId, AvailabilityWindow> = HashMap::new();
    for row in overrides {
        override_by_guide.insert(
            row.guide_id,
            AvailabilityWindow {
                is_available: row.is_available,
                start_time: row.start_time,
                end_time: row.end_time,
            },
        );
    }

    // Earliest-start row for the weekday wins regardless of its own
    // `is_available` flag — §4.2 picks the row, the caller acts on the
    // triple it carries.
    let mut earliest_weekly: HashMap<GuideId, (String, String, bool)> = HashMap::new();
    for row in weekly {
        earliest_weekly
            .entry(row.guide_id)
            .and_modify(|(start, end, is_available)| {
                if row.start_time < *start {
                    *start = row.start_time.clone();
                    *end = row.end_time.clone();
                    *is_available = row.is_available;
                }
            })
            .or_insert((row.start_time.clone(), row.end_time.clone(), row.is_available));
    }

    guide_ids
        .iter()
        .map(|guide_id| {
            let window = if let Some(o) = override_by_guide.get(guide_id) {
                o.clone()
            } else if let Some((start, end, is_available)) = earliest_weekly.get(guide_id) {
                AvailabilityWindow {
                    is_available: *is_available,
                    start_time: Some(start.clone()),
                    end_time: Some(end.clone()),
                }
            } else {
                AvailabilityWindow::unavailable()
            };
            (*guide_id, window)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::guide::{AvailabilityOverride, Guide, GuideStatus, WeeklyAvailability};
    use crate::store::memory::InMemoryStore;
    use std::collections::HashSet;

    fn guide(id: GuideId, org: OrganizationId) -> Guide {
        Guide {
            id,
            organization_id: org,
            first_name: "A".into(),
            last_name: "B".into(),
            status: GuideStatus::Active,
            vehicle_capacity: 6,
            languages: HashSet::new(),
            baseline_zone_id: None,
            phone: None,
            temporary_for_date: None,
        }
    }

    #[tokio::test]
    async fn override_replaces_weekly_entirely() {
        let store = InMemoryStore::new();
        let org = OrganizationId::new();
        let guide_id = GuideId::new();
        store.seed_guide(guide(guide_id, org)).await;
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        store
            .seed_weekly(WeeklyAvailability {
                guide_id,
                day_of_week: day_of_week(date),
                start_time: "08:00".into(),
                end_time: "18:00".into(),
                is_available: true,
            })
            .await;
        store
            .seed_override(AvailabilityOverride {
                guide_id,
                date,
                is_available: false,
                start_time: None,
                end_time: None,
            })
            .await;

        let window = resolve_one(&store, org, guide_id, date).await;
        assert!(!window.is_available);
    }

    #[tokio::test]
    async fn earliest_weekly_row_wins_when_several_exist() {
        let store = InMemoryStore::new();
        let org = OrganizationId::new();
        let guide_id = GuideId::new();
        store.seed_guide(guide(guide_id, org)).await;
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let dow = day_of_week(date);
        store
            .seed_weekly(WeeklyAvailability {
                guide_id,
                day_of_week: dow,
                start_time: "10:00".into(),
                end_time: "16:00".into(),
                is_available: true,
            })
            .await;
        store
            .seed_weekly(WeeklyAvailability {
                guide_id,
                day_of_week: dow,
                start_time: "07:00".into(),
                end_time: "12:00".into(),
                is_available: true,
            })
            .await;

        let window = resolve_one(&store, org, guide_id, date).await;
        assert!(window.is_available);
        assert_eq!(window.start_time.as_deref(), Some("07:00"));
    }

    #[tokio::test]
    async fn earliest_weekly_row_wins_even_when_marked_unavailable() {
        let store = InMemoryStore::new();
        let org = OrganizationId::new();
        let guide_id = GuideId::new();
        store.seed_guide(guide(guide_id, org)).await;
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let dow = day_of_week(date);
        store
            .seed_weekly(WeeklyAvailability {
                guide_id,
                day_of_week: dow,
                start_time: "07:00".into(),
                end_time: "09:00".into(),
                is_available: false,
            })
            .await;
        store
            .seed_weekly(WeeklyAvailability {
                guide_id,
                day_of_week: dow,
                start_time: "10:00".into(),
                end_time: "16:00".into(),
                is_available: true,
            })
            .await;

        let window = resolve_one(&store, org, guide_id, date).await;
        assert!(!window.is_available);
        assert_eq!(window.start_time.as_deref(), Some("07:00"));
        assert_eq!(window.end_time.as_deref(), Some("09:00"));
    }

    #[tokio::test]
    async fn missing_rows_resolve_unavailable() {
        let store = InMemoryStore::new();
        let org = OrganizationId::new();
        let guide_id = GuideId::new();
        store.seed_guide(guide(guide_id, org)).await;
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let window = resolve_one(&store, org, guide_id, date).await;
        assert!(!window.is_available);
    }
}
