//! JSON fixture loading for the CLI binary and integration tests.
//!
//! Mirrors the `api::*_dto` + `parser::parse_json_file` pattern: plain
//! string-keyed DTOs with `#[serde(rename_all = "camelCase")]`, parsed with
//! `serde_json` and converted into the domain types the in-memory store
//! seeds itself from. Ids are plain strings in the fixture file and parsed
//! into `Uuid`s here; nothing downstream of this module ever sees a raw
//! string id.

use std::collections::HashSet;
use std::fs;

use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::assignment::{Assignee, GuideAssignment};
use crate::domain::booking::{Booking, BookingStatus, ExperienceMode};
use crate::domain::guide::{AvailabilityOverride, Guide, GuideStatus, WeeklyAvailability};
use crate::domain::ids::{BookingId, CustomerId, GuideId, OrganizationId, TourId, ZoneId};
use crate::domain::tour::Tour;
use crate::domain::travel_time::ZoneTravelTime;
use crate::error::{Error, Result};
use crate::store::memory::InMemoryStore;
use crate::store::{AssignmentRepository, GuideRepository};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureFile {
    pub organization_id: String,
    #[serde(default)]
    pub tours: Vec<TourDto>,
    #[serde(default)]
    pub bookings: Vec<BookingDto>,
    #[serde(default)]
    pub guides: Vec<GuideDto>,
    #[serde(default)]
    pub weekly_availability: Vec<WeeklyAvailabilityDto>,
    #[serde(default)]
    pub availability_overrides: Vec<AvailabilityOverrideDto>,
    #[serde(default)]
    pub qualifications: Vec<QualificationDto>,
    #[serde(default)]
    pub travel_times: Vec<TravelTimeDto>,
    #[serde(default)]
    pub confirmed_assignments: Vec<ConfirmedAssignmentDto>,
    #[serde(default)]
    pub completed_booking_counts: Vec<CompletedCountDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TourDto {
    pub id: String,
    pub name: String,
    pub duration_minutes: u32,
    #[serde(default = "default_guests_per_guide")]
    pub guests_per_guide: u32,
}

fn default_guests_per_guide() -> u32 {
    Tour::DEFAULT_GUESTS_PER_GUIDE
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingDto {
    pub id: String,
    pub tour_id: String,
    #[serde(default = "Uuid::new_v4")]
    pub customer_id: Uuid,
    pub booking_date: NaiveDate,
    pub booking_time: String,
    pub total_participants: u32,
    #[serde(default = "default_booking_status")]
    pub status: BookingStatus,
    pub pickup_zone_id: Option<String>,
    #[serde(default)]
    pub pickup_location: String,
    pub pickup_time: Option<String>,
    pub experience_mode: Option<ExperienceMode>,
}

fn default_booking_status() -> BookingStatus {
    BookingStatus::Confirmed
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuideDto {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default = "default_guide_status")]
    pub status: GuideStatus,
    #[serde(default = "default_vehicle_capacity")]
    pub vehicle_capacity: u32,
    #[serde(default)]
    pub languages: HashSet<String>,
    pub baseline_zone_id: Option<String>,
    pub phone: Option<String>,
}

fn default_guide_status() -> GuideStatus {
    GuideStatus::Active
}

fn default_vehicle_capacity() -> u32 {
    Guide::DEFAULT_VEHICLE_CAPACITY
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyAvailabilityDto {
    pub guide_id: String,
    pub day_of_week: u8,
    pub start_time: String,
    pub end_time: String,
    #[serde(default = "default_true")]
    pub is_available: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityOverrideDto {
    pub guide_id: String,
    pub date: NaiveDate,
    pub is_available: bool,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualificationDto {
    pub tour_id: String,
    pub guide_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelTimeDto {
    pub from_zone_id: String,
    pub to_zone_id: String,
    pub minutes: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedAssignmentDto {
    pub booking_id: String,
    pub guide_id: Option<String>,
    pub outsourced_guide_name: Option<String>,
    pub outsourced_contact: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedCountDto {
    pub customer_id: Uuid,
    pub count: u32,
}

fn parse_uuid(raw: &str, entity: &'static str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| Error::Validation {
        message: format!("fixture {entity} id '{raw}' is not a valid uuid"),
    })
}

/// Reads a fixture file from disk and parses it: `fs::read_to_string`
/// followed by `serde_json::from_str`, both errors folded into this
/// crate's own `Error` type.
pub fn parse_fixture_file(path: &str) -> Result<FixtureFile> {
    let raw = fs::read_to_string(path)?;
    let fixture: FixtureFile = serde_json::from_str(&raw)?;
    Ok(fixture)
}

/// Loads a parsed fixture into a fresh [`InMemoryStore`] and returns it
/// alongside the fixture's `organizationId`, so CLI commands have both the
/// store and the tenant scope to call `DispatchCore` with.
pub async fn load_into_store(fixture: &FixtureFile) -> Result<(InMemoryStore, OrganizationId)> {
    let store = InMemoryStore::new();
    let organization_id = OrganizationId::from_uuid(parse_uuid(&fixture.organization_id, "organization")?);

    for t in &fixture.tours {
        store
            .seed_tour(Tour {
                id: TourId::from_uuid(parse_uuid(&t.id, "tour")?),
                organization_id,
                name: t.name.clone(),
                duration_minutes: t.duration_minutes,
                guests_per_guide: t.guests_per_guide,
            })
            .await;
    }

    for g in &fixture.guides {
        store
            .seed_guide(Guide {
                id: GuideId::from_uuid(parse_uuid(&g.id, "guide")?),
                organization_id,
                first_name: g.first_name.clone(),
                last_name: g.last_name.clone(),
                status: g.status,
                vehicle_capacity: g.vehicle_capacity,
                languages: g.languages.clone(),
                baseline_zone_id: g
                    .baseline_zone_id
                    .as_deref()
                    .map(|z| parse_uuid(z, "zone"))
                    .transpose()?
                    .map(ZoneId::from_uuid),
                phone: g.phone.clone(),
                temporary_for_date: None,
            })
            .await;
    }

    for b in &fixture.bookings {
        store
            .seed_booking(Booking {
                id: BookingId::from_uuid(parse_uuid(&b.id, "booking")?),
                organization_id,
                tour_id: TourId::from_uuid(parse_uuid(&b.tour_id, "tour")?),
                customer_id: CustomerId::from_uuid(b.customer_id),
                booking_date: b.booking_date,
                booking_time: b.booking_time.clone(),
                total_participants: b.total_participants,
                status: b.status,
                pickup_zone_id: b
                    .pickup_zone_id
                    .as_deref()
                    .map(|z| parse_uuid(z, "zone"))
                    .transpose()?
                    .map(ZoneId::from_uuid),
                pickup_location: b.pickup_location.clone(),
                pickup_time: b.pickup_time.clone(),
                experience_mode: b.experience_mode,
                created_at: chrono::Utc::now(),
            })
            .await;
    }

    for w in &fixture.weekly_availability {
        store
            .seed_weekly(WeeklyAvailability {
                guide_id: GuideId::from_uuid(parse_uuid(&w.guide_id, "guide")?),
                day_of_week: w.day_of_week,
                start_time: w.start_time.clone(),
                end_time: w.end_time.clone(),
                is_available: w.is_available,
            })
            .await;
    }

    for o in &fixture.availability_overrides {
        store
            .seed_override(AvailabilityOverride {
                guide_id: GuideId::from_uuid(parse_uuid(&o.guide_id, "guide")?),
                date: o.date,
                is_available: o.is_available,
                start_time: o.start_time.clone(),
                end_time: o.end_time.clone(),
            })
            .await;
    }

    for q in &fixture.qualifications {
        store
            .seed_qualification(
                TourId::from_uuid(parse_uuid(&q.tour_id, "tour")?),
                GuideId::from_uuid(parse_uuid(&q.guide_id, "guide")?),
            )
            .await;
    }

    for tt in &fixture.travel_times {
        store
            .seed_travel_time(
                organization_id,
                ZoneTravelTime {
                    from_zone_id: ZoneId::from_uuid(parse_uuid(&tt.from_zone_id, "zone")?),
                    to_zone_id: ZoneId::from_uuid(parse_uuid(&tt.to_zone_id, "zone")?),
                    minutes: tt.minutes,
                },
            )
            .await;
    }

    for c in &fixture.completed_booking_counts {
        store
            .seed_completed_count(CustomerId::from_uuid(c.customer_id), c.count)
            .await;
    }

    let now = chrono::Utc::now();
    for a in &fixture.confirmed_assignments {
        let booking_id = BookingId::from_uuid(parse_uuid(&a.booking_id, "booking")?);
        let assignee = match (&a.guide_id, &a.outsourced_guide_name) {
            (Some(g), None) => Assignee::InternalGuide(GuideId::from_uuid(parse_uuid(g, "guide")?)),
            (None, Some(name)) => Assignee::External {
                name: name.clone(),
                contact: a.outsourced_contact.clone(),
            },
            _ => {
                return Err(Error::Validation {
                    message: format!("confirmed assignment for booking {} must name exactly one of guideId/outsourcedGuideName", a.booking_id),
                });
            }
        };
        store
            .upsert_confirmed(organization_id, GuideAssignment::new_confirmed(booking_id, assignee, now))
            .await?;
    }

    Ok((store, organization_id))
}
