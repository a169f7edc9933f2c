//! Tour — the sellable product a booking is made against.

use serde::{Deserialize, Serialize};

use super::ids::{OrganizationId, TourId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tour {
    pub id: TourId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub duration_minutes: u32,
    pub guests_per_guide: u32,
}

impl Tour {
    pub const DEFAULT_GUESTS_PER_GUIDE: u32 = 6;

    /// `guidesNeeded = ceil(totalGuests / guestsPerGuide)`.
    pub fn guides_needed(&self, total_guests: u32) -> u32 {
        ceil_div(total_guests, self.guests_per_guide.max(1))
    }
}

pub(crate) fn ceil_div(numerator: u32, denominator: u32) -> u32 {
    numerator.div_ceil(denominator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guides_needed_rounds_up() {
        let tour = Tour {
            id: TourId::new(),
            organization_id: OrganizationId::new(),
            name: "Harbor Walk".into(),
            duration_minutes: 240,
            guests_per_guide: 6,
        };
        assert_eq!(tour.guides_needed(4), 1);
        assert_eq!(tour.guides_needed(6), 1);
        assert_eq!(tour.guides_needed(7), 2);
        assert_eq!(tour.guides_needed(0), 0);
    }
}
