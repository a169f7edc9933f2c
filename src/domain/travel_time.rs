//! Zone travel-time matrix.

use serde::{Deserialize, Serialize};

use super::ids::ZoneId;

/// Minutes used when the matrix has no row for a `(from, to)` pair at all.
/// Identity pairs (`from == to`) default to `0` regardless of the matrix.
pub const DEFAULT_DRIVE_MINUTES: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneTravelTime {
    pub from_zone_id: ZoneId,
    pub to_zone_id: ZoneId,
    pub minutes: i64,
}

/// Looks up `minutes(from, to)` in a loaded matrix, falling back to the
/// identity/default rule for the zone travel-time matrix.
pub fn lookup_minutes(matrix: &[ZoneTravelTime], from: ZoneId, to: ZoneId) -> i64 {
    if from == to {
        return 0;
    }
    matrix
        .iter()
        .find(|row| row.from_zone_id == from && row.to_zone_id == to)
        .map(|row| row.minutes)
        .unwrap_or(DEFAULT_DRIVE_MINUTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_pairs_are_free() {
        let z: ZoneId = ZoneId::new();
        assert_eq!(lookup_minutes(&[], z, z), 0);
    }

    #[test]
    fn missing_pair_uses_default() {
        let a: ZoneId = ZoneId::new();
        let b: ZoneId = ZoneId::new();
        assert_eq!(lookup_minutes(&[], a, b), DEFAULT_DRIVE_MINUTES);
    }

    #[test]
    fn known_pair_overrides_default() {
        let a: ZoneId = ZoneId::new();
        let b: ZoneId = ZoneId::new();
        let matrix = vec![ZoneTravelTime {
            from_zone_id: a,
            to_zone_id: b,
            minutes: 37,
        }];
        assert_eq!(lookup_minutes(&matrix, a, b), 37);
        assert_eq!(lookup_minutes(&matrix, b, a), DEFAULT_DRIVE_MINUTES);
    }
}
