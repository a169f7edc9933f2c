//! Configuration recognized at initialization.
//!
//! There is no external configuration crate in play here: values are a
//! plain `Default`-able struct, overridable by whoever constructs a
//! [`crate::core::DispatchCore`].

/// The six tunables the dispatch core reads at startup. The two "default"
/// minute values are only consulted when the zone travel-time matrix has no
/// row for a given `(from, to)` pair.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DispatchConfig {
    pub default_guests_per_guide: u32,
    pub default_pickup_minutes: i64,
    pub default_drive_minutes: i64,
    pub efficiency_threshold_minutes: i64,
    pub average_drive_speed_kmh: f64,
    pub max_alternatives_per_warning: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_guests_per_guide: 6,
            default_pickup_minutes: 5,
            default_drive_minutes: 10,
            efficiency_threshold_minutes: 15,
            average_drive_speed_kmh: 30.0,
            max_alternatives_per_warning: 3,
        }
    }
}
