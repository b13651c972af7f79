//! Derived values for downstream consumers

/// Laps of fuel left at a given per-lap consumption.
///
/// `None` when consumption is not positive or the inputs are not finite.
pub fn fuel_laps_remaining(fuel_liters: f64, per_lap_consumption: f64) -> Option<f64> {
    if !fuel_liters.is_finite() || !per_lap_consumption.is_finite() || per_lap_consumption <= 0.0 {
        return None;
    }
    Some(fuel_liters.max(0.0) / per_lap_consumption)
}
