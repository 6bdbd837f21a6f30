//! Category filtering over a snapshot.

use crate::collector::Snapshot;
use crate::sensor::{SensorReading, SensorType};
use crate::Result;

/// Returns the readings of `snapshot` matching `category`, in snapshot order.
///
/// `None` means no filter.
pub fn project(snapshot: &Snapshot, category: Option<SensorType>) -> Vec<&SensorReading> {
    snapshot
        .iter()
        .filter(|reading| category.map_or(true, |ty| reading.sensor_type == ty))
        .collect()
}

/// Parses a textual filter. `"all"` or an empty string means no filter.
pub fn parse_filter(filter: &str) -> Result<Option<SensorType>> {
    let filter = filter.trim();
    if filter.is_empty() || filter.eq_ignore_ascii_case("all") {
        return Ok(None);
    }
    filter.parse().map(Some)
}
