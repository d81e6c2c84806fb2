use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use super::{KeyMode, MergedRecord, OverlayRow, PrimaryRecord};

/// Join key for a coordinate pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CoordKey {
    Exact(String),
    Numeric(OrderedFloat<f64>, OrderedFloat<f64>),
}

impl CoordKey {
    pub fn build(latitude: &str, longitude: &str, mode: KeyMode) -> Self {
        match mode {
            KeyMode::Exact => CoordKey::Exact(format!("{latitude},{longitude}")),
            KeyMode::Numeric { decimals } => {
                match (round_coord(latitude, decimals), round_coord(longitude, decimals)) {
                    (Some(lat), Some(lon)) => CoordKey::Numeric(OrderedFloat(lat), OrderedFloat(lon)),
                    _ => CoordKey::Exact(format!("{latitude},{longitude}")),
                }
            }
        }
    }
}

fn round_coord(text: &str, decimals: u32) -> Option<f64> {
    let value: f64 = text.trim().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    let scale = 10f64.powi(decimals as i32);
    // +0.0 folds -0.0 into the same key
    Some((value * scale).round() / scale + 0.0)
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinStats {
    pub primary_rows: usize,
    pub distinct_keys: usize,
    pub overlay_rows: usize,
    pub matched: usize,
    pub unmatched: usize,
}

/// Join overlay rows onto the primary records by coordinate key.
///
/// The result keeps the first-insertion order of the primary keys. A repeated
/// primary key keeps its first position but takes the later row's values.
/// Overlay rows replace the depth of a matching record and mark it overlaid
/// (last write wins); rows without a match are dropped.
pub fn join_records(
    primary: &[PrimaryRecord],
    overlay: &[OverlayRow],
    mode: KeyMode,
) -> (Vec<MergedRecord>, JoinStats) {
    let mut merged: IndexMap<CoordKey, MergedRecord> = IndexMap::with_capacity(primary.len());
    for record in primary {
        let key = CoordKey::build(&record.latitude, &record.longitude, mode);
        // an existing key keeps its slot and takes the new value
        merged.insert(key, MergedRecord::from(record.clone()));
    }

    let mut stats = JoinStats {
        primary_rows: primary.len(),
        distinct_keys: merged.len(),
        overlay_rows: overlay.len(),
        ..JoinStats::default()
    };

    for row in overlay {
        let (Some(lat), Some(lon)) = (row.latitude(), row.longitude()) else {
            stats.unmatched += 1;
            continue;
        };
        let key = CoordKey::build(lat, lon, mode);
        if let Some(target) = merged.get_mut(&key) {
            target.depth = row.depth().map(str::to_string);
            target.overlaid = true;
            stats.matched += 1;
        } else {
            stats.unmatched += 1;
        }
    }

    (merged.into_values().collect(), stats)
}
