use rand::Rng;
use serde::{Deserialize, Serialize};

use super::MergedRecord;

/// What happened to a record during the depth fill.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum FillOutcome {
    /// Depth came from an overlay row and was left alone.
    Overlaid,
    /// Depth was drawn between the two neighbouring anchors.
    Filled,
    /// No overlaid record on one side; original depth kept.
    MissingAnchor,
    /// An anchor depth is not a number; original depth kept.
    InvalidAnchor,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FillStats {
    pub overlaid: usize,
    pub filled: usize,
    pub missing_anchor: usize,
    pub invalid_anchor: usize,
}

impl FillStats {
    fn count(&mut self, outcome: FillOutcome) {
        match outcome {
            FillOutcome::Overlaid => self.overlaid += 1,
            FillOutcome::Filled => self.filled += 1,
            FillOutcome::MissingAnchor => self.missing_anchor += 1,
            FillOutcome::InvalidAnchor => self.invalid_anchor += 1,
        }
    }
}

/// Fill the depth of every non-overlaid record bounded by overlaid anchors.
///
/// The value is a uniform draw from `[min, max)` of the two anchor depths,
/// written with two decimals. Records before the first or after the last
/// overlaid record keep their depth.
pub fn fill_depths<R: Rng>(
    records: &mut [MergedRecord],
    rng: &mut R,
) -> (Vec<FillOutcome>, FillStats) {
    let (prev, next) = anchor_indices(records);
    let mut outcomes = Vec::with_capacity(records.len());
    let mut stats = FillStats::default();

    for i in 0..records.len() {
        let outcome = if records[i].overlaid {
            FillOutcome::Overlaid
        } else {
            match (prev[i], next[i]) {
                (Some(p), Some(n)) => {
                    match (anchor_depth(&records[p]), anchor_depth(&records[n])) {
                        (Some(a), Some(b)) => {
                            let value = draw_between(a, b, rng);
                            records[i].depth = Some(format!("{value:.2}"));
                            FillOutcome::Filled
                        }
                        _ => FillOutcome::InvalidAnchor,
                    }
                }
                _ => FillOutcome::MissingAnchor,
            }
        };
        stats.count(outcome);
        outcomes.push(outcome);
    }

    (outcomes, stats)
}

/// Nearest overlaid index strictly before and strictly after each position.
fn anchor_indices(records: &[MergedRecord]) -> (Vec<Option<usize>>, Vec<Option<usize>>) {
    let n = records.len();
    let mut prev = vec![None; n];
    let mut next = vec![None; n];

    let mut last = None;
    for i in 0..n {
        prev[i] = last;
        if records[i].overlaid {
            last = Some(i);
        }
    }
    last = None;
    for i in (0..n).rev() {
        next[i] = last;
        if records[i].overlaid {
            last = Some(i);
        }
    }
    (prev, next)
}

fn anchor_depth(record: &MergedRecord) -> Option<f64> {
    let value: f64 = record.depth.as_deref()?.trim().parse().ok()?;
    value.is_finite().then_some(value)
}

fn draw_between<R: Rng>(a: f64, b: f64, rng: &mut R) -> f64 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    if lo < hi {
        rng.random_range(lo..hi)
    } else {
        lo
    }
}
