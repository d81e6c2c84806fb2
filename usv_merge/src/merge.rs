use rand::Rng;
use serde::{Deserialize, Serialize};

use super::depth::{fill_depths, FillOutcome, FillStats};
use super::join::{join_records, JoinStats};
use super::render::render_preview;
use super::timing::{assign_times, TimeConfig};
use super::{MergeError, MergeParams, MergedRecord, OverlayRow, PrimaryRecord};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergeOutcome {
    /// Every merged record, including the one the preview leaves out.
    pub records: Vec<MergedRecord>,
    pub preview: String,
    pub join: JoinStats,
    /// Fill result per record, aligned with `records`.
    pub outcomes: Vec<FillOutcome>,
    pub fill: FillStats,
}

/// Join, retime, fill and render in one pass.
///
/// Missing overlay keys and missing anchors are normal outcomes and only show
/// up in the stats. The only error is a timestamp that overflows the calendar.
pub fn merge<R: Rng>(
    primary: &[PrimaryRecord],
    overlay: &[OverlayRow],
    time: &TimeConfig,
    params: &MergeParams,
    rng: &mut R,
) -> Result<MergeOutcome, MergeError> {
    let (mut records, join) = join_records(primary, overlay, params.key_mode);
    assign_times(&mut records, time)?;
    let (outcomes, fill) = fill_depths(&mut records, rng);
    let preview = render_preview(&records, &params.render_options());
    Ok(MergeOutcome {
        records,
        preview,
        join,
        outcomes,
        fill,
    })
}
