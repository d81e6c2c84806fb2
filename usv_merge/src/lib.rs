//! Merge USV survey track logs with corrected depth overlays.
//!
//! The primary track log is a CSV of latitude, longitude, depth and time.
//! Overlay spreadsheets carry corrected depths for a subset of coordinates.
//! [`merge::merge`] joins the two on the coordinate key, optionally
//! regenerates timestamps, fills the remaining depths between overlay
//! anchors and renders the preview text.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub mod depth;
pub mod join;
pub mod loader;
pub mod merge;
pub mod render;
pub mod session;
pub mod timing;

pub use depth::{fill_depths, FillOutcome, FillStats};
pub use join::{join_records, CoordKey, JoinStats};
pub use loader::{
    load_overlays, parse_overlay, parse_primary, InputFile, OverlayBatch, OverlaySet, ParseReport,
    RowIssue,
};
pub use merge::{merge, MergeOutcome};
pub use render::{render_preview, RenderOptions, HEADER};
pub use session::{ExportReceipt, Session, EXPORT_FILE_NAME};
pub use timing::{assign_times, Interval, IntervalUnit, TimeConfig, TIME_FORMAT};

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to read delimited text: {0}")]
    Csv(String),
    #[error("failed to read spreadsheet: {0}")]
    Spreadsheet(String),
    #[error("spreadsheet has no worksheets: {0}")]
    EmptySheet(String),
    #[error("no primary records loaded")]
    EmptyPrimary,
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("nothing to export: load a track log and execute first")]
    ExportUnavailable,
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<csv::Error> for MergeError {
    fn from(err: csv::Error) -> Self {
        MergeError::Csv(err.to_string())
    }
}

impl From<calamine::Error> for MergeError {
    fn from(err: calamine::Error) -> Self {
        MergeError::Spreadsheet(err.to_string())
    }
}

/// How overlay coordinates are matched against the track log.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum KeyMode {
    /// Raw cell text, so `1.50` and `1.5` are different points.
    Exact,
    /// Parse both coordinates and round to `decimals` places.
    Numeric { decimals: u32 },
}

impl Default for KeyMode {
    fn default() -> Self {
        KeyMode::Exact
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MergeParams {
    pub key_mode: KeyMode,
    pub depth_decimals: Option<usize>,
    pub seed: Option<u64>,
}

impl Default for MergeParams {
    fn default() -> Self {
        Self {
            key_mode: KeyMode::Exact,
            depth_decimals: None,
            seed: None,
        }
    }
}

impl MergeParams {
    /// Parse parameters from JSON. Missing fields keep their defaults.
    pub fn from_json_str(text: &str) -> Result<Self, MergeError> {
        let params: MergeParams =
            serde_json::from_str(text).map_err(|e| MergeError::Config(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), MergeError> {
        if let KeyMode::Numeric { decimals } = self.key_mode {
            if decimals > 12 {
                return Err(MergeError::Config(format!(
                    "key decimals must be at most 12, got {decimals}"
                )));
            }
        }
        if let Some(decimals) = self.depth_decimals {
            if decimals > 12 {
                return Err(MergeError::Config(format!(
                    "depth decimals must be at most 12, got {decimals}"
                )));
            }
        }
        Ok(())
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            depth_decimals: self.depth_decimals,
        }
    }

    /// SHA-256 of the JSON form, used to tag log lines and exports.
    pub fn fingerprint(&self) -> Result<String, MergeError> {
        let bytes = serde_json::to_vec(self).map_err(|e| MergeError::Config(e.to_string()))?;
        Ok(sha256_hex(&bytes))
    }
}

/// One row of the primary track log.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrimaryRecord {
    pub latitude: String,
    pub longitude: String,
    pub depth: Option<String>,
    pub time: Option<String>,
}

impl PrimaryRecord {
    pub fn new(latitude: impl Into<String>, longitude: impl Into<String>) -> Self {
        Self {
            latitude: latitude.into(),
            longitude: longitude.into(),
            depth: None,
            time: None,
        }
    }

    /// Empty record standing in for the blank line after a final newline.
    pub fn blank() -> Self {
        Self::new("", "")
    }

    pub fn is_blank(&self) -> bool {
        self.latitude.is_empty() && self.longitude.is_empty() && self.depth.is_none()
    }

    pub fn with_depth(mut self, depth: impl Into<String>) -> Self {
        self.depth = Some(depth.into());
        self
    }

    pub fn with_time(mut self, time: impl Into<String>) -> Self {
        self.time = Some(time.into());
        self
    }
}

/// Raw overlay spreadsheet row. Cells 1 and 2 hold the coordinate, cell 4 the depth.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OverlayRow {
    pub cells: Vec<String>,
}

impl OverlayRow {
    pub const LATITUDE: usize = 1;
    pub const LONGITUDE: usize = 2;
    pub const DEPTH: usize = 4;

    pub fn new<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cells: cells.into_iter().map(Into::into).collect(),
        }
    }

    pub fn latitude(&self) -> Option<&str> {
        self.cells.get(Self::LATITUDE).map(String::as_str)
    }

    pub fn longitude(&self) -> Option<&str> {
        self.cells.get(Self::LONGITUDE).map(String::as_str)
    }

    pub fn depth(&self) -> Option<&str> {
        self.cells.get(Self::DEPTH).map(String::as_str)
    }
}

/// A primary record after the join. `overlaid` marks a depth taken from an overlay row.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergedRecord {
    pub latitude: String,
    pub longitude: String,
    pub depth: Option<String>,
    pub time: Option<String>,
    pub overlaid: bool,
}

impl From<PrimaryRecord> for MergedRecord {
    fn from(record: PrimaryRecord) -> Self {
        Self {
            latitude: record.latitude,
            longitude: record.longitude,
            depth: record.depth,
            time: record.time,
            overlaid: false,
        }
    }
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
