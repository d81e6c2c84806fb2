//! In-memory operator session: loader buffers, preview text and export.

use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::loader::{load_overlays, parse_primary, InputFile, OverlaySet, ParseReport};
use super::merge::{merge, MergeOutcome};
use super::timing::TimeConfig;
use super::{sha256_hex, MergeError, MergeParams, PrimaryRecord};

/// Name of the exported file. No extension is added.
pub const EXPORT_FILE_NAME: &str = "RAW DATA USV";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportReceipt {
    pub path: PathBuf,
    pub bytes: usize,
    pub sha256: String,
}

#[derive(Debug, Default)]
pub struct Session {
    params: MergeParams,
    primary: Vec<PrimaryRecord>,
    primary_report: Option<ParseReport>,
    overlays: OverlaySet,
    outcome: Option<MergeOutcome>,
    preview: String,
    reset_armed: bool,
}

impl Session {
    pub fn new(params: MergeParams) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    pub fn params(&self) -> &MergeParams {
        &self.params
    }

    pub fn primary(&self) -> &[PrimaryRecord] {
        &self.primary
    }

    pub fn primary_report(&self) -> Option<&ParseReport> {
        self.primary_report.as_ref()
    }

    pub fn overlays(&self) -> &OverlaySet {
        &self.overlays
    }

    pub fn outcome(&self) -> Option<&MergeOutcome> {
        self.outcome.as_ref()
    }

    /// Replace the primary buffer. A file that cannot be read leaves the old buffer in place.
    pub fn load_primary(&mut self, file: InputFile) -> ParseReport {
        self.reset_armed = false;
        let report = match parse_primary(&file) {
            Ok((records, report)) => {
                info!(file = %file.name, rows = report.rows, "primary track log loaded");
                self.primary = records;
                report
            }
            Err(err) => {
                warn!(file = %file.name, error = %err, "primary track log rejected");
                ParseReport::failed(&file.name, &err)
            }
        };
        self.primary_report = Some(report.clone());
        report
    }

    /// Replace the overlay buffer with the rows of `files`, in the order given.
    pub fn load_overlays(&mut self, files: Vec<InputFile>) -> Vec<ParseReport> {
        self.reset_armed = false;
        if self.primary.is_empty() {
            warn!("overlays loaded before any primary track log");
        }
        let set = load_overlays(&files);
        info!(
            files = files.len(),
            rows = set.rows.len(),
            "overlay selection loaded"
        );
        let reports = set.reports.clone();
        self.overlays = set;
        reports
    }

    /// Run the merge and make its output the current preview.
    pub fn execute(&mut self, time: &TimeConfig) -> Result<&MergeOutcome, MergeError> {
        self.reset_armed = false;
        if self.primary.is_empty() {
            return Err(MergeError::EmptyPrimary);
        }
        let outcome = match self.params.seed {
            Some(seed) => merge(
                &self.primary,
                &self.overlays.rows,
                time,
                &self.params,
                &mut StdRng::seed_from_u64(seed),
            )?,
            None => merge(
                &self.primary,
                &self.overlays.rows,
                time,
                &self.params,
                &mut rand::rng(),
            )?,
        };
        info!(
            records = outcome.records.len(),
            matched = outcome.join.matched,
            unmatched = outcome.join.unmatched,
            filled = outcome.fill.filled,
            "merge executed"
        );
        if outcome.fill.missing_anchor > 0 || outcome.fill.invalid_anchor > 0 {
            debug!(
                missing_anchor = outcome.fill.missing_anchor,
                invalid_anchor = outcome.fill.invalid_anchor,
                "depths kept without two overlay anchors"
            );
        }
        self.preview = outcome.preview.clone();
        let stored = self.outcome.insert(outcome);
        Ok(&*stored)
    }

    pub fn preview(&self) -> &str {
        &self.preview
    }

    /// Overwrite the preview text. Edits are never parsed back into records.
    pub fn edit_preview(&mut self, text: impl Into<String>) {
        self.reset_armed = false;
        self.preview = text.into();
    }

    pub fn can_download(&self) -> bool {
        !self.primary.is_empty() && !self.preview.is_empty()
    }

    /// Write the preview to `dir/RAW DATA USV`.
    pub fn export(&self, dir: &Path) -> Result<ExportReceipt, MergeError> {
        if !self.can_download() {
            return Err(MergeError::ExportUnavailable);
        }
        let path = dir.join(EXPORT_FILE_NAME);
        fs::write(&path, self.preview.as_bytes())?;
        let receipt = ExportReceipt {
            path,
            bytes: self.preview.len(),
            sha256: sha256_hex(self.preview.as_bytes()),
        };
        info!(path = %receipt.path.display(), bytes = receipt.bytes, "preview exported");
        Ok(receipt)
    }

    /// Double activation: the first call arms, a second consecutive call clears.
    pub fn request_reset(&mut self) -> bool {
        if self.reset_armed {
            self.reset();
            true
        } else {
            self.reset_armed = true;
            false
        }
    }

    /// Drop every buffer at once. Parameters survive.
    pub fn reset(&mut self) {
        let params = std::mem::take(&mut self.params);
        *self = Session::new(params);
        info!("session cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::IntervalUnit;

    const TRACK: &str = "Lattitude,Longitude,Depth,Time\n\
                         1.0,2.0,5,t0\n\
                         1.0,2.1,6,\n\
                         1.0,2.2,7,\n\
                         1.0,2.3,8,\n";

    fn loaded(params: MergeParams) -> Session {
        let mut session = Session::new(params);
        session.load_primary(InputFile::new("track.csv", TRACK));
        session.load_overlays(vec![
            InputFile::new("a.csv", "h\n,1.0,2.0,,1.50\n"),
            InputFile::new("b.csv", "h\n,1.0,2.3,,3.50\n,9,9,,0\n"),
        ]);
        session
    }

    #[test]
    fn execute_requires_primary() {
        let mut session = Session::default();
        let err = session.execute(&TimeConfig::default()).unwrap_err();
        assert!(matches!(err, MergeError::EmptyPrimary));
        assert!(!session.can_download());
    }

    #[test]
    fn execute_sets_preview_and_fills_between_overlays() {
        let mut session = loaded(MergeParams::default());
        let outcome = session.execute(&TimeConfig::default()).unwrap();
        assert_eq!(outcome.join.matched, 2);
        assert_eq!(outcome.join.unmatched, 1);
        assert_eq!(outcome.fill.filled, 2);
        let lines: Vec<_> = session.preview().lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[1], "1.0,2.0,1.50,t0");
        for line in &lines[2..] {
            let depth: f64 = line.split(',').nth(2).unwrap().parse().unwrap();
            assert!((1.5..=3.5).contains(&depth));
        }
        assert!(session.can_download());
    }

    #[test]
    fn seeded_sessions_repeat() {
        let time = TimeConfig::from_inputs("2024-05-01", "08:30:00", "500", IntervalUnit::Millisecond)
            .unwrap();
        let params = MergeParams {
            seed: Some(99),
            ..MergeParams::default()
        };
        let mut a = loaded(params.clone());
        let mut b = loaded(params);
        a.execute(&time).unwrap();
        b.execute(&time).unwrap();
        assert_eq!(a.preview(), b.preview());
        assert!(a.preview().contains("2024-05-01 08:30:00.500"));
    }

    #[test]
    fn edits_replace_preview_and_are_exported() {
        let mut session = loaded(MergeParams::default());
        session.execute(&TimeConfig::default()).unwrap();
        session.edit_preview("Lattitude,Longitude,Depth,Time\nedited");
        assert_eq!(session.outcome().unwrap().records.len(), 5);

        let dir = tempfile::tempdir().unwrap();
        let receipt = session.export(dir.path()).unwrap();
        assert_eq!(receipt.path, dir.path().join("RAW DATA USV"));
        let written = fs::read_to_string(&receipt.path).unwrap();
        assert_eq!(written, "Lattitude,Longitude,Depth,Time\nedited");
        assert_eq!(receipt.bytes, written.len());
        assert_eq!(receipt.sha256.len(), 64);
    }

    #[test]
    fn export_blocked_when_preview_empty() {
        let mut session = loaded(MergeParams::default());
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            session.export(dir.path()),
            Err(MergeError::ExportUnavailable)
        ));
        session.execute(&TimeConfig::default()).unwrap();
        session.edit_preview("");
        assert!(!session.can_download());
    }

    #[test]
    fn reset_needs_two_consecutive_requests() {
        let params = MergeParams {
            seed: Some(3),
            ..MergeParams::default()
        };
        let mut session = loaded(params.clone());
        session.execute(&TimeConfig::default()).unwrap();

        assert!(!session.request_reset());
        session.edit_preview("keep");
        assert!(!session.request_reset());
        assert_eq!(session.preview(), "keep");
        assert!(session.request_reset());

        assert!(session.primary().is_empty());
        assert!(session.overlays().rows.is_empty());
        assert!(session.outcome().is_none());
        assert_eq!(session.preview(), "");
        assert_eq!(session.params(), &params);
    }

    #[test]
    fn overlay_reload_replaces_previous_selection() {
        let mut session = loaded(MergeParams::default());
        assert_eq!(session.overlays().rows.len(), 3);
        let reports = session.load_overlays(vec![InputFile::new("c.csv", "h\n,1.0,2.1,,2\n")]);
        assert_eq!(reports.len(), 1);
        assert_eq!(session.overlays().rows.len(), 1);
    }

    #[test]
    fn primary_row_issues_are_reported() {
        let mut session = Session::default();
        let report = session.load_primary(InputFile::new("track.csv", "lat,lon\nonly\n1,2\n"));
        assert_eq!(report.rows, 1);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(session.primary().len(), 2);
        assert_eq!(session.primary_report(), Some(&report));
    }

    #[test]
    fn newline_terminated_track_exports_every_row() {
        let mut session = Session::default();
        session.load_primary(InputFile::new(
            "track.csv",
            "Lattitude,Longitude,Depth,Time\n1,1,5,a\n1,2,6,b\n1,3,7,c\n",
        ));
        session.execute(&TimeConfig::default()).unwrap();
        assert_eq!(
            session.preview(),
            "Lattitude,Longitude,Depth,Time\n1,1,5,a\n1,2,6,b\n1,3,7,c"
        );

        let dir = tempfile::tempdir().unwrap();
        let receipt = session.export(dir.path()).unwrap();
        let written = fs::read_to_string(&receipt.path).unwrap();
        assert_eq!(written.lines().skip(1).count(), 3);
    }

    #[test]
    fn unterminated_track_still_drops_last_row() {
        let mut session = Session::default();
        session.load_primary(InputFile::new(
            "track.csv",
            "Lattitude,Longitude,Depth,Time\n1,1,5,a\n1,2,6,b\n1,3,7,c",
        ));
        session.execute(&TimeConfig::default()).unwrap();
        assert_eq!(
            session.preview(),
            "Lattitude,Longitude,Depth,Time\n1,1,5,a\n1,2,6,b"
        );
    }
}
