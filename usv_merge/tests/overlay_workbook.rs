use std::fs;
use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;
use usv_merge::{
    load_overlays, merge, parse_overlay, InputFile, MergeParams, PrimaryRecord, TimeConfig,
};

fn fixture(name: &str) -> InputFile {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    let bytes = fs::read(&path).unwrap();
    InputFile::new(name, bytes)
}

#[test]
fn first_sheet_rows_without_header() {
    let batch = parse_overlay(&fixture("page3.xlsx"), 0).unwrap();
    assert_eq!(batch.rows.len(), 2);
    assert!(batch.report.is_clean());
    assert_eq!(batch.report.rows, 2);

    let first = &batch.rows[0];
    assert_eq!(first.cells[0], "1");
    assert_eq!(first.latitude(), Some("1"));
    assert_eq!(first.longitude(), Some("2.25"));
    assert_eq!(first.depth(), Some("9.5"));

    let second = &batch.rows[1];
    assert_eq!(second.latitude(), Some("1.50"));
    assert_eq!(second.longitude(), Some("2.30"));
    assert_eq!(second.depth(), Some("4.75"));

    // the second sheet never contributes
    assert!(batch.rows.iter().all(|row| row.latitude() != Some("7")));
}

#[test]
fn leading_empty_column_keeps_cell_positions() {
    let batch = parse_overlay(&fixture("page3_offset.xlsx"), 0).unwrap();
    assert_eq!(batch.rows.len(), 2);
    assert_eq!(batch.rows[0].cells.len(), 5);
    assert_eq!(batch.rows[0].cells[0], "");
    assert_eq!(batch.rows[0].latitude(), Some("-6.5"));
    assert_eq!(batch.rows[0].longitude(), Some("106.75"));
    assert_eq!(batch.rows[0].depth(), Some("3"));
    assert_eq!(batch.rows[1].cells[3], "");
    assert_eq!(batch.rows[1].depth(), Some("12.125"));
}

#[test]
fn workbook_selection_keeps_file_order() {
    let set = load_overlays(&[fixture("page3_offset.xlsx"), fixture("page3.xlsx")]);
    let lats: Vec<_> = set.rows.iter().map(|r| r.latitude().unwrap()).collect();
    assert_eq!(lats, vec!["-6.5", "-6.25", "1", "1.50"]);
    let files: Vec<_> = set.reports.iter().map(|r| r.file.as_str()).collect();
    assert_eq!(files, vec!["page3_offset.xlsx", "page3.xlsx"]);
}

#[test]
fn workbook_overlay_merges_onto_track() {
    let primary = vec![
        PrimaryRecord::new("-6.5", "106.75").with_depth("0.5").with_time("a"),
        PrimaryRecord::new("-6.4", "106.77").with_depth("0.6").with_time("b"),
        PrimaryRecord::new("-6.25", "106.8").with_depth("0.7").with_time("c"),
        PrimaryRecord::blank(),
    ];
    let set = load_overlays(&[fixture("page3_offset.xlsx")]);
    let out = merge(
        &primary,
        &set.rows,
        &TimeConfig::default(),
        &MergeParams::default(),
        &mut StdRng::seed_from_u64(5),
    )
    .unwrap();

    assert_eq!(out.join.matched, 2);
    assert_eq!(out.fill.filled, 1);
    let lines: Vec<_> = out.preview.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[1], "-6.5,106.75,3,a");
    assert_eq!(lines[3], "-6.25,106.8,12.125,c");
    let middle: f64 = lines[2].split(',').nth(2).unwrap().parse().unwrap();
    assert!((3.0..=12.13).contains(&middle));
}
