use serde::{Deserialize, Serialize};

use super::MergedRecord;

/// Output header. "Lattitude" is spelled the way downstream tools expect it.
pub const HEADER: &str = "Lattitude,Longitude,Depth,Time";

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenderOptions {
    /// Rewrite numeric depths with this many decimals. Text that does not parse is kept.
    pub depth_decimals: Option<usize>,
}

/// Render the preview text. The final record is never written.
///
/// Values are joined with bare commas and lines with `\n`; nothing is quoted.
pub fn render_preview(records: &[MergedRecord], options: &RenderOptions) -> String {
    let kept = records.len().saturating_sub(1);
    let mut out = String::from(HEADER);
    for record in &records[..kept] {
        out.push('\n');
        out.push_str(&record.latitude);
        out.push(',');
        out.push_str(&record.longitude);
        out.push(',');
        out.push_str(&render_depth(record.depth.as_deref(), options));
        out.push(',');
        out.push_str(record.time.as_deref().unwrap_or(""));
    }
    out
}

fn render_depth(depth: Option<&str>, options: &RenderOptions) -> String {
    let Some(text) = depth else {
        return String::new();
    };
    match options.depth_decimals {
        Some(decimals) => match text.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => format!("{value:.decimals$}"),
            _ => text.to_string(),
        },
        None => text.to_string(),
    }
}
