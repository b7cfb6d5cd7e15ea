use crate::model::StatusRecord;

/// Marker yt-dlp prints in front of each progress line (see `PROGRESS_TEMPLATE`).
pub const PROGRESS_MARKER: &str = "[progress]";

/// Passed to `--progress-template`: downloaded, total, estimated total.
pub const PROGRESS_TEMPLATE: &str = "download:[progress] %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s";

/// Parse one stdout line into a `Downloading` record, if it is a progress line.
pub fn parse_progress_line(line: &str) -> Option<StatusRecord> {
    let rest = line.trim().strip_prefix(PROGRESS_MARKER)?;
    let mut fields = rest.split_whitespace();
    let downloaded_bytes = parse_bytes(fields.next()?)?;
    let total = fields.next().and_then(parse_bytes);
    let estimate = fields.next().and_then(parse_bytes);
    Some(StatusRecord::Downloading {
        downloaded_bytes,
        total_bytes: total.or(estimate),
    })
}

/// yt-dlp prints integers, floats (estimates) or `NA` for missing values.
fn parse_bytes(field: &str) -> Option<u64> {
    if let Ok(v) = field.parse::<u64>() {
        return Some(v);
    }
    match field.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Some(v.round() as u64),
        _ => None,
    }
}
