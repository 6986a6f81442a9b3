use time::OffsetDateTime;
use time::macros::format_description;
use uuid::Uuid;

/// Generate a canonical recording id: `YYYYMMDD-<uuidv4>`.
///
/// The date prefix lets the offset index locate the day file a recording
/// lives in without scanning; the uuid suffix guarantees global uniqueness
/// even when two recordings land in the same file on the same day.
pub fn new_recording_id(now: OffsetDateTime) -> String {
    format!("{}-{}", date_prefix(now), Uuid::new_v4())
}

pub fn date_prefix(now: OffsetDateTime) -> String {
    let format = format_description!("[year][month][day]");
    now.format(&format).expect("static format never fails")
}

/// Extract the `YYYYMMDD` prefix from a canonical id, if it has the expected shape.
pub fn prefix_of(id: &str) -> Option<&str> {
    let (prefix, rest) = id.split_once('-')?;
    if prefix.len() == 8 && prefix.bytes().all(|b| b.is_ascii_digit()) && !rest.is_empty() {
        Some(prefix)
    } else {
        None
    }
}
