#![forbid(unsafe_code)]

use crate::ids::OwnerId;

pub const MAX_DISPLAY_NAME_CHARS: usize = 200;

/// Substrings the `list` parser keys on. A name containing one would be split in the wrong
/// place when read back.
const FIELD_MARKERS: [&str; 3] = ["Executor=", "Token=", "URL="];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisplayNameError {
    Empty,
    TooLong,
    ContainsControl,
    ContainsFieldMarker(&'static str),
}

impl DisplayNameError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "display name must not be empty",
            Self::TooLong => "display name is too long",
            Self::ContainsControl => "display name contains control characters",
            Self::ContainsFieldMarker(_) => "display name contains a reserved field marker",
        }
    }
}

pub fn normalize_display_name(raw: &str) -> Result<String, DisplayNameError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DisplayNameError::Empty);
    }
    if trimmed.chars().count() > MAX_DISPLAY_NAME_CHARS {
        return Err(DisplayNameError::TooLong);
    }
    if trimmed.chars().any(char::is_control) {
        return Err(DisplayNameError::ContainsControl);
    }
    if let Some(marker) = FIELD_MARKERS.into_iter().find(|m| trimmed.contains(*m)) {
        return Err(DisplayNameError::ContainsFieldMarker(marker));
    }
    Ok(trimmed.to_string())
}

/// Per-attempt marker: wall clock in nanoseconds plus a process-local sequence number, so two
/// attempts in the same nanosecond still differ.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttemptMarker {
    pub unix_nanos: u128,
    pub seq: u64,
}

/// Description handed to the runner binary at registration. It is what `list` later prints
/// as the runner name, so it has to single out this attempt.
pub fn disambiguated(owner_id: OwnerId, marker: AttemptMarker, display_name: &str) -> String {
    format!(
        "[owner:{owner_id} t:{}.{}] {display_name}",
        marker.unix_nanos, marker.seq
    )
}
