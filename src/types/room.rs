//! Room label validation

use super::error::{RelayError, RelayResult};

/// Default maximum length (in bytes) of a room label
pub const DEFAULT_MAX_ROOM_LABEL_LEN: usize = 256;

/// Validate an inbound room label.
///
/// Labels are opaque, but must be non-empty, not only whitespace, free of
/// control characters, and at most `max_len` bytes.
pub fn validate_room_label(room: &str, max_len: usize) -> RelayResult<()> {
    if room.trim().is_empty() {
        return Err(RelayError::invalid_room("label is empty"));
    }
    if room.len() > max_len {
        return Err(RelayError::invalid_room(format!(
            "label is {} bytes, limit is {}",
            room.len(),
            max_len
        )));
    }
    if room.chars().any(char::is_control) {
        return Err(RelayError::invalid_room("label contains control characters"));
    }
    Ok(())
}
