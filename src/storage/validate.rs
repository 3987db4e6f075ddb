//! Shared request validation for byte ranges and multipart part numbers.
//! Offsets here are unsigned, so a "negative" offset collapses to an
//! ordering check against the range's end.

use crate::error::{DbError, Result};

/// Validate a byte range. `start >= end` is invalid; a `start` past the
/// object's length is clamped to an empty read by the caller, not rejected
/// here — only the shape of the range is validated.
pub fn validate_range(start: u64, end: u64) -> Result<()> {
    if start >= end {
        return Err(DbError::InvalidRange(format!(
            "start ({start}) must be < end ({end})"
        )));
    }
    Ok(())
}

/// Validate a multipart part number is within the documented bound.
pub fn validate_part_number(part: u32) -> Result<()> {
    if !(1..=10_000).contains(&part) {
        return Err(DbError::InvalidArgument(format!(
            "part number {part} out of range [1, 10000]"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_start_past_end() {
        assert!(validate_range(10, 5).is_err());
        assert!(validate_range(5, 5).is_err());
        assert!(validate_range(5, 6).is_ok());
    }

    #[test]
    fn part_number_bounds() {
        assert!(validate_part_number(0).is_err());
        assert!(validate_part_number(10_001).is_err());
        assert!(validate_part_number(1).is_ok());
        assert!(validate_part_number(10_000).is_ok());
    }
}
