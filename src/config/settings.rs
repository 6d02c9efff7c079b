//! Runtime settings parsed from presentation-layer text input
//!
//! The presentation layer hands the engine raw text (baud rate, window
//! capacity, axis bounds). The rules for turning that text into values live
//! here so they can be tested without a backend.
//!
//! - Baud rate must be a positive integer; anything else is a configuration
//!   error reported to the user.
//! - Window capacity is clamped to at least 1; non-numeric text keeps the
//!   previous capacity.
//! - Y-axis bounds are either both empty (automatic) or two finite numbers
//!   with `min < max`.

use crate::error::{Result, ScopeError};
use crate::types::AxisBounds;

/// Parse baud rate text into a positive integer
pub fn parse_baud_rate(text: &str) -> Result<u32> {
    match text.trim().parse::<u32>() {
        Ok(baud) if baud > 0 => Ok(baud),
        _ => Err(ScopeError::InvalidBaudRate(text.to_string())),
    }
}

/// Parse window capacity text, falling back to `previous` when it isn't numeric
pub fn parse_window_capacity(text: &str, previous: usize) -> usize {
    let trimmed = text.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return usize::try_from(n).unwrap_or(0).max(1);
    }
    // Oversized values are still numeric; saturate instead of falling back
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        return usize::MAX;
    }
    previous.max(1)
}

/// Parse manual Y-axis bounds; `Ok(None)` means automatic scaling
pub fn parse_axis_bounds(min_text: &str, max_text: &str) -> Result<Option<AxisBounds>> {
    let (min_text, max_text) = (min_text.trim(), max_text.trim());
    if min_text.is_empty() && max_text.is_empty() {
        return Ok(None);
    }

    let parse = |t: &str| {
        t.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ScopeError::InvalidAxisBounds(format!("{:?} is not a number", t)))
    };
    let min = parse(min_text)?;
    let max = parse(max_text)?;

    if min >= max {
        return Err(ScopeError::InvalidAxisBounds(format!(
            "min {} must be below max {}",
            min, max
        )));
    }

    Ok(Some(AxisBounds { min, max }))
}
