//! Byte-count formatting for report cells.
//!
//! Formatted values keep at most three decimals, so converting back with
//! [`parse_bytes`] is approximate. They are a display format, never a
//! storage format.

/// Binary units, largest first, with their size in bytes.
pub const BYTE_UNITS: [(&str, u64); 3] = [("GiB", 1 << 30), ("MiB", 1 << 20), ("kiB", 1 << 10)];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UnitError {
    #[error("unrecognised byte unit in {0:?}")]
    UnknownUnit(String),
    #[error("{0:?} is not a byte count")]
    InvalidNumber(String),
}

/// Format a byte count using the largest unit it exceeds (kiB, MiB, GiB).
///
/// Counts up to 1024 are returned as a plain integer without suffix.
pub fn format_bytes(value: u64) -> String {
    for (unit, size) in BYTE_UNITS {
        if value > size {
            let scaled = format!("{:.3}", value as f64 / size as f64);
            return format!("{} {unit}", trim_decimals(&scaled));
        }
    }
    value.to_string()
}

fn trim_decimals(text: &str) -> &str {
    if !text.contains('.') {
        return text;
    }
    text.trim_end_matches('0').trim_end_matches('.')
}

/// True when the text carries a binary unit suffix ("...iB").
pub fn has_byte_unit(text: &str) -> bool {
    text.trim_end().ends_with("iB")
}

/// Parse a byte count, either plain ("2048") or with a unit ("1.5 kiB").
pub fn try_parse_bytes(text: &str) -> Result<u64, UnitError> {
    let trimmed = text.trim();
    if !has_byte_unit(trimmed) {
        return parse_plain(trimmed).ok_or_else(|| UnitError::InvalidNumber(text.to_string()));
    }

    let split = trimmed.len().saturating_sub(3);
    let (number, unit) = match (trimmed.get(..split), trimmed.get(split..)) {
        (Some(number), Some(unit)) => (number, unit),
        _ => return Err(UnitError::UnknownUnit(text.to_string())),
    };
    let size = BYTE_UNITS
        .iter()
        .find(|(name, _)| *name == unit)
        .map(|(_, size)| *size)
        .ok_or_else(|| UnitError::UnknownUnit(text.to_string()))?;
    let scaled: f64 = number
        .trim()
        .parse()
        .map_err(|_| UnitError::InvalidNumber(text.to_string()))?;
    if !scaled.is_finite() || scaled < 0.0 {
        return Err(UnitError::InvalidNumber(text.to_string()));
    }
    Ok((scaled * size as f64).round() as u64)
}

fn parse_plain(text: &str) -> Option<u64> {
    if let Ok(value) = text.parse::<u64>() {
        return Some(value);
    }
    let value: f64 = text.parse().ok()?;
    (value.is_finite() && value >= 0.0).then(|| value.round() as u64)
}

/// Like [`try_parse_bytes`], but anything unparseable counts as zero.
pub fn parse_bytes(text: &str) -> u64 {
    try_parse_bytes(text).unwrap_or(0)
}
