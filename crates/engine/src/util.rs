//! Internal helpers for input validation and conversion.
//!
//! These utilities are **not** part of the public API.

use uuid::Uuid;

use crate::{EngineError, ResultEngine};

/// Parse a UUID from storage or input and return a labeled error on failure.
pub(crate) fn parse_uuid(value: &str, label: &str) -> ResultEngine<Uuid> {
    Uuid::parse_str(value).map_err(|_| EngineError::InvalidId(format!("invalid {label} id")))
}

pub(crate) fn normalize_required_name(value: &str, label: &str) -> ResultEngine<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation(format!(
            "{label} must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// Ticker symbols are 1..=10 ASCII alphanumerics (dots allowed, e.g.
/// `BRK.B`), stored upper-cased.
pub(crate) fn normalize_symbol(value: &str) -> ResultEngine<String> {
    let symbol = value.trim().to_ascii_uppercase();
    let valid_chars = symbol
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.');
    if symbol.is_empty() || symbol.len() > 10 || !valid_chars {
        return Err(EngineError::Validation(format!(
            "invalid symbol: {value}"
        )));
    }
    Ok(symbol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_are_upper_cased() {
        assert_eq!(normalize_symbol(" vti ").unwrap(), "VTI");
        assert_eq!(normalize_symbol("brk.b").unwrap(), "BRK.B");
    }

    #[test]
    fn symbols_are_bounded() {
        assert!(normalize_symbol("").is_err());
        assert!(normalize_symbol("ABCDEFGHIJK").is_err());
        assert!(normalize_symbol("A B").is_err());
    }

    #[test]
    fn optional_text_drops_blanks() {
        assert_eq!(normalize_optional_text(Some("  ")), None);
        assert_eq!(normalize_optional_text(Some(" hi ")), Some("hi".to_string()));
    }
}
