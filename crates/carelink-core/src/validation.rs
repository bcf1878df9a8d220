//! Write-time input checks

use crate::error::CoreError;

pub fn require_non_empty(field: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

/// Exact, case-sensitive membership in a fixed set
pub fn require_one_of(field: &str, value: &str, allowed: &[&str]) -> Result<(), CoreError> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "{} must be one of [{}], got '{}'",
            field,
            allowed.join(", "),
            value
        )))
    }
}

pub fn require_optional_one_of(
    field: &str,
    value: Option<&str>,
    allowed: &[&str],
) -> Result<(), CoreError> {
    match value {
        Some(value) => require_one_of(field, value, allowed),
        None => Ok(()),
    }
}

/// Inclusive range check; NaN is rejected
pub fn require_in_range(field: &str, value: f64, min: f64, max: f64) -> Result<(), CoreError> {
    if value >= min && value <= max {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "{} must be within [{}, {}], got {}",
            field, min, max, value
        )))
    }
}

/// Every list entry must carry text
pub fn require_list_items(field: &str, items: &[String]) -> Result<(), CoreError> {
    if items.iter().any(|item| item.trim().is_empty()) {
        return Err(CoreError::Validation(format!(
            "{} entries must be non-empty",
            field
        )));
    }
    Ok(())
}
