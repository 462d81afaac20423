//! Validation helpers for DTOs.

use validator::ValidationError;

/// Number of digits of a room PIN.
pub const PIN_LENGTH: usize = 6;

/// Validates that a room PIN is exactly six ASCII digits.
///
/// # Examples
///
/// ```ignore
/// validate_pin("012345") // Ok
/// validate_pin("12345")  // Err - too short
/// validate_pin("12a456") // Err - not a digit
/// ```
pub fn validate_pin(pin: &str) -> Result<(), ValidationError> {
    if pin.len() != PIN_LENGTH {
        let mut err = ValidationError::new("pin_length");
        err.message = Some(format!("PIN must be exactly {PIN_LENGTH} digits (got {})", pin.len()).into());
        return Err(err);
    }

    if !pin.chars().all(|c| c.is_ascii_digit()) {
        let mut err = ValidationError::new("pin_format");
        err.message = Some("PIN must contain only digits".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that both coordinates lie inside the unit square.
pub fn validate_position(position: &[f64; 2]) -> Result<(), ValidationError> {
    if position.iter().all(|value| (0.0..=1.0).contains(value)) {
        return Ok(());
    }

    let mut err = ValidationError::new("position_range");
    err.message = Some("position coordinates must be within [0, 1]".into());
    Err(err)
}
