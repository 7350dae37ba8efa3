use thiserror::Error;

/// Shortest accepted international number, country code included.
pub const MIN_PHONE_DIGITS: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhoneNumberError {
    #[error("phone number is required")]
    Required,
    #[error("phone number is too short (minimum 7 digits)")]
    TooShort,
    #[error("phone number must be in international format without a leading 0")]
    NotInternational,
}

/// Strips everything but digits, so "+27 82-123 4567" and "27821234567"
/// name the same number.
pub fn normalize_phone_number(input: &str) -> Result<String, PhoneNumberError> {
    let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.is_empty() {
        return Err(PhoneNumberError::Required);
    }
    if digits.len() < MIN_PHONE_DIGITS {
        return Err(PhoneNumberError::TooShort);
    }
    if digits.starts_with('0') {
        return Err(PhoneNumberError::NotInternational);
    }
    Ok(digits)
}
