//! Phone number normalisation

use crate::error::PipelineError;

const MIN_DIGITS: usize = 7;
const MAX_DIGITS: usize = 15;

/// Longest country prefix tried during policy lookup
pub const MAX_PREFIX_DIGITS: usize = 4;

/// Normalise user input to `+` followed by 7-15 digits (E.164 shape).
/// Spaces, dashes, dots and parentheses are ignored; a leading `00` is read
/// as the international prefix.
pub fn normalize(input: &str) -> Result<String, PipelineError> {
    let trimmed = input.trim();
    let body = trimmed
        .strip_prefix('+')
        .or_else(|| trimmed.strip_prefix("00"))
        .unwrap_or(trimmed);

    let mut digits = String::with_capacity(body.len());
    for c in body.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => {
                return Err(PipelineError::InvalidInput(format!(
                    "unexpected character '{}' in phone number",
                    c
                )))
            }
        }
    }

    if digits.len() < MIN_DIGITS || digits.len() > MAX_DIGITS {
        return Err(PipelineError::InvalidInput(format!(
            "phone number must have {}-{} digits",
            MIN_DIGITS, MAX_DIGITS
        )));
    }
    if digits.starts_with('0') {
        return Err(PipelineError::InvalidInput(
            "phone number must start with a country code".to_string(),
        ));
    }

    Ok(format!("+{}", digits))
}

pub fn digits(phone: &str) -> &str {
    phone.strip_prefix('+').unwrap_or(phone)
}

/// Country prefixes to try, longest first (4, 3, 2, 1 digits).
pub fn prefix_candidates(phone: &str) -> Vec<&str> {
    let digits = digits(phone);
    let longest = MAX_PREFIX_DIGITS.min(digits.len());
    (1..=longest).rev().map(|len| &digits[..len]).collect()
}

/// Log-safe rendering: everything but the last four digits is hidden.
pub fn mask(phone: &str) -> String {
    let digits = digits(phone);
    let keep = digits.len().min(4);
    let hidden = digits.len() - keep;
    format!("+{}{}", "*".repeat(hidden), &digits[hidden..])
}
