//! Phone number normalization to E.164.
//!
//! Fail-soft by contract: a number that survives neither the default-region
//! parse nor the no-region parse is returned unchanged, and the caller is
//! expected to log a warning rather than treat it as an error.

/// Normalize a free-form phone number to E.164 (`+15551234567`) where
/// possible.  Tries a US default-region parse first, then an explicit
/// international parse; returns the input verbatim if both fail.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();

    if let Some(stripped) = trimmed.strip_prefix('+') {
        let digits = strip_formatting(stripped);
        if is_all_digits(&digits) && (8..=15).contains(&digits.len()) {
            return format!("+{digits}");
        }
        return raw.to_string();
    }

    let digits = strip_formatting(trimmed);
    if !is_all_digits(&digits) {
        return raw.to_string();
    }

    // US default-region heuristic: NANP area codes and exchanges never
    // start with 0 or 1.
    match digits.len() {
        10 if !digits.starts_with(['0', '1']) => format!("+1{digits}"),
        11 if digits.starts_with('1') && !digits[1..].starts_with(['0', '1']) => {
            format!("+{digits}")
        }
        _ => raw.to_string(),
    }
}

/// True if `normalize` changed nothing on a number that is not already
/// canonical, i.e. the number could not be parsed.
pub fn is_unparseable(raw: &str) -> bool {
    let normalized = normalize(raw);
    normalized == raw && !raw.starts_with('+')
}

fn strip_formatting(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect()
}

fn is_all_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}
