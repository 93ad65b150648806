//! Japanese phone number formatting.
//!
//! OCR frequently returns numbers with mixed separators or none at all. Each
//! candidate is reduced to its digits and re-hyphenated by digit count, with
//! an area-code prefix table for the ambiguous 10-digit case.

use std::sync::OnceLock;

use regex::Regex;

/// Area codes that are two digits long.
const TWO_DIGIT_AREA_CODES: [&str; 3] = ["03", "06", "04"];

/// Common three-digit area codes (major cities).
const THREE_DIGIT_AREA_CODES: [&str; 6] = ["052", "072", "075", "078", "082", "092"];

fn formatted_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{2,4}-\d{3,4}-\d{3,4}$").expect("phone shape regex"))
}

/// Format a comma-separated list of phone number candidates.
///
/// Splits on `,` and `、`, formats each candidate, drops the ones that come
/// back empty, and rejoins with `,`.
pub fn format_candidates(text: &str) -> String {
    text.split([',', '、'])
        .map(format_phone_number)
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

/// Format one phone number candidate.
///
/// Already well-shaped numbers pass through untouched. Otherwise the digits
/// are re-split by count: 10 digits by area-code table, 11 as 3-4-4, 8 as
/// 4-4, 9 as 3-3-3. More than 11 digits is rejected as invalid and yields an
/// empty string.
pub fn format_phone_number(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+' || *c == '-')
        .collect();

    if formatted_shape().is_match(&cleaned) {
        return cleaned;
    }

    let digits: String = cleaned.chars().filter(char::is_ascii_digit).collect();
    match digits.len() {
        8 => format!("{}-{}", &digits[..4], &digits[4..]),
        9 => format!("{}-{}-{}", &digits[..3], &digits[3..6], &digits[6..]),
        10 => split_ten_digits(&digits),
        11 => format!("{}-{}-{}", &digits[..3], &digits[3..7], &digits[7..]),
        _ => String::new(),
    }
}

/// Hyphenate a 10-digit number by area-code length.
///
/// The generic `0[4-9]` prefixes have no authoritative length table; treating
/// them as three-digit area codes (3-3-4) is a best-effort default.
fn split_ten_digits(digits: &str) -> String {
    if digits.starts_with("0120") {
        // Free-dial numbers read as 0120-NNN-NNN.
        return format!("{}-{}-{}", &digits[..4], &digits[4..7], &digits[7..]);
    }

    if TWO_DIGIT_AREA_CODES.contains(&&digits[..2]) {
        return format!("{}-{}-{}", &digits[..2], &digits[2..6], &digits[6..]);
    }

    if THREE_DIGIT_AREA_CODES.contains(&&digits[..3]) {
        return format!("{}-{}-{}", &digits[..3], &digits[3..6], &digits[6..]);
    }

    match digits.as_bytes().get(1) {
        Some(b'3') | Some(b'6') => format!("{}-{}-{}", &digits[..2], &digits[2..6], &digits[6..]),
        _ => format!("{}-{}-{}", &digits[..3], &digits[3..6], &digits[6..]),
    }
}
