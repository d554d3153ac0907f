//! Ordering of untyped version identifiers.

use std::cmp::Ordering;

fn is_numeric(v: &str) -> bool {
    !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit())
}

/// Compare two version identifiers.
///
/// All-digit identifiers compare as integers of any width (`"10" > "2"`,
/// `"007"` ties `"7"` numerically and is broken lexically).  Any other
/// identifier compares lexically and ranks below every all-digit one, so
/// the order is total and `"latest"` is always the greatest number.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (is_numeric(a), is_numeric(b)) {
        (true, true) => {
            let ta = a.trim_start_matches('0');
            let tb = b.trim_start_matches('0');
            ta.len()
                .cmp(&tb.len())
                .then_with(|| ta.cmp(tb))
                .then_with(|| a.cmp(b))
        }
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.cmp(b),
    }
}

/// Sort versions ascending with [`compare_versions`].
pub fn sort_versions<S: AsRef<str>>(versions: &mut [S]) {
    versions.sort_by(|a, b| compare_versions(a.as_ref(), b.as_ref()));
}
