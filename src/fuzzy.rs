//! String similarity scores on a 0..=100 scale.
//!
//! Both scores tokenize first (lowercase, anything non-alphanumeric is a separator),
//! so whitespace and punctuation variants of the same dish name compare equal.

use std::collections::BTreeSet;

use strsim::normalized_levenshtein;

fn tokens(s: &str) -> Vec<String> {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Plain edit-distance similarity of two strings.
pub fn ratio(a: &str, b: &str) -> u8 {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    (normalized_levenshtein(a, b) * 100.0).round() as u8
}

/// Best `ratio` of the shorter string against every equally long window of the longer one.
pub fn partial_ratio(a: &str, b: &str) -> u8 {
    let (short, long) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    let short_len = short.chars().count();
    let long_chars: Vec<char> = long.chars().collect();
    if short_len == 0 {
        return 0;
    }
    if short_len == long_chars.len() {
        return ratio(short, long);
    }

    let mut best = 0;
    for start in 0..=(long_chars.len() - short_len) {
        let window: String = long_chars[start..start + short_len].iter().collect();
        best = best.max(ratio(short, &window));
        if best == 100 {
            break;
        }
    }
    best
}

/// Similarity of the alphabetically sorted token lists. Used for dish deduplication.
///
/// Titles without any letter or digit (`"*"`, `"..."`) have no tokens and are
/// compared as written instead.
pub fn token_sort_ratio(a: &str, b: &str) -> u8 {
    let mut ta = tokens(a);
    let mut tb = tokens(b);
    if ta.is_empty() || tb.is_empty() {
        let (a, b) = (a.trim(), b.trim());
        return if !a.is_empty() && a == b { 100 } else { ratio(a, b) };
    }

    ta.sort();
    tb.sort();
    ratio(&ta.join(" "), &tb.join(" "))
}

/// Partial similarity over token sets: shared tokens dominate, extra garnish on either
/// side costs nothing as long as the rest is contained. Used for notification patterns.
pub fn partial_token_set_ratio(a: &str, b: &str) -> u8 {
    let sa: BTreeSet<String> = tokens(a).into_iter().collect();
    let sb: BTreeSet<String> = tokens(b).into_iter().collect();
    if sa.is_empty() || sb.is_empty() {
        return 0;
    }

    let join = |set: BTreeSet<&String>| {
        set.into_iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    };
    let shared = join(sa.intersection(&sb).collect());
    let only_a = join(sa.difference(&sb).collect());
    let only_b = join(sb.difference(&sa).collect());

    let with_shared = |rest: &str| format!("{} {}", shared, rest).trim().to_string();
    let combined_a = with_shared(&only_a);
    let combined_b = with_shared(&only_b);

    [
        partial_ratio(&shared, &combined_a),
        partial_ratio(&shared, &combined_b),
        partial_ratio(&combined_a, &combined_b),
    ]
    .into_iter()
    .max()
    .unwrap_or(0)
}
