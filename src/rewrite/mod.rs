//! URL rewriting.
//!
//! The Rewriter adapts absolute URLs embedded in stored values when state
//! moves between environments. Values holding PHP-serialized data are
//! rewritten structurally (see [`serialized`]); everything else gets a plain
//! substitution.
//!
//! Counting and replacing agree: for a value with `n` occurrences of `from`,
//! [`replace_value`] reports `n` replacements and leaves none behind
//! (unless `to` itself contains `from`).

pub mod serialized;

/// Number of non-overlapping occurrences of `needle` in `text`.
#[must_use]
pub fn count_occurrences(text: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    text.matches(needle).count()
}

/// Replace every occurrence of `from` with `to` in one stored value.
///
/// Returns the new value and the number of replacements.
#[must_use]
pub fn replace_value(value: &str, from: &str, to: &str) -> (String, usize) {
    if from.is_empty() || !value.contains(from) {
        return (value.to_string(), 0);
    }
    if let Some(rewritten) = serialized::rewrite(value, from, to) {
        return rewritten;
    }
    let count = count_occurrences(value, from);
    (value.replace(from, to), count)
}

/// [`count_occurrences`] for a stored text value that may not be valid UTF-8.
#[must_use]
pub fn count_in_bytes(value: &[u8], needle: &str) -> usize {
    match std::str::from_utf8(value) {
        Ok(text) => count_occurrences(text, needle),
        Err(_) => byte_matches(value, needle.as_bytes()).len(),
    }
}

/// [`replace_value`] for a stored text value that may not be valid UTF-8.
///
/// Invalid UTF-8 gets a plain byte substitution.
#[must_use]
pub fn replace_in_bytes(value: &[u8], from: &str, to: &str) -> (Vec<u8>, usize) {
    if let Ok(text) = std::str::from_utf8(value) {
        let (out, n) = replace_value(text, from, to);
        return (out.into_bytes(), n);
    }
    let starts = byte_matches(value, from.as_bytes());
    if starts.is_empty() {
        return (value.to_vec(), 0);
    }
    let mut out = Vec::with_capacity(value.len() + starts.len() * to.len());
    let mut pos = 0;
    for &start in &starts {
        out.extend_from_slice(&value[pos..start]);
        out.extend_from_slice(to.as_bytes());
        pos = start + from.len();
    }
    out.extend_from_slice(&value[pos..]);
    (out, starts.len())
}

/// Start offsets of non-overlapping matches.
fn byte_matches(haystack: &[u8], needle: &[u8]) -> Vec<usize> {
    let mut starts = Vec::new();
    if needle.is_empty() {
        return starts;
    }
    let mut pos = 0;
    while pos + needle.len() <= haystack.len() {
        if &haystack[pos..pos + needle.len()] == needle {
            starts.push(pos);
            pos += needle.len();
        } else {
            pos += 1;
        }
    }
    starts
}
