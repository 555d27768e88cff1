//! Word-level phrase matching shared by the router and the planner.

/// Lowercased words of `text`, split on anything that is not alphanumeric.
pub fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Whether `phrase` occurs in `haystack` as a run of whole words.
pub fn contains_phrase(haystack: &[String], phrase: &str) -> bool {
    find_phrase(haystack, phrase).is_some()
}

/// Word offset of the first whole-word occurrence of `phrase`.
pub fn find_phrase(haystack: &[String], phrase: &str) -> Option<usize> {
    let needle = words(phrase);
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle.as_slice())
}
