//! A tiny `*`-wildcard matcher for `HasSubscribers` pattern checks against
//! the in-memory backend's channel table. An external broker backend
//! delegates pattern matching to its own native facility instead.

/// Matches `pattern` against `text`, anchored at both ends. `*` matches any
/// run of characters (including none); every other character must match
/// literally. No escaping, no character classes -- the pattern language
/// itself is explicitly unspecified by the core, so this is
/// deliberately the simplest thing that lets a host avoid publishing to a
/// channel family no one is listening to.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    match_from(&pattern, &text)
}

fn match_from(pattern: &[char], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some((&'*', rest)) => {
            if match_from(rest, text) {
                return true;
            }
            if text.is_empty() {
                return false;
            }
            match_from(pattern, &text[1..])
        }
        Some((&p, rest)) => match text.split_first() {
            Some((&t, text_rest)) if t == p => match_from(rest, text_rest),
            _ => false,
        },
    }
}
