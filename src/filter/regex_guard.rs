//! Syntactic guard against pathological regex patterns
//!
//! `$regex` operands come straight from callers, so patterns are
//! screened before compilation. The guard is a cheap single pass over
//! the pattern text; anything it cannot vouch for is rejected and the
//! predicate evaluates to false.

use regex::RegexBuilder;

/// Longest pattern the guard accepts.
pub const MAX_PATTERN_LENGTH: usize = 200;

/// Most capturing groups the guard accepts.
pub const MAX_CAPTURING_GROUPS: usize = 10;

/// Screen a pattern for shapes that invite catastrophic backtracking.
///
/// Rejects patterns that are too long, carry too many capturing
/// groups, or put a quantifier directly behind a closed group whose
/// body contains a quantifier itself (the `(a+)+` family).
pub fn is_safe_pattern(pattern: &str) -> bool {
    if pattern.len() > MAX_PATTERN_LENGTH {
        return false;
    }

    let mut chars = pattern.chars().peekable();
    let mut escaped = false;
    let mut in_class = false;
    // One flag per open group: does its body contain a quantifier?
    let mut open_groups: Vec<bool> = Vec::new();
    let mut capturing = 0usize;
    // Set right after ')' to the closed group's flag
    let mut just_closed: Option<bool> = None;
    let mut prev: Option<char> = None;

    while let Some(c) = chars.next() {
        if escaped {
            escaped = false;
            just_closed = None;
            prev = Some(c);
            continue;
        }
        match c {
            '\\' => {
                escaped = true;
                just_closed = None;
            }
            '[' if !in_class => {
                in_class = true;
                just_closed = None;
            }
            ']' if in_class => {
                in_class = false;
                just_closed = None;
            }
            _ if in_class => {
                just_closed = None;
            }
            '(' => {
                open_groups.push(false);
                if chars.peek() != Some(&'?') {
                    capturing += 1;
                    if capturing > MAX_CAPTURING_GROUPS {
                        return false;
                    }
                }
                just_closed = None;
            }
            ')' => {
                let had_quantifier = open_groups.pop().unwrap_or(false);
                // Quantifiers in the body count against enclosing
                // groups too, so "((a+)b)+" is caught
                if had_quantifier {
                    if let Some(parent) = open_groups.last_mut() {
                        *parent = true;
                    }
                }
                just_closed = Some(had_quantifier);
            }
            '+' | '*' | '{' => {
                if just_closed == Some(true) {
                    return false;
                }
                if let Some(top) = open_groups.last_mut() {
                    *top = true;
                }
                just_closed = None;
            }
            '?' => {
                // '(' then '?' opens a group modifier, not a quantifier
                if prev != Some('(') {
                    if just_closed == Some(true) {
                        return false;
                    }
                    if let Some(top) = open_groups.last_mut() {
                        *top = true;
                    }
                }
                just_closed = None;
            }
            _ => {
                just_closed = None;
            }
        }
        prev = Some(c);
    }

    true
}

/// Evaluate a guarded regex match.
///
/// Options map onto [`RegexBuilder`] flags: `i`, `m`, `s`, `x`.
/// Unsafe patterns and compile failures both come back false rather
/// than erroring the whole query.
pub fn safe_match(pattern: &str, options: &str, text: &str) -> bool {
    if !is_safe_pattern(pattern) {
        tracing::warn!(pattern, "rejected unsafe regex pattern");
        return false;
    }

    let mut builder = RegexBuilder::new(pattern);
    for flag in options.chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'x' => {
                builder.ignore_whitespace(true);
            }
            _ => {}
        }
    }

    match builder.build() {
        Ok(re) => re.is_match(text),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "regex failed to compile");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_ordinary_patterns() {
        assert!(is_safe_pattern("^[a-z]+$"));
        assert!(is_safe_pattern("hello world"));
        assert!(is_safe_pattern("^(foo|bar)$"));
        assert!(is_safe_pattern(r"\d{3}-\d{4}"));
        assert!(is_safe_pattern("(?:abc)+"));
    }

    #[test]
    fn test_rejects_nested_quantifiers() {
        assert!(!is_safe_pattern("(a+)+"));
        assert!(!is_safe_pattern("(a*)*"));
        assert!(!is_safe_pattern("(a+)*"));
        assert!(!is_safe_pattern("(x{2,})+"));
        assert!(!is_safe_pattern("((a+)b)+"));
        assert!(!is_safe_pattern("(a?)+"));
    }

    #[test]
    fn test_quantifier_after_plain_group_is_fine() {
        assert!(is_safe_pattern("(abc)+"));
        assert!(is_safe_pattern("(abc)*def"));
        assert!(is_safe_pattern("(a|b)?c"));
    }

    #[test]
    fn test_rejects_oversized_patterns() {
        let long = "a".repeat(MAX_PATTERN_LENGTH + 1);
        assert!(!is_safe_pattern(&long));
        let at_limit = "a".repeat(MAX_PATTERN_LENGTH);
        assert!(is_safe_pattern(&at_limit));
    }

    #[test]
    fn test_rejects_too_many_capturing_groups() {
        let many = "(a)".repeat(MAX_CAPTURING_GROUPS + 1);
        assert!(!is_safe_pattern(&many));
        let enough = "(a)".repeat(MAX_CAPTURING_GROUPS);
        assert!(is_safe_pattern(&enough));
        // Non-capturing groups don't count
        let non_capturing = "(?:a)".repeat(MAX_CAPTURING_GROUPS + 5);
        assert!(is_safe_pattern(&non_capturing));
    }

    #[test]
    fn test_escaped_and_class_metachars_ignored() {
        assert!(is_safe_pattern(r"\(a\+\)\+"));
        assert!(is_safe_pattern("[(+*)]+"));
    }

    #[test]
    fn test_safe_match_basic() {
        assert!(safe_match("^task-", "", "task-42"));
        assert!(!safe_match("^task-", "", "note-42"));
    }

    #[test]
    fn test_safe_match_flags() {
        assert!(safe_match("^HELLO", "i", "hello there"));
        assert!(!safe_match("^HELLO", "", "hello there"));
        assert!(safe_match("^line2$", "m", "line1\nline2"));
        assert!(safe_match("a.b", "s", "a\nb"));
    }

    #[test]
    fn test_safe_match_fails_closed() {
        // Unsafe pattern
        assert!(!safe_match("(a+)+", "", "aaaa"));
        // Invalid pattern
        assert!(!safe_match("([unclosed", "", "anything"));
    }
}
