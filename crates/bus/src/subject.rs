//! Subject pattern matching
//!
//! Subjects are dot-separated token lists. A pattern token `*` matches
//! exactly one subject token; a trailing `>` matches one or more remaining
//! tokens.

/// Check whether `subject` matches `pattern`
///
/// # Example
///
/// ```
/// use gravity_bus::subject_matches;
///
/// assert!(subject_matches("$GVT.default.EVENT.>", "$GVT.default.EVENT.dataCreated"));
/// assert!(subject_matches("$GVT.*.EVENT.*", "$GVT.default.EVENT.dataCreated"));
/// assert!(!subject_matches("$GVT.default.EVENT.>", "$GVT.default.EVENT"));
/// ```
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => continue,
            (Some(p), Some(s)) if p == s => continue,
            (Some(_), Some(_)) => return false,
            (None, None) => return true,
            // Pattern exhausted before subject, or subject too short
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(subject_matches("a.b.c", "a.b.c"));
        assert!(!subject_matches("a.b.c", "a.b.d"));
        assert!(!subject_matches("a.b.c", "a.b"));
        assert!(!subject_matches("a.b", "a.b.c"));
    }

    #[test]
    fn test_single_token_wildcard() {
        assert!(subject_matches("a.*.c", "a.b.c"));
        assert!(subject_matches("a.*.c", "a.x.c"));
        assert!(!subject_matches("a.*.c", "a.b.c.d"));
        assert!(!subject_matches("a.*", "a"));
    }

    #[test]
    fn test_tail_wildcard() {
        assert!(subject_matches("a.>", "a.b"));
        assert!(subject_matches("a.>", "a.b.c.d"));
        assert!(!subject_matches("a.>", "a"));
        assert!(!subject_matches("a.>", "b.c"));
    }

    #[test]
    fn test_event_subjects() {
        assert!(subject_matches(
            "$GVT.default.EVENT.>",
            "$GVT.default.EVENT.dataCreated"
        ));
        assert!(subject_matches(
            "$GVT.default.DP.orders.*.EVENT.>",
            "$GVT.default.DP.orders.42.EVENT.dataCreated"
        ));
        assert!(!subject_matches(
            "$GVT.default.DP.orders.*.EVENT.>",
            "$GVT.default.DP.users.42.EVENT.dataCreated"
        ));
    }
}
