//! Dotted-path key algebra
//!
//! A key is a non-empty string of segments joined by a configured separator
//! (default `.`). This module provides the pure, stateless decomposition and
//! composition operations every engine uses to reason about parent/child
//! relationships without touching storage.
//!
//! ## Contract
//!
//! - Keys must be valid UTF-8 (guaranteed by Rust's `&str`).
//! - Keys must not be empty.
//! - A segment (the text between two separators, or before the first/after
//!   the last) must not be empty.
//!
//! Operations on an already-validated key never fail; [`validate_key`] is
//! the single gate callers run before anything else touches it.

use thiserror::Error;

/// Default path separator, matching [`crate::options::Options::default`].
pub const DEFAULT_SEPARATOR: &str = ".";

/// Key validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// Key is empty.
    #[error("key cannot be empty")]
    Empty,
    /// Key has an empty segment, e.g. a leading, trailing, or doubled separator.
    #[error("key '{0}' has an empty segment")]
    EmptySegment(String),
}

impl KeyError {
    /// Stable string tag for logging and wire responses.
    pub fn reason_code(&self) -> &'static str {
        match self {
            KeyError::Empty => "empty_key",
            KeyError::EmptySegment(_) => "empty_segment",
        }
    }
}

/// Validate a key against the given separator.
///
/// # Examples
///
/// ```
/// use stratakv_core::key::validate_key;
///
/// assert!(validate_key("group.g.child1", ".").is_ok());
/// assert!(validate_key("", ".").is_err());
/// assert!(validate_key("group..child", ".").is_err());
/// assert!(validate_key(".group", ".").is_err());
/// ```
pub fn validate_key(key: &str, separator: &str) -> Result<(), KeyError> {
    if key.is_empty() {
        return Err(KeyError::Empty);
    }
    if key.split(separator).any(str::is_empty) {
        return Err(KeyError::EmptySegment(key.to_string()));
    }
    Ok(())
}

/// The prefix of `key` up to (not including) the last separator.
///
/// Returns the empty string if `key` contains no separator.
///
/// ```
/// use stratakv_core::key::parent;
///
/// assert_eq!(parent("group.g.child1", "."), "group.g");
/// assert_eq!(parent("group", "."), "");
/// ```
pub fn parent(key: &str, separator: &str) -> String {
    match key.rfind(separator) {
        Some(idx) => key[..idx].to_string(),
        None => String::new(),
    }
}

/// The segment immediately before the last separator, i.e. the bare name of
/// the parent, not its full path.
///
/// ```
/// use stratakv_core::key::parent_bare;
///
/// assert_eq!(parent_bare("group.g.child1", "."), "g");
/// assert_eq!(parent_bare("group", "."), "");
/// ```
pub fn parent_bare(key: &str, separator: &str) -> String {
    let segments: Vec<&str> = key.split(separator).collect();
    if segments.len() > 1 {
        segments[segments.len() - 2].to_string()
    } else {
        String::new()
    }
}

/// The final segment of `key`; `key` itself when there is no separator.
///
/// ```
/// use stratakv_core::key::bare;
///
/// assert_eq!(bare("group.g.child1", "."), "child1");
/// assert_eq!(bare("group", "."), "group");
/// ```
pub fn bare(key: &str, separator: &str) -> String {
    match key.rfind(separator) {
        Some(idx) => key[idx + separator.len()..].to_string(),
        None => key.to_string(),
    }
}

/// True iff `key` contains no separator (depth 1).
///
/// ```
/// use stratakv_core::key::is_bare;
///
/// assert!(is_bare("group", "."));
/// assert!(!is_bare("group.g", "."));
/// ```
pub fn is_bare(key: &str, separator: &str) -> bool {
    !key.contains(separator)
}

/// Compose a bare segment and a parent path back into a full key.
///
/// `parent` empty yields `bare` unchanged; this is the inverse of
/// [`parent`]/[`bare`] applied together.
///
/// ```
/// use stratakv_core::key::compose;
///
/// assert_eq!(compose("child1", "group.g", "."), "group.g.child1");
/// assert_eq!(compose("group", "", "."), "group");
/// ```
pub fn compose(bare: &str, parent: &str, separator: &str) -> String {
    if parent.is_empty() {
        bare.to_string()
    } else {
        [parent, bare].join(separator)
    }
}

/// 1 + the number of separators in `key`.
///
/// ```
/// use stratakv_core::key::depth;
///
/// assert_eq!(depth("group", "."), 1);
/// assert_eq!(depth("group.g.child1", "."), 3);
/// ```
pub fn depth(key: &str, separator: &str) -> usize {
    1 + key.matches(separator).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_of_bare_key_is_empty() {
        assert_eq!(parent("group", "."), "");
    }

    #[test]
    fn parent_is_prefix_up_to_last_separator() {
        assert_eq!(parent("group.g.child3.grandchild1", "."), "group.g.child3");
    }

    #[test]
    fn parent_bare_is_second_to_last_segment() {
        assert_eq!(parent_bare("group.g.child3.grandchild1", "."), "child3");
        assert_eq!(parent_bare("group.g", "."), "group");
        assert_eq!(parent_bare("group", "."), "");
    }

    #[test]
    fn bare_is_last_segment() {
        assert_eq!(bare("group.g.child1", "."), "child1");
        assert_eq!(bare("group", "."), "group");
    }

    #[test]
    fn is_bare_detects_absence_of_separator() {
        assert!(is_bare("group", "."));
        assert!(!is_bare("group.g", "."));
    }

    #[test]
    fn compose_round_trips_with_parent_and_bare() {
        let key = "group.g.child3.grandchild1";
        let p = parent(key, ".");
        let b = bare(key, ".");
        assert_eq!(compose(&b, &p, "."), key);
    }

    #[test]
    fn compose_with_empty_parent_yields_bare() {
        assert_eq!(compose("group", "", "."), "group");
    }

    #[test]
    fn depth_counts_segments() {
        assert_eq!(depth("group", "."), 1);
        assert_eq!(depth("group.g", "."), 2);
        assert_eq!(depth("group.g.child3.grandchild1", "."), 4);
    }

    #[test]
    fn validate_rejects_empty_and_ragged_keys() {
        assert!(validate_key("", ".").is_err());
        assert!(validate_key(".", ".").is_err());
        assert!(validate_key("a..b", ".").is_err());
        assert!(validate_key(".a", ".").is_err());
        assert!(validate_key("a.", ".").is_err());
        assert!(validate_key("group.g.child1", ".").is_ok());
    }

    #[test]
    fn custom_separator() {
        assert_eq!(parent("group/g/child1", "/"), "group/g");
        assert_eq!(bare("group/g/child1", "/"), "child1");
        assert_eq!(compose("child1", "group/g", "/"), "group/g/child1");
    }

    #[test]
    fn reason_codes() {
        assert_eq!(KeyError::Empty.reason_code(), "empty_key");
        assert_eq!(
            KeyError::EmptySegment("a..b".to_string()).reason_code(),
            "empty_segment"
        );
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// A segment: non-empty, no dots, no slashes (the two separators these
    /// tests exercise).
    fn segment() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9_]{1,8}".prop_filter("non-empty", |s| !s.is_empty())
    }

    fn dotted_key() -> impl Strategy<Value = String> {
        proptest::collection::vec(segment(), 1..6).prop_map(|segs| segs.join("."))
    }

    proptest! {
        /// Round-trip: for every validly-formed key, composing its own
        /// parent and bare segment back together yields the original key
        /// (§8, "Round-trip"-adjacent algebraic property).
        #[test]
        fn compose_inverts_parent_and_bare(key in dotted_key()) {
            let p = parent(&key, ".");
            let b = bare(&key, ".");
            prop_assert_eq!(compose(&b, &p, "."), key);
        }

        /// `depth` always agrees with the number of segments `bare`/`parent`
        /// decomposition implies: one more separator means one deeper.
        #[test]
        fn depth_matches_segment_count(key in dotted_key()) {
            let expected = key.split('.').count();
            prop_assert_eq!(depth(&key, "."), expected);
        }

        /// A key that validates never has an empty bare or parent-bare
        /// segment.
        #[test]
        fn validated_keys_have_no_empty_segments(key in dotted_key()) {
            prop_assert!(validate_key(&key, ".").is_ok());
            prop_assert!(!bare(&key, ".").is_empty());
        }

        /// A custom separator behaves identically to `.` up to substitution:
        /// swapping the separator character never changes depth.
        #[test]
        fn custom_separator_preserves_depth(key in dotted_key()) {
            let alt = key.replace('.', "/");
            prop_assert_eq!(depth(&key, "."), depth(&alt, "/"));
        }
    }
}
