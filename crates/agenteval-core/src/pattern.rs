//! Fixture name filtering for `--only`.

/// True if `name` contains any of `patterns`, ignoring case.
///
/// An empty pattern list matches nothing; callers only filter when
/// patterns were given.
pub fn matches_any_pattern(name: &str, patterns: &[String]) -> bool {
    let name = name.to_lowercase();
    patterns
        .iter()
        .any(|pattern| name.contains(&pattern.to_lowercase()))
}
