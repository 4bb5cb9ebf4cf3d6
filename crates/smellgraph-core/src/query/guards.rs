//! Shared guardrails for query bounds and traversal limits.

/// Upper bound on cycles reported by one `find_circular_dependencies` call.
pub const MAX_REPORTED_CYCLES: usize = 1000;
/// Cycles longer than this are not enumerated.
pub const MAX_CYCLE_LENGTH: usize = 64;
/// Upper bound on rows returned by ranking queries.
pub const MAX_RANKED_RESULTS: i64 = 500;
pub const MAX_PATTERN_LENGTH: usize = 256;

pub fn clamp_int(value: i64, minimum: i64, maximum: i64) -> i64 {
    value.max(minimum).min(maximum)
}

pub fn clamp_limit(value: i64, maximum: i64) -> i64 {
    clamp_int(value, 1, maximum)
}

/// Trimmed pattern cut to [`MAX_PATTERN_LENGTH`] on a char boundary.
pub fn truncate_pattern(pattern: &str) -> String {
    let stripped = pattern.trim();
    if stripped.len() <= MAX_PATTERN_LENGTH {
        return stripped.to_string();
    }
    let mut end = MAX_PATTERN_LENGTH;
    while !stripped.is_char_boundary(end) {
        end -= 1;
    }
    stripped[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_and_truncation() {
        assert_eq!(clamp_limit(0, 10), 1);
        assert_eq!(clamp_limit(50, 10), 10);
        assert_eq!(truncate_pattern("  domain/ "), "domain/");
        let long = "é".repeat(MAX_PATTERN_LENGTH);
        assert!(truncate_pattern(&long).len() <= MAX_PATTERN_LENGTH);
    }
}
