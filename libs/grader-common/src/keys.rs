//! Redis key schema - defines only semantics, not runtime logic.
//! Keeps the server and the admin CLI from drifting apart and makes
//! every key deterministic.

pub const CHALLENGE_PREFIX: &str = "grader:challenge";
pub const ORDER_KEY: &str = "grader:challenges:order";
pub const SUBMISSIONS_PREFIX: &str = "grader:submissions";
pub const LEADERBOARD_PREFIX: &str = "grader:leaderboard";

/// Record key for one challenge.
pub fn challenge_key(id: &str) -> String {
    format!("{}:{}", CHALLENGE_PREFIX, id)
}

/// Scan pattern matching every challenge record.
pub fn challenge_pattern() -> String {
    format!("{}:*", CHALLENGE_PREFIX)
}

/// Append-only submission log for one participant on one challenge.
pub fn submissions_key(challenge_id: &str, participant: &str) -> String {
    format!("{}:{}:{}", SUBMISSIONS_PREFIX, challenge_id, participant)
}

/// Sorted set of first-pass timestamps for one challenge.
pub fn leaderboard_key(challenge_id: &str) -> String {
    format!("{}:{}", LEADERBOARD_PREFIX, challenge_id)
}

/// Extract the challenge id back out of a scanned record key.
pub fn id_from_challenge_key(key: &str) -> Option<&str> {
    key.strip_prefix(CHALLENGE_PREFIX)?.strip_prefix(':')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_key_deterministic() {
        assert_eq!(challenge_key("sum-two"), "grader:challenge:sum-two");
        assert_eq!(challenge_key("sum-two"), challenge_key("sum-two"));
    }

    #[test]
    fn test_submissions_key_format() {
        let key = submissions_key("sum-two", "ab123");
        assert_eq!(key, "grader:submissions:sum-two:ab123");
    }

    #[test]
    fn test_leaderboard_key_format() {
        assert!(leaderboard_key("sum-two").starts_with("grader:leaderboard:"));
    }

    #[test]
    fn test_id_roundtrip() {
        let key = challenge_key("wk3-fizzbuzz");
        assert_eq!(id_from_challenge_key(&key), Some("wk3-fizzbuzz"));
        assert_eq!(id_from_challenge_key("other:key"), None);
    }
}
