//! Wall-clock helpers.
//!
//! All persisted timestamps are plain unix seconds so snapshots stay
//! readable and comparable across processes.

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current unix timestamp in whole seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_now_is_recent() {
        // 2020-01-01 as a floor; the clock may be skewed but not that far.
        assert!(unix_now() > 1_577_836_800);
    }
}
