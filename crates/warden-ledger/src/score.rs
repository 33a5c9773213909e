//! This process's score contribution for a user.

use warden_core::config::ScoreWeights;

use crate::record::ModerationRecord;

/// Computes the contribution this process publishes for a user.
///
/// Each ban, kick, and outstanding warning contributes its configured
/// weight. Groups the user left or was forgiven in no longer appear in
/// the record and therefore stop contributing.
pub fn recompute(record: &ModerationRecord, weights: &ScoreWeights) -> f64 {
    record.banned.len() as f64 * weights.ban
        + record.kicked.len() as f64 * weights.kick
        + f64::from(record.total_warnings()) * weights.warn
}
