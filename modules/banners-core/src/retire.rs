//! The retention computation, shared by every backend.

use crate::store::EventRef;

/// Given a topic's refs in ascending timestamp order, the prefix to delete
/// so that exactly the newest `keep_count` remain. Negative `keep_count`
/// disables retention; a count covering the whole sequence deletes nothing.
pub fn compute_retire_set(ordered: &[EventRef], keep_count: i64) -> &[EventRef] {
    if keep_count < 0 {
        return &[];
    }
    let keep = keep_count as usize;
    if keep >= ordered.len() {
        return &[];
    }
    &ordered[..ordered.len() - keep]
}
