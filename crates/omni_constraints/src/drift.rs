use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use tracing::warn;
use crate::snapshot::read_json;

/// Snapshot keys that must not change across an install step.
pub const PROTECTED_KEYS: [&str; 4] = ["torch_version_cuda", "torch_file", "cv2_file", "protected_freeze"];

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DriftReport {
    pub protected_env_ok: bool,
    /// Number of differing keys, `-1` when a snapshot could not be read.
    pub protected_diff_count: i64,
}

pub fn count_differences(pre: &Value, post: &Value) -> i64 {
    PROTECTED_KEYS
        .iter()
        .filter(|key| pre.get(**key) != post.get(**key))
        .count() as i64
}

pub fn compare_snapshots(pre: &Path, post: &Path) -> DriftReport {
    let (pre, post) = match (read_json(pre), read_json(post)) {
        (Ok(pre), Ok(post)) => (pre, post),
        (pre, post) => {
            for err in [pre.err(), post.err()].into_iter().flatten() {
                warn!("snapshot unreadable: {}", err);
            }
            return DriftReport { protected_env_ok: false, protected_diff_count: -1 };
        }
    };
    let diff = count_differences(&pre, &post);
    DriftReport { protected_env_ok: diff == 0, protected_diff_count: diff }
}
