use super::resource::Resource;
use serde::{Deserialize, Serialize};

/// Classification of a single reported RPC outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnStatus {
    Success,
    Fail,
    Unknown,
}

/// `ResourceStat` is a single sample reported against a resource: the
/// classification, the raw return code and delay the caller observed, and
/// the wall-clock time (millis) it happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceStat {
    pub resource: Resource,
    pub status: ReturnStatus,
    pub return_code: i64,
    pub delay_ms: u64,
    pub timestamp_ms: u64,
}

impl ResourceStat {
    pub fn new(resource: Resource, status: ReturnStatus, return_code: i64, delay_ms: u64) -> Self {
        ResourceStat {
            resource,
            status,
            return_code,
            delay_ms,
            timestamp_ms: crate::utils::curr_time_millis(),
        }
    }
}
