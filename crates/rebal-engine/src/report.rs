use serde::{Deserialize, Serialize};

use rebal_domain::{PlacementMap, RebalanceConfig, TerminalStatus};

use crate::summary::RebalanceSummary;

/// Everything the driver state machine (§4.7) needs beyond what it reads
/// from the store mid-run: which table, under what config, and the two
/// facts about the table that the pluggable assignment policy alone can't
/// tell the driver (whether it's a realtime table, and its tiers).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceRequest {
    pub table: String,
    pub config: RebalanceConfig,
    pub is_realtime_table: bool,
    pub sorted_tiers: Vec<String>,
}

/// `RebalanceResult` — §6 "Terminal statuses surfaced to the caller" plus
/// whatever the run actually computed, for callers (CLI/HTTP glue, outside
/// this crate's scope) to render.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceResult {
    pub status: TerminalStatus,
    pub message: String,
    pub target: Option<PlacementMap>,
    pub summary: Option<RebalanceSummary>,
    pub steps_taken: u32,
}

impl RebalanceResult {
    pub fn terminal(status: TerminalStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            target: None,
            summary: None,
            steps_taken: 0,
        }
    }
}
