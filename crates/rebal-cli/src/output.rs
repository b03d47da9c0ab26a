use rebal_domain::TerminalStatus;
use rebal_engine::{RebalanceResult, RebalanceSummary};

/// Render a `RebalanceResult` as a short human-readable report.
pub fn render_result(result: &RebalanceResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("status: {}\n", result.status));
    if !result.message.is_empty() {
        out.push_str(&format!("message: {}\n", result.message));
    }
    out.push_str(&format!("steps taken: {}\n", result.steps_taken));

    if let Some(summary) = &result.summary {
        out.push_str(&render_summary(summary));
    }

    if matches!(result.status, TerminalStatus::DryRun) {
        if let Some(target) = &result.target {
            out.push_str(&format!("segments in target: {}\n", target.len()));
        }
    }
    out
}

/// Render a `RebalanceSummary` as per-server deltas and tag rollups.
pub fn render_summary(summary: &RebalanceSummary) -> String {
    let mut out = String::new();
    out.push_str("per-server deltas:\n");

    let mut servers: Vec<_> = summary.per_server.keys().collect();
    servers.sort();
    for instance in servers {
        let delta = &summary.per_server[instance];
        out.push_str(&format!(
            "  {instance}: +{added} -{removed} ={unchanged} ({new} new)\n",
            instance = instance,
            added = delta.added,
            removed = delta.removed,
            unchanged = delta.unchanged,
            new = delta.new_segments,
        ));
    }

    if !summary.tag_breakdown.is_empty() {
        out.push_str("tag gains:\n");
        let mut tags: Vec<_> = summary.tag_breakdown.keys().collect();
        tags.sort();
        for tag in tags {
            out.push_str(&format!("  {tag}: +{}\n", summary.tag_breakdown[tag]));
        }
    }

    out.push_str(&format!(
        "replication factor: {} -> {}\n",
        summary.replication_factor_before, summary.replication_factor_after
    ));

    out.push_str(&format!(
        "estimated bytes moved: {}\n",
        if summary.estimated_bytes_moved < 0 {
            "unknown".to_string()
        } else {
            summary.estimated_bytes_moved.to_string()
        }
    ));

    if !summary.top_consuming_segments.is_empty() {
        out.push_str("consuming segments under the most lag:\n");
        for info in &summary.top_consuming_segments {
            out.push_str(&format!(
                "  {} (age_ms={}, offset_lag={})\n",
                info.segment, info.age_ms, info.offset_lag
            ));
        }
    }

    out
}
