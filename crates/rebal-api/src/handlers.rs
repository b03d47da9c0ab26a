use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use rebal_domain::RebalanceConfig;
use rebal_engine::{RebalanceDeps, RebalanceRequest, RebalanceResult};
use rebal_policy::PolicyKind;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn ready(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.store.read_instance_configs().await?;
    Ok(StatusCode::OK)
}

// ── Rebalance ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RebalanceBody {
    pub config: RebalanceConfig,
    #[serde(default)]
    pub is_realtime_table: bool,
    #[serde(default)]
    pub sorted_tiers: Vec<String>,
}

fn policy_kind(body: &RebalanceBody) -> PolicyKind {
    if !body.is_realtime_table {
        PolicyKind::Offline
    } else if body.config.strict_replica_group {
        PolicyKind::StrictRealtime
    } else {
        PolicyKind::Realtime
    }
}

pub async fn post_rebalance(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(body): Json<RebalanceBody>,
) -> Json<RebalanceResult> {
    let kind = policy_kind(&body);
    let req = RebalanceRequest {
        table,
        config: body.config,
        is_realtime_table: body.is_realtime_table,
        sorted_tiers: body.sorted_tiers,
    };
    let deps = RebalanceDeps {
        store: state.store.clone(),
        policy: state.policy_for(kind),
        ip_driver: state.ip_driver.clone(),
        partition_oracle: state.partition_oracle.clone(),
        force_commit: state.force_commit.clone(),
        observer: Arc::new(rebal_engine::NoopObserver),
    };
    Json(rebal_engine::run(req, deps).await)
}

// ── Ideal state ───────────────────────────────────────────────────────────────

pub async fn get_ideal_state(
    State(state): State<AppState>,
    Path(table): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (doc, version) = state.store.read_ideal_state(&table).await?;
    Ok(Json(serde_json::json!({
        "placement": doc.placement,
        "num_replicas": doc.num_replicas,
        "num_partitions": doc.num_partitions,
        "enabled": doc.enabled,
        "version": version,
    })))
}
