use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use rebal_domain::{
    DomainError, ExternalView, InstanceConfig, InstancePartitionsCategory, PlacementMap,
    RebalanceContext, SegmentId, SegmentState, TerminalStatus,
};
use rebal_driver::{BatchConfig, ForceCommitCoordinator};
use rebal_planner::{plan_next_step, remaining_replicas, CachingPartitionIdOracle, PartitionIdOracle, PlanStepInput};
use rebal_policy::AssignmentPolicy;
use rebal_store::{CasOutcome, PlacementStore};

use crate::error::RebalanceError;
use crate::instance_partitions::{resolve_category, InstancePartitionsDriver};
use crate::observer::{RebalanceObserver, TriggerKind};
use crate::report::{RebalanceRequest, RebalanceResult};

/// Everything the driver needs beyond a [`RebalanceRequest`]: the pluggable
/// collaborators an external caller supplies, bundled to avoid
/// a five-plus-argument `run()` signature.
pub struct RebalanceDeps {
    pub store: Arc<dyn PlacementStore>,
    pub policy: Arc<dyn AssignmentPolicy>,
    pub ip_driver: Arc<dyn InstancePartitionsDriver>,
    pub partition_oracle: Arc<dyn PartitionIdOracle + Send + Sync>,
    pub force_commit: Option<Arc<ForceCommitCoordinator>>,
    pub observer: Arc<dyn RebalanceObserver>,
}

/// Which `InstancePartitionsCategory` values this run needs to resolve, and
/// whether each is currently applicable. Offline tables only ever use
/// `Offline`; realtime tables use `Consuming`+`Completed` (`Consuming` only
/// when `include_consuming` is set — otherwise that category is torn down).
fn applicable_categories(is_realtime_table: bool, include_consuming: bool) -> Vec<(InstancePartitionsCategory, bool)> {
    if is_realtime_table {
        vec![
            (InstancePartitionsCategory::Consuming, include_consuming),
            (InstancePartitionsCategory::Completed, true),
        ]
    } else {
        vec![(InstancePartitionsCategory::Offline, true)]
    }
}

/// Segments whose instance-state map differs between `a` and `b` — used
/// both to seed the initial monitored set and to detect (§4.7 step 2)
/// whether a still-moving segment's IS entry changed underneath the driver.
fn changed_segments(a: &PlacementMap, b: &PlacementMap) -> HashSet<SegmentId> {
    let mut out = HashSet::new();
    for segment in a.keys().chain(b.keys()) {
        if a.get(segment) != b.get(segment) {
            out.insert(segment.clone());
        }
    }
    out
}

/// §4.7 Rebalance Driver — top-level state machine. Never returns `Err`:
/// every fatal path is folded into a `Failed` [`RebalanceResult`] and
/// `deps.observer.on_error` is called exactly once.
pub async fn run(req: RebalanceRequest, deps: RebalanceDeps) -> RebalanceResult {
    match try_run(&req, &deps).await {
        Ok(result) => result,
        Err(err) => {
            let message = err.to_string();
            deps.observer.on_error(&message);
            RebalanceResult::terminal(TerminalStatus::Failed, message)
        }
    }
}

async fn try_run(req: &RebalanceRequest, deps: &RebalanceDeps) -> Result<RebalanceResult, RebalanceError> {
    let ctx = RebalanceContext::new(req.table.clone(), req.config.clone());
    let cfg = &req.config;

    // ---- Init: validate before any side effect (§4.7, §7 InvalidConfig) ----
    if cfg.pre_checks && !cfg.dry_run {
        return Err(DomainError::InvalidConfig("preChecks requires dryRun".into()).into());
    }
    if cfg.batch_size_per_server == 0 {
        return Err(DomainError::InvalidConfig("batchSizePerServer must not be 0".into()).into());
    }
    if cfg.force_commit && !req.is_realtime_table {
        // Open design question: this implementation raises InvalidConfig
        // rather than warn-and-disable. See DESIGN.md.
        return Err(DomainError::InvalidConfig(
            "forceCommit requires a realtime table".into(),
        )
        .into());
    }

    deps.observer.on_trigger(
        TriggerKind::Start,
        &PlacementMap::new(),
        &PlacementMap::new(),
        &ctx,
    );

    // ---- Plan ----
    let mut instance_configs_cache: Option<Vec<InstanceConfig>> = None;
    let (partitions_by_category, tier_partitions, any_ip_changed) =
        resolve_all_instance_partitions(req, deps, &mut instance_configs_cache).await?;

    let (is_doc, mut version) = deps.store.read_ideal_state(&req.table).await?;
    if !is_doc.enabled && !cfg.downtime {
        return Err(DomainError::DisabledTable(req.table.clone()).into());
    }

    let resolved_min_available = cfg.min_available_replicas(is_doc.num_replicas);
    if resolved_min_available >= is_doc.num_replicas {
        return Err(DomainError::InvalidConfig(format!(
            "minAvailableReplicas ({resolved_min_available}) must be less than replicas ({})",
            is_doc.num_replicas
        ))
        .into());
    }

    let mut current = is_doc.placement.clone();
    let sorted_tiers = req.sorted_tiers.clone();
    let mut target = deps.policy.rebalance(
        &current,
        &partitions_by_category,
        &sorted_tiers,
        &tier_partitions,
        cfg,
    )?;

    if target == current && !any_ip_changed {
        deps.observer.on_noop("current placement already matches target");
        return Ok(RebalanceResult {
            status: TerminalStatus::NoOp,
            message: "placement and instance partitions unchanged".into(),
            target: Some(target),
            summary: None,
            steps_taken: 0,
        });
    }

    if cfg.dry_run {
        // Empty segmentsToMove with changed instance partitions still yields
        // Done (not NoOp) — this branch only returns NoOp
        // above when *nothing at all* changed.
        deps.observer.on_success("dry run complete");
        return Ok(RebalanceResult {
            status: TerminalStatus::DryRun,
            message: "dry run: no changes applied".into(),
            target: Some(target),
            summary: None,
            steps_taken: 0,
        });
    }

    // ---- Downtime path ----
    if cfg.downtime || !is_doc.enabled {
        if cfg.force_commit {
            let moving_consuming = consuming_moves(&current, &target);
            if !moving_consuming.is_empty() {
                force_commit_segments(deps, &req.table, &ctx, &moving_consuming, cfg).await?;
            }
        }
        if deps.observer.is_stopped() {
            return Ok(RebalanceResult::terminal(
                deps.observer.stop_status(),
                "stopped before downtime IS write",
            ));
        }
        match deps
            .store
            .cas_update_ideal_state(&req.table, target.clone(), version)
            .await?
        {
            CasOutcome::Committed { .. } => {
                deps.observer.on_success("downtime rebalance complete");
                Ok(RebalanceResult {
                    status: TerminalStatus::Done,
                    message: "single-step downtime replacement committed".into(),
                    target: Some(target),
                    summary: None,
                    steps_taken: 1,
                })
            }
            CasOutcome::VersionMismatch { .. } => {
                Err(RebalanceError::Internal(
                    "concurrent IdealState mutation during downtime replacement".into(),
                ))
            }
        }
    } else {
        run_no_downtime_loop(req, deps, &ctx, &mut current, &mut target, &mut version, resolved_min_available)
            .await
    }
}

async fn resolve_all_instance_partitions(
    req: &RebalanceRequest,
    deps: &RebalanceDeps,
    instance_configs_cache: &mut Option<Vec<InstanceConfig>>,
) -> Result<
    (
        HashMap<InstancePartitionsCategory, rebal_domain::InstancePartitions>,
        HashMap<String, rebal_domain::InstancePartitions>,
        bool,
    ),
    RebalanceError,
> {
    let mut by_category = HashMap::new();
    let mut tier_partitions = HashMap::new();
    let mut any_changed = false;

    for (category, applicable) in applicable_categories(req.is_realtime_table, req.config.include_consuming) {
        if let Some(resolution) = resolve_category(
            deps.store.as_ref(),
            &req.table,
            &category,
            applicable,
            req.config.reassign_instances,
            req.config.bootstrap,
            req.config.dry_run,
            deps.ip_driver.as_ref(),
            instance_configs_cache,
        )
        .await?
        {
            if !resolution.unchanged {
                any_changed = true;
            }
            by_category.insert(category, resolution.partitions);
        } else {
            any_changed = true;
        }
    }

    for tier in &req.sorted_tiers {
        let category = InstancePartitionsCategory::Tier(tier.clone());
        if let Some(resolution) = resolve_category(
            deps.store.as_ref(),
            &req.table,
            &category,
            true,
            req.config.reassign_instances,
            req.config.bootstrap,
            req.config.dry_run,
            deps.ip_driver.as_ref(),
            instance_configs_cache,
        )
        .await?
        {
            if !resolution.unchanged {
                any_changed = true;
            }
            tier_partitions.insert(tier.clone(), resolution.partitions);
        }
    }

    Ok((by_category, tier_partitions, any_changed))
}

/// Segments whose *target* places any instance in `CONSUMING` and whose
/// current placement does not already have that instance consuming — the
/// set that needs a force-commit before the tail can be relocated (§4.6).
fn consuming_moves(current: &PlacementMap, target: &PlacementMap) -> Vec<SegmentId> {
    target
        .iter()
        .filter(|(segment, target_states)| {
            target_states.values().any(|s| *s == SegmentState::Consuming)
                && current.get(*segment) != Some(*target_states)
        })
        .map(|(segment, _)| segment.clone())
        .collect()
}

async fn force_commit_segments(
    deps: &RebalanceDeps,
    table: &str,
    ctx: &RebalanceContext,
    segments: &[SegmentId],
    cfg: &rebal_domain::RebalanceConfig,
) -> Result<(), RebalanceError> {
    let Some(coordinator) = &deps.force_commit else {
        return Ok(());
    };
    deps.observer
        .on_trigger(TriggerKind::ForceCommitStart, &PlacementMap::new(), &PlacementMap::new(), ctx);
    let batch = BatchConfig {
        batch_size: cfg.force_commit_batch_size,
        check_interval_ms: cfg.force_commit_batch_status_check_interval_ms,
        check_timeout_ms: cfg.force_commit_batch_status_check_timeout_ms,
    };
    let result = coordinator.commit_and_wait(table, segments, &batch).await;
    deps.observer
        .on_trigger(TriggerKind::ForceCommitEnd, &PlacementMap::new(), &PlacementMap::new(), ctx);
    result.map(|_| ()).map_err(RebalanceError::from)
}

#[allow(clippy::too_many_arguments)]
async fn run_no_downtime_loop(
    req: &RebalanceRequest,
    deps: &RebalanceDeps,
    ctx: &RebalanceContext,
    current: &mut PlacementMap,
    target: &mut PlacementMap,
    version: &mut u64,
    min_available_replicas: u32,
) -> Result<RebalanceResult, RebalanceError> {
    let cfg = &req.config;
    let check_interval = Duration::from_millis(cfg.external_view_check_interval_ms);
    let stabilization_timeout = Duration::from_millis(cfg.external_view_stabilization_timeout_ms);

    let mut monitored: HashSet<SegmentId> = changed_segments(current, target);
    let mut force_commit_consumed = false;
    let mut steps_taken: u32 = 0;

    loop {
        // Step 1: wait for EV to converge on the monitored set.
        wait_for_convergence(
            deps,
            &req.table,
            current,
            &monitored,
            cfg.low_disk_mode,
            cfg.best_effort,
            check_interval,
            stabilization_timeout,
            ctx,
            target,
        )
        .await?;

        if deps.observer.is_stopped() {
            return Ok(RebalanceResult::terminal(
                deps.observer.stop_status(),
                "stopped after external view convergence",
            ));
        }

        // Step 2: re-read IS; re-plan if it moved underneath us.
        let (is_doc, observed_version) = deps.store.read_ideal_state(&req.table).await?;
        if observed_version != *version {
            let ip_changed = changed_segments(current, &is_doc.placement)
                .iter()
                .any(|s| monitored.contains(s));
            *version = observed_version;
            let new_current = is_doc.placement;

            deps.observer
                .on_trigger(TriggerKind::IdealStateChange, &new_current, target, ctx);
            if deps.observer.is_stopped() {
                return Ok(RebalanceResult::terminal(
                    deps.observer.stop_status(),
                    "stopped after IdealState change",
                ));
            }

            if deps.policy.is_strict_realtime() || ip_changed {
                let (partitions_by_category, tier_partitions, _) =
                    resolve_all_instance_partitions(req, deps, &mut None).await?;
                *target = deps.policy.rebalance(
                    &new_current,
                    &partitions_by_category,
                    &req.sorted_tiers,
                    &tier_partitions,
                    cfg,
                )?;
            }
            *current = new_current;
            monitored = changed_segments(current, target);
        }

        // Step 3: force-commit consuming moves once per rebalance.
        if cfg.force_commit && !force_commit_consumed {
            let probe = plan_probe(current, target, min_available_replicas, cfg, deps);
            let moves = consuming_moves(current, &probe);
            if !moves.is_empty() {
                force_commit_segments(deps, &req.table, ctx, &moves, cfg).await?;
                let (is_doc, observed_version) = deps.store.read_ideal_state(&req.table).await?;
                *version = observed_version;
                *current = is_doc.placement;
                let (partitions_by_category, tier_partitions, _) =
                    resolve_all_instance_partitions(req, deps, &mut None).await?;
                *target = deps.policy.rebalance(
                    current,
                    &partitions_by_category,
                    &req.sorted_tiers,
                    &tier_partitions,
                    cfg,
                )?;
                monitored = changed_segments(current, target);
            }
            force_commit_consumed = true;
        }

        // Step 4: converged?
        if current == target {
            deps.observer.on_success("no-downtime rebalance complete");
            return Ok(RebalanceResult {
                status: TerminalStatus::Done,
                message: "current placement matches target".into(),
                target: Some(target.clone()),
                summary: None,
                steps_taken,
            });
        }

        // Step 5: compute the next intermediate placement.
        let next = plan_probe(current, target, min_available_replicas, cfg, deps);
        deps.observer
            .on_trigger(TriggerKind::NextAssignmentCalculation, current, &next, ctx);
        if deps.observer.is_stopped() {
            return Ok(RebalanceResult::terminal(
                deps.observer.stop_status(),
                "stopped after computing next assignment",
            ));
        }

        // Step 6: CAS-write, checkpoint immediately before the write.
        if deps.observer.is_stopped() {
            return Ok(RebalanceResult::terminal(
                deps.observer.stop_status(),
                "stopped before IS write",
            ));
        }
        match deps
            .store
            .cas_update_ideal_state(&req.table, next.clone(), *version)
            .await?
        {
            CasOutcome::Committed { new_version } => {
                *version = new_version;
                let moved_this_step = changed_segments(current, &next);
                *current = next;
                monitored = monitored.union(&moved_this_step).cloned().collect();
                steps_taken += 1;
            }
            CasOutcome::VersionMismatch { .. } => {
                deps.observer.on_rollback();
                // Go back to step 1 without advancing — re-read happens at
                // the top of the next iteration via step 2.
                continue;
            }
        }
    }
}

fn plan_probe(
    current: &PlacementMap,
    target: &PlacementMap,
    min_available_replicas: u32,
    cfg: &rebal_domain::RebalanceConfig,
    deps: &RebalanceDeps,
) -> PlacementMap {
    let caching = CachingPartitionIdOracle::new(deps.partition_oracle.as_ref());
    let input = PlanStepInput {
        current,
        target,
        min_available_replicas,
        strict_replica_group: cfg.strict_replica_group,
        low_disk_mode: cfg.low_disk_mode,
        batch_size_per_server: if cfg.batching_disabled() {
            None
        } else {
            Some(cfg.batch_size_per_server as u32)
        },
        partition_oracle: &caching,
    };
    plan_next_step(&input)
}

#[allow(clippy::too_many_arguments)]
async fn wait_for_convergence(
    deps: &RebalanceDeps,
    table: &str,
    is_snapshot: &PlacementMap,
    monitored: &HashSet<SegmentId>,
    low_disk_mode: bool,
    best_effort: bool,
    check_interval: Duration,
    stabilization_timeout: Duration,
    ctx: &RebalanceContext,
    target_for_trigger: &PlacementMap,
) -> Result<(), RebalanceError> {
    let mut remaining_at_window_start: Option<usize> = None;

    loop {
        let window_start = Instant::now();
        loop {
            let ev = deps
                .store
                .read_external_view(table)
                .await?
                .unwrap_or_else(|| ExternalView(PlacementMap::new()));
            let remaining = remaining_replicas(
                &ev,
                is_snapshot,
                low_disk_mode,
                best_effort,
                Some(monitored),
                false,
            )?;
            deps.observer
                .on_trigger(TriggerKind::EvToIsConvergence, is_snapshot, target_for_trigger, ctx);

            if remaining == 0 {
                return Ok(());
            }

            if window_start.elapsed() >= stabilization_timeout {
                let progressed = remaining_at_window_start.map_or(true, |prev| remaining < prev);
                if progressed {
                    debug!(remaining, "external view making progress; extending timeout");
                    remaining_at_window_start = Some(remaining);
                    break;
                } else if best_effort {
                    warn!(remaining, "external view convergence stalled; continuing (best_effort)");
                    return Ok(());
                } else {
                    return Err(DomainError::ConvergenceTimeout { remaining }.into());
                }
            }

            tokio::time::sleep(check_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rebal_domain::{InstanceId, InstanceStateMap, RebalanceConfig, SegmentState};
    use rebal_policy::{OfflineSegmentAssignment, RealtimeSegmentAssignment};
    use rebal_planner::SegmentNamePartitionIdOracle;
    use rebal_store::InMemoryStore;
    use crate::instance_partitions::TagBucketRoundRobinDriver;
    use crate::observer::NoopObserver;

    fn states(pairs: &[(&str, SegmentState)]) -> InstanceStateMap {
        pairs.iter().map(|(i, s)| (InstanceId::new(*i), *s)).collect()
    }

    fn deps(policy: Arc<dyn AssignmentPolicy>, store: Arc<dyn PlacementStore>) -> RebalanceDeps {
        RebalanceDeps {
            store,
            policy,
            ip_driver: Arc::new(TagBucketRoundRobinDriver::new(2, 1)),
            partition_oracle: Arc::new(SegmentNamePartitionIdOracle),
            force_commit: None,
            observer: Arc::new(NoopObserver),
        }
    }

    fn base_config() -> RebalanceConfig {
        let mut c = RebalanceConfig::default();
        c.min_available_replicas = 1;
        c
    }

    #[tokio::test]
    async fn no_op_when_placement_and_partitions_unchanged() {
        let store = Arc::new(InMemoryStore::new());
        let mut placement = PlacementMap::new();
        placement.insert(SegmentId::new("s1"), states(&[("i1", SegmentState::Online), ("i2", SegmentState::Online)]));
        store.seed_ideal_state("t1", placement.clone(), 2, 1).await;
        store.set_external_view("t1", ExternalView(placement.clone())).await;
        store
            .set_instance_configs(vec![
                InstanceConfig { id: InstanceId::new("i1"), tags: vec!["OFFLINE".into()], enabled: true },
                InstanceConfig { id: InstanceId::new("i2"), tags: vec!["OFFLINE".into()], enabled: true },
            ])
            .await;
        let ip = rebal_domain::InstancePartitions {
            category: Some(InstancePartitionsCategory::Offline),
            groups: vec![
                vec![vec![InstanceId::new("i1")]],
                vec![vec![InstanceId::new("i2")]],
            ],
        };
        store
            .write_instance_partitions("t1", &InstancePartitionsCategory::Offline, &ip)
            .await
            .unwrap();

        let req = RebalanceRequest {
            table: "t1".into(),
            config: base_config(),
            is_realtime_table: false,
            sorted_tiers: vec![],
        };
        let deps = deps(Arc::new(OfflineSegmentAssignment), store);
        let result = run(req, deps).await;
        assert_eq!(result.status, TerminalStatus::NoOp, "{}", result.message);
    }

    #[tokio::test]
    async fn downtime_path_writes_target_in_one_step() {
        let store = Arc::new(InMemoryStore::new());
        let mut placement = PlacementMap::new();
        placement.insert(SegmentId::new("s1"), states(&[("i1", SegmentState::Online), ("i2", SegmentState::Online)]));
        store.seed_ideal_state("t1", placement.clone(), 2, 1).await;
        store.set_external_view("t1", ExternalView(placement.clone())).await;
        store
            .set_instance_configs(vec![
                InstanceConfig { id: InstanceId::new("i3"), tags: vec![], enabled: true },
                InstanceConfig { id: InstanceId::new("i4"), tags: vec![], enabled: true },
            ])
            .await;

        let mut cfg = base_config();
        cfg.downtime = true;
        cfg.reassign_instances = true;
        let req = RebalanceRequest {
            table: "t1".into(),
            config: cfg,
            is_realtime_table: false,
            sorted_tiers: vec![],
        };
        let deps = deps(Arc::new(OfflineSegmentAssignment), store.clone());
        let result = run(req, deps).await;
        assert_eq!(result.status, TerminalStatus::Done, "{}", result.message);

        let (doc, version) = store.read_ideal_state("t1").await.unwrap();
        assert_eq!(version, 1);
        assert_ne!(doc.placement, placement);
    }

    #[tokio::test]
    async fn rejects_batch_size_zero() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_ideal_state("t1", PlacementMap::new(), 1, 1).await;
        let mut cfg = base_config();
        cfg.batch_size_per_server = 0;
        let req = RebalanceRequest {
            table: "t1".into(),
            config: cfg,
            is_realtime_table: false,
            sorted_tiers: vec![],
        };
        let deps = deps(Arc::new(OfflineSegmentAssignment), store);
        let result = run(req, deps).await;
        assert_eq!(result.status, TerminalStatus::Failed);
    }

    #[tokio::test]
    async fn force_commit_without_realtime_table_is_invalid_config() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_ideal_state("t1", PlacementMap::new(), 1, 1).await;
        let mut cfg = base_config();
        cfg.force_commit = true;
        let req = RebalanceRequest {
            table: "t1".into(),
            config: cfg,
            is_realtime_table: false,
            sorted_tiers: vec![],
        };
        let deps = deps(Arc::new(OfflineSegmentAssignment), store);
        let result = run(req, deps).await;
        assert_eq!(result.status, TerminalStatus::Failed);
        assert!(result.message.contains("forceCommit"));
    }

    #[tokio::test]
    async fn no_downtime_loop_fails_when_external_view_never_converges() {
        // The EV is seeded once and never updated again, so the wait-for-EV
        // step can never see it catch up to the new IS. Proves the wait loop
        // genuinely blocks on EV polling rather than free-running: with a
        // short stabilization timeout this must time out rather than reach
        // `Done`. The successful multi-step convergence path (a store that
        // mirrors IS writes into the EV) is covered in
        // `tests/rebalance_flow.rs`, since that needs a store wrapper rather
        // than the plain `InMemoryStore` used here.
        let store = Arc::new(InMemoryStore::new());
        let mut placement = PlacementMap::new();
        placement.insert(SegmentId::new("s1"), states(&[("i1", SegmentState::Online), ("i2", SegmentState::Online)]));
        store.seed_ideal_state("t1", placement.clone(), 2, 1).await;
        store.set_external_view("t1", ExternalView(placement.clone())).await;
        store
            .set_instance_configs(vec![
                InstanceConfig { id: InstanceId::new("i1"), tags: vec![], enabled: true },
                InstanceConfig { id: InstanceId::new("i2"), tags: vec![], enabled: true },
            ])
            .await;

        let mut cfg = base_config();
        cfg.external_view_check_interval_ms = 1;
        cfg.external_view_stabilization_timeout_ms = 50;
        let req = RebalanceRequest {
            table: "t1".into(),
            config: cfg,
            is_realtime_table: true,
            sorted_tiers: vec![],
        };
        let deps = deps(Arc::new(RealtimeSegmentAssignment), store.clone());

        // EV never changes (servers don't actually move) — with a short
        // stabilization timeout and best_effort unset, this must fail with
        // ConvergenceTimeout after the first step's wait, proving the wait
        // loop actually blocks on EV rather than free-running.
        let result = run(req, deps).await;
        assert_eq!(result.status, TerminalStatus::Failed);
    }
}
