use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use rebal_api::AppState;
use rebal_domain::{
    InstanceConfig, InstanceId, InstanceStateMap, PlacementMap, RebalanceConfig, SegmentId,
    SegmentState,
};
use rebal_engine::{RebalanceDeps, RebalanceRequest, TagBucketRoundRobinDriver};
use rebal_planner::SegmentNamePartitionIdOracle;
use rebal_store::{InMemoryStore, PlacementStore, RedbStore};

use crate::output;

// ── Serve ─────────────────────────────────────────────────────────────────────

pub async fn serve(bind: String, port: u16, store_path: Option<PathBuf>) -> Result<()> {
    let token_path = default_token_path();
    let token = if let Ok(existing) = std::fs::read_to_string(&token_path).map(|s| s.trim().to_string()) {
        if existing.is_empty() {
            let t = generate_token();
            write_token(&token_path, &t)?;
            println!("Generated new token (written to {})", token_path.display());
            t
        } else {
            println!("Reusing existing token from {}", token_path.display());
            existing
        }
    } else {
        let t = generate_token();
        write_token(&token_path, &t)?;
        println!("Generated new token (written to {})", token_path.display());
        t
    };

    let store: Arc<dyn PlacementStore> = match store_path {
        Some(path) => {
            println!("Using persistent store at {}", path.display());
            Arc::new(
                RedbStore::open(&path)
                    .with_context(|| format!("Failed to open store at {}", path.display()))?,
            )
        }
        None => {
            println!("Using in-memory (ephemeral) store — state will be lost on server stop");
            Arc::new(InMemoryStore::new())
        }
    };

    let state = AppState {
        store,
        ip_driver: Arc::new(TagBucketRoundRobinDriver::new(1, 1)),
        partition_oracle: Arc::new(SegmentNamePartitionIdOracle),
        force_commit: None,
        auth_token: Arc::new(token),
    };

    let addr = format!("{bind}:{port}");
    println!("Starting rebal API server on http://{addr}");

    let app = rebal_api::build_app(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

// ── Rebalance ─────────────────────────────────────────────────────────────────

pub async fn rebalance(
    table: String,
    config_path: Option<PathBuf>,
    realtime: bool,
    tiers: Vec<String>,
    remote: Option<String>,
    token: Option<String>,
) -> Result<()> {
    let config = match config_path {
        Some(path) => rebal_config::load_request(&path)
            .map(|(_, config)| config)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => RebalanceConfig::default(),
    };

    if let Some(url) = remote {
        let token = resolve_token(token)?;
        let body = serde_json::json!({
            "config": config,
            "is_realtime_table": realtime,
            "sorted_tiers": tiers,
        });
        let resp: serde_json::Value = authed_client(&token)
            .post(format!("{}/tables/{}/rebalance", url.trim_end_matches('/'), table))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to reach server at {url}"))?
            .json()
            .await
            .context("Failed to deserialize rebalance response")?;
        println!("{}", serde_json::to_string_pretty(&resp)?);
        return Ok(());
    }

    anyhow::bail!(
        "no --remote given and no in-process store is seeded for table '{table}'; \
         use `rebal demo` to run against a synthetic in-memory cluster"
    );
}

// ── Demo ──────────────────────────────────────────────────────────────────────

pub async fn demo(segments: u32, servers: u32, replicas: u32) -> Result<()> {
    if replicas > servers {
        anyhow::bail!("--replicas ({replicas}) cannot exceed --servers ({servers})");
    }

    let store = InMemoryStore::new();
    let table = "demoTable";

    let instance_configs: Vec<InstanceConfig> = (0..servers)
        .map(|i| InstanceConfig {
            id: InstanceId::new(format!("server_{i}")),
            tags: vec!["DefaultTenant_OFFLINE".to_string()],
            enabled: true,
        })
        .collect();
    store.set_instance_configs(instance_configs).await;

    // Seed every segment onto the first `replicas` servers, ONLINE — the
    // "before" placement the rebalancer will move off of.
    let mut placement = PlacementMap::new();
    for s in 0..segments {
        let segment = SegmentId::new(format!("segment_{s}"));
        let mut states = InstanceStateMap::new();
        for r in 0..replicas.min(servers) {
            states.insert(InstanceId::new(format!("server_{r}")), SegmentState::Online);
        }
        placement.insert(segment, states);
    }
    store.seed_ideal_state(table, placement, replicas, segments).await;

    let config = RebalanceConfig {
        dry_run: true,
        reassign_instances: true,
        ..RebalanceConfig::default()
    };

    let (before_doc, _version) = store.read_ideal_state(table).await?;
    let req = RebalanceRequest {
        table: table.to_string(),
        config,
        is_realtime_table: false,
        sorted_tiers: vec![],
    };
    let deps = RebalanceDeps {
        store: Arc::new(store),
        policy: rebal_policy::resolve(rebal_policy::PolicyKind::Offline),
        ip_driver: Arc::new(TagBucketRoundRobinDriver::new(1, 1)),
        partition_oracle: Arc::new(SegmentNamePartitionIdOracle),
        force_commit: None,
        observer: Arc::new(rebal_engine::NoopObserver),
    };

    let result = rebal_engine::run(req, deps).await;
    println!("{}", output::render_result(&result));

    if let Some(target) = &result.target {
        let summary = rebal_engine::compute_summary(
            &before_doc.placement,
            target,
            before_doc.num_replicas,
            before_doc.num_replicas,
            &[],
            table,
            &SegmentNamePartitionIdOracle,
            None,
            None,
            None,
            std::time::Duration::from_secs(1),
            5,
        )
        .await;
        println!("{}", output::render_summary(&summary));
    }

    Ok(())
}

// ── Token / HTTP helpers ────────────────────────────────────────────────────

fn generate_token() -> String {
    let a = uuid::Uuid::new_v4().to_string().replace('-', "");
    let b = uuid::Uuid::new_v4().to_string().replace('-', "");
    format!("{a}{b}")
}

/// Resolve the token to use for API calls.
///
/// Priority: explicit value (from --token / REBAL_TOKEN) → ~/.rebal/token file.
fn resolve_token(explicit: Option<String>) -> Result<String> {
    if let Some(t) = explicit {
        return Ok(t);
    }
    let path = default_token_path();
    std::fs::read_to_string(&path)
        .map(|s| s.trim().to_string())
        .with_context(|| {
            format!(
                "No token provided and could not read token file at {}. \
                 Use --token, REBAL_TOKEN, or run `rebal serve` first.",
                path.display()
            )
        })
}

fn write_token(path: &PathBuf, token: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    std::fs::write(path, token)
        .with_context(|| format!("Failed to write token to {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    }
    Ok(())
}

fn default_token_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    PathBuf::from(home).join(".rebal").join("token")
}

fn authed_client(token: &str) -> reqwest::Client {
    let mut headers = reqwest::header::HeaderMap::new();
    let bearer = format!("Bearer {token}");
    headers.insert(
        reqwest::header::AUTHORIZATION,
        reqwest::header::HeaderValue::from_str(&bearer)
            .expect("token contains invalid header characters"),
    );
    reqwest::Client::builder()
        .default_headers(headers)
        .build()
        .expect("failed to build HTTP client")
}
