use std::path::Path;

#[test]
fn load_downtime_fixture() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/downtime_rebalance.yml");
    let (table, config) = rebal_config::load_request(&path).expect("should load without error");

    assert_eq!(table, "orders_REALTIME");
    assert!(config.downtime);
    assert!(config.include_consuming);
    assert_eq!(config.batch_size_per_server, 4);
    assert_eq!(config.min_available_replicas, 1);
}

#[test]
fn missing_file_returns_error() {
    let path = Path::new("/nonexistent/path/does/not/exist.yml");
    assert!(rebal_config::load_request(path).is_err());
}
