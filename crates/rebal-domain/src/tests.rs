use crate::types::*;

#[test]
fn segment_state_displays_uppercase_matching_serde_rename() {
    assert_eq!(SegmentState::Online.to_string(), "ONLINE");
    assert_eq!(SegmentState::Consuming.to_string(), "CONSUMING");
    assert_eq!(SegmentState::Offline.to_string(), "OFFLINE");
    assert_eq!(SegmentState::Error.to_string(), "ERROR");
    assert_eq!(SegmentState::Dropped.to_string(), "DROPPED");
}

#[test]
fn placement_map_iterates_segments_in_lexicographic_order() {
    let mut pm: PlacementMap = PlacementMap::new();
    pm.insert(SegmentId::new("seg_10"), InstanceStateMap::new());
    pm.insert(SegmentId::new("seg_2"), InstanceStateMap::new());
    pm.insert(SegmentId::new("seg_1"), InstanceStateMap::new());

    let order: Vec<&str> = pm.keys().map(|k| k.as_str()).collect();
    // Lexicographic, not numeric: "seg_1" < "seg_10" < "seg_2".
    assert_eq!(order, vec!["seg_1", "seg_10", "seg_2"]);
}

#[test]
fn instance_partitions_all_instances_dedupes_and_sorts() {
    let mut ip = InstancePartitions::new(InstancePartitionsCategory::Offline);
    ip.groups = vec![vec![
        vec![InstanceId::new("s2"), InstanceId::new("s1")],
        vec![InstanceId::new("s1"), InstanceId::new("s3")],
    ]];
    let all = ip.all_instances();
    assert_eq!(
        all,
        vec![InstanceId::new("s1"), InstanceId::new("s2"), InstanceId::new("s3")]
    );
}

#[test]
fn ideal_state_doc_starts_at_version_zero_and_enabled() {
    let doc = IdealStateDoc::new(PlacementMap::new(), 3, 1);
    assert_eq!(doc.version, 0);
    assert!(doc.enabled);
}

#[test]
fn terminal_status_displays_screaming_snake_case() {
    assert_eq!(TerminalStatus::NoOp.to_string(), "NO_OP");
    assert_eq!(TerminalStatus::DryRun.to_string(), "DRY_RUN");
    assert_eq!(TerminalStatus::Done.to_string(), "DONE");
}
