use std::collections::HashSet;

use rebal_domain::{DomainError, ExternalView, PlacementMap, SegmentId, SegmentState};

/// §4.4 Convergence Predicate. Counts segment-replicas in `is` that have not
/// yet reached their ideal state in `ev`. `monitored`, when given, restricts
/// the scan to that subset of segments (the driver's per-step monitored
/// set); `None` scans every segment in `is`.
///
/// `early_return` short-circuits at the first nonzero contribution, returning
/// `Ok(1)` — used by [`is_converged`], which only cares about zero-vs-nonzero.
///
/// Returns `Err(DomainError::StuckInError)` the first time an `ERROR` replica
/// is seen with `best_effort = false`; with `best_effort = true` such
/// replicas are treated as converged (do not contribute to the count).
pub fn remaining_replicas(
    ev: &ExternalView,
    is: &PlacementMap,
    low_disk_mode: bool,
    best_effort: bool,
    monitored: Option<&HashSet<SegmentId>>,
    early_return: bool,
) -> Result<usize, DomainError> {
    let mut remaining = 0usize;

    for (segment, ideal_instances) in is {
        if let Some(m) = monitored {
            if !m.contains(segment) {
                continue;
            }
        }

        let ev_instances = ev.get(segment);

        for (instance, ideal_state) in ideal_instances {
            if *ideal_state == SegmentState::Offline {
                continue;
            }
            let contributed = match ev_instances.and_then(|m| m.get(instance)) {
                None => true,
                Some(SegmentState::Error) => {
                    if best_effort {
                        false
                    } else {
                        return Err(DomainError::StuckInError {
                            segment: segment.clone(),
                            instance: instance.clone(),
                        });
                    }
                }
                Some(observed) => observed != ideal_state,
            };
            if contributed {
                remaining += 1;
                if early_return {
                    return Ok(1);
                }
            }
        }

        if low_disk_mode {
            if let Some(ev_instances) = ev_instances {
                for (instance, observed) in ev_instances {
                    if ideal_instances.contains_key(instance) {
                        continue;
                    }
                    if *observed != SegmentState::Error {
                        remaining += 1;
                        if early_return {
                            return Ok(1);
                        }
                    }
                }
            }
        }
    }

    Ok(remaining)
}

/// `remaining_replicas(..., early_return = true) == 0`.
pub fn is_converged(
    ev: &ExternalView,
    is: &PlacementMap,
    low_disk_mode: bool,
    best_effort: bool,
    monitored: Option<&HashSet<SegmentId>>,
) -> Result<bool, DomainError> {
    Ok(remaining_replicas(ev, is, low_disk_mode, best_effort, monitored, true)? == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rebal_domain::InstanceId;
    use std::collections::HashMap;

    fn map(pairs: &[(&str, &str, SegmentState)]) -> PlacementMap {
        let mut pm = PlacementMap::new();
        for (seg, inst, state) in pairs {
            pm.entry(SegmentId::new(*seg))
                .or_insert_with(HashMap::new)
                .insert(InstanceId::new(*inst), *state);
        }
        pm
    }

    #[test]
    fn identical_is_and_ev_fully_converged() {
        let is = map(&[("s1", "i1", SegmentState::Online)]);
        let ev = ExternalView(is.clone());
        assert_eq!(
            remaining_replicas(&ev, &is, false, false, None, false).unwrap(),
            0
        );
        assert!(is_converged(&ev, &is, false, false, None).unwrap());
    }

    #[test]
    fn missing_segment_in_ev_counts_one() {
        let is = map(&[("s1", "i1", SegmentState::Online)]);
        let ev = ExternalView(PlacementMap::new());
        assert_eq!(
            remaining_replicas(&ev, &is, false, false, None, false).unwrap(),
            1
        );
    }

    #[test]
    fn offline_ideal_state_never_counts() {
        let is = map(&[("s1", "i1", SegmentState::Offline)]);
        let ev = ExternalView(PlacementMap::new());
        assert_eq!(
            remaining_replicas(&ev, &is, false, false, None, false).unwrap(),
            0
        );
    }

    #[test]
    fn error_replica_is_fatal_without_best_effort() {
        let is = map(&[("s1", "i1", SegmentState::Online)]);
        let ev = map(&[("s1", "i1", SegmentState::Error)]);
        let ev = ExternalView(ev);
        let err = remaining_replicas(&ev, &is, false, false, None, false).unwrap_err();
        assert!(matches!(err, DomainError::StuckInError { .. }));
    }

    #[test]
    fn error_replica_tolerated_with_best_effort() {
        let is = map(&[("s1", "i1", SegmentState::Online)]);
        let ev = map(&[("s1", "i1", SegmentState::Error)]);
        let ev = ExternalView(ev);
        assert_eq!(
            remaining_replicas(&ev, &is, false, true, None, false).unwrap(),
            0
        );
    }

    #[test]
    fn monitored_set_restricts_scan() {
        let is = map(&[
            ("s1", "i1", SegmentState::Online),
            ("s2", "i1", SegmentState::Online),
        ]);
        let ev = ExternalView(PlacementMap::new());
        let mut monitored = HashSet::new();
        monitored.insert(SegmentId::new("s1"));
        assert_eq!(
            remaining_replicas(&ev, &is, false, false, Some(&monitored), false).unwrap(),
            1
        );
    }

    #[test]
    fn low_disk_mode_counts_ev_only_non_error_extras() {
        let is = map(&[("s1", "i1", SegmentState::Online)]);
        let mut ev_map = map(&[("s1", "i1", SegmentState::Online)]);
        ev_map
            .get_mut(&SegmentId::new("s1"))
            .unwrap()
            .insert(InstanceId::new("i2"), SegmentState::Online);
        let ev = ExternalView(ev_map);

        assert_eq!(
            remaining_replicas(&ev, &is, false, false, None, false).unwrap(),
            0,
            "without low_disk_mode the extra EV-only replica is ignored"
        );
        assert_eq!(
            remaining_replicas(&ev, &is, true, false, None, false).unwrap(),
            1,
            "low_disk_mode must count the EV-only non-ERROR replica"
        );
    }

    #[test]
    fn early_return_short_circuits_at_one() {
        let is = map(&[
            ("s1", "i1", SegmentState::Online),
            ("s2", "i1", SegmentState::Online),
        ]);
        let ev = ExternalView(PlacementMap::new());
        assert_eq!(
            remaining_replicas(&ev, &is, false, false, None, true).unwrap(),
            1
        );
    }
}
