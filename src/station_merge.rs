use crate::grid_model::{
    Axis, GridPoint, NodeProperties, NodeType, Outcome, Route, Segment, validate_routes,
};
use crate::topology::{PointKind, classify, is_bend_point, touches_axis};
use tracing::{debug, info, warn};

/// Location of a merge candidate in the live model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeCandidate {
    pub route_idx: usize,
    pub segment_idx: usize,
    /// Index of the first interval of the pair in `station_weights`.
    pub pair_idx: usize,
    /// Point shared by the two intervals.
    pub shared_idx: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeEffect {
    /// Bend station kept as shape-only geometry.
    Retagged,
    /// Straight-through station deleted from the point list.
    Removed,
}

/// Accumulated result of merging until no candidate remains.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeSweep {
    pub routes: Vec<Route>,
    pub merges: usize,
}

/// Shared point index if the interval pair starting at `pair_idx` may be merged.
pub(crate) fn qualifying_shared_point(
    segment: &Segment,
    pair_idx: usize,
    gap_tolerance: f64,
    axis: Option<Axis>,
) -> Option<usize> {
    let w1 = segment.station_weights.get(pair_idx)?;
    let w2 = segment.station_weights.get(pair_idx + 1)?;

    if w1.end_idx != w2.start_idx {
        return None;
    }
    if (w1.weight - w2.weight).abs() > gap_tolerance {
        return None;
    }

    let shared = w1.end_idx;
    if segment.is_boundary(shared) {
        return None;
    }
    if classify(segment, shared) != PointKind::Station {
        return None;
    }
    if let Some(axis) = axis {
        if !touches_axis(&segment.points, shared, axis) {
            return None;
        }
    }

    Some(shared)
}

/// Every qualifying candidate in scan order.
pub(crate) fn candidates(
    routes: &[Route],
    gap_tolerance: f64,
    axis: Option<Axis>,
) -> impl Iterator<Item = MergeCandidate> + '_ {
    routes.iter().enumerate().flat_map(move |(route_idx, route)| {
        route
            .segments
            .iter()
            .enumerate()
            .flat_map(move |(segment_idx, segment)| {
                (0..segment.station_weights.len().saturating_sub(1)).filter_map(move |pair_idx| {
                    qualifying_shared_point(segment, pair_idx, gap_tolerance, axis).map(
                        |shared_idx| MergeCandidate {
                            route_idx,
                            segment_idx,
                            pair_idx,
                            shared_idx,
                        },
                    )
                })
            })
    })
}

/// Folds the second interval of the pair into the first. The merged interval keeps the
/// first interval's weight.
pub(crate) fn apply_merge(segment: &mut Segment, pair_idx: usize) -> MergeEffect {
    let absorbed = segment.station_weights.remove(pair_idx + 1);
    let shared = segment.station_weights[pair_idx].end_idx;
    segment.station_weights[pair_idx].end_idx = absorbed.end_idx;

    if is_bend_point(&segment.points, shared) {
        retag_as_geometry(&mut segment.points[shared]);
        if let Some(Some(inherited)) = segment.nodes.as_mut().and_then(|n| n.get_mut(shared)) {
            inherited.strip_station();
        }
        return MergeEffect::Retagged;
    }

    segment.points.remove(shared);
    if let Some(nodes) = segment.nodes.as_mut() {
        nodes.remove(shared);
    }
    for w in segment.station_weights.iter_mut() {
        if w.start_idx > shared {
            w.start_idx -= 1;
        }
        if w.end_idx > shared {
            w.end_idx -= 1;
        }
    }
    MergeEffect::Removed
}

fn retag_as_geometry(point: &mut GridPoint) {
    match point.properties.as_mut() {
        Some(props) => props.strip_station(),
        None => {
            point.properties = Some(NodeProperties {
                node_type: Some(NodeType::Line),
                ..Default::default()
            })
        }
    }
}

/// Applies the first qualifying merge in place.
pub(crate) fn merge_first_in_place(
    routes: &mut [Route],
    gap_tolerance: f64,
    axis: Option<Axis>,
) -> Option<(MergeCandidate, MergeEffect)> {
    let candidate = candidates(routes, gap_tolerance, axis).next()?;
    let segment = &mut routes[candidate.route_idx].segments[candidate.segment_idx];
    let effect = apply_merge(segment, candidate.pair_idx);

    debug!(
        "Merged station at point {} of route '{}' segment {} ({:?})",
        candidate.shared_idx, routes[candidate.route_idx].name, candidate.segment_idx, effect
    );

    Some((candidate, effect))
}

/// Performs at most one merge: the first qualifying interval pair in scan order.
pub fn merge_once(routes: &[Route], gap_tolerance: f64, axis: Option<Axis>) -> Outcome<Vec<Route>> {
    if let Err(e) = validate_routes(routes) {
        warn!("merge skipped: {}", e);
        return Outcome::unchanged(routes.to_vec());
    }

    let mut next = routes.to_vec();
    match merge_first_in_place(&mut next, gap_tolerance, axis) {
        Some(_) => Outcome::changed(next),
        None => Outcome::unchanged(next),
    }
}

/// Repeats `merge_once` until no candidate qualifies.
pub fn merge_all(routes: &[Route], gap_tolerance: f64, axis: Option<Axis>) -> Outcome<MergeSweep> {
    if let Err(e) = validate_routes(routes) {
        warn!("merge skipped: {}", e);
        return Outcome::unchanged(MergeSweep {
            routes: routes.to_vec(),
            merges: 0,
        });
    }

    let mut next = routes.to_vec();
    let mut merges = 0;
    while merge_first_in_place(&mut next, gap_tolerance, axis).is_some() {
        merges += 1;
    }

    if merges > 0 {
        info!(
            "Merged {} stations (gap {}, axis {})",
            merges,
            gap_tolerance,
            axis.map(|a| a.to_string()).unwrap_or_else(|| "any".to_string())
        );
    }

    let sweep = MergeSweep {
        routes: next,
        merges,
    };
    if merges > 0 {
        Outcome::changed(sweep)
    } else {
        Outcome::unchanged(sweep)
    }
}

pub fn merge_horizontal(routes: &[Route], gap_tolerance: f64) -> Outcome<MergeSweep> {
    merge_all(routes, gap_tolerance, Some(Axis::Horizontal))
}

pub fn merge_vertical(routes: &[Route], gap_tolerance: f64) -> Outcome<MergeSweep> {
    merge_all(routes, gap_tolerance, Some(Axis::Vertical))
}
