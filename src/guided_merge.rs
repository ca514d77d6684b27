//! Drives the station merge from the weight table instead of raw scan order, so the
//! least loaded line pairs are collapsed first.

use crate::errors::SchematicError;
use crate::grid_model::{Axis, Outcome, Route, validate_routes};
use crate::station_merge::{MergeCandidate, apply_merge, candidates};
use crate::weight_table::{DataTableRow, MergeStatus};
use tracing::{debug, info, warn};

/// Live model and table after a guided pass. `Outcome::modified` tracks the routes only;
/// `table_changed` is set when any row was flagged merged or failed.
#[derive(Debug, Clone, PartialEq)]
pub struct GuidedSweep {
    pub routes: Vec<Route>,
    pub table: Vec<DataTableRow>,
    pub merges: usize,
    pub table_changed: bool,
}

impl GuidedSweep {
    fn start(routes: &[Route], table: &[DataTableRow]) -> Self {
        GuidedSweep {
            routes: routes.to_vec(),
            table: table.to_vec(),
            merges: 0,
            table_changed: false,
        }
    }
}

fn validate_table(table: &[DataTableRow]) -> Result<(), SchematicError> {
    for row in table {
        let well_formed = row.idx1 % 2 != 0
            && row.idx2 == row.idx1 + 2
            && row.idx1_max_weight.is_finite()
            && row.idx2_max_weight.is_finite();
        if !well_formed {
            return Err(SchematicError::malformed(
                "<table>",
                row.number,
                format!(
                    "row {} {}/{} does not pair neighbouring odd lines",
                    row.kind.as_str(),
                    row.idx1,
                    row.idx2
                ),
            ));
        }
    }
    Ok(())
}

/// The candidate collapses one of the row's lines onto the other: its shared station sits on
/// one line and the far end of the absorbed interval run sits on the other.
fn matches_row(routes: &[Route], candidate: &MergeCandidate, row: &DataTableRow) -> bool {
    let axis = row.kind.axis();
    let segment = &routes[candidate.route_idx].segments[candidate.segment_idx];
    let w1 = &segment.station_weights[candidate.pair_idx];
    let w2 = &segment.station_weights[candidate.pair_idx + 1];

    let shared = segment.points[candidate.shared_idx].coord(axis);
    let before = segment.points[w1.start_idx].coord(axis);
    let after = segment.points[w2.end_idx].coord(axis);

    let other = if shared == row.idx1 {
        row.idx2
    } else if shared == row.idx2 {
        row.idx1
    } else {
        return false;
    };
    before == other || after == other
}

fn merge_next_row(
    routes: &mut [Route],
    table: &mut [DataTableRow],
    gap_tolerance: f64,
    axis: Option<Axis>,
) -> bool {
    for row in table.iter_mut() {
        if row.status != MergeStatus::Unmerged || row.weight_gap() > gap_tolerance {
            continue;
        }
        let row_axis = row.kind.axis();
        if axis.is_some_and(|a| a != row_axis) {
            continue;
        }

        let found = {
            let live: &[Route] = routes;
            candidates(live, gap_tolerance, Some(row_axis))
                .find(|candidate| matches_row(live, candidate, row))
        };

        match found {
            Some(candidate) => {
                let segment = &mut routes[candidate.route_idx].segments[candidate.segment_idx];
                let effect = apply_merge(segment, candidate.pair_idx);
                row.status = MergeStatus::Merged;
                debug!(
                    "Table row #{} ({} {}/{}) merged: {:?}",
                    row.number,
                    row.kind.as_str(),
                    row.idx1,
                    row.idx2,
                    effect
                );
                return true;
            }
            None => {
                row.status = MergeStatus::Failed;
                let unreachable = SchematicError::UnreachableCandidate {
                    row: row.number,
                    kind: row.kind.as_str(),
                    idx1: row.idx1,
                    idx2: row.idx2,
                };
                debug!("{}", unreachable);
            }
        }
    }
    false
}

/// Applies the first table row that still matches a live interval pair. Rows that match
/// nothing are flagged `failed` and never revisited.
pub fn merge_by_table_row(
    routes: &[Route],
    table: &[DataTableRow],
    gap_tolerance: f64,
    axis: Option<Axis>,
) -> Outcome<GuidedSweep> {
    let mut sweep = GuidedSweep::start(routes, table);

    if let Err(e) = validate_routes(routes).and_then(|_| validate_table(table)) {
        warn!("guided merge skipped: {}", e);
        return Outcome::unchanged(sweep);
    }

    let merged = merge_next_row(&mut sweep.routes, &mut sweep.table, gap_tolerance, axis);
    sweep.table_changed = sweep.table != table;
    if merged {
        sweep.merges = 1;
        Outcome::changed(sweep)
    } else {
        Outcome::unchanged(sweep)
    }
}

/// Repeats `merge_by_table_row` until a full walk of the table changes nothing.
pub fn merge_all_by_table(
    routes: &[Route],
    table: &[DataTableRow],
    gap_tolerance: f64,
    axis: Option<Axis>,
) -> Outcome<GuidedSweep> {
    let mut sweep = GuidedSweep::start(routes, table);

    if let Err(e) = validate_routes(routes).and_then(|_| validate_table(table)) {
        warn!("guided merge skipped: {}", e);
        return Outcome::unchanged(sweep);
    }

    while merge_next_row(&mut sweep.routes, &mut sweep.table, gap_tolerance, axis) {
        sweep.merges += 1;
    }
    sweep.table_changed = sweep.table != table;

    let failed = sweep
        .table
        .iter()
        .filter(|r| r.status == MergeStatus::Failed)
        .count();
    info!(
        "Guided merge: {} rows merged, {} rows unreachable",
        sweep.merges, failed
    );

    if sweep.merges > 0 {
        Outcome::changed(sweep)
    } else {
        Outcome::unchanged(sweep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid_model::{GridPoint, Segment, WeightInterval};
    use crate::weight_table::{LineKind, build_table};

    fn corridor() -> Vec<Route> {
        vec![Route::new(
            "Orange",
            "#ff8800",
            vec![Segment::new(
                vec![
                    GridPoint::new(1, 1),
                    GridPoint::new(3, 1),
                    GridPoint::new(5, 1),
                    GridPoint::new(7, 1),
                ],
                vec![
                    WeightInterval::new(0, 1, 2.0),
                    WeightInterval::new(1, 2, 2.0),
                    WeightInterval::new(2, 3, 9.0),
                ],
            )],
        )]
    }

    #[test]
    fn test_guided_merge_follows_table() {
        let routes = corridor();
        let table = build_table(&routes);
        assert_eq!((table[0].kind, table[0].idx1), (LineKind::Col, 1));

        let outcome = merge_by_table_row(&routes, &table, 0.0, None);
        assert!(outcome.modified);
        let sweep = outcome.value;
        assert_eq!(sweep.table[0].status, MergeStatus::Merged);
        let xs: Vec<i64> = sweep.routes[0].segments[0]
            .points
            .iter()
            .map(|p| p.x)
            .collect();
        assert_eq!(xs, vec![1, 5, 7]);
    }

    #[test]
    fn test_unmatched_rows_are_flagged_failed() {
        let routes = corridor();
        let table = vec![DataTableRow {
            number: 1,
            kind: LineKind::Col,
            idx1: 11,
            idx2: 13,
            idx1_max_weight: 1.0,
            idx2_max_weight: 1.0,
            status: MergeStatus::Unmerged,
        }];

        let outcome = merge_by_table_row(&routes, &table, 0.0, None);
        assert!(!outcome.modified);
        assert!(outcome.value.table_changed);
        assert_eq!(outcome.value.table[0].status, MergeStatus::Failed);
        assert_eq!(outcome.value.routes, routes);

        // Nothing left to flag on a second pass.
        let again = merge_by_table_row(&routes, &outcome.value.table, 0.0, None);
        assert!(!again.modified);
        assert!(!again.value.table_changed);
    }

    #[test]
    fn test_full_sweep_terminates() {
        let routes = corridor();
        let table = build_table(&routes);

        let outcome = merge_all_by_table(&routes, &table, 0.0, None);
        assert_eq!(outcome.value.merges, 1);
        assert!(outcome.value.table_changed);
        let rows: Vec<(i64, i64, MergeStatus)> = outcome
            .value
            .table
            .iter()
            .map(|r| (r.idx1, r.idx2, r.status))
            .collect();
        // 3/5 is outside the gap tolerance; 5/7 lost its 2.0 neighbour to the first merge.
        assert_eq!(
            rows,
            vec![
                (1, 3, MergeStatus::Merged),
                (3, 5, MergeStatus::Unmerged),
                (5, 7, MergeStatus::Failed),
            ]
        );
    }

    #[test]
    fn test_malformed_table_is_noop() {
        let routes = corridor();
        let mut table = build_table(&routes);
        table[0].idx2 = table[0].idx1 + 1;

        let outcome = merge_by_table_row(&routes, &table, 5.0, None);
        assert!(!outcome.modified);
        assert_eq!(outcome.value.table, table);
        assert!(!outcome.value.table_changed);
    }
}
