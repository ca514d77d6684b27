use crate::grid_model::{Axis, GridPoint, Route, validate_routes};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Maximum interval weight touching each grid line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineWeights {
    pub columns: BTreeMap<i64, f64>,
    pub rows: BTreeMap<i64, f64>,
}

impl LineWeights {
    pub fn for_axis(&self, axis: Axis) -> &BTreeMap<i64, f64> {
        match axis {
            Axis::Horizontal => &self.columns,
            Axis::Vertical => &self.rows,
        }
    }

    fn touch(&mut self, x: i64, y: i64, weight: f64) {
        let col = self.columns.entry(x).or_insert(weight);
        *col = col.max(weight);
        let row = self.rows.entry(y).or_insert(weight);
        *row = row.max(weight);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Col,
    Row,
}

impl LineKind {
    pub fn axis(self) -> Axis {
        match self {
            LineKind::Col => Axis::Horizontal,
            LineKind::Row => Axis::Vertical,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LineKind::Col => "col",
            LineKind::Row => "row",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStatus {
    #[default]
    Unmerged,
    Merged,
    Failed,
}

/// A pair of neighbouring odd grid lines and their peak load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTableRow {
    #[serde(rename = "#")]
    pub number: usize,
    #[serde(rename = "type")]
    pub kind: LineKind,
    pub idx1: i64,
    pub idx2: i64,
    pub idx1_max_weight: f64,
    pub idx2_max_weight: f64,
    #[serde(rename = "mergedFlag", default)]
    pub status: MergeStatus,
}

impl DataTableRow {
    pub fn weight_gap(&self) -> f64 {
        (self.idx1_max_weight - self.idx2_max_weight).abs()
    }

    pub fn combined_weight(&self) -> f64 {
        self.idx1_max_weight + self.idx2_max_weight
    }
}

/// Integer line walk from `a` to `b`, both ends included. Coordinates must be within
/// `MAX_GRID_COORD`; `validate_routes` checks that.
pub fn rasterize(a: &GridPoint, b: &GridPoint) -> Vec<(i64, i64)> {
    let (mut x0, mut y0, x1, y1) = (a.x, a.y, b.x, b.y);
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    let mut cells = Vec::new();
    loop {
        cells.push((x0, y0));
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
    cells
}

/// Running per-line maximum of every interval's weight along its rasterized path.
pub fn aggregate_line_weights(routes: &[Route]) -> LineWeights {
    let mut weights = LineWeights::default();
    if let Err(e) = validate_routes(routes) {
        warn!("line weight aggregation skipped: {}", e);
        return weights;
    }

    for segment in routes.iter().flat_map(|r| r.segments.iter()) {
        for interval in &segment.station_weights {
            let end = interval.end_idx.min(segment.points.len().saturating_sub(1));
            for i in interval.start_idx..end {
                for (x, y) in rasterize(&segment.points[i], &segment.points[i + 1]) {
                    weights.touch(x, y, interval.weight);
                }
            }
        }
    }

    weights
}

fn odd_line_pairs(kind: LineKind, lines: &BTreeMap<i64, f64>) -> Vec<DataTableRow> {
    lines
        .iter()
        .filter(|(c, _)| *c % 2 != 0)
        .filter_map(|(&c, &w1)| {
            let &w2 = lines.get(&(c + 2))?;
            Some(DataTableRow {
                number: 0,
                kind,
                idx1: c,
                idx2: c + 2,
                idx1_max_weight: w1,
                idx2_max_weight: w2,
                status: MergeStatus::Unmerged,
            })
        })
        .collect()
}

/// Builds the merge table: columns first, then lightest line pairs first.
pub fn build_table(routes: &[Route]) -> Vec<DataTableRow> {
    if let Err(e) = validate_routes(routes) {
        warn!("table generation skipped: {}", e);
        return Vec::new();
    }

    let weights = aggregate_line_weights(routes);
    let mut rows = odd_line_pairs(LineKind::Col, &weights.columns);
    rows.extend(odd_line_pairs(LineKind::Row, &weights.rows));

    rows.sort_by_key(|row| {
        (
            row.kind == LineKind::Row,
            OrderedFloat(row.combined_weight()),
            row.idx1,
        )
    });
    for (i, row) in rows.iter_mut().enumerate() {
        row.number = i + 1;
    }

    debug!(
        "Built merge table with {} rows from {} columns / {} rows",
        rows.len(),
        weights.columns.len(),
        weights.rows.len()
    );

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid_model::{Segment, WeightInterval};

    #[test]
    fn test_rasterize_diagonal_and_straight() {
        let cells = rasterize(&GridPoint::new(1, 1), &GridPoint::new(4, 4));
        assert_eq!(cells, vec![(1, 1), (2, 2), (3, 3), (4, 4)]);

        let cells = rasterize(&GridPoint::new(5, 3), &GridPoint::new(2, 3));
        assert_eq!(cells, vec![(5, 3), (4, 3), (3, 3), (2, 3)]);
    }

    #[test]
    fn test_far_coordinates_yield_empty_table() {
        let far = Segment::new(
            vec![GridPoint::new(1, 1), GridPoint::new(i64::MAX - 1, 1)],
            vec![WeightInterval::new(0, 1, 2.0)],
        );
        let routes = vec![Route::new("Far", "black", vec![far])];

        assert!(build_table(&routes).is_empty());
        assert_eq!(aggregate_line_weights(&routes), LineWeights::default());
    }

    #[test]
    fn test_aggregate_takes_maximum() {
        let heavy = Segment::new(
            vec![GridPoint::new(1, 1), GridPoint::new(5, 1)],
            vec![WeightInterval::new(0, 1, 10.0)],
        );
        let light = Segment::new(
            vec![GridPoint::new(3, 1), GridPoint::new(3, 5)],
            vec![WeightInterval::new(0, 1, 2.0)],
        );
        let routes = vec![
            Route::new("A", "red", vec![heavy]),
            Route::new("B", "blue", vec![light]),
        ];

        let weights = aggregate_line_weights(&routes);
        assert_eq!(weights.columns[&3], 10.0);
        assert_eq!(weights.columns[&1], 10.0);
        assert_eq!(weights.rows[&1], 10.0);
        assert_eq!(weights.rows[&5], 2.0);
    }

    #[test]
    fn test_table_order_and_pairs() {
        let route = Route::new(
            "A",
            "red",
            vec![
                Segment::new(
                    vec![GridPoint::new(1, 1), GridPoint::new(3, 1), GridPoint::new(5, 1)],
                    vec![WeightInterval::new(0, 1, 8.0), WeightInterval::new(1, 2, 1.0)],
                ),
                Segment::new(
                    vec![GridPoint::new(7, 3), GridPoint::new(7, 5)],
                    vec![WeightInterval::new(0, 1, 2.0)],
                ),
            ],
        );

        let table = build_table(&[route]);
        let summary: Vec<(LineKind, i64, i64)> =
            table.iter().map(|r| (r.kind, r.idx1, r.idx2)).collect();
        // Columns 1:8, 3:8, 5:1, 7:2; rows 1:8, 3:2, 5:2.
        assert_eq!(
            summary,
            vec![
                (LineKind::Col, 5, 7),
                (LineKind::Col, 3, 5),
                (LineKind::Col, 1, 3),
                (LineKind::Row, 3, 5),
                (LineKind::Row, 1, 3),
            ]
        );
        assert_eq!(table[0].number, 1);
        assert!(table.iter().all(|r| r.status == MergeStatus::Unmerged));
    }

    #[test]
    fn test_row_serializes_with_wire_names() {
        let row = DataTableRow {
            number: 3,
            kind: LineKind::Col,
            idx1: 1,
            idx2: 3,
            idx1_max_weight: 2.0,
            idx2_max_weight: 4.0,
            status: MergeStatus::Failed,
        };
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["#"], 3);
        assert_eq!(value["type"], "col");
        assert_eq!(value["mergedFlag"], "failed");
    }
}
