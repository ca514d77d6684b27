use crate::grid_model::{Axis, GridDocument, GridExtents, Outcome, validate_routes};
use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Which empty lines a compaction pass may remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionMode {
    /// Every unoccupied line between the outermost occupied ones.
    #[default]
    Full,
    /// Only unoccupied even (spacing) lines that are not pinned in the grid meta.
    SpacingOnly,
}

/// Monotonic old-to-new coordinate mapping for one axis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AxisRemap {
    removed: Vec<i64>,
}

impl AxisRemap {
    pub fn new(removed: BTreeSet<i64>) -> Self {
        Self {
            removed: removed.into_iter().collect(),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.removed.is_empty()
    }

    pub fn removed(&self) -> &[i64] {
        &self.removed
    }

    pub fn apply(&self, coord: i64) -> i64 {
        coord - self.removed.partition_point(|&r| r < coord) as i64
    }
}

fn occupied(doc: &GridDocument, axis: Axis) -> BTreeSet<i64> {
    doc.routes
        .iter()
        .flat_map(|r| r.segments.iter())
        .flat_map(|s| s.points.iter())
        .map(|p| p.coord(axis))
        .collect()
}

fn removable_lines(
    occupied: &BTreeSet<i64>,
    fixed: &BTreeSet<i64>,
    mode: CompactionMode,
) -> BTreeSet<i64> {
    let (Some(&min), Some(&max)) = (occupied.first(), occupied.last()) else {
        return BTreeSet::new();
    };

    (min..=max)
        .filter(|c| !occupied.contains(c))
        .filter(|c| match mode {
            CompactionMode::Full => true,
            CompactionMode::SpacingOnly => c % 2 == 0 && !fixed.contains(c),
        })
        .collect()
}

/// Per-axis remaps for `doc` under `mode`.
pub fn plan_remap(doc: &GridDocument, mode: CompactionMode) -> (AxisRemap, AxisRemap) {
    let [cols, rows] = Axis::BOTH.map(|axis| {
        AxisRemap::new(removable_lines(
            &occupied(doc, axis),
            doc.meta.fixed(axis),
            mode,
        ))
    });
    (cols, rows)
}

fn remap_fixed(fixed: &BTreeSet<i64>, remap: &AxisRemap) -> BTreeSet<i64> {
    let removed: AHashSet<i64> = remap.removed().iter().copied().collect();
    fixed
        .iter()
        .filter(|c| !removed.contains(c))
        .map(|&c| remap.apply(c))
        .collect()
}

/// Removes empty grid lines under `mode` and remaps every point.
pub fn compact(doc: &GridDocument, mode: CompactionMode) -> Outcome<GridDocument> {
    if let Err(e) = validate_routes(&doc.routes) {
        warn!("compaction skipped: {}", e);
        return Outcome::unchanged(doc.clone());
    }

    let (cols, rows) = plan_remap(doc, mode);
    if cols.is_identity() && rows.is_identity() {
        return Outcome::unchanged(doc.clone());
    }

    let mut next = doc.clone();
    for point in next
        .routes
        .iter_mut()
        .flat_map(|r| r.segments.iter_mut())
        .flat_map(|s| s.points.iter_mut())
    {
        point.x = cols.apply(point.x);
        point.y = rows.apply(point.y);
    }

    let extents = GridExtents::of(&next.routes);
    let (min_width, min_height) = extents
        .map(|e| (e.max_x + 1, e.max_y + 1))
        .unwrap_or((0, 0));
    next.meta.grid_width = (doc.meta.grid_width - cols.removed().len() as i64).max(min_width);
    next.meta.grid_height = (doc.meta.grid_height - rows.removed().len() as i64).max(min_height);
    next.meta.fixed_cols = remap_fixed(&doc.meta.fixed_cols, &cols);
    next.meta.fixed_rows = remap_fixed(&doc.meta.fixed_rows, &rows);

    debug!(
        "Compacted grid ({:?}): removed columns {:?}, rows {:?}; now {}x{}",
        mode,
        cols.removed(),
        rows.removed(),
        next.meta.grid_width,
        next.meta.grid_height
    );

    Outcome::changed(next)
}

/// Removes every empty line inside the occupied range.
pub fn reduce(doc: &GridDocument) -> Outcome<GridDocument> {
    compact(doc, CompactionMode::Full)
}

/// Removes only unpinned empty spacing lines.
pub fn reduce_spacing(doc: &GridDocument) -> Outcome<GridDocument> {
    compact(doc, CompactionMode::SpacingOnly)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid_model::{GridMeta, GridPoint, Route, Segment, WeightInterval};

    fn doc_with_columns(xs: &[i64], meta: GridMeta) -> GridDocument {
        let points = xs.iter().map(|&x| GridPoint::new(x, 1)).collect::<Vec<_>>();
        let last = points.len() - 1;
        let segment = Segment::new(points, vec![WeightInterval::new(0, last, 1.0)]);
        GridDocument {
            routes: vec![Route::new("Green", "#00ff00", vec![segment])],
            meta,
        }
    }

    #[test]
    fn test_reduce_removes_single_gap() {
        let meta = GridMeta {
            grid_width: 9,
            grid_height: 2,
            ..Default::default()
        };
        let doc = doc_with_columns(&[5, 6, 8], meta);

        let outcome = reduce(&doc);
        assert!(outcome.modified);
        let xs: Vec<i64> = outcome.value.routes[0].segments[0]
            .points
            .iter()
            .map(|p| p.x)
            .collect();
        assert_eq!(xs, vec![5, 6, 7]);
        assert_eq!(outcome.value.meta.grid_width, 8);
    }

    #[test]
    fn test_reduce_is_idempotent() {
        let doc = doc_with_columns(&[1, 4, 9, 10, 15], GridMeta::default());
        let once = reduce(&doc).into_value();
        let twice = reduce(&once);
        assert!(!twice.modified);
        assert_eq!(twice.value, once);

        let distinct: BTreeSet<i64> = once.routes[0].segments[0]
            .points
            .iter()
            .map(|p| p.x)
            .collect();
        assert_eq!(distinct.len(), 5);
        assert_eq!(distinct.into_iter().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_spacing_only_respects_fixed_and_odd_lines() {
        let meta = GridMeta {
            grid_width: 12,
            grid_height: 2,
            fixed_cols: [4].into_iter().collect(),
            fixed_rows: BTreeSet::new(),
        };
        // Empty: 2, 3, 4, 6, 7, 8, 9, 10. Removable: 2, 6, 8, 10.
        let doc = doc_with_columns(&[1, 5, 11], meta);

        let outcome = reduce_spacing(&doc);
        assert!(outcome.modified);
        let xs: Vec<i64> = outcome.value.routes[0].segments[0]
            .points
            .iter()
            .map(|p| p.x)
            .collect();
        assert_eq!(xs, vec![1, 4, 7]);
        assert_eq!(outcome.value.meta.grid_width, 8);
        assert!(outcome.value.meta.fixed_cols.contains(&3));
    }

    #[test]
    fn test_remap_is_monotonic() {
        let remap = AxisRemap::new([2, 3, 7].into_iter().collect());
        let mapped: Vec<i64> = [1, 4, 5, 8, 10].iter().map(|&c| remap.apply(c)).collect();
        assert_eq!(mapped, vec![1, 2, 3, 5, 7]);
        assert!(mapped.windows(2).all(|w| w[0] < w[1]));
    }
}
