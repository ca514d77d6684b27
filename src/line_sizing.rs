use crate::grid_model::{Axis, GridDocument, GridExtents, validate_meta, validate_routes};
use crate::weight_table::aggregate_line_weights;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Render pixels to physical points.
pub const PX_TO_POINTS: f64 = 0.75;

/// Lines narrower than this are hidden during refinement.
pub const DEFAULT_MIN_LINE_PX: f64 = 40.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingOptions {
    /// When off every line gets the same share and nothing is hidden.
    pub scaling_enabled: bool,
    pub multiplier: f64,
    /// Values above 1 widen heavy lines disproportionately.
    pub exponent: f64,
    pub min_line_px: f64,
    /// Floor applied to weights before the power law.
    pub epsilon: f64,
    /// Focal line on the axis being sized.
    #[serde(skip)]
    pub focal: Option<i64>,
    /// Lines held at the smallest size share and never hidden.
    #[serde(skip)]
    pub pinned: BTreeSet<usize>,
}

impl Default for SizingOptions {
    fn default() -> Self {
        Self {
            scaling_enabled: true,
            multiplier: 1.0,
            exponent: 1.0,
            min_line_px: DEFAULT_MIN_LINE_PX,
            epsilon: 0.01,
            focal: None,
            pinned: BTreeSet::new(),
        }
    }
}

impl SizingOptions {
    pub fn uniform() -> Self {
        Self {
            scaling_enabled: false,
            ..Default::default()
        }
    }
}

/// Multiplier for a line at `distance` grid lines from the focal line.
pub fn focal_multiplier(distance: u64) -> f64 {
    match distance {
        0 => 8.0,
        1 => 6.0,
        2 => 4.0,
        3 => 3.0,
        4 => 2.0,
        _ => 1.0,
    }
}

pub fn size_weight(line: usize, weight: f64, options: &SizingOptions) -> f64 {
    if !options.scaling_enabled {
        return 1.0;
    }
    let multiplier = match options.focal {
        Some(focal) => focal_multiplier((line as i64 - focal).unsigned_abs()),
        None => options.multiplier,
    };
    let weight = if weight.is_finite() { weight } else { 0.0 };
    multiplier * weight.max(options.epsilon).powf(options.exponent)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineSizes {
    /// Pixel extent per line; hidden lines are 0.
    pub pixel_sizes: Vec<f64>,
    pub hidden: BTreeSet<usize>,
}

impl LineSizes {
    pub fn visible(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.pixel_sizes
            .iter()
            .copied()
            .enumerate()
            .filter(|(i, _)| !self.hidden.contains(i))
    }

    pub fn min_visible(&self) -> Option<f64> {
        self.visible()
            .map(|(_, s)| s)
            .filter(|s| *s > 0.0)
            .min_by(f64::total_cmp)
    }

    pub fn total(&self) -> f64 {
        self.visible().map(|(_, s)| s).sum()
    }
}

fn distribute(
    base: &[f64],
    hidden: &BTreeSet<usize>,
    pinned: &BTreeSet<usize>,
    total_extent: f64,
) -> Vec<f64> {
    let pinned_share = base
        .iter()
        .enumerate()
        .filter(|(i, _)| !hidden.contains(i) && !pinned.contains(i))
        .map(|(_, w)| *w)
        .min_by(f64::total_cmp)
        .unwrap_or(1.0);

    let effective: Vec<f64> = base
        .iter()
        .enumerate()
        .map(|(i, &w)| {
            if hidden.contains(&i) {
                0.0
            } else if pinned.contains(&i) {
                pinned_share
            } else {
                w
            }
        })
        .collect();

    let sum: f64 = effective.iter().sum();
    if sum <= 0.0 {
        return vec![0.0; base.len()];
    }
    effective.iter().map(|w| w / sum * total_extent).collect()
}

/// Splits `total_extent` pixels across lines in proportion to their size weight, then hides
/// the narrowest line under the floor until every visible line meets it or one remains.
pub fn compute_line_sizes(
    max_weights: &[f64],
    total_extent: f64,
    options: &SizingOptions,
) -> LineSizes {
    if max_weights.is_empty() {
        return LineSizes::default();
    }
    if !total_extent.is_finite() || total_extent <= 0.0 {
        warn!("line sizing skipped: invalid extent {}", total_extent);
        return LineSizes {
            pixel_sizes: vec![0.0; max_weights.len()],
            hidden: BTreeSet::new(),
        };
    }

    let base: Vec<f64> = max_weights
        .iter()
        .enumerate()
        .map(|(i, &w)| size_weight(i, w, options))
        .collect();

    let mut hidden = BTreeSet::new();
    let mut sizes = distribute(&base, &hidden, &options.pinned, total_extent);

    if !options.scaling_enabled {
        return LineSizes {
            pixel_sizes: sizes,
            hidden,
        };
    }

    loop {
        if max_weights.len() - hidden.len() <= 1 {
            break;
        }
        let narrowest = sizes
            .iter()
            .enumerate()
            .filter(|(i, s)| {
                !hidden.contains(i) && !options.pinned.contains(i) && **s < options.min_line_px
            })
            .min_by(|(ia, sa), (ib, sb)| {
                sa.total_cmp(sb)
                    .then(max_weights[*ia].total_cmp(&max_weights[*ib]))
                    .then(ia.cmp(ib))
            })
            .map(|(i, _)| i);

        match narrowest {
            Some(line) => {
                hidden.insert(line);
                sizes = distribute(&base, &hidden, &options.pinned, total_extent);
            }
            None => break,
        }
    }

    LineSizes {
        pixel_sizes: sizes,
        hidden,
    }
}

/// Pixels to points for a minimum: ceiling, and never 0 for a visible line.
pub fn min_px_to_points(px: f64) -> u32 {
    if px > 0.0 {
        ((px * PX_TO_POINTS).ceil() as u32).max(1)
    } else {
        0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasExtent {
    pub width_px: u32,
    pub height_px: u32,
}

impl Default for CanvasExtent {
    fn default() -> Self {
        Self {
            width_px: 1200,
            height_px: 800,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocalPoint {
    pub x: i64,
    pub y: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinCellDimensions {
    pub min_width: u32,
    pub min_height: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentDimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridMeasurement {
    pub columns: LineSizes,
    pub rows: LineSizes,
    pub min_cell: MinCellDimensions,
    pub current: CurrentDimensions,
}

impl GridMeasurement {
    pub fn min_for(&self, axis: Axis) -> u32 {
        match axis {
            Axis::Horizontal => self.min_cell.min_width,
            Axis::Vertical => self.min_cell.min_height,
        }
    }
}

fn axis_options(
    doc: &GridDocument,
    axis: Axis,
    template: &SizingOptions,
    focal: Option<FocalPoint>,
) -> SizingOptions {
    SizingOptions {
        focal: focal.map(|f| match axis {
            Axis::Horizontal => f.x,
            Axis::Vertical => f.y,
        }),
        pinned: doc
            .meta
            .fixed(axis)
            .iter()
            .filter_map(|&c| usize::try_from(c).ok())
            .collect(),
        ..template.clone()
    }
}

/// Sizes every column and row of `doc` on `canvas` and reports the smallest visible cell.
pub fn measure_grid(
    doc: &GridDocument,
    canvas: CanvasExtent,
    options: &SizingOptions,
    focal: Option<FocalPoint>,
) -> GridMeasurement {
    if let Err(e) = validate_meta(&doc.meta).and_then(|_| validate_routes(&doc.routes)) {
        warn!("grid measurement skipped: {}", e);
        return GridMeasurement::default();
    }

    let weights = aggregate_line_weights(&doc.routes);
    let extents = GridExtents::of(&doc.routes);

    let [columns, rows] = Axis::BOTH.map(|axis| {
        let (declared, max_coord, extent_px) = match axis {
            Axis::Horizontal => (
                doc.meta.grid_width,
                extents.map(|e| e.max_x),
                canvas.width_px,
            ),
            Axis::Vertical => (
                doc.meta.grid_height,
                extents.map(|e| e.max_y),
                canvas.height_px,
            ),
        };
        let lines = declared.max(max_coord.map(|m| m + 1).unwrap_or(0)).max(0) as usize;
        let line_weights = weights.for_axis(axis);
        let per_line: Vec<f64> = (0..lines)
            .map(|i| line_weights.get(&(i as i64)).copied().unwrap_or(0.0))
            .collect();
        compute_line_sizes(
            &per_line,
            extent_px as f64,
            &axis_options(doc, axis, options, focal),
        )
    });

    let min_cell = MinCellDimensions {
        min_width: columns.min_visible().map(min_px_to_points).unwrap_or(0),
        min_height: rows.min_visible().map(min_px_to_points).unwrap_or(0),
    };
    let current = CurrentDimensions {
        width: (columns.total() * PX_TO_POINTS).ceil() as u32,
        height: (rows.total() * PX_TO_POINTS).ceil() as u32,
    };

    debug!(
        "Measured grid: {} columns ({} hidden), {} rows ({} hidden), min cell {}x{} pt",
        columns.pixel_sizes.len(),
        columns.hidden.len(),
        rows.pixel_sizes.len(),
        rows.hidden.len(),
        min_cell.min_width,
        min_cell.min_height
    );

    GridMeasurement {
        columns,
        rows,
        min_cell,
        current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid_model::{GridPoint, Route, Segment, WeightInterval};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_uniform_sizing_splits_evenly() {
        let sizes = compute_line_sizes(&[1.0, 1.0, 1.0, 1.0], 100.0, &SizingOptions::uniform());
        assert_eq!(sizes.pixel_sizes.len(), 4);
        assert!(sizes.pixel_sizes.iter().all(|&s| approx(s, 25.0)));
        assert!(sizes.hidden.is_empty());
    }

    #[test]
    fn test_light_lines_hidden_until_floor_met() {
        let options = SizingOptions {
            multiplier: 1.0,
            exponent: 1.0,
            ..Default::default()
        };
        let sizes = compute_line_sizes(&[1.0, 1.0, 1.0, 40.0], 100.0, &options);
        assert_eq!(sizes.hidden, [0, 1, 2].into_iter().collect());
        assert!(approx(sizes.pixel_sizes[3], 100.0));
        assert!(sizes.visible().all(|(_, s)| s >= options.min_line_px));
    }

    #[test]
    fn test_hiding_stops_at_one_line() {
        let sizes = compute_line_sizes(&[1.0, 2.0], 30.0, &SizingOptions::default());
        assert_eq!(sizes.hidden, [0].into_iter().collect());
        assert!(approx(sizes.pixel_sizes[1], 30.0));
    }

    #[test]
    fn test_exponent_emphasizes_heavy_lines() {
        let options = SizingOptions {
            exponent: 2.0,
            min_line_px: 0.0,
            ..Default::default()
        };
        let sizes = compute_line_sizes(&[1.0, 3.0], 100.0, &options);
        assert!(approx(sizes.pixel_sizes[0], 10.0));
        assert!(approx(sizes.pixel_sizes[1], 90.0));
    }

    #[test]
    fn test_focal_step_function() {
        let options = SizingOptions {
            focal: Some(2),
            min_line_px: 0.0,
            ..Default::default()
        };
        let weights = vec![1.0; 9];
        assert_eq!(size_weight(2, 1.0, &options), 8.0);
        assert_eq!(size_weight(1, 1.0, &options), 6.0);
        assert_eq!(size_weight(6, 1.0, &options), 2.0);
        assert_eq!(size_weight(8, 1.0, &options), 1.0);

        let sizes = compute_line_sizes(&weights, 1000.0, &options);
        let widest = sizes
            .visible()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i);
        assert_eq!(widest, Some(2));
    }

    #[test]
    fn test_points_conversion_never_reports_zero() {
        assert_eq!(min_px_to_points(0.4), 1);
        assert_eq!(min_px_to_points(40.0), 30);
        assert_eq!(min_px_to_points(41.0), 31);
        assert_eq!(min_px_to_points(0.0), 0);
    }

    #[test]
    fn test_measure_grid_reports_min_cell() {
        let segment = Segment::new(
            vec![GridPoint::new(1, 1), GridPoint::new(3, 1)],
            vec![WeightInterval::new(0, 1, 2.0)],
        );
        let doc = GridDocument::new(vec![Route::new("A", "red", vec![segment])]);
        let canvas = CanvasExtent {
            width_px: 400,
            height_px: 200,
        };

        let measurement = measure_grid(&doc, canvas, &SizingOptions::uniform(), None);
        assert_eq!(measurement.columns.pixel_sizes.len(), 4);
        assert_eq!(measurement.rows.pixel_sizes.len(), 2);
        assert_eq!(measurement.min_cell.min_width, 75);
        assert_eq!(measurement.min_cell.min_height, 75);
        assert_eq!(measurement.current.width, 300);
        assert_eq!(measurement.current.height, 150);
    }

    #[test]
    fn test_measure_grid_skips_oversized_meta() {
        let segment = Segment::new(
            vec![GridPoint::new(1, 1), GridPoint::new(3, 1)],
            vec![WeightInterval::new(0, 1, 2.0)],
        );
        let mut doc = GridDocument::new(vec![Route::new("A", "red", vec![segment])]);
        doc.meta.grid_width = i64::MAX;
        let canvas = CanvasExtent {
            width_px: 400,
            height_px: 200,
        };

        let measurement = measure_grid(&doc, canvas, &SizingOptions::uniform(), None);
        assert_eq!(measurement, GridMeasurement::default());
    }
}
