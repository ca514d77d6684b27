// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

//! Plain data structures for a schematic layout on the doubled-integer grid.
//!
//! Odd coordinates hold stations, even coordinates hold spacing and connector lines.
//! Every point shape accepted on disk is resolved here once, so the algorithms below
//! never sniff types at runtime.

use crate::errors::SchematicError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Largest absolute coordinate a layout may use. Sizing and rasterization allocate per grid
/// line, so anything past this is rejected as malformed.
pub const MAX_GRID_COORD: i64 = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Station,
    Connector,
    Line,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<NodeType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_number: Option<i64>,
}

impl NodeProperties {
    pub fn station(id: &str, name: &str) -> Self {
        Self {
            station_id: Some(id.to_string()),
            station_name: Some(name.to_string()),
            node_type: Some(NodeType::Station),
            connect_number: None,
        }
    }

    pub fn connector(connect_number: i64) -> Self {
        Self {
            node_type: Some(NodeType::Connector),
            connect_number: Some(connect_number),
            ..Default::default()
        }
    }

    /// Drops the station identity, leaving a shape-only point.
    pub fn strip_station(&mut self) {
        self.station_id = None;
        self.station_name = None;
        self.node_type = Some(NodeType::Line);
    }
}

/// A grid point. Serialized as `[x, y]` or `[x, y, {properties}]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawPoint", into = "RawPoint")]
pub struct GridPoint {
    pub x: i64,
    pub y: i64,
    pub properties: Option<NodeProperties>,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawPoint {
    Annotated(i64, i64, NodeProperties),
    Bare(i64, i64),
}

impl From<RawPoint> for GridPoint {
    fn from(raw: RawPoint) -> Self {
        match raw {
            RawPoint::Annotated(x, y, properties) => GridPoint {
                x,
                y,
                properties: Some(properties),
            },
            RawPoint::Bare(x, y) => GridPoint {
                x,
                y,
                properties: None,
            },
        }
    }
}

impl From<GridPoint> for RawPoint {
    fn from(point: GridPoint) -> Self {
        match point.properties {
            Some(properties) => RawPoint::Annotated(point.x, point.y, properties),
            None => RawPoint::Bare(point.x, point.y),
        }
    }
}

impl GridPoint {
    pub fn new(x: i64, y: i64) -> Self {
        Self {
            x,
            y,
            properties: None,
        }
    }

    pub fn with_properties(x: i64, y: i64, properties: NodeProperties) -> Self {
        Self {
            x,
            y,
            properties: Some(properties),
        }
    }

    pub fn coord(&self, axis: Axis) -> i64 {
        match axis {
            Axis::Horizontal => self.x,
            Axis::Vertical => self.y,
        }
    }
}

/// Load annotation over the point run `start_idx..=end_idx` of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightInterval {
    pub start_idx: usize,
    pub end_idx: usize,
    pub weight: f64,
}

impl WeightInterval {
    pub fn new(start_idx: usize, end_idx: usize, weight: f64) -> Self {
        Self {
            start_idx,
            end_idx,
            weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub points: Vec<GridPoint>,
    #[serde(default)]
    pub station_weights: Vec<WeightInterval>,
    /// Properties inherited by the point at the same index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<Option<NodeProperties>>>,
}

impl Segment {
    pub fn new(points: Vec<GridPoint>, station_weights: Vec<WeightInterval>) -> Self {
        Self {
            points,
            station_weights,
            nodes: None,
        }
    }

    pub fn is_boundary(&self, idx: usize) -> bool {
        idx == 0 || idx + 1 >= self.points.len()
    }

    /// Inherited properties for `idx`, if the segment carries a `nodes` table.
    pub fn inherited(&self, idx: usize) -> Option<&NodeProperties> {
        self.nodes
            .as_ref()
            .and_then(|nodes| nodes.get(idx))
            .and_then(|n| n.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub segments: Vec<Segment>,
}

impl Route {
    pub fn new(name: &str, color: &str, segments: Vec<Segment>) -> Self {
        Self {
            name: name.to_string(),
            color: color.to_string(),
            segments,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridMeta {
    pub grid_width: i64,
    pub grid_height: i64,
    #[serde(default)]
    pub fixed_cols: BTreeSet<i64>,
    #[serde(default)]
    pub fixed_rows: BTreeSet<i64>,
}

impl GridMeta {
    /// Meta for a layout that arrived without one: extents only, nothing pinned.
    pub fn derive_from(routes: &[Route]) -> Self {
        match GridExtents::of(routes) {
            Some(ext) => GridMeta {
                grid_width: ext.max_x + 1,
                grid_height: ext.max_y + 1,
                ..Default::default()
            },
            None => GridMeta::default(),
        }
    }

    pub fn fixed(&self, axis: Axis) -> &BTreeSet<i64> {
        match axis {
            Axis::Horizontal => &self.fixed_cols,
            Axis::Vertical => &self.fixed_rows,
        }
    }
}

/// Grid orientation. `Horizontal` runs along x and is measured in columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Horizontal,
    Vertical,
}

impl Axis {
    pub const BOTH: [Axis; 2] = [Axis::Horizontal, Axis::Vertical];
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Horizontal => write!(f, "horizontal"),
            Axis::Vertical => write!(f, "vertical"),
        }
    }
}

impl FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "horizontal" | "h" | "x" | "col" => Ok(Axis::Horizontal),
            "vertical" | "v" | "y" | "row" => Ok(Axis::Vertical),
            other => Err(format!("unknown axis '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridExtents {
    pub min_x: i64,
    pub max_x: i64,
    pub min_y: i64,
    pub max_y: i64,
}

impl GridExtents {
    pub fn of(routes: &[Route]) -> Option<Self> {
        let mut points = routes
            .iter()
            .flat_map(|r| r.segments.iter())
            .flat_map(|s| s.points.iter());
        let first = points.next()?;
        let mut ext = GridExtents {
            min_x: first.x,
            max_x: first.x,
            min_y: first.y,
            max_y: first.y,
        };
        for p in points {
            ext.min_x = ext.min_x.min(p.x);
            ext.max_x = ext.max_x.max(p.x);
            ext.min_y = ext.min_y.min(p.y);
            ext.max_y = ext.max_y.max(p.y);
        }
        Some(ext)
    }
}

/// Both on-disk shapes: a bare route array, or routes with grid meta.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Layout {
    Wrapped {
        routes: Vec<Route>,
        #[serde(default)]
        meta: Option<GridMeta>,
    },
    Bare(Vec<Route>),
}

/// Normalized layout handed to every meta-dependent operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridDocument {
    pub routes: Vec<Route>,
    pub meta: GridMeta,
}

impl GridDocument {
    pub fn new(routes: Vec<Route>) -> Self {
        let meta = GridMeta::derive_from(&routes);
        Self { routes, meta }
    }

    pub fn from_layout(layout: Layout) -> Self {
        match layout {
            Layout::Bare(routes) => GridDocument::new(routes),
            Layout::Wrapped {
                routes,
                meta: Some(meta),
            } => GridDocument { routes, meta },
            Layout::Wrapped { routes, meta: None } => GridDocument::new(routes),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, SchematicError> {
        let layout: Layout = serde_json::from_str(json)?;
        Ok(GridDocument::from_layout(layout))
    }

    pub fn load(path: &Path) -> Result<Self, SchematicError> {
        let json = std::fs::read_to_string(path).map_err(|source| SchematicError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        GridDocument::from_json_str(&json)
    }

    pub fn with_routes(&self, routes: Vec<Route>) -> Self {
        GridDocument {
            routes,
            meta: self.meta.clone(),
        }
    }
}

/// Result of a public operation: the new value and whether anything changed.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub modified: bool,
    pub value: T,
}

impl<T> Outcome<T> {
    pub fn changed(value: T) -> Self {
        Self {
            modified: true,
            value,
        }
    }

    pub fn unchanged(value: T) -> Self {
        Self {
            modified: false,
            value,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

/// Shape checks run at the entry of every public operation.
pub fn validate_meta(meta: &GridMeta) -> Result<(), SchematicError> {
    for (name, extent) in [("gridWidth", meta.grid_width), ("gridHeight", meta.grid_height)] {
        if !(0..=MAX_GRID_COORD + 1).contains(&extent) {
            return Err(SchematicError::MalformedMeta(format!(
                "{} {} outside 0..={}",
                name,
                extent,
                MAX_GRID_COORD + 1
            )));
        }
    }
    Ok(())
}

pub fn validate_routes(routes: &[Route]) -> Result<(), SchematicError> {
    for route in routes {
        for (seg_idx, segment) in route.segments.iter().enumerate() {
            validate_segment(&route.name, seg_idx, segment)?;
        }
    }
    Ok(())
}

fn validate_segment(route: &str, seg_idx: usize, segment: &Segment) -> Result<(), SchematicError> {
    let len = segment.points.len();
    if len < 2 {
        return Err(SchematicError::malformed(
            route,
            seg_idx,
            format!("segment has {} points, need at least 2", len),
        ));
    }

    if let Some((i, p)) = segment
        .points
        .iter()
        .enumerate()
        .find(|(_, p)| p.x.abs() > MAX_GRID_COORD || p.y.abs() > MAX_GRID_COORD)
    {
        return Err(SchematicError::malformed(
            route,
            seg_idx,
            format!(
                "point {} at ({}, {}) lies beyond the coordinate limit {}",
                i, p.x, p.y, MAX_GRID_COORD
            ),
        ));
    }

    if let Some(nodes) = &segment.nodes {
        if nodes.len() != len {
            return Err(SchematicError::malformed(
                route,
                seg_idx,
                format!("nodes table has {} entries for {} points", nodes.len(), len),
            ));
        }
    }

    let mut previous_end: Option<usize> = None;
    for w in &segment.station_weights {
        if w.start_idx >= w.end_idx || w.end_idx >= len {
            return Err(SchematicError::malformed(
                route,
                seg_idx,
                format!(
                    "interval {}..{} out of range for {} points",
                    w.start_idx, w.end_idx, len
                ),
            ));
        }
        if !w.weight.is_finite() {
            return Err(SchematicError::malformed(
                route,
                seg_idx,
                format!("interval {}..{} has non-finite weight", w.start_idx, w.end_idx),
            ));
        }
        if let Some(end) = previous_end {
            if w.start_idx < end {
                return Err(SchematicError::malformed(
                    route,
                    seg_idx,
                    format!(
                        "interval {}..{} overlaps or precedes previous interval ending at {}",
                        w.start_idx, w.end_idx, end
                    ),
                ));
            }
        }
        previous_end = Some(w.end_idx);
    }

    Ok(())
}
