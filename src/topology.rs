use crate::grid_model::{Axis, GridPoint, NodeType, Segment};

const BEND_EPSILON: f64 = 0.001;

/// Role of a point within its segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointKind {
    Station,
    Connector,
    Geometry,
}

/// Labels the point at `idx`. Connector status wins over everything, then real-station
/// evidence (interval endpoint, name/id, explicit type), else pure geometry.
pub fn classify(segment: &Segment, idx: usize) -> PointKind {
    let own = segment.points.get(idx).and_then(|p| p.properties.as_ref());
    let inherited = segment.inherited(idx);
    let sources = [own, inherited];

    let is_connector = sources.iter().flatten().any(|props| {
        props.connect_number.is_some() || props.node_type == Some(NodeType::Connector)
    });
    if is_connector {
        return PointKind::Connector;
    }

    let is_interval_endpoint = segment
        .station_weights
        .iter()
        .any(|w| w.start_idx == idx || w.end_idx == idx);

    let is_named_or_typed = sources.iter().flatten().any(|props| {
        props.station_id.is_some()
            || props.station_name.is_some()
            || props.node_type == Some(NodeType::Station)
    });

    if is_interval_endpoint || is_named_or_typed {
        PointKind::Station
    } else {
        PointKind::Geometry
    }
}

fn unit(dx: i64, dy: i64) -> Option<(f64, f64)> {
    let len = ((dx * dx + dy * dy) as f64).sqrt();
    if len == 0.0 {
        None
    } else {
        Some((dx as f64 / len, dy as f64 / len))
    }
}

/// True when the path changes direction at `idx`. Boundary points and zero-length legs
/// never count as bends.
pub fn is_bend_point(points: &[GridPoint], idx: usize) -> bool {
    if idx == 0 || idx + 1 >= points.len() {
        return false;
    }
    let (prev, cur, next) = (&points[idx - 1], &points[idx], &points[idx + 1]);

    let incoming = unit(cur.x - prev.x, cur.y - prev.y);
    let outgoing = unit(next.x - cur.x, next.y - cur.y);

    match (incoming, outgoing) {
        (Some((ax, ay)), Some((bx, by))) => (ax * by - ay * bx).abs() > BEND_EPSILON,
        _ => false,
    }
}

fn leg_axis(a: &GridPoint, b: &GridPoint) -> Option<Axis> {
    match (a.x == b.x, a.y == b.y) {
        (false, true) => Some(Axis::Horizontal),
        (true, false) => Some(Axis::Vertical),
        _ => None,
    }
}

/// Orientation of the incoming and outgoing legs at `idx`. Diagonal or missing legs are `None`.
pub fn leg_axes(points: &[GridPoint], idx: usize) -> (Option<Axis>, Option<Axis>) {
    let incoming = idx
        .checked_sub(1)
        .and_then(|prev| Some(leg_axis(points.get(prev)?, points.get(idx)?)))
        .flatten();
    let outgoing = points
        .get(idx + 1)
        .and_then(|next| Some(leg_axis(points.get(idx)?, next)))
        .flatten();
    (incoming, outgoing)
}

/// Whether either leg through `idx` runs along `axis`.
pub fn touches_axis(points: &[GridPoint], idx: usize, axis: Axis) -> bool {
    let (incoming, outgoing) = leg_axes(points, idx);
    incoming == Some(axis) || outgoing == Some(axis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid_model::{NodeProperties, WeightInterval};

    fn straight_segment() -> Segment {
        Segment::new(
            vec![
                GridPoint::new(1, 1),
                GridPoint::new(3, 1),
                GridPoint::new(5, 1),
                GridPoint::with_properties(7, 1, NodeProperties::connector(2)),
                GridPoint::new(9, 1),
            ],
            vec![WeightInterval::new(0, 2, 3.0), WeightInterval::new(2, 4, 3.0)],
        )
    }

    #[test]
    fn test_classify_kinds() {
        let segment = straight_segment();
        assert_eq!(classify(&segment, 0), PointKind::Station);
        assert_eq!(classify(&segment, 1), PointKind::Geometry);
        assert_eq!(classify(&segment, 2), PointKind::Station);
        assert_eq!(classify(&segment, 3), PointKind::Connector);
    }

    #[test]
    fn test_classify_uses_inherited_nodes() {
        let mut segment = straight_segment();
        let mut nodes = vec![None; segment.points.len()];
        nodes[1] = Some(NodeProperties {
            station_name: Some("Harbour".to_string()),
            ..Default::default()
        });
        nodes[4] = Some(NodeProperties {
            connect_number: Some(7),
            ..Default::default()
        });
        segment.nodes = Some(nodes);

        assert_eq!(classify(&segment, 1), PointKind::Station);
        assert_eq!(classify(&segment, 4), PointKind::Connector);
    }

    #[test]
    fn test_bend_detection() {
        let points = vec![
            GridPoint::new(1, 1),
            GridPoint::new(3, 1),
            GridPoint::new(3, 3),
            GridPoint::new(5, 5),
            GridPoint::new(7, 7),
        ];
        assert!(!is_bend_point(&points, 0));
        assert!(is_bend_point(&points, 1));
        assert!(is_bend_point(&points, 2));
        assert!(!is_bend_point(&points, 3));
        assert!(!is_bend_point(&points, 4));
    }

    #[test]
    fn test_leg_axes() {
        let points = vec![
            GridPoint::new(1, 1),
            GridPoint::new(3, 1),
            GridPoint::new(3, 5),
            GridPoint::new(5, 7),
        ];
        assert_eq!(
            leg_axes(&points, 1),
            (Some(Axis::Horizontal), Some(Axis::Vertical))
        );
        assert_eq!(leg_axes(&points, 2), (Some(Axis::Vertical), None));
        assert!(touches_axis(&points, 0, Axis::Horizontal));
        assert!(!touches_axis(&points, 3, Axis::Horizontal));
    }
}
