//! Planar geometry predicates for no-fly zone polygons
//!
//! All predicates use closed-set semantics: a point on the boundary counts
//! as inside, and a segment tangent to the boundary counts as intersecting.

use geo::{
    Area, BoundingRect, Centroid, Coord, EuclideanDistance, Intersects, Line, LineString, Point,
    Polygon, Rect,
};
use serde::{Deserialize, Serialize};

use crate::{DeliveryError, DeliveryResult};

/// A planar position in real (non-grid) coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl From<(f64, f64)> for Position {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

impl From<Position> for (f64, f64) {
    fn from(p: Position) -> Self {
        (p.x, p.y)
    }
}

impl From<Position> for Coord<f64> {
    fn from(p: Position) -> Self {
        Coord { x: p.x, y: p.y }
    }
}

impl From<Position> for Point<f64> {
    fn from(p: Position) -> Self {
        Point::new(p.x, p.y)
    }
}

/// Total length of a polyline
pub fn path_length(path: &[Position]) -> f64 {
    path.windows(2).map(|seg| seg[0].distance_to(seg[1])).sum()
}

/// Build a validated simple polygon from a vertex sequence.
///
/// Rejects rings with fewer than three vertices, zero area, or
/// self-intersecting (non-adjacent) edges.
pub fn polygon_from_vertices(vertices: &[Position]) -> DeliveryResult<Polygon<f64>> {
    if vertices.len() < 3 {
        return Err(DeliveryError::InvalidPolygon(format!(
            "polygon needs at least 3 vertices, got {}",
            vertices.len()
        )));
    }

    let ring: Vec<Coord<f64>> = vertices.iter().map(|&v| v.into()).collect();
    let polygon = Polygon::new(LineString::from(ring), vec![]);

    if polygon.unsigned_area() <= 0.0 {
        return Err(DeliveryError::InvalidPolygon(
            "polygon has zero area".to_string(),
        ));
    }

    // A simple polygon has no crossings between non-adjacent edges.
    let edges: Vec<Line<f64>> = polygon.exterior().lines().collect();
    let n = edges.len();
    for i in 0..n {
        for j in (i + 1)..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            if !adjacent && edges[i].intersects(&edges[j]) {
                return Err(DeliveryError::InvalidPolygon(
                    "polygon is self-intersecting".to_string(),
                ));
            }
        }
    }

    Ok(polygon)
}

/// Point-in-polygon test over the closed polygon (boundary included)
pub fn polygon_contains(polygon: &Polygon<f64>, p: Position) -> bool {
    polygon.intersects(&Point::from(p))
}

/// Closed segment vs closed polygon intersection test
pub fn segment_crosses_polygon(polygon: &Polygon<f64>, a: Position, b: Position) -> bool {
    polygon.intersects(&Line::new(Coord::from(a), Coord::from(b)))
}

/// Minimum Euclidean distance from a point to the polygon boundary
pub fn distance_to_boundary(polygon: &Polygon<f64>, p: Position) -> f64 {
    Point::from(p).euclidean_distance(polygon.exterior())
}

/// Axis-aligned bounding box of a polygon
pub fn bounding_box(polygon: &Polygon<f64>) -> Rect<f64> {
    polygon
        .bounding_rect()
        .expect("validated polygon has a bounding box")
}

/// Centroid of a polygon
pub fn centroid(polygon: &Polygon<f64>) -> Position {
    let c = polygon
        .centroid()
        .expect("validated polygon has a centroid");
    Position::new(c.x(), c.y())
}
