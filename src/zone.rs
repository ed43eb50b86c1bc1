//! Time-active polygonal no-fly zones

use chrono::{DateTime, Utc};
use geo::{Polygon, Rect};
use serde::{Deserialize, Serialize};

use crate::geometry::{
    bounding_box, centroid, distance_to_boundary, polygon_contains, polygon_from_vertices,
    segment_crosses_polygon, Position,
};
use crate::{DeliveryError, DeliveryResult};

/// A polygonal exclusion region with a closed activation interval.
///
/// The polygon is validated and cached at construction; all geometric
/// predicates are time-independent, and callers gate them on `is_active`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ZoneRecord")]
pub struct NoFlyZone {
    pub id: String,
    pub polygon_coordinates: Vec<Position>,
    pub active_time_start: DateTime<Utc>,
    pub active_time_end: DateTime<Utc>,
    #[serde(skip)]
    polygon: Polygon<f64>,
    #[serde(skip)]
    bbox: Rect<f64>,
}

#[derive(Deserialize)]
struct ZoneRecord {
    id: String,
    polygon_coordinates: Vec<Position>,
    active_time_start: DateTime<Utc>,
    active_time_end: DateTime<Utc>,
}

impl TryFrom<ZoneRecord> for NoFlyZone {
    type Error = DeliveryError;

    fn try_from(record: ZoneRecord) -> DeliveryResult<Self> {
        NoFlyZone::new(
            record.id,
            record.polygon_coordinates,
            record.active_time_start,
            record.active_time_end,
        )
    }
}

impl NoFlyZone {
    pub fn new(
        id: impl Into<String>,
        polygon_coordinates: Vec<Position>,
        active_time_start: DateTime<Utc>,
        active_time_end: DateTime<Utc>,
    ) -> DeliveryResult<Self> {
        if active_time_start > active_time_end {
            return Err(DeliveryError::InvalidTimeWindow {
                start: active_time_start,
                end: active_time_end,
            });
        }
        let polygon = polygon_from_vertices(&polygon_coordinates)?;
        let bbox = bounding_box(&polygon);
        Ok(Self {
            id: id.into(),
            polygon_coordinates,
            active_time_start,
            active_time_end,
            polygon,
            bbox,
        })
    }

    /// Whether the zone is active at the given instant (closed interval)
    pub fn is_active(&self, at: DateTime<Utc>) -> bool {
        self.active_time_start <= at && at <= self.active_time_end
    }

    /// Whether a point lies inside the zone (boundary included)
    pub fn contains(&self, p: Position) -> bool {
        polygon_contains(&self.polygon, p)
    }

    /// Whether a closed segment intersects the zone
    pub fn intersects_segment(&self, a: Position, b: Position) -> bool {
        segment_crosses_polygon(&self.polygon, a, b)
    }

    /// Minimum distance from a point to the zone boundary
    pub fn distance_to_boundary(&self, p: Position) -> f64 {
        distance_to_boundary(&self.polygon, p)
    }

    /// Axis-aligned bounding box as (min, max) corners
    pub fn bounding_box(&self) -> (Position, Position) {
        (
            Position::new(self.bbox.min().x, self.bbox.min().y),
            Position::new(self.bbox.max().x, self.bbox.max().y),
        )
    }

    pub fn centroid(&self) -> Position {
        centroid(&self.polygon)
    }
}

/// Whether any consecutive pair of path positions crosses a zone active
/// at the given instant
pub fn path_blocked(path: &[Position], zones: &[NoFlyZone], at: DateTime<Utc>) -> bool {
    path.windows(2).any(|seg| {
        zones
            .iter()
            .any(|zone| zone.is_active(at) && zone.intersects_segment(seg[0], seg[1]))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn square_zone() -> NoFlyZone {
        NoFlyZone::new(
            "z1",
            vec![
                Position::new(30.0, 30.0),
                Position::new(40.0, 30.0),
                Position::new(40.0, 40.0),
                Position::new(30.0, 40.0),
            ],
            t0(),
            t0() + chrono::Duration::hours(2),
        )
        .unwrap()
    }

    #[test]
    fn test_activation_is_closed() {
        let zone = square_zone();
        assert!(zone.is_active(t0()));
        assert!(zone.is_active(t0() + chrono::Duration::hours(2)));
        assert!(!zone.is_active(t0() - chrono::Duration::seconds(1)));
        assert!(!zone.is_active(t0() + chrono::Duration::hours(3)));
    }

    #[test]
    fn test_containment_and_intersection() {
        let zone = square_zone();
        assert!(zone.contains(Position::new(35.0, 35.0)));
        assert!(zone.contains(Position::new(30.0, 35.0)));
        assert!(!zone.contains(Position::new(50.0, 50.0)));

        assert!(zone.intersects_segment(Position::new(20.0, 35.0), Position::new(50.0, 35.0)));
        assert!(!zone.intersects_segment(Position::new(0.0, 0.0), Position::new(10.0, 0.0)));
    }

    #[test]
    fn test_bounding_box_and_centroid() {
        let zone = square_zone();
        let (min, max) = zone.bounding_box();
        assert_eq!(min, Position::new(30.0, 30.0));
        assert_eq!(max, Position::new(40.0, 40.0));
        assert_eq!(zone.centroid(), Position::new(35.0, 35.0));
    }

    #[test]
    fn test_rejects_invalid_construction() {
        assert!(NoFlyZone::new(
            "bad",
            vec![Position::new(0.0, 0.0), Position::new(1.0, 1.0)],
            t0(),
            t0(),
        )
        .is_err());

        assert!(NoFlyZone::new(
            "bad",
            vec![
                Position::new(0.0, 0.0),
                Position::new(1.0, 0.0),
                Position::new(1.0, 1.0),
            ],
            t0() + chrono::Duration::hours(1),
            t0(),
        )
        .is_err());
    }

    #[test]
    fn test_zone_json_round_trip() {
        let zone = square_zone();
        let json = serde_json::to_string(&zone).unwrap();
        let restored: NoFlyZone = serde_json::from_str(&json).unwrap();
        assert_eq!(zone, restored);
    }

    #[test]
    fn test_path_blocked() {
        let zone = square_zone();
        let through = [
            Position::new(0.0, 35.0),
            Position::new(35.0, 35.0),
            Position::new(50.0, 35.0),
        ];
        let around = [
            Position::new(0.0, 0.0),
            Position::new(50.0, 0.0),
            Position::new(50.0, 20.0),
        ];
        assert!(path_blocked(&through, &[zone.clone()], t0()));
        assert!(!path_blocked(&around, &[zone.clone()], t0()));
        // Inactive zones do not block
        assert!(!path_blocked(
            &through,
            &[zone],
            t0() + chrono::Duration::hours(3)
        ));
    }
}
